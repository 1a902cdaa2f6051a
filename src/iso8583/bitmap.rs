//! Bitmap handling for messages of up to 128 fields (primary + secondary
//! segment) and the hex/binary radix conversions the wire format uses.

use crate::iso8583::IsoError;

/// A transient bitmap of two 64-bit segments.
///
/// Bit 1 of the primary segment flags the presence of the secondary segment;
/// bits 2-64 mark fields 2-64, the secondary segment marks fields 65-128.
#[derive(Debug, Default)]
pub struct Bitmap {
    p_bmp: u64,
    s_bmp: u64,
}

impl Bitmap {
    pub fn new() -> Bitmap {
        Bitmap { p_bmp: 0, s_bmp: 0 }
    }

    pub fn is_on(&self, pos: u32) -> bool {
        assert!(pos > 0 && pos <= 128);

        if pos < 65 {
            self.p_bmp >> (64 - pos) & 0x01 == 0x01
        } else {
            self.s_bmp >> (64 - (pos - 64)) & 0x01 == 0x01
        }
    }

    pub fn set_on(&mut self, pos: u32) {
        assert!(pos > 0 && pos <= 128);

        if pos < 65 {
            self.p_bmp |= (0x8000000000000000 as u64) >> (pos - 1);
        } else {
            self.s_bmp |= (0x8000000000000000 as u64) >> (pos - 64 - 1);
            if !self.is_on(1) {
                self.set_on(1);
            }
        }
    }

    /// True when the secondary-presence bit (position 1) is set.
    pub fn has_secondary(&self) -> bool {
        self.is_on(1)
    }

    /// Serializes the bitmap as 16 uppercase hex characters per segment;
    /// the secondary segment is included only when its presence bit is on.
    pub fn hex_string(&self) -> String {
        if self.has_secondary() {
            format!("{:016X}{:016X}", self.p_bmp, self.s_bmp)
        } else {
            format!("{:016X}", self.p_bmp)
        }
    }

    /// Builds a bitmap from the 16 hex characters of the primary segment.
    pub fn from_primary_hex(hex: &str) -> Result<Bitmap, IsoError> {
        Ok(Bitmap {
            p_bmp: hex_to_u64(hex)?,
            s_bmp: 0,
        })
    }

    /// Installs the secondary segment from its 16 hex characters.
    pub fn set_secondary_hex(&mut self, hex: &str) -> Result<(), IsoError> {
        self.s_bmp = hex_to_u64(hex)?;
        Ok(())
    }
}

fn hex_to_u64(hex: &str) -> Result<u64, IsoError> {
    u64::from_str_radix(hex, 16)
        .map_err(|e| IsoError::Format(format!("invalid bitmap hex \"{}\": {}", hex, e)))
}

/// Converts 16 hex characters into the 64-character binary string form,
/// round-tripping through a u64.
pub fn hex_to_bin(hex: &str) -> Result<String, IsoError> {
    Ok(format!("{:064b}", hex_to_u64(hex)?))
}

/// Converts a 64-character binary string into 16 zero-padded uppercase hex
/// characters, round-tripping through a u64.
pub fn bin_to_hex(bin: &str) -> Result<String, IsoError> {
    let ui = u64::from_str_radix(bin, 2)
        .map_err(|e| IsoError::Format(format!("invalid bitmap binary \"{}\": {}", bin, e)))?;
    Ok(format!("{:016X}", ui))
}
