//! The string packager - packs an [IsoMsg] into its wire payload and unpacks
//! a received payload back into a message, driven entirely by the spec table.

use std::sync::Arc;

use crate::iso8583::bitmap::{hex_to_bin, Bitmap};
use crate::iso8583::iso_msg::IsoMsg;
use crate::iso8583::iso_spec::{DataType, LengthType, Spec};
use crate::iso8583::IsoError;

/// Minimum payload that can carry a message: 4 type chars + 16 bitmap chars.
const MIN_PAYLOAD_LEN: usize = 20;

const BITMAP_HEX_LEN: usize = 16;

pub struct StringPackager {
    spec: Arc<Spec>,
}

impl StringPackager {
    pub fn new(spec: Arc<Spec>) -> StringPackager {
        StringPackager { spec }
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Packs `msg` into its ASCII payload.
    ///
    /// Fields are emitted in ascending position order. Fixed fields are
    /// padded to their max length ('0' on the left for numeric, spaces on
    /// the right for alphanumeric); values already longer than the max pass
    /// through unmodified. The secondary bitmap segment is emitted only when
    /// some position >= 65 is set.
    pub fn pack(&self, msg: &IsoMsg) -> Result<String, IsoError> {
        let mut bitmap = Bitmap::new();
        let mut bodies = String::new();

        for pos in 2..=128 {
            let val = msg.bit(pos);
            if val.is_empty() {
                continue;
            }

            let element = self.spec.by_position(pos).ok_or_else(|| {
                IsoError::Encoding(format!("unable to find specification for element {}", pos))
            })?;
            bitmap.set_on(pos);

            match element.length_type {
                LengthType::LLVar => {
                    bodies.push_str(&format!("{:02}", val.len()));
                    bodies.push_str(val);
                }
                LengthType::LLLVar => {
                    bodies.push_str(&format!("{:03}", val.len()));
                    bodies.push_str(val);
                }
                LengthType::Fixed => match element.data_type {
                    DataType::Numeric => {
                        bodies.push_str(&format!("{:0>width$}", val, width = element.max_length));
                    }
                    DataType::Alphanumeric => {
                        bodies.push_str(&format!("{:<width$}", val, width = element.max_length));
                    }
                },
            }
        }

        let payload = format!("{}{}{}", msg.message_type(), bitmap.hex_string(), bodies);
        trace!("packed message: {}", payload);

        Ok(payload)
    }

    /// Unpacks a received payload.
    ///
    /// A payload shorter than the minimum frame is an incomplete message and
    /// yields neither a message nor an error.
    pub fn unpack(&self, data: &[u8]) -> Result<Option<IsoMsg>, IsoError> {
        let text = std::str::from_utf8(data)
            .map_err(|e| IsoError::Decoding(format!("payload is not valid text: {}", e)))?;

        if text.len() < MIN_PAYLOAD_LEN {
            return Ok(None);
        }

        let mut pos = 0;
        let mut msg = IsoMsg::new();
        msg.set_message_type(read_next(text, &mut pos, 4)?);

        let primary = hex_to_bin(read_next(text, &mut pos, BITMAP_HEX_LEN)?)?;

        // the secondary segment sits right after the primary one, ahead of
        // any field body
        let secondary = if primary.starts_with('1') {
            Some(hex_to_bin(read_next(text, &mut pos, BITMAP_HEX_LEN)?)?)
        } else {
            None
        };

        for i in 2..=64 {
            if primary.as_bytes()[i - 1] == b'1' {
                self.read_element(text, &mut pos, i as u32, &mut msg)?;
            }
        }

        if let Some(secondary) = secondary {
            for i in 65..=128 {
                if secondary.as_bytes()[i - 65] == b'1' {
                    self.read_element(text, &mut pos, i as u32, &mut msg)?;
                }
            }
        }

        Ok(Some(msg))
    }

    fn read_element(
        &self,
        text: &str,
        pos: &mut usize,
        element: u32,
        msg: &mut IsoMsg,
    ) -> Result<(), IsoError> {
        let spec = self.spec.by_position(element).ok_or_else(|| {
            IsoError::Decoding(format!("unable to get specification for element {}", element))
        })?;

        let length = match spec.length_type {
            LengthType::LLVar => parse_len(read_next(text, pos, 2)?, element)?,
            LengthType::LLLVar => parse_len(read_next(text, pos, 3)?, element)?,
            LengthType::Fixed => spec.max_length,
        };

        let val = read_next(text, pos, length)?;
        trace!("parsed element {} := {}", element, val);
        msg.set_bit(element, val);

        Ok(())
    }
}

fn read_next<'a>(text: &'a str, pos: &mut usize, len: usize) -> Result<&'a str, IsoError> {
    let end = *pos + len;
    if end > text.len() {
        return Err(IsoError::Decoding(format!(
            "require {} but have {}",
            len,
            text.len() - *pos
        )));
    }

    let s = text.get(*pos..end).ok_or_else(|| {
        IsoError::Decoding(format!("no character boundary at {}..{}", *pos, end))
    })?;
    *pos = end;
    Ok(s)
}

fn parse_len(digits: &str, element: u32) -> Result<usize, IsoError> {
    digits.parse::<usize>().map_err(|_| {
        IsoError::Decoding(format!(
            "invalid length prefix \"{}\" for element {}",
            digits, element
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iso8583::iso_spec;

    fn packager() -> StringPackager {
        StringPackager::new(Arc::new(iso_spec::spec("SampleSpec").clone()))
    }

    #[test]
    fn test_pack_primary_only_has_no_secondary_segment() {
        let mut msg = IsoMsg::new();
        msg.set_message_type("0200");
        msg.set_bit(2, "4111111111111111");
        msg.set_bit(3, "004000");
        msg.set_bit(4, "1500");

        let payload = packager().pack(&msg).unwrap();
        assert!(payload.starts_with("0200"));

        // 4 type chars, one 16-char bitmap segment, then field bodies;
        // bits 2, 3 and 4 on, secondary-presence flag off
        assert_eq!(&payload[4..20], "7000000000000000");
        assert_eq!(&payload[20..], "164111111111111111004000000000001500");
    }

    #[test]
    fn test_pack_high_position_adds_secondary_segment() {
        let mut msg = IsoMsg::new();
        msg.set_message_type("0800");
        msg.set_bit(70, "001");

        let payload = packager().pack(&msg).unwrap();
        assert_eq!(&payload[0..4], "0800");
        assert!(payload[4..20].starts_with('8'), "secondary-presence flag must be on");
        assert_eq!(payload.len(), 4 + 16 + 16 + 3);
    }

    #[test]
    fn test_pack_unknown_element_is_an_encoding_error() {
        let mut msg = IsoMsg::new();
        msg.set_message_type("0200");
        msg.set_bit(55, "9F2608");

        assert!(matches!(packager().pack(&msg), Err(IsoError::Encoding(_))));
    }

    #[test]
    fn test_fixed_overflow_passes_through_unmodified() {
        let mut msg = IsoMsg::new();
        msg.set_message_type("0200");
        msg.set_bit(3, "00400099");

        let payload = packager().pack(&msg).unwrap();
        assert_eq!(&payload[20..], "00400099");
    }

    #[test]
    fn test_round_trip_reproduces_fields_modulo_padding() {
        let mut msg = IsoMsg::new();
        msg.set_message_type("0200");
        msg.set_bit(2, "4111111111111111");
        msg.set_bit(3, "004000");
        msg.set_bit(4, "1500");
        msg.set_bit(7, "0101120000");
        msg.set_bit(11, "42");
        msg.set_bit(37, "REF123");
        msg.set_bit(63, "free text, any length");
        msg.set_bit(90, "123456");
        msg.set_bit(128, "CAFEBABE");

        let packager = packager();
        let payload = packager.pack(&msg).unwrap();
        let parsed = packager.unpack(payload.as_bytes()).unwrap().unwrap();

        assert_eq!(parsed.message_type(), "0200");
        // variable-length fields come back verbatim
        assert_eq!(parsed.bit(2), "4111111111111111");
        assert_eq!(parsed.bit(63), "free text, any length");
        // fixed numeric fields gain left zero-padding
        assert_eq!(parsed.bit(4), "000000001500");
        assert_eq!(parsed.bit(4).trim_start_matches('0'), "1500");
        assert_eq!(parsed.bit(11).trim_start_matches('0'), "42");
        assert_eq!(parsed.bit(90).trim_start_matches('0'), "123456");
        // fixed alphanumeric fields gain right space-padding
        assert_eq!(parsed.bit(37).trim_end(), "REF123");
        assert_eq!(parsed.bit(128).trim_end(), "CAFEBABE");
        // untouched positions stay absent
        assert_eq!(parsed.bit(14), "");
    }

    #[test]
    fn test_unpack_incomplete_frame_is_no_message_and_no_error() {
        let packager = packager();
        assert!(packager.unpack(b"").unwrap().is_none());
        assert!(packager.unpack(b"0800").unwrap().is_none());
        assert!(packager.unpack(&vec![b'0'; 19]).unwrap().is_none());
        // exactly the minimum frame parses into an empty message
        assert!(packager.unpack(b"08000000000000000000").unwrap().is_some());
    }

    #[test]
    fn test_unpack_invalid_bitmap_hex_is_a_format_error() {
        let payload = b"0800ZZZZZZZZZZZZZZZZ0000";
        assert!(matches!(packager().unpack(payload), Err(IsoError::Format(_))));
    }

    #[test]
    fn test_unpack_set_bit_without_spec_is_a_decoding_error() {
        // bit 5 on, but the sample spec has no element 5
        let mut bitmap = Bitmap::new();
        bitmap.set_on(5);
        let payload = format!("0200{}12345", bitmap.hex_string());

        assert!(matches!(
            packager().unpack(payload.as_bytes()),
            Err(IsoError::Decoding(_))
        ));
    }

    #[test]
    fn test_unpack_non_decimal_length_prefix_is_a_decoding_error() {
        // bit 2 on (llvar), length prefix "XY"
        let mut bitmap = Bitmap::new();
        bitmap.set_on(2);
        let payload = format!("0200{}XY4111", bitmap.hex_string());

        assert!(matches!(
            packager().unpack(payload.as_bytes()),
            Err(IsoError::Decoding(_))
        ));
    }

    #[test]
    fn test_unpack_truncated_body_is_a_decoding_error() {
        // bit 3 on (fixed 6), but only 3 chars of body remain
        let mut bitmap = Bitmap::new();
        bitmap.set_on(3);
        let payload = format!("0200{}004", bitmap.hex_string());

        assert!(matches!(
            packager().unpack(payload.as_bytes()),
            Err(IsoError::Decoding(_))
        ));
    }
}
