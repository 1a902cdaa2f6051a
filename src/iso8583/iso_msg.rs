//! Messages as the caller sees them - a message type plus a sparse map of
//! field position to value - and the key used to correlate a response with
//! its originating request.

use std::collections::BTreeMap;
use std::fmt;

use crate::iso8583::IsoError;

/// Message-type class of network management messages (sign-on, echo test).
pub const NETWORK_MGMT_CLASS: &str = "08";

/// Response code signalling success in field 39.
pub const ISO_RSP_SUCCESS: i32 = 0;

/// An ISO8583 message: 4 ASCII digits of message type and position -> value.
///
/// Values are unvalidated at set time; padding and length prefixes are
/// applied only when the message is packed. An empty-string value behaves
/// exactly like an absent field.
#[derive(Debug, Clone, Default)]
pub struct IsoMsg {
    message_type: String,
    elements: BTreeMap<u32, String>,
}

impl IsoMsg {
    pub fn new() -> IsoMsg {
        IsoMsg {
            message_type: String::new(),
            elements: BTreeMap::new(),
        }
    }

    pub fn set_message_type(&mut self, val: &str) {
        self.message_type = val.to_string();
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn set_bit(&mut self, pos: u32, val: &str) {
        self.elements.insert(pos, val.to_string());
    }

    /// Returns the value at `pos`, or "" when the field is not set.
    pub fn bit(&self, pos: u32) -> &str {
        match self.elements.get(&pos) {
            Some(val) => val,
            None => "",
        }
    }

    /// Parses the response code in field 39.
    pub fn resp_code(&self) -> Result<i32, IsoError> {
        match self.elements.get(&39) {
            Some(val) => val
                .trim()
                .parse::<i32>()
                .map_err(|_| IsoError::Protocol(format!("unparseable response code \"{}\"", val))),
            None => Err(IsoError::Protocol("response code not found".to_string())),
        }
    }

    /// Derives the key used to match a response back to its request.
    ///
    /// Both sides echo the components verbatim, so the same derivation on the
    /// request and on its response yields the same key. Everything outside
    /// the key components is ignored on purpose - response routing does not
    /// depend on it.
    pub fn message_key(&self) -> MessageKey {
        let class: String = self.message_type.chars().take(2).collect();
        let proc_prefix = if class == NETWORK_MGMT_CLASS {
            String::new()
        } else {
            self.bit(3).chars().take(2).collect()
        };

        MessageKey {
            proc_prefix,
            transmission: zero_pad(self.bit(7), 10),
            stan: zero_pad(self.bit(11), 6),
            acquirer: zero_pad(self.bit(32), 6),
            class,
        }
    }
}

impl fmt::Display for IsoMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\n{:20}: {}", "message_type", self.message_type)?;
        for (pos, val) in &self.elements {
            write!(f, "\n{:20}: {}", format!("field_{:03}", pos), val)?;
        }
        Ok(())
    }
}

/// Composite correlation key over the components both sides echo.
///
/// Field 7 is left-zero-padded to 10 characters, fields 11 and 32 to 6;
/// missing fields pad from the empty string. Messages of the network
/// management class carry no processing-code component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    class: String,
    proc_prefix: String,
    transmission: String,
    stan: String,
    acquirer: String,
}

// Display is the log-friendly dash-joined rendering; equality and hashing go
// through the struct fields, never through this string.
impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.proc_prefix.is_empty() {
            write!(f, "{}-{}-{}-{}", self.class, self.transmission, self.stan, self.acquirer)
        } else {
            write!(
                f,
                "{}-{}-{}-{}-{}",
                self.class, self.proc_prefix, self.transmission, self.stan, self.acquirer
            )
        }
    }
}

fn zero_pad(val: &str, width: usize) -> String {
    format!("{:0>width$}", val, width = width)
}
