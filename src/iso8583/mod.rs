use thiserror::Error;

pub mod bitmap;
pub mod client;
pub mod framing;
pub mod iso_msg;
pub mod iso_spec;
pub mod packager;
pub mod yaml_de;

/// Errors raised by the codec, framing and session layers.
///
/// Every failure aborts only the operation that raised it; nothing in this
/// crate retries internally.
#[derive(Debug, Error)]
pub enum IsoError {
    /// Bad length header or an otherwise unusable frame.
    #[error("framing error: {0}")]
    Framing(String),

    /// A field the caller set has no entry in the spec table.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Missing spec for a set bitmap bit, invalid length digits or
    /// insufficient bytes while parsing a message.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Invalid hex/binary bitmap text.
    #[error("bitmap format error: {0}")]
    Format(String),

    /// Sign-on/echo response missing or carrying a non-success response code.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No response within the deadline.
    #[error("timed out waiting for data")]
    Timeout,

    /// Transport dial/read/write failure.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),
}
