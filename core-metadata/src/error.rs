use thiserror::Error;

#[derive(Error, Debug)]
pub enum TagError {
    /// The data does not start with a supported ID3v2 header.
    #[error("Unrecognized tag format: {0}")]
    UnrecognizedFormat(String),

    /// A read needed more bytes than the tag or buffer holds.
    #[error("Read out of range: {needed} byte(s) needed at offset {offset}")]
    OutOfRange { offset: u64, needed: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TagError {
    /// Whether this error only means "no supported tag here".
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, TagError::UnrecognizedFormat(_))
    }
}

pub type Result<T> = std::result::Result<T, TagError>;
