//
// error.rs
// dicom-veil
//
// Error taxonomy shared by intake, orchestration, codec, and export.
//

use thiserror::Error;

use crate::codec::CodecError;

pub type Result<T, E = VeilError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum VeilError {
    /// An incoming item failed media type / extension validation.
    #[error("input rejected: {name}: {reason}")]
    InputRejected { name: String, reason: String },

    /// The codec initialization never completed (failed or was abandoned).
    #[error("codec engine is not ready: {0}")]
    CodecUnready(String),

    /// The codec failed to transform one file; the rest of the batch was abandoned.
    #[error("codec failed on {name}: {source}")]
    CodecFailure {
        name: String,
        #[source]
        source: CodecError,
    },

    #[error("no file with id {0}")]
    UnknownFile(String),

    #[error("unknown tag key: {0}")]
    UnknownTag(String),

    #[error("invalid hexadecimal input: {0:?}")]
    InvalidHex(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VeilError {
    pub fn rejected(name: impl Into<String>, reason: impl Into<String>) -> Self {
        VeilError::InputRejected {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
