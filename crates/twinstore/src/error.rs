use crate::backend::BackendKind;
use crate::model::ObjectKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TwinError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Object not found: {0}")]
    NotFound(ObjectKey),

    #[error("Attachment `{0}` has no file")]
    NoFile(String),

    #[error("Attachment `{0}` was assigned without an original")]
    MissingOriginal(String),

    #[error("Unknown style `{style}` for attachment `{attachment}`")]
    UnknownStyle { attachment: String, style: String },

    #[error("Invalid file name `{0}`: must be a single path component")]
    InvalidFileName(String),

    #[error("Expiry of {0} seconds is out of range")]
    ExpiryOutOfRange(u64),

    #[error("Attachment `{0}` has no alternate storage")]
    SecondaryUnavailable(String),

    #[error("{operation} is not supported by the {kind} backend")]
    Unsupported {
        kind: BackendKind,
        operation: &'static str,
    },

    #[error("Store error: {0}")]
    Store(String),
}

impl From<confique::Error> for TwinError {
    fn from(err: confique::Error) -> Self {
        TwinError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TwinError>;
