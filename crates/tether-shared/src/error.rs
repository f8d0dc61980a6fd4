use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid group id: {0}")]
    InvalidGroupId(String),

    #[error("Invalid recipient type: {0}")]
    InvalidRecipientType(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
