use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` if retrying the same operation cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, BridgeError::NotFound(_) | BridgeError::NotAvailable(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
