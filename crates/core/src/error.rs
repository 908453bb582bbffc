#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A caller precondition was not met (missing event, candidate, camera).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request never reached the server.
    #[error("Network error: {0}")]
    Network(String),

    /// The capture device could not be enumerated, started or stopped.
    #[error("Camera error: {0}")]
    Device(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
