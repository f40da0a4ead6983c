/// Domain errors shared by every mediaflow crate.
///
/// The API layer maps each variant onto an HTTP status; the pipeline uses
/// them to decide between "treat as absent" and "surface to caller".
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Status store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
