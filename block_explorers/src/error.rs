use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExplorerApiError {
    #[error("Could not initialize explorer client: {0}")]
    Initialization(String),
    #[error("Explorer request failed: {0}")]
    RequestFailed(String),
    #[error("Explorer query failed. Error {status}. {message}")]
    UpstreamStatus { status: u16, message: String },
    #[error("Explorer rejected the query: {0}")]
    UpstreamRejected(String),
    #[error("Could not deserialize explorer response: {0}")]
    JsonError(String),
    #[error("Invalid on-chain amount: {0}")]
    InvalidAmount(String),
}
