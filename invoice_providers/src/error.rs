use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderApiError {
    #[error("Could not initialize provider client: {0}")]
    Initialization(String),
    #[error("Provider request failed: {0}")]
    RequestFailed(String),
    #[error("Provider query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Could not deserialize provider response: {0}")]
    JsonError(String),
    #[error("Invalid currency amount: {0}")]
    InvalidAmount(String),
    #[error("Provider response is missing required field: {0}")]
    MissingField(&'static str),
}
