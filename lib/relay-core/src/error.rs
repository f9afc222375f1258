use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed upstream payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Upstream produced no valid records ({dropped} dropped)")]
    EmptyUpstream { dropped: usize },

    #[error("Registry not ready: no snapshot has been published yet")]
    NotReady,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Refresh cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::MalformedPayload(err.to_string())
    }
}
