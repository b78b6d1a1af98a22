use thiserror::Error;

#[derive(Error, Debug)]
pub enum AccrualError {
    /// Network failure or timeout talking to the record store.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The store answered, but not with something we understand.
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Expense {0} not found")]
    NotFound(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// The listing step failed, so the whole run was abandoned.
    #[error("Run aborted: {0}")]
    RunAborted(String),
    #[error("An accrual run is already in progress")]
    RunInProgress,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AccrualError {
    /// Whether a failed store call may succeed if issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Protocol(_))
    }
}

impl From<reqwest::Error> for AccrualError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Protocol(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AccrualError>;
