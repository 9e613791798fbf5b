use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataHubError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Excel export error: {0}")]
    ExcelError(#[from] rust_xlsxwriter::XlsxError),

    #[error("Task error: {0}")]
    TaskError(#[from] tokio::task::JoinError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DataHubError {
    /// Network-level failures; the previous snapshot stays authoritative.
    pub fn is_transport(&self) -> bool {
        matches!(self, DataHubError::RequestError(_) | DataHubError::HttpStatus { .. })
    }
}

pub type Result<T> = std::result::Result<T, DataHubError>;

impl From<String> for DataHubError {
    fn from(s: String) -> Self {
        DataHubError::Unknown(s)
    }
}

impl From<&str> for DataHubError {
    fn from(s: &str) -> Self {
        DataHubError::Unknown(s.to_string())
    }
}
