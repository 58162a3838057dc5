#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("keyed digest failed: {0}")]
    Crypto(String),
    #[error("a search is already running on this engine")]
    SearchInProgress,
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidParameter(msg.into())
}
