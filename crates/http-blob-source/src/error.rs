//! Error types for the HTTP blob source

use std::fmt;

#[derive(Debug)]
pub enum HttpBlobSourceError {
    Url(url::ParseError),
    InvalidContainerUrl(String),
}

impl fmt::Display for HttpBlobSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpBlobSourceError::Url(err) => write!(f, "URL error: {}", err),
            HttpBlobSourceError::InvalidContainerUrl(msg) => {
                write!(f, "Invalid container URL: {}", msg)
            }
        }
    }
}

impl std::error::Error for HttpBlobSourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpBlobSourceError::Url(err) => Some(err),
            _ => None,
        }
    }
}

impl From<url::ParseError> for HttpBlobSourceError {
    fn from(err: url::ParseError) -> Self {
        HttpBlobSourceError::Url(err)
    }
}

pub type Result<T> = std::result::Result<T, HttpBlobSourceError>;
