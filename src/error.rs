use std::fmt;

#[derive(Debug)]
pub enum BagError {
    IllegalState(String),
    Io(std::io::Error),
    Encode(Box<bincode::error::EncodeError>),
    Decode(Box<bincode::error::DecodeError>),
    Corrupt(String),
    Config(String),
}

pub type Result<T> = std::result::Result<T, BagError>;

impl BagError {
    /// Usage errors are programming mistakes and are never retried.
    pub fn is_usage(&self) -> bool {
        matches!(self, BagError::IllegalState(_))
    }
}

impl fmt::Display for BagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BagError::IllegalState(e) => write!(f, "Illegal state: {}", e),
            BagError::Io(e) => write!(f, "IO error: {}", e),
            BagError::Encode(e) => write!(f, "Encode error: {}", e),
            BagError::Decode(e) => write!(f, "Decode error: {}", e),
            BagError::Corrupt(e) => write!(f, "Corrupt spill data: {}", e),
            BagError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for BagError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BagError::Io(e) => Some(e),
            BagError::Encode(e) => Some(e.as_ref()),
            BagError::Decode(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BagError {
    fn from(err: std::io::Error) -> Self {
        BagError::Io(err)
    }
}

impl From<Box<bincode::error::EncodeError>> for BagError {
    fn from(err: Box<bincode::error::EncodeError>) -> Self {
        BagError::Encode(err)
    }
}

impl From<bincode::error::EncodeError> for BagError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BagError::Encode(Box::new(err))
    }
}

impl From<Box<bincode::error::DecodeError>> for BagError {
    fn from(err: Box<bincode::error::DecodeError>) -> Self {
        BagError::Decode(err)
    }
}

impl From<bincode::error::DecodeError> for BagError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BagError::Decode(Box::new(err))
    }
}

impl From<serde_json::Error> for BagError {
    fn from(err: serde_json::Error) -> Self {
        BagError::Config(err.to_string())
    }
}
