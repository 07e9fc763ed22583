use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Connection Error - {0}")]
    Connection(String),

    #[error("Declaration Error - {0}")]
    Declaration(String),

    #[error("Decode Error - {0}")]
    Decode(String),

    #[error("Write Error - {0}")]
    Write(String),

    #[error("Read Error - {0}")]
    Read(String),

    #[error("Forward Error - {0}")]
    Forward(String),

    #[error("Transport Error - {0}")]
    Transport(String),

    #[error("Config Error - {0}")]
    Config(String),

    #[error("State Error - {0}")]
    State(String),

    #[error("Drain did not finish within {0:?}")]
    DrainTimeout(std::time::Duration),

    #[error("Worker Error - {0}")]
    Worker(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Worker(err.to_string())
    }
}
