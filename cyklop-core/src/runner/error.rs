pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scenario `{0}` defines no load steps")]
    EmptyScenario(String),

    #[error("unknown user behavior `{0}`")]
    UnknownUser(String),

    #[error("user behavior `{0}` is registered twice")]
    DuplicateUser(String),

    #[error("collector is already open")]
    CollectorAlreadyOpen,

    #[error("`log_interval` must be a positive duration")]
    InvalidLogInterval,
}
