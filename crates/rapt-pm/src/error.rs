use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaptError {
    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    // Metadata errors
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error(transparent)]
    Version(#[from] rapt_version::VersionError),

    #[error(transparent)]
    Relation(#[from] rapt_version::RelationError),

    // Request errors
    #[error("unable to re-schedule package '{0}'")]
    Reschedule(String),

    #[error("no version of package '{name}' available")]
    NoAvailableVersion { name: String },

    // Resolution errors
    #[error("unable to resolve dependencies, because of:\n\n{explanation}")]
    NoSolution { explanation: String },

    // Planning errors
    #[error("planning error: {0}")]
    Planning(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RaptError>;
