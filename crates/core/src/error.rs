use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("method must be 'ts' or 'vec', got '{0}'")]
    UnknownMethod(String),

    #[error("unrecognized {key} value '{value}'")]
    InvalidSetting { key: &'static str, value: String },
}
