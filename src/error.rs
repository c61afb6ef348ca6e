use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DepError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Hook failed: {0}")]
    Hook(String),

    #[error("Failed to parse manifest '{}': {message}", path.display())]
    ManifestParse { path: PathBuf, message: String },

    #[error("Provider API error: {0}")]
    Provider(String),

    #[error("Project validation failed: {0}")]
    ProjectValidation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl DepError {
    pub fn manifest_parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        DepError::ManifestParse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DepError>;
