use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Stack file not found. Looked in:\n\
        - current directory: stackweave.local.yaml, .stackweave.local.yaml, stackweave.yaml, .stackweave.yaml\n\
        - ./.stackweave/ directory\n\
        - ~/.config/stackweave/stackweave.yaml\n\
        Set STACKWEAVE_CONFIG to point at a file directly"
    )]
    StackFileNotFound,

    #[error("Invalid stack file: {path}\nReason: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
