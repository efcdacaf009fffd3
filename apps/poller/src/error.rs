use thiserror::Error;

use crate::client::ClientError;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Control plane client error: {0}")]
    Client(#[from] ClientError),
    #[error("Failed to register: {0}")]
    Register(#[source] ClientError),
    #[error("Failed to set up checks: {0:#}")]
    Setup(#[from] anyhow::Error),
}
