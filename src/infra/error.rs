use std::net::SocketAddr;

use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Failures while bringing up or talking to external resources.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server stopped unexpectedly")]
    Serve(#[source] std::io::Error),
    #[error("failed to connect to the database")]
    Connect(#[source] sqlx::Error),
    #[error("database migrations failed")]
    Migrate(#[from] MigrateError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind { addr, source }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
