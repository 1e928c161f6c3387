//! Cell representative error types.

use thiserror::Error;

use cellrep_client::ClientError;

#[derive(Debug, Error)]
pub enum RepError {
    #[error("internal cell healthcheck failed")]
    CellUnhealthy,

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("failed to load TLS credentials: {0}")]
    Credentials(#[from] ClientError),

    #[error("tls configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("client verifier error: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type RepResult<T> = Result<T, RepError>;
