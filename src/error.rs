use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("The portal rejected the supplied credentials")]
    InvalidCredentials,

    #[error("The portal session has expired or is not recognized")]
    InvalidSession,

    #[error("Requested scorecard was not found: {0}")]
    NotFound(String),

    #[error("Unexpected response from the portal: {0}")]
    UnexpectedPortalResponse(String),

    #[error("Portal unreachable: {0}")]
    PortalUnreachable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PortalError::PortalUnreachable(format!("request timed out: {}", err))
        } else {
            PortalError::PortalUnreachable(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;
