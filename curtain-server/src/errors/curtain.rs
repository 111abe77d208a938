use axum::http::StatusCode;
use curtain_link::LinkError;

#[derive(Debug, thiserror::Error)]
pub enum CurtainError {
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("Invalid speed: {0}")]
    InvalidSpeed(i64),

    #[error("Device not connected")]
    NotConnected,

    #[error(transparent)]
    Link(LinkError),
}

impl From<LinkError> for CurtainError {
    fn from(error: LinkError) -> Self {
        match error {
            LinkError::NotConnected => CurtainError::NotConnected,
            other => CurtainError::Link(other),
        }
    }
}

impl CurtainError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CurtainError::InvalidAction(_) => StatusCode::BAD_REQUEST,
            CurtainError::InvalidMode(_) => StatusCode::BAD_REQUEST,
            CurtainError::InvalidSpeed(_) => StatusCode::BAD_REQUEST,
            CurtainError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            CurtainError::Link(LinkError::InvalidCommand(_) | LinkError::InvalidParameter { .. }) => {
                StatusCode::BAD_REQUEST
            }
            CurtainError::Link(LinkError::NotConnected) => StatusCode::SERVICE_UNAVAILABLE,
            CurtainError::Link(LinkError::Open { .. } | LinkError::Transport(_)) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            CurtainError::from(LinkError::NotConnected).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            CurtainError::from(LinkError::Transport(io::ErrorKind::TimedOut.into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            CurtainError::from(LinkError::InvalidCommand("A:B".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(CurtainError::InvalidAction("spin".into()).status_code(), StatusCode::BAD_REQUEST);
    }
}
