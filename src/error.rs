use thiserror::Error;

/// Coarse grouping of [`TripError`] used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    StateConflict,
    HandoffProof,
    UpstreamUnavailable,
    Internal,
}

#[derive(Debug, Error)]
pub enum TripError {
    #[error("{0}")]
    Validation(String),
    #[error("trip not found")]
    NotFound,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    InvalidMode(&'static str),
    #[error("trip is not open for requests")]
    NotOpen,
    #[error("trip is not in requested state")]
    NotRequested,
    #[error("trip is not in confirmed state")]
    WrongState,
    #[error("only ongoing trips can be completed")]
    NotOngoing,
    #[error("trip can no longer be cancelled")]
    TerminalState,
    #[error("trip state changed, refresh and try again")]
    Conflict,
    #[error("invalid OTP")]
    InvalidOtp,
    #[error("OTP has expired, ask the trip owner for a new code")]
    OtpExpired,
    #[error("too many wrong OTP attempts, ask the trip owner for a new code")]
    OtpLocked,
    #[error("route unavailable: {0}")]
    RouteUnavailable(String),
    #[error("trip store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TripError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TripError::Validation(_) => ErrorKind::Validation,
            TripError::NotFound => ErrorKind::NotFound,
            TripError::Forbidden(_) | TripError::InvalidMode(_) => ErrorKind::Forbidden,
            TripError::NotOpen
            | TripError::NotRequested
            | TripError::WrongState
            | TripError::NotOngoing
            | TripError::TerminalState
            | TripError::Conflict => ErrorKind::StateConflict,
            TripError::InvalidOtp | TripError::OtpExpired | TripError::OtpLocked => {
                ErrorKind::HandoffProof
            }
            TripError::RouteUnavailable(_) | TripError::StoreUnavailable(_) => {
                ErrorKind::UpstreamUnavailable
            }
            TripError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code sent back to clients.
    pub fn code(&self) -> &'static str {
        match self {
            TripError::Validation(_) => "VALIDATION_ERROR",
            TripError::NotFound => "NOT_FOUND",
            TripError::Forbidden(_) => "FORBIDDEN",
            TripError::InvalidMode(_) => "INVALID_MODE",
            TripError::NotOpen => "NOT_OPEN",
            TripError::NotRequested => "NOT_REQUESTED",
            TripError::WrongState => "WRONG_STATE",
            TripError::NotOngoing => "NOT_ONGOING",
            TripError::TerminalState => "TERMINAL_STATE",
            TripError::Conflict => "STATE_CONFLICT",
            TripError::InvalidOtp => "INVALID_OTP",
            TripError::OtpExpired => "OTP_EXPIRED",
            TripError::OtpLocked => "OTP_LOCKED",
            TripError::RouteUnavailable(_) => "ROUTE_UNAVAILABLE",
            TripError::StoreUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            TripError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Only upstream failures are worth retrying, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::UpstreamUnavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_race_is_a_state_conflict() {
        assert_eq!(TripError::Conflict.kind(), ErrorKind::StateConflict);
        assert_eq!(TripError::NotOpen.kind(), ErrorKind::StateConflict);
        assert!(!TripError::Conflict.is_retryable());
    }

    #[test]
    fn upstream_failures_are_retryable() {
        let err = TripError::RouteUnavailable("timeout".into());
        assert!(err.is_retryable());
        assert_eq!(err.code(), "ROUTE_UNAVAILABLE");
        assert!(!TripError::InvalidOtp.is_retryable());
    }
}
