use thiserror::Error;

/// Errors surfaced by the single-instance subsystem.
///
/// Transient conditions (a lock file vanishing mid-acquisition, a failed
/// `accept`, a rejected password) are handled inside the retry loops and
/// never appear here; only conditions the caller must act on do.
#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed lock record: {0}")]
    MalformedRecord(String),

    #[error("unexpected protocol header from leader")]
    HeaderMismatch,

    #[error("no free port in {start}..={end} after {tries} attempts")]
    NoSocket { start: u16, end: u16, tries: u32 },

    #[error("cannot get lock after {0} attempts")]
    LockUnavailable(u32),

    #[error("command executor is not ready")]
    NotReady,

    #[error("command was already forwarded to the leader")]
    AlreadySent,
}

pub type InstanceResult<T> = Result<T, InstanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InstanceError::MalformedRecord("missing ':' separator".to_string());
        assert_eq!(
            format!("{}", err),
            "malformed lock record: missing ':' separator"
        );

        let err = InstanceError::NoSocket {
            start: 4000,
            end: 10000,
            tries: 10,
        };
        assert_eq!(
            format!("{}", err),
            "no free port in 4000..=10000 after 10 attempts"
        );
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: InstanceError = io_err.into();
        assert!(err.source().is_some());
    }
}
