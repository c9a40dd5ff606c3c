use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    InvalidArgs(String),
    Bind { core: usize, source: io::Error },
    Thread(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::InvalidArgs(msg) => write!(f, "invalid arguments: {}", msg),
            Error::Bind { core, source } => {
                write!(f, "failed to wire thread to core {}: {}", core, source)
            }
            Error::Thread(msg) => write!(f, "thread error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_io() {
        let err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let msg = format!("{}", err);
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_display_invalid_args() {
        let err = Error::InvalidArgs("bad value".into());
        let msg = format!("{}", err);
        assert!(msg.contains("invalid arguments"));
        assert!(msg.contains("bad value"));
    }

    #[test]
    fn test_display_bind() {
        let err = Error::Bind {
            core: 3,
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("core 3"));
        assert!(msg.contains("denied"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_display_thread() {
        let err = Error::Thread("worker 2 panicked".into());
        let msg = format!("{}", err);
        assert!(msg.contains("thread error"));
        assert!(msg.contains("worker 2"));
        assert!(err.source().is_none());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            _ => panic!("expected Error::Io"),
        }
    }
}
