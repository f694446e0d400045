use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Backing errors for all cluster lifecycle operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid spec, unknown region, or missing credentials.
    #[error("invalid configuration: {message}")]
    Config { message: String },
    /// The generated bundle and the live fleet disagree.
    #[error("cluster state drift: {message}")]
    Consistency { message: String },
    #[error("failed API: {message}")]
    API { message: String, is_retryable: bool },
    /// The external config-generation tool failed.
    #[error("failed external tool: {message}")]
    Tool { message: String },
    /// A single remote copy or execute call failed.
    #[error("failed remote operation: {message}")]
    Remote { message: String },
    #[error("failed local I/O: {message}")]
    Io { message: String },
}

impl Error {
    /// Returns the error message in "String".
    #[inline]
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Error::Config { message }
            | Error::Consistency { message }
            | Error::API { message, .. }
            | Error::Tool { message }
            | Error::Remote { message }
            | Error::Io { message } => message.clone(),
        }
    }

    /// Returns if the error is retryable.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::API { is_retryable, .. } => *is_retryable,
            _ => false,
        }
    }

    /// Returns true if the error must stop the whole pipeline.
    /// Remote errors are scoped to one node and one step.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Remote { .. })
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io {
            message: e.to_string(),
        }
    }
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- errors::test_error_kinds --exact --show-output
#[test]
fn test_error_kinds() {
    let _ = env_logger::builder().is_test(true).try_init();

    let e = Error::Remote {
        message: String::from("scp exited 1"),
    };
    assert!(!e.is_fatal());
    assert!(!e.is_retryable());
    assert_eq!(e.message(), "scp exited 1");

    let e = Error::API {
        message: String::from("throttled"),
        is_retryable: true,
    };
    assert!(e.is_fatal());
    assert!(e.is_retryable());

    let e = Error::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
    assert!(matches!(e, Error::Io { .. }));
    assert!(e.is_fatal());
    log::info!("{}", e);
}
