//! Defines all certificate authority errors.

use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;
use std::{error, fmt, io};

use crate::ca::Serial;
use crate::config::ConfigError;


//------------ CaIoError -----------------------------------------------------

/// An I/O error together with what we were trying to do at the time.
#[derive(Debug)]
pub struct CaIoError {
    context: Cow<'static, str>,
    cause: io::Error,
}

impl CaIoError {
    pub fn new(context: impl Into<Cow<'static, str>>, cause: io::Error) -> Self {
        CaIoError { context: context.into(), cause }
    }

    /// Creates an error for an operation on the given path.
    pub fn for_path(action: &str, path: &Path, cause: io::Error) -> Self {
        Self::new(format!("{} '{}'", action, path.display()), cause)
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.cause.kind()
    }
}

impl fmt::Display for CaIoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.cause)
    }
}

impl error::Error for CaIoError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.cause)
    }
}


//------------ Error ---------------------------------------------------------

/// Errors returned by the engines operating on the CA.
///
/// Only [`Error::CaKeyUnavailable`] and [`Error::LedgerCorrupt`] are fatal
/// to the process, see [`Error::is_fatal`]. Everything else concerns a
/// single request and can be retried or reported to an operator.
#[derive(Debug)]
pub enum Error {
    /// The common name or a subject alternative name was rejected.
    InvalidSubject(String),

    /// The CA could not sign a request for the given subject.
    SigningFailure { subject: String, reason: String },

    /// Writing to the certificate store, ledger, or CRL files failed.
    StoreWriteFailure(CaIoError),

    /// No certificate is known under this serial.
    NotFound(String),

    /// The certificate with this serial was revoked before.
    AlreadyRevoked(Serial),

    /// A certificate file could not be read or parsed.
    ExtractionFailure { file: String, reason: String },

    /// The CRL could not be regenerated.
    CrlRegenerationFailure(String),

    /// The CA-wide lock could not be acquired in time.
    LockTimeout(Duration),

    /// The root CA key or certificate cannot be used.
    CaKeyUnavailable(String),

    /// The index ledger cannot be parsed.
    LedgerCorrupt { line: usize, reason: String },

    /// The configuration is unusable.
    Config(ConfigError),
}

impl Error {
    pub fn invalid_subject(msg: impl fmt::Display) -> Self {
        Error::InvalidSubject(msg.to_string())
    }

    pub fn signing(subject: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Error::SigningFailure {
            subject: subject.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn io(context: impl Into<Cow<'static, str>>, err: io::Error) -> Self {
        Error::StoreWriteFailure(CaIoError::new(context, err))
    }

    pub fn extraction(file: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Error::ExtractionFailure {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn crl(reason: impl fmt::Display) -> Self {
        Error::CrlRegenerationFailure(reason.to_string())
    }

    pub fn ca_key(reason: impl fmt::Display) -> Self {
        Error::CaKeyUnavailable(reason.to_string())
    }

    pub fn ledger(line: usize, reason: impl fmt::Display) -> Self {
        Error::LedgerCorrupt { line, reason: reason.to_string() }
    }

    /// Returns whether the process should stop using this CA.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CaKeyUnavailable(_) | Error::LedgerCorrupt { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidSubject(msg) => write!(f, "Invalid subject: {}", msg),
            Error::SigningFailure { subject, reason } => {
                write!(f, "Could not sign certificate for '{}': {}", subject, reason)
            }
            Error::StoreWriteFailure(e) => write!(f, "Store write failure: {}", e),
            Error::NotFound(serial) => write!(f, "No certificate found with serial '{}'", serial),
            Error::AlreadyRevoked(serial) => write!(f, "Certificate with serial '{}' is already revoked", serial),
            Error::ExtractionFailure { file, reason } => {
                write!(f, "Could not read certificate '{}': {}", file, reason)
            }
            Error::CrlRegenerationFailure(reason) => write!(f, "Could not regenerate CRL: {}", reason),
            Error::LockTimeout(timeout) => {
                write!(f, "Could not acquire the CA lock within {} seconds", timeout.as_secs())
            }
            Error::CaKeyUnavailable(reason) => write!(f, "Root CA key unavailable: {}", reason),
            Error::LedgerCorrupt { line, reason } => {
                write!(f, "Index ledger corrupt at line {}: {}", line, reason)
            }
            Error::Config(e) => e.fmt(f),
        }
    }
}

impl error::Error for Error {}

impl From<CaIoError> for Error {
    fn from(e: CaIoError) -> Self {
        Error::StoreWriteFailure(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_key_and_ledger_errors_are_fatal() {
        assert!(Error::ca_key("gone").is_fatal());
        assert!(Error::ledger(3, "bad status").is_fatal());
        assert!(!Error::NotFound("FFFFFF".into()).is_fatal());
        assert!(!Error::LockTimeout(Duration::from_secs(1)).is_fatal());
        assert!(!Error::io("writing", io::Error::other("disk full")).is_fatal());
    }

    #[test]
    fn messages_name_the_subject_of_the_failure() {
        let err = Error::NotFound("FFFFFF".into());
        assert_eq!(err.to_string(), "No certificate found with serial 'FFFFFF'");

        let err = Error::extraction("web.cert.pem", "bad PEM");
        assert!(err.to_string().contains("web.cert.pem"));
    }
}
