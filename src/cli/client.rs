use std::fmt;

use log::trace;

use crate::cli::options::Options;
use crate::cli::report::ReportError;
use crate::commons::error::{CaIoError, Error as CaError};
use crate::config::{Config, ConfigError};

/// Command line tool operating the CA.
pub struct LedgerClient;

impl LedgerClient {
    /// Runs the command given in the options and prints the result.
    ///
    /// Errors are left for the caller to report.
    pub fn report(options: Options) -> Result<(), Error> {
        let format = options.general.format;
        let config = Config::create(&options.general.config)?;

        trace!("Running command with config '{}'", options.general.config.display());
        let res = options.command.run(&config)?;

        let text = res.report(format)?;
        if text.ends_with('\n') {
            print!("{}", text);
        } else {
            println!("{}", text);
        }
        Ok(())
    }
}

//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    Config(ConfigError),
    Ca(CaError),
    Report(ReportError),
    Io(CaIoError),
}

impl Error {
    /// Returns the exit code for the process.
    ///
    /// Errors that make the CA unusable get their own code, so that scripts
    /// can tell them from failed requests.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Ca(e) if e.is_fatal() => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Ca(e) => e.fmt(f),
            Error::Report(e) => e.fmt(f),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<CaError> for Error {
    fn from(e: CaError) -> Self {
        Error::Ca(e)
    }
}

impl From<ReportError> for Error {
    fn from(e: ReportError) -> Self {
        Error::Report(e)
    }
}

impl From<CaIoError> for Error {
    fn from(e: CaIoError) -> Self {
        Error::Io(e)
    }
}
