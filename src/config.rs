//! Configuration of the CA: where it lives, its issuance policy, and how
//! it logs.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{env, fmt, fs, io};

use log::{error, info, LevelFilter};
use serde::de;
use serde::{Deserialize, Deserializer};
#[cfg(unix)]
use syslog::Facility;

use crate::ca::KeyAlgorithm;
use crate::commons::util::ext_serde;
use crate::constants::*;

//------------ ConfigDefaults ------------------------------------------------

pub struct ConfigDefaults;

impl ConfigDefaults {
    pub fn base_dir() -> PathBuf {
        PathBuf::from("./my-root-ca")
    }

    pub fn cert_validity_days() -> u32 {
        825
    }

    pub fn crl_validity_days() -> u32 {
        30
    }

    pub fn key_algorithm() -> KeyAlgorithm {
        KeyAlgorithm::Rsa2048
    }

    pub fn lock_timeout_seconds() -> u64 {
        30
    }

    pub fn log_level() -> LevelFilter {
        match env::var(LEDGERCA_ENV_LOG_LEVEL) {
            Ok(level) => match LevelFilter::from_str(&level) {
                Ok(level) => level,
                Err(_) => {
                    eprintln!("Unrecognized value for log level in env var {}", LEDGERCA_ENV_LOG_LEVEL);
                    ::std::process::exit(1);
                }
            },
            _ => LevelFilter::Info,
        }
    }

    pub fn log_type() -> LogType {
        match env::var(LEDGERCA_ENV_LOG_TYPE) {
            Ok(log_type) => match LogType::from_str(&log_type) {
                Ok(log_type) => log_type,
                Err(_) => {
                    eprintln!("Unrecognized value for log type in env var {}", LEDGERCA_ENV_LOG_TYPE);
                    ::std::process::exit(1);
                }
            },
            _ => LogType::Stderr,
        }
    }

    pub fn log_file() -> PathBuf {
        PathBuf::from("./ledgerca.log")
    }

    pub fn syslog_facility() -> String {
        "daemon".to_string()
    }
}

//------------ Config --------------------------------------------------------

/// Global configuration for the CA.
///
/// Paths that are not set explicitly are derived from `base_dir`, using
/// the layout of a classic OpenSSL CA directory.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "ConfigDefaults::base_dir")]
    pub base_dir: PathBuf,

    #[serde(default)]
    ca_dir: Option<PathBuf>,

    #[serde(default)]
    issued_dir: Option<PathBuf>,

    #[serde(default)]
    archive_dir: Option<PathBuf>,

    #[serde(default)]
    ca_cert_file: Option<PathBuf>,

    #[serde(default)]
    ca_key_file: Option<PathBuf>,

    #[serde(default)]
    ca_key_passphrase_file: Option<PathBuf>,

    #[serde(default = "ConfigDefaults::cert_validity_days")]
    pub cert_validity_days: u32,

    #[serde(default = "ConfigDefaults::crl_validity_days")]
    pub crl_validity_days: u32,

    #[serde(default = "ConfigDefaults::key_algorithm")]
    pub key_algorithm: KeyAlgorithm,

    /// URI put in the CRL distribution points of issued certificates.
    #[serde(default)]
    pub crl_distribution_point: Option<String>,

    /// If set, each issued certificate also gets a PKCS#12 bundle
    /// protected with this password.
    #[serde(default)]
    pub pkcs12_password: Option<String>,

    #[serde(default = "ConfigDefaults::lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,

    /// Whether renewing a certificate revokes the one it replaces.
    #[serde(default)]
    pub renewal_revokes_previous: bool,

    #[serde(
        default = "ConfigDefaults::log_level",
        deserialize_with = "ext_serde::de_level_filter"
    )]
    pub log_level: LevelFilter,

    #[serde(default = "ConfigDefaults::log_type")]
    pub log_type: LogType,

    #[serde(default = "ConfigDefaults::log_file")]
    pub log_file: PathBuf,

    #[serde(default = "ConfigDefaults::syslog_facility")]
    pub syslog_facility: String,
}

/// # Paths
impl Config {
    pub fn ca_dir(&self) -> PathBuf {
        self.ca_dir.clone().unwrap_or_else(|| self.base_dir.join(CA_DIR))
    }

    pub fn issued_dir(&self) -> PathBuf {
        self.issued_dir.clone().unwrap_or_else(|| self.base_dir.join(ISSUED_DIR))
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir.clone().unwrap_or_else(|| self.issued_dir().join(ARCHIVE_DIR))
    }

    pub fn ca_cert_file(&self) -> PathBuf {
        self.ca_cert_file
            .clone()
            .unwrap_or_else(|| self.ca_dir().join(CA_CERTS_DIR).join(CA_CERT_FILE))
    }

    pub fn ca_key_file(&self) -> PathBuf {
        self.ca_key_file
            .clone()
            .unwrap_or_else(|| self.ca_dir().join(CA_PRIVATE_DIR).join(CA_KEY_FILE))
    }

    /// Returns the file with the passphrase of the CA key, if any.
    ///
    /// Without an explicit setting, `private/ca.pass` under the CA dir is
    /// used when it exists.
    pub fn ca_key_passphrase_file(&self) -> Option<PathBuf> {
        match &self.ca_key_passphrase_file {
            Some(path) => Some(path.clone()),
            None => {
                let path = self.ca_dir().join(CA_PRIVATE_DIR).join(CA_PASS_FILE);
                path.is_file().then_some(path)
            }
        }
    }

    pub fn index_file(&self) -> PathBuf {
        self.ca_dir().join(INDEX_FILE)
    }

    pub fn serial_file(&self) -> PathBuf {
        self.ca_dir().join(SERIAL_FILE)
    }

    pub fn crl_number_file(&self) -> PathBuf {
        self.ca_dir().join(CRL_NUMBER_FILE)
    }

    pub fn crl_dir(&self) -> PathBuf {
        self.ca_dir().join(CA_CRL_DIR)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.ca_dir().join(LOCK_FILE)
    }

    pub fn journal_file(&self) -> PathBuf {
        self.ca_dir().join(REVOCATION_JOURNAL_FILE)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }
}

/// # Create
impl Config {
    /// Returns a configuration with all defaults under the given base dir.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Config {
            base_dir: base_dir.into(),
            ca_dir: None,
            issued_dir: None,
            archive_dir: None,
            ca_cert_file: None,
            ca_key_file: None,
            ca_key_passphrase_file: None,
            cert_validity_days: ConfigDefaults::cert_validity_days(),
            crl_validity_days: ConfigDefaults::crl_validity_days(),
            key_algorithm: ConfigDefaults::key_algorithm(),
            crl_distribution_point: None,
            pkcs12_password: None,
            lock_timeout_seconds: ConfigDefaults::lock_timeout_seconds(),
            renewal_revokes_previous: false,
            log_level: LevelFilter::Info,
            log_type: LogType::Stderr,
            log_file: ConfigDefaults::log_file(),
            syslog_facility: ConfigDefaults::syslog_facility(),
        }
    }

    /// Returns a fast configuration for tests.
    pub fn test(base_dir: &Path) -> Self {
        let mut config = Self::with_base_dir(base_dir);
        config.key_algorithm = KeyAlgorithm::EcP256;
        config.lock_timeout_seconds = 5;
        config.log_level = LevelFilter::Debug;
        config
    }

    /// Creates the config at startup.
    ///
    /// Reads the file, sets up logging, and checks the values.
    pub fn create(config_file: &Path) -> Result<Self, ConfigError> {
        let config = match Self::read_config(config_file) {
            Err(e) => {
                if config_file == Path::new(LEDGERCA_DEFAULT_CONFIG_FILE) && !config_file.exists() {
                    Err(ConfigError::other(
                        "Cannot find config file. Please use --config to specify its location.",
                    ))
                } else {
                    Err(ConfigError::Other(format!(
                        "Error parsing config file: {}, error: {}",
                        config_file.display(),
                        e
                    )))
                }
            }
            Ok(config) => {
                config.init_logging()?;
                info!("{} uses configuration file: {}", LEDGERCA_APP, config_file.display());
                Ok(config)
            }
        }?;
        config.verify().map_err(|e| {
            ConfigError::Other(format!(
                "Error parsing config file: {}, error: {}",
                config_file.display(),
                e
            ))
        })?;
        Ok(config)
    }

    pub fn verify(&self) -> Result<(), ConfigError> {
        if self.cert_validity_days == 0 || self.cert_validity_days > MAX_VALIDITY_DAYS {
            return Err(ConfigError::Other(format!(
                "cert_validity_days must be between 1 and {}",
                MAX_VALIDITY_DAYS
            )));
        }

        if self.crl_validity_days == 0 {
            return Err(ConfigError::other("crl_validity_days must be at least 1"));
        }

        if self.crl_validity_days > self.cert_validity_days {
            return Err(ConfigError::other(
                "crl_validity_days must not be longer than cert_validity_days",
            ));
        }

        if self.lock_timeout_seconds == 0 {
            return Err(ConfigError::other("lock_timeout_seconds must be at least 1"));
        }

        if let Some(password) = &self.pkcs12_password {
            if password.is_empty() {
                return Err(ConfigError::other("pkcs12_password must not be empty when set"));
            }
        }

        Ok(())
    }

    pub fn read_config(file: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(file)?;
        let c: Config = toml::from_str(&s)?;
        Ok(c)
    }
}

/// # Logging
impl Config {
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        match self.log_type {
            LogType::File => self.file_logger(&self.log_file),
            LogType::Stderr => self.stderr_logger(),
            #[cfg(unix)]
            LogType::Syslog => {
                let facility = Facility::from_str(&self.syslog_facility)
                    .map_err(|_| ConfigError::other("Invalid syslog_facility"))?;
                self.syslog_logger(facility)
            }
            #[cfg(not(unix))]
            LogType::Syslog => Err(ConfigError::other("Syslog is only supported on unix systems")),
        }
    }

    /// Creates a stderr logger.
    fn stderr_logger(&self) -> Result<(), ConfigError> {
        self.fern_logger()
            .chain(io::stderr())
            .apply()
            .map_err(|e| ConfigError::Other(format!("Failed to init stderr logging: {}", e)))
    }

    /// Creates a file logger using the file provided by `path`.
    fn file_logger(&self, path: &Path) -> Result<(), ConfigError> {
        let file = match fern::log_file(path) {
            Ok(file) => file,
            Err(err) => {
                let error_string = format!("Failed to open log file '{}': {}", path.display(), err);
                error!("{}", error_string.as_str());
                return Err(ConfigError::Other(error_string));
            }
        };
        self.fern_logger()
            .chain(file)
            .apply()
            .map_err(|e| ConfigError::Other(format!("Failed to init file logging: {}", e)))
    }

    /// Creates a syslog logger and configures correctly.
    #[cfg(unix)]
    fn syslog_logger(&self, facility: syslog::Facility) -> Result<(), ConfigError> {
        let process = env::current_exe()
            .ok()
            .and_then(|path| {
                path.file_name()
                    .and_then(std::ffi::OsStr::to_str)
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| String::from(LEDGERCA_APP));
        let formatter = syslog::Formatter3164 {
            facility,
            hostname: None,
            process,
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter.clone())
            .or_else(|_| syslog::tcp(formatter.clone(), ("127.0.0.1", 601)))
            .or_else(|_| syslog::udp(formatter, ("127.0.0.1", 0), ("127.0.0.1", 514)));
        match logger {
            Ok(logger) => self
                .fern_logger()
                .chain(logger)
                .apply()
                .map_err(|e| ConfigError::Other(format!("Failed to init syslog: {}", e))),
            Err(err) => {
                let msg = format!("Cannot connect to syslog: {}", err);
                Err(ConfigError::Other(msg))
            }
        }
    }

    /// Creates and returns a fern logger with log level tweaks
    fn fern_logger(&self) -> fern::Dispatch {
        // file level chatter from the store only shows up when tracing
        let file_level = self.log_level.min(LevelFilter::Debug);

        let show_target = self.log_level == LevelFilter::Trace || self.log_level == LevelFilter::Debug;
        fern::Dispatch::new()
            .format(move |out, message, record| {
                if show_target {
                    out.finish(format_args!(
                        "{} [{}] [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        record.target(),
                        message
                    ))
                } else {
                    out.finish(format_args!(
                        "{} [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        message
                    ))
                }
            })
            .level(self.log_level)
            .level_for("ledgerca::commons::util::file", file_level)
    }
}

//------------ ConfigError ---------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    TomlError(toml::de::Error),
    Other(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => e.fmt(f),
            ConfigError::TomlError(e) => e.fmt(f),
            ConfigError::Other(s) => s.fmt(f),
        }
    }
}

impl ConfigError {
    pub fn other(s: &str) -> ConfigError {
        ConfigError::Other(s.to_string())
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::IoError(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::TomlError(e)
    }
}

//------------ LogType -------------------------------------------------------

/// The target to log to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogType {
    Stderr,
    File,
    Syslog,
}

impl FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stderr" => Ok(LogType::Stderr),
            "file" => Ok(LogType::File),
            "syslog" => Ok(LogType::Syslog),
            _ => Err(format!(
                "expected \"stderr\", \"file\", or \"syslog\", found : \"{}\"",
                s
            )),
        }
    }
}

impl<'de> Deserialize<'de> for LogType {
    fn deserialize<D>(d: D) -> Result<LogType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        LogType::from_str(&string).map_err(de::Error::custom)
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_default_config_file() {
        let c = Config::read_config(Path::new("./defaults/ledgerca.conf")).unwrap();
        c.verify().unwrap();
        assert_eq!(c.base_dir, PathBuf::from("./my-root-ca"));
        assert_eq!(c.cert_validity_days, 825);
        assert_eq!(c.key_algorithm, KeyAlgorithm::Rsa2048);
        assert!(!c.renewal_revokes_previous);
    }

    #[test]
    fn paths_derive_from_base_dir() {
        let c: Config = toml::from_str(r#"base_dir = "/srv/ca""#).unwrap();
        assert_eq!(c.ca_dir(), PathBuf::from("/srv/ca/ca"));
        assert_eq!(c.issued_dir(), PathBuf::from("/srv/ca/issued"));
        assert_eq!(c.archive_dir(), PathBuf::from("/srv/ca/issued/archive"));
        assert_eq!(c.ca_cert_file(), PathBuf::from("/srv/ca/ca/certs/ca.cert.pem"));
        assert_eq!(c.ca_key_file(), PathBuf::from("/srv/ca/ca/private/ca.key.pem"));
        assert_eq!(c.index_file(), PathBuf::from("/srv/ca/ca/index.txt"));
        assert_eq!(c.crl_dir(), PathBuf::from("/srv/ca/ca/crl"));
    }

    #[test]
    fn explicit_paths_win() {
        let c: Config = toml::from_str(
            r#"
            base_dir = "/srv/ca"
            issued_dir = "/var/certs"
            ca_cert_file = "/srv/ca/certs/ca.cert.pem"
            key_algorithm = "ec-p256"
            log_level = "debug"
            log_type = "file"
            "#,
        )
        .unwrap();
        assert_eq!(c.archive_dir(), PathBuf::from("/var/certs/archive"));
        assert_eq!(c.ca_cert_file(), PathBuf::from("/srv/ca/certs/ca.cert.pem"));
        assert_eq!(c.key_algorithm, KeyAlgorithm::EcP256);
        assert_eq!(c.log_level, LevelFilter::Debug);
        assert_eq!(c.log_type, LogType::File);
    }

    #[test]
    fn verify_rejects_bad_timing() {
        let mut c = Config::with_base_dir("/tmp/ca");
        c.crl_validity_days = 0;
        assert!(c.verify().is_err());

        let mut c = Config::with_base_dir("/tmp/ca");
        c.crl_validity_days = 900;
        assert!(c.verify().is_err());

        let mut c = Config::with_base_dir("/tmp/ca");
        c.lock_timeout_seconds = 0;
        assert!(c.verify().is_err());

        let mut c = Config::with_base_dir("/tmp/ca");
        c.cert_validity_days = u32::MAX;
        assert!(c.verify().is_err());

        let mut c = Config::with_base_dir("/tmp/ca");
        c.cert_validity_days = MAX_VALIDITY_DAYS;
        assert!(c.verify().is_ok());

        assert!(toml::from_str::<Config>(r#"log_type = "journald""#).is_err());
        assert!(toml::from_str::<Config>(r#"key_algorithm = "dsa""#).is_err());
    }
}
