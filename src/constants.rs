//! Various crate-wide constants.

use std::time::Duration;


//------------ Binary Names -------------------------------------------------

/// The friendly name of the `ledgerca` binary.
pub const LEDGERCA_APP: &str = "ledgerca";


//------------ Config Files Paths -------------------------------------------

/// The default path to the config file.
pub const LEDGERCA_DEFAULT_CONFIG_FILE: &str = "./ledgerca.conf";


//------------ Environment Variables ----------------------------------------

/// The environment variable with the path to the config file.
pub const LEDGERCA_ENV_CONFIG: &str = "LEDGERCA_CONFIG";

/// The environment variable with the log level.
///
/// The variable should contain the name of a [`log::LevelFilter`]. It will
/// be overwritten by the config file. The default is “info.”
pub const LEDGERCA_ENV_LOG_LEVEL: &str = "LEDGERCA_LOG_LEVEL";

/// The environment variable with the log target.
///
/// The variable should contain the name of a
/// [`LogType`][crate::config::LogType]. It will be overwritten by the
/// config file. The default is “stderr.”
pub const LEDGERCA_ENV_LOG_TYPE: &str = "LEDGERCA_LOG_TYPE";


//------------ CA Directory Layout ------------------------------------------

/// The directory under the base dir holding the CA itself.
pub const CA_DIR: &str = "ca";

/// The directory under the base dir holding issued certificates.
pub const ISSUED_DIR: &str = "issued";

/// The directory under the issued dir holding archived file sets.
pub const ARCHIVE_DIR: &str = "archive";

/// The sub-directory of the CA dir with the CA certificate.
pub const CA_CERTS_DIR: &str = "certs";

/// The sub-directory of the CA dir with the CA private key.
pub const CA_PRIVATE_DIR: &str = "private";

/// The sub-directory of the CA dir with the published CRL.
pub const CA_CRL_DIR: &str = "crl";

/// The file name of the CA certificate.
pub const CA_CERT_FILE: &str = "ca.cert.pem";

/// The file name of the CA private key.
pub const CA_KEY_FILE: &str = "ca.key.pem";

/// The file name of the CA key passphrase.
pub const CA_PASS_FILE: &str = "ca.pass";

/// The file name of the index ledger.
pub const INDEX_FILE: &str = "index.txt";

/// The file name of the next serial number.
pub const SERIAL_FILE: &str = "serial";

/// The file name of the next CRL number.
pub const CRL_NUMBER_FILE: &str = "crlnumber";

/// The file name of the PEM encoded CRL.
pub const CRL_PEM_FILE: &str = "ca.crl.pem";

/// The file name of the DER encoded CRL.
pub const CRL_DER_FILE: &str = "ca.crl";

/// The file name of the CA-wide lock.
pub const LOCK_FILE: &str = ".lock";

/// The file name of the revocation write-ahead journal.
pub const REVOCATION_JOURNAL_FILE: &str = "revocation.journal";

/// The first CRL number handed out by a new CA.
///
/// The `crlnumber` file is hexadecimal, so a new CA's file reads `1000`.
pub const INITIAL_CRL_NUMBER: u64 = 0x1000;


/// The longest validity accepted for any certificate, in days.
pub const MAX_VALIDITY_DAYS: u32 = 36_500;


//------------ Content Types --------------------------------------------------

/// The content type of the PEM encoded CRL.
pub const CRL_PEM_CONTENT_TYPE: &str = "application/x-pem-file";

/// The content type of the DER encoded CRL.
pub const CRL_DER_CONTENT_TYPE: &str = "application/pkix-crl";


//------------ Timing ----------------------------------------------------------

/// How often to retry a contended CA lock.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);
