#![allow(dead_code)] // Different tests use different parts.

use std::path::Path;

use ledgerca::ca::{AuthorityContext, CrlBundle, RootCa};
use ledgerca::config::Config;
use openssl::x509::{X509Crl, X509};
use tempfile::TempDir;

pub const NONE: [&str; 0] = [];

/// Sends log output to stderr, where the test harness captures it.
pub fn init_logging() {
    let _ = stderrlog::new().verbosity(3).init();
}

//------------ TestCa --------------------------------------------------------

/// A root CA in a temporary directory.
///
/// The directory is removed when the value is dropped.
pub struct TestCa {
    pub dir: TempDir,
    pub config: Config,
}

impl TestCa {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Creates a CA after letting `adjust` change the test config.
    pub fn with_config<F: FnOnce(&mut Config)>(adjust: F) -> Self {
        init_logging();
        let dir = TempDir::new().unwrap();
        let mut config = Config::test(dir.path());
        adjust(&mut config);
        RootCa::create(&config, "Integration Root CA", 365).unwrap();
        TestCa { dir, config }
    }

    pub fn open(&self) -> AuthorityContext {
        AuthorityContext::open(&self.config).unwrap()
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn ca_cert(&self) -> X509 {
        X509::from_pem(&std::fs::read(self.config.ca_cert_file()).unwrap()).unwrap()
    }
}

/// Returns the serials on a CRL, upper case hex without leading zeros.
///
/// Panics unless the CRL is signed by `ca` and both encodings agree.
pub fn crl_serials(crl: &CrlBundle, ca: &X509) -> Vec<String> {
    let from_pem = X509Crl::from_pem(&crl.pem).unwrap();
    let from_der = X509Crl::from_der(&crl.der).unwrap();
    assert_eq!(from_pem.to_der().unwrap(), from_der.to_der().unwrap());
    assert!(from_der.verify(&ca.public_key().unwrap()).unwrap());

    match from_der.get_revoked() {
        None => Vec::new(),
        Some(revoked) => revoked
            .iter()
            .map(|entry| entry.serial_number().to_bn().unwrap().to_hex_str().unwrap().to_string())
            .map(|hex| {
                let trimmed = hex.trim_start_matches('0');
                if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }
            })
            .collect(),
    }
}
