//! Helper functions for testing the CA.
#![cfg(test)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ca::{AuthorityContext, CryptoAuthority, OpenSslAuthority, RootCa};
use crate::config::Config;

/// Runs the test provided in the closure in a fresh temporary directory.
///
/// The directory is removed when the closure returns.
pub fn test_under_tmp<F>(op: F)
where
    F: FnOnce(PathBuf),
{
    let dir = tempfile::tempdir().unwrap();
    op(dir.path().into());
}

/// Creates a root CA under `dir` and loads its crypto authority.
pub fn init_ca(dir: &Path) -> (Config, Arc<dyn CryptoAuthority>) {
    let config = Config::test(dir);
    RootCa::create(&config, "Test Root CA", 365).unwrap();
    let crypto = OpenSslAuthority::load(
        &config.ca_cert_file(),
        &config.ca_key_file(),
        config.ca_key_passphrase_file().as_deref(),
    )
    .unwrap();
    (config, Arc::new(crypto))
}

/// Creates a root CA under `dir` and opens it.
pub fn open_ca(dir: &Path) -> AuthorityContext {
    let (config, _) = init_ca(dir);
    AuthorityContext::open(&config).unwrap()
}
