//! Creating a new root CA.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use log::info;
use serde::Serialize;

use crate::ca::{
    CrlPublisher, CryptoAuthority, FileLedger, OpenSslAuthority, PublishedCrl, Serial, SerialAllocator, Validity,
};
use crate::commons::error::Error;
use crate::commons::util::file::{self, Visibility};
use crate::config::Config;
use crate::constants::MAX_VALIDITY_DAYS;

//------------ RootCa --------------------------------------------------------

/// A newly created root CA.
#[derive(Clone, Debug, Serialize)]
pub struct RootCa {
    pub cn: String,
    pub serial: Serial,
    pub validity: Validity,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub initial_crl: PublishedCrl,
}

impl RootCa {
    /// Creates the CA directory layout, key, self-signed certificate, and
    /// an empty CRL.
    ///
    /// Refuses to touch an existing CA key or certificate. If a passphrase
    /// file is configured, the key is encrypted with it.
    pub fn create(config: &Config, cn: &str, validity_days: u32) -> Result<Self, Error> {
        config.verify()?;

        let cert_file = config.ca_cert_file();
        let key_file = config.ca_key_file();
        for path in [&cert_file, &key_file] {
            if path.exists() {
                return Err(Error::io(
                    format!("refusing to overwrite '{}'", path.display()),
                    io::Error::from(io::ErrorKind::AlreadyExists),
                ));
            }
        }

        let cn = cn.trim();
        if cn.is_empty() {
            return Err(Error::invalid_subject("the CA common name must not be empty"));
        }
        if validity_days == 0 || validity_days > MAX_VALIDITY_DAYS {
            return Err(Error::invalid_subject(format!(
                "the CA validity must be between 1 and {} days",
                MAX_VALIDITY_DAYS
            )));
        }

        for dir in [
            config.ca_dir(),
            config.crl_dir(),
            config.issued_dir(),
            config.archive_dir(),
        ] {
            file::create_dir(&dir)?;
        }
        for path in [&cert_file, &key_file] {
            if let Some(parent) = path.parent() {
                file::create_dir(parent)?;
            }
        }

        let ledger = FileLedger::create(&config.index_file())?;
        SerialAllocator::new(&config.serial_file()).seed()?;
        let crl = CrlPublisher::from_config(config);
        crl.seed()?;

        let serial = Serial::random()?;
        let validity = Validity::days_from(Utc::now(), validity_days).ok_or_else(|| {
            Error::invalid_subject(format!("a CA validity of {} days is out of range", validity_days))
        })?;
        let authority = OpenSslAuthority::create_root(cn, config.key_algorithm, &validity, &serial)?;

        let passphrase = match config.ca_key_passphrase_file() {
            Some(path) => {
                let bytes = file::read(&path).map_err(Error::ca_key)?;
                Some(String::from_utf8_lossy(&bytes).trim_end().to_string())
            }
            None => None,
        };
        let key_pem = authority.private_key_pem(passphrase.as_deref())?;
        file::save_new(&key_pem, &key_file, Visibility::Private)?;
        file::save_new(&authority.ca_certificate_pem(), &cert_file, Visibility::Public)?;

        let authority: Arc<dyn CryptoAuthority> = Arc::new(authority);
        let initial_crl = crl.publish(&ledger, authority.as_ref(), Utc::now())?;

        info!("Created root CA '{}' with serial {}, valid until {}", cn, serial, validity.not_after);
        Ok(RootCa {
            cn: cn.to_string(),
            serial,
            validity,
            cert_file,
            key_file,
            initial_crl,
        })
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use openssl::x509::{X509Crl, X509};

    use super::*;
    use crate::commons::test;
    use crate::constants::INITIAL_CRL_NUMBER;

    #[test]
    fn creates_layout_and_refuses_overwrite() {
        test::test_under_tmp(|dir| {
            let config = Config::test(&dir);
            let root = RootCa::create(&config, "Test Root CA", 3650).unwrap();

            assert!(config.index_file().is_file());
            assert!(config.serial_file().is_file());
            assert!(config.issued_dir().is_dir());
            assert_eq!(root.initial_crl.number, INITIAL_CRL_NUMBER);
            assert_eq!(root.initial_crl.revoked, 0);

            let cert = X509::from_pem(&file::read(&root.cert_file).unwrap()).unwrap();
            let crl = X509Crl::from_pem(&file::read(&config.crl_dir().join(crate::constants::CRL_PEM_FILE)).unwrap())
                .unwrap();
            assert!(crl.verify(&cert.public_key().unwrap()).unwrap());
            assert_eq!(
                file::read(&config.crl_number_file()).unwrap().trim_ascii(),
                format!("{:X}", INITIAL_CRL_NUMBER + 1).as_bytes()
            );

            let err = RootCa::create(&config, "Test Root CA", 3650).unwrap_err();
            assert!(matches!(err, Error::StoreWriteFailure(_)));
        });
    }

    #[test]
    fn encrypts_key_with_passphrase_file() {
        test::test_under_tmp(|dir| {
            let config = Config::test(&dir);
            let pass_file = config.ca_dir().join("private").join("ca.pass");
            file::save(b"correct horse\n", &pass_file, Visibility::Private).unwrap();

            RootCa::create(&config, "Locked Root CA", 365).unwrap();
            let key_pem = file::read(&config.ca_key_file()).unwrap();
            assert!(String::from_utf8_lossy(&key_pem).contains("ENCRYPTED"));

            OpenSslAuthority::load(
                &config.ca_cert_file(),
                &config.ca_key_file(),
                config.ca_key_passphrase_file().as_deref(),
            )
            .unwrap();
        });
    }

    #[test]
    fn rejects_empty_name() {
        test::test_under_tmp(|dir| {
            let config = Config::test(&dir);
            assert!(matches!(RootCa::create(&config, "  ", 365), Err(Error::InvalidSubject(_))));
            assert!(!config.ca_key_file().exists());
        });
    }

    #[test]
    fn rejects_out_of_range_validity() {
        test::test_under_tmp(|dir| {
            let config = Config::test(&dir);
            for days in [0, MAX_VALIDITY_DAYS + 1, u32::MAX] {
                assert!(matches!(
                    RootCa::create(&config, "Test Root CA", days),
                    Err(Error::InvalidSubject(_))
                ));
            }
            assert!(!config.ca_key_file().exists());
        });
    }
}
