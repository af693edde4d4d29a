//! The authority context: everything the engines work with, created once
//! and passed around explicitly.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::ca::{
    ArtifactKind, AuthorityLock, CertificateDetails, CertificateStore, CrlBundle, CrlPublisher, CryptoAuthority,
    FileLedger, IndexLedger, KeyAlgorithm, Location, OpenSslAuthority, RecordState, RevocationJournal, Serial,
    SerialAllocator,
};
use crate::commons::error::Error;
use crate::config::Config;

//------------ IssuancePolicy ------------------------------------------------

/// The settings used when issuing and renewing certificates.
#[derive(Clone, Debug)]
pub struct IssuancePolicy {
    pub cert_validity_days: u32,
    pub key_algorithm: KeyAlgorithm,
    pub crl_distribution_point: Option<String>,
    pub pkcs12_password: Option<String>,
    pub renewal_revokes_previous: bool,
}

impl IssuancePolicy {
    pub fn from_config(config: &Config) -> Self {
        IssuancePolicy {
            cert_validity_days: config.cert_validity_days,
            key_algorithm: config.key_algorithm,
            crl_distribution_point: config.crl_distribution_point.clone(),
            pkcs12_password: config.pkcs12_password.clone(),
            renewal_revokes_previous: config.renewal_revokes_previous,
        }
    }
}

//------------ RecoveryReport ------------------------------------------------

/// What the recovery pass found and did.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RecoveryReport {
    /// An interrupted revocation that was completed.
    pub completed_revocation: Option<Serial>,

    /// An interrupted revocation that had not taken effect and was
    /// dropped.
    pub discarded_revocation: Option<Serial>,

    /// Files moved to the archive while completing a revocation.
    pub moved_files: Vec<String>,

    pub crl_regenerated: bool,
}

//------------ CertificateReport ---------------------------------------------

/// The details of an active certificate together with a text dump.
#[derive(Clone, Debug, Serialize)]
pub struct CertificateReport {
    pub file_name: String,
    pub details: CertificateDetails,
    pub text: String,
}

//------------ AuthorityContext ----------------------------------------------

/// The certificate authority.
///
/// Holds the store, the ledger, the crypto authority with the CA key, and
/// the lock. All operations take `&self`, a context can be shared between
/// threads in an `Arc`.
pub struct AuthorityContext {
    pub(super) policy: IssuancePolicy,
    pub(super) store: CertificateStore,
    pub(super) ledger: Arc<dyn IndexLedger>,
    pub(super) crypto: Arc<dyn CryptoAuthority>,
    pub(super) lock: AuthorityLock,
    pub(super) serials: SerialAllocator,
    pub(super) crl: CrlPublisher,
    pub(super) journal: RevocationJournal,
    startup_recovery: RecoveryReport,
}

impl AuthorityContext {
    /// Opens the CA described by the config.
    ///
    /// Loads the CA key, checks the ledger, and runs the recovery pass.
    pub fn open(config: &Config) -> Result<Self, Error> {
        config.verify()?;
        let crypto = OpenSslAuthority::load(
            &config.ca_cert_file(),
            &config.ca_key_file(),
            config.ca_key_passphrase_file().as_deref(),
        )?;
        let ledger = FileLedger::new(&config.index_file());
        Self::with_parts(config, Arc::new(ledger), Arc::new(crypto))
    }

    /// Creates a context with the given ledger and crypto authority.
    ///
    /// Paths and policy are still taken from the config.
    pub fn with_parts(
        config: &Config,
        ledger: Arc<dyn IndexLedger>,
        crypto: Arc<dyn CryptoAuthority>,
    ) -> Result<Self, Error> {
        let mut context = AuthorityContext {
            policy: IssuancePolicy::from_config(config),
            store: CertificateStore::from_config(config),
            ledger,
            crypto,
            lock: AuthorityLock::new(&config.lock_file(), config.lock_timeout()),
            serials: SerialAllocator::new(&config.serial_file()),
            crl: CrlPublisher::from_config(config),
            journal: RevocationJournal::new(&config.journal_file()),
            startup_recovery: RecoveryReport::default(),
        };

        let records = context.ledger.all()?;
        info!("Opened CA with {} certificates in the ledger", records.len());

        let report = context.recover()?;
        if report != RecoveryReport::default() {
            info!("Recovery: {:?}", report);
        }
        context.startup_recovery = report;
        Ok(context)
    }

    pub fn policy(&self) -> &IssuancePolicy {
        &self.policy
    }

    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    pub fn ledger(&self) -> &dyn IndexLedger {
        self.ledger.as_ref()
    }

    /// Returns what the recovery pass did when the context was opened.
    pub fn startup_recovery(&self) -> &RecoveryReport {
        &self.startup_recovery
    }

    /// Completes or discards an interrupted revocation and republishes a
    /// missing or damaged CRL.
    ///
    /// This runs when the context is opened and can be run again at any
    /// time, it does nothing when there is nothing to repair.
    pub fn recover(&self) -> Result<RecoveryReport, Error> {
        self.lock.run(|| {
            let mut report = RecoveryReport::default();

            if let Some(intent) = self.journal.pending()? {
                let record = self.ledger.find_by_serial(&intent.serial)?;
                match record {
                    Some(record) if record.is_revoked() => {
                        warn!("Completing interrupted revocation of {}", intent.serial);
                        self.crl.publish(self.ledger.as_ref(), self.crypto.as_ref(), now())?;
                        report.crl_regenerated = true;
                        if let Some(base_name) = &intent.base_name {
                            report.moved_files = self.store.archive(base_name)?;
                        }
                        report.completed_revocation = Some(intent.serial.clone());
                    }
                    _ => {
                        warn!("Discarding interrupted revocation of {}", intent.serial);
                        report.discarded_revocation = Some(intent.serial.clone());
                    }
                }
                self.journal.clear()?;
            }

            if !report.crl_regenerated && !self.crl.is_consistent(self.ledger.as_ref())? {
                warn!("CRL missing, damaged, or behind the ledger, regenerating");
                self.crl.publish(self.ledger.as_ref(), self.crypto.as_ref(), now())?;
                report.crl_regenerated = true;
            }

            Ok(report)
        })
    }

    /// Returns the published CRL.
    pub fn current_crl(&self) -> Result<CrlBundle, Error> {
        self.crl.current()?.ok_or_else(|| Error::NotFound("CRL".to_string()))
    }

    /// Returns the details of an active certificate.
    pub fn certificate_details(&self, serial: &str) -> Result<CertificateReport, Error> {
        let serial = parse_serial(serial)?;
        let hint = self.ledger.find_by_serial(&serial)?.and_then(|record| record.file_name);
        let base_name = self
            .find_base_name(Location::Active, &serial, hint.as_deref())?
            .ok_or_else(|| Error::NotFound(serial.to_string()))?;

        let file_name = ArtifactKind::Cert.file_name(&base_name);
        let pem = self
            .store
            .read_file(Location::Active, &file_name)
            .map_err(|e| Error::extraction(&file_name, e))?;
        let details = self.crypto.parse_certificate(&file_name, &pem)?;
        let text = self.crypto.certificate_text(&file_name, &pem)?;

        Ok(CertificateReport {
            file_name,
            details,
            text,
        })
    }

    /// Finds the base name of the file set of a certificate.
    ///
    /// Tries the name recorded in the ledger, then the naming convention,
    /// and finally parses every certificate in the location.
    pub(super) fn find_base_name(
        &self,
        location: Location,
        serial: &Serial,
        hint: Option<&str>,
    ) -> Result<Option<String>, Error> {
        if let Some(base_name) = hint {
            if self.store.file_set(base_name, location).members.contains(&ArtifactKind::Cert) {
                return Ok(Some(base_name.to_string()));
            }
        }

        if let Some(base_name) = self.store.base_name_for_serial(location, serial)? {
            return Ok(Some(base_name));
        }

        for file_name in self.store.cert_files(location)? {
            let pem = match self.store.read_file(location, &file_name) {
                Ok(pem) => pem,
                Err(e) => {
                    warn!("Skipping '{}': {}", file_name, e);
                    continue;
                }
            };
            match self.crypto.parse_certificate(&file_name, &pem) {
                Ok(details) if &details.serial == serial => {
                    return Ok(ArtifactKind::split_file_name(&file_name).map(|(base, _)| base.to_string()));
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable certificate: {}", e),
            }
        }
        Ok(None)
    }

    /// Puts a record back to the state it had before a failed update.
    pub(super) fn restore_state(&self, serial: &Serial, state: RecordState) -> Result<(), Error> {
        self.ledger.update_status(serial, state)?;
        Ok(())
    }
}

/// Parses a serial given by a caller.
///
/// Something that is not a serial cannot name a certificate, so it is
/// reported as not found.
pub fn parse_serial(serial: &str) -> Result<Serial, Error> {
    Serial::from_str(serial).map_err(|_| Error::NotFound(serial.trim().to_string()))
}

/// Returns the current time truncated to whole seconds.
pub(super) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

//------------ Tests ---------------------------------------------------------
