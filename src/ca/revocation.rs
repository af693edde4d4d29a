//! Revoking certificates.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;

use crate::ca::context::{now, parse_serial};
use crate::ca::{AuthorityContext, Location, RecordState, RevocationIntent, Serial};
use crate::commons::error::Error;

//------------ RevocationSummary ---------------------------------------------

/// The outcome of a successful revocation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RevocationSummary {
    pub serial: Serial,
    pub subject_cn: String,
    pub revocation_date: DateTime<Utc>,

    /// The base name of the archived file set, if any files were found.
    pub base_name: Option<String>,
    pub moved_files: Vec<String>,
    pub crl_number: u64,
}

impl AuthorityContext {
    /// Revokes the certificate with the given serial.
    ///
    /// The serial is matched ignoring case and leading zeros. The ledger
    /// update and the CRL regeneration succeed or fail together. After
    /// both succeeded, the file set is moved to the archive.
    pub fn revoke(&self, serial: &str) -> Result<RevocationSummary, Error> {
        let serial = parse_serial(serial)?;
        self.lock.run(|| self.revoke_locked(&serial))
    }

    /// Revokes a certificate. The caller must hold the lock.
    pub(super) fn revoke_locked(&self, serial: &Serial) -> Result<RevocationSummary, Error> {
        let record = self
            .ledger
            .find_by_serial(serial)?
            .ok_or_else(|| Error::NotFound(serial.to_string()))?;
        if record.is_revoked() {
            return Err(Error::AlreadyRevoked(serial.clone()));
        }

        let base_name = self.find_base_name(Location::Active, serial, record.file_name.as_deref())?;
        if base_name.is_none() {
            warn!("No files found for {}, revoking in the ledger only", serial);
        }

        let revocation_date = now();
        self.journal.begin(&RevocationIntent {
            serial: serial.clone(),
            base_name: base_name.clone(),
            revoked_at: revocation_date,
        })?;

        if let Err(e) = self
            .ledger
            .update_status(serial, RecordState::Revoked { date: revocation_date })
        {
            self.clear_journal();
            return Err(e);
        }

        let published = match self.crl.publish(self.ledger.as_ref(), self.crypto.as_ref(), revocation_date) {
            Ok(published) => published,
            Err(e) => return Err(self.roll_back_revocation(serial, record.state, e)),
        };

        let moved_files = match &base_name {
            Some(base_name) => self.store.archive(base_name)?,
            None => Vec::new(),
        };
        self.clear_journal();

        info!(
            "Revoked certificate {} for '{}', {} files archived",
            serial,
            record.subject_cn,
            moved_files.len()
        );
        Ok(RevocationSummary {
            serial: serial.clone(),
            subject_cn: record.subject_cn,
            revocation_date,
            base_name,
            moved_files,
            crl_number: published.number,
        })
    }

    /// Undoes the ledger update of a revocation whose CRL failed.
    ///
    /// Returns the error to report. If the ledger cannot be restored the
    /// journal is kept, so that the next recovery completes the
    /// revocation instead.
    fn roll_back_revocation(&self, serial: &Serial, previous: RecordState, cause: Error) -> Error {
        warn!("CRL regeneration failed, rolling back revocation of {}: {}", serial, cause);

        if let Err(rollback) = self.restore_state(serial, previous) {
            error!(
                "Could not roll back revocation of {}, it is completed on the next recovery: {}",
                serial, rollback
            );
            if cause.is_fatal() {
                return cause;
            }
            let reason = match &cause {
                Error::CrlRegenerationFailure(reason) => reason.clone(),
                other => other.to_string(),
            };
            return Error::crl(format!(
                "{}; the ledger still records {} as revoked ({}), recovery will complete the revocation",
                reason, serial, rollback
            ));
        }
        self.clear_journal();

        match self.crl.is_consistent(self.ledger.as_ref()) {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.crl.publish(self.ledger.as_ref(), self.crypto.as_ref(), now()) {
                    warn!("Could not republish CRL after rolling back {}: {}", serial, e);
                }
            }
            Err(e) => warn!("Could not check CRL after rolling back {}: {}", serial, e),
        }

        match cause {
            Error::CrlRegenerationFailure(_) => cause,
            e if e.is_fatal() => e,
            e => Error::crl(e),
        }
    }

    fn clear_journal(&self) {
        if let Err(e) = self.journal.clear() {
            warn!("Could not clear revocation journal: {}", e);
        }
    }
}

//------------ Tests ---------------------------------------------------------
