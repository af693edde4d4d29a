//! Renewing certificates.

use log::{info, warn};

use crate::ca::context::parse_serial;
use crate::ca::{ArtifactKind, AuthorityContext, CertRecord, Location, Subject};
use crate::commons::error::Error;

impl AuthorityContext {
    /// Issues a replacement for the active certificate with this serial.
    ///
    /// The common name and SANs are read from the certificate file, not
    /// from the ledger. The old certificate stays valid unless the policy
    /// says to revoke it.
    pub fn renew(&self, serial: &str) -> Result<CertRecord, Error> {
        let serial = parse_serial(serial)?;

        self.lock.run(|| {
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
            let subject = Subject::with_alt_names(&details.subject_cn, details.alt_names)
                .map_err(|e| Error::extraction(&file_name, e))?;

            let renewed = self.issue_locked(&subject)?;
            info!("Renewed certificate {} as {}", serial, renewed.serial);

            if self.policy.renewal_revokes_previous {
                match self.revoke_locked(&serial) {
                    Ok(_) | Err(Error::AlreadyRevoked(_)) => {}
                    Err(Error::NotFound(_)) => {
                        warn!("Renewed certificate {} is not in the ledger, not revoking it", serial);
                    }
                    Err(e) => return Err(e),
                }
            }

            Ok(renewed)
        })
    }
}

//------------ Tests ---------------------------------------------------------
