//! Publication of the certificate revocation list.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use der::Decode;
use log::{debug, info, warn};
use serde::Serialize;
use x509_cert::crl::CertificateList;

use crate::ca::{CrlBundle, CrlEntry, CrlRequest, CryptoAuthority, IndexLedger, RecordState, Serial};
use crate::commons::error::Error;
use crate::commons::util::file::{self, Visibility};
use crate::config::Config;
use crate::constants::{CRL_DER_FILE, CRL_PEM_FILE, INITIAL_CRL_NUMBER};

//------------ PublishedCrl --------------------------------------------------

/// What was published by a CRL regeneration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PublishedCrl {
    pub number: u64,
    pub this_update: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
    pub revoked: usize,
}

//------------ CrlPublisher --------------------------------------------------

/// Regenerates the CRL from the ledger and writes it as PEM and DER.
///
/// The `crlnumber` file holds the next CRL number in hexadecimal, the
/// same way `openssl ca` keeps it.
#[derive(Clone, Debug)]
pub struct CrlPublisher {
    pem_file: PathBuf,
    der_file: PathBuf,
    number_file: PathBuf,
    validity: Duration,
}

impl CrlPublisher {
    pub fn new(crl_dir: &Path, number_file: &Path, validity_days: u32) -> Self {
        CrlPublisher {
            pem_file: crl_dir.join(CRL_PEM_FILE),
            der_file: crl_dir.join(CRL_DER_FILE),
            number_file: number_file.to_path_buf(),
            validity: Duration::days(i64::from(validity_days)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.crl_dir(), &config.crl_number_file(), config.crl_validity_days)
    }

    pub fn pem_file(&self) -> &Path {
        &self.pem_file
    }

    pub fn der_file(&self) -> &Path {
        &self.der_file
    }

    /// Writes the initial CRL number unless there is one.
    pub fn seed(&self) -> Result<(), Error> {
        if !self.number_file.exists() {
            write_number(&self.number_file, INITIAL_CRL_NUMBER)?;
        }
        Ok(())
    }

    /// Regenerates the CRL from every revoked record in the ledger.
    ///
    /// Entries are ordered by revocation date, then serial. The caller
    /// must hold the CA lock. Any failure is reported as
    /// [`Error::CrlRegenerationFailure`] unless the ledger itself is
    /// corrupt.
    pub fn publish(
        &self,
        ledger: &dyn IndexLedger,
        crypto: &dyn CryptoAuthority,
        now: DateTime<Utc>,
    ) -> Result<PublishedCrl, Error> {
        let mut entries: Vec<CrlEntry> = ledger
            .all()?
            .into_iter()
            .filter_map(|record| match record.state {
                RecordState::Revoked { date } => Some(CrlEntry {
                    serial: record.serial,
                    revocation_date: date,
                }),
                _ => None,
            })
            .collect();
        entries.sort_by(|a, b| {
            a.revocation_date
                .cmp(&b.revocation_date)
                .then_with(|| a.serial.cmp(&b.serial))
        });

        let number = self.next_number()?;
        write_number(&self.number_file, number + 1).map_err(Error::crl)?;

        let request = CrlRequest {
            entries,
            this_update: now,
            next_update: now + self.validity,
            number,
        };
        let bundle = crypto.build_crl(&request)?;

        let files: [(&[u8], &Path); 2] = [(&bundle.der, &self.der_file), (&bundle.pem, &self.pem_file)];
        file::save_all(&files, Visibility::Public).map_err(Error::crl)?;

        info!(
            "Published CRL number {} with {} revoked certificates",
            number,
            request.entries.len()
        );
        Ok(PublishedCrl {
            number,
            this_update: request.this_update,
            next_update: request.next_update,
            revoked: request.entries.len(),
        })
    }

    /// Returns the published CRL, if there is one.
    pub fn current(&self) -> Result<Option<CrlBundle>, Error> {
        let der = file::read_opt(&self.der_file)?;
        let pem = file::read_opt(&self.pem_file)?;
        match (pem, der) {
            (Some(pem), Some(der)) => Ok(Some(CrlBundle { pem, der })),
            _ => Ok(None),
        }
    }

    /// Returns whether both CRL files exist, hold the same CRL, and list
    /// exactly the serials the ledger has as revoked.
    pub fn is_consistent(&self, ledger: &dyn IndexLedger) -> Result<bool, Error> {
        let bundle = match self.current()? {
            Some(bundle) => bundle,
            None => return Ok(false),
        };
        match der::pem::decode_vec(&bundle.pem) {
            Ok((_, der)) if der == bundle.der => {}
            Ok(_) => return Ok(false),
            Err(e) => {
                warn!("Cannot decode '{}': {}", self.pem_file.display(), e);
                return Ok(false);
            }
        }

        let listed = match revoked_serials(&bundle.der) {
            Ok(serials) => serials,
            Err(e) => {
                warn!("Cannot parse '{}': {}", self.der_file.display(), e);
                return Ok(false);
            }
        };
        let mut revoked: Vec<Serial> = ledger
            .all()?
            .into_iter()
            .filter(|record| record.is_revoked())
            .map(|record| record.serial)
            .collect();
        revoked.sort();

        if listed != revoked {
            warn!(
                "CRL lists {} serials, the ledger has {} revoked",
                listed.len(),
                revoked.len()
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn next_number(&self) -> Result<u64, Error> {
        match file::read_opt(&self.number_file).map_err(Error::crl)? {
            None => {
                debug!("No CRL number file, starting at {:X}", INITIAL_CRL_NUMBER);
                Ok(INITIAL_CRL_NUMBER)
            }
            Some(bytes) => {
                let content = String::from_utf8_lossy(&bytes);
                u64::from_str_radix(content.trim(), 16).map_err(|e| {
                    Error::crl(format!(
                        "invalid CRL number in '{}': {}",
                        self.number_file.display(),
                        e
                    ))
                })
            }
        }
    }
}

/// Returns the sorted serials listed in a DER encoded CRL.
fn revoked_serials(der: &[u8]) -> Result<Vec<Serial>, String> {
    let crl = CertificateList::from_der(der).map_err(|e| e.to_string())?;
    let mut serials = Vec::new();
    for revoked in crl.tbs_cert_list.revoked_certificates.unwrap_or_default() {
        let hex = hex::encode_upper(revoked.serial_number.as_bytes());
        serials.push(Serial::from_str(&hex).map_err(|e| e.to_string())?);
    }
    serials.sort();
    Ok(serials)
}

fn write_number(path: &Path, number: u64) -> Result<(), Error> {
    let mut hex = format!("{:X}", number);
    if hex.len() % 2 == 1 {
        hex.insert(0, '0');
    }
    hex.push('\n');
    file::save(hex.as_bytes(), path, Visibility::Public)?;
    Ok(())
}

//------------ Tests ---------------------------------------------------------
