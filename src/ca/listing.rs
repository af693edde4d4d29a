//! The listing of all certificates in the store.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use crate::ca::context::now;
use crate::ca::{
    ArtifactKind, AuthorityContext, CertRecord, CertStatus, CertificateStore, CryptoAuthority, Location, Serial,
    SubjectAltName,
};
use crate::commons::error::Error;

/// The value shown for fields that could not be read.
pub const UNKNOWN: &str = "unknown";

//------------ CertificateView -----------------------------------------------

/// One certificate file in the store together with its ledger status.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CertificateView {
    pub file_name: String,
    pub base_name: String,
    pub location: Location,

    pub subject_cn: String,
    pub serial: Option<Serial>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub alt_names: Vec<SubjectAltName>,

    /// `None` if the certificate file could not be read.
    pub status: Option<CertStatus>,

    /// Why the fields are unknown.
    pub note: Option<String>,

    /// The members of the file set next to the certificate.
    pub artifacts: Vec<ArtifactKind>,
}

impl CertificateView {
    fn unreadable(file_name: String, base_name: String, location: Location, note: String) -> Self {
        CertificateView {
            file_name,
            base_name,
            location,
            subject_cn: UNKNOWN.to_string(),
            serial: None,
            not_before: None,
            not_after: None,
            alt_names: Vec::new(),
            status: None,
            note: Some(note),
            artifacts: Vec::new(),
        }
    }
}

//------------ CertificateListing --------------------------------------------

/// A lazy iterator over the certificates in the store.
///
/// The ledger is read once when the listing is created, certificate files
/// are read as the iterator advances. Active certificates come first,
/// each location in descending file name order. A listing can be cloned
/// to start over from the same point.
#[derive(Clone)]
pub struct CertificateListing {
    store: CertificateStore,
    crypto: Arc<dyn CryptoAuthority>,
    records: Arc<HashMap<Serial, CertRecord>>,
    now: DateTime<Utc>,
    locations: VecDeque<Location>,
    current: Option<(Location, VecDeque<String>)>,
}

impl CertificateListing {
    fn view(&self, location: Location, file_name: String) -> CertificateView {
        let base_name = ArtifactKind::split_file_name(&file_name)
            .map(|(base, _)| base.to_string())
            .unwrap_or_else(|| file_name.clone());

        let parsed = self
            .store
            .read_file(location, &file_name)
            .map_err(|e| Error::extraction(&file_name, e))
            .and_then(|pem| self.crypto.parse_certificate(&file_name, &pem));

        let mut view = match parsed {
            Ok(details) => {
                let status = match self.records.get(&details.serial) {
                    Some(record) => record.status_at(self.now),
                    None => CertStatus::Valid,
                };
                let status = match status {
                    CertStatus::Valid if details.validity.not_after <= self.now => CertStatus::Expired,
                    status => status,
                };
                CertificateView {
                    file_name,
                    base_name,
                    location,
                    subject_cn: details.subject_cn,
                    serial: Some(details.serial),
                    not_before: Some(details.validity.not_before),
                    not_after: Some(details.validity.not_after),
                    alt_names: details.alt_names,
                    status: Some(status),
                    note: None,
                    artifacts: Vec::new(),
                }
            }
            Err(e) => {
                warn!("Listing '{}' without details: {}", file_name, e);
                CertificateView::unreadable(file_name, base_name, location, e.to_string())
            }
        };
        view.artifacts = self.store.file_set(&view.base_name, location).members;
        view
    }
}

impl Iterator for CertificateListing {
    type Item = CertificateView;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((location, names)) = &mut self.current {
                let location = *location;
                if let Some(file_name) = names.pop_front() {
                    return Some(self.view(location, file_name));
                }
                self.current = None;
            }

            let location = self.locations.pop_front()?;
            let names = match self.store.cert_files(location) {
                Ok(names) => names,
                Err(e) => {
                    warn!("Cannot list the {} certificates: {}", location, e);
                    Vec::new()
                }
            };
            self.current = Some((location, names.into()));
        }
    }
}

impl AuthorityContext {
    /// Lists the certificates in the store.
    ///
    /// Fails only if the ledger cannot be read. Takes no lock.
    pub fn list(&self, include_archive: bool) -> Result<CertificateListing, Error> {
        let records = self
            .ledger
            .all()?
            .into_iter()
            .map(|record| (record.serial.clone(), record))
            .collect();

        let mut locations = VecDeque::from([Location::Active]);
        if include_archive {
            locations.push_back(Location::Archive);
        }

        Ok(CertificateListing {
            store: self.store.clone(),
            crypto: self.crypto.clone(),
            records: Arc::new(records),
            now: now(),
            locations,
            current: None,
        })
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::test;
    use crate::commons::util::file::{self, Visibility};

    const NONE: [&str; 0] = [];

    #[test]
    fn lists_active_then_archive() {
        test::test_under_tmp(|dir| {
            let context = test::open_ca(&dir);
            let kept = context.issue("kept.example.net", &["www.kept.example.net"], &NONE).unwrap();
            let gone = context.issue("gone.example.net", &NONE, &NONE).unwrap();
            context.revoke(gone.serial.as_str()).unwrap();

            let active: Vec<_> = context.list(false).unwrap().collect();
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].serial, Some(kept.serial.clone()));
            assert_eq!(active[0].status, Some(CertStatus::Valid));
            assert_eq!(active[0].alt_names, kept.alt_names);
            assert_eq!(
                active[0].artifacts,
                vec![ArtifactKind::Key, ArtifactKind::Csr, ArtifactKind::Cert, ArtifactKind::FullChain]
            );

            let all: Vec<_> = context.list(true).unwrap().collect();
            assert_eq!(all.len(), 2);
            assert_eq!(all[1].location, Location::Archive);
            assert_eq!(all[1].serial, Some(gone.serial));
            assert_eq!(all[1].status, Some(CertStatus::Revoked));
        });
    }

    #[test]
    fn descending_within_location_and_restartable() {
        test::test_under_tmp(|dir| {
            let context = test::open_ca(&dir);
            for cn in ["a.example.net", "c.example.net", "b.example.net"] {
                context.issue(cn, &NONE, &NONE).unwrap();
            }

            let listing = context.list(false).unwrap();
            let names: Vec<_> = listing.clone().map(|view| view.subject_cn).collect();
            assert_eq!(names, vec!["c.example.net", "b.example.net", "a.example.net"]);

            let mut partial = listing.clone();
            partial.next();
            assert_eq!(listing.count(), 3);
        });
    }

    #[test]
    fn unreadable_certificate_degrades() {
        test::test_under_tmp(|dir| {
            let context = test::open_ca(&dir);
            context.issue("fine.example.net", &NONE, &NONE).unwrap();
            let broken = context.store().dir(Location::Active).join("zz_broken.cert.pem");
            file::save(b"not a certificate", &broken, Visibility::Public).unwrap();

            let views: Vec<_> = context.list(false).unwrap().collect();
            assert_eq!(views.len(), 2);
            assert_eq!(views[0].base_name, "zz_broken");
            assert_eq!(views[0].subject_cn, UNKNOWN);
            assert_eq!(views[0].status, None);
            assert!(views[0].note.is_some());
            assert_eq!(views[1].subject_cn, "fine.example.net");
        });
    }

    #[test]
    fn certificate_without_ledger_entry_is_valid() {
        test::test_under_tmp(|dir| {
            let (config, crypto) = test::init_ca(&dir);
            let context = AuthorityContext::with_parts(
                &config,
                Arc::new(crate::ca::FileLedger::new(&config.index_file())),
                crypto.clone(),
            )
            .unwrap();
            context.issue("orphan.example.net", &NONE, &NONE).unwrap();

            let fresh = AuthorityContext::with_parts(&config, Arc::new(crate::ca::MemoryLedger::new()), crypto).unwrap();
            let views: Vec<_> = fresh.list(false).unwrap().collect();
            assert_eq!(views.len(), 1);
            assert_eq!(views[0].status, Some(CertStatus::Valid));
        });
    }
}
