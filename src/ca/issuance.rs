//! Issuing new certificates.

use log::{info, warn};

use crate::ca::context::now;
use crate::ca::{ArtifactKind, AuthorityContext, CertRecord, Subject, Validity};
use crate::commons::error::Error;

impl AuthorityContext {
    /// Issues a certificate for a common name and its SANs.
    ///
    /// Creates a new key, CSR, and certificate signed by the CA, writes the
    /// file set to the active store, and adds a `Valid` record to the
    /// ledger. Either both the files and the record are written or
    /// neither is.
    pub fn issue<D, I>(&self, cn: &str, dns_names: &[D], ip_names: &[I]) -> Result<CertRecord, Error>
    where
        D: AsRef<str>,
        I: AsRef<str>,
    {
        let subject = Subject::new(cn, dns_names, ip_names)?;
        self.lock.run(|| self.issue_locked(&subject))
    }

    /// Issues a certificate. The caller must hold the lock.
    pub(super) fn issue_locked(&self, subject: &Subject) -> Result<CertRecord, Error> {
        let serial = self
            .serials
            .allocate(|candidate| Ok(self.ledger.find_by_serial(candidate)?.is_some()))?;
        let validity = Validity::days_from(now(), self.policy.cert_validity_days).ok_or_else(|| {
            Error::signing(
                subject.cn(),
                format!("a validity of {} days is out of range", self.policy.cert_validity_days),
            )
        })?;

        let key = self.crypto.generate_key(self.policy.key_algorithm)?;
        let csr = self.crypto.build_csr(&key, subject)?;
        let issued = self.crypto.sign_certificate(
            &csr,
            subject,
            &serial,
            &validity,
            self.policy.crl_distribution_point.as_deref(),
        )?;

        let mut full_chain = issued.pem.clone();
        full_chain.extend_from_slice(&self.crypto.ca_certificate_pem());

        let mut artifacts = vec![
            (ArtifactKind::Key, key.pem().to_vec()),
            (ArtifactKind::Csr, csr.pem().to_vec()),
            (ArtifactKind::Cert, issued.pem.clone()),
            (ArtifactKind::FullChain, full_chain),
        ];
        if let Some(password) = &self.policy.pkcs12_password {
            let p12 = self.crypto.export_pkcs12(subject.cn(), &key, &issued.pem, password)?;
            artifacts.push((ArtifactKind::Pkcs12, p12));
        }

        let base_name = subject.base_name(&serial);
        let file_set = self.store.write_file_set(&base_name, &artifacts)?;

        let record = CertRecord::issued(serial, subject, issued.details.validity, base_name);
        if let Err(e) = self.ledger.append(&record) {
            warn!("Could not add {} to the ledger, removing its files", record.serial);
            if let Err(cleanup) = self.store.remove_file_set(&file_set) {
                warn!("Could not remove files of {}: {}", record.serial, cleanup);
            }
            return Err(e);
        }

        // The ledger already has the serial, so allocation skips it even
        // if this fails.
        if let Err(e) = self.serials.commit(&record.serial) {
            warn!("Could not update serial file after issuing {}: {}", record.serial, e);
        }

        info!(
            "Issued certificate {} for '{}' valid until {}",
            record.serial,
            subject.cn(),
            record.not_after
        );
        Ok(record)
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io;
    use std::sync::Arc;

    use crate::ca::{
        ArtifactKind, AuthorityContext, CertRecord, CertStatus, CertificateDetails, CrlBundle, CrlRequest,
        CryptoAuthority, IndexLedger, IssuedCertificate, KeyAlgorithm, KeyMaterial, Location, MemoryLedger,
        RecordState, Serial, SigningRequest, Subject, Validity,
    };
    use crate::commons::error::Error;
    use crate::commons::test;

    const NONE: [&str; 0] = [];

    /// A ledger that refuses new records.
    #[derive(Default)]
    struct FullLedger {
        inner: MemoryLedger,
    }

    impl IndexLedger for FullLedger {
        fn append(&self, _record: &CertRecord) -> Result<(), Error> {
            Err(Error::io("ledger refuses new records", io::Error::from(io::ErrorKind::PermissionDenied)))
        }

        fn update_status(&self, serial: &Serial, state: RecordState) -> Result<CertRecord, Error> {
            self.inner.update_status(serial, state)
        }

        fn find_by_serial(&self, serial: &Serial) -> Result<Option<CertRecord>, Error> {
            self.inner.find_by_serial(serial)
        }

        fn all(&self) -> Result<Vec<CertRecord>, Error> {
            self.inner.all()
        }
    }

    /// A crypto authority that cannot sign certificates.
    struct RefusingSigner {
        inner: Arc<dyn CryptoAuthority>,
    }

    impl CryptoAuthority for RefusingSigner {
        fn generate_key(&self, algorithm: KeyAlgorithm) -> Result<KeyMaterial, Error> {
            self.inner.generate_key(algorithm)
        }

        fn build_csr(&self, key: &KeyMaterial, subject: &Subject) -> Result<SigningRequest, Error> {
            self.inner.build_csr(key, subject)
        }

        fn sign_certificate(
            &self,
            _csr: &SigningRequest,
            subject: &Subject,
            _serial: &Serial,
            _validity: &Validity,
            _crl_distribution_point: Option<&str>,
        ) -> Result<IssuedCertificate, Error> {
            Err(Error::signing(subject.cn(), "signing key is offline"))
        }

        fn parse_certificate(&self, name: &str, pem: &[u8]) -> Result<CertificateDetails, Error> {
            self.inner.parse_certificate(name, pem)
        }

        fn certificate_text(&self, name: &str, pem: &[u8]) -> Result<String, Error> {
            self.inner.certificate_text(name, pem)
        }

        fn build_crl(&self, request: &CrlRequest) -> Result<CrlBundle, Error> {
            self.inner.build_crl(request)
        }

        fn ca_certificate_pem(&self) -> Vec<u8> {
            self.inner.ca_certificate_pem()
        }

        fn export_pkcs12(&self, name: &str, key: &KeyMaterial, cert_pem: &[u8], password: &str) -> Result<Vec<u8>, Error> {
            self.inner.export_pkcs12(name, key, cert_pem, password)
        }
    }

    fn active_files(context: &AuthorityContext) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(context.store().dir(Location::Active))
            .unwrap()
            .map(|entry| entry.unwrap())
            .filter(|entry| entry.file_type().unwrap().is_file())
            .map(|entry| entry.file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn issues_file_set_and_record() {
        test::test_under_tmp(|dir| {
            let context = test::open_ca(&dir);
            let record = context.issue("test.local", &["www.test.local"], &NONE).unwrap();

            assert_eq!(record.status(), CertStatus::Valid);
            assert_eq!(record.subject_cn, "test.local");
            let base_name = record.file_name.clone().unwrap();
            let set = context.store().file_set(&base_name, Location::Active);
            assert_eq!(
                set.members,
                vec![ArtifactKind::Key, ArtifactKind::Csr, ArtifactKind::Cert, ArtifactKind::FullChain]
            );
            assert_eq!(context.ledger().find_by_serial(&record.serial).unwrap(), Some(record));
        });
    }

    #[test]
    fn writes_pkcs12_when_configured() {
        test::test_under_tmp(|dir| {
            let (mut config, crypto) = test::init_ca(&dir);
            config.pkcs12_password = Some("secret".into());
            let context = AuthorityContext::with_parts(&config, Arc::new(MemoryLedger::new()), crypto).unwrap();

            let record = context.issue("p12.example.net", &NONE, &["10.0.0.1"]).unwrap();
            let set = context.store().file_set(record.file_name.as_deref().unwrap(), Location::Active);
            assert!(set.members.contains(&ArtifactKind::Pkcs12));
        });
    }

    #[test]
    fn rejects_invalid_subject_without_side_effects() {
        test::test_under_tmp(|dir| {
            let context = test::open_ca(&dir);
            assert!(matches!(context.issue("   ", &NONE, &NONE), Err(Error::InvalidSubject(_))));
            assert!(matches!(
                context.issue("ok.example.net", &NONE, &["not-an-ip"]),
                Err(Error::InvalidSubject(_))
            ));
            assert!(context.ledger().all().unwrap().is_empty());
            assert!(context.store().cert_files(Location::Active).unwrap().is_empty());
        });
    }

    #[test]
    fn ledger_failure_removes_the_file_set() {
        test::test_under_tmp(|dir| {
            let (config, crypto) = test::init_ca(&dir);
            let context = AuthorityContext::with_parts(&config, Arc::new(FullLedger::default()), crypto).unwrap();

            let err = context.issue("full.example.net", &["www.full.example.net"], &NONE).unwrap_err();
            assert!(matches!(err, Error::StoreWriteFailure(_)));
            assert!(active_files(&context).is_empty());
            assert!(context.ledger().all().unwrap().is_empty());
        });
    }

    #[test]
    fn signing_failure_writes_nothing() {
        test::test_under_tmp(|dir| {
            let (config, crypto) = test::init_ca(&dir);
            let signer = Arc::new(RefusingSigner { inner: crypto });
            let context = AuthorityContext::with_parts(&config, Arc::new(MemoryLedger::new()), signer).unwrap();

            let err = context.issue("offline.example.net", &NONE, &NONE).unwrap_err();
            assert!(matches!(err, Error::SigningFailure { .. }));
            assert!(active_files(&context).is_empty());
            assert!(context.ledger().all().unwrap().is_empty());
        });
    }

    #[test]
    fn out_of_range_validity_is_a_signing_failure() {
        test::test_under_tmp(|dir| {
            let (mut config, crypto) = test::init_ca(&dir);
            config.cert_validity_days = u32::MAX;
            let context = AuthorityContext::with_parts(&config, Arc::new(MemoryLedger::new()), crypto).unwrap();

            let err = context.issue("forever.example.net", &NONE, &NONE).unwrap_err();
            assert!(matches!(err, Error::SigningFailure { .. }));
            assert!(active_files(&context).is_empty());
            assert!(context.ledger().all().unwrap().is_empty());
        });
    }

    #[test]
    fn serials_are_never_reused() {
        test::test_under_tmp(|dir| {
            let context = test::open_ca(&dir);
            let mut serials = HashSet::new();
            for i in 0..5 {
                let record = context.issue(&format!("host{}.example.net", i), &NONE, &NONE).unwrap();
                assert!(serials.insert(record.serial));
            }
        });
    }
}
