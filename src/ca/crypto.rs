//! The cryptographic operations of the CA and their OpenSSL
//! implementation.

use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use der::asn1::{Any, BitString, GeneralizedTime, Null, ObjectIdentifier, OctetString, Uint, UtcTime};
use der::pem::LineEnding;
use der::{Decode, Encode};
use log::{debug, warn};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{Id, PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509, X509Builder, X509Extension, X509Name, X509NameRef, X509Ref, X509Req, X509ReqBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::Extension;
use x509_cert::ext::pkix::AuthorityKeyIdentifier as AkiExtension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::Time;

use crate::ca::{Serial, Subject, SubjectAltName, Validity};
use crate::commons::error::Error;
use crate::commons::util::file;
use crate::constants::{CRL_DER_CONTENT_TYPE, CRL_PEM_CONTENT_TYPE};

const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const CRL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.20");
const AUTHORITY_KEY_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.35");

//------------ KeyAlgorithm --------------------------------------------------

/// The algorithm for the keys of issued certificates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyAlgorithm {
    Rsa2048,
    Rsa4096,
    EcP256,
}

impl FromStr for KeyAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsa2048" => Ok(KeyAlgorithm::Rsa2048),
            "rsa4096" => Ok(KeyAlgorithm::Rsa4096),
            "ec-p256" => Ok(KeyAlgorithm::EcP256),
            _ => Err(format!(
                "expected \"rsa2048\", \"rsa4096\", or \"ec-p256\", found: \"{}\"",
                s
            )),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa2048 => write!(f, "rsa2048"),
            KeyAlgorithm::Rsa4096 => write!(f, "rsa4096"),
            KeyAlgorithm::EcP256 => write!(f, "ec-p256"),
        }
    }
}

impl<'de> Deserialize<'de> for KeyAlgorithm {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let string = String::deserialize(d)?;
        KeyAlgorithm::from_str(&string).map_err(serde::de::Error::custom)
    }
}

//------------ Material types ------------------------------------------------

/// A PEM encoded PKCS#8 private key.
#[derive(Clone)]
pub struct KeyMaterial {
    pem: Vec<u8>,
}

impl KeyMaterial {
    pub fn from_pem(pem: Vec<u8>) -> Self {
        KeyMaterial { pem }
    }

    pub fn pem(&self) -> &[u8] {
        &self.pem
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("KeyMaterial(..)")
    }
}

/// A PEM encoded PKCS#10 certificate signing request.
#[derive(Clone, Debug)]
pub struct SigningRequest {
    pem: Vec<u8>,
}

impl SigningRequest {
    pub fn pem(&self) -> &[u8] {
        &self.pem
    }
}

/// A freshly signed certificate.
#[derive(Clone, Debug)]
pub struct IssuedCertificate {
    pub pem: Vec<u8>,
    pub details: CertificateDetails,
}

/// What callers need to know about a certificate.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CertificateDetails {
    pub subject_cn: String,
    pub subject: String,
    pub issuer: String,
    pub serial: Serial,
    pub validity: Validity,
    pub alt_names: Vec<SubjectAltName>,
}

/// A revoked certificate as listed on a CRL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CrlEntry {
    pub serial: Serial,
    pub revocation_date: DateTime<Utc>,
}

/// Everything that goes into a CRL apart from the signing key.
#[derive(Clone, Debug)]
pub struct CrlRequest {
    pub entries: Vec<CrlEntry>,
    pub this_update: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
    pub number: u64,
}

/// A signed CRL in both encodings.
///
/// Both encodings are of the same CRL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CrlBundle {
    pub pem: Vec<u8>,
    pub der: Vec<u8>,
}

impl CrlBundle {
    pub fn pem_content_type() -> &'static str {
        CRL_PEM_CONTENT_TYPE
    }

    pub fn der_content_type() -> &'static str {
        CRL_DER_CONTENT_TYPE
    }
}

//------------ CryptoAuthority -----------------------------------------------

/// The cryptographic operations the engines need, performed with the
/// root CA key.
pub trait CryptoAuthority: Send + Sync {
    fn generate_key(&self, algorithm: KeyAlgorithm) -> Result<KeyMaterial, Error>;

    fn build_csr(&self, key: &KeyMaterial, subject: &Subject) -> Result<SigningRequest, Error>;

    /// Signs the public key in the CSR for the given subject.
    ///
    /// The subject and SANs come from `subject`, not from the CSR.
    fn sign_certificate(
        &self,
        csr: &SigningRequest,
        subject: &Subject,
        serial: &Serial,
        validity: &Validity,
        crl_distribution_point: Option<&str>,
    ) -> Result<IssuedCertificate, Error>;

    /// Parses a PEM certificate. The name is used in error messages.
    fn parse_certificate(&self, name: &str, pem: &[u8]) -> Result<CertificateDetails, Error>;

    /// Returns a human readable dump of a PEM certificate.
    fn certificate_text(&self, name: &str, pem: &[u8]) -> Result<String, Error>;

    fn build_crl(&self, request: &CrlRequest) -> Result<CrlBundle, Error>;

    /// Returns the PEM encoded CA certificate.
    fn ca_certificate_pem(&self) -> Vec<u8>;

    /// Bundles a key, its certificate, and the CA certificate.
    fn export_pkcs12(&self, name: &str, key: &KeyMaterial, cert_pem: &[u8], password: &str) -> Result<Vec<u8>, Error>;
}

//------------ BackendError --------------------------------------------------

/// Errors from the crypto libraries, before they get their context.
#[derive(Debug)]
struct BackendError(String);

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ErrorStack> for BackendError {
    fn from(e: ErrorStack) -> Self {
        BackendError(e.to_string())
    }
}

impl From<der::Error> for BackendError {
    fn from(e: der::Error) -> Self {
        BackendError(e.to_string())
    }
}

impl From<der::pem::Error> for BackendError {
    fn from(e: der::pem::Error) -> Self {
        BackendError(e.to_string())
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

//------------ OpenSslAuthority ----------------------------------------------

/// A [`CryptoAuthority`] using OpenSSL and the root CA key in memory.
pub struct OpenSslAuthority {
    cert: X509,
    key: PKey<Private>,
    issuer: Name,
}

impl OpenSslAuthority {
    /// Loads the CA certificate and key from disk.
    ///
    /// All failures are reported as [`Error::CaKeyUnavailable`].
    pub fn load(cert_file: &Path, key_file: &Path, passphrase_file: Option<&Path>) -> Result<Self, Error> {
        let cert_pem = file::read(cert_file).map_err(Error::ca_key)?;
        let cert = X509::from_pem(&cert_pem)
            .map_err(|e| Error::ca_key(format!("cannot parse CA certificate '{}': {}", cert_file.display(), e)))?;

        let key_pem = file::read(key_file).map_err(Error::ca_key)?;
        let key = match passphrase_file {
            Some(path) => {
                let passphrase = file::read(path).map_err(Error::ca_key)?;
                let passphrase = String::from_utf8_lossy(&passphrase);
                PKey::private_key_from_pem_passphrase(&key_pem, passphrase.trim_end().as_bytes())
            }
            None => PKey::private_key_from_pem(&key_pem),
        }
        .map_err(|e| Error::ca_key(format!("cannot parse CA key '{}': {}", key_file.display(), e)))?;

        let authority = Self::new(cert, key)?;

        let now = Asn1Time::days_from_now(0).map_err(Error::ca_key)?;
        if authority.cert.not_after().compare(&now).is_ok_and(|order| order.is_lt()) {
            warn!("The CA certificate '{}' has expired", cert_file.display());
        }
        debug!("Loaded CA certificate for '{}'", one_line_dn(authority.cert.subject_name()));
        Ok(authority)
    }

    /// Creates an authority from a certificate and its key.
    pub fn new(cert: X509, key: PKey<Private>) -> Result<Self, Error> {
        let public = cert.public_key().map_err(Error::ca_key)?;
        if !public.public_eq(&key) {
            return Err(Error::ca_key("CA key does not match the CA certificate"));
        }
        signature_algorithm(&key).map_err(Error::ca_key)?;

        let der = cert.to_der().map_err(Error::ca_key)?;
        let issuer = x509_cert::Certificate::from_der(&der)
            .map_err(Error::ca_key)?
            .tbs_certificate
            .subject;

        Ok(OpenSslAuthority { cert, key, issuer })
    }

    /// Creates a fresh key and self-signed CA certificate.
    pub fn create_root(cn: &str, algorithm: KeyAlgorithm, validity: &Validity, serial: &Serial) -> Result<Self, Error> {
        let cert_and_key = || -> Result<(X509, PKey<Private>), BackendError> {
            let key = new_key(algorithm)?;
            let name = build_name(cn)?;

            let mut builder = X509Builder::new()?;
            builder.set_version(2)?;
            let serial_number = BigNum::from_hex_str(serial.as_str())?.to_asn1_integer()?;
            builder.set_serial_number(&serial_number)?;
            builder.set_subject_name(&name)?;
            builder.set_issuer_name(&name)?;
            builder.set_pubkey(&key)?;
            let not_before = asn1_time(validity.not_before)?;
            builder.set_not_before(&not_before)?;
            let not_after = asn1_time(validity.not_after)?;
            builder.set_not_after(&not_after)?;
            builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
            builder.append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build()?)?;
            let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
            builder.append_extension(ski)?;
            builder.sign(&key, MessageDigest::sha256())?;

            Ok((builder.build(), key))
        };
        let (cert, key) = cert_and_key().map_err(|e| Error::signing(cn, e))?;
        Self::new(cert, key)
    }

    /// Returns the CA key as PEM, encrypted if a passphrase is given.
    pub fn private_key_pem(&self, passphrase: Option<&str>) -> Result<Vec<u8>, Error> {
        match passphrase {
            Some(passphrase) => self
                .key
                .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), passphrase.as_bytes()),
            None => self.key.private_key_to_pem_pkcs8(),
        }
        .map_err(Error::ca_key)
    }

    fn sign(
        &self,
        csr: &SigningRequest,
        subject: &Subject,
        serial: &Serial,
        validity: &Validity,
        crl_distribution_point: Option<&str>,
    ) -> Result<X509, BackendError> {
        let req = X509Req::from_pem(&csr.pem)?;
        let pubkey = req.public_key()?;
        if !req.verify(&pubkey)? {
            return Err("signature on signing request does not verify".into());
        }

        let mut builder = X509Builder::new()?;
        builder.set_version(2)?;
        let serial_number = BigNum::from_hex_str(serial.as_str())?.to_asn1_integer()?;
        builder.set_serial_number(&serial_number)?;
        let subject_name = build_name(subject.cn())?;
        builder.set_subject_name(&subject_name)?;
        builder.set_issuer_name(self.cert.subject_name())?;
        builder.set_pubkey(&pubkey)?;
        let not_before = asn1_time(validity.not_before)?;
        builder.set_not_before(&not_before)?;
        let not_after = asn1_time(validity.not_after)?;
        builder.set_not_after(&not_after)?;

        builder.append_extension(BasicConstraints::new().critical().build()?)?;
        let mut key_usage = KeyUsage::new();
        key_usage.critical().digital_signature();
        if pubkey.id() == Id::RSA {
            key_usage.key_encipherment();
        }
        builder.append_extension(key_usage.build()?)?;
        builder.append_extension(ExtendedKeyUsage::new().server_auth().client_auth().build()?)?;

        let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(Some(&self.cert), None))?;
        builder.append_extension(ski)?;
        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .build(&builder.x509v3_context(Some(&self.cert), None))?;
        builder.append_extension(aki)?;

        if !subject.alt_names().is_empty() {
            let san = alt_names_extension(subject).build(&builder.x509v3_context(Some(&self.cert), None))?;
            builder.append_extension(san)?;
        }

        if let Some(uri) = crl_distribution_point {
            #[allow(deprecated)]
            let dp = X509Extension::new_nid(
                None,
                Some(&builder.x509v3_context(Some(&self.cert), None)),
                Nid::CRL_DISTRIBUTION_POINTS,
                &format!("URI:{}", uri),
            )?;
            builder.append_extension(dp)?;
        }

        builder.sign(&self.key, MessageDigest::sha256())?;
        Ok(builder.build())
    }

    fn encode_crl(&self, request: &CrlRequest) -> Result<CrlBundle, BackendError> {
        let algorithm = signature_algorithm(&self.key)?;

        let mut revoked = Vec::with_capacity(request.entries.len());
        for entry in &request.entries {
            revoked.push(RevokedCert {
                serial_number: SerialNumber::new(&entry.serial.to_bytes())?,
                revocation_date: der_time(entry.revocation_date)?,
                crl_entry_extensions: None,
            });
        }

        let mut extensions = vec![Extension {
            extn_id: CRL_NUMBER,
            critical: false,
            extn_value: OctetString::new(Uint::new(&request.number.to_be_bytes())?.to_der()?)?,
        }];
        if let Some(ski) = self.cert.subject_key_id() {
            let aki = AkiExtension {
                key_identifier: Some(OctetString::new(ski.as_slice())?),
                authority_cert_issuer: None,
                authority_cert_serial_number: None,
            };
            extensions.push(Extension {
                extn_id: AUTHORITY_KEY_IDENTIFIER,
                critical: false,
                extn_value: OctetString::new(aki.to_der()?)?,
            });
        }

        let tbs_cert_list = TbsCertList {
            version: x509_cert::Version::V2,
            signature: algorithm.clone(),
            issuer: self.issuer.clone(),
            this_update: der_time(request.this_update)?,
            next_update: Some(der_time(request.next_update)?),
            revoked_certificates: if revoked.is_empty() { None } else { Some(revoked) },
            crl_extensions: Some(extensions),
        };

        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)?;
        signer.update(&tbs_cert_list.to_der()?)?;
        let signature = signer.sign_to_vec()?;

        let crl = CertificateList {
            tbs_cert_list,
            signature_algorithm: algorithm,
            signature: BitString::from_bytes(&signature)?,
        };
        let der = crl.to_der()?;
        let pem = der::pem::encode_string("X509 CRL", LineEnding::LF, &der)?;

        Ok(CrlBundle {
            pem: pem.into_bytes(),
            der,
        })
    }

    fn pkcs12(&self, name: &str, key: &KeyMaterial, cert_pem: &[u8], password: &str) -> Result<Vec<u8>, BackendError> {
        let key = PKey::private_key_from_pem(&key.pem)?;
        let cert = X509::from_pem(cert_pem)?;
        let mut chain = Stack::new()?;
        chain.push(self.cert.clone())?;

        let mut builder = Pkcs12::builder();
        builder.name(name);
        builder.pkey(&key);
        builder.cert(&cert);
        builder.ca(chain);
        Ok(builder.build2(password)?.to_der()?)
    }
}

impl CryptoAuthority for OpenSslAuthority {
    fn generate_key(&self, algorithm: KeyAlgorithm) -> Result<KeyMaterial, Error> {
        let pem = new_key(algorithm)
            .and_then(|key| key.private_key_to_pem_pkcs8())
            .map_err(|e| Error::signing(format!("new {} key", algorithm), e))?;
        Ok(KeyMaterial { pem })
    }

    fn build_csr(&self, key: &KeyMaterial, subject: &Subject) -> Result<SigningRequest, Error> {
        let csr = || -> Result<Vec<u8>, BackendError> {
            let key = PKey::private_key_from_pem(&key.pem)?;
            let mut builder = X509ReqBuilder::new()?;
            builder.set_version(0)?;
            let subject_name = build_name(subject.cn())?;
            builder.set_subject_name(&subject_name)?;
            builder.set_pubkey(&key)?;
            if !subject.alt_names().is_empty() {
                let san = alt_names_extension(subject).build(&builder.x509v3_context(None))?;
                let mut extensions = Stack::new()?;
                extensions.push(san)?;
                builder.add_extensions(&extensions)?;
            }
            builder.sign(&key, MessageDigest::sha256())?;
            Ok(builder.build().to_pem()?)
        };
        let pem = csr().map_err(|e| Error::signing(subject.cn(), e))?;
        Ok(SigningRequest { pem })
    }

    fn sign_certificate(
        &self,
        csr: &SigningRequest,
        subject: &Subject,
        serial: &Serial,
        validity: &Validity,
        crl_distribution_point: Option<&str>,
    ) -> Result<IssuedCertificate, Error> {
        let cert = self
            .sign(csr, subject, serial, validity, crl_distribution_point)
            .map_err(|e| Error::signing(subject.cn(), e))?;
        let pem = cert.to_pem().map_err(|e| Error::signing(subject.cn(), e))?;
        let details = certificate_details(&cert).map_err(|e| Error::signing(subject.cn(), e))?;
        Ok(IssuedCertificate { pem, details })
    }

    fn parse_certificate(&self, name: &str, pem: &[u8]) -> Result<CertificateDetails, Error> {
        let cert = X509::from_pem(pem).map_err(|e| Error::extraction(name, e))?;
        certificate_details(&cert).map_err(|e| Error::extraction(name, e))
    }

    fn certificate_text(&self, name: &str, pem: &[u8]) -> Result<String, Error> {
        let text = X509::from_pem(pem)
            .and_then(|cert| cert.to_text())
            .map_err(|e| Error::extraction(name, e))?;
        String::from_utf8(text).map_err(|e| Error::extraction(name, e))
    }

    fn build_crl(&self, request: &CrlRequest) -> Result<CrlBundle, Error> {
        self.encode_crl(request).map_err(Error::crl)
    }

    fn ca_certificate_pem(&self) -> Vec<u8> {
        self.cert.to_pem().unwrap_or_default()
    }

    fn export_pkcs12(&self, name: &str, key: &KeyMaterial, cert_pem: &[u8], password: &str) -> Result<Vec<u8>, Error> {
        self.pkcs12(name, key, cert_pem, password)
            .map_err(|e| Error::signing(name, format!("cannot create PKCS#12 bundle: {}", e)))
    }
}

//------------ Helpers -------------------------------------------------------

fn new_key(algorithm: KeyAlgorithm) -> Result<PKey<Private>, ErrorStack> {
    match algorithm {
        KeyAlgorithm::Rsa2048 => PKey::from_rsa(Rsa::generate(2048)?),
        KeyAlgorithm::Rsa4096 => PKey::from_rsa(Rsa::generate(4096)?),
        KeyAlgorithm::EcP256 => {
            let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
            PKey::from_ec_key(EcKey::generate(&group)?)
        }
    }
}

fn build_name(cn: &str) -> Result<X509Name, ErrorStack> {
    let mut name = X509Name::builder()?;
    name.append_entry_by_nid(Nid::COMMONNAME, cn)?;
    Ok(name.build())
}

fn alt_names_extension(subject: &Subject) -> SubjectAlternativeName {
    let mut san = SubjectAlternativeName::new();
    for dns in subject.dns_names() {
        san.dns(dns);
    }
    for ip in subject.ip_addresses() {
        san.ip(&ip.to_string());
    }
    san
}

fn signature_algorithm(key: &PKeyRef<Private>) -> Result<AlgorithmIdentifierOwned, BackendError> {
    match key.id() {
        Id::RSA => Ok(AlgorithmIdentifierOwned {
            oid: SHA256_WITH_RSA,
            parameters: Some(Any::from(Null)),
        }),
        Id::EC => Ok(AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA256,
            parameters: None,
        }),
        _ => Err("unsupported CA key type, expected RSA or EC".into()),
    }
}

fn asn1_time(time: DateTime<Utc>) -> Result<Asn1Time, ErrorStack> {
    Asn1Time::from_unix(time.timestamp())
}

fn chrono_time(time: &Asn1TimeRef) -> Result<DateTime<Utc>, BackendError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(secs, 0).ok_or_else(|| "time out of range".into())
}

/// Converts to the X.509 time encoding, GeneralizedTime from 2050 on.
fn der_time(time: DateTime<Utc>) -> Result<Time, BackendError> {
    let secs = u64::try_from(time.timestamp()).map_err(|_| BackendError::from("time before 1970"))?;
    let since_epoch = Duration::from_secs(secs);
    if time.year() >= 2050 {
        Ok(Time::GeneralTime(GeneralizedTime::from_unix_duration(since_epoch)?))
    } else {
        Ok(Time::UtcTime(UtcTime::from_unix_duration(since_epoch)?))
    }
}

fn one_line_dn(name: &X509NameRef) -> String {
    let mut dn = String::new();
    for entry in name.entries() {
        let key = entry.object().nid().short_name().unwrap_or("?");
        let value = entry.data().as_utf8().map(|s| s.to_string()).unwrap_or_default();
        dn.push('/');
        dn.push_str(key);
        dn.push('=');
        dn.push_str(&value);
    }
    dn
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
        Some(IpAddr::from(v4))
    } else if let Ok(v6) = <[u8; 16]>::try_from(bytes) {
        Some(IpAddr::from(v6))
    } else {
        None
    }
}

fn certificate_details(cert: &X509Ref) -> Result<CertificateDetails, BackendError> {
    let subject_cn = cert
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .ok_or("certificate has no common name")?
        .data()
        .as_utf8()?
        .to_string();

    let serial = cert.serial_number().to_bn()?.to_hex_str()?;
    let serial = Serial::from_str(&serial).map_err(|e| BackendError(e.to_string()))?;

    let mut alt_names = Vec::new();
    if let Some(names) = cert.subject_alt_names() {
        for name in &names {
            if let Some(dns) = name.dnsname() {
                alt_names.push(SubjectAltName::Dns(dns.to_string()));
            } else if let Some(addr) = name.ipaddress().and_then(ip_from_bytes) {
                alt_names.push(SubjectAltName::Ip(addr));
            }
        }
    }

    Ok(CertificateDetails {
        subject_cn,
        subject: one_line_dn(cert.subject_name()),
        issuer: one_line_dn(cert.issuer_name()),
        serial,
        validity: Validity {
            not_before: chrono_time(cert.not_before())?,
            not_after: chrono_time(cert.not_after())?,
        },
        alt_names,
    })
}

//------------ Tests ---------------------------------------------------------
