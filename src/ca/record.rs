//! Certificate records, subjects, and the status model.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Serialize, Serializer};

use crate::ca::Serial;
use crate::commons::error::Error;

//------------ SubjectAltName ------------------------------------------------

/// A subject alternative name: either a DNS name or an IP address.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SubjectAltName {
    Dns(String),
    Ip(IpAddr),
}

impl SubjectAltName {
    pub fn is_dns(&self) -> bool {
        matches!(self, SubjectAltName::Dns(_))
    }
}

impl fmt::Display for SubjectAltName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubjectAltName::Dns(name) => write!(f, "DNS:{}", name),
            SubjectAltName::Ip(addr) => write!(f, "IP:{}", addr),
        }
    }
}

impl FromStr for SubjectAltName {
    type Err = Error;

    /// Parses `DNS:name` or `IP:address`.
    ///
    /// OpenSSL's text output uses `IP Address:` which is accepted as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix("DNS:") {
            Ok(SubjectAltName::Dns(name.trim().to_string()))
        } else if let Some(addr) = s.strip_prefix("IP Address:").or_else(|| s.strip_prefix("IP:")) {
            let addr = addr.trim();
            IpAddr::from_str(addr)
                .map(SubjectAltName::Ip)
                .map_err(|_| Error::invalid_subject(format!("'{}' is not an IP address", addr)))
        } else {
            Err(Error::invalid_subject(format!("unsupported subject alternative name '{}'", s)))
        }
    }
}

impl Serialize for SubjectAltName {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(s)
    }
}

//------------ Subject -------------------------------------------------------

/// A validated certificate subject: the common name and the SAN set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subject {
    cn: String,
    alt_names: Vec<SubjectAltName>,
}

impl Subject {
    /// Creates a subject from user input.
    ///
    /// All values are trimmed and empty entries dropped. The common name
    /// must remain non-empty and every IP entry must be an IPv4 or IPv6
    /// address. Duplicates are removed, keeping the first occurrence.
    pub fn new<D, I>(cn: &str, dns_names: &[D], ip_names: &[I]) -> Result<Self, Error>
    where
        D: AsRef<str>,
        I: AsRef<str>,
    {
        let mut alt_names = Vec::new();

        for dns in dns_names {
            let dns = dns.as_ref().trim();
            if !dns.is_empty() {
                alt_names.push(SubjectAltName::Dns(dns.to_string()));
            }
        }

        for ip in ip_names {
            let ip = ip.as_ref().trim();
            if !ip.is_empty() {
                let addr = IpAddr::from_str(ip)
                    .map_err(|_| Error::invalid_subject(format!("'{}' is not an IP address", ip)))?;
                alt_names.push(SubjectAltName::Ip(addr));
            }
        }

        Self::with_alt_names(cn, alt_names)
    }

    /// Creates a subject from an already typed SAN list.
    pub fn with_alt_names(cn: &str, alt_names: Vec<SubjectAltName>) -> Result<Self, Error> {
        let cn = cn.trim();
        if cn.is_empty() {
            return Err(Error::invalid_subject("common name must not be empty"));
        }
        if cn.chars().any(char::is_control) {
            return Err(Error::invalid_subject(format!(
                "common name '{}' contains control characters",
                cn.escape_debug()
            )));
        }

        let mut unique: Vec<SubjectAltName> = Vec::with_capacity(alt_names.len());
        for name in alt_names {
            if let SubjectAltName::Dns(dns) = &name {
                if dns.is_empty() || dns.chars().any(|c| c.is_whitespace() || c.is_control() || c == ',') {
                    return Err(Error::invalid_subject(format!("'{}' is not a DNS name", dns.escape_debug())));
                }
            }
            if !unique.contains(&name) {
                unique.push(name);
            }
        }

        Ok(Subject {
            cn: cn.to_string(),
            alt_names: unique,
        })
    }

    pub fn cn(&self) -> &str {
        &self.cn
    }

    pub fn alt_names(&self) -> &[SubjectAltName] {
        &self.alt_names
    }

    pub fn dns_names(&self) -> impl Iterator<Item = &str> {
        self.alt_names.iter().filter_map(|name| match name {
            SubjectAltName::Dns(dns) => Some(dns.as_str()),
            SubjectAltName::Ip(_) => None,
        })
    }

    pub fn ip_addresses(&self) -> impl Iterator<Item = &IpAddr> {
        self.alt_names.iter().filter_map(|name| match name {
            SubjectAltName::Dns(_) => None,
            SubjectAltName::Ip(addr) => Some(addr),
        })
    }

    /// Returns the subject as an OpenSSL style one line DN.
    ///
    /// Slashes and backslashes in the common name are escaped with a
    /// backslash.
    pub fn distinguished_name(&self) -> String {
        format!("/CN={}", escape_dn_value(&self.cn))
    }

    /// Returns the base name shared by the files issued for this subject.
    ///
    /// Characters other than ASCII letters, digits, `.`, `-`, and `_` are
    /// replaced, a wildcard label becomes `star`.
    pub fn base_name(&self, serial: &Serial) -> String {
        let mut name = String::with_capacity(self.cn.len());
        for c in self.cn.chars() {
            match c {
                '*' => name.push_str("star"),
                c if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' => name.push(c),
                _ => name.push('_'),
            }
        }
        let name = name.trim_matches('.');
        format!("{}_{}", name, serial)
    }
}

/// Extracts the common name from an OpenSSL style one line DN.
///
/// A `\` escapes the next character, so `\/` is a slash inside a value.
/// Returns `None` if there is no `CN` component.
pub fn cn_from_dn(dn: &str) -> Option<String> {
    split_dn(dn)
        .into_iter()
        .filter_map(|part| {
            part.split_once('=')
                .filter(|(key, _)| key.trim() == "CN")
                .map(|(_, value)| value.trim().to_string())
        })
        .next_back()
}

/// Splits a one line DN at unescaped slashes and removes the escapes.
fn split_dn(dn: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = dn.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '/' => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Escapes a DN value so that [`cn_from_dn`] reads it back unchanged.
fn escape_dn_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '/' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

//------------ Validity ------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Validity {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl Validity {
    /// Returns a validity starting at `now` and lasting `days`.
    ///
    /// The start is truncated to whole seconds, the precision of X.509
    /// times. Returns `None` if the end would lie after the last time an
    /// X.509 certificate can express, 9999-12-31 23:59:59 UTC.
    pub fn days_from(now: DateTime<Utc>, days: u32) -> Option<Self> {
        let not_before = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        let not_after = not_before.checked_add_signed(Duration::try_days(i64::from(days))?)?;
        let latest = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).single()?;
        if not_after > latest {
            return None;
        }
        Some(Validity { not_before, not_after })
    }
}

//------------ CertStatus ----------------------------------------------------

/// The status of a certificate as shown to callers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertStatus {
    Valid,
    Revoked,
    Expired,
}

impl CertStatus {
    /// Returns the status letter used in `index.txt`.
    pub fn letter(self) -> char {
        match self {
            CertStatus::Valid => 'V',
            CertStatus::Revoked => 'R',
            CertStatus::Expired => 'E',
        }
    }
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CertStatus::Valid => write!(f, "Valid"),
            CertStatus::Revoked => write!(f, "Revoked"),
            CertStatus::Expired => write!(f, "Expired"),
        }
    }
}

//------------ RecordState ---------------------------------------------------

/// The status stored in the ledger.
///
/// Expiry is normally derived from `not_after`, but an explicit `E`
/// written by other tooling is kept.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RecordState {
    Valid,
    Revoked { date: DateTime<Utc> },
    Expired,
}

//------------ CertRecord ----------------------------------------------------

/// A row of the index ledger.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CertRecord {
    pub serial: Serial,

    pub state: RecordState,

    /// Not known for rows written by other tooling.
    pub not_before: Option<DateTime<Utc>>,

    pub not_after: DateTime<Utc>,

    /// The full one line DN, e.g. `/CN=test.local`.
    pub subject: String,

    pub subject_cn: String,

    pub alt_names: Vec<SubjectAltName>,

    /// Base name of the file set, if known.
    pub file_name: Option<String>,
}

impl CertRecord {
    /// Creates a fresh `Valid` record for a newly issued certificate.
    pub fn issued(serial: Serial, subject: &Subject, validity: Validity, base_name: String) -> Self {
        CertRecord {
            serial,
            state: RecordState::Valid,
            not_before: Some(validity.not_before),
            not_after: validity.not_after,
            subject: subject.distinguished_name(),
            subject_cn: subject.cn().to_string(),
            alt_names: subject.alt_names().to_vec(),
            file_name: Some(base_name),
        }
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> CertStatus {
        match self.state {
            RecordState::Revoked { .. } => CertStatus::Revoked,
            RecordState::Expired => CertStatus::Expired,
            RecordState::Valid if self.not_after <= now => CertStatus::Expired,
            RecordState::Valid => CertStatus::Valid,
        }
    }

    pub fn status(&self) -> CertStatus {
        self.status_at(Utc::now())
    }

    pub fn is_revoked(&self) -> bool {
        matches!(self.state, RecordState::Revoked { .. })
    }

    pub fn revocation_date(&self) -> Option<DateTime<Utc>> {
        match self.state {
            RecordState::Revoked { date } => Some(date),
            _ => None,
        }
    }
}

//------------ Tests ---------------------------------------------------------
