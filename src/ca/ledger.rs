//! The index ledger: the authoritative record of every certificate ever
//! issued by the CA.

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use log::trace;

use crate::ca::{cn_from_dn, CertRecord, RecordState, Serial, SubjectAltName};
use crate::commons::error::Error;
use crate::commons::util::file::{self, Visibility};

//------------ IndexLedger ---------------------------------------------------

/// Storage for certificate records, keyed by serial.
///
/// Implementations only guarantee that single calls are atomic. Callers
/// combining calls, e.g. a lookup followed by an update, must hold the CA
/// lock.
pub trait IndexLedger: Send + Sync {
    /// Adds a new record. Fails if the serial was used before.
    fn append(&self, record: &CertRecord) -> Result<(), Error>;

    /// Replaces the state of a record and returns the updated record.
    fn update_status(&self, serial: &Serial, state: RecordState) -> Result<CertRecord, Error>;

    fn find_by_serial(&self, serial: &Serial) -> Result<Option<CertRecord>, Error>;

    /// Returns all records in the order they were added.
    fn all(&self) -> Result<Vec<CertRecord>, Error>;
}

fn duplicate_serial(serial: &Serial) -> Error {
    Error::io(
        format!("Cannot add ledger record for serial '{}'", serial),
        io::Error::new(io::ErrorKind::AlreadyExists, "serial already in use"),
    )
}

//------------ FileLedger ----------------------------------------------------

/// A ledger kept in an OpenSSL `index.txt` file.
///
/// Each line has the tab separated OpenSSL columns: status (`V`, `R`, or
/// `E`), expiry time, revocation time, serial, file name, and DN. Two
/// extra columns carry the start of validity and the subject alternative
/// names. Lines with only the first four to six columns, as written by
/// other tools, are read as well.
#[derive(Clone, Debug)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: &Path) -> Self {
        FileLedger { path: path.to_path_buf() }
    }

    /// Creates an empty ledger file unless one exists.
    pub fn create(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            file::save(b"", path, Visibility::Public)?;
        }
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<CertRecord>, Error> {
        let bytes = match file::read_opt(&self.path)? {
            Some(bytes) => bytes,
            None => return Ok(Vec::new()),
        };
        let content = String::from_utf8(bytes).map_err(|e| Error::ledger(0, format!("not UTF-8: {}", e)))?;

        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            records.push(parse_line(line).map_err(|reason| Error::ledger(idx + 1, reason))?);
        }
        Ok(records)
    }

    fn store(&self, records: &[CertRecord]) -> Result<(), Error> {
        let mut content = String::new();
        for record in records {
            content.push_str(&format_line(record));
            content.push('\n');
        }
        file::save(content.as_bytes(), &self.path, Visibility::Public)?;
        trace!("Wrote {} records to '{}'", records.len(), self.path.display());
        Ok(())
    }
}

impl IndexLedger for FileLedger {
    fn append(&self, record: &CertRecord) -> Result<(), Error> {
        let mut records = self.load()?;
        if records.iter().any(|r| r.serial == record.serial) {
            return Err(duplicate_serial(&record.serial));
        }
        records.push(record.clone());
        self.store(&records)
    }

    fn update_status(&self, serial: &Serial, state: RecordState) -> Result<CertRecord, Error> {
        let mut records = self.load()?;
        let record = records
            .iter_mut()
            .find(|r| &r.serial == serial)
            .ok_or_else(|| Error::NotFound(serial.to_string()))?;
        record.state = state;
        let updated = record.clone();
        self.store(&records)?;
        Ok(updated)
    }

    fn find_by_serial(&self, serial: &Serial) -> Result<Option<CertRecord>, Error> {
        Ok(self.load()?.into_iter().find(|r| &r.serial == serial))
    }

    fn all(&self) -> Result<Vec<CertRecord>, Error> {
        self.load()
    }
}

/// Formats a time the way OpenSSL does in `index.txt`.
///
/// That is UTCTime before 2050 and GeneralizedTime from then on.
pub fn format_index_time(time: DateTime<Utc>) -> String {
    if (1950..2050).contains(&time.year()) {
        time.format("%y%m%d%H%M%SZ").to_string()
    } else {
        time.format("%Y%m%d%H%M%SZ").to_string()
    }
}

/// Parses a UTCTime or GeneralizedTime as found in `index.txt`.
pub fn parse_index_time(s: &str) -> Result<DateTime<Utc>, String> {
    if !s.is_ascii() {
        return Err(format!("invalid time '{}'", s));
    }
    let full = match s.len() {
        13 => {
            let yy: u32 = s[..2].parse().map_err(|_| format!("invalid time '{}'", s))?;
            let century = if yy < 50 { "20" } else { "19" };
            format!("{}{}", century, s)
        }
        15 => s.to_string(),
        _ => return Err(format!("invalid time '{}'", s)),
    };
    NaiveDateTime::parse_from_str(&full, "%Y%m%d%H%M%SZ")
        .map(|time| time.and_utc())
        .map_err(|e| format!("invalid time '{}': {}", s, e))
}

fn parse_line(line: &str) -> Result<CertRecord, String> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 4 {
        return Err(format!("expected at least 4 columns, found {}", cols.len()));
    }

    let not_after = parse_index_time(cols[1].trim())?;

    let state = match cols[0].trim() {
        "V" => RecordState::Valid,
        "E" => RecordState::Expired,
        "R" => {
            // OpenSSL may append a reason: "<time>,keyCompromise"
            let date = cols[2].split(',').next().unwrap_or_default().trim();
            RecordState::Revoked { date: parse_index_time(date)? }
        }
        other => return Err(format!("unknown status '{}'", other)),
    };

    let serial = Serial::from_str(cols[3]).map_err(|e| e.to_string())?;

    let file_name = cols
        .get(4)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "unknown")
        .map(ToString::to_string);

    let subject = cols.get(5).map(|s| s.trim().to_string()).unwrap_or_default();
    let subject_cn = cn_from_dn(&subject).unwrap_or_default();

    let not_before = match cols.get(6).map(|s| s.trim()) {
        Some(s) if !s.is_empty() => Some(parse_index_time(s)?),
        _ => None,
    };

    let mut alt_names = Vec::new();
    if let Some(sans) = cols.get(7) {
        for san in sans.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            alt_names.push(SubjectAltName::from_str(san).map_err(|e| e.to_string())?);
        }
    }

    Ok(CertRecord {
        serial,
        state,
        not_before,
        not_after,
        subject,
        subject_cn,
        alt_names,
        file_name,
    })
}

fn format_line(record: &CertRecord) -> String {
    let (status, revoked) = match record.state {
        RecordState::Valid => ('V', String::new()),
        RecordState::Expired => ('E', String::new()),
        RecordState::Revoked { date } => ('R', format_index_time(date)),
    };
    let alt_names: Vec<String> = record.alt_names.iter().map(ToString::to_string).collect();

    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        status,
        format_index_time(record.not_after),
        revoked,
        record.serial.to_padded(),
        record.file_name.as_deref().unwrap_or("unknown"),
        record.subject,
        record.not_before.map(format_index_time).unwrap_or_default(),
        alt_names.join(",")
    )
}

//------------ MemoryLedger --------------------------------------------------

/// A ledger kept in memory only, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<CertRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexLedger for MemoryLedger {
    fn append(&self, record: &CertRecord) -> Result<(), Error> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.iter().any(|r| r.serial == record.serial) {
            return Err(duplicate_serial(&record.serial));
        }
        records.push(record.clone());
        Ok(())
    }

    fn update_status(&self, serial: &Serial, state: RecordState) -> Result<CertRecord, Error> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = records
            .iter_mut()
            .find(|r| &r.serial == serial)
            .ok_or_else(|| Error::NotFound(serial.to_string()))?;
        record.state = state;
        Ok(record.clone())
    }

    fn find_by_serial(&self, serial: &Serial) -> Result<Option<CertRecord>, Error> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.iter().find(|r| &r.serial == serial).cloned())
    }

    fn all(&self) -> Result<Vec<CertRecord>, Error> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.clone())
    }
}

//------------ Tests ---------------------------------------------------------
