//! Formatting command results for the user.

use std::fmt::Write as _;
use std::str::FromStr;
use std::{error, fmt};

use serde::Serialize;

use crate::ca::{
    render_index_export, CertRecord, CertificateReport, CertificateView, CrlBundle, IndexProjection, RecoveryReport,
    RevocationSummary, RootCa,
};

//------------ ReportFormat --------------------------------------------------

/// The format to use when printing a result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, ReportError> {
        match s {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            _ => Err(ReportError::UnrecognisedFormat(s.to_string())),
        }
    }
}

//------------ ReportError ---------------------------------------------------

#[derive(Debug)]
pub enum ReportError {
    UnrecognisedFormat(String),
    Json(serde_json::Error),
    Render(String),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReportError::UnrecognisedFormat(s) => write!(f, "This report format is not recognised: {}", s),
            ReportError::Json(e) => write!(f, "Cannot produce JSON: {}", e),
            ReportError::Render(e) => write!(f, "Cannot render report: {}", e),
        }
    }
}

impl error::Error for ReportError {}

impl From<serde_json::Error> for ReportError {
    fn from(e: serde_json::Error) -> Self {
        ReportError::Json(e)
    }
}

impl From<fmt::Error> for ReportError {
    fn from(e: fmt::Error) -> Self {
        ReportError::Render(e.to_string())
    }
}

//------------ Report --------------------------------------------------------

/// Implemented by everything a command can print.
pub trait Report {
    fn report(&self, format: ReportFormat) -> Result<String, ReportError>;
}

fn json<T: Serialize + ?Sized>(value: &T) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn alt_names<T: fmt::Display>(names: &[T]) -> String {
    names.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl Report for CertRecord {
    fn report(&self, format: ReportFormat) -> Result<String, ReportError> {
        match format {
            ReportFormat::Json => json(self),
            ReportFormat::Text => {
                let mut res = String::new();
                writeln!(res, "Serial:     {}", self.serial)?;
                writeln!(res, "Subject:    {}", self.subject)?;
                if !self.alt_names.is_empty() {
                    writeln!(res, "SANs:       {}", alt_names(&self.alt_names))?;
                }
                if let Some(not_before) = self.not_before {
                    writeln!(res, "Not before: {}", not_before.to_rfc3339())?;
                }
                writeln!(res, "Not after:  {}", self.not_after.to_rfc3339())?;
                writeln!(res, "Status:     {}", self.status())?;
                if let Some(file_name) = &self.file_name {
                    writeln!(res, "Files:      {}.*", file_name)?;
                }
                Ok(res)
            }
        }
    }
}

impl Report for RevocationSummary {
    fn report(&self, format: ReportFormat) -> Result<String, ReportError> {
        match format {
            ReportFormat::Json => json(self),
            ReportFormat::Text => {
                let mut res = String::new();
                writeln!(
                    res,
                    "Revoked {} ({}) at {}",
                    self.serial,
                    self.subject_cn,
                    self.revocation_date.to_rfc3339()
                )?;
                writeln!(res, "Published CRL number {:X}", self.crl_number)?;
                for file in &self.moved_files {
                    writeln!(res, "Archived {}", file)?;
                }
                Ok(res)
            }
        }
    }
}

impl Report for Vec<CertificateView> {
    fn report(&self, format: ReportFormat) -> Result<String, ReportError> {
        match format {
            ReportFormat::Json => json(self),
            ReportFormat::Text => {
                let mut res = String::new();
                for view in self {
                    let serial = view.serial.as_ref().map(ToString::to_string);
                    let status = view.status.map(|status| status.to_string());
                    let expiry = view.not_after.map(|time| time.format("%Y-%m-%d").to_string());
                    write!(
                        res,
                        "{:<8} {:<8} {:<18} {:<10} {}",
                        view.location.to_string(),
                        status.as_deref().unwrap_or(crate::ca::UNKNOWN),
                        serial.as_deref().unwrap_or(crate::ca::UNKNOWN),
                        expiry.as_deref().unwrap_or(crate::ca::UNKNOWN),
                        view.subject_cn
                    )?;
                    if !view.alt_names.is_empty() {
                        write!(res, " [{}]", alt_names(&view.alt_names))?;
                    }
                    if let Some(note) = &view.note {
                        write!(res, " ({})", note)?;
                    }
                    writeln!(res)?;
                }
                Ok(res)
            }
        }
    }
}

impl Report for CertificateReport {
    fn report(&self, format: ReportFormat) -> Result<String, ReportError> {
        match format {
            ReportFormat::Json => json(self),
            ReportFormat::Text => Ok(self.text.clone()),
        }
    }
}

impl Report for CrlBundle {
    fn report(&self, format: ReportFormat) -> Result<String, ReportError> {
        match format {
            ReportFormat::Json => json(&serde_json::json!({
                "pem": String::from_utf8_lossy(&self.pem),
                "pem_content_type": CrlBundle::pem_content_type(),
                "der": hex::encode(&self.der),
                "der_content_type": CrlBundle::der_content_type(),
            })),
            ReportFormat::Text => Ok(String::from_utf8_lossy(&self.pem).into_owned()),
        }
    }
}

impl Report for Vec<IndexProjection> {
    fn report(&self, format: ReportFormat) -> Result<String, ReportError> {
        match format {
            ReportFormat::Json => json(self),
            ReportFormat::Text => {
                let mut res = Vec::new();
                render_index_export(self, &mut res).map_err(|e| ReportError::Render(e.to_string()))?;
                String::from_utf8(res).map_err(|e| ReportError::Render(e.to_string()))
            }
        }
    }
}

impl Report for RecoveryReport {
    fn report(&self, format: ReportFormat) -> Result<String, ReportError> {
        match format {
            ReportFormat::Json => json(self),
            ReportFormat::Text => {
                let mut res = String::new();
                if let Some(serial) = &self.completed_revocation {
                    writeln!(res, "Completed interrupted revocation of {}", serial)?;
                }
                if let Some(serial) = &self.discarded_revocation {
                    writeln!(res, "Discarded interrupted revocation of {}", serial)?;
                }
                for file in &self.moved_files {
                    writeln!(res, "Archived {}", file)?;
                }
                if self.crl_regenerated {
                    writeln!(res, "Regenerated the CRL")?;
                }
                if res.is_empty() {
                    writeln!(res, "Nothing to recover")?;
                }
                Ok(res)
            }
        }
    }
}

impl Report for RootCa {
    fn report(&self, format: ReportFormat) -> Result<String, ReportError> {
        match format {
            ReportFormat::Json => json(self),
            ReportFormat::Text => {
                let mut res = String::new();
                writeln!(res, "Created root CA '{}'", self.cn)?;
                writeln!(res, "Serial:      {}", self.serial)?;
                writeln!(res, "Valid until: {}", self.validity.not_after.to_rfc3339())?;
                writeln!(res, "Certificate: {}", self.cert_file.display())?;
                writeln!(res, "Key:         {}", self.key_file.display())?;
                Ok(res)
            }
        }
    }
}

//------------ Tests ---------------------------------------------------------
