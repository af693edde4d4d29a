//! Export of the index ledger as plain text.

use std::io;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ca::{format_index_time, AuthorityContext, CertStatus, RecordState, Serial};
use crate::commons::error::Error;

//------------ IndexProjection -----------------------------------------------

/// One exported row of the index ledger.
///
/// The status is the one stored in the ledger, certificates that expired
/// without anyone marking them still show as valid, as in `index.txt`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct IndexProjection {
    pub status: CertStatus,
    pub expiry: DateTime<Utc>,
    pub serial: Serial,
    pub subject: String,
}

impl AuthorityContext {
    /// Returns every ledger row in ledger order.
    pub fn export_index(&self) -> Result<Vec<IndexProjection>, Error> {
        Ok(self
            .ledger
            .all()?
            .into_iter()
            .map(|record| IndexProjection {
                status: match record.state {
                    RecordState::Valid => CertStatus::Valid,
                    RecordState::Revoked { .. } => CertStatus::Revoked,
                    RecordState::Expired => CertStatus::Expired,
                },
                expiry: record.not_after,
                serial: record.serial,
                subject: record.subject,
            })
            .collect())
    }
}

/// Writes exported rows as tab separated text below a comment header.
pub fn render_index_export<W: io::Write>(rows: &[IndexProjection], target: &mut W) -> io::Result<()> {
    writeln!(target, "# Status | Expiry | Serial | Subject")?;
    writeln!(target, "# ===========================================")?;
    for row in rows {
        writeln!(
            target,
            "{}\t{}\t{}\t{}",
            row.status.letter(),
            format_index_time(row.expiry),
            row.serial.to_padded(),
            row.subject
        )?;
    }
    Ok(())
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::commons::test;

    #[test]
    fn renders_header_and_rows() {
        let rows = vec![
            IndexProjection {
                status: CertStatus::Valid,
                expiry: DateTime::from_timestamp(1_893_456_000, 0).unwrap(),
                serial: Serial::from_str("a3f").unwrap(),
                subject: "/CN=test.local".into(),
            },
            IndexProjection {
                status: CertStatus::Revoked,
                expiry: DateTime::from_timestamp(1_893_456_000, 0).unwrap(),
                serial: Serial::from_str("10").unwrap(),
                subject: "/CN=old.test.local".into(),
            },
        ];
        let mut out = Vec::new();
        render_index_export(&rows, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "# Status | Expiry | Serial | Subject");
        assert!(lines[1].starts_with("# ==="));
        assert_eq!(lines[2], "V\t300101000000Z\t0A3F\t/CN=test.local");
        assert_eq!(lines[3], "R\t300101000000Z\t10\t/CN=old.test.local");
    }

    #[test]
    fn exports_ledger_rows() {
        test::test_under_tmp(|dir| {
            let context = test::open_ca(&dir);
            let first = context.issue("one.example.net", &[] as &[&str], &[] as &[&str]).unwrap();
            let second = context.issue("two.example.net", &[] as &[&str], &[] as &[&str]).unwrap();
            context.revoke(first.serial.as_str()).unwrap();

            let rows = context.export_index().unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].serial, first.serial);
            assert_eq!(rows[0].status, CertStatus::Revoked);
            assert_eq!(rows[1].serial, second.serial);
            assert_eq!(rows[1].subject, "/CN=two.example.net");
            assert_eq!(rows[1].expiry, second.not_after);
        });
    }
}
