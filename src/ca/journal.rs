//! The write-ahead journal for revocations.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::ca::Serial;
use crate::commons::error::Error;
use crate::commons::util::file::{self, Visibility};

//------------ RevocationIntent ----------------------------------------------

/// A revocation that was started but not yet completed.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RevocationIntent {
    pub serial: Serial,
    pub base_name: Option<String>,
    pub revoked_at: DateTime<Utc>,
}

//------------ RevocationJournal ---------------------------------------------

/// Holds at most one [`RevocationIntent`].
///
/// The intent is written before a revocation changes anything and
/// removed once the file set is archived. Whatever is found at startup
/// was interrupted.
#[derive(Clone, Debug)]
pub struct RevocationJournal {
    path: PathBuf,
}

impl RevocationJournal {
    pub fn new(path: &Path) -> Self {
        RevocationJournal { path: path.to_path_buf() }
    }

    pub fn begin(&self, intent: &RevocationIntent) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(intent)
            .map_err(|e| Error::io("cannot serialize revocation journal", io::Error::other(e)))?;
        file::save(&json, &self.path, Visibility::Public)?;
        debug!("Journaled revocation of {}", intent.serial);
        Ok(())
    }

    pub fn pending(&self) -> Result<Option<RevocationIntent>, Error> {
        match file::read_opt(&self.path)? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                Error::io(
                    format!("cannot parse revocation journal '{}'", self.path.display()),
                    io::Error::new(io::ErrorKind::InvalidData, e),
                )
            }),
        }
    }

    pub fn clear(&self) -> Result<(), Error> {
        match file::delete_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//------------ Tests ---------------------------------------------------------
