//! On-disk storage of issued certificates and their key material.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;

use crate::ca::Serial;
use crate::commons::error::Error;
use crate::commons::util::file::{self, Visibility};
use crate::config::Config;

//------------ ArtifactKind --------------------------------------------------

/// The kinds of files making up a certificate file set.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Key,
    Csr,
    Cert,
    FullChain,
    Pkcs12,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Key,
        ArtifactKind::Csr,
        ArtifactKind::Cert,
        ArtifactKind::FullChain,
        ArtifactKind::Pkcs12,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::Key => ".key.pem",
            ArtifactKind::Csr => ".csr.pem",
            ArtifactKind::Cert => ".cert.pem",
            ArtifactKind::FullChain => ".fullchain.pem",
            ArtifactKind::Pkcs12 => ".p12",
        }
    }

    fn visibility(self) -> Visibility {
        match self {
            ArtifactKind::Key | ArtifactKind::Pkcs12 => Visibility::Private,
            _ => Visibility::Public,
        }
    }

    pub fn file_name(self, base_name: &str) -> String {
        format!("{}{}", base_name, self.suffix())
    }

    /// Splits a file name into base name and kind.
    pub fn split_file_name(file_name: &str) -> Option<(&str, ArtifactKind)> {
        Self::ALL.iter().find_map(|kind| {
            file_name
                .strip_suffix(kind.suffix())
                .filter(|base| !base.is_empty())
                .map(|base| (base, *kind))
        })
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.suffix().trim_start_matches('.'))
    }
}

//------------ Location ------------------------------------------------------

/// Where a file set lives.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Active,
    Archive,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Location::Active => write!(f, "active"),
            Location::Archive => write!(f, "archive"),
        }
    }
}

//------------ FileSet -------------------------------------------------------

/// The files of one certificate that exist in one location.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileSet {
    pub base_name: String,
    pub location: Location,
    pub members: Vec<ArtifactKind>,
}

impl FileSet {
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.members.iter().map(|kind| kind.file_name(&self.base_name)).collect()
    }
}

//------------ CertificateStore ----------------------------------------------

/// The active and archive directories holding certificate file sets.
///
/// Every member of a file set lives in exactly one of the two. The root
/// CA certificate is accessible, the CA private key is not.
#[derive(Clone, Debug)]
pub struct CertificateStore {
    active: PathBuf,
    archive: PathBuf,
    root_cert: PathBuf,
}

impl CertificateStore {
    pub fn new(active: PathBuf, archive: PathBuf, root_cert: PathBuf) -> Self {
        CertificateStore {
            active,
            archive,
            root_cert,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.issued_dir(), config.archive_dir(), config.ca_cert_file())
    }

    pub fn dir(&self, location: Location) -> &Path {
        match location {
            Location::Active => &self.active,
            Location::Archive => &self.archive,
        }
    }

    /// Writes a new file set to the active store.
    ///
    /// Existing files are never overwritten. If any member cannot be
    /// written, the members written so far are removed again.
    pub fn write_file_set(&self, base_name: &str, artifacts: &[(ArtifactKind, Vec<u8>)]) -> Result<FileSet, Error> {
        let mut written = FileSet {
            base_name: base_name.to_string(),
            location: Location::Active,
            members: Vec::with_capacity(artifacts.len()),
        };

        for (kind, content) in artifacts {
            let path = self.active.join(kind.file_name(base_name));
            if let Err(e) = file::save_new(content, &path, kind.visibility()) {
                warn!("Could not write '{}', removing partial file set", path.display());
                if let Err(cleanup) = self.remove_file_set(&written) {
                    warn!("Could not clean up partial file set '{}': {}", base_name, cleanup);
                }
                return Err(e.into());
            }
            written.members.push(*kind);
        }

        debug!("Wrote file set '{}' with {} files", base_name, written.members.len());
        Ok(written)
    }

    /// Removes the members of a file set that still exist.
    pub fn remove_file_set(&self, set: &FileSet) -> Result<(), Error> {
        let dir = self.dir(set.location);
        for name in set.file_names() {
            let path = dir.join(&name);
            if let Err(e) = file::delete_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Returns the members of the file set that exist in a location.
    pub fn file_set(&self, base_name: &str, location: Location) -> FileSet {
        let dir = self.dir(location);
        let members = ArtifactKind::ALL
            .iter()
            .copied()
            .filter(|kind| dir.join(kind.file_name(base_name)).is_file())
            .collect();
        FileSet {
            base_name: base_name.to_string(),
            location,
            members,
        }
    }

    /// Moves all members of a file set from the active store to the
    /// archive.
    ///
    /// Members already archived are left alone, so this can be repeated
    /// after an interruption. Returns the names of the files moved.
    pub fn archive(&self, base_name: &str) -> Result<Vec<String>, Error> {
        file::create_dir(&self.archive)?;

        let mut moved = Vec::new();
        for name in self.file_set(base_name, Location::Active).file_names() {
            file::move_file(&self.active.join(&name), &self.archive.join(&name))?;
            moved.push(name);
        }
        debug!("Archived {} files of '{}'", moved.len(), base_name);
        Ok(moved)
    }

    /// Returns the certificate file names in a location, in descending
    /// order.
    pub fn cert_files(&self, location: Location) -> Result<Vec<String>, Error> {
        let mut names = file::list_files(self.dir(location), ArtifactKind::Cert.suffix())?;
        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Returns the base name of the active file set named after `serial`,
    /// if there is one.
    pub fn base_name_for_serial(&self, location: Location, serial: &Serial) -> Result<Option<String>, Error> {
        let suffix = format!("_{}", serial);
        Ok(self
            .cert_files(location)?
            .into_iter()
            .filter_map(|name| ArtifactKind::split_file_name(&name).map(|(base, _)| base.to_string()))
            .find(|base| base.ends_with(&suffix)))
    }

    pub fn read_file(&self, location: Location, file_name: &str) -> Result<Vec<u8>, Error> {
        Ok(file::read(&self.dir(location).join(file_name))?)
    }

    /// Returns a file from the active store for download.
    ///
    /// Only plain file names are accepted, anything that could point
    /// outside the active directory is reported as not found.
    pub fn read_artifact(&self, file_name: &str) -> Result<Vec<u8>, Error> {
        if !is_plain_file_name(file_name) {
            warn!("Refusing to serve '{}'", file_name.escape_debug());
            return Err(Error::NotFound(file_name.to_string()));
        }
        let path = self.active.join(file_name);
        if !path.is_file() {
            return Err(Error::NotFound(file_name.to_string()));
        }
        Ok(file::read(&path)?)
    }

    /// Returns the PEM encoded root CA certificate.
    pub fn read_root_certificate(&self) -> Result<Vec<u8>, Error> {
        file::read(&self.root_cert).map_err(Error::ca_key)
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains("..")
        && !name.chars().any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::commons::test;

    fn store(dir: &Path) -> CertificateStore {
        CertificateStore::new(dir.join("issued"), dir.join("issued/archive"), dir.join("ca.cert.pem"))
    }

    fn artifacts() -> Vec<(ArtifactKind, Vec<u8>)> {
        vec![
            (ArtifactKind::Key, b"key".to_vec()),
            (ArtifactKind::Csr, b"csr".to_vec()),
            (ArtifactKind::Cert, b"cert".to_vec()),
        ]
    }

    #[test]
    fn file_names_split_into_base_and_kind() {
        assert_eq!(
            ArtifactKind::split_file_name("web_1A.fullchain.pem"),
            Some(("web_1A", ArtifactKind::FullChain))
        );
        assert_eq!(ArtifactKind::split_file_name("web_1A.p12"), Some(("web_1A", ArtifactKind::Pkcs12)));
        assert_eq!(ArtifactKind::split_file_name(".cert.pem"), None);
        assert_eq!(ArtifactKind::split_file_name("notes.txt"), None);
    }

    #[test]
    fn write_then_archive_moves_every_member() {
        test::test_under_tmp(|dir| {
            let store = store(&dir);
            let set = store.write_file_set("web_1A", &artifacts()).unwrap();
            assert_eq!(set.members, vec![ArtifactKind::Key, ArtifactKind::Csr, ArtifactKind::Cert]);

            let moved = store.archive("web_1A").unwrap();
            assert_eq!(moved.len(), 3);
            assert!(store.file_set("web_1A", Location::Active).is_empty());
            assert_eq!(store.file_set("web_1A", Location::Archive).members.len(), 3);

            // repeating is harmless
            assert!(store.archive("web_1A").unwrap().is_empty());
        });
    }

    #[test]
    fn write_never_overwrites() {
        test::test_under_tmp(|dir| {
            let store = store(&dir);
            file::save(b"other", &dir.join("issued/web_1A.cert.pem"), Visibility::Public).unwrap();

            assert!(store.write_file_set("web_1A", &artifacts()).is_err());

            // partial members were cleaned up, the existing file is untouched
            let set = store.file_set("web_1A", Location::Active);
            assert_eq!(set.members, vec![ArtifactKind::Cert]);
            assert_eq!(store.read_artifact("web_1A.cert.pem").unwrap(), b"other");
        });
    }

    #[test]
    fn read_artifact_only_serves_plain_names() {
        test::test_under_tmp(|dir| {
            let store = store(&dir);
            store.write_file_set("web_1A", &artifacts()).unwrap();
            file::save(b"root", &dir.join("ca.cert.pem"), Visibility::Public).unwrap();

            assert_eq!(store.read_artifact("web_1A.csr.pem").unwrap(), b"csr");
            for name in ["../ca.cert.pem", "archive/web_1A.cert.pem", "..", "", "/etc/passwd"] {
                assert!(matches!(store.read_artifact(name), Err(Error::NotFound(_))), "{}", name);
            }
            assert!(matches!(store.read_artifact("missing.pem"), Err(Error::NotFound(_))));
            assert_eq!(store.read_root_certificate().unwrap(), b"root");
        });
    }

    #[test]
    fn cert_files_are_sorted_descending() {
        test::test_under_tmp(|dir| {
            let store = store(&dir);
            store.write_file_set("alpha_1", &artifacts()).unwrap();
            store.write_file_set("beta_2", &artifacts()).unwrap();
            assert_eq!(
                store.cert_files(Location::Active).unwrap(),
                vec!["beta_2.cert.pem".to_string(), "alpha_1.cert.pem".to_string()]
            );
            assert!(store.cert_files(Location::Archive).unwrap().is_empty());

            let serial = Serial::from_str("2").unwrap();
            assert_eq!(
                store.base_name_for_serial(Location::Active, &serial).unwrap(),
                Some("beta_2".to_string())
            );
        });
    }
}
