//! Certificate serial numbers and their allocation.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, warn};
use openssl::bn::BigNum;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::commons::error::Error;
use crate::commons::util::file::{self, Visibility};

//------------ Serial --------------------------------------------------------

/// The serial number of a certificate issued by this CA.
///
/// Kept in canonical form: upper case hexadecimal without leading zeros.
/// Parsing accepts any case and leading zeros, so `0A3F`, `a3f`, and `A3F`
/// are the same serial.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Serial(String);

impl Serial {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the serial padded to an even number of digits.
    ///
    /// This is how OpenSSL writes serials in its `index.txt` and `serial`
    /// files.
    pub fn to_padded(&self) -> String {
        if self.0.len() % 2 == 1 {
            format!("0{}", self.0)
        } else {
            self.0.clone()
        }
    }

    /// Returns the big-endian bytes of the serial.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Canonical serials only contain hex digits.
        hex::decode(self.to_padded()).unwrap_or_default()
    }

    /// Returns the serial that follows this one.
    pub fn next(&self) -> Result<Serial, Error> {
        let mut bn = BigNum::from_hex_str(&self.0).map_err(|e| Error::signing(self, e))?;
        bn.add_word(1).map_err(|e| Error::signing(self, e))?;
        let hex = bn.to_hex_str().map_err(|e| Error::signing(self, e))?;
        Serial::from_str(&hex).map_err(|e| Error::signing(self, e))
    }

    /// Creates a fresh random serial.
    ///
    /// Uses 63 random bits so the DER encoding stays positive and fits in
    /// eight octets.
    pub fn random() -> Result<Serial, Error> {
        let mut bytes = [0u8; 8];
        openssl::rand::rand_bytes(&mut bytes).map_err(|e| Error::signing("serial", e))?;
        bytes[0] &= 0x7f;
        if bytes.iter().all(|b| *b == 0) {
            bytes[7] = 1;
        }
        Serial::from_str(&hex::encode_upper(bytes)).map_err(|e| Error::signing("serial", e))
    }
}

impl FromStr for Serial {
    type Err = InvalidSerial;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidSerial(s.to_string()));
        }

        let canonical = digits.trim_start_matches('0').to_ascii_uppercase();
        if canonical.is_empty() {
            Ok(Serial("0".to_string()))
        } else {
            Ok(Serial(canonical))
        }
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for Serial {
    fn cmp(&self, other: &Self) -> Ordering {
        // Canonical form has no leading zeros, so a longer serial is a
        // larger number.
        self.0.len().cmp(&other.0.len()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Serial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Serial {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Serial {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let string = String::deserialize(d)?;
        Serial::from_str(&string).map_err(serde::de::Error::custom)
    }
}

//------------ InvalidSerial -------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidSerial(String);

impl fmt::Display for InvalidSerial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "not a hexadecimal serial number: '{}'", self.0)
    }
}

impl std::error::Error for InvalidSerial {}

//------------ SerialAllocator -----------------------------------------------

/// Hands out serial numbers from the CA's `serial` file.
///
/// The file holds the next serial to use. Callers must hold the CA lock
/// between [`allocate`][Self::allocate] and [`commit`][Self::commit].
#[derive(Clone, Debug)]
pub struct SerialAllocator {
    path: PathBuf,
}

impl SerialAllocator {
    pub fn new(path: &Path) -> Self {
        SerialAllocator { path: path.to_path_buf() }
    }

    /// Returns the next serial that the `taken` check does not reject.
    ///
    /// Without a `serial` file a random starting point is used.
    pub fn allocate<F>(&self, mut taken: F) -> Result<Serial, Error>
    where
        F: FnMut(&Serial) -> Result<bool, Error>,
    {
        let mut serial = match self.current()? {
            Some(serial) => serial,
            None => {
                let serial = Serial::random()?;
                warn!(
                    "No serial file at '{}', starting from random serial {}",
                    self.path.display(),
                    serial
                );
                serial
            }
        };

        while taken(&serial)? {
            debug!("Serial {} is already in use, skipping", serial);
            serial = serial.next()?;
        }
        Ok(serial)
    }

    /// Records that `issued` was used, so the next allocation follows it.
    pub fn commit(&self, issued: &Serial) -> Result<(), Error> {
        let next = issued.next()?;
        let content = format!("{}\n", next.to_padded());
        file::save(content.as_bytes(), &self.path, Visibility::Public)?;
        Ok(())
    }

    /// Writes a random starting serial unless the file exists already.
    pub fn seed(&self) -> Result<(), Error> {
        if self.current()?.is_none() {
            let serial = Serial::random()?;
            let content = format!("{}\n", serial.to_padded());
            file::save(content.as_bytes(), &self.path, Visibility::Public)?;
        }
        Ok(())
    }

    fn current(&self) -> Result<Option<Serial>, Error> {
        match file::read_opt(&self.path)? {
            None => Ok(None),
            Some(bytes) => {
                let content = String::from_utf8_lossy(&bytes);
                let serial = Serial::from_str(content.trim()).map_err(|e| {
                    Error::signing(
                        "serial allocation",
                        format!("bad serial file '{}': {}", self.path.display(), e),
                    )
                })?;
                Ok(Some(serial))
            }
        }
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::commons::test;

    fn serial(s: &str) -> Serial {
        Serial::from_str(s).unwrap()
    }

    #[test]
    fn normalizes_case_and_leading_zeros() {
        assert_eq!(serial("0A3F"), serial("a3f"));
        assert_eq!(serial("A3F"), serial("000a3F"));
        assert_eq!(serial("a3f").as_str(), "A3F");
        assert_eq!(serial("0x1001").as_str(), "1001");
        assert_eq!(serial("0000").as_str(), "0");
    }

    #[test]
    fn rejects_non_hex() {
        assert!(Serial::from_str("").is_err());
        assert!(Serial::from_str("xyz").is_err());
        assert!(Serial::from_str("12 34").is_err());
    }

    #[test]
    fn orders_numerically() {
        assert!(serial("FF") < serial("100"));
        assert!(serial("0100") > serial("FF"));
        assert_eq!(serial("A3F").to_padded(), "0A3F");
        assert_eq!(serial("A3F").to_bytes(), vec![0x0a, 0x3f]);
    }

    #[test]
    fn next_carries() {
        assert_eq!(serial("FF").next().unwrap(), serial("100"));
        assert_eq!(serial("1001").next().unwrap(), serial("1002"));
    }

    #[test]
    fn allocator_skips_taken_and_commits() {
        test::test_under_tmp(|dir| {
            let path = dir.join("serial");
            file::save(b"1000\n", &path, Visibility::Public).unwrap();
            let allocator = SerialAllocator::new(&path);

            let taken: HashSet<Serial> = [serial("1000"), serial("1001")].into_iter().collect();
            let allocated = allocator.allocate(|s| Ok(taken.contains(s))).unwrap();
            assert_eq!(allocated, serial("1002"));

            allocator.commit(&allocated).unwrap();
            assert_eq!(file::read(&path).unwrap(), b"1003\n");
        });
    }

    #[test]
    fn allocator_seeds_randomly() {
        test::test_under_tmp(|dir| {
            let path = dir.join("serial");
            let allocator = SerialAllocator::new(&path);
            allocator.seed().unwrap();
            let first = allocator.allocate(|_| Ok(false)).unwrap();

            allocator.seed().unwrap();
            assert_eq!(allocator.allocate(|_| Ok(false)).unwrap(), first);
            assert_ne!(first, serial("0"));
        });
    }
}
