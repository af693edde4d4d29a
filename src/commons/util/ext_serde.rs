//! Helpers for (de)serializing types from other crates.

use log::LevelFilter;
use serde::de;
use serde::{Deserialize, Deserializer};


//------------ LevelFilter ---------------------------------------------------

pub fn de_level_filter<'de, D>(d: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    use std::str::FromStr;
    let string = String::deserialize(d)?;
    LevelFilter::from_str(&string).map_err(de::Error::custom)
}
