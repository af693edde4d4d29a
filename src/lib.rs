//! The _ledgerca_ library crate.
//!
//! A certificate authority engine for a single, flat root CA: issuing,
//! listing, renewing, and revoking leaf certificates, keeping the index
//! ledger, and publishing the CRL.

pub mod ca;
pub mod cli;
pub mod commons;
pub mod config;
pub mod constants;
