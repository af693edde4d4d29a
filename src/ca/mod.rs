//! The certificate authority: ledger, store, and the engines working on
//! them.

mod serial;
pub use self::serial::*;

mod record;
pub use self::record::*;

mod ledger;
pub use self::ledger::*;

mod store;
pub use self::store::*;

mod crypto;
pub use self::crypto::*;

mod crl;
pub use self::crl::*;

mod lock;
pub use self::lock::*;

mod journal;
pub use self::journal::*;

mod context;
pub use self::context::*;

mod issuance;

mod revocation;
pub use self::revocation::*;

mod renewal;

mod listing;
pub use self::listing::*;

mod export;
pub use self::export::*;

mod root;
pub use self::root::*;
