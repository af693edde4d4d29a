pub mod error;
pub mod test;
pub mod util;
