pub mod error;
pub mod oid;

pub use error::{HeftError, Result};
pub use oid::Oid;
