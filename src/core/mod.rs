pub mod error;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use types::{Record, ScalarType};
pub use value::Value;
