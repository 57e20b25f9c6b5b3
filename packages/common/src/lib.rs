pub mod error;
pub mod result;
pub mod types;
pub mod validate;

pub use error::*;
pub use result::*;
pub use types::*;
pub use validate::*;
