pub mod domain;
pub mod error;
pub mod source;
pub mod traits;

pub use domain::*;
pub use error::*;
pub use traits::*;
