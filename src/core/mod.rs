pub mod engine;
pub mod error;
pub mod value;

pub use engine::Engine;
pub use error::{Error, Result};
pub use value::Value;
