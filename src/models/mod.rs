pub mod enums;
pub mod forms;
pub mod input;

pub use enums::*;
pub use forms::*;
pub use input::*;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("Invalid {field} value: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("{field} must be at most {max}, got {value}")]
    OutOfRange { field: String, value: i64, max: i64 },
}
