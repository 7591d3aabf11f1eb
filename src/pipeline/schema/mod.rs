pub mod constraints;
pub mod registry;
pub mod types;

pub use constraints::{Constraint, FieldKind, Schema};
pub use registry::schema_for;
pub use types::*;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::StageName;

/// A typed stage result with a canonical schema.
pub trait StageOutput: Serialize + DeserializeOwned + Into<StageResult> + Send + 'static {
    const STAGE: StageName;

    fn schema() -> &'static Schema {
        schema_for(Self::STAGE)
    }

    /// Unwrap the matching variant of a stored result.
    fn from_result(result: StageResult) -> Option<Self>;

    /// Fixed result substituted when the model cannot produce one.
    /// `None` means the stage has no fallback and failures are fatal.
    fn fallback_result() -> Option<Self> {
        None
    }
}
