//! Remap PT clinical pipeline.
//!
//! Turns patient-reported intake data into validated, structured diagnosis and
//! treatment records by prompting a generative model, repairing its JSON and
//! checking it against per-stage schemas. Stages are chained by a session id.

pub mod config;
pub mod models;
pub mod pipeline;
pub mod session;

#[cfg(test)]
mod phi_audit;

pub use pipeline::{
    ClinicalFlow, ClinicalFlowInput, ClinicalFlowResult, ModelInvoker, PipelineError, StageError,
    StageRunner,
};
pub use session::{InMemorySessionStore, JsonlJournal, SessionStore};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides the default filter.
/// A second call is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

/// Build a flow from environment settings, journaling to the default path.
pub fn clinical_flow_from_env() -> Result<ClinicalFlow, BootstrapError> {
    let settings = config::ModelSettings::from_env()?;
    let invoker = ModelInvoker::from_settings(&settings)?;
    let journal = JsonlJournal::open_default()?;
    tracing::info!(
        provider = settings.provider.as_str(),
        model = %settings.model,
        "Clinical pipeline configured"
    );
    Ok(ClinicalFlow::new(
        StageRunner::new(invoker),
        std::sync::Arc::new(journal),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Session(#[from] session::StoreError),
}
