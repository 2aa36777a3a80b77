use async_trait::async_trait;

use crate::types::{EvaluationContext, EvaluationOutcome};

/// Configuration levels the resource store serves documents from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLevel {
    Project,
    Stage,
    Service,
}

/// Read/write access to the configuration store holding gate documents
/// (engine config, indicator overrides) and receiving generated artifacts.
/// The engine is oblivious to which backing implementation is active.
#[async_trait]
pub trait ResourceStorePort: Send + Sync {
    /// Fetch a document at one configuration level; `Ok(None)` when the
    /// resource does not exist there.
    async fn get_resource(
        &self,
        context: &EvaluationContext,
        uri: &str,
        level: ConfigLevel,
    ) -> Result<Option<String>, String>;

    /// Persist generated content under the given destination path.
    async fn put_resource(
        &self,
        context: &EvaluationContext,
        uri: &str,
        content: &[u8],
    ) -> Result<(), String>;
}

/// Downstream publication of the finished batch. Exactly one batch is handed
/// over per invocation.
#[async_trait]
pub trait ResultEmitterPort: Send + Sync {
    async fn emit(&self, outcome: &EvaluationOutcome) -> Result<(), String>;
}
