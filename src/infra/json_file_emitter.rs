use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::app::ports::ResultEmitterPort;
use crate::types::EvaluationOutcome;

/// Emits the finished batch by logging every result and writing the whole
/// outcome to `sliresult.json`, the stand-in for the event transport when
/// running locally.
pub struct JsonFileEmitter {
    output_dir: PathBuf,
}

impl JsonFileEmitter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl ResultEmitterPort for JsonFileEmitter {
    async fn emit(&self, outcome: &EvaluationOutcome) -> Result<(), String> {
        for result in &outcome.results {
            info!(
                metric = %result.metric,
                value = result.value,
                success = result.success,
                message = %result.message,
                "sli result"
            );
        }

        let path = self.output_dir.join("sliresult.json");
        let json = serde_json::to_vec_pretty(outcome).map_err(|e| e.to_string())?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|error| format!("could not write {}: {error}", path.display()))?;
        info!(path = %path.display(), "wrote result batch");
        Ok(())
    }
}
