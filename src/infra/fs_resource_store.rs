use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::app::ports::{ConfigLevel, ResourceStorePort};
use crate::types::EvaluationContext;

/// Resource store backed by a local directory, for running evaluations
/// outside the remote config store. Leveled documents resolve to
/// `<root>/<level>_<filename>`; generated artifacts are written flat into
/// the root.
pub struct FsResourceStore {
    root: PathBuf,
}

impl FsResourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn leveled_path(&self, uri: &str, level: ConfigLevel) -> PathBuf {
        let prefix = match level {
            ConfigLevel::Project => "project",
            ConfigLevel::Stage => "stage",
            ConfigLevel::Service => "service",
        };
        self.root.join(format!("{prefix}_{}", file_name(uri)))
    }
}

fn file_name(uri: &str) -> &str {
    Path::new(uri)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(uri)
}

#[async_trait]
impl ResourceStorePort for FsResourceStore {
    async fn get_resource(
        &self,
        _context: &EvaluationContext,
        uri: &str,
        level: ConfigLevel,
    ) -> Result<Option<String>, String> {
        let path = self.leveled_path(uri, level);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!(path = %path.display(), "loaded local resource");
                Ok(Some(content))
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(format!("could not read {}: {error}", path.display())),
        }
    }

    async fn put_resource(
        &self,
        _context: &EvaluationContext,
        uri: &str,
        content: &[u8],
    ) -> Result<(), String> {
        let path = self.root.join(file_name(uri));
        tokio::fs::write(&path, content)
            .await
            .map_err(|error| format!("could not write {}: {error}", path.display()))?;
        info!(path = %path.display(), "wrote local resource");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reads_leveled_documents_and_misses_cleanly() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("service_gate.conf.yaml"),
            "dashboard: dash-1\n",
        )
        .await
        .unwrap();

        let store = FsResourceStore::new(dir.path());
        let context = EvaluationContext::default();

        let found = store
            .get_resource(&context, "gate/gate.conf.yaml", ConfigLevel::Service)
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some("dashboard: dash-1\n"));

        let missing = store
            .get_resource(&context, "gate/gate.conf.yaml", ConfigLevel::Stage)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn writes_artifacts_into_the_root() {
        let dir = tempdir().unwrap();
        let store = FsResourceStore::new(dir.path());
        let context = EvaluationContext::default();

        store
            .put_resource(&context, "gate/sli.yaml", b"indicators: {}\n")
            .await
            .unwrap();
        let written = tokio::fs::read_to_string(dir.path().join("sli.yaml"))
            .await
            .unwrap();
        assert_eq!(written, "indicators: {}\n");
    }
}
