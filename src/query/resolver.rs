use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SliError};

pub const THROUGHPUT: &str = "throughput";
pub const ERROR_RATE: &str = "error_rate";
pub const RESPONSE_TIME_P50: &str = "response_time_p50";
pub const RESPONSE_TIME_P90: &str = "response_time_p90";
pub const RESPONSE_TIME_P95: &str = "response_time_p95";

/// Built-in query templates, expressed in the legacy `selector?scope=` dialect
/// the installed base still carries; the query builder normalizes them.
static BUILTIN_QUERIES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            THROUGHPUT,
            "builtin:service.requestCount.total:merge(0):sum?scope=tag(kqg_project:$PROJECT),tag(kqg_stage:$STAGE),tag(kqg_service:$SERVICE),tag(kqg_deployment:$DEPLOYMENT)",
        ),
        (
            ERROR_RATE,
            "builtin:service.errors.total.count:merge(0):avg?scope=tag(kqg_project:$PROJECT),tag(kqg_stage:$STAGE),tag(kqg_service:$SERVICE),tag(kqg_deployment:$DEPLOYMENT)",
        ),
        (
            RESPONSE_TIME_P50,
            "builtin:service.response.time:merge(0):percentile(50)?scope=tag(kqg_project:$PROJECT),tag(kqg_stage:$STAGE),tag(kqg_service:$SERVICE),tag(kqg_deployment:$DEPLOYMENT)",
        ),
        (
            RESPONSE_TIME_P90,
            "builtin:service.response.time:merge(0):percentile(90)?scope=tag(kqg_project:$PROJECT),tag(kqg_stage:$STAGE),tag(kqg_service:$SERVICE),tag(kqg_deployment:$DEPLOYMENT)",
        ),
        (
            RESPONSE_TIME_P95,
            "builtin:service.response.time:merge(0):percentile(95)?scope=tag(kqg_project:$PROJECT),tag(kqg_stage:$STAGE),tag(kqg_service:$SERVICE),tag(kqg_deployment:$DEPLOYMENT)",
        ),
    ])
});

/// Maps a logical indicator name to its query template. Project-supplied
/// overrides win unconditionally over the built-in table.
pub fn resolve_query_template(
    indicator: &str,
    overrides: &HashMap<String, String>,
) -> Result<String> {
    if let Some(template) = overrides.get(indicator) {
        debug!(indicator, "using custom query override");
        return Ok(template.clone());
    }

    BUILTIN_QUERIES
        .get(indicator)
        .map(|template| template.to_string())
        .ok_or_else(|| SliError::UnsupportedIndicator(indicator.to_string()))
}

/// On-disk shape of the indicator-override document.
#[derive(Debug, Default, Deserialize)]
pub struct IndicatorOverridesFile {
    #[serde(default)]
    pub spec_version: String,
    #[serde(default)]
    pub indicators: HashMap<String, String>,
}

/// Merges one override document into the accumulated map; keys from later
/// documents overwrite earlier ones, which is how service-level overrides
/// beat stage- and project-level ones.
pub fn merge_overrides_document(
    overrides: &mut HashMap<String, String>,
    content: &str,
) -> Result<()> {
    if content.trim().is_empty() {
        return Ok(());
    }
    let file: IndicatorOverridesFile = serde_yaml::from_str(content)?;
    overrides.extend(file.indicators);
    Ok(())
}
