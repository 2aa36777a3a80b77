use url::Url;
use tracing::warn;

use crate::error::{Result, SliError};
use crate::placeholders::substitute_placeholders;
use crate::timeframe::{to_backend_timestamp, Timeframe};
use crate::types::{CustomFilter, EvaluationContext};

const METRICS_QUERY_PATH: &str = "/api/v2/metrics/query/";

/// A fully qualified metrics request plus the selector its response is
/// expected to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub url: String,
    pub metric_selector: String,
}

/// Expands a query template into the final request URL. Accepts three
/// template forms:
///   - modern: `metricSelector=...&entitySelector=...`
///   - legacy: `<selector>?scope=...` (selector left of the first `?`)
///   - malformed legacy: `?metricSelector=...` (leading `?` is dropped)
/// Legacy forms are normalized into the modern parameter set with a
/// compatibility warning. A `scope` parameter is copied into
/// `entitySelector`, gaining a `type(SERVICE)` clause when missing.
pub fn build_metrics_query(
    base_url: &str,
    template: &str,
    frame: &Timeframe,
    context: &EvaluationContext,
    custom_filters: &[CustomFilter],
) -> Result<BuiltQuery> {
    let mut query = substitute_placeholders(template, context, custom_filters);

    if query.starts_with("?metricSelector=") {
        warn!(
            query = %query,
            "compatibility: query starts with a bare '?metricSelector=', removing the '?'"
        );
        query = query.replacen("?metricSelector=", "metricSelector=", 1);
    }

    let (mut metric_selector, query_params) = match query.split_once('?') {
        Some((selector, params)) => {
            warn!(
                query = %query,
                "compatibility: query uses the legacy '<selector>?<params>' format"
            );
            (
                selector.to_string(),
                format!("metricSelector={selector}&{params}"),
            )
        }
        None => (String::new(), query),
    };

    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query_params.as_bytes())
        .into_owned()
        .collect();

    // resolution=Inf collapses the whole window into a single datapoint
    pairs.push(("resolution".to_string(), "Inf".to_string()));
    pairs.push(("from".to_string(), to_backend_timestamp(frame.start)));
    pairs.push(("to".to_string(), to_backend_timestamp(frame.end)));

    if let Some(position) = pairs.iter().position(|(key, _)| key == "scope") {
        warn!("compatibility: 'scope=' is deprecated, rewriting it as 'entitySelector='");
        let (_, scope) = pairs.remove(position);
        let entity_selector = if scope.contains("type(SERVICE)") {
            scope
        } else {
            warn!("compatibility: adding type(SERVICE) to the entitySelector");
            format!("{scope},type(SERVICE)")
        };
        pairs.push(("entitySelector".to_string(), entity_selector));
    }

    if metric_selector.is_empty() {
        metric_selector = pairs
            .iter()
            .find(|(key, _)| key == "metricSelector")
            .map(|(_, value)| value.clone())
            .unwrap_or_default();
    }

    let mut url = Url::parse(&format!(
        "{}{}",
        base_url.trim_end_matches('/'),
        METRICS_QUERY_PATH
    ))
    .map_err(|e| SliError::Config(format!("invalid backend base URL '{base_url}': {e}")))?;
    url.query_pairs_mut()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    Ok(BuiltQuery {
        url: url.to_string(),
        metric_selector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    const BASE: &str = "https://tenant.example.com";

    fn frame() -> Timeframe {
        let end = Utc::now() - Duration::hours(1);
        Timeframe::new(end - Duration::minutes(5), end).unwrap()
    }

    fn context() -> EvaluationContext {
        EvaluationContext {
            project: "sockshop".to_string(),
            stage: "hardening".to_string(),
            service: "carts".to_string(),
            deployment: "primary".to_string(),
            ..Default::default()
        }
    }

    fn decoded_params(url: &str) -> BTreeSet<(String, String)> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn builds_modern_dialect_queries() {
        let frame = frame();
        let built = build_metrics_query(
            BASE,
            "metricSelector=builtin:service.response.time:merge(0):percentile(95)&entitySelector=type(SERVICE),tag(kqg_project:$PROJECT)",
            &frame,
            &context(),
            &[],
        )
        .unwrap();

        assert_eq!(
            built.metric_selector,
            "builtin:service.response.time:merge(0):percentile(95)"
        );
        assert!(built.url.starts_with("https://tenant.example.com/api/v2/metrics/query/?"));

        let params = decoded_params(&built.url);
        assert!(params.contains(&("resolution".to_string(), "Inf".to_string())));
        assert!(params.contains(&("from".to_string(), to_backend_timestamp(frame.start))));
        assert!(params.contains(&("to".to_string(), to_backend_timestamp(frame.end))));
        assert!(params.contains(&(
            "entitySelector".to_string(),
            "type(SERVICE),tag(kqg_project:sockshop)".to_string()
        )));
    }

    #[test]
    fn strips_leading_question_mark() {
        let built = build_metrics_query(
            BASE,
            "?metricSelector=builtin:service.requestCount.total:merge(0):sum",
            &frame(),
            &context(),
            &[],
        )
        .unwrap();
        assert_eq!(
            built.metric_selector,
            "builtin:service.requestCount.total:merge(0):sum"
        );
    }

    #[test]
    fn legacy_scope_dialect_matches_modern_parameter_set() {
        let frame = frame();
        let legacy = build_metrics_query(
            BASE,
            "builtin:service.response.time:merge(0):percentile(95)?scope=tag(kqg_project:$PROJECT),type(SERVICE)",
            &frame,
            &context(),
            &[],
        )
        .unwrap();
        let modern = build_metrics_query(
            BASE,
            "metricSelector=builtin:service.response.time:merge(0):percentile(95)&entitySelector=tag(kqg_project:$PROJECT),type(SERVICE)",
            &frame,
            &context(),
            &[],
        )
        .unwrap();

        assert_eq!(decoded_params(&legacy.url), decoded_params(&modern.url));
        assert_eq!(legacy.metric_selector, modern.metric_selector);
    }

    #[test]
    fn scope_gains_service_entity_type_when_missing() {
        let built = build_metrics_query(
            BASE,
            "builtin:service.errors.total.count:merge(0):avg?scope=tag(kqg_project:$PROJECT)",
            &frame(),
            &context(),
            &[],
        )
        .unwrap();

        let params = decoded_params(&built.url);
        assert!(params.contains(&(
            "entitySelector".to_string(),
            "tag(kqg_project:sockshop),type(SERVICE)".to_string()
        )));
        assert!(!params.iter().any(|(key, _)| key == "scope"));
    }

    #[test]
    fn identical_inputs_build_identical_urls() {
        let frame = frame();
        let first = build_metrics_query(BASE, "metricSelector=custom:a:avg", &frame, &context(), &[]);
        let second = build_metrics_query(BASE, "metricSelector=custom:a:avg", &frame, &context(), &[]);
        assert_eq!(first.unwrap(), second.unwrap());
    }
}
