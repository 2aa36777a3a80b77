use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use sli_gate::app::evaluation_use_case::{EvaluationRequest, EvaluationUseCase};
use sli_gate::app::ports::{ConfigLevel, ResourceStorePort, ResultEmitterPort};
use sli_gate::backend::client::MetricsClient;
use sli_gate::config::BackendConfig;
use sli_gate::types::{
    EvaluationContext, EvaluationOutcome, ServiceLevelObjectives, SliConfigFile, SloCriteria,
    SloDefinition,
};

/// Store with no documents; every lookup misses.
struct EmptyStore;

#[async_trait]
impl ResourceStorePort for EmptyStore {
    async fn get_resource(
        &self,
        _context: &EvaluationContext,
        _uri: &str,
        _level: ConfigLevel,
    ) -> std::result::Result<Option<String>, String> {
        Ok(None)
    }

    async fn put_resource(
        &self,
        _context: &EvaluationContext,
        _uri: &str,
        _content: &[u8],
    ) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Captures the emitted batch for assertions.
#[derive(Default)]
struct CapturingEmitter {
    emitted: Mutex<Vec<EvaluationOutcome>>,
}

#[async_trait]
impl ResultEmitterPort for CapturingEmitter {
    async fn emit(&self, outcome: &EvaluationOutcome) -> std::result::Result<(), String> {
        self.emitted.lock().unwrap().push(outcome.clone());
        Ok(())
    }
}

fn use_case(emitter: Arc<CapturingEmitter>) -> EvaluationUseCase {
    let client = MetricsClient::new(&BackendConfig {
        base_url: "https://tenant.invalid".to_string(),
        api_token: "test-token".to_string(),
    })
    .unwrap();
    EvaluationUseCase::new(client, Arc::new(EmptyStore), emitter)
}

fn request(start: &str, end: &str) -> EvaluationRequest {
    EvaluationRequest {
        context: EvaluationContext {
            context: "test-context".to_string(),
            project: "sockshop".to_string(),
            stage: "hardening".to_string(),
            service: "carts".to_string(),
            ..Default::default()
        },
        start: start.to_string(),
        end: end.to_string(),
        indicators: vec!["throughput".to_string(), "error_rate".to_string()],
        custom_filters: Vec::new(),
    }
}

#[tokio::test]
async fn invalid_window_yields_one_synthetic_failure_per_indicator() -> Result<()> {
    let emitter = Arc::new(CapturingEmitter::default());
    let use_case = use_case(emitter.clone());

    // end before start is fatal for the whole invocation
    let outcome = use_case
        .run(&request("2024-05-01T10:05:00Z", "2024-05-01T10:00:00Z"))
        .await?;

    assert_eq!(outcome.results.len(), 2);
    let names: Vec<&str> = outcome.results.iter().map(|r| r.metric.as_str()).collect();
    assert!(names.contains(&"throughput"));
    assert!(names.contains(&"error_rate"));
    let first_message = &outcome.results[0].message;
    for result in &outcome.results {
        assert!(!result.success);
        assert_eq!(result.value, 0.0);
        assert_eq!(&result.message, first_message);
        assert!(result.message.contains("start time needs to be before end time"));
    }

    // exactly one batch reached the emitter
    assert_eq!(emitter.emitted.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn unparseable_timestamps_fail_the_whole_batch() -> Result<()> {
    let emitter = Arc::new(CapturingEmitter::default());
    let use_case = use_case(emitter.clone());

    let outcome = use_case.run(&request("", "2024-05-01T10:00:00Z")).await?;

    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.results.iter().all(|r| !r.success));
    assert!(outcome.results[0].message.contains("invalid timestamp"));
    Ok(())
}

#[tokio::test]
async fn empty_indicator_list_still_produces_a_batch() -> Result<()> {
    let emitter = Arc::new(CapturingEmitter::default());
    let use_case = use_case(emitter.clone());

    let mut req = request("2024-05-01T10:05:00Z", "2024-05-01T10:00:00Z");
    req.indicators.clear();
    let outcome = use_case.run(&req).await?;

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].metric, "no metric");
    assert!(!outcome.results[0].success);
    Ok(())
}

#[tokio::test]
async fn cancellation_during_the_ingest_wait_fails_the_batch() -> Result<()> {
    let emitter = Arc::new(CapturingEmitter::default());
    let use_case = use_case(emitter.clone());
    use_case.cancellation_flag().store(true, Ordering::Relaxed);

    // a window ending now forces the freshness gate to wait
    let end = chrono::Utc::now();
    let start = end - chrono::Duration::seconds(60);
    let outcome = use_case
        .run(&request(&start.to_rfc3339(), &end.to_rfc3339()))
        .await?;

    assert!(outcome.results.iter().all(|r| !r.success));
    assert!(outcome.results[0].message.contains("cancelled"));
    Ok(())
}

#[test]
fn generated_documents_serialize_to_the_expected_yaml_shape() -> Result<()> {
    let mut sli_config = SliConfigFile::new();
    sli_config.indicators.insert(
        "host_cpu".to_string(),
        "metricSelector=builtin:host.cpu.usage:merge(0):avg:names&entitySelector=type(HOST)"
            .to_string(),
    );
    let yaml = serde_yaml::to_string(&sli_config)?;
    assert!(yaml.contains("spec_version: '1.0'"));
    assert!(yaml.contains("host_cpu:"));

    let mut objectives = ServiceLevelObjectives::default();
    objectives.objectives.push(SloDefinition {
        sli: "host_cpu".to_string(),
        pass: Some(vec![SloCriteria {
            criteria: vec!["<20".to_string()],
        }]),
        warning: None,
        weight: 2,
        key_sli: false,
    });
    let yaml = serde_yaml::to_string(&objectives)?;
    assert!(yaml.contains("compare_with: single_result"));
    assert!(yaml.contains("sli: host_cpu"));
    assert!(yaml.contains("weight: 2"));
    assert!(yaml.contains("pass: 90%"));
    // absent warning criteria must not serialize as an empty list
    assert!(!yaml.contains("warning: []"));
    Ok(())
}
