//! End-to-end orchestration of one quality-gate evaluation: validate the
//! window, wait out backend ingestion lag, try the dashboard path, fall back
//! to per-indicator resolution, and always emit exactly one result batch.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::app::ports::{ConfigLevel, ResourceStorePort, ResultEmitterPort};
use crate::backend::client::{metric_id_matches, MetricsClient};
use crate::config::EngineConfigFile;
use crate::dashboard::{DashboardEvaluation, DashboardProcessor};
use crate::error::{Result, SliError};
use crate::observability;
use crate::query::builder::build_metrics_query;
use crate::query::resolver::{merge_overrides_document, resolve_query_template};
use crate::scaling::scale_value;
use crate::timeframe::{wait_for_ingest, Timeframe};
use crate::types::{CustomFilter, EvaluationContext, EvaluationOutcome, SliResult};

pub const ENGINE_CONF_URI: &str = "gate/gate.conf.yaml";
pub const SLI_CONFIG_URI: &str = "gate/sli.yaml";
pub const DASHBOARD_SNAPSHOT_URI: &str = "gate/dashboard.json";
pub const GENERATED_SLO_URI: &str = "slo.yaml";

pub const DASHBOARD_LINK_LABEL: &str = "Dashboard Link";

/// One evaluation request as handed over by the trigger transport.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub context: EvaluationContext,
    /// Window start, RFC3339 or unix seconds.
    pub start: String,
    pub end: String,
    pub indicators: Vec<String>,
    pub custom_filters: Vec<CustomFilter>,
}

pub struct EvaluationUseCase {
    client: MetricsClient,
    store: Arc<dyn ResourceStorePort>,
    emitter: Arc<dyn ResultEmitterPort>,
    cancelled: Arc<AtomicBool>,
}

impl EvaluationUseCase {
    pub fn new(
        client: MetricsClient,
        store: Arc<dyn ResourceStorePort>,
        emitter: Arc<dyn ResultEmitterPort>,
    ) -> Self {
        Self {
            client,
            store,
            emitter,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that aborts the ingest wait (and with it the evaluation) when set.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Runs one evaluation end to end. Never fails past the emitter: a fatal
    /// error before any indicator could be resolved becomes a synthetic
    /// failure batch with one entry per requested indicator.
    pub async fn run(&self, request: &EvaluationRequest) -> anyhow::Result<EvaluationOutcome> {
        let outcome = match self.evaluate(request).await {
            Ok(outcome) => outcome,
            Err(error) => {
                error!(%error, "evaluation failed before any indicator could be resolved");
                self.synthetic_failure_outcome(request, &error.to_string())
            }
        };

        observability::record_evaluation(&outcome.results);
        self.emitter
            .emit(&outcome)
            .await
            .map_err(|e| anyhow::anyhow!("result emitter rejected the batch: {e}"))?;
        Ok(outcome)
    }

    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationOutcome> {
        let frame = Timeframe::parse(&request.start, &request.end)?;
        wait_for_ingest(&frame, &self.cancelled).await?;

        let engine_config = self.load_engine_config(&request.context).await;

        let mut labels = request.context.labels.clone();
        let mut results: Vec<SliResult> = Vec::new();

        // dashboard path first; failures here degrade to the per-indicator path
        match self.try_dashboard(request, &engine_config, &frame).await {
            Ok(Some(evaluation)) => {
                labels.insert(DASHBOARD_LINK_LABEL.to_string(), evaluation.link_label.clone());
                self.store_generated_artifacts(&request.context, &evaluation)
                    .await;
                results = evaluation.results;
            }
            Ok(None) => {
                info!("no matching dashboard, resolving indicators by name");
            }
            Err(error) => {
                warn!(%error, "dashboard evaluation failed, resolving indicators by name");
            }
        }

        if results.is_empty() {
            let overrides = self.load_indicator_overrides(&request.context).await;
            for indicator in &request.indicators {
                info!(indicator = %indicator, "fetching indicator");
                match self
                    .indicator_value(indicator, &overrides, &frame, request)
                    .await
                {
                    Ok(value) => results.push(SliResult::success(indicator, value)),
                    Err(error) => {
                        warn!(indicator = %indicator, %error, "indicator query failed");
                        results.push(SliResult::failure(indicator, error.to_string()));
                    }
                }
            }
        }

        if results.is_empty() {
            return Err(SliError::Config(
                "could not retrieve any SLI results".to_string(),
            ));
        }

        Ok(EvaluationOutcome {
            context: request.context.clone(),
            start: request.start.clone(),
            end: request.end.clone(),
            results,
            labels,
        })
    }

    /// Computes one scalar for a named indicator: resolve the template, build
    /// the query, execute it, and pick the single expected value.
    async fn indicator_value(
        &self,
        indicator: &str,
        overrides: &HashMap<String, String>,
        frame: &Timeframe,
        request: &EvaluationRequest,
    ) -> Result<f64> {
        let template = resolve_query_template(indicator, overrides)?;
        let built = build_metrics_query(
            self.client.base_url(),
            &template,
            frame,
            &request.context,
            &request.custom_filters,
        )?;

        let response = self.client.query_metrics(&built.url).await?;
        let series = response
            .result
            .iter()
            .find(|series| metric_id_matches(&series.metric_id, &built.metric_selector))
            .ok_or_else(|| SliError::MetricIdMismatch(built.metric_selector.clone()))?;

        if series.data.len() != 1 {
            return Err(SliError::UnexpectedResultShape(format!(
                "got {} result values, expected exactly 1; use :merge(...) so the query collapses to a single series",
                series.data.len()
            )));
        }

        let value = series.data[0]
            .values
            .iter()
            .flatten()
            .next()
            .copied()
            .ok_or(SliError::NoData)?;
        Ok(scale_value(&built.metric_selector, "", value))
    }

    async fn try_dashboard(
        &self,
        request: &EvaluationRequest,
        engine_config: &EngineConfigFile,
        frame: &Timeframe,
    ) -> Result<Option<DashboardEvaluation>> {
        let processor =
            DashboardProcessor::new(&self.client, &request.context, &request.custom_filters);
        let dashboard_id =
            (!engine_config.dashboard.is_empty()).then_some(engine_config.dashboard.as_str());
        processor.evaluate(dashboard_id, frame).await
    }

    /// First engine config found wins, searching service, then stage, then
    /// project level.
    async fn load_engine_config(&self, context: &EvaluationContext) -> EngineConfigFile {
        for level in [ConfigLevel::Service, ConfigLevel::Stage, ConfigLevel::Project] {
            match self.store.get_resource(context, ENGINE_CONF_URI, level).await {
                Ok(Some(content)) if !content.trim().is_empty() => {
                    match serde_yaml::from_str::<EngineConfigFile>(&content) {
                        Ok(config) => {
                            debug!(?level, "loaded engine configuration");
                            return config;
                        }
                        Err(error) => {
                            warn!(?level, %error, "ignoring unparseable engine configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    debug!(?level, %error, "engine configuration not available");
                }
            }
        }
        EngineConfigFile::default()
    }

    /// Indicator overrides merge across levels, service entries overwriting
    /// stage entries overwriting project entries.
    async fn load_indicator_overrides(
        &self,
        context: &EvaluationContext,
    ) -> HashMap<String, String> {
        let mut overrides = HashMap::new();
        for level in [ConfigLevel::Project, ConfigLevel::Stage, ConfigLevel::Service] {
            if let Ok(Some(content)) = self.store.get_resource(context, SLI_CONFIG_URI, level).await
            {
                if let Err(error) = merge_overrides_document(&mut overrides, &content) {
                    warn!(?level, %error, "ignoring unparseable indicator overrides");
                }
            }
        }
        if overrides.is_empty() {
            info!(
                project = %context.project,
                stage = %context.stage,
                service = %context.service,
                "no custom indicator queries found, going with the built-in defaults"
            );
        } else {
            info!(count = overrides.len(), "loaded custom indicator queries");
        }
        overrides
    }

    /// Persisting the generated documents is best-effort; a store failure
    /// must not fail the evaluation that produced them.
    async fn store_generated_artifacts(
        &self,
        context: &EvaluationContext,
        evaluation: &DashboardEvaluation,
    ) {
        if let Err(error) = self
            .store
            .put_resource(context, DASHBOARD_SNAPSHOT_URI, evaluation.snapshot.as_bytes())
            .await
        {
            warn!(%error, "could not store the dashboard snapshot");
        }

        match serde_yaml::to_string(&evaluation.sli_config) {
            Ok(yaml) => {
                if let Err(error) = self
                    .store
                    .put_resource(context, SLI_CONFIG_URI, yaml.as_bytes())
                    .await
                {
                    warn!(%error, "could not store the generated SLI configuration");
                }
            }
            Err(error) => warn!(%error, "could not serialize the generated SLI configuration"),
        }

        match serde_yaml::to_string(&evaluation.objectives) {
            Ok(yaml) => {
                if let Err(error) = self
                    .store
                    .put_resource(context, GENERATED_SLO_URI, yaml.as_bytes())
                    .await
                {
                    warn!(%error, "could not store the generated objectives");
                }
            }
            Err(error) => warn!(%error, "could not serialize the generated objectives"),
        }
    }

    /// A well-formed batch matching the requested indicator count, every
    /// entry failed with the same message.
    fn synthetic_failure_outcome(
        &self,
        request: &EvaluationRequest,
        message: &str,
    ) -> EvaluationOutcome {
        let names: Vec<String> = if request.indicators.is_empty() {
            vec!["no metric".to_string()]
        } else {
            request.indicators.clone()
        };
        EvaluationOutcome {
            context: request.context.clone(),
            start: request.start.clone(),
            end: request.end.clone(),
            results: names
                .iter()
                .map(|name| SliResult::failure(name, message))
                .collect(),
            labels: request.context.labels.clone(),
        }
    }
}
