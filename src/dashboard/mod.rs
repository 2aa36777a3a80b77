//! Dashboard resolution: locate a quality-gate dashboard by naming
//! convention, walk its tiles, and turn charts and table queries into
//! indicator values, generated query configuration, and objectives.

pub mod slo;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::client::{metric_id_matches, DashboardFetch, MetricsClient};
use crate::backend::types::{ChartSeries, MetricDefinition, Tile, TileKind};
use crate::dashboard::slo::{
    apply_markdown_directives, clean_indicator_name, parse_slo_descriptor, SloDescriptor,
};
use crate::error::Result;
use crate::query::builder::build_metrics_query;
use crate::scaling::{mean, scale_value};
use crate::timeframe::{to_backend_timestamp, Timeframe};
use crate::types::{
    CustomFilter, EvaluationContext, ServiceLevelObjectives, SliConfigFile, SliResult,
    SloDefinition,
};

/// Name prefix a dashboard must carry to participate in quality-gate
/// evaluation, e.g. `KQG;project=sockshop;stage=hardening;service=carts`.
const DASHBOARD_NAME_PREFIX: &str = "kqg;";

/// Everything one dashboard walk produces. `results` empty with no error
/// means the dashboard had no qualifying tiles.
#[derive(Debug, Clone)]
pub struct DashboardEvaluation {
    /// Deep link into the dashboard for the evaluated window, handed back to
    /// the caller as a label.
    pub link_label: String,
    pub sli_config: SliConfigFile,
    pub objectives: ServiceLevelObjectives,
    pub results: Vec<SliResult>,
    /// Raw dashboard JSON, persisted as a snapshot.
    pub snapshot: String,
}

/// The query-shaping parts derived for one chart series: which dimensions to
/// merge or filter, and the effective aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
struct SeriesSelector {
    merge_aggregator: String,
    filter_aggregator: String,
    /// Parameterized filter clause used to regenerate per-dimension SLI
    /// definitions after the response multiplexes into several series.
    filter_template: String,
    aggregation: String,
}

impl SeriesSelector {
    fn metric_query(&self, series: &ChartSeries) -> String {
        format!(
            "metricSelector={}{}{}:{}:names&entitySelector=type({})",
            series.metric,
            self.merge_aggregator,
            self.filter_aggregator,
            self.aggregation,
            series.entity_type
        )
    }

    fn dimension_query(&self, series: &ChartSeries, dimension_value: &str) -> String {
        let filter = self
            .filter_template
            .replacen("FILTERDIMENSIONVALUE", dimension_value, 1);
        format!(
            "metricSelector={}{}{}:{}:names&entitySelector=type({})",
            series.metric, self.merge_aggregator, filter, self.aggregation, series.entity_type
        )
    }
}

/// Derives the selector for one chart series from the metric definition:
/// every metric dimension the chart does not split by is merged (highest
/// index first, merges execute in sequence), a dimension with an explicit
/// filter value becomes a `filter(eq(...))` clause instead.
fn build_series_selector(series: &ChartSeries, definition: &MetricDefinition) -> SeriesSelector {
    let mut selector = SeriesSelector::default();

    for dimension_ix in (0..definition.dimension_definitions.len()).rev() {
        let dimension_id = dimension_ix.to_string();
        match series.dimensions.iter().find(|d| d.id == dimension_id) {
            Some(chart_dimension) => {
                let values = chart_dimension.values.as_deref().unwrap_or_default();
                if let Some(value) = values.first() {
                    selector
                        .filter_aggregator
                        .push_str(&format!(":filter(eq({},{}))", chart_dimension.name, value));
                } else {
                    selector.filter_template =
                        format!(":filter(eq({},FILTERDIMENSIONVALUE))", chart_dimension.name);
                }
            }
            None => {
                selector
                    .merge_aggregator
                    .push_str(&format!(":merge({dimension_ix})"));
            }
        }
    }

    let mut aggregation = if series.aggregation.is_empty() || series.aggregation == "NONE" {
        definition.default_aggregation.kind.clone()
    } else {
        series.aggregation.clone()
    };
    if aggregation == "PERCENTILE" {
        let percentile = series.percentile.unwrap_or(50.0);
        aggregation = format!("PERCENTILE({percentile})");
    }
    if aggregation == "OF_INTEREST_RATIO" || aggregation == "OTHER_RATIO" {
        // ratio aggregations cannot be expressed in the query API; averaging
        // is the accepted approximation
        aggregation = "AVG".to_string();
    }
    selector.aggregation = aggregation.to_lowercase();

    selector
}

/// Checks a dashboard name against the current context: `KQG;` prefix plus
/// `project=`, `stage=` and `service=` fields, all case-insensitive.
fn dashboard_name_matches(name: &str, context: &EvaluationContext) -> bool {
    if !name.to_lowercase().starts_with(DASHBOARD_NAME_PREFIX) {
        return false;
    }
    let fields: Vec<String> = name.split(';').map(|f| f.trim().to_lowercase()).collect();
    [
        format!("project={}", context.project),
        format!("stage={}", context.stage),
        format!("service={}", context.service),
    ]
    .iter()
    .all(|wanted| fields.contains(&wanted.to_lowercase()))
}

pub struct DashboardProcessor<'a> {
    client: &'a MetricsClient,
    context: &'a EvaluationContext,
    custom_filters: &'a [CustomFilter],
}

impl<'a> DashboardProcessor<'a> {
    pub fn new(
        client: &'a MetricsClient,
        context: &'a EvaluationContext,
        custom_filters: &'a [CustomFilter],
    ) -> Self {
        Self {
            client,
            context,
            custom_filters,
        }
    }

    /// Runs the full dashboard path. `Ok(None)` means no dashboard matches
    /// the context, which is a valid terminal state, not an error.
    pub async fn evaluate(
        &self,
        dashboard_id: Option<&str>,
        frame: &Timeframe,
    ) -> Result<Option<DashboardEvaluation>> {
        let dashboard_id = match dashboard_id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => match self.locate_dashboard().await? {
                Some(id) => id,
                None => return Ok(None),
            },
        };

        let DashboardFetch { definition, raw } = self.client.get_dashboard(&dashboard_id).await?;

        let mut objectives = ServiceLevelObjectives::default();
        // the dashboard title may override the global pass/warning scores
        let title = parse_slo_descriptor(&definition.dashboard_metadata.name, &["90%"], &["75%"]);
        if let Some(pass) = &title.pass {
            objectives.total_score.pass = pass[0].criteria[0].clone();
        }
        if let Some(warning) = &title.warning {
            objectives.total_score.warning = warning[0].criteria[0].clone();
        }

        let management_zone = definition
            .dashboard_metadata
            .dashboard_filter
            .as_ref()
            .and_then(|filter| filter.management_zone.as_ref());
        let mut link_label = format!(
            "{}#dashboard;id={};gtf=c_{}_{}",
            self.client.base_url(),
            definition.id,
            to_backend_timestamp(frame.start),
            to_backend_timestamp(frame.end)
        );
        if let Some(zone) = management_zone {
            link_label.push_str(&format!(";gf={}", zone.id));
        }
        info!(link = %link_label, "evaluating dashboard");

        let mut sli_config = SliConfigFile::new();
        let mut results = Vec::new();

        for tile in &definition.tiles {
            match tile.kind() {
                TileKind::Markdown => {
                    if let Some(markdown) = &tile.markdown {
                        if markdown.contains("KQG.") {
                            apply_markdown_directives(markdown, &mut objectives);
                        }
                    }
                }
                TileKind::SyntheticTest => {}
                TileKind::CustomChart => {
                    self.process_chart_tile(tile, frame, &mut sli_config, &mut objectives, &mut results)
                        .await;
                }
                TileKind::TableQuery => {
                    self.process_table_tile(tile, frame, &mut sli_config, &mut objectives, &mut results)
                        .await;
                }
                TileKind::Other => {
                    debug!(tile = %tile.name, tile_type = %tile.tile_type, "ignoring unsupported tile type");
                }
            }
        }

        Ok(Some(DashboardEvaluation {
            link_label,
            sli_config,
            objectives,
            results,
            snapshot: raw,
        }))
    }

    async fn locate_dashboard(&self) -> Result<Option<String>> {
        let list = self.client.list_dashboards().await?;
        for stub in &list.dashboards {
            if dashboard_name_matches(&stub.name, self.context) {
                info!(dashboard = %stub.name, id = %stub.id, "found matching dashboard");
                return Ok(Some(stub.id.clone()));
            }
        }
        debug!(
            project = %self.context.project,
            stage = %self.context.stage,
            service = %self.context.service,
            "no dashboard matches the naming convention"
        );
        Ok(None)
    }

    async fn process_chart_tile(
        &self,
        tile: &Tile,
        frame: &Timeframe,
        sli_config: &mut SliConfigFile,
        objectives: &mut ServiceLevelObjectives,
        results: &mut Vec<SliResult>,
    ) {
        let Some(filter_config) = &tile.filter_config else {
            return;
        };
        let descriptor = parse_slo_descriptor(&filter_config.custom_name, &[], &[]);
        if descriptor.name.is_empty() {
            debug!(title = %filter_config.custom_name, "tile title carries no sli=<name> descriptor, skipping");
            return;
        }

        for series in &filter_config.chart_config.series {
            self.process_chart_series(&descriptor, series, frame, sli_config, objectives, results)
                .await;
        }
    }

    async fn process_chart_series(
        &self,
        descriptor: &SloDescriptor,
        series: &ChartSeries,
        frame: &Timeframe,
        sli_config: &mut SliConfigFile,
        objectives: &mut ServiceLevelObjectives,
        results: &mut Vec<SliResult>,
    ) {
        // the dashboard JSON does not say how many dimensions the metric has,
        // the definition does
        let definition = match self.client.describe_metric(&series.metric).await {
            Ok(definition) => definition,
            Err(error) => {
                warn!(metric = %series.metric, %error, "could not describe metric, skipping series");
                return;
            }
        };

        let selector = build_series_selector(series, &definition);
        let metric_query = selector.metric_query(series);
        debug!(query = %metric_query, "built series query");

        let built = match build_metrics_query(
            self.client.base_url(),
            &metric_query,
            frame,
            self.context,
            self.custom_filters,
        ) {
            Ok(built) => built,
            Err(error) => {
                results.push(SliResult::failure(&descriptor.name, error.to_string()));
                sli_config
                    .indicators
                    .insert(descriptor.name.clone(), metric_query);
                return;
            }
        };

        let response = match self.client.query_metrics(&built.url).await {
            Ok(response) => response,
            Err(error) => {
                warn!(indicator = %descriptor.name, %error, "series query failed");
                results.push(SliResult::failure(&descriptor.name, error.to_string()));
                // keep the attempted query so the failed tile still shows up
                // in the generated configuration
                sli_config
                    .indicators
                    .insert(descriptor.name.clone(), metric_query);
                return;
            }
        };

        for series_result in &response.result {
            if !metric_id_matches(&series_result.metric_id, &built.metric_selector) {
                warn!(
                    returned = %series_result.metric_id,
                    expected = %built.metric_selector,
                    "response contains a metric identifier that was not requested"
                );
                continue;
            }

            let multiplexed = series_result.data.len() > 1;
            for points in &series_result.data {
                let mut indicator_name = descriptor.name.clone();
                if multiplexed {
                    for dimension in &points.dimensions {
                        indicator_name.push('_');
                        indicator_name.push_str(dimension);
                    }
                }
                let indicator_name = clean_indicator_name(&indicator_name);

                let Some(raw_value) = mean(&points.values) else {
                    results.push(SliResult::failure(&indicator_name, "series contained no values"));
                    continue;
                };
                let value = scale_value(&series.metric, &definition.unit, raw_value);
                info!(indicator = %indicator_name, value, "dashboard series resolved");
                results.push(SliResult::success(&indicator_name, value));

                let indicator_query = if multiplexed && !selector.filter_template.is_empty() {
                    let dimension_value =
                        points.dimensions.first().map(String::as_str).unwrap_or_default();
                    selector.dimension_query(series, dimension_value)
                } else {
                    metric_query.clone()
                };
                sli_config
                    .indicators
                    .insert(indicator_name.clone(), indicator_query);

                objectives.objectives.push(SloDefinition {
                    sli: indicator_name,
                    pass: descriptor.pass.clone(),
                    warning: descriptor.warning.clone(),
                    weight: descriptor.weight,
                    key_sli: descriptor.key_sli,
                });
            }
        }
    }

    async fn process_table_tile(
        &self,
        tile: &Tile,
        frame: &Timeframe,
        sli_config: &mut SliConfigFile,
        objectives: &mut ServiceLevelObjectives,
        results: &mut Vec<SliResult>,
    ) {
        let descriptor = parse_slo_descriptor(&tile.name, &[], &[]);
        if descriptor.name.is_empty() {
            debug!(title = %tile.name, "tile title carries no sli=<name> descriptor, skipping");
            return;
        }
        let Some(query) = tile.query.as_deref() else {
            return;
        };
        let visualization = tile.visualization.as_deref().unwrap_or_default();
        if !matches!(
            visualization,
            "SINGLE_VALUE" | "PIE_CHART" | "COLUMN_CHART" | "TABLE"
        ) {
            debug!(visualization, "unsupported table visualization, skipping tile");
            return;
        }

        let table = match self.client.query_table(query, frame).await {
            Ok(table) => table,
            Err(error) => {
                warn!(indicator = %descriptor.name, %error, "table query failed");
                results.push(SliResult::failure(&descriptor.name, error.to_string()));
                sli_config
                    .indicators
                    .insert(descriptor.name.clone(), query.to_string());
                return;
            }
        };

        for row in &table.values {
            let Some((dimension_name, value)) = table_row_value(visualization, row) else {
                debug!(?row, "table row did not carry a usable value, skipping row");
                continue;
            };

            let mut indicator_name = descriptor.name.clone();
            if !dimension_name.is_empty() {
                indicator_name.push('_');
                indicator_name.push_str(&dimension_name);
            }
            let indicator_name = clean_indicator_name(&indicator_name);

            // no metric-unit metadata exists for table queries, values are
            // used exactly as returned
            info!(indicator = %indicator_name, value, "table row resolved");
            results.push(SliResult::success(&indicator_name, value));
            sli_config.indicators.insert(
                indicator_name.clone(),
                format!("DTAQL;{visualization};{dimension_name};{query}"),
            );
            objectives.objectives.push(SloDefinition {
                sli: indicator_name,
                pass: descriptor.pass.clone(),
                warning: descriptor.warning.clone(),
                weight: descriptor.weight,
                key_sli: descriptor.key_sli,
            });
        }
    }
}

/// Interprets one table row according to the tile's visualization type.
/// Returns the dimension name (may be empty) and the numeric value, or
/// `None` when the row or the visualization cannot be interpreted.
fn table_row_value(visualization: &str, row: &[Value]) -> Option<(String, f64)> {
    match visualization {
        "SINGLE_VALUE" => Some((String::new(), row.first()?.as_f64()?)),
        "PIE_CHART" | "COLUMN_CHART" => Some((
            row.first()?.as_str()?.to_string(),
            row.get(1)?.as_f64()?,
        )),
        "TABLE" => Some((
            row.first()?.as_str()?.to_string(),
            row.last()?.as_f64()?,
        )),
        _ => None,
    }
}
