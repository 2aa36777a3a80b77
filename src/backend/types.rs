//! Wire-level types for the metrics backend REST API. Field names follow the
//! backend's JSON envelopes; everything defaults so sparse payloads decode.

use serde::{Deserialize, Serialize};

/// One `(dimensions, timestamps, values)` tuple of a metric series. The
/// backend pads missing samples with nulls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesPoints {
    pub dimensions: Vec<String>,
    pub timestamps: Vec<i64>,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricSeries {
    pub metric_id: String,
    pub data: Vec<SeriesPoints>,
}

/// Success envelope of `/api/v2/metrics/query`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsResponse {
    pub total_count: i64,
    pub next_page_key: Option<String>,
    pub result: Vec<MetricSeries>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DefaultAggregation {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DimensionDefinition {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Output of `/api/v2/metrics/<metricID>`; tells us how many dimensions a
/// metric has, how it aggregates by default, and what unit it reports in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricDefinition {
    pub metric_id: String,
    pub display_name: String,
    pub description: String,
    pub unit: String,
    pub aggregation_types: Vec<String>,
    pub default_aggregation: DefaultAggregation,
    pub dimension_definitions: Vec<DimensionDefinition>,
    pub entity_type: Vec<String>,
}

/// Error envelope shared by all backend endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiError,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

/// Output of the dashboard list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DashboardList {
    pub dashboards: Vec<DashboardStub>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DashboardStub {
    pub id: String,
    pub name: String,
    pub owner: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManagementZone {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DashboardFilter {
    pub timeframe: Option<String>,
    pub management_zone: Option<ManagementZone>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DashboardMetadata {
    pub name: String,
    pub shared: bool,
    pub owner: String,
    pub dashboard_filter: Option<DashboardFilter>,
    pub tags: Vec<String>,
}

/// Full dashboard definition as fetched per ID.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Dashboard {
    pub id: String,
    pub dashboard_metadata: DashboardMetadata,
    pub tiles: Vec<Tile>,
}

/// Tile kinds the parser distinguishes; everything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    CustomChart,
    Markdown,
    TableQuery,
    SyntheticTest,
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Tile {
    pub name: String,
    pub tile_type: String,
    pub configured: bool,
    pub markdown: Option<String>,
    /// Raw query text of a table-query tile.
    pub query: Option<String>,
    /// Visualization type of a table-query tile.
    #[serde(rename = "type")]
    pub visualization: Option<String>,
    pub filter_config: Option<FilterConfig>,
}

impl Tile {
    pub fn kind(&self) -> TileKind {
        match self.tile_type.as_str() {
            "CUSTOM_CHARTING" => TileKind::CustomChart,
            "MARKDOWN" => TileKind::Markdown,
            "DTAQL" => TileKind::TableQuery,
            "SYNTHETIC_TEST" | "SYNTHETIC_TESTS" => TileKind::SyntheticTest,
            _ => TileKind::Other,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub custom_name: String,
    pub default_name: String,
    pub chart_config: ChartConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChartConfig {
    pub legend_shown: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChartSeries {
    pub metric: String,
    pub aggregation: String,
    pub percentile: Option<f64>,
    #[serde(rename = "type")]
    pub kind: String,
    pub entity_type: String,
    pub dimensions: Vec<ChartDimension>,
    pub sort_ascending: bool,
    pub sort_column: bool,
    pub aggregation_rate: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChartDimension {
    pub id: String,
    pub name: String,
    pub values: Option<Vec<String>>,
    pub entity_dimension: bool,
}

/// Output of the table-query endpoint: named columns plus rows of
/// heterogeneous values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TableResult {
    pub column_names: Vec<String>,
    pub values: Vec<Vec<serde_json::Value>>,
    pub extrapolation_level: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_kinds_map_from_wire_strings() {
        let tile = |tile_type: &str| Tile {
            tile_type: tile_type.to_string(),
            ..Default::default()
        };
        assert_eq!(tile("CUSTOM_CHARTING").kind(), TileKind::CustomChart);
        assert_eq!(tile("MARKDOWN").kind(), TileKind::Markdown);
        assert_eq!(tile("DTAQL").kind(), TileKind::TableQuery);
        assert_eq!(tile("SYNTHETIC_TESTS").kind(), TileKind::SyntheticTest);
        assert_eq!(tile("HEADER").kind(), TileKind::Other);
    }

    #[test]
    fn decodes_sparse_dashboard_payloads() {
        let dashboard: Dashboard = serde_json::from_str(
            r#"{
                "id": "dash-1",
                "dashboardMetadata": {
                    "name": "KQG;project=sockshop;stage=hardening;service=carts",
                    "dashboardFilter": {"managementZone": {"id": "mz-1", "name": "prod"}}
                },
                "tiles": [
                    {"name": "Markdown", "tileType": "MARKDOWN", "markdown": "KQG.total.pass=91%"},
                    {
                        "name": "chart",
                        "tileType": "CUSTOM_CHARTING",
                        "filterConfig": {
                            "customName": "sli=host_cpu;pass=<20",
                            "chartConfig": {
                                "series": [{
                                    "metric": "builtin:host.cpu.usage",
                                    "aggregation": "AVG",
                                    "entityType": "HOST",
                                    "dimensions": [{"id": "0", "name": "dt.entity.host", "values": null}]
                                }]
                            }
                        }
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(dashboard.id, "dash-1");
        let zone = dashboard
            .dashboard_metadata
            .dashboard_filter
            .unwrap()
            .management_zone
            .unwrap();
        assert_eq!(zone.id, "mz-1");

        let chart = &dashboard.tiles[1];
        assert_eq!(chart.kind(), TileKind::CustomChart);
        let series = &chart.filter_config.as_ref().unwrap().chart_config.series[0];
        assert_eq!(series.metric, "builtin:host.cpu.usage");
        assert!(series.dimensions[0].values.is_none());
    }
}
