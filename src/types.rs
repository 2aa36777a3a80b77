use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Identity of one quality-gate evaluation. Supplied by the caller, immutable
/// for the lifetime of the invocation; used for placeholder substitution and
/// dashboard name matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// Correlation identifier linking this evaluation to its trigger.
    pub context: String,
    pub event: String,
    pub source: String,
    pub project: String,
    pub stage: String,
    pub service: String,
    pub deployment: String,
    pub test_strategy: String,
    pub labels: HashMap<String, String>,
}

/// Caller-supplied key/value substitution applied to query templates before
/// the built-in placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFilter {
    pub key: String,
    pub value: String,
}

/// A single computed indicator value. On failure `value` is zero and
/// `message` explains what went wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliResult {
    pub metric: String,
    pub value: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl SliResult {
    pub fn success(metric: impl Into<String>, value: f64) -> Self {
        Self {
            metric: metric.into(),
            value,
            success: true,
            message: String::new(),
        }
    }

    pub fn failure(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            value: 0.0,
            success: false,
            message: message.into(),
        }
    }
}

/// One group of threshold expressions, e.g. `["<500ms", "<+10%"]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SloCriteria {
    pub criteria: Vec<String>,
}

/// Objective generated for a single indicator. Criteria lists are `None`
/// rather than empty when nothing was specified, downstream consumers treat
/// an empty list differently from an absent one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloDefinition {
    pub sli: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<Vec<SloCriteria>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<Vec<SloCriteria>>,
    pub weight: i32,
    pub key_sli: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalScore {
    pub pass: String,
    pub warning: String,
}

/// How the evaluated result is compared against previous evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub compare_with: String,
    pub include_result_with_score: String,
    pub number_of_comparison_results: u32,
    pub aggregate_function: String,
}

/// Full objectives document generated from a dashboard walk. Serializes to
/// the `slo.yaml` shape the downstream evaluator expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLevelObjectives {
    pub spec_version: String,
    pub comparison: Comparison,
    pub objectives: Vec<SloDefinition>,
    pub total_score: TotalScore,
}

impl Default for ServiceLevelObjectives {
    fn default() -> Self {
        Self {
            spec_version: "1.0".to_string(),
            comparison: Comparison {
                compare_with: "single_result".to_string(),
                include_result_with_score: "pass".to_string(),
                number_of_comparison_results: 1,
                aggregate_function: "avg".to_string(),
            },
            objectives: Vec::new(),
            total_score: TotalScore {
                pass: "90%".to_string(),
                warning: "75%".to_string(),
            },
        }
    }
}

/// Generated indicator-name → query map, serialized as the `sli.yaml`
/// document. BTreeMap keeps the serialized output deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SliConfigFile {
    pub spec_version: String,
    pub indicators: BTreeMap<String, String>,
}

impl SliConfigFile {
    pub fn new() -> Self {
        Self {
            spec_version: "1.0".to_string(),
            indicators: BTreeMap::new(),
        }
    }
}

/// The finished batch handed to the result emitter. Exactly one of these is
/// produced per invocation, even on total failure.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub context: EvaluationContext,
    pub start: String,
    pub end: String,
    pub results: Vec<SliResult>,
    pub labels: HashMap<String, String>,
}
