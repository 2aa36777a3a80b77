use tracing::debug;

use crate::types::{ServiceLevelObjectives, SloCriteria};

/// Parsed form of the `sli=...;pass=...;warning=...` descriptor mini-language
/// embedded in tile and dashboard titles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SloDescriptor {
    pub name: String,
    pub pass: Option<Vec<SloCriteria>>,
    pub warning: Option<Vec<SloCriteria>>,
    pub weight: i32,
    pub key_sli: bool,
}

/// Parses a descriptor such as
/// `Response time (P95);sli=svc_rt_p95;pass=<500ms,<+10%;warning=<1000ms;weight=2;key=true`.
/// Segments without `=` are ignored; repeated `pass=`/`warning=` segments each
/// contribute one criteria group. When nothing was parsed the supplied
/// defaults populate a single group; empty defaults yield `None`, not an
/// empty list.
pub fn parse_slo_descriptor(
    text: &str,
    default_pass: &[&str],
    default_warning: &[&str],
) -> SloDescriptor {
    let mut descriptor = SloDescriptor {
        weight: 1,
        ..Default::default()
    };
    let mut pass: Vec<SloCriteria> = Vec::new();
    let mut warning: Vec<SloCriteria> = Vec::new();

    for segment in text.split(';') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        match key {
            "sli" => descriptor.name = value.to_string(),
            "pass" => pass.push(criteria_group(value)),
            "warning" => warning.push(criteria_group(value)),
            "weight" => descriptor.weight = value.parse().unwrap_or(1),
            "key" => descriptor.key_sli = value.parse().unwrap_or(false),
            _ => {}
        }
    }

    if pass.is_empty() && !default_pass.is_empty() {
        pass.push(SloCriteria {
            criteria: default_pass.iter().map(|c| c.to_string()).collect(),
        });
    }
    if warning.is_empty() && !default_warning.is_empty() {
        warning.push(SloCriteria {
            criteria: default_warning.iter().map(|c| c.to_string()).collect(),
        });
    }

    descriptor.pass = (!pass.is_empty()).then_some(pass);
    descriptor.warning = (!warning.is_empty()).then_some(warning);
    descriptor
}

fn criteria_group(value: &str) -> SloCriteria {
    SloCriteria {
        criteria: value.split(',').map(str::to_string).collect(),
    }
}

/// Applies `KQG.`-prefixed directives from a markdown tile to the global
/// objectives: total-score thresholds and the comparison policy. Unknown
/// directives are ignored, invalid values fall back to the defaults.
pub fn apply_markdown_directives(markdown: &str, objectives: &mut ServiceLevelObjectives) {
    for segment in markdown.split(';') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };

        match key.trim().to_lowercase().as_str() {
            "kqg.total.pass" => objectives.total_score.pass = value.to_string(),
            "kqg.total.warning" => objectives.total_score.warning = value.to_string(),
            "kqg.compare.withscore" => {
                objectives.comparison.include_result_with_score =
                    match value {
                        "pass" | "pass_or_warn" | "all" => value.to_string(),
                        _ => "pass".to_string(),
                    }
            }
            "kqg.compare.results" => {
                let count = value.parse().unwrap_or(1);
                objectives.comparison.number_of_comparison_results = count;
                objectives.comparison.compare_with = if count > 1 {
                    "several_results".to_string()
                } else {
                    "single_result".to_string()
                };
            }
            "kqg.compare.function" => {
                objectives.comparison.aggregate_function = match value {
                    "avg" | "p50" | "p90" | "p95" => value.to_string(),
                    _ => "avg".to_string(),
                }
            }
            other => {
                if other.starts_with("kqg.") {
                    debug!(directive = other, "ignoring unknown markdown directive");
                }
            }
        }
    }
}

/// Indicator names end up as identifiers in generated configuration;
/// replace the characters known to break downstream parsing.
pub fn clean_indicator_name(name: &str) -> String {
    name.replace([' ', '/', '%'], "_")
}
