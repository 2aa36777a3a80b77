use urlencoding::encode;

use crate::types::{CustomFilter, EvaluationContext};

/// Substitutes `$PLACEHOLDER` tokens in a query template with contextual
/// event data. Custom filters are applied first (matched verbatim and
/// uppercased, with surrounding quotes stripped from the value), then the
/// built-in context placeholders, then `$LABEL.<key>` and `$ENV.<name>`.
/// Replacement values are URL-query-escaped; unresolved placeholders are left
/// verbatim.
pub fn substitute_placeholders(
    template: &str,
    context: &EvaluationContext,
    custom_filters: &[CustomFilter],
) -> String {
    let mut result = template.to_string();

    for filter in custom_filters {
        let value = filter.value.replace('\'', "").replace('"', "");
        result = result.replace(&format!("${}", filter.key), &value);
        result = result.replace(&format!("${}", filter.key.to_uppercase()), &value);
    }

    for (placeholder, value) in [
        ("$CONTEXT", context.context.as_str()),
        ("$EVENT", context.event.as_str()),
        ("$SOURCE", context.source.as_str()),
        ("$PROJECT", context.project.as_str()),
        ("$STAGE", context.stage.as_str()),
        ("$SERVICE", context.service.as_str()),
        ("$DEPLOYMENT", context.deployment.as_str()),
        ("$TESTSTRATEGY", context.test_strategy.as_str()),
    ] {
        result = result.replace(placeholder, &encode(value));
    }

    for (key, value) in &context.labels {
        result = result.replace(&format!("$LABEL.{key}"), &encode(value));
    }

    for (key, value) in std::env::vars() {
        result = result.replace(&format!("$ENV.{key}"), &encode(&value));
    }

    result
}
