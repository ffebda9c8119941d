//! Criteria predicates (spec.md §4.6).

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Contains,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub metric: String,
    pub condition: Condition,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub value: String,
}

/// A criteria list passes iff every criterion passes; an empty list passes
/// vacuously (spec.md §4.6, §8 invariant).
pub fn evaluate_all(criteria: &[Criterion], now: DateTime<Utc>, props: &HashMap<String, String>) -> bool {
    criteria.iter().all(|c| evaluate_one(c, now, props))
}

fn evaluate_one(criterion: &Criterion, now: DateTime<Utc>, props: &HashMap<String, String>) -> bool {
    let Some(actual) = resolve_metric(&criterion.metric, now, props) else {
        return false;
    };
    compare(&actual, criterion.condition, criterion.value_type, &criterion.value)
}

fn resolve_metric(metric: &str, now: DateTime<Utc>, props: &HashMap<String, String>) -> Option<String> {
    match metric {
        "dayOfWeek" => Some(now.format("%A").to_string().to_lowercase()),
        "isoDay" => Some(now.weekday().number_from_monday().to_string()),
        "hour" => Some(now.hour().to_string()),
        "minute" => Some(now.minute().to_string()),
        "month" => Some(now.month().to_string()),
        "dayOfMonth" => Some(now.day().to_string()),
        other => props.get(other).cloned(),
    }
}

fn compare(actual: &str, condition: Condition, value_type: ValueType, expected: &str) -> bool {
    match condition {
        Condition::Contains => return actual.contains(expected),
        Condition::In => {
            return expected.split(',').any(|v| v.trim().eq_ignore_ascii_case(actual.trim()));
        }
        _ => {}
    }

    match value_type {
        ValueType::String => {
            let ordering = actual.cmp(expected);
            apply_ordering(condition, ordering, actual.eq_ignore_ascii_case(expected))
        }
        ValueType::Number => {
            let (Ok(a), Ok(e)) = (actual.parse::<f64>(), expected.parse::<f64>()) else {
                return false;
            };
            let ordering = a.partial_cmp(&e).unwrap_or(std::cmp::Ordering::Less);
            apply_ordering(condition, ordering, (a - e).abs() < f64::EPSILON)
        }
    }
}

fn apply_ordering(condition: Condition, ordering: std::cmp::Ordering, eq: bool) -> bool {
    use std::cmp::Ordering::{Greater, Less};
    match condition {
        Condition::Equals => eq,
        Condition::NotEquals => !eq,
        Condition::LessThan => ordering == Less,
        Condition::LessThanOrEqual => ordering == Less || eq,
        Condition::GreaterThan => ordering == Greater,
        Condition::GreaterThanOrEqual => ordering == Greater || eq,
        Condition::Contains | Condition::In => unreachable!("handled before ordering comparison"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn criterion(metric: &str, condition: Condition, value_type: ValueType, value: &str) -> Criterion {
        Criterion {
            metric: metric.to_string(),
            condition,
            value_type,
            value: value.to_string(),
        }
    }

    #[test]
    fn empty_criteria_passes_vacuously() {
        let now = DateTime::parse_from_rfc3339("2026-07-26T12:00:00Z").unwrap().with_timezone(&Utc);
        assert!(evaluate_all(&[], now, &HashMap::new()));
    }

    #[test]
    fn unknown_metric_without_fallback_fails_closed() {
        let now = Utc::now();
        let c = criterion("storeRegion", Condition::Equals, ValueType::String, "west");
        assert!(!evaluate_all(&[c], now, &HashMap::new()));
    }

    #[test]
    fn display_property_fallback_resolves() {
        let now = Utc::now();
        let mut props = HashMap::new();
        props.insert("storeRegion".to_string(), "west".to_string());
        let c = criterion("storeRegion", Condition::Equals, ValueType::String, "west");
        assert!(evaluate_all(&[c], now, &props));
    }

    #[test]
    fn hour_numeric_comparison() {
        let now = DateTime::parse_from_rfc3339("2026-07-26T14:00:00Z").unwrap().with_timezone(&Utc);
        let c = criterion("hour", Condition::GreaterThanOrEqual, ValueType::Number, "9");
        assert!(evaluate_all(&[c], now, &HashMap::new()));
        let c2 = criterion("hour", Condition::LessThan, ValueType::Number, "9");
        assert!(!evaluate_all(&[c2], now, &HashMap::new()));
    }

    #[test]
    fn in_condition_checks_comma_list_membership() {
        let now = DateTime::parse_from_rfc3339("2026-07-26T00:00:00Z").unwrap().with_timezone(&Utc);
        let c = criterion("dayOfWeek", Condition::In, ValueType::String, "sunday,monday");
        assert!(evaluate_all(&[c], now, &HashMap::new()));
    }

    #[test]
    fn all_criteria_must_pass() {
        let now = DateTime::parse_from_rfc3339("2026-07-26T14:00:00Z").unwrap().with_timezone(&Utc);
        let pass = criterion("hour", Condition::Equals, ValueType::Number, "14");
        let fail = criterion("minute", Condition::Equals, ValueType::Number, "59");
        assert!(!evaluate_all(&[pass, fail], now, &HashMap::new()));
    }
}
