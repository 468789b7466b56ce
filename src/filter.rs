use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{parse_number, FieldValue, Record};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Contains,
    /// Any operator string the builder never produces. Such filters pass.
    #[default]
    #[serde(other)]
    Unsupported,
}

/// A `{field, operator, value}` predicate narrowing a dataset before aggregation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOp,
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
}

impl Filter {
    pub fn new(field: &str, operator: FilterOp, value: &str) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: value.to_string(),
        }
    }

    /// Filters without a field or a value are skipped rather than rejected.
    pub fn is_incomplete(&self) -> bool {
        self.field.is_empty() || self.value.is_empty()
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        if self.is_incomplete() {
            return true;
        }

        let actual = record.field(&self.field);
        match self.operator {
            FilterOp::Equals => equals(&actual, &self.value),
            FilterOp::NotEquals => !equals(&actual, &self.value),
            FilterOp::GreaterThan => actual.as_number() > parse_number(&self.value),
            FilterOp::LessThan => actual.as_number() < parse_number(&self.value),
            FilterOp::GreaterEqual => actual.as_number() >= parse_number(&self.value),
            FilterOp::LessEqual => actual.as_number() <= parse_number(&self.value),
            FilterOp::Contains => actual
                .as_text()
                .map(|text| {
                    text.to_lowercase()
                        .contains(&self.value.to_lowercase())
                })
                .unwrap_or(false),
            FilterOp::Unsupported => true,
        }
    }
}

fn equals(actual: &FieldValue<'_>, expected: &str) -> bool {
    match actual {
        FieldValue::Bool(value) => *value == (expected == "true"),
        other => other
            .as_text()
            .map(|text| text == expected)
            .unwrap_or(false),
    }
}

/// Records satisfying every filter. An empty filter list keeps everything.
pub fn apply_filters<'a, R: Record>(records: &'a [R], filters: &[Filter]) -> Vec<&'a R> {
    records
        .iter()
        .filter(|record| filters.iter().all(|filter| filter.matches(*record)))
        .collect()
}

fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    })
}
