use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::equation::Equation;

/// A single field read from a record by name.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Absent,
    Bool(bool),
    Number(f64),
    Text(Cow<'a, str>),
}

impl FieldValue<'_> {
    /// String form used by equality and `contains` comparisons.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Absent => None,
            FieldValue::Bool(value) => Some(Cow::Borrowed(if *value { "true" } else { "false" })),
            FieldValue::Number(value) => Some(Cow::Owned(value.to_string())),
            FieldValue::Text(value) => Some(Cow::Borrowed(value.as_ref())),
        }
    }

    /// Numeric coercion; anything that is not a number yields NaN.
    pub fn as_number(&self) -> f64 {
        match self {
            FieldValue::Absent => f64::NAN,
            FieldValue::Bool(value) => {
                if *value {
                    1.0
                } else {
                    0.0
                }
            }
            FieldValue::Number(value) => *value,
            FieldValue::Text(value) => parse_number(value),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, FieldValue::Bool(true))
    }
}

pub fn parse_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn text<'a>(value: &'a Option<String>) -> FieldValue<'a> {
    match value {
        Some(value) => FieldValue::Text(Cow::Borrowed(value.as_str())),
        None => FieldValue::Absent,
    }
}

fn number(value: Option<f64>) -> FieldValue<'static> {
    value.map(FieldValue::Number).unwrap_or(FieldValue::Absent)
}

fn flag(value: Option<bool>) -> FieldValue<'static> {
    value.map(FieldValue::Bool).unwrap_or(FieldValue::Absent)
}

fn id_text(value: &Option<Uuid>) -> FieldValue<'static> {
    value
        .map(|id| FieldValue::Text(Cow::Owned(id.to_string())))
        .unwrap_or(FieldValue::Absent)
}

fn timestamp(value: &Option<DateTime<Utc>>) -> FieldValue<'static> {
    value
        .map(|at| FieldValue::Text(Cow::Owned(at.to_rfc3339())))
        .unwrap_or(FieldValue::Absent)
}

fn date(value: &Option<NaiveDate>) -> FieldValue<'static> {
    value
        .map(|day| FieldValue::Text(Cow::Owned(day.to_string())))
        .unwrap_or(FieldValue::Absent)
}

/// Blank or null ids read as nil; inserts replace a nil id with a fresh one.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(Uuid::nil()),
        Some(text) => Uuid::parse_str(text).map_err(serde::de::Error::custom),
    }
}

/// Read access to a record's fields by their stored column name.
pub trait Record {
    fn field(&self, name: &str) -> FieldValue<'_>;

    fn number_or_zero(&self, name: &str) -> f64 {
        match self.field(name) {
            FieldValue::Number(value) => value,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Donation {
    #[serde(deserialize_with = "lenient_id")]
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub amount_needed: Option<f64>,
    pub weight: Option<f64>,
    pub is_approved: Option<bool>,
    pub approval_decision_made: Option<bool>,
    pub organization_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Donation {
    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "id" => FieldValue::Text(Cow::Owned(self.id.to_string())),
            "title" => text(&self.title),
            "description" => text(&self.description),
            "category" => text(&self.category),
            "amount_needed" => number(self.amount_needed),
            "weight" => number(self.weight),
            "is_approved" => flag(self.is_approved),
            "approval_decision_made" => flag(self.approval_decision_made),
            "organization_id" => id_text(&self.organization_id),
            "created_at" => timestamp(&self.created_at),
            _ => FieldValue::Absent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    #[serde(deserialize_with = "lenient_id")]
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub urgency: Option<String>,
    pub is_approved: Option<bool>,
    pub approval_decision_made: Option<bool>,
    pub is_completed: Option<bool>,
    pub organization_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Request {
    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "id" => FieldValue::Text(Cow::Owned(self.id.to_string())),
            "title" => text(&self.title),
            "description" => text(&self.description),
            "category" => text(&self.category),
            "urgency" => text(&self.urgency),
            "is_approved" => flag(self.is_approved),
            "approval_decision_made" => flag(self.approval_decision_made),
            "is_completed" => flag(self.is_completed),
            "organization_id" => id_text(&self.organization_id),
            "created_at" => timestamp(&self.created_at),
            _ => FieldValue::Absent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scholarship {
    #[serde(deserialize_with = "lenient_id")]
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub deadline: Option<NaiveDate>,
    pub is_approved: Option<bool>,
    pub approval_decision_made: Option<bool>,
    pub organization_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Scholarship {
    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "id" => FieldValue::Text(Cow::Owned(self.id.to_string())),
            "title" => text(&self.title),
            "description" => text(&self.description),
            "amount" => number(self.amount),
            "deadline" => date(&self.deadline),
            "is_approved" => flag(self.is_approved),
            "approval_decision_made" => flag(self.approval_decision_made),
            "organization_id" => id_text(&self.organization_id),
            "created_at" => timestamp(&self.created_at),
            _ => FieldValue::Absent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(deserialize_with = "lenient_id")]
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub is_approved: Option<bool>,
    pub approval_decision_made: Option<bool>,
    pub organization_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Event {
    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "id" => FieldValue::Text(Cow::Owned(self.id.to_string())),
            "title" => text(&self.title),
            "description" => text(&self.description),
            "location" => text(&self.location),
            "event_date" => date(&self.event_date),
            "is_approved" => flag(self.is_approved),
            "approval_decision_made" => flag(self.approval_decision_made),
            "organization_id" => id_text(&self.organization_id),
            "created_at" => timestamp(&self.created_at),
            _ => FieldValue::Absent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dataset {
    Donations,
    Requests,
    Scholarships,
    Events,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::Donations,
        Dataset::Requests,
        Dataset::Scholarships,
        Dataset::Events,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dataset::Donations => "donations",
            Dataset::Requests => "requests",
            Dataset::Scholarships => "scholarships",
            Dataset::Events => "events",
        }
    }

    pub fn parse(name: &str) -> Option<Dataset> {
        Dataset::ALL.into_iter().find(|dataset| dataset.name() == name)
    }

    /// Fields offered by the equation builder for this dataset.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Dataset::Donations => &[
                "id",
                "title",
                "description",
                "category",
                "amount_needed",
                "weight",
                "is_approved",
                "approval_decision_made",
                "organization_id",
                "created_at",
            ],
            Dataset::Requests => &[
                "id",
                "title",
                "description",
                "category",
                "urgency",
                "is_approved",
                "approval_decision_made",
                "is_completed",
                "organization_id",
                "created_at",
            ],
            Dataset::Scholarships => &[
                "id",
                "title",
                "description",
                "amount",
                "deadline",
                "is_approved",
                "approval_decision_made",
                "organization_id",
                "created_at",
            ],
            Dataset::Events => &[
                "id",
                "title",
                "description",
                "location",
                "event_date",
                "is_approved",
                "approval_decision_made",
                "organization_id",
                "created_at",
            ],
        }
    }

    pub fn has_field(self, field: &str) -> bool {
        self.fields().contains(&field)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Full copies of the four collections, replaced wholesale on refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSnapshot {
    pub donations: Vec<Donation>,
    pub requests: Vec<Request>,
    pub scholarships: Vec<Scholarship>,
    pub events: Vec<Event>,
}

impl DatasetSnapshot {
    pub fn len(&self, dataset: Dataset) -> usize {
        match dataset {
            Dataset::Donations => self.donations.len(),
            Dataset::Requests => self.requests.len(),
            Dataset::Scholarships => self.scholarships.len(),
            Dataset::Events => self.events.len(),
        }
    }

    /// Copy restricted to records owned by one organization.
    pub fn for_organization(&self, organization_id: Uuid) -> DatasetSnapshot {
        let owned = Some(organization_id);
        DatasetSnapshot {
            donations: self
                .donations
                .iter()
                .filter(|record| record.organization_id == owned)
                .cloned()
                .collect(),
            requests: self
                .requests
                .iter()
                .filter(|record| record.organization_id == owned)
                .cloned()
                .collect(),
            scholarships: self
                .scholarships
                .iter()
                .filter(|record| record.organization_id == owned)
                .cloned()
                .collect(),
            events: self
                .events
                .iter()
                .filter(|record| record.organization_id == owned)
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub equation: Equation,
    #[serde(rename = "valueFormat")]
    pub value_format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Widget {
    pub id: Uuid,
    pub title: String,
    pub section: String,
    pub position: i32,
    pub display_config: DisplayConfig,
    pub is_active: bool,
}

impl Default for Widget {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            title: String::new(),
            section: String::new(),
            position: 0,
            display_config: DisplayConfig::default(),
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetResult {
    pub id: Uuid,
    pub title: String,
    pub section: String,
    pub value: f64,
    pub formatted: String,
}
