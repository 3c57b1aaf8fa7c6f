//! Canonical opportunity schema and category classification for Opportunity Hub.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "ohub-core";

pub const DEFAULT_DESCRIPTION: &str = "No description available";

/// Shared placeholder used whenever a provider supplies no image.
pub const DEFAULT_IMAGE_URL: &str =
    "https://images.unsplash.com/photo-1486406146926-c627a92ad1ab?w=800";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityType {
    Franchise,
    Business,
    RealEstate,
}

impl OpportunityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Franchise => "franchise",
            Self::Business => "business",
            Self::RealEstate => "real_estate",
        }
    }
}

impl FromStr for OpportunityType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "franchise" => Ok(Self::Franchise),
            "business" => Ok(Self::Business),
            "real_estate" => Ok(Self::RealEstate),
            other => Err(ParseEnumError {
                kind: "opportunity type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    #[default]
    Active,
    Inactive,
}

impl OpportunityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl FromStr for OpportunityStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(ParseEnumError {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Residential,
    Commercial,
    Industrial,
    Land,
    #[serde(rename = "Mixed Use")]
    MixedUse,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Residential => "Residential",
            Self::Commercial => "Commercial",
            Self::Industrial => "Industrial",
            Self::Land => "Land",
            Self::MixedUse => "Mixed Use",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Residential" => Ok(Self::Residential),
            "Commercial" => Ok(Self::Commercial),
            "Industrial" => Ok(Self::Industrial),
            "Land" => Ok(Self::Land),
            "Mixed Use" => Ok(Self::MixedUse),
            other => Err(ParseEnumError {
                kind: "category",
                value: other.to_string(),
            }),
        }
    }
}

/// Ordered classification rules. Earlier rules win regardless of match length.
const CATEGORY_RULES: &[(&[&str], Category)] = &[
    (&["condo", "apartment", "residential"], Category::Residential),
    (&["commercial", "retail", "office"], Category::Commercial),
    (&["industrial", "warehouse"], Category::Industrial),
    (&["land", "lot"], Category::Land),
    (&["mixed"], Category::MixedUse),
];

/// Map a free-text property/business type onto the fixed category set.
///
/// Matching is a case-insensitive substring test against [`CATEGORY_RULES`] in
/// declaration order; anything unmatched (including the empty string) is Commercial.
pub fn classify(raw_type: &str) -> Category {
    let lower = raw_type.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| lower.contains(needle)))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Commercial)
}

/// Closed set of value kinds allowed in [`Metadata::fields`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<MetadataValue>),
}

impl MetadataValue {
    /// Convert a JSON value; `null` and objects have no metadata representation.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null | JsonValue::Object(_) => None,
            JsonValue::Bool(b) => Some(Self::Bool(*b)),
            JsonValue::Number(n) => n.as_f64().map(Self::Number),
            JsonValue::String(s) => Some(Self::Text(s.clone())),
            JsonValue::Array(items) => Some(Self::List(
                items.iter().filter_map(Self::from_json).collect(),
            )),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Provider-specific extras. `raw` keeps the untouched provider object for archival only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub fields: BTreeMap<String, MetadataValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<JsonValue>,
}

impl Metadata {
    /// Copy every key in `recognized` that `raw` carries as a representable value,
    /// then archive `raw` itself.
    pub fn from_raw(raw: &JsonValue, recognized: &[&str]) -> Self {
        let mut fields = BTreeMap::new();
        for key in recognized {
            if let Some(value) = raw.get(*key).and_then(MetadataValue::from_json) {
                fields.insert((*key).to_string(), value);
            }
        }
        Self {
            fields,
            raw: Some(raw.clone()),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.fields.get(key)
    }
}

/// Canonical opportunity shape every adapter normalizes into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub title: String,
    #[serde(rename = "type")]
    pub opportunity_type: OpportunityType,
    pub category: Category,
    pub investment_min: f64,
    pub investment_max: f64,
    pub description: String,
    pub image_url: String,
    pub website: Option<String>,
    pub location: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    pub status: OpportunityStatus,
    pub source: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Opportunity {
    /// Minimal record with every optional field defaulted.
    pub fn new(
        title: impl Into<String>,
        opportunity_type: OpportunityType,
        source: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            opportunity_type,
            category: Category::Commercial,
            investment_min: 0.0,
            investment_max: 0.0,
            description: DEFAULT_DESCRIPTION.to_string(),
            image_url: DEFAULT_IMAGE_URL.to_string(),
            website: None,
            location: None,
            province: None,
            country: None,
            status: OpportunityStatus::Active,
            source: source.into(),
            metadata: Metadata::default(),
        }
    }

    /// Provider-scoped identity used for upsert decisions.
    pub fn identity_key(&self) -> (&str, &str) {
        (&self.title, &self.source)
    }
}

/// A persisted opportunity with its store-assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOpportunity {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub opportunity: Opportunity,
}
