//! Source adapter contracts, per-provider field normalization, and fallback selection.

pub mod fallback;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ohub_core::{classify, Metadata, Opportunity, OpportunityStatus, OpportunityType};
use ohub_core::{DEFAULT_DESCRIPTION, DEFAULT_IMAGE_URL};
use ohub_storage::{FetchError, JsonRequest, JsonTransport};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, info, warn};

pub const CRATE_NAME: &str = "ohub-adapters";

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Franchise,
    RealEstate,
    Public,
}

impl ProviderKind {
    pub fn default_source_id(&self) -> &'static str {
        match self {
            Self::Franchise => "franchise_api",
            Self::RealEstate => "real_estate_api",
            Self::Public => "public_listings",
        }
    }

    pub fn opportunity_type(&self) -> OpportunityType {
        match self {
            Self::Franchise => OpportunityType::Franchise,
            Self::RealEstate => OpportunityType::RealEstate,
            Self::Public => OpportunityType::Business,
        }
    }

    pub fn requires_credential(&self) -> bool {
        !matches!(self, Self::Public)
    }

    /// Listing path appended to the provider base URL.
    pub fn fetch_path(&self) -> &'static str {
        match self {
            Self::Franchise => "/franchises",
            Self::RealEstate => "/listings",
            Self::Public => "/businesses",
        }
    }
}

/// Optional listing filters. Only providers with a filtering API forward them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchFilters {
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub property_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    pub source_id: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// Configuration snapshot for one adapter; building it never touches the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterStatus {
    pub configured: bool,
    pub source: String,
    pub endpoint: Option<String>,
    pub credential: Option<String>,
}

/// Shortest secret that may show a prefix; anything shorter is hidden entirely.
const MASK_MIN_VISIBLE_LEN: usize = 12;

/// Reveal a four character prefix of long secrets only.
pub fn mask_credential(secret: &str) -> String {
    if secret.chars().count() < MASK_MIN_VISIBLE_LEN {
        return "****".to_string();
    }
    let prefix = secret.chars().take(4).collect::<String>();
    format!("{prefix}****")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("expected a JSON array of {provider} records, found {found}")]
    NotAnArray {
        provider: &'static str,
        found: &'static str,
    },
    #[error("expected a JSON object from {provider}, found {found}")]
    NotAnObject {
        provider: &'static str,
        found: &'static str,
    },
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Per-provider synonym lists, consulted in declared order.
#[derive(Debug, Clone, Copy)]
pub struct FieldSynonyms {
    pub title: &'static [&'static str],
    pub description: &'static [&'static str],
    pub investment_min: &'static [&'static str],
    pub investment_max: &'static [&'static str],
    pub category: &'static [&'static str],
    pub image_url: &'static [&'static str],
    pub website: &'static [&'static str],
    pub location: &'static [&'static str],
    pub province: &'static [&'static str],
    pub country: &'static [&'static str],
    pub recognized_metadata: &'static [&'static str],
}

pub const FRANCHISE_FIELDS: FieldSynonyms = FieldSynonyms {
    title: &["name", "title"],
    description: &["description", "summary"],
    investment_min: &["investmentMin", "investment_min", "minInvestment"],
    investment_max: &["investmentMax", "investment_max", "maxInvestment"],
    category: &["category", "industry"],
    image_url: &["imageUrl", "image_url", "logo"],
    website: &["website", "url"],
    location: &["location", "headquarters"],
    province: &["province", "state"],
    country: &["country"],
    recognized_metadata: &[
        "franchiseFee",
        "royaltyFee",
        "yearEstablished",
        "units",
        "industry",
        "category",
    ],
};

pub const REAL_ESTATE_FIELDS: FieldSynonyms = FieldSynonyms {
    title: &["title", "name", "address"],
    description: &["description", "remarks"],
    investment_min: &["price", "listPrice", "askingPrice"],
    investment_max: &["maxPrice", "price", "listPrice"],
    category: &["propertyType", "property_type", "type"],
    image_url: &["imageUrl", "image_url", "photo"],
    website: &["url", "listingUrl", "website"],
    location: &["location", "city", "address"],
    province: &["province", "state", "region"],
    country: &["country"],
    recognized_metadata: &[
        "mlsNumber",
        "bedrooms",
        "bathrooms",
        "squareFeet",
        "propertyType",
        "listingDate",
    ],
};

pub const PUBLIC_FIELDS: FieldSynonyms = FieldSynonyms {
    title: &["name", "title", "businessName"],
    description: &["description", "summary"],
    investment_min: &["askingPrice", "price", "investmentMin"],
    investment_max: &["investmentMax", "askingPrice", "price"],
    category: &["category", "industry"],
    image_url: &["imageUrl", "image_url"],
    website: &["website", "url"],
    location: &["location", "city"],
    province: &["province", "state"],
    country: &["country"],
    recognized_metadata: &[
        "industry",
        "yearEstablished",
        "employees",
        "annualRevenue",
        "askingPrice",
    ],
};

/// First synonym that is present and not `null`. Falsy values such as `0` count as present.
fn first_present<'a>(raw: &'a JsonValue, keys: &[&str]) -> Option<&'a JsonValue> {
    keys.iter()
        .find_map(|key| raw.get(*key).filter(|value| !value.is_null()))
}

fn text_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number_value(value: &JsonValue) -> Option<f64> {
    let parsed = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => {
            let cleaned = s
                .chars()
                .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
                .collect::<String>();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed.max(0.0))
}

fn resolve_text(raw: &JsonValue, keys: &[&str]) -> Option<String> {
    first_present(raw, keys).and_then(text_value)
}

fn resolve_amount(raw: &JsonValue, keys: &[&str]) -> f64 {
    first_present(raw, keys).and_then(number_value).unwrap_or(0.0)
}

/// Normalize one raw provider object.
///
/// Returns `None` only when the item cannot carry an identity key: it is not an
/// object, or it has no non-blank title under any synonym. Every other field falls
/// back to its documented default.
pub fn normalize_record(
    raw: &JsonValue,
    fields: &FieldSynonyms,
    opportunity_type: OpportunityType,
    source_id: &str,
) -> Option<Opportunity> {
    if !raw.is_object() {
        return None;
    }
    let title = resolve_text(raw, fields.title)?.trim().to_string();
    if title.is_empty() {
        return None;
    }

    let category_hint = resolve_text(raw, fields.category).unwrap_or_default();
    let status = match raw.get("status").and_then(JsonValue::as_str) {
        Some(s) if s.eq_ignore_ascii_case("inactive") => OpportunityStatus::Inactive,
        _ => OpportunityStatus::Active,
    };

    Some(Opportunity {
        title,
        opportunity_type,
        category: classify(&category_hint),
        investment_min: resolve_amount(raw, fields.investment_min),
        investment_max: resolve_amount(raw, fields.investment_max),
        description: resolve_text(raw, fields.description)
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        image_url: resolve_text(raw, fields.image_url)
            .unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string()),
        website: resolve_text(raw, fields.website),
        location: resolve_text(raw, fields.location),
        province: resolve_text(raw, fields.province),
        country: resolve_text(raw, fields.country),
        status,
        source: source_id.to_string(),
        metadata: Metadata::from_raw(raw, fields.recognized_metadata),
    })
}

fn normalize_items(
    items: &[JsonValue],
    fields: &FieldSynonyms,
    opportunity_type: OpportunityType,
    source_id: &str,
) -> Vec<Opportunity> {
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match normalize_record(item, fields, opportunity_type, source_id) {
            Some(opportunity) => out.push(opportunity),
            None => warn!(source = source_id, index, "dropping provider record without a usable title"),
        }
    }
    out
}

/// Franchise provider: the payload itself is the record array.
pub fn normalize_franchise_payload(
    source_id: &str,
    payload: &JsonValue,
) -> Result<Vec<Opportunity>, NormalizeError> {
    let items = payload.as_array().ok_or(NormalizeError::NotAnArray {
        provider: "franchise",
        found: json_kind(payload),
    })?;
    Ok(normalize_items(items, &FRANCHISE_FIELDS, OpportunityType::Franchise, source_id))
}

/// Real-estate provider: `{ listings: [...] }`. A missing or non-array `listings` is empty.
pub fn normalize_real_estate_payload(
    source_id: &str,
    payload: &JsonValue,
) -> Result<Vec<Opportunity>, NormalizeError> {
    if !payload.is_object() {
        return Err(NormalizeError::NotAnObject {
            provider: "real estate",
            found: json_kind(payload),
        });
    }
    let Some(items) = payload.get("listings").and_then(JsonValue::as_array) else {
        return Ok(Vec::new());
    };
    Ok(normalize_items(items, &REAL_ESTATE_FIELDS, OpportunityType::RealEstate, source_id))
}

/// Public listings: a bare array, or an object wrapping one under `businesses` or `data`.
pub fn normalize_public_payload(
    source_id: &str,
    payload: &JsonValue,
) -> Result<Vec<Opportunity>, NormalizeError> {
    let items = match payload {
        JsonValue::Array(items) => items.as_slice(),
        JsonValue::Object(_) => {
            match first_present(payload, &["businesses", "data"]).and_then(JsonValue::as_array) {
                Some(items) => items.as_slice(),
                None => return Ok(Vec::new()),
            }
        }
        other => {
            return Err(NormalizeError::NotAnObject {
                provider: "public listings",
                found: json_kind(other),
            })
        }
    };
    Ok(normalize_items(items, &PUBLIC_FIELDS, OpportunityType::Business, source_id))
}

/// What a live fetch attempt produced, before any fallback policy is applied.
#[derive(Debug)]
pub enum FetchOutcome {
    Live(Vec<Opportunity>),
    ConfigMissing { hint: String },
    Transport(FetchError),
    Malformed { reason: String },
}

/// Apply the degrade-to-fallback policy to a fetch outcome.
pub fn resolve_outcome(
    kind: ProviderKind,
    source_id: &str,
    outcome: FetchOutcome,
) -> Vec<Opportunity> {
    match outcome {
        FetchOutcome::Live(records) => {
            info!(source = source_id, count = records.len(), "fetched live opportunities");
            records
        }
        FetchOutcome::ConfigMissing { hint } => {
            info!(source = source_id, %hint, "provider not configured; serving fallback dataset");
            fallback::dataset(kind, source_id)
        }
        FetchOutcome::Transport(err) => {
            error!(source = source_id, error = %err, "provider fetch failed; serving fallback dataset");
            fallback::dataset(kind, source_id)
        }
        FetchOutcome::Malformed { reason } => {
            warn!(source = source_id, %reason, "provider payload had an unexpected shape");
            Vec::new()
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;
    fn kind(&self) -> ProviderKind;
    fn status(&self) -> AdapterStatus;

    /// One live attempt. Must not touch the transport when unconfigured.
    async fn fetch_outcome(&self, filters: &FetchFilters) -> FetchOutcome;

    async fn test_connection(&self) -> bool;

    /// Never fails: unconfigured or failing providers yield their fallback dataset.
    async fn fetch(&self, filters: &FetchFilters) -> Vec<Opportunity> {
        let outcome = self.fetch_outcome(filters).await;
        resolve_outcome(self.kind(), self.source_id(), outcome)
    }
}

#[derive(Clone, Default)]
pub struct AdapterOptions {
    pub probe_timeout: Option<Duration>,
}

/// Transport and configuration shared by every provider adapter.
struct ProviderClient {
    kind: ProviderKind,
    config: ProviderConfig,
    transport: Arc<dyn JsonTransport>,
    probe_timeout: Duration,
}

impl ProviderClient {
    fn new(
        kind: ProviderKind,
        config: ProviderConfig,
        transport: Arc<dyn JsonTransport>,
        options: AdapterOptions,
    ) -> Self {
        Self {
            kind,
            config,
            transport,
            probe_timeout: options.probe_timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT),
        }
    }

    fn base_url(&self) -> Option<&str> {
        self.config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    fn endpoint(&self, path: &str) -> Option<String> {
        self.base_url()
            .map(|base| format!("{}{path}", base.trim_end_matches('/')))
    }

    fn is_configured(&self) -> bool {
        self.base_url().is_some() && (!self.kind.requires_credential() || self.api_key().is_some())
    }

    fn missing_config_hint(&self) -> String {
        match (self.base_url().is_some(), self.kind.requires_credential()) {
            (false, true) => format!("{} needs a base URL and an API key", self.config.source_id),
            (false, false) => format!("{} needs a base URL", self.config.source_id),
            (true, _) => format!("{} needs an API key", self.config.source_id),
        }
    }

    fn status(&self) -> AdapterStatus {
        AdapterStatus {
            configured: self.is_configured(),
            source: self.config.source_id.clone(),
            endpoint: self.endpoint(self.kind.fetch_path()),
            credential: self.api_key().map(mask_credential),
        }
    }

    async fn get(&self, request: &JsonRequest) -> Result<JsonValue, FetchError> {
        self.transport.get_json(request).await
    }

    async fn probe(&self, request: Option<JsonRequest>) -> bool {
        let Some(request) = request else {
            return false;
        };
        match self.transport.probe(&request, self.probe_timeout).await {
            Ok(()) => true,
            Err(err) => {
                warn!(source = %self.config.source_id, error = %err, "health probe failed");
                false
            }
        }
    }
}

fn outcome_from(
    fetched: Result<JsonValue, FetchError>,
    normalize: impl FnOnce(&JsonValue) -> Result<Vec<Opportunity>, NormalizeError>,
) -> FetchOutcome {
    match fetched {
        Ok(payload) => match normalize(&payload) {
            Ok(records) => FetchOutcome::Live(records),
            Err(err) => FetchOutcome::Malformed {
                reason: err.to_string(),
            },
        },
        Err(err) => FetchOutcome::Transport(err),
    }
}

/// `GET {base}/franchises` with an `X-API-Key` header.
pub struct FranchiseAdapter {
    client: ProviderClient,
}

impl FranchiseAdapter {
    pub fn new(
        config: ProviderConfig,
        transport: Arc<dyn JsonTransport>,
        options: AdapterOptions,
    ) -> Self {
        Self {
            client: ProviderClient::new(ProviderKind::Franchise, config, transport, options),
        }
    }

    fn request(&self, path: &str) -> Option<JsonRequest> {
        let url = self.client.endpoint(path)?;
        let key = self.client.api_key()?;
        Some(JsonRequest::get(&self.client.config.source_id, url).header("X-API-Key", key))
    }
}

#[async_trait]
impl SourceAdapter for FranchiseAdapter {
    fn source_id(&self) -> &str {
        &self.client.config.source_id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Franchise
    }

    fn status(&self) -> AdapterStatus {
        self.client.status()
    }

    async fn fetch_outcome(&self, _filters: &FetchFilters) -> FetchOutcome {
        let Some(request) = self.request(self.client.kind.fetch_path()) else {
            return FetchOutcome::ConfigMissing {
                hint: self.client.missing_config_hint(),
            };
        };
        outcome_from(self.client.get(&request).await, |payload| {
            normalize_franchise_payload(self.source_id(), payload)
        })
    }

    async fn test_connection(&self) -> bool {
        self.client.probe(self.request("/health")).await
    }
}

/// `GET {base}/listings` with bearer auth and optional query filters.
pub struct RealEstateAdapter {
    client: ProviderClient,
}

impl RealEstateAdapter {
    pub fn new(
        config: ProviderConfig,
        transport: Arc<dyn JsonTransport>,
        options: AdapterOptions,
    ) -> Self {
        Self {
            client: ProviderClient::new(ProviderKind::RealEstate, config, transport, options),
        }
    }

    fn request(&self, path: &str) -> Option<JsonRequest> {
        let url = self.client.endpoint(path)?;
        let key = self.client.api_key()?;
        Some(
            JsonRequest::get(&self.client.config.source_id, url)
                .header("Authorization", format!("Bearer {key}")),
        )
    }

    /// The provider contract as named in its API: the same call `fetch` makes.
    pub async fn fetch_listings(&self, filters: &FetchFilters) -> Vec<Opportunity> {
        self.fetch(filters).await
    }
}

fn apply_listing_filters(mut request: JsonRequest, filters: &FetchFilters) -> JsonRequest {
    if let Some(location) = &filters.location {
        request = request.query_param("location", location);
    }
    if let Some(min_price) = filters.min_price {
        request = request.query_param("minPrice", min_price.to_string());
    }
    if let Some(max_price) = filters.max_price {
        request = request.query_param("maxPrice", max_price.to_string());
    }
    if let Some(property_type) = &filters.property_type {
        request = request.query_param("type", property_type);
    }
    request
}

#[async_trait]
impl SourceAdapter for RealEstateAdapter {
    fn source_id(&self) -> &str {
        &self.client.config.source_id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::RealEstate
    }

    fn status(&self) -> AdapterStatus {
        self.client.status()
    }

    async fn fetch_outcome(&self, filters: &FetchFilters) -> FetchOutcome {
        let Some(request) = self.request(self.client.kind.fetch_path()) else {
            return FetchOutcome::ConfigMissing {
                hint: self.client.missing_config_hint(),
            };
        };
        let request = apply_listing_filters(request, filters);
        outcome_from(self.client.get(&request).await, |payload| {
            normalize_real_estate_payload(self.source_id(), payload)
        })
    }

    async fn test_connection(&self) -> bool {
        self.client.probe(self.request("/health")).await
    }
}

/// Credential-free public business listings at `GET {base}/businesses`.
pub struct PublicListingsAdapter {
    client: ProviderClient,
}

impl PublicListingsAdapter {
    pub fn new(
        config: ProviderConfig,
        transport: Arc<dyn JsonTransport>,
        options: AdapterOptions,
    ) -> Self {
        Self {
            client: ProviderClient::new(ProviderKind::Public, config, transport, options),
        }
    }

    fn request(&self, path: &str) -> Option<JsonRequest> {
        let url = self.client.endpoint(path)?;
        Some(JsonRequest::get(&self.client.config.source_id, url))
    }
}

#[async_trait]
impl SourceAdapter for PublicListingsAdapter {
    fn source_id(&self) -> &str {
        &self.client.config.source_id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Public
    }

    fn status(&self) -> AdapterStatus {
        self.client.status()
    }

    async fn fetch_outcome(&self, _filters: &FetchFilters) -> FetchOutcome {
        let Some(request) = self.request(self.client.kind.fetch_path()) else {
            return FetchOutcome::ConfigMissing {
                hint: self.client.missing_config_hint(),
            };
        };
        outcome_from(self.client.get(&request).await, |payload| {
            normalize_public_payload(self.source_id(), payload)
        })
    }

    async fn test_connection(&self) -> bool {
        self.client.probe(self.request("/health")).await
    }
}

pub fn adapter_for_kind(
    kind: ProviderKind,
    config: ProviderConfig,
    transport: Arc<dyn JsonTransport>,
    options: AdapterOptions,
) -> Box<dyn SourceAdapter> {
    match kind {
        ProviderKind::Franchise => Box::new(FranchiseAdapter::new(config, transport, options)),
        ProviderKind::RealEstate => Box::new(RealEstateAdapter::new(config, transport, options)),
        ProviderKind::Public => Box::new(PublicListingsAdapter::new(config, transport, options)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ohub_core::{Category, MetadataValue};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Scripted {
        Json(JsonValue),
        Status(u16),
    }

    struct CountingTransport {
        response: Scripted,
        calls: AtomicUsize,
        requests: Mutex<Vec<JsonRequest>>,
    }

    impl CountingTransport {
        fn new(response: Scripted) -> Arc<Self> {
            Arc::new(Self {
                response,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> JsonRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }

        fn respond(&self, request: &JsonRequest) -> Result<JsonValue, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            match &self.response {
                Scripted::Json(value) => Ok(value.clone()),
                Scripted::Status(status) => Err(FetchError::HttpStatus {
                    status: *status,
                    url: request.url.clone(),
                }),
            }
        }
    }

    #[async_trait]
    impl JsonTransport for CountingTransport {
        async fn get_json(&self, request: &JsonRequest) -> Result<JsonValue, FetchError> {
            self.respond(request)
        }

        async fn probe(&self, request: &JsonRequest, _timeout: Duration) -> Result<(), FetchError> {
            self.respond(request).map(|_| ())
        }
    }

    fn configured(source_id: &str) -> ProviderConfig {
        ProviderConfig {
            source_id: source_id.to_string(),
            base_url: Some("https://api.example.test/v1/".to_string()),
            api_key: Some("sk_live_1234567890".to_string()),
        }
    }

    fn unconfigured(source_id: &str) -> ProviderConfig {
        ProviderConfig {
            source_id: source_id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn secondary_synonym_is_used_when_primary_is_absent() {
        let raw = json!({"title": "Pizza Palace", "minInvestment": 120000, "investment_max": "250,000"});
        let record =
            normalize_record(&raw, &FRANCHISE_FIELDS, OpportunityType::Franchise, "f").unwrap();
        assert_eq!(record.title, "Pizza Palace");
        assert_eq!(record.investment_min, 120_000.0);
        assert_eq!(record.investment_max, 250_000.0);
    }

    #[test]
    fn first_synonym_wins_when_several_are_present() {
        let raw = json!({"name": "Primary", "title": "Secondary", "investmentMin": 1, "minInvestment": 2});
        let record =
            normalize_record(&raw, &FRANCHISE_FIELDS, OpportunityType::Franchise, "f").unwrap();
        assert_eq!(record.title, "Primary");
        assert_eq!(record.investment_min, 1.0);
    }

    #[test]
    fn missing_fields_take_documented_defaults() {
        let raw = json!({"name": "Bare Franchise"});
        let record =
            normalize_record(&raw, &FRANCHISE_FIELDS, OpportunityType::Franchise, "f").unwrap();
        assert_eq!(record.description, DEFAULT_DESCRIPTION);
        assert_eq!(record.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(record.investment_min, 0.0);
        assert_eq!(record.investment_max, 0.0);
        assert_eq!(record.category, Category::Commercial);
        assert_eq!(record.status, OpportunityStatus::Active);
        assert!(record.website.is_none());
        assert!(record.country.is_none());
    }

    #[test]
    fn explicit_zero_and_empty_string_are_present_but_null_is_absent() {
        let raw = json!({
            "name": "Edge Case",
            "investmentMin": 0,
            "investment_min": 999,
            "description": "",
            "summary": "should not be used",
            "imageUrl": null,
            "image_url": "https://img.example.test/a.png"
        });
        let record =
            normalize_record(&raw, &FRANCHISE_FIELDS, OpportunityType::Franchise, "f").unwrap();
        assert_eq!(record.investment_min, 0.0);
        assert_eq!(record.description, "");
        assert_eq!(record.image_url, "https://img.example.test/a.png");
    }

    #[test]
    fn malformed_optional_values_default_instead_of_failing() {
        let raw = json!({
            "name": "Odd Payload",
            "investmentMin": "call for pricing",
            "investmentMax": -5,
            "description": {"text": "nested"},
            "website": ["a", "b"]
        });
        let record =
            normalize_record(&raw, &FRANCHISE_FIELDS, OpportunityType::Franchise, "f").unwrap();
        assert_eq!(record.investment_min, 0.0);
        assert_eq!(record.investment_max, 0.0);
        assert_eq!(record.description, DEFAULT_DESCRIPTION);
        assert!(record.website.is_none());
    }

    #[test]
    fn records_without_a_title_are_dropped() {
        let payload = json!([{"description": "no title"}, {"name": "   "}, 42, {"name": "Kept"}]);
        let records = normalize_franchise_payload("f", &payload).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Kept");
    }

    #[test]
    fn inverted_investment_range_is_passed_through_unvalidated() {
        let raw = json!({"name": "Inverted", "investmentMin": 500000, "investmentMax": 100000});
        let record =
            normalize_record(&raw, &FRANCHISE_FIELDS, OpportunityType::Franchise, "f").unwrap();
        assert!(record.investment_min > record.investment_max);
    }

    #[test]
    fn real_estate_listing_is_classified_and_keeps_recognized_metadata() {
        let raw = json!({
            "address": "12 Harbour St",
            "price": 725000,
            "propertyType": "Luxury Condo",
            "city": "Toronto",
            "state": "ON",
            "bedrooms": 2,
            "agent": {"name": "Sam"}
        });
        let record = normalize_record(
            &raw,
            &REAL_ESTATE_FIELDS,
            OpportunityType::RealEstate,
            "real_estate_api",
        )
        .unwrap();
        assert_eq!(record.title, "12 Harbour St");
        assert_eq!(record.category, Category::Residential);
        assert_eq!(record.investment_min, 725_000.0);
        assert_eq!(record.investment_max, 725_000.0);
        assert_eq!(record.location.as_deref(), Some("Toronto"));
        assert_eq!(record.province.as_deref(), Some("ON"));
        assert_eq!(record.metadata.get("bedrooms"), Some(&MetadataValue::Number(2.0)));
        assert!(record.metadata.get("agent").is_none());
        assert_eq!(record.metadata.raw.as_ref(), Some(&raw));
    }

    #[test]
    fn top_level_shape_errors_are_reported() {
        assert!(matches!(
            normalize_franchise_payload("f", &json!({"franchises": []})),
            Err(NormalizeError::NotAnArray { found: "object", .. })
        ));
        assert!(matches!(
            normalize_real_estate_payload("r", &json!([])),
            Err(NormalizeError::NotAnObject { found: "array", .. })
        ));
        assert!(normalize_real_estate_payload("r", &json!({"listings": "nope"}))
            .unwrap()
            .is_empty());
        assert!(normalize_real_estate_payload("r", &json!({})).unwrap().is_empty());
        assert_eq!(
            normalize_public_payload("p", &json!({"data": [{"businessName": "Shop"}]}))
                .unwrap()
                .len(),
            1
        );
        assert!(normalize_public_payload("p", &json!({"other": []})).unwrap().is_empty());
        assert!(normalize_public_payload("p", &json!("text")).is_err());
    }

    #[test]
    fn credentials_are_masked_in_status() {
        assert_eq!(mask_credential("sk_live_1234567890"), "sk_l****");
        assert_eq!(mask_credential("short"), "****");
        assert_eq!(mask_credential("abcdefgh"), "****");
        assert_eq!(mask_credential("abcdefghijk"), "****");
        assert_eq!(mask_credential("abcdefghijkl"), "abcd****");

        let transport = CountingTransport::new(Scripted::Status(500));
        let adapter = RealEstateAdapter::new(
            configured("real_estate_api"),
            transport.clone(),
            AdapterOptions::default(),
        );
        let status = adapter.status();
        assert!(status.configured);
        assert_eq!(status.source, "real_estate_api");
        assert_eq!(status.endpoint.as_deref(), Some("https://api.example.test/v1/listings"));
        assert_eq!(status.credential.as_deref(), Some("sk_l****"));
        assert_eq!(transport.calls(), 0);

        let unconfigured = FranchiseAdapter::new(
            ProviderConfig {
                api_key: Some("   ".into()),
                ..configured("franchise_api")
            },
            transport.clone(),
            AdapterOptions::default(),
        );
        let status = unconfigured.status();
        assert!(!status.configured);
        assert!(status.credential.is_none());
    }

    #[tokio::test]
    async fn unconfigured_fetch_serves_fallback_without_network() {
        let transport = CountingTransport::new(Scripted::Json(json!([])));
        let adapter = FranchiseAdapter::new(
            unconfigured("franchise_api"),
            transport.clone(),
            AdapterOptions::default(),
        );
        let records = adapter.fetch(&FetchFilters::default()).await;
        assert_eq!(records, fallback::dataset(ProviderKind::Franchise, "franchise_api"));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn transport_failure_serves_fallback() {
        let transport = CountingTransport::new(Scripted::Status(503));
        let adapter = FranchiseAdapter::new(
            configured("franchise_api"),
            transport.clone(),
            AdapterOptions::default(),
        );
        let outcome = adapter.fetch_outcome(&FetchFilters::default()).await;
        assert!(matches!(outcome, FetchOutcome::Transport(FetchError::HttpStatus { status: 503, .. })));

        let records = adapter.fetch(&FetchFilters::default()).await;
        assert_eq!(records, fallback::dataset(ProviderKind::Franchise, "franchise_api"));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn unconfigured_real_estate_returns_the_two_mock_listings() {
        let transport = CountingTransport::new(Scripted::Json(json!({})));
        let adapter = RealEstateAdapter::new(
            unconfigured("real_estate_api"),
            transport.clone(),
            AdapterOptions::default(),
        );
        let records = adapter.fetch_listings(&FetchFilters::default()).await;
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.opportunity_type == OpportunityType::RealEstate));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn live_real_estate_fetch_sends_auth_and_filters() {
        let transport = CountingTransport::new(Scripted::Json(json!({
            "listings": [
                {"title": "Warehouse Unit 4", "price": 1200000, "propertyType": "Industrial Warehouse"},
                {"title": "Corner Lot", "price": 300000, "propertyType": "Land"}
            ]
        })));
        let adapter = RealEstateAdapter::new(
            configured("real_estate_api"),
            transport.clone(),
            AdapterOptions::default(),
        );
        let filters = FetchFilters {
            location: Some("Calgary".into()),
            min_price: Some(250000.0),
            max_price: None,
            property_type: Some("industrial".into()),
        };
        let records = adapter.fetch(&filters).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].category, Category::Industrial);
        assert_eq!(records[1].category, Category::Land);
        assert!(records.iter().all(|r| r.source == "real_estate_api"));

        let request = transport.last_request();
        assert_eq!(request.url, "https://api.example.test/v1/listings");
        assert!(request
            .headers
            .contains(&("Authorization".into(), "Bearer sk_live_1234567890".into())));
        assert_eq!(
            request.query,
            vec![
                ("location".to_string(), "Calgary".to_string()),
                ("minPrice".to_string(), "250000".to_string()),
                ("type".to_string(), "industrial".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn malformed_payload_normalizes_to_empty_not_fallback() {
        let transport = CountingTransport::new(Scripted::Json(json!({"unexpected": true})));
        let adapter = FranchiseAdapter::new(
            configured("franchise_api"),
            transport.clone(),
            AdapterOptions::default(),
        );
        assert!(adapter.fetch(&FetchFilters::default()).await.is_empty());
        assert_eq!(
            transport.last_request().headers,
            vec![("X-API-Key".to_string(), "sk_live_1234567890".to_string())]
        );
    }

    #[tokio::test]
    async fn public_adapter_needs_only_a_base_url() {
        let transport = CountingTransport::new(Scripted::Json(json!([{"name": "Corner Store"}])));
        let adapter = PublicListingsAdapter::new(
            ProviderConfig {
                api_key: None,
                ..configured("public_listings")
            },
            transport.clone(),
            AdapterOptions::default(),
        );
        assert!(adapter.status().configured);
        let records = adapter.fetch(&FetchFilters::default()).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].opportunity_type, OpportunityType::Business);
        assert_eq!(transport.last_request().url, "https://api.example.test/v1/businesses");
    }

    #[tokio::test]
    async fn test_connection_reports_health_check_result() {
        let down = CountingTransport::new(Scripted::Status(502));
        let adapter = RealEstateAdapter::new(
            configured("real_estate_api"),
            down.clone(),
            AdapterOptions::default(),
        );
        assert!(!adapter.test_connection().await);
        assert_eq!(down.last_request().url, "https://api.example.test/v1/health");

        let up = CountingTransport::new(Scripted::Json(json!({"ok": true})));
        let adapter = RealEstateAdapter::new(
            configured("real_estate_api"),
            up.clone(),
            AdapterOptions::default(),
        );
        assert!(adapter.test_connection().await);

        let idle = CountingTransport::new(Scripted::Json(json!({})));
        let adapter = RealEstateAdapter::new(
            unconfigured("real_estate_api"),
            idle.clone(),
            AdapterOptions::default(),
        );
        assert!(!adapter.test_connection().await);
        assert_eq!(idle.calls(), 0);
    }

    #[test]
    fn status_endpoint_is_the_listing_url() {
        let transport = CountingTransport::new(Scripted::Json(json!([])));
        for (kind, path) in [
            (ProviderKind::Franchise, "/franchises"),
            (ProviderKind::RealEstate, "/listings"),
            (ProviderKind::Public, "/businesses"),
        ] {
            let adapter = adapter_for_kind(
                kind,
                ProviderConfig {
                    base_url: Some("https://api.example.test/v1".into()),
                    ..configured(kind.default_source_id())
                },
                transport.clone(),
                AdapterOptions::default(),
            );
            assert_eq!(
                adapter.status().endpoint,
                Some(format!("https://api.example.test/v1{path}"))
            );
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn status_endpoint_matches_the_fetched_url() {
        let transport = CountingTransport::new(Scripted::Json(json!([{"name": "Corner Bakery"}])));
        let adapter = FranchiseAdapter::new(
            configured("franchise_api"),
            transport.clone(),
            AdapterOptions::default(),
        );
        adapter.fetch(&FetchFilters::default()).await;
        assert_eq!(adapter.status().endpoint, Some(transport.last_request().url));
    }

}
