//! Per-request configuration.
//!
//! Credentials arrive with every inbound request as metadata fields (HTTP
//! headers in practice). `resolve_config` turns that map into an immutable
//! `Config`: presence checks first, structural validation second, defaults
//! last.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{ApiError, Result};
use crate::validate::{SchemaValidator, Shape, Validator};

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_GRAPH_VERSION: &str = "v19.0";
pub const DEFAULT_TIMEOUT_MILLIS: u64 = 10_000;

/// Required fields, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 3] = ["phone_number_id", "whatsapp_business_id", "access_token"];
pub const OPTIONAL_FIELDS: [&str; 3] = ["graph_url", "graph_version", "timeout"];

/// Credentials and endpoint settings for one request. Immutable.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    phone_number_id: String,
    whatsapp_business_id: String,
    access_token: String,
    graph_base_url: String,
    graph_version: String,
    timeout_millis: u64,
}

impl Config {
    pub fn new(
        phone_number_id: impl Into<String>,
        whatsapp_business_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            phone_number_id: phone_number_id.into(),
            whatsapp_business_id: whatsapp_business_id.into(),
            access_token: access_token.into(),
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            graph_version: DEFAULT_GRAPH_VERSION.to_string(),
            timeout_millis: DEFAULT_TIMEOUT_MILLIS,
        }
    }

    #[must_use]
    pub fn with_graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.graph_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_graph_version(mut self, version: impl Into<String>) -> Self {
        self.graph_version = version.into();
        self
    }

    #[must_use]
    pub fn with_timeout_millis(mut self, millis: u64) -> Self {
        self.timeout_millis = millis;
        self
    }

    pub fn phone_number_id(&self) -> &str {
        &self.phone_number_id
    }

    pub fn whatsapp_business_id(&self) -> &str {
        &self.whatsapp_business_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn graph_base_url(&self) -> &str {
        &self.graph_base_url
    }

    pub fn graph_version(&self) -> &str {
        &self.graph_version
    }

    pub fn timeout_millis(&self) -> u64 {
        self.timeout_millis
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }

    /// `{base}/{version}`, the prefix of every Graph URL.
    pub fn versioned_base(&self) -> String {
        format!("{}/{}", self.graph_base_url, self.graph_version)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("phone_number_id", &self.phone_number_id)
            .field("whatsapp_business_id", &self.whatsapp_business_id)
            .field("access_token", &"[REDACTED]")
            .field("graph_base_url", &self.graph_base_url)
            .field("graph_version", &self.graph_version)
            .field("timeout_millis", &self.timeout_millis)
            .finish()
    }
}

/// Resolve a `Config` using the default `SchemaValidator`.
pub fn resolve_config(raw: &HashMap<String, String>) -> Result<Config> {
    resolve_config_with(raw, &SchemaValidator)
}

/// Resolve a `Config` from raw metadata fields.
///
/// Names match case-insensitively and empty values count as absent. The
/// first missing required field fails with `MissingField` before the
/// validator sees anything.
pub fn resolve_config_with(
    raw: &HashMap<String, String>,
    validator: &dyn Validator,
) -> Result<Config> {
    let lookup = |name: &str| field(raw, name);

    for name in REQUIRED_FIELDS {
        if lookup(name).is_none() {
            return Err(ApiError::MissingField(name.to_string()));
        }
    }

    let mut fields = Map::new();
    for name in REQUIRED_FIELDS.into_iter().chain(OPTIONAL_FIELDS) {
        if let Some(value) = lookup(name) {
            fields.insert(name.to_string(), Value::String(value.to_string()));
        }
    }
    validator
        .validate(&Value::Object(fields), Shape::Config)
        .map_err(ApiError::ConfigValidation)?;

    let required = |name: &str| {
        lookup(name)
            .map(str::to_string)
            .ok_or_else(|| ApiError::MissingField(name.to_string()))
    };
    let mut config = Config::new(
        required("phone_number_id")?,
        required("whatsapp_business_id")?,
        required("access_token")?,
    );
    if let Some(url) = lookup("graph_url") {
        config = config.with_graph_base_url(url);
    }
    if let Some(version) = lookup("graph_version") {
        config = config.with_graph_version(version);
    }
    if let Some(timeout) = lookup("timeout") {
        let millis = timeout
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|millis| *millis > 0)
            .ok_or_else(|| {
                ApiError::ConfigValidation(format!("timeout must be a positive integer, got {timeout:?}"))
            })?;
        config = config.with_timeout_millis(millis);
    }
    Ok(config)
}

fn field<'a>(raw: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    raw.iter()
        .find(|(k, v)| k.eq_ignore_ascii_case(name) && !v.is_empty())
        .map(|(_, v)| v.as_str())
}
