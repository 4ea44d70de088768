//! Structural validation of caller payloads.
//!
//! `Validator` is the seam: hosts that already validate requests upstream can
//! plug in their own. `SchemaValidator` checks a payload by deserializing it
//! into the typed request for its shape (unknown fields are rejected), then
//! applies the few rules serde cannot express.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::service::{
    CreateTemplateRequest, DocumentRequest, LocationRequest, MediaRequest, PlainMediaRequest,
    SendTemplateRequest, TextRequest,
};
use crate::types::{is_absolute_url, QueryOptions};

/// Payload shapes the validator knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Config,
    Text,
    Image,
    Document,
    Audio,
    Video,
    Sticker,
    Location,
    SendTemplate,
    CreateTemplate,
    Query,
}

/// Accepts a payload and a shape descriptor; `Err` carries a readable reason.
pub trait Validator {
    fn validate(&self, payload: &Value, shape: Shape) -> Result<(), String>;
}

/// Default validator backed by the crate's serde types.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl Validator for SchemaValidator {
    fn validate(&self, payload: &Value, shape: Shape) -> Result<(), String> {
        match shape {
            Shape::Config => check_config(&parse(payload)?),
            Shape::Text => parse::<TextRequest>(payload).map(drop),
            Shape::Image | Shape::Video => parse::<MediaRequest>(payload)?.media().map(drop),
            Shape::Document => parse::<DocumentRequest>(payload)?.media().map(drop),
            Shape::Audio | Shape::Sticker => parse::<PlainMediaRequest>(payload)?.media().map(drop),
            Shape::Location => parse::<LocationRequest>(payload).map(drop),
            Shape::SendTemplate => parse::<SendTemplateRequest>(payload).map(drop),
            Shape::CreateTemplate => parse::<CreateTemplateRequest>(payload).map(drop),
            Shape::Query => parse::<QueryOptions>(payload).map(drop),
        }
    }
}

fn parse<T: DeserializeOwned>(payload: &Value) -> Result<T, String> {
    T::deserialize(payload).map_err(|e| e.to_string())
}

/// Field set handed over by the config resolver. Every value is a string.
#[allow(dead_code)]
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFields {
    phone_number_id: String,
    whatsapp_business_id: String,
    access_token: String,
    graph_url: Option<String>,
    graph_version: Option<String>,
    timeout: Option<String>,
}

fn check_config(fields: &ConfigFields) -> Result<(), String> {
    if let Some(timeout) = &fields.timeout {
        if !matches!(timeout.trim().parse::<u64>(), Ok(millis) if millis > 0) {
            return Err(format!(
                "timeout must be a positive integer of milliseconds, got {timeout:?}"
            ));
        }
    }
    if let Some(url) = &fields.graph_url {
        let http = url.starts_with("http://") || url.starts_with("https://");
        if !http || !is_absolute_url(url) {
            return Err(format!("graph_url must be an absolute http(s) URL, got {url:?}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(payload: Value, shape: Shape) -> Result<(), String> {
        SchemaValidator.validate(&payload, shape)
    }

    #[test]
    fn config_accepts_required_and_optional_fields() {
        let payload = json!({
            "phone_number_id": "1",
            "whatsapp_business_id": "2",
            "access_token": "t",
            "graph_url": "http://localhost:4000",
            "graph_version": "v20.0",
            "timeout": "500"
        });
        assert!(validate(payload, Shape::Config).is_ok());
    }

    #[test]
    fn config_rejects_bad_values() {
        let base = json!({"phone_number_id": "1", "whatsapp_business_id": "2", "access_token": "t"});

        let mut bad_timeout = base.clone();
        bad_timeout["timeout"] = json!("-3");
        assert!(validate(bad_timeout, Shape::Config).is_err());

        let mut zero_timeout = base.clone();
        zero_timeout["timeout"] = json!("0");
        assert!(validate(zero_timeout, Shape::Config).is_err());

        let mut bad_url = base.clone();
        bad_url["graph_url"] = json!("graph.facebook.com");
        assert!(validate(bad_url, Shape::Config).is_err());

        let mut extra = base;
        extra["region"] = json!("eu");
        assert!(validate(extra, Shape::Config).is_err());
    }

    #[test]
    fn text_requires_body() {
        assert!(validate(json!({"body": "hello"}), Shape::Text).is_ok());
        assert!(validate(json!({"body": "hello", "options": {"preview_url": true}}), Shape::Text).is_ok());
        assert!(validate(json!({"options": {}}), Shape::Text).is_err());
    }

    #[test]
    fn media_needs_link_or_id() {
        assert!(validate(json!({"id": "123"}), Shape::Image).is_ok());
        assert!(validate(json!({"link": "https://x.com/a.png"}), Shape::Video).is_ok());
        assert!(validate(json!({"options": {"caption": "c"}}), Shape::Image).is_err());
        assert!(validate(json!({"link": "not a url"}), Shape::Image).is_err());
    }

    #[test]
    fn options_are_shape_specific() {
        let doc = json!({"id": "1", "options": {"filename": "a.pdf", "caption": "c"}});
        assert!(validate(doc.clone(), Shape::Document).is_ok());
        assert!(validate(doc, Shape::Image).is_err());
        assert!(validate(json!({"id": "1", "options": {"caption": "c"}}), Shape::Audio).is_err());
    }

    #[test]
    fn send_template_checks_parameter_tags() {
        let ok = json!({
            "name": "order_update",
            "language": "en_US",
            "components": [{"type": "body", "parameters": [{"type": "text", "text": "Ada"}]}]
        });
        assert!(validate(ok, Shape::SendTemplate).is_ok());

        let bad = json!({
            "name": "order_update",
            "language": "en_US",
            "components": [{"type": "body", "parameters": [{"type": "emoji", "text": "x"}]}]
        });
        assert!(validate(bad, Shape::SendTemplate).is_err());
    }

    #[test]
    fn create_template_checks_category() {
        let ok = json!({
            "category": "UTILITY",
            "name": "order_update",
            "language": "en_US",
            "components": [{"type": "BODY", "text": "Hi {{1}}"}]
        });
        assert!(validate(ok, Shape::CreateTemplate).is_ok());
        let bad = json!({"category": "SPAM", "name": "x", "language": "en_US"});
        assert!(validate(bad, Shape::CreateTemplate).is_err());
    }

    #[test]
    fn create_template_accepts_url_component_and_media_headers() {
        let payload = json!({
            "category": "MARKETING",
            "name": "spring_sale",
            "language": "en_US",
            "components": [
                {"type": "HEADER", "format": "AUDIO"},
                {"type": "HEADER", "format": "CONTACT"},
                {"type": "BODY", "text": "Sale starts {{1}}"},
                {"type": "URL", "text": "Shop", "url": "https://x.com/{{1}}", "example": ["https://x.com/spring"]}
            ]
        });
        assert!(validate(payload, Shape::CreateTemplate).is_ok());

        let typo = json!({
            "category": "MARKETING",
            "name": "spring_sale",
            "language": "en_US",
            "components": [{"type": "BODY", "text": "Hi", "exmaple": {"body_text": [["Ada"]]}}]
        });
        assert!(validate(typo, Shape::CreateTemplate).is_err());
    }

    #[test]
    fn query_rejects_unknown_fields() {
        assert!(validate(json!({"fields": ["id", "status"], "limit": 5}), Shape::Query).is_ok());
        assert!(validate(json!({"fields": ["colour"]}), Shape::Query).is_err());
    }
}
