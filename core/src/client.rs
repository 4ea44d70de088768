//! Transport client for the WhatsApp Cloud (Graph) API.
//!
//! # Design
//! `GraphClient` owns one `Config` and one `reqwest::Client` and is built
//! fresh for every inbound request. Each upstream operation is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method that
//! consumes an `HttpResponse`; the async methods glue the two together
//! through `http::execute`.
//!
//! The Graph API reports failures in the body, not reliably in the status
//! line, so every status is read as "received" and the decoded body decides:
//! an `error` key means failure, anything else is the result.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::http::{self, FormPart, HttpBody, HttpMethod, HttpRequest, HttpResponse};
use crate::types::{MediaUpload, MessageEnvelope, QueryOptions, SendResult, TemplateDefinition};

pub const MESSAGING_PRODUCT: &str = "whatsapp";
pub const RECIPIENT_TYPE: &str = "individual";

const UNKNOWN_UPSTREAM_ERROR: &str = "unknown upstream error";

/// Caller headers that must not override what the transport sets itself.
const RESERVED_UPLOAD_HEADERS: [&str; 4] = ["authorization", "content-type", "content-length", "host"];

/// Async client for one set of Graph API credentials.
#[derive(Debug, Clone)]
pub struct GraphClient {
    config: Config,
    http: reqwest::Client,
}

impl GraphClient {
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn phone_url(&self, edge: &str) -> String {
        format!(
            "{}/{}/{edge}",
            self.config.versioned_base(),
            self.config.phone_number_id()
        )
    }

    fn templates_url(&self) -> String {
        format!(
            "{}/{}/message_templates",
            self.config.versioned_base(),
            self.config.whatsapp_business_id()
        )
    }

    fn auth_header(&self) -> (String, String) {
        (
            "authorization".to_string(),
            format!("Bearer {}", self.config.access_token()),
        )
    }

    fn json_headers(&self) -> Vec<(String, String)> {
        vec![
            ("content-type".to_string(), "application/json".to_string()),
            self.auth_header(),
        ]
    }

    // -----------------------------------------------------------------------
    // build
    // -----------------------------------------------------------------------

    /// `POST /{phone_number_id}/messages` with the mandatory fields merged in.
    pub fn build_send_message(&self, envelope: &MessageEnvelope) -> Result<HttpRequest> {
        let mut body = match to_value(envelope)? {
            Value::Object(map) => map,
            _ => return Err(ApiError::Serialization("envelope is not a JSON object".to_string())),
        };
        insert_mandatory(&mut body);
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.phone_url("messages"),
            headers: self.json_headers(),
            body: Some(HttpBody::Json(to_string(&body)?)),
        })
    }

    /// `POST /{phone_number_id}/media` as multipart.
    pub fn build_upload_media(&self, upload: &MediaUpload) -> HttpRequest {
        let mut headers: Vec<(String, String)> = upload
            .form_headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .filter(|(k, _)| !RESERVED_UPLOAD_HEADERS.contains(&k.as_str()))
            .collect();
        headers.push(self.auth_header());

        let parts = vec![
            FormPart::Text {
                name: "messaging_product".to_string(),
                value: MESSAGING_PRODUCT.to_string(),
            },
            FormPart::Text {
                name: "recipient_type".to_string(),
                value: RECIPIENT_TYPE.to_string(),
            },
            FormPart::Text {
                name: "type".to_string(),
                value: upload.mime_type.clone(),
            },
            FormPart::File {
                name: "file".to_string(),
                filename: upload.filename.clone(),
                mime_type: upload.mime_type.clone(),
                bytes: upload.file.clone(),
            },
        ];

        HttpRequest {
            method: HttpMethod::Post,
            url: self.phone_url("media"),
            headers,
            body: Some(HttpBody::Multipart(parts)),
        }
    }

    /// `POST /{whatsapp_business_id}/message_templates`.
    pub fn build_create_template(&self, definition: &TemplateDefinition) -> Result<HttpRequest> {
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.templates_url(),
            headers: self.json_headers(),
            body: Some(HttpBody::Json(to_string(definition)?)),
        })
    }

    /// `GET /{whatsapp_business_id}/message_templates{query}`.
    pub fn build_list_templates(&self, options: &QueryOptions) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}{}", self.templates_url(), template_query(options)),
            headers: self.json_headers(),
            body: None,
        }
    }

    /// `GET /{id}`.
    pub fn build_show_template(&self, id: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}/{id}", self.config.versioned_base()),
            headers: self.json_headers(),
            body: None,
        }
    }

    /// `DELETE /{whatsapp_business_id}/message_templates?name={name}`.
    pub fn build_delete_template(&self, name: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Delete,
            url: format!("{}?name={}", self.templates_url(), encode(name)),
            headers: self.json_headers(),
            body: None,
        }
    }

    // -----------------------------------------------------------------------
    // parse
    // -----------------------------------------------------------------------

    /// Decode the body and fail if it carries an `error` object.
    pub fn parse_raw(&self, response: HttpResponse) -> Result<Value> {
        let body: Value = serde_json::from_str(&response.body).map_err(|e| {
            ApiError::MalformedUpstreamResponse(format!(
                "HTTP {}: body is not JSON: {e}",
                response.status
            ))
        })?;
        if let Some(error) = body.get("error") {
            let message = upstream_error_message(error);
            warn!(status = response.status, %message, "graph api returned an error");
            return Err(ApiError::Upstream(message));
        }
        Ok(body)
    }

    /// Decode a send-message response and reduce it to a `SendResult`.
    pub fn parse_send_message(&self, response: HttpResponse) -> Result<SendResult> {
        let body = self.parse_raw(response)?;
        reduce_send_result(&body)
    }

    // -----------------------------------------------------------------------
    // round trips
    // -----------------------------------------------------------------------

    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse> {
        http::execute(&self.http, request, self.config.timeout()).await
    }

    pub async fn send_message(&self, envelope: &MessageEnvelope) -> Result<SendResult> {
        let request = self.build_send_message(envelope)?;
        self.parse_send_message(self.round_trip(request).await?)
    }

    /// Like `send_message` but returns the decoded body unreduced.
    pub async fn send_message_raw(&self, envelope: &MessageEnvelope) -> Result<Value> {
        let request = self.build_send_message(envelope)?;
        self.parse_raw(self.round_trip(request).await?)
    }

    pub async fn upload_media(&self, upload: &MediaUpload) -> Result<Value> {
        let request = self.build_upload_media(upload);
        self.parse_raw(self.round_trip(request).await?)
    }

    pub async fn create_template(&self, definition: &TemplateDefinition) -> Result<Value> {
        let request = self.build_create_template(definition)?;
        self.parse_raw(self.round_trip(request).await?)
    }

    pub async fn list_templates(&self, options: &QueryOptions) -> Result<Value> {
        let request = self.build_list_templates(options);
        self.parse_raw(self.round_trip(request).await?)
    }

    pub async fn show_template(&self, id: &str) -> Result<Value> {
        let request = self.build_show_template(id);
        self.parse_raw(self.round_trip(request).await?)
    }

    pub async fn delete_template(&self, name: &str) -> Result<Value> {
        let request = self.build_delete_template(name);
        self.parse_raw(self.round_trip(request).await?)
    }
}

/// Query string for the template listing: `fields`, `limit`, `after`,
/// `before`, in that order, each left out when unset.
pub fn template_query(options: &QueryOptions) -> String {
    let mut clauses = Vec::new();

    let mut fields = Vec::new();
    for field in &options.fields {
        if !fields.contains(&field.as_str()) {
            fields.push(field.as_str());
        }
    }
    if !fields.is_empty() {
        clauses.push(format!("fields={}", fields.join(",")));
    }
    if let Some(limit) = options.limit.filter(|l| *l > 0) {
        clauses.push(format!("limit={limit}"));
    }
    if let Some(after) = options.after.as_deref().filter(|s| !s.is_empty()) {
        clauses.push(format!("after={}", encode(after)));
    }
    if let Some(before) = options.before.as_deref().filter(|s| !s.is_empty()) {
        clauses.push(format!("before={}", encode(before)));
    }

    if clauses.is_empty() {
        String::new()
    } else {
        format!("?{}", clauses.join("&"))
    }
}

/// Most specific message in an upstream `error` object:
/// `error_user_msg`, then `error_data.details`, then `message`.
pub fn upstream_error_message(error: &Value) -> String {
    if let Some(s) = error.as_str().filter(|s| !s.is_empty()) {
        return s.to_string();
    }
    [
        error.get("error_user_msg"),
        error.pointer("/error_data/details"),
        error.get("message"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|s| !s.is_empty())
    .unwrap_or(UNKNOWN_UPSTREAM_ERROR)
    .to_string()
}

/// Reduce a send response to its first contact and first message.
pub fn reduce_send_result(body: &Value) -> Result<SendResult> {
    let first = |key: &str| {
        body.get(key)
            .and_then(Value::as_array)
            .and_then(|entries| entries.first())
            .ok_or_else(|| ApiError::MalformedUpstreamResponse(format!("`{key}` is missing or empty")))
    };
    let contact = first("contacts")?;
    let message = first("messages")?;

    let input = match contact.get("input") {
        Some(Value::String(s)) => digits_as_integer(s),
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    }
    .ok_or_else(|| {
        ApiError::MalformedUpstreamResponse("`contacts[0].input` is not an integer".to_string())
    })?;
    let phone = contact
        .get("wa_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::MalformedUpstreamResponse("`contacts[0].wa_id` is missing".to_string()))?;
    let wamid = message
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::MalformedUpstreamResponse("`messages[0].id` is missing".to_string()))?;

    Ok(SendResult {
        input,
        phone: phone.to_string(),
        wamid: wamid.to_string(),
    })
}

/// Integer made of the digits in `s`. Graph echoes the recipient as the
/// caller wrote it, so `+`, spaces, dashes and parentheses are dropped.
/// `None` when no digits remain or the number does not fit a `u64`.
fn digits_as_integer(s: &str) -> Option<u64> {
    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn insert_mandatory(body: &mut Map<String, Value>) {
    body.entry("messaging_product")
        .or_insert_with(|| Value::String(MESSAGING_PRODUCT.to_string()));
    body.entry("recipient_type")
        .or_insert_with(|| Value::String(RECIPIENT_TYPE.to_string()));
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Serialization(e.to_string()))
}

fn to_string<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| ApiError::Serialization(e.to_string()))
}
