//! Request boundary: caller payloads in, `SendResult` or raw Graph bodies out.
//!
//! A host (HTTP router, lambda adapter, CLI) hands each operation the raw
//! metadata fields, the path parameter and the JSON payload it received.
//! Every operation resolves the config, validates the payload, checks the
//! path parameter, builds a fresh `MessageComposer` and delegates. Failures
//! are rendered with `into_response` as `{"error": message}`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::composer::MessageComposer;
use crate::config::{resolve_config_with, OPTIONAL_FIELDS, REQUIRED_FIELDS};
use crate::error::{ApiError, Result};
use crate::types::{
    is_absolute_url, Coordinate, DefinitionComponent, DocumentOptions, LocationOptions,
    MediaOptions, MediaUpload, QueryOptions, SendResult, TemplateCategory, TemplateComponent,
    TextOptions,
};
use crate::validate::{SchemaValidator, Shape, Validator};

/// Raw metadata fields of one inbound request.
pub type Metadata = HashMap<String, String>;

// ---------------------------------------------------------------------------
// Caller payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextRequest {
    pub body: String,
    #[serde(default)]
    pub options: TextOptions,
}

/// Image or video payload: `link` or `id`, plus a caption.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaRequest {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub options: MediaOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentRequest {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub options: DocumentOptions,
}

/// Audio or sticker payload. No options.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlainMediaRequest {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationRequest {
    pub coordinate: Coordinate,
    #[serde(default)]
    pub options: LocationOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendTemplateRequest {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub components: Vec<TemplateComponent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTemplateRequest {
    pub category: TemplateCategory,
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub components: Vec<DefinitionComponent>,
}

impl MediaRequest {
    pub fn media(&self) -> std::result::Result<&str, String> {
        pick_media(&self.link, &self.id)
    }
}

impl DocumentRequest {
    pub fn media(&self) -> std::result::Result<&str, String> {
        pick_media(&self.link, &self.id)
    }
}

impl PlainMediaRequest {
    pub fn media(&self) -> std::result::Result<&str, String> {
        pick_media(&self.link, &self.id)
    }
}

/// `link` wins over `id`; a `link` has to be an absolute URL.
fn pick_media<'a>(
    link: &'a Option<String>,
    id: &'a Option<String>,
) -> std::result::Result<&'a str, String> {
    let link = link.as_deref().filter(|s| !s.is_empty());
    let id = id.as_deref().filter(|s| !s.is_empty());
    match (link, id) {
        (Some(link), _) if !is_absolute_url(link) => {
            Err(format!("link must be an absolute URL, got {link:?}"))
        }
        (Some(link), _) => Ok(link),
        (None, Some(id)) => Ok(id),
        (None, None) => Err("either link or id is required".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// The only thing a caller sees of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Render an operation result for the caller.
pub fn into_response<T: Serialize>(result: Result<T>) -> Value {
    let err = match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(body) => return body,
            Err(e) => ApiError::Serialization(e.to_string()),
        },
        Err(err) => err,
    };
    warn!(error = %err, "request failed");
    json!(ErrorBody::from(&err))
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Entry points for a host, parameterized over the payload validator.
#[derive(Debug, Clone, Default)]
pub struct RequestHandler<V = SchemaValidator> {
    validator: V,
}

impl RequestHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V: Validator> RequestHandler<V> {
    pub fn with_validator(validator: V) -> Self {
        Self { validator }
    }

    fn composer(&self, metadata: &Metadata) -> Result<MessageComposer> {
        let config = resolve_config_with(metadata, &self.validator)?;
        MessageComposer::new(config)
    }

    fn payload<T: DeserializeOwned>(&self, payload: &Value, shape: Shape) -> Result<T> {
        self.validator
            .validate(payload, shape)
            .map_err(ApiError::RequestValidation)?;
        T::deserialize(payload).map_err(|e| ApiError::RequestValidation(e.to_string()))
    }

    /// Config, then payload, then path parameter: the order callers see errors in.
    fn prepare<T: DeserializeOwned>(
        &self,
        metadata: &Metadata,
        payload: &Value,
        shape: Shape,
        to: &str,
    ) -> Result<(MessageComposer, T)> {
        let composer = self.composer(metadata)?;
        let request = self.payload(payload, shape)?;
        require(to, "recipient")?;
        debug!(?shape, "request accepted");
        Ok((composer, request))
    }

    pub async fn send_text(&self, metadata: &Metadata, to: &str, payload: &Value) -> Result<SendResult> {
        let (composer, req): (_, TextRequest) = self.prepare(metadata, payload, Shape::Text, to)?;
        composer.send_text(to, &req.body, req.options).await
    }

    pub async fn send_image(&self, metadata: &Metadata, to: &str, payload: &Value) -> Result<SendResult> {
        let (composer, req): (_, MediaRequest) = self.prepare(metadata, payload, Shape::Image, to)?;
        let media = req.media().map_err(ApiError::RequestValidation)?;
        composer.send_image(to, media, req.options.clone()).await
    }

    pub async fn send_document(&self, metadata: &Metadata, to: &str, payload: &Value) -> Result<SendResult> {
        let (composer, req): (_, DocumentRequest) =
            self.prepare(metadata, payload, Shape::Document, to)?;
        let media = req.media().map_err(ApiError::RequestValidation)?;
        composer.send_document(to, media, req.options.clone()).await
    }

    pub async fn send_video(&self, metadata: &Metadata, to: &str, payload: &Value) -> Result<SendResult> {
        let (composer, req): (_, MediaRequest) = self.prepare(metadata, payload, Shape::Video, to)?;
        let media = req.media().map_err(ApiError::RequestValidation)?;
        composer.send_video(to, media, req.options.clone()).await
    }

    pub async fn send_audio(&self, metadata: &Metadata, to: &str, payload: &Value) -> Result<SendResult> {
        let (composer, req): (_, PlainMediaRequest) =
            self.prepare(metadata, payload, Shape::Audio, to)?;
        let media = req.media().map_err(ApiError::RequestValidation)?;
        composer.send_audio(to, media).await
    }

    pub async fn send_sticker(&self, metadata: &Metadata, to: &str, payload: &Value) -> Result<SendResult> {
        let (composer, req): (_, PlainMediaRequest) =
            self.prepare(metadata, payload, Shape::Sticker, to)?;
        let media = req.media().map_err(ApiError::RequestValidation)?;
        composer.send_sticker(to, media).await
    }

    pub async fn send_location(&self, metadata: &Metadata, to: &str, payload: &Value) -> Result<SendResult> {
        let (composer, req): (_, LocationRequest) =
            self.prepare(metadata, payload, Shape::Location, to)?;
        composer.send_location(to, req.coordinate, req.options).await
    }

    pub async fn send_template(&self, metadata: &Metadata, to: &str, payload: &Value) -> Result<SendResult> {
        let (composer, req): (_, SendTemplateRequest) =
            self.prepare(metadata, payload, Shape::SendTemplate, to)?;
        composer
            .send_template(to, &req.name, &req.language, req.components)
            .await
    }

    pub async fn create_template(&self, metadata: &Metadata, payload: &Value) -> Result<Value> {
        let composer = self.composer(metadata)?;
        let req: CreateTemplateRequest = self.payload(payload, Shape::CreateTemplate)?;
        composer
            .create_template(req.category, &req.name, &req.language, req.components)
            .await
    }

    /// `query` is the raw query map: `fields` comma-separated, `limit`,
    /// `after`, `before`.
    pub async fn get_templates(&self, metadata: &Metadata, query: &HashMap<String, String>) -> Result<Value> {
        let composer = self.composer(metadata)?;
        let options: QueryOptions = self.payload(&query_payload(query)?, Shape::Query)?;
        composer.get_templates(&options).await
    }

    pub async fn show_template(&self, metadata: &Metadata, id: &str) -> Result<Value> {
        let composer = self.composer(metadata)?;
        require(id, "template id")?;
        composer.show_template(id).await
    }

    pub async fn delete_template(&self, metadata: &Metadata, name: &str) -> Result<Value> {
        let composer = self.composer(metadata)?;
        require(name, "template name")?;
        composer.delete_template(name).await
    }

    /// Config fields are dropped from the forwarded headers.
    pub async fn upload_media(&self, metadata: &Metadata, mut upload: MediaUpload) -> Result<Value> {
        let composer = self.composer(metadata)?;
        if upload.file.is_empty() {
            return Err(ApiError::RequestValidation("file is required".to_string()));
        }
        upload.form_headers.retain(|(name, _)| !is_config_field(name));
        composer.upload_media(&upload).await
    }
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ApiError::RequestValidation(format!("{what} is required")));
    }
    Ok(())
}

fn is_config_field(name: &str) -> bool {
    REQUIRED_FIELDS
        .iter()
        .chain(OPTIONAL_FIELDS.iter())
        .any(|field| field.eq_ignore_ascii_case(name))
}

/// Turn a flat query map into the JSON shape `QueryOptions` deserializes.
fn query_payload(query: &HashMap<String, String>) -> Result<Value> {
    let mut payload = Map::new();
    for (key, value) in query {
        let value = match key.as_str() {
            "fields" => Value::Array(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(|f| Value::String(f.to_string()))
                    .collect(),
            ),
            "limit" => value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|limit| *limit > 0)
                .map(Value::from)
                .ok_or_else(|| {
                    ApiError::RequestValidation(format!("limit must be a positive integer, got {value:?}"))
                })?,
            _ => Value::String(value.clone()),
        };
        payload.insert(key.clone(), value);
    }
    Ok(Value::Object(payload))
}
