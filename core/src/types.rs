//! Payload DTOs for the Graph API.
//!
//! # Design
//! The Graph API is strict about nesting: the same template name travels as
//! `language: {code}` when sending and as a flat `language` string when
//! creating, media goes under `link` or `id` depending on what the caller
//! holds, and template parameters only accept the fields of their own tag.
//! Each of those rules is encoded in a type here so a wrong shape fails to
//! compile instead of being rejected upstream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

/// Where a media object lives: a public URL or a previously uploaded handle.
///
/// Flattened into its parent, so it serializes as `"link": ...` or `"id": ...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaReference {
    #[serde(rename = "link")]
    Remote(String),
    #[serde(rename = "id")]
    Handle(String),
}

impl MediaReference {
    /// `Remote` iff `media` is an absolute URL with a scheme and a host.
    pub fn classify(media: &str) -> Self {
        if is_absolute_url(media) {
            MediaReference::Remote(media.to_string())
        } else {
            MediaReference::Handle(media.to_string())
        }
    }
}

/// True when `s` parses as a URL that has a non-empty host.
pub fn is_absolute_url(s: &str) -> bool {
    Url::parse(s)
        .map(|url| url.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

/// A media object as it appears in messages and template parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMediaObject")]
pub struct MediaObject {
    #[serde(flatten)]
    pub reference: MediaReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl MediaObject {
    pub fn new(reference: MediaReference) -> Self {
        Self {
            reference,
            caption: None,
            filename: None,
            provider: None,
        }
    }
}

/// Wire form of a media object. Flattening the reference would let unknown
/// keys through, so input is read here first.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMediaObject {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    provider: Option<String>,
}

impl TryFrom<RawMediaObject> for MediaObject {
    type Error = String;

    fn try_from(raw: RawMediaObject) -> Result<Self, Self::Error> {
        let reference = match (raw.link, raw.id) {
            (Some(link), None) => MediaReference::Remote(link),
            (None, Some(id)) => MediaReference::Handle(id),
            (Some(_), Some(_)) => return Err("media object takes `link` or `id`, not both".to_string()),
            (None, None) => return Err("media object needs `link` or `id`".to_string()),
        };
        Ok(Self {
            reference,
            caption: raw.caption,
            filename: raw.filename,
            provider: raw.provider,
        })
    }
}

/// File payload for the media upload endpoint.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
    /// Headers the caller sent alongside the file. Merged under ours.
    pub form_headers: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// Message options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextOptions {
    #[serde(default)]
    pub preview_url: bool,
}

/// Options for image and video messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaOptions {
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentOptions {
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Latitude/longitude pair, sent exactly as the caller wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Coordinate {
    pub latitude: Degrees,
    pub longitude: Degrees,
}

/// One coordinate: a JSON number, or a string that parses as one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Degrees {
    Number(serde_json::Number),
    Text(#[serde(deserialize_with = "numeric_string")] String),
}

impl Degrees {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Degrees::Number(n) => n.as_f64(),
            Degrees::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<f64> for Degrees {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map_or_else(|| Degrees::Text(value.to_string()), Degrees::Number)
    }
}

impl From<&str> for Degrees {
    fn from(value: &str) -> Self {
        Degrees::Text(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Body of a send-message call, minus the two fields the transport adds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageEnvelope {
    pub to: String,
    #[serde(flatten)]
    pub payload: MessagePayload,
}

/// Typed message body. The variant name becomes `type`, and the payload sits
/// under a key of the same name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    Text { text: TextBody },
    Image { image: MediaObject },
    Document { document: MediaObject },
    Video { video: MediaObject },
    Audio { audio: MediaObject },
    Sticker { sticker: MediaObject },
    Location { location: Location },
    Template { template: TemplateMessage },
}

impl MessagePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            MessagePayload::Text { .. } => "text",
            MessagePayload::Image { .. } => "image",
            MessagePayload::Document { .. } => "document",
            MessagePayload::Video { .. } => "video",
            MessagePayload::Audio { .. } => "audio",
            MessagePayload::Sticker { .. } => "sticker",
            MessagePayload::Location { .. } => "location",
            MessagePayload::Template { .. } => "template",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextBody {
    pub preview_url: bool,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    #[serde(flatten)]
    pub options: LocationOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateMessage {
    pub name: String,
    pub language: TemplateLanguage,
    pub components: Vec<TemplateComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateLanguage {
    pub code: String,
}

// ---------------------------------------------------------------------------
// Template components used when sending
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateComponent {
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<ButtonSubType>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_string_or_number"
    )]
    pub index: Option<String>,
    pub parameters: Vec<TemplateParameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Header,
    Body,
    Footer,
    #[serde(alias = "buttons")]
    Button,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonSubType {
    QuickReply,
    Url,
}

/// A template parameter. Only the field matching `type` is carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum TemplateParameter {
    Currency { currency: Currency },
    DateTime { date_time: DateTime },
    Document { document: MediaObject },
    Image { image: MediaObject },
    Text { text: String },
    Video { video: MediaObject },
    Payload { payload: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Currency {
    pub fallback_value: String,
    pub code: String,
    pub amount_1000: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateTime {
    pub fallback_value: String,
}

// ---------------------------------------------------------------------------
// Template definitions used when creating
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TemplateCategory {
    Authentication,
    Marketing,
    Utility,
}

/// Body of a create-template call. `language` is a bare locale string here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateDefinition {
    pub category: TemplateCategory,
    pub name: String,
    pub language: String,
    pub components: Vec<DefinitionComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE", deny_unknown_fields)]
pub enum DefinitionComponent {
    Header {
        format: HeaderFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        example: Option<HeaderExample>,
    },
    Body {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        example: Option<BodyExample>,
    },
    Footer {
        text: String,
    },
    Buttons {
        buttons: Vec<TemplateButton>,
    },
    /// Standalone link component; `example` holds sample URLs.
    Url {
        text: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        example: Option<Vec<String>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeaderFormat {
    Text,
    Image,
    Document,
    Video,
    Audio,
    Location,
    Contact,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderExample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_text: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_handle: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BodyExample {
    pub body_text: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub enum TemplateButton {
    PhoneNumber {
        text: String,
        phone_number: String,
    },
    Url {
        text: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        example: Option<Vec<String>>,
    },
    QuickReply {
        text: String,
    },
}

// ---------------------------------------------------------------------------
// Template listing
// ---------------------------------------------------------------------------

/// Fields the template listing endpoint can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateField {
    Id,
    Category,
    Components,
    Language,
    MessageSendTtlSeconds,
    Name,
    PreviousCategory,
    QualityScore,
    RejectedReason,
    Status,
}

impl TemplateField {
    pub const ALL: [TemplateField; 10] = [
        TemplateField::Id,
        TemplateField::Category,
        TemplateField::Components,
        TemplateField::Language,
        TemplateField::MessageSendTtlSeconds,
        TemplateField::Name,
        TemplateField::PreviousCategory,
        TemplateField::QualityScore,
        TemplateField::RejectedReason,
        TemplateField::Status,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateField::Id => "id",
            TemplateField::Category => "category",
            TemplateField::Components => "components",
            TemplateField::Language => "language",
            TemplateField::MessageSendTtlSeconds => "message_send_ttl_seconds",
            TemplateField::Name => "name",
            TemplateField::PreviousCategory => "previous_category",
            TemplateField::QualityScore => "quality_score",
            TemplateField::RejectedReason => "rejected_reason",
            TemplateField::Status => "status",
        }
    }
}

impl fmt::Display for TemplateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown template field: {s}"))
    }
}

/// Listing options. `after` and `before` are opaque cursors; both may be
/// set and both are forwarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryOptions {
    #[serde(default)]
    pub fields: Vec<TemplateField>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Reduced result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub input: u64,
    pub phone: String,
    pub wamid: String,
}

// ---------------------------------------------------------------------------
// serde helpers
// ---------------------------------------------------------------------------

fn numeric_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let s = String::deserialize(deserializer)?;
    match s.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(s),
        _ => Err(serde::de::Error::custom(format!("expected a number, got {s:?}"))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrInteger {
    String(String),
    Integer(u64),
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(
        Option::<StringOrInteger>::deserialize(deserializer)?.map(|v| match v {
            StringOrInteger::String(s) => s,
            StringOrInteger::Integer(n) => n.to_string(),
        }),
    )
}
