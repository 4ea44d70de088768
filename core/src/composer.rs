//! Message composer: one operation per caller-facing action.
//!
//! Every operation shapes its payload and hands it to the `GraphClient` it
//! owns. The shaping itself lives in the `MessageEnvelope` constructors below
//! so it can be checked without a network.

use serde_json::Value;
use tracing::debug;

use crate::client::GraphClient;
use crate::config::Config;
use crate::error::Result;
use crate::types::{
    Coordinate, DefinitionComponent, DocumentOptions, Location, LocationOptions, MediaObject,
    MediaOptions, MediaReference, MediaUpload, MessageEnvelope, MessagePayload, QueryOptions,
    SendResult, TemplateCategory, TemplateComponent, TemplateDefinition, TemplateLanguage,
    TemplateMessage, TextBody, TextOptions,
};

fn media(source: &str) -> MediaObject {
    let reference = MediaReference::classify(source);
    debug!(
        remote = matches!(reference, MediaReference::Remote(_)),
        "classified media reference"
    );
    MediaObject::new(reference)
}

impl MessageEnvelope {
    pub fn new(to: impl Into<String>, payload: MessagePayload) -> Self {
        Self {
            to: to.into(),
            payload,
        }
    }

    pub fn text(to: impl Into<String>, body: impl Into<String>, options: &TextOptions) -> Self {
        Self::new(
            to,
            MessagePayload::Text {
                text: TextBody {
                    preview_url: options.preview_url,
                    body: body.into(),
                },
            },
        )
    }

    pub fn image(to: impl Into<String>, source: &str, options: MediaOptions) -> Self {
        let mut image = media(source);
        image.caption = options.caption;
        Self::new(to, MessagePayload::Image { image })
    }

    pub fn document(to: impl Into<String>, source: &str, options: DocumentOptions) -> Self {
        let mut document = media(source);
        document.caption = options.caption;
        document.filename = options.filename;
        Self::new(to, MessagePayload::Document { document })
    }

    pub fn video(to: impl Into<String>, source: &str, options: MediaOptions) -> Self {
        let mut video = media(source);
        video.caption = options.caption;
        Self::new(to, MessagePayload::Video { video })
    }

    pub fn audio(to: impl Into<String>, source: &str) -> Self {
        Self::new(to, MessagePayload::Audio { audio: media(source) })
    }

    pub fn sticker(to: impl Into<String>, source: &str) -> Self {
        Self::new(
            to,
            MessagePayload::Sticker {
                sticker: media(source),
            },
        )
    }

    pub fn location(to: impl Into<String>, coordinate: Coordinate, options: LocationOptions) -> Self {
        Self::new(
            to,
            MessagePayload::Location {
                location: Location {
                    coordinate,
                    options,
                },
            },
        )
    }

    /// Template send. The language travels nested as `{code}`.
    pub fn template(
        to: impl Into<String>,
        name: impl Into<String>,
        language_code: impl Into<String>,
        components: Vec<TemplateComponent>,
    ) -> Self {
        Self::new(
            to,
            MessagePayload::Template {
                template: TemplateMessage {
                    name: name.into(),
                    language: TemplateLanguage {
                        code: language_code.into(),
                    },
                    components,
                },
            },
        )
    }
}

/// Sends messages and manages templates for one set of credentials.
#[derive(Debug, Clone)]
pub struct MessageComposer {
    client: GraphClient,
}

impl MessageComposer {
    /// Build a composer with its own transport for `config`.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self::with_client(GraphClient::new(config)?))
    }

    pub fn with_client(client: GraphClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    async fn send(&self, envelope: MessageEnvelope) -> Result<SendResult> {
        debug!(kind = envelope.payload.kind(), "sending message");
        self.client.send_message(&envelope).await
    }

    pub async fn send_text(&self, to: &str, body: &str, options: TextOptions) -> Result<SendResult> {
        self.send(MessageEnvelope::text(to, body, &options)).await
    }

    pub async fn send_image(&self, to: &str, media: &str, options: MediaOptions) -> Result<SendResult> {
        self.send(MessageEnvelope::image(to, media, options)).await
    }

    pub async fn send_document(
        &self,
        to: &str,
        media: &str,
        options: DocumentOptions,
    ) -> Result<SendResult> {
        self.send(MessageEnvelope::document(to, media, options)).await
    }

    pub async fn send_video(&self, to: &str, media: &str, options: MediaOptions) -> Result<SendResult> {
        self.send(MessageEnvelope::video(to, media, options)).await
    }

    pub async fn send_audio(&self, to: &str, media: &str) -> Result<SendResult> {
        self.send(MessageEnvelope::audio(to, media)).await
    }

    pub async fn send_sticker(&self, to: &str, media: &str) -> Result<SendResult> {
        self.send(MessageEnvelope::sticker(to, media)).await
    }

    pub async fn send_location(
        &self,
        to: &str,
        coordinate: Coordinate,
        options: LocationOptions,
    ) -> Result<SendResult> {
        self.send(MessageEnvelope::location(to, coordinate, options)).await
    }

    pub async fn send_template(
        &self,
        to: &str,
        name: &str,
        language_code: &str,
        components: Vec<TemplateComponent>,
    ) -> Result<SendResult> {
        self.send(MessageEnvelope::template(to, name, language_code, components))
            .await
    }

    /// Create a template. Unlike sending, `language` is a flat string here.
    pub async fn create_template(
        &self,
        category: TemplateCategory,
        name: &str,
        language_code: &str,
        components: Vec<DefinitionComponent>,
    ) -> Result<Value> {
        let definition = TemplateDefinition {
            category,
            name: name.to_string(),
            language: language_code.to_string(),
            components,
        };
        self.client.create_template(&definition).await
    }

    pub async fn get_templates(&self, options: &QueryOptions) -> Result<Value> {
        self.client.list_templates(options).await
    }

    pub async fn show_template(&self, id: &str) -> Result<Value> {
        self.client.show_template(id).await
    }

    pub async fn delete_template(&self, name: &str) -> Result<Value> {
        self.client.delete_template(name).await
    }

    pub async fn upload_media(&self, upload: &MediaUpload) -> Result<Value> {
        self.client.upload_media(upload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComponentKind, Degrees, TemplateParameter};
    use serde_json::json;

    fn shape(envelope: &MessageEnvelope) -> Value {
        serde_json::to_value(envelope).unwrap()
    }

    #[test]
    fn text_always_carries_preview_url() {
        let env = MessageEnvelope::text("1", "hello", &TextOptions::default());
        assert_eq!(
            shape(&env),
            json!({"to": "1", "type": "text", "text": {"preview_url": false, "body": "hello"}})
        );
    }

    #[test]
    fn image_from_url_uses_link_only() {
        let options = MediaOptions {
            caption: Some("hi".to_string()),
        };
        let env = MessageEnvelope::image("1", "https://x.com/a.png", options);
        let value = shape(&env);
        assert_eq!(value["type"], "image");
        assert_eq!(value["image"], json!({"link": "https://x.com/a.png", "caption": "hi"}));
        assert!(value["image"].get("id").is_none());
    }

    #[test]
    fn document_from_handle_uses_id() {
        let options = DocumentOptions {
            caption: None,
            filename: Some("invoice.pdf".to_string()),
        };
        let env = MessageEnvelope::document("1", "1234567890", options);
        assert_eq!(
            shape(&env)["document"],
            json!({"id": "1234567890", "filename": "invoice.pdf"})
        );
    }

    #[test]
    fn audio_and_sticker_take_no_options() {
        assert_eq!(
            shape(&MessageEnvelope::audio("1", "https://x.com/a.ogg")),
            json!({"to": "1", "type": "audio", "audio": {"link": "https://x.com/a.ogg"}})
        );
        assert_eq!(
            shape(&MessageEnvelope::sticker("1", "778")),
            json!({"to": "1", "type": "sticker", "sticker": {"id": "778"}})
        );
    }

    #[test]
    fn location_passes_coordinates_through_as_written() {
        let coordinate = Coordinate {
            latitude: Degrees::from(19.0760),
            longitude: Degrees::from("72.8777"),
        };
        let options = LocationOptions {
            name: Some("Gateway".to_string()),
            address: None,
        };
        let env = MessageEnvelope::location("1", coordinate, options);
        assert_eq!(
            shape(&env)["location"],
            json!({"latitude": 19.0760, "longitude": "72.8777", "name": "Gateway"})
        );
    }

    #[test]
    fn template_nests_language_code() {
        let components = vec![TemplateComponent {
            kind: ComponentKind::Body,
            sub_type: None,
            index: None,
            parameters: vec![TemplateParameter::Text {
                text: "Ada".to_string(),
            }],
        }];
        let env = MessageEnvelope::template("1", "order_update", "en_US", components);
        assert_eq!(
            shape(&env)["template"],
            json!({
                "name": "order_update",
                "language": {"code": "en_US"},
                "components": [{"type": "body", "parameters": [{"type": "text", "text": "Ada"}]}]
            })
        );
    }
}
