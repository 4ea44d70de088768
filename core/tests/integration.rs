//! End-to-end tests against the in-process mock Graph API.
//!
//! Each test binds its own mock server on a random port and points a
//! `Config` at it, so tests run in parallel without sharing state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mock_graph::{run_with_state, GraphState, StatusCode, DEFAULT_TOKEN};
use serde_json::{json, Value};
use wa_cloud_core::types::{ComponentKind, DefinitionComponent};
use wa_cloud_core::{
    into_response, ApiError, Config, GraphClient, MediaOptions, MediaUpload, MessageComposer,
    MessageEnvelope, Metadata, QueryOptions, RequestHandler, TemplateCategory, TemplateComponent,
    TemplateField, TemplateParameter, TextOptions,
};

async fn spawn(state: GraphState) -> (SocketAddr, Arc<GraphState>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(state);
    tokio::spawn(run_with_state(listener, state.clone()));
    (addr, state)
}

fn config(addr: SocketAddr) -> Config {
    Config::new("1065", "2200", DEFAULT_TOKEN).with_graph_base_url(format!("http://{addr}"))
}

fn metadata(addr: SocketAddr) -> Metadata {
    HashMap::from([
        ("phone_number_id".to_string(), "1065".to_string()),
        ("whatsapp_business_id".to_string(), "2200".to_string()),
        ("access_token".to_string(), DEFAULT_TOKEN.to_string()),
        ("graph_url".to_string(), format!("http://{addr}")),
    ])
}

#[tokio::test]
async fn send_text_reduces_the_response() {
    let (addr, state) = spawn(GraphState::new(DEFAULT_TOKEN)).await;
    let composer = MessageComposer::new(config(addr)).unwrap();

    let result = composer
        .send_text("+919999999999", "hello", TextOptions { preview_url: true })
        .await
        .unwrap();

    assert_eq!(result.input, 919999999999);
    assert_eq!(result.phone, "919999999999");
    assert!(result.wamid.starts_with("wamid."));

    let recorded = state.requests().await;
    assert_eq!(recorded[0].path, "/v19.0/1065/messages");
    assert_eq!(
        recorded[0].body,
        json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": "+919999999999",
            "type": "text",
            "text": {"preview_url": true, "body": "hello"}
        })
    );
}

#[tokio::test]
async fn send_image_by_link() {
    let (addr, state) = spawn(GraphState::new(DEFAULT_TOKEN)).await;
    let composer = MessageComposer::new(config(addr)).unwrap();

    let options = MediaOptions {
        caption: Some("look".to_string()),
    };
    composer
        .send_image("15550001", "https://cdn.example.com/a.png", options)
        .await
        .unwrap();

    let recorded = state.requests().await;
    assert_eq!(
        recorded[0].body["image"],
        json!({"link": "https://cdn.example.com/a.png", "caption": "look"})
    );
}

#[tokio::test]
async fn upstream_error_uses_details_when_no_user_message() {
    let (addr, _) = spawn(GraphState::new(DEFAULT_TOKEN)).await;
    let composer = MessageComposer::new(config(addr)).unwrap();

    let err = composer
        .send_text("0123", "hello", TextOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Upstream(_)));
    assert_eq!(err.to_string(), "Recipient phone number not in allowed list");
}

#[tokio::test]
async fn wrong_token_is_an_upstream_error() {
    let (addr, _) = spawn(GraphState::new("other-token")).await;
    let composer = MessageComposer::new(config(addr)).unwrap();

    let err = composer
        .send_audio("1", "https://cdn.example.com/a.ogg")
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Invalid OAuth access token - Cannot parse access token"
    );
}

#[tokio::test]
async fn template_lifecycle() {
    let (addr, _) = spawn(GraphState::new(DEFAULT_TOKEN)).await;
    let composer = MessageComposer::new(config(addr)).unwrap();

    let created = composer
        .create_template(
            TemplateCategory::Utility,
            "order_update",
            "en_US",
            vec![DefinitionComponent::Body {
                text: "Hi {{1}}".to_string(),
                example: None,
            }],
        )
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let duplicate = composer
        .create_template(TemplateCategory::Utility, "order_update", "en_US", Vec::new())
        .await
        .unwrap_err();
    assert!(duplicate.to_string().starts_with("There is already en_US content"));

    let shown = composer.show_template(&id).await.unwrap();
    assert_eq!(shown["name"], "order_update");

    let listed = composer
        .get_templates(&QueryOptions {
            fields: vec![TemplateField::Name, TemplateField::Status],
            limit: Some(10),
            ..QueryOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(listed["data"][0]["status"], "APPROVED");
    assert!(listed["data"][0].get("category").is_none());

    let sent = composer
        .send_template(
            "15550001",
            "order_update",
            "en_US",
            vec![TemplateComponent {
                kind: ComponentKind::Body,
                sub_type: None,
                index: None,
                parameters: vec![TemplateParameter::Text {
                    text: "Ada".to_string(),
                }],
            }],
        )
        .await
        .unwrap();
    assert_eq!(sent.input, 15550001);

    let deleted = composer.delete_template("order_update").await.unwrap();
    assert_eq!(deleted, json!({"success": true}));

    let missing = composer.delete_template("order_update").await.unwrap_err();
    assert_eq!(
        missing.to_string(),
        "Message template \"order_update\" could not be found."
    );
}

#[tokio::test]
async fn unknown_template_send_reports_details() {
    let (addr, _) = spawn(GraphState::new(DEFAULT_TOKEN)).await;
    let composer = MessageComposer::new(config(addr)).unwrap();

    let err = composer
        .send_template("1", "ghost", "en_US", Vec::new())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "template name (ghost) does not exist in en_US");
}

#[tokio::test]
async fn upload_media_sends_multipart_with_bearer() {
    let (addr, state) = spawn(GraphState::new(DEFAULT_TOKEN)).await;
    let composer = MessageComposer::new(config(addr)).unwrap();

    let upload = MediaUpload {
        file: b"\x89PNG".to_vec(),
        filename: "a.png".to_string(),
        mime_type: "image/png".to_string(),
        form_headers: vec![
            ("X-Trace".to_string(), "abc".to_string()),
            ("Authorization".to_string(), "Bearer stolen".to_string()),
        ],
    };
    let body = composer.upload_media(&upload).await.unwrap();
    assert!(body["id"].is_string());

    let recorded = state.requests().await;
    let request = &recorded[0];
    assert_eq!(request.path, "/v19.0/1065/media");
    assert_eq!(request.body["messaging_product"], "whatsapp");
    assert_eq!(request.body["type"], "image/png");
    assert_eq!(
        request.body["file"],
        json!({"filename": "a.png", "mime_type": "image/png", "size": 4})
    );
    assert_eq!(request.headers["authorization"], format!("Bearer {DEFAULT_TOKEN}"));
    assert_eq!(request.headers["x-trace"], "abc");
}

#[tokio::test]
async fn empty_contacts_is_malformed() {
    let state = GraphState::new(DEFAULT_TOKEN)
        .with_canned_send(StatusCode::OK, json!({"contacts": [], "messages": []}));
    let (addr, _) = spawn(state).await;
    let client = GraphClient::new(config(addr)).unwrap();

    let envelope = MessageEnvelope::text("1", "hello", &TextOptions::default());
    let err = client.send_message(&envelope).await.unwrap_err();
    assert!(matches!(err, ApiError::MalformedUpstreamResponse(_)));

    let raw = client.send_message_raw(&envelope).await.unwrap();
    assert_eq!(raw, json!({"contacts": [], "messages": []}));
}

#[tokio::test]
async fn error_status_with_success_body_is_success() {
    let reply = json!({
        "contacts": [{"input": "42", "wa_id": "42"}],
        "messages": [{"id": "wamid.X"}]
    });
    let state = GraphState::new(DEFAULT_TOKEN).with_canned_send(StatusCode::INTERNAL_SERVER_ERROR, reply);
    let (addr, _) = spawn(state).await;
    let composer = MessageComposer::new(config(addr)).unwrap();

    let result = composer.send_sticker("42", "778").await.unwrap();
    assert_eq!(result.wamid, "wamid.X");
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let state = GraphState::new(DEFAULT_TOKEN).with_delay(Duration::from_millis(500));
    let (addr, _) = spawn(state).await;
    let composer = MessageComposer::new(config(addr).with_timeout_millis(50)).unwrap();

    let err = composer
        .send_text("1", "hello", TextOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::TransportTimeout(50)));
}

// --- request boundary ---

#[tokio::test]
async fn handler_sends_document_end_to_end() {
    let (addr, state) = spawn(GraphState::new(DEFAULT_TOKEN)).await;
    let handler = RequestHandler::new();

    let payload = json!({"id": "555", "options": {"filename": "invoice.pdf"}});
    let result = handler
        .send_document(&metadata(addr), "15550001", &payload)
        .await
        .unwrap();
    assert_eq!(result.phone, "15550001");

    let recorded = state.requests().await;
    assert_eq!(
        recorded[0].body["document"],
        json!({"id": "555", "filename": "invoice.pdf"})
    );
}

#[tokio::test]
async fn handler_renders_errors_for_the_caller() {
    let (addr, _) = spawn(GraphState::new(DEFAULT_TOKEN)).await;
    let handler = RequestHandler::new();

    let sent = handler
        .send_text(&metadata(addr), "0777", &json!({"body": "hi"}))
        .await;
    assert_eq!(
        into_response(sent),
        json!({"error": "Recipient phone number not in allowed list"})
    );

    let mut partial = metadata(addr);
    partial.remove("access_token");
    let missing = handler
        .send_text(&partial, "1", &json!({"body": "hi"}))
        .await;
    assert_eq!(
        into_response(missing),
        json!({"error": "missing header: access_token"})
    );
}

#[tokio::test]
async fn handler_lists_templates_from_query_map() {
    let (addr, state) = spawn(GraphState::new(DEFAULT_TOKEN)).await;
    let handler = RequestHandler::new();

    let query = HashMap::from([
        ("fields".to_string(), "name,status".to_string()),
        ("limit".to_string(), "5".to_string()),
    ]);
    let listed = handler.get_templates(&metadata(addr), &query).await.unwrap();
    assert_eq!(listed["data"], json!([]));

    let recorded = state.requests().await;
    assert_eq!(recorded[0].query.as_deref(), Some("fields=name,status&limit=5"));
}

#[tokio::test]
async fn handler_upload_drops_config_headers() {
    let (addr, state) = spawn(GraphState::new(DEFAULT_TOKEN)).await;
    let handler = RequestHandler::new();

    let upload = MediaUpload {
        file: b"OggS".to_vec(),
        filename: "voice.ogg".to_string(),
        mime_type: "audio/ogg".to_string(),
        form_headers: vec![
            ("access_token".to_string(), DEFAULT_TOKEN.to_string()),
            ("x-trace".to_string(), "abc".to_string()),
        ],
    };
    let body: Value = handler.upload_media(&metadata(addr), upload).await.unwrap();
    assert!(body["id"].is_string());

    let recorded = state.requests().await;
    assert!(recorded[0].headers.get("access_token").is_none());
    assert_eq!(recorded[0].headers["x-trace"], "abc");
}

#[tokio::test]
async fn formatted_recipient_echo_is_still_a_success() {
    let reply = json!({
        "contacts": [{"input": "+1 (555) 010-0001", "wa_id": "15550100001"}],
        "messages": [{"id": "wamid.OK"}]
    });
    let state = GraphState::new(DEFAULT_TOKEN).with_canned_send(StatusCode::OK, reply);
    let (addr, _) = spawn(state).await;
    let composer = MessageComposer::new(config(addr)).unwrap();

    let result = composer
        .send_text("+1 (555) 010-0001", "hello", TextOptions::default())
        .await
        .unwrap();
    assert_eq!(result.input, 15550100001);
    assert_eq!(result.wamid, "wamid.OK");
}
