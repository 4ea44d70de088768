//! In-memory stand-in for the slice of the WhatsApp Cloud (Graph) API the
//! core crate calls: messages, media, message_templates and template lookup.
//!
//! Errors come back in Graph's own shape (`{"error": {...}}`) with the
//! fallback fields populated the way the real API populates them, so the
//! client's error normalization is exercised end to end. Every request is
//! recorded for assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, Uri},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

pub use axum::http::StatusCode;

pub const DEFAULT_TOKEN: &str = "test-token";

const CATEGORIES: [&str; 3] = ["AUTHENTICATION", "MARKETING", "UTILITY"];
const DEFAULT_PAGE_SIZE: usize = 25;

/// A stored message template.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub category: String,
    pub language: String,
    pub status: String,
    #[serde(default)]
    pub components: Value,
}

/// One request as the server saw it. Multipart bodies are recorded as an
/// object of their text fields plus a `file` summary.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct GraphState {
    access_token: String,
    delay: Duration,
    canned_send: Option<(StatusCode, Value)>,
    next_id: AtomicU64,
    templates: RwLock<Vec<Template>>,
    requests: RwLock<Vec<RecordedRequest>>,
}

pub type Db = Arc<GraphState>;

impl GraphState {
    pub fn new(access_token: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            delay: Duration::ZERO,
            canned_send: None,
            next_id: AtomicU64::new(1_000_000),
            templates: RwLock::new(Vec::new()),
            requests: RwLock::new(Vec::new()),
        }
    }

    /// Sleep this long before answering anything.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answer every send-message call with this status and body.
    pub fn with_canned_send(mut self, status: StatusCode, body: Value) -> Self {
        self.canned_send = Some((status, body));
        self
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    pub async fn templates(&self) -> Vec<Template> {
        self.templates.read().await.clone()
    }

    async fn record(&self, method: &str, uri: &Uri, headers: &HeaderMap, body: Value) {
        debug!(method, path = uri.path(), "mock graph request");
        self.requests.write().await.push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            headers: headers.clone(),
            body,
        });
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

type Reply = (StatusCode, Json<Value>);

pub fn app() -> Router {
    app_with_state(Arc::new(GraphState::new(DEFAULT_TOKEN)))
}

pub fn app_with_state(state: Db) -> Router {
    Router::new()
        .route("/{version}/{node}/messages", post(send_message))
        .route("/{version}/{node}/media", post(upload_media))
        .route(
            "/{version}/{node}/message_templates",
            get(list_templates).post(create_template).delete(delete_template),
        )
        .route("/{version}/{node}", get(show_template))
        .with_state(state)
}

pub async fn run_with_state(listener: TcpListener, state: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

// ---------------------------------------------------------------------------
// Graph-shaped errors
// ---------------------------------------------------------------------------

struct GraphError {
    status: StatusCode,
    message: String,
    code: u32,
    details: Option<String>,
    user_msg: Option<String>,
}

impl GraphError {
    fn new(status: StatusCode, code: u32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            details: None,
            user_msg: None,
        }
    }

    fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn user_msg(mut self, msg: impl Into<String>) -> Self {
        self.user_msg = Some(msg.into());
        self
    }

    fn reply(self) -> Reply {
        let mut error = Map::new();
        error.insert("message".to_string(), json!(self.message));
        error.insert("type".to_string(), json!("OAuthException"));
        error.insert("code".to_string(), json!(self.code));
        if let Some(details) = self.details {
            error.insert("error_data".to_string(), json!({"messaging_product": "whatsapp", "details": details}));
        }
        if let Some(msg) = self.user_msg {
            error.insert("error_user_msg".to_string(), json!(msg));
        }
        error.insert("fbtrace_id".to_string(), json!(Uuid::new_v4().simple().to_string()));
        (self.status, Json(json!({"error": error})))
    }
}

fn authorize(state: &GraphState, headers: &HeaderMap) -> Result<(), GraphError> {
    let expected = format!("Bearer {}", state.access_token);
    let given = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if given == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(GraphError::new(
            StatusCode::UNAUTHORIZED,
            190,
            "Invalid OAuth access token - Cannot parse access token",
        ))
    }
}

fn respond(result: Result<Value, GraphError>) -> Reply {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(err) => err.reply(),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn send_message(
    State(db): State<Db>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    db.pause().await;
    db.record("POST", &uri, &headers, body.clone()).await;
    if let Err(err) = authorize(&db, &headers) {
        return err.reply();
    }
    if let Some((status, canned)) = &db.canned_send {
        return (*status, Json(canned.clone()));
    }
    respond(accept_message(&db, &body).await)
}

async fn accept_message(db: &GraphState, body: &Value) -> Result<Value, GraphError> {
    let bad_request = |message: &str| GraphError::new(StatusCode::BAD_REQUEST, 100, message);

    if body["messaging_product"] != "whatsapp" {
        return Err(bad_request("(#100) The parameter messaging_product is required."));
    }
    let to = body["to"]
        .as_str()
        .ok_or_else(|| bad_request("(#100) The parameter to is required."))?;
    let kind = body["type"].as_str().unwrap_or("text");
    if body.get(kind).is_none() {
        return Err(bad_request("(#100) Param type requires a matching object")
            .details(format!("missing `{kind}` object")));
    }
    if to.starts_with('0') {
        return Err(GraphError::new(
            StatusCode::BAD_REQUEST,
            131030,
            "(#131030) Recipient phone number not in allowed list",
        )
        .details("Recipient phone number not in allowed list"));
    }
    if kind == "template" {
        let name = body["template"]["name"].as_str().unwrap_or_default();
        let language = body["template"]["language"]["code"].as_str().unwrap_or_default();
        let known = db
            .templates
            .read()
            .await
            .iter()
            .any(|t| t.name == name && t.language == language);
        if !known {
            return Err(GraphError::new(
                StatusCode::NOT_FOUND,
                132001,
                "(#132001) Template name does not exist in the translation",
            )
            .details(format!("template name ({name}) does not exist in {language}")));
        }
    }

    Ok(json!({
        "messaging_product": "whatsapp",
        "contacts": [{"input": to, "wa_id": to.trim_start_matches('+')}],
        "messages": [{"id": format!("wamid.{}", Uuid::new_v4().simple())}]
    }))
}

async fn upload_media(
    State(db): State<Db>,
    uri: Uri,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Reply {
    db.pause().await;
    let mut fields = Map::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().map(str::to_string);
            let mime_type = field.content_type().map(str::to_string);
            let size = field.bytes().await.map(|b| b.len()).unwrap_or_default();
            fields.insert(name, json!({"filename": filename, "mime_type": mime_type, "size": size}));
        } else {
            let value = field.text().await.unwrap_or_default();
            fields.insert(name, json!(value));
        }
    }
    let body = Value::Object(fields);
    db.record("POST", &uri, &headers, body.clone()).await;
    if let Err(err) = authorize(&db, &headers) {
        return err.reply();
    }

    if body["messaging_product"] != "whatsapp" {
        return GraphError::new(
            StatusCode::BAD_REQUEST,
            100,
            "(#100) The parameter messaging_product is required.",
        )
        .reply();
    }
    if body.get("file").is_none() {
        return GraphError::new(StatusCode::BAD_REQUEST, 100, "(#100) The parameter file is required.")
            .user_msg("Upload a file")
            .reply();
    }
    (StatusCode::OK, Json(json!({"id": db.next_id()})))
}

async fn create_template(
    State(db): State<Db>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    db.pause().await;
    db.record("POST", &uri, &headers, body.clone()).await;
    if let Err(err) = authorize(&db, &headers) {
        return err.reply();
    }

    let category = body["category"].as_str().unwrap_or_default();
    let name = body["name"].as_str().unwrap_or_default();
    let Some(language) = body["language"].as_str() else {
        return GraphError::new(StatusCode::BAD_REQUEST, 100, "(#100) Invalid parameter")
            .details("language must be a locale string such as en_US")
            .reply();
    };
    if !CATEGORIES.contains(&category) || name.is_empty() {
        return GraphError::new(StatusCode::BAD_REQUEST, 100, "(#100) Invalid parameter")
            .user_msg("Template category and name are required.")
            .reply();
    }

    let mut templates = db.templates.write().await;
    if templates.iter().any(|t| t.name == name && t.language == language) {
        return GraphError::new(StatusCode::BAD_REQUEST, 100, "(#100) Invalid parameter")
            .details(format!("Content in {language} already exists"))
            .user_msg(format!(
                "There is already {language} content for this template. Create a new template and try again."
            ))
            .reply();
    }
    let template = Template {
        id: db.next_id(),
        name: name.to_string(),
        category: category.to_string(),
        language: language.to_string(),
        status: "APPROVED".to_string(),
        components: body.get("components").cloned().unwrap_or_else(|| json!([])),
    };
    let reply = json!({"id": template.id, "status": template.status, "category": template.category});
    templates.push(template);
    (StatusCode::OK, Json(reply))
}

async fn list_templates(
    State(db): State<Db>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    db.pause().await;
    db.record("GET", &uri, &headers, Value::Null).await;
    if let Err(err) = authorize(&db, &headers) {
        return err.reply();
    }
    respond(page_templates(&db, &query).await)
}

async fn page_templates(db: &GraphState, query: &HashMap<String, String>) -> Result<Value, GraphError> {
    let templates = db.templates.read().await;
    let bad_request = |message: String| GraphError::new(StatusCode::BAD_REQUEST, 100, message);

    let fields: Option<Vec<&str>> = query.get("fields").map(|f| f.split(',').collect());
    let known = serde_json::to_value(Template {
        id: String::new(),
        name: String::new(),
        category: String::new(),
        language: String::new(),
        status: String::new(),
        components: Value::Null,
    })
    .unwrap_or_default();
    for field in fields.iter().flatten() {
        if known.get(*field).is_none() {
            return Err(bad_request(format!("(#100) Tried accessing nonexisting field ({field})")));
        }
    }

    let cursor = |key: &str| -> Result<Option<usize>, GraphError> {
        query
            .get(key)
            .map(|c| c.parse().map_err(|_| bad_request(format!("(#100) Invalid {key} cursor"))))
            .transpose()
    };
    let limit = match query.get("limit") {
        Some(l) => l.parse().map_err(|_| bad_request("(#100) Invalid limit".to_string()))?,
        None => DEFAULT_PAGE_SIZE,
    };
    let start = cursor("after")?.map_or(0, |c| c + 1);
    let end = cursor("before")?.unwrap_or(templates.len()).min(templates.len());

    let page: Vec<(usize, &Template)> = templates
        .iter()
        .enumerate()
        .skip(start)
        .take_while(|(i, _)| *i < end)
        .take(limit)
        .collect();
    let data: Vec<Value> = page
        .iter()
        .map(|(_, t)| project(t, fields.as_deref()))
        .collect();

    let mut body = json!({"data": data});
    if let (Some((first, _)), Some((last, _))) = (page.first(), page.last()) {
        body["paging"] = json!({"cursors": {"before": first.to_string(), "after": last.to_string()}});
    }
    Ok(body)
}

/// Keep only the requested fields; `id` is always returned.
fn project(template: &Template, fields: Option<&[&str]>) -> Value {
    let full = serde_json::to_value(template).unwrap_or_default();
    let Some(fields) = fields else {
        return full;
    };
    let mut out = Map::new();
    out.insert("id".to_string(), json!(template.id));
    for field in fields {
        if let Some(v) = full.get(*field) {
            out.insert(field.to_string(), v.clone());
        }
    }
    Value::Object(out)
}

async fn show_template(
    State(db): State<Db>,
    Path((_version, id)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
) -> Reply {
    db.pause().await;
    db.record("GET", &uri, &headers, Value::Null).await;
    if let Err(err) = authorize(&db, &headers) {
        return err.reply();
    }
    let templates = db.templates.read().await;
    match templates.iter().find(|t| t.id == id) {
        Some(t) => (StatusCode::OK, Json(json!(t))),
        None => GraphError::new(
            StatusCode::BAD_REQUEST,
            100,
            format!(
                "Unsupported get request. Object with ID '{id}' does not exist, cannot be loaded due to missing permissions, or does not support this operation."
            ),
        )
        .reply(),
    }
}

async fn delete_template(
    State(db): State<Db>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    db.pause().await;
    db.record("DELETE", &uri, &headers, Value::Null).await;
    if let Err(err) = authorize(&db, &headers) {
        return err.reply();
    }
    let Some(name) = query.get("name") else {
        return GraphError::new(StatusCode::BAD_REQUEST, 100, "(#100) The parameter name is required.").reply();
    };
    let mut templates = db.templates.write().await;
    let before = templates.len();
    templates.retain(|t| &t.name != name);
    if templates.len() == before {
        return GraphError::new(StatusCode::BAD_REQUEST, 100, "(#100) Invalid parameter")
            .user_msg(format!("Message template \"{name}\" could not be found."))
            .reply();
    }
    (StatusCode::OK, Json(json!({"success": true})))
}
