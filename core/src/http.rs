//! HTTP transport types and the executor that runs them.
//!
//! # Design
//! Requests and responses are plain data. `GraphClient::build_*` produces an
//! `HttpRequest` and `GraphClient::parse_*` consumes an `HttpResponse`, so the
//! Graph-specific shaping is testable without a network. `execute` is the one
//! place that touches reqwest: it applies the timeout, and it returns every
//! status code as data. Deciding what counts as failure is the parser's job.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::error::{ApiError, Result};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// One part of a multipart form body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

/// Request body, either serialized JSON or multipart form parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpBody {
    Json(String),
    Multipart(Vec<FormPart>),
}

impl HttpBody {
    /// The JSON text, if this is a JSON body.
    pub fn as_json(&self) -> Option<&str> {
        match self {
            HttpBody::Json(s) => Some(s),
            HttpBody::Multipart(_) => None,
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<HttpBody>,
}

impl HttpRequest {
    /// First header value with the given (lower-case) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Execute `req` with reqwest, bounded by `timeout`.
///
/// Non-2xx responses come back as `Ok`; only connection failures and the
/// timeout are errors here.
pub async fn execute(
    http: &reqwest::Client,
    req: HttpRequest,
    timeout: Duration,
) -> Result<HttpResponse> {
    debug!(method = req.method.as_str(), url = %req.url, "graph request");

    let mut builder = match req.method {
        HttpMethod::Get => http.get(&req.url),
        HttpMethod::Post => http.post(&req.url),
        HttpMethod::Delete => http.delete(&req.url),
    }
    .timeout(timeout);

    for (name, value) in &req.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder = match req.body {
        Some(HttpBody::Json(body)) => builder.body(body),
        Some(HttpBody::Multipart(parts)) => builder.multipart(into_form(parts)?),
        None => builder,
    };

    let millis = timeout.as_millis() as u64;
    let response = builder
        .send()
        .await
        .map_err(|e| map_reqwest_error(e, millis))?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
    let body = response
        .text()
        .await
        .map_err(|e| map_reqwest_error(e, millis))?;

    debug!(status, "graph response");
    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn into_form(parts: Vec<FormPart>) -> Result<Form> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name, value),
            FormPart::File {
                name,
                filename,
                mime_type,
                bytes,
            } => {
                let file = Part::bytes(bytes)
                    .file_name(filename)
                    .mime_str(&mime_type)
                    .map_err(|_| {
                        ApiError::RequestValidation(format!("invalid mime type: {mime_type}"))
                    })?;
                form.part(name, file)
            }
        };
    }
    Ok(form)
}

fn map_reqwest_error(err: reqwest::Error, timeout_millis: u64) -> ApiError {
    if err.is_timeout() {
        ApiError::TransportTimeout(timeout_millis)
    } else {
        ApiError::Transport(err.to_string())
    }
}
