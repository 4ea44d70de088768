//! Message composition and transport for the WhatsApp Cloud (Graph) API.
//!
//! # Overview
//! Turns loosely-typed caller input into the nested JSON shapes the Graph API
//! expects, sends it with the caller's own credentials, and folds the Graph
//! API's error bodies into one `ApiError`.
//!
//! # Design
//! - `config::resolve_config` derives an immutable `Config` from the raw
//!   metadata fields of one request.
//! - `GraphClient` is the transport: `build_*` produces an `HttpRequest`,
//!   `parse_*` consumes an `HttpResponse`, and the async methods run the
//!   round trip through `http::execute`.
//! - `MessageComposer` owns one `GraphClient` and exposes one operation per
//!   message or template action.
//! - `service::RequestHandler` is the boundary a host calls into: config,
//!   payload validation, composer, result.
//! - Nothing is shared between requests; build everything from a `Config`.

pub mod client;
pub mod composer;
pub mod config;
pub mod error;
pub mod http;
pub mod service;
pub mod types;
pub mod validate;

pub use client::GraphClient;
pub use composer::MessageComposer;
pub use config::{resolve_config, resolve_config_with, Config};
pub use error::{ApiError, Result};
pub use http::{FormPart, HttpBody, HttpMethod, HttpRequest, HttpResponse};
pub use service::{into_response, ErrorBody, Metadata, RequestHandler};
pub use types::{
    Coordinate, Degrees, DocumentOptions, LocationOptions, MediaObject, MediaOptions,
    MediaReference, MediaUpload, MessageEnvelope, MessagePayload, QueryOptions, SendResult,
    TemplateCategory, TemplateComponent, TemplateDefinition, TemplateField, TemplateParameter,
    TextOptions,
};
pub use validate::{SchemaValidator, Shape, Validator};
