//! Building intake requests from batches of events.
//!
//! A [`RequestBuilder`] knows the url, query items and headers of one
//! intake and turns a body into an [`UploadRequest`]. Features plug their
//! own framing in through [`FeatureRequestBuilder`]:
//!
//! - [`JsonBatchRequestBuilder`] joins event payloads with a [`DataFormat`]
//!   (JSON array for logs, newline-delimited for RUM and traces)
//! - [`MultipartRequestBuilder`] sends every event as a compressed file
//!   part, plus one JSON part describing them all

use bytes::Bytes;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::Value;
use uuid::Uuid;

use spool_core::{DataFormat, Event, SdkContext};

use crate::compression;
use crate::error::RequestError;

pub const DD_API_KEY: HeaderName = HeaderName::from_static("dd-api-key");
pub const DD_EVP_ORIGIN: HeaderName = HeaderName::from_static("dd-evp-origin");
pub const DD_EVP_ORIGIN_VERSION: HeaderName = HeaderName::from_static("dd-evp-origin-version");
pub const DD_REQUEST_ID: HeaderName = HeaderName::from_static("dd-request-id");

/// A request ready to be handed to an [`HttpClient`](crate::HttpClient).
/// Always sent with `POST`.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UploadRequest {
    /// Header value as text, if present and printable
    pub fn header(&self, name: impl reqwest::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn request_id(&self) -> Option<String> {
        self.header(DD_REQUEST_ID).map(str::to_owned)
    }

    pub fn is_compressed(&self) -> bool {
        self.headers.contains_key(CONTENT_ENCODING)
    }
}

/// Query item appended to the intake url
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryItem {
    /// `ddsource=<source>`
    DdSource(String),
    /// `ddtags=<tag1>,<tag2>`
    DdTags(Vec<String>),
}

impl QueryItem {
    fn encode(&self) -> String {
        match self {
            QueryItem::DdSource(source) => format!("ddsource={}", urlencoding::encode(source)),
            QueryItem::DdTags(tags) => format!("ddtags={}", urlencoding::encode(&tags.join(","))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    ApplicationJson,
    TextPlainUtf8,
    MultipartFormData { boundary: String },
}

impl ContentType {
    fn header_value(&self) -> String {
        match self {
            ContentType::ApplicationJson => "application/json".to_string(),
            ContentType::TextPlainUtf8 => "text/plain;charset=UTF-8".to_string(),
            ContentType::MultipartFormData { boundary } => format!("multipart/form-data; boundary={boundary}"),
        }
    }
}

/// Header set on every request a [`RequestBuilder`] produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpHeader {
    ContentType(ContentType),
    /// `<app>/<version> (<model>; <os>/<os version>)`, reduced to printable ASCII
    UserAgent {
        app_name: String,
        app_version: String,
        device_model: String,
        os_name: String,
        os_version: String,
    },
    ApiKey(String),
    EvpOrigin(String),
    EvpOriginVersion(String),
    /// A fresh UUID for every request
    RequestId,
}

impl HttpHeader {
    /// User agent describing the application in `context`
    pub fn user_agent(context: &SdkContext) -> Self {
        HttpHeader::UserAgent {
            app_name: context.application_name.clone(),
            app_version: context.version.clone(),
            device_model: context.device.model.clone(),
            os_name: context.device.os_name.clone(),
            os_version: context.device.os_version.clone(),
        }
    }

    fn name(&self) -> HeaderName {
        match self {
            HttpHeader::ContentType(_) => CONTENT_TYPE,
            HttpHeader::UserAgent { .. } => USER_AGENT,
            HttpHeader::ApiKey(_) => DD_API_KEY,
            HttpHeader::EvpOrigin(_) => DD_EVP_ORIGIN,
            HttpHeader::EvpOriginVersion(_) => DD_EVP_ORIGIN_VERSION,
            HttpHeader::RequestId => DD_REQUEST_ID,
        }
    }

    fn value(&self) -> String {
        match self {
            HttpHeader::ContentType(content_type) => content_type.header_value(),
            HttpHeader::UserAgent {
                app_name,
                app_version,
                device_model,
                os_name,
                os_version,
            } => format!(
                "{}/{} ({}; {}/{})",
                printable_ascii(app_name),
                printable_ascii(app_version),
                printable_ascii(device_model),
                printable_ascii(os_name),
                printable_ascii(os_version),
            ),
            HttpHeader::ApiKey(value) | HttpHeader::EvpOrigin(value) | HttpHeader::EvpOriginVersion(value) => {
                value.clone()
            }
            HttpHeader::RequestId => Uuid::new_v4().to_string(),
        }
    }

    fn static_name(&self) -> &'static str {
        match self {
            HttpHeader::ContentType(_) => "Content-Type",
            HttpHeader::UserAgent { .. } => "User-Agent",
            HttpHeader::ApiKey(_) => "DD-API-KEY",
            HttpHeader::EvpOrigin(_) => "DD-EVP-ORIGIN",
            HttpHeader::EvpOriginVersion(_) => "DD-EVP-ORIGIN-VERSION",
            HttpHeader::RequestId => "DD-REQUEST-ID",
        }
    }
}

fn printable_ascii(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Produces `POST` requests for one intake
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    url: String,
    query_items: Vec<QueryItem>,
    headers: Vec<HttpHeader>,
}

impl RequestBuilder {
    pub fn new(url: impl Into<String>, query_items: Vec<QueryItem>, headers: Vec<HttpHeader>) -> Self {
        Self {
            url: url.into(),
            query_items,
            headers,
        }
    }

    /// Intake url with query items
    pub fn url(&self) -> String {
        if self.query_items.is_empty() {
            return self.url.clone();
        }
        let query: Vec<String> = self.query_items.iter().map(QueryItem::encode).collect();
        format!("{}?{}", self.url, query.join("&"))
    }

    /// Build a request carrying `body`.
    ///
    /// With `compress`, the body is sent zlib-compressed with
    /// `Content-Encoding: deflate` unless compressing does not shrink it.
    pub fn upload_request(&self, body: Bytes, compress: bool) -> Result<UploadRequest, RequestError> {
        let url = self.url();
        reqwest::Url::parse(&url).map_err(|_| RequestError::InvalidUrl { url: url.clone() })?;

        let mut headers = HeaderMap::with_capacity(self.headers.len() + 1);
        for header in &self.headers {
            let value = HeaderValue::from_str(&header.value()).map_err(|e| RequestError::InvalidHeader {
                name: header.static_name(),
                reason: e.to_string(),
            })?;
            headers.insert(header.name(), value);
        }

        let body = match compress.then(|| compression::deflate(&body)).flatten() {
            Some(compressed) => {
                headers.insert(CONTENT_ENCODING, HeaderValue::from_static("deflate"));
                Bytes::from(compressed)
            }
            None => body,
        };

        Ok(UploadRequest { url, headers, body })
    }
}

/// Turns a batch of events into a request for a feature's intake
pub trait FeatureRequestBuilder: Send + Sync {
    fn request(&self, events: &[Event], context: &SdkContext) -> Result<UploadRequest, RequestError>;
}

/// Headers every intake expects, after checking the client token is set
fn intake_headers(context: &SdkContext, content_type: ContentType) -> Result<Vec<HttpHeader>, RequestError> {
    if context.client_token.trim().is_empty() {
        return Err(RequestError::MissingClientToken);
    }
    Ok(vec![
        HttpHeader::ContentType(content_type),
        HttpHeader::user_agent(context),
        HttpHeader::ApiKey(context.client_token.clone()),
        HttpHeader::EvpOrigin(context.source.clone()),
        HttpHeader::EvpOriginVersion(context.sdk_version.clone()),
        HttpHeader::RequestId,
    ])
}

fn intake_tags(context: &SdkContext) -> Vec<String> {
    vec![
        format!("service:{}", context.service),
        format!("version:{}", context.version),
        format!("sdk_version:{}", context.sdk_version),
        format!("env:{}", context.env),
    ]
}

/// Sends event payloads joined into a single body
#[derive(Debug, Clone)]
pub struct JsonBatchRequestBuilder {
    path: &'static str,
    format: DataFormat,
    content_type: ContentType,
    with_query: bool,
    custom_intake_url: Option<String>,
    compress: bool,
}

impl JsonBatchRequestBuilder {
    /// Logs: a JSON array of log entries
    pub fn logs() -> Self {
        Self {
            path: "/api/v2/logs",
            format: DataFormat::json_array(),
            content_type: ContentType::ApplicationJson,
            with_query: true,
            custom_intake_url: None,
            compress: true,
        }
    }

    /// RUM: newline-delimited events
    pub fn rum() -> Self {
        Self {
            path: "/api/v2/rum",
            format: DataFormat::newline_delimited(),
            content_type: ContentType::TextPlainUtf8,
            with_query: true,
            custom_intake_url: None,
            compress: true,
        }
    }

    /// Traces: newline-delimited span payloads, no query
    pub fn traces() -> Self {
        Self {
            path: "/api/v2/spans",
            format: DataFormat::newline_delimited(),
            content_type: ContentType::TextPlainUtf8,
            with_query: false,
            custom_intake_url: None,
            compress: true,
        }
    }

    /// Send to `url` instead of the site's intake
    pub fn with_custom_intake_url(mut self, url: impl Into<String>) -> Self {
        self.custom_intake_url = Some(url.into());
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn format(&self) -> &DataFormat {
        &self.format
    }

    fn url(&self, context: &SdkContext) -> String {
        self.custom_intake_url
            .clone()
            .unwrap_or_else(|| format!("{}{}", context.site.endpoint(), self.path))
    }
}

impl FeatureRequestBuilder for JsonBatchRequestBuilder {
    fn request(&self, events: &[Event], context: &SdkContext) -> Result<UploadRequest, RequestError> {
        let query_items = if self.with_query {
            vec![
                QueryItem::DdSource(context.source.clone()),
                QueryItem::DdTags(intake_tags(context)),
            ]
        } else {
            Vec::new()
        };
        let builder = RequestBuilder::new(
            self.url(context),
            query_items,
            intake_headers(context, self.content_type.clone())?,
        );
        builder.upload_request(self.format.format_events(events), self.compress)
    }
}

/// Multipart form-data body
#[derive(Debug)]
pub struct MultipartFormData {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartFormData {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            body: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn add_form_file(&mut self, name: &str, filename: &str, data: &[u8], mime_type: &str) {
        self.body.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n").as_bytes(),
        );
        self.body
            .extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
    }

    pub fn finish(mut self) -> Bytes {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Bytes::from(self.body)
    }
}

/// Sends every event as its own compressed file part.
///
/// Each event must carry JSON object metadata. The metadata of all events
/// is sent as a JSON array in an `event` part, each entry extended with
/// the raw and compressed size of its segment.
#[derive(Debug, Clone)]
pub struct MultipartRequestBuilder {
    path: &'static str,
    custom_intake_url: Option<String>,
}

impl MultipartRequestBuilder {
    /// Session replay segments
    pub fn replay() -> Self {
        Self {
            path: "/api/v2/replay",
            custom_intake_url: None,
        }
    }

    pub fn with_custom_intake_url(mut self, url: impl Into<String>) -> Self {
        self.custom_intake_url = Some(url.into());
        self
    }
}

impl FeatureRequestBuilder for MultipartRequestBuilder {
    fn request(&self, events: &[Event], context: &SdkContext) -> Result<UploadRequest, RequestError> {
        let mut form = MultipartFormData::new(Uuid::new_v4().to_string());
        let mut descriptions = Vec::with_capacity(events.len());

        for (index, event) in events.iter().enumerate() {
            let metadata = event
                .metadata
                .as_ref()
                .ok_or_else(|| RequestError::MalformedBatch(format!("event {index} has no metadata")))?;
            let mut description: Value = serde_json::from_slice(metadata)
                .map_err(|e| RequestError::MalformedBatch(format!("event {index}: {e}")))?;
            let Value::Object(fields) = &mut description else {
                return Err(RequestError::MalformedBatch(format!(
                    "event {index}: metadata is not an object"
                )));
            };

            let segment = compression::zlib(&event.data)
                .map_err(|e| RequestError::MalformedBatch(format!("event {index}: {e}")))?;
            fields.insert("raw_segment_size".to_string(), event.data.len().into());
            fields.insert("compressed_segment_size".to_string(), segment.len().into());
            descriptions.push(description);

            form.add_form_file("segment", &format!("file{index}"), &segment, "application/octet-stream");
        }

        let blob = serde_json::to_vec(&descriptions).map_err(|e| RequestError::MalformedBatch(e.to_string()))?;
        form.add_form_file("event", "blob", &blob, "application/json");

        let content_type = ContentType::MultipartFormData {
            boundary: form.boundary().to_string(),
        };
        let url = self
            .custom_intake_url
            .clone()
            .unwrap_or_else(|| format!("{}{}", context.site.endpoint(), self.path));
        // Segments are compressed individually
        RequestBuilder::new(url, Vec::new(), intake_headers(context, content_type)?).upload_request(form.finish(), false)
    }
}
