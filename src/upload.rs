use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::validate::UploadCandidate;

/// Fixed purpose tag attached to every upload.
pub const UPLOAD_PURPOSE: &str = "webpage";

/// User-Agent the remote service expects to see.
pub(crate) const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Remote error code meaning the access token was rejected.
const INVALID_TOKEN_CODE: i64 = 700012006;

/// Reference to a file owned by the remote service. Held only for the
/// duration of one workflow call, never persisted. Serializes to the
/// gateway's upload-boundary shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileHandle {
    pub file_id: String,
    pub file_name: String,
    #[serde(rename = "fileSize")]
    pub size_bytes: u64,
    /// Extension-derived type, e.g. `png` for `a.png`.
    pub file_type: String,
}

/// Client for the remote storage endpoint (`/files/upload`).
#[derive(Debug, Clone)]
pub struct RemoteUploadClient {
    http: Client,
    config: GatewayConfig,
}

impl RemoteUploadClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    /// Use a custom `reqwest::Client` (for shared pooling, timeouts, proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Send a validated file to the remote storage endpoint as multipart
    /// form data. Returns the remote file handle.
    ///
    /// Never touches the network when no access token is configured.
    pub async fn upload(&self, candidate: &UploadCandidate) -> Result<RemoteFileHandle> {
        let token = self.config.token().ok_or(GatewayError::Unconfigured)?;

        if self.config.debug {
            debug!(
                file = %candidate.file_name,
                size = candidate.size_bytes,
                mime = %candidate.mime_type,
                "uploading file to remote service"
            );
        }

        let part = Part::bytes(candidate.bytes.clone())
            .file_name(candidate.file_name.clone())
            .mime_str(&candidate.mime_type)
            .map_err(|e| GatewayError::Network {
                context: format!("Invalid content type {}", candidate.mime_type),
                source: e,
            })?;
        let form = Form::new()
            .part("file", part)
            .text("purpose", UPLOAD_PURPOSE);

        let url = format!("{}/files/upload", self.config.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| GatewayError::Network {
                context: format!("Failed to upload file to {}", url),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let is_json = content_type_is_json(&resp);
        let body = resp.text().await.map_err(|e| GatewayError::Network {
            context: "Failed to read upload response body".into(),
            source: e,
        })?;

        if self.config.debug {
            debug!(status, "upload response received");
        }

        parse_upload_response(status, is_json, &body)
    }
}

pub(crate) fn content_type_is_json(resp: &reqwest::Response) -> bool {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false)
}

/// First few hundred characters of a body, for diagnostics.
pub(crate) fn body_snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Interpret the remote upload response.
///
/// Accepts both the nested shape (`data.{id, file_name, bytes}`) and the
/// flat shape (`{fileId, fileName, fileSize}`); the remote side is not
/// consistent about which it sends.
pub(crate) fn parse_upload_response(
    status: u16,
    is_json: bool,
    body: &str,
) -> Result<RemoteFileHandle> {
    if !is_json {
        return Err(GatewayError::MalformedResponse {
            status,
            snippet: body_snippet(body),
        });
    }

    let json: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            return Err(GatewayError::MalformedResponse {
                status,
                snippet: body_snippet(body),
            })
        }
    };

    if !(200..300).contains(&status) {
        return Err(GatewayError::Remote {
            status,
            details: remote_error_details(&json),
        });
    }

    let (id, name, size) = match json.get("data") {
        Some(data) => (
            data.get("id").and_then(string_field),
            data.get("file_name").and_then(Value::as_str),
            data.get("bytes").and_then(Value::as_u64),
        ),
        None => (
            json.get("fileId").and_then(string_field),
            json.get("fileName").and_then(Value::as_str),
            json.get("fileSize").and_then(Value::as_u64),
        ),
    };

    let Some(file_id) = id else {
        return Err(GatewayError::MalformedResponse {
            status,
            snippet: body_snippet(body),
        });
    };

    let file_name = name.unwrap_or("").to_string();
    let file_type = file_name.rsplit('.').next().unwrap_or("").to_string();

    Ok(RemoteFileHandle {
        file_id,
        file_name,
        size_bytes: size.unwrap_or(0),
        file_type,
    })
}

fn remote_error_details(json: &Value) -> String {
    if json.get("code").and_then(Value::as_i64) == Some(INVALID_TOKEN_CODE) {
        return "the remote service rejected the access token (expired or revoked)".to_string();
    }
    json.get("msg")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| json.get("error").and_then(Value::as_str))
        .unwrap_or("Unknown error from remote service")
        .to_string()
}

fn string_field(v: &Value) -> Option<String> {
    v.as_str()
        .map(String::from)
        .or_else(|| v.as_u64().map(|n| n.to_string()))
}
