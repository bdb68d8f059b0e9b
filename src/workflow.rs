use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::upload::{body_snippet, content_type_is_json, BROWSER_USER_AGENT};

/// Identifier of the image-to-prompt workflow on the remote service.
pub const WORKFLOW_ID: &str = "7548376142701658148";

/// Output profile requested from the generation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptType {
    Normal,
    Flux,
    Midjourney,
    StableDiffusion,
}

impl PromptType {
    /// Wire value sent as the workflow `promptType` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::Normal => "Normal",
            PromptType::Flux => "Flux",
            PromptType::Midjourney => "Midjourney",
            PromptType::StableDiffusion => "StableDiffusion",
        }
    }

    /// Map a UI model-selection tag to a profile. Unrecognized tags fall
    /// back to `Normal`.
    pub fn from_model_tag(tag: &str) -> Self {
        match tag {
            "general" => PromptType::Normal,
            "flux" => PromptType::Flux,
            "midjourney" => PromptType::Midjourney,
            "stable-diffusion" => PromptType::StableDiffusion,
            _ => PromptType::Normal,
        }
    }
}

impl std::fmt::Display for PromptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one workflow execution.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub prompt_type: PromptType,
    /// The extracted prompt text.
    pub prompt: String,
    /// The `data` payload exactly as the remote service sent it.
    pub raw_payload: String,
    /// Operator-facing diagnostics link, when the remote service offers one.
    pub debug_url: Option<String>,
}

/// Result of the two-stage payload decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrompt {
    /// Whether the payload parsed as JSON.
    pub parsed: bool,
    pub prompt: String,
}

/// Decode a workflow payload that may itself be JSON.
///
/// The payload string is parsed as JSON and its `prompt` field extracted;
/// when that fails the raw string is the prompt verbatim. The remote side
/// is untrusted, so this never errors.
pub fn parse_prompt_payload(raw: &str) -> ParsedPrompt {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => ParsedPrompt {
            parsed: true,
            prompt: value
                .get("prompt")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        },
        Err(_) => ParsedPrompt {
            parsed: false,
            prompt: raw.to_string(),
        },
    }
}

/// Client for the remote workflow-execution endpoint (`/workflow/run`).
#[derive(Debug, Clone)]
pub struct WorkflowInvoker {
    http: Client,
    config: GatewayConfig,
}

impl WorkflowInvoker {
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

    /// Run the generation workflow against an uploaded file.
    pub async fn invoke(&self, file_id: &str, prompt_type: PromptType) -> Result<WorkflowResult> {
        if file_id.trim().is_empty() {
            return Err(GatewayError::MissingParams("file_id"));
        }
        let token = self.config.token().ok_or(GatewayError::Unconfigured)?;

        let body = execution_params(file_id, prompt_type);
        if self.config.debug {
            debug!(file_id, prompt_type = %prompt_type, "invoking generation workflow");
        }

        let url = format!("{}/workflow/run", self.config.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network {
                context: format!("Failed to run workflow at {}", url),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let is_json = content_type_is_json(&resp);
        let text = resp.text().await.map_err(|e| GatewayError::Network {
            context: "Failed to read workflow response body".into(),
            source: e,
        })?;

        if self.config.debug {
            debug!(status, "workflow response received");
        }

        parse_workflow_response(status, is_json, &text, prompt_type)
    }
}

/// Request body for one workflow execution.
pub(crate) fn execution_params(file_id: &str, prompt_type: PromptType) -> Value {
    serde_json::json!({
        "workflow_id": WORKFLOW_ID,
        "parameters": {
            "img": { "file_id": file_id },
            "promptType": prompt_type.as_str(),
        },
    })
}

/// Interpret the remote workflow response.
pub(crate) fn parse_workflow_response(
    status: u16,
    is_json: bool,
    body: &str,
    prompt_type: PromptType,
) -> Result<WorkflowResult> {
    if !(200..300).contains(&status) {
        // The workflow endpoint reports failures with whatever body it has.
        return Err(GatewayError::Remote {
            status,
            details: body.to_string(),
        });
    }

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

    let raw_payload = match json.get("data") {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    let parsed = parse_prompt_payload(&raw_payload);

    Ok(WorkflowResult {
        prompt_type,
        prompt: parsed.prompt,
        raw_payload,
        debug_url: json
            .get("debug_url")
            .and_then(Value::as_str)
            .map(String::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_tag_mapping() {
        assert_eq!(PromptType::from_model_tag("general"), PromptType::Normal);
        assert_eq!(PromptType::from_model_tag("flux"), PromptType::Flux);
        assert_eq!(
            PromptType::from_model_tag("midjourney"),
            PromptType::Midjourney
        );
        assert_eq!(
            PromptType::from_model_tag("stable-diffusion"),
            PromptType::StableDiffusion
        );
    }

    #[test]
    fn unknown_model_tag_defaults_to_normal() {
        assert_eq!(PromptType::from_model_tag("dall-e"), PromptType::Normal);
        assert_eq!(PromptType::from_model_tag(""), PromptType::Normal);
    }

    #[test]
    fn execution_params_shape() {
        let body = execution_params("file-9", PromptType::Midjourney);
        assert_eq!(body["workflow_id"], WORKFLOW_ID);
        assert_eq!(body["parameters"]["img"]["file_id"], "file-9");
        assert_eq!(body["parameters"]["promptType"], "Midjourney");
    }

    #[test]
    fn payload_with_nested_json_extracts_prompt() {
        let parsed = parse_prompt_payload(r#"{"prompt":"a cat"}"#);
        assert!(parsed.parsed);
        assert_eq!(parsed.prompt, "a cat");
    }

    #[test]
    fn payload_without_prompt_key_yields_empty() {
        let parsed = parse_prompt_payload(r#"{"other":"value"}"#);
        assert!(parsed.parsed);
        assert_eq!(parsed.prompt, "");
    }

    #[test]
    fn non_json_payload_is_used_verbatim() {
        let parsed = parse_prompt_payload("plain text result");
        assert!(!parsed.parsed);
        assert_eq!(parsed.prompt, "plain text result");
    }

    #[test]
    fn response_with_encoded_data_yields_prompt() {
        let body = r#"{"code":0,"data":"{\"prompt\":\"a cat\"}"}"#;
        let result = parse_workflow_response(200, true, body, PromptType::Normal).unwrap();
        assert_eq!(result.prompt, "a cat");
        assert_eq!(result.raw_payload, r#"{"prompt":"a cat"}"#);
        assert!(result.debug_url.is_none());
    }

    #[test]
    fn response_with_plain_data_downgrades_to_verbatim() {
        let body = r#"{"data":"plain text result"}"#;
        let result = parse_workflow_response(200, true, body, PromptType::Flux).unwrap();
        assert_eq!(result.prompt, "plain text result");
        assert_eq!(result.prompt_type, PromptType::Flux);
    }

    #[test]
    fn response_without_data_yields_empty_prompt() {
        let result = parse_workflow_response(200, true, r#"{"code":0}"#, PromptType::Normal)
            .unwrap();
        assert_eq!(result.prompt, "");
        assert_eq!(result.raw_payload, "");
    }

    #[test]
    fn object_data_is_reserialized_then_decoded() {
        let body = r#"{"data":{"prompt":"inline object"}}"#;
        let result = parse_workflow_response(200, true, body, PromptType::Normal).unwrap();
        assert_eq!(result.prompt, "inline object");
    }

    #[test]
    fn debug_url_is_forwarded() {
        let body = r#"{"data":"x","debug_url":"https://debug.example/run/1"}"#;
        let result = parse_workflow_response(200, true, body, PromptType::Normal).unwrap();
        assert_eq!(
            result.debug_url.as_deref(),
            Some("https://debug.example/run/1")
        );
    }

    #[test]
    fn non_success_status_carries_raw_body() {
        let err =
            parse_workflow_response(500, true, "workflow exploded", PromptType::Normal).unwrap_err();
        match err {
            GatewayError::Remote { status, details } => {
                assert_eq!(status, 500);
                assert_eq!(details, "workflow exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_json_success_is_malformed() {
        let err = parse_workflow_response(200, false, "<html>", PromptType::Normal).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn invoke_without_token_is_unconfigured() {
        let invoker = WorkflowInvoker::new(
            GatewayConfig::default().with_api_base("http://192.0.2.1/v1"),
        );
        let err = invoker
            .invoke("file-1", PromptType::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unconfigured));
    }

    #[tokio::test]
    async fn invoke_with_blank_file_id_is_missing_params() {
        let invoker = WorkflowInvoker::new(GatewayConfig::default().with_access_token("tok"));
        let err = invoker.invoke("  ", PromptType::Normal).await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingParams("file_id")));
    }
}
