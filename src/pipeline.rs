use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::transport::{self, TransportOptions};
use crate::upload::{RemoteFileHandle, RemoteUploadClient};
use crate::validate::{validate_file, UploadCandidate};
use crate::workflow::{PromptType, WorkflowInvoker, WorkflowResult};

/// Where a submission currently is in its lifecycle.
///
/// Every submission walks `Idle → Validating → Uploading → Invoking` and
/// terminates in `Done` or `Failed`. There are no retries; a new submission
/// always starts over from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Validating,
    Uploading,
    Invoking,
    Done,
    Failed,
}

/// Final output of a successful generation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_url: Option<String>,
}

/// Remote storage collaborator.
#[async_trait]
pub trait UploadService: Send + Sync {
    async fn upload(&self, candidate: &UploadCandidate) -> Result<RemoteFileHandle>;
}

/// Remote workflow-execution collaborator.
#[async_trait]
pub trait WorkflowService: Send + Sync {
    async fn invoke(&self, file_id: &str, prompt_type: PromptType) -> Result<WorkflowResult>;
}

#[async_trait]
impl UploadService for RemoteUploadClient {
    async fn upload(&self, candidate: &UploadCandidate) -> Result<RemoteFileHandle> {
        RemoteUploadClient::upload(self, candidate).await
    }
}

#[async_trait]
impl WorkflowService for WorkflowInvoker {
    async fn invoke(&self, file_id: &str, prompt_type: PromptType) -> Result<WorkflowResult> {
        WorkflowInvoker::invoke(self, file_id, prompt_type).await
    }
}

#[async_trait]
impl<T: UploadService + ?Sized> UploadService for std::sync::Arc<T> {
    async fn upload(&self, candidate: &UploadCandidate) -> Result<RemoteFileHandle> {
        (**self).upload(candidate).await
    }
}

#[async_trait]
impl<T: WorkflowService + ?Sized> WorkflowService for std::sync::Arc<T> {
    async fn invoke(&self, file_id: &str, prompt_type: PromptType) -> Result<WorkflowResult> {
        (**self).invoke(file_id, prompt_type).await
    }
}

/// Orchestrates one submission: validate, upload, invoke, extract.
///
/// The three steps run strictly in sequence; the only suspension points are
/// the two remote calls. Validation and configuration failures surface
/// before any network traffic.
#[derive(Debug, Clone)]
pub struct GenerationPipeline<U, W> {
    uploader: U,
    invoker: W,
}

impl GenerationPipeline<RemoteUploadClient, WorkflowInvoker> {
    /// Assemble the pipeline against the real remote service, with both
    /// clients sharing one transport-built HTTP client.
    pub fn from_config(config: GatewayConfig) -> Self {
        let http = transport::build(
            TransportOptions::new()
                .with_timeout(config.timeout)
                .with_debug(config.debug),
        )
        .client();

        Self {
            uploader: RemoteUploadClient::new(config.clone()).with_http_client(http.clone()),
            invoker: WorkflowInvoker::new(config).with_http_client(http),
        }
    }
}

impl<U, W> GenerationPipeline<U, W>
where
    U: UploadService,
    W: WorkflowService,
{
    pub fn new(uploader: U, invoker: W) -> Self {
        Self { uploader, invoker }
    }

    /// Run one submission to completion.
    pub async fn run(&self, candidate: &UploadCandidate, model: &str) -> Result<Generation> {
        self.run_with_progress(candidate, model, |_| {}).await
    }

    /// Run one submission, reporting each stage transition.
    ///
    /// The callback sees `Idle` once at the start and then every stage the
    /// submission reaches, ending with `Done` or `Failed`.
    pub async fn run_with_progress<F>(
        &self,
        candidate: &UploadCandidate,
        model: &str,
        mut on_stage: F,
    ) -> Result<Generation>
    where
        F: FnMut(Stage),
    {
        on_stage(Stage::Idle);

        on_stage(Stage::Validating);
        if let Err(e) = validate_file(candidate) {
            on_stage(Stage::Failed);
            return Err(e.into());
        }

        on_stage(Stage::Uploading);
        let handle = match self.uploader.upload(candidate).await {
            Ok(handle) => handle,
            Err(e) => {
                on_stage(Stage::Failed);
                return Err(e);
            }
        };
        debug!(file_id = %handle.file_id, "file uploaded");

        on_stage(Stage::Invoking);
        let prompt_type = PromptType::from_model_tag(model);
        let result = match self.invoker.invoke(&handle.file_id, prompt_type).await {
            Ok(result) => result,
            Err(e) => {
                on_stage(Stage::Failed);
                return Err(e);
            }
        };

        on_stage(Stage::Done);
        Ok(Generation {
            prompt: result.prompt,
            debug_url: result.debug_url,
        })
    }
}
