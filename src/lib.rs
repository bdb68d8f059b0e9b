//! # prompt-gateway
//!
//! Proxy-aware gateway for image-to-prompt generation through a remote AI
//! workflow service.
//!
//! The crate has two halves. The transport half builds outbound HTTP
//! configuration that works from behind an intermediary proxy: proxy
//! resolution from the environment (development only), a keep-alive tunnel
//! agent whose missing capabilities are patched with conforming defaults,
//! and a builder that always degrades to a usable client instead of
//! failing. The pipeline half validates a candidate image, uploads it to
//! the remote storage endpoint, runs the fixed generation workflow against
//! the returned file handle, and unwraps the workflow's double-encoded
//! payload into a prompt string.
//!
//! ## Quick Start
//!
//! ```no_run
//! use prompt_gateway::{GatewayConfig, GenerationPipeline, UploadCandidate};
//!
//! # async fn example() -> prompt_gateway::Result<()> {
//! let config = GatewayConfig::from_env();
//! let pipeline = GenerationPipeline::from_config(config);
//!
//! let image = std::fs::read("photo.png").unwrap();
//! let candidate = UploadCandidate::new(image, "image/png", "photo.png");
//!
//! let generation = pipeline.run(&candidate, "midjourney").await?;
//! println!("{}", generation.prompt);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod proxy;
pub mod transport;
pub mod upload;
pub mod validate;
pub mod workflow;

pub use agent::{adapt, CapabilityReport, ConnectOptions, TunnelAgent, TunnelSocket};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use pipeline::{Generation, GenerationPipeline, Stage, UploadService, WorkflowService};
pub use proxy::{EnvContext, ProxyConfig, ProxyProtocol};
pub use transport::{HttpClientOptions, TransportOptions};
pub use upload::{RemoteFileHandle, RemoteUploadClient};
pub use validate::{validate_file, UploadCandidate, ValidationError, MAX_FILE_SIZE};
pub use workflow::{parse_prompt_payload, PromptType, WorkflowInvoker, WorkflowResult};
