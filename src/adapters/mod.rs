//! HTTP adapters for the systems spec §1 puts out of scope: the canvas
//! editor, the workflow engine, the auth/billing system, object storage, and
//! the sandbox provider SDK. Grounded in the reference monorepo's
//! `kernel/tavily_client.rs`/`firecrawl_client.rs` pattern — one thin
//! `reqwest`-backed struct per external collaborator, each implementing the
//! trait its caller depends on rather than being depended on directly.

pub mod api_key;
pub mod billing;
pub mod canvas;
pub mod drive;
pub mod sandbox_provider;
pub mod static_files;
pub mod workflow_engine;

pub use api_key::HttpApiKeyValidator;
pub use billing::HttpBillingClient;
pub use canvas::HttpCanvasLookup;
pub use drive::HttpDriveService;
pub use sandbox_provider::HttpSandboxProvider;
pub use static_files::HttpStaticFileLookup;
pub use workflow_engine::HttpWorkflowEngineClient;
