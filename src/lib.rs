//! cms-admin-core Library
//!
//! Stateful core of a CMS admin front-end.
//!
//! # Features
//!
//! - **Upload Queue**: Single-lane upload pump with bounded retry, pause and
//!   real cancellation of the in-flight transfer
//! - **Widget Registry**: Priority-ordered registries with winner-takes-all
//!   overrides for customization layers
//! - **Template Preview**: Mustache-style rendering of gallery/component HTML
//! - **Inspection**: Prometheus metrics plus JSON queue/registry endpoints
//!
//! # Example
//!
//! ```no_run
//! use cms_admin_core::config::Config;
//! use cms_admin_core::upload::http::HttpTransport;
//! use cms_admin_core::upload::{Destination, UploadPayload, UploadQueueManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("cms-admin.yaml")?;
//!     let transport = HttpTransport::from_config(config.transport.as_ref().unwrap())?;
//!     let queue = UploadQueueManager::new(Arc::new(transport), config.upload.clone());
//!
//!     queue.enqueue(
//!         vec![UploadPayload::new("logo.svg", std::fs::read("logo.svg")?)],
//!         Destination::new("media", "/brand"),
//!     );
//!     queue.wait_until_idle().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod template;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use registry::WidgetRegistryResolver;
pub use upload::UploadQueueManager;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
