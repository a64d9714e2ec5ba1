//! deskmig client - HTTP access to helpdesk instances.
//!
//! This crate provides the rate-limited request executor, the schema reader
//! and the [`HelpdeskClient`] facade used by the migration engine.
//!
//! # Quick Start
//!
//! ```ignore
//! use deskmig_client::{ExecutorConfig, HelpdeskClient, InstanceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = InstanceConfig::new("acme", "ops@acme.test", "api-token");
//!     let client = HelpdeskClient::new("source", &source, ExecutorConfig::default())?;
//!
//!     // Read every field category and the ticket forms
//!     let schema = client.read_schema().await?;
//!     println!("Found {} objects", schema.object_count());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod reader;
pub mod request;
pub mod transport;

pub use client::HelpdeskClient;
pub use config::{ExecutorConfig, InstanceConfig};
pub use error::{Error, TransportError};
pub use executor::RequestExecutor;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockHelpdesk;
pub use reader::SchemaReader;
pub use request::{ApiRequest, ApiResponse, Method};
pub use transport::{HttpTransport, Transport};

/// Re-export data model types.
pub use deskmig_proto as proto;
