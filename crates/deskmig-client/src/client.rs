//! Helpdesk client API.
//!
//! This module provides the `HelpdeskClient` facade used by the migration
//! engine: schema reads plus the two mutating calls a run needs, create and
//! delete.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use deskmig_proto::{created_id, EntityKind, InstanceSchema};

use crate::config::{ExecutorConfig, InstanceConfig};
use crate::error::Error;
use crate::executor::RequestExecutor;
use crate::reader::SchemaReader;
use crate::request::ApiRequest;
use crate::transport::{HttpTransport, Transport};

/// A client for one helpdesk instance.
///
/// # Example
///
/// ```ignore
/// use deskmig_client::{ExecutorConfig, HelpdeskClient, InstanceConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let instance = InstanceConfig::new("acme", "ops@acme.test", "api-token");
///     let client = HelpdeskClient::new("source", &instance, ExecutorConfig::default())?;
///
///     let schema = client.read_schema().await?;
///     println!("{} ticket fields", schema.ticket_fields.len());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct HelpdeskClient {
    executor: RequestExecutor,
}

impl HelpdeskClient {
    /// Create a client talking HTTP to the configured instance.
    pub fn new(
        label: impl Into<String>,
        instance: &InstanceConfig,
        config: ExecutorConfig,
    ) -> Result<Self, Error> {
        let transport = HttpTransport::new(instance, &config)?;
        Ok(Self::with_transport(label, Arc::new(transport), config))
    }

    /// Create a client over an arbitrary transport.
    pub fn with_transport(
        label: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            executor: RequestExecutor::new(label, transport, config),
        }
    }

    /// Instance label used in logs.
    pub fn label(&self) -> &str {
        self.executor.label()
    }

    /// The underlying request executor.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// A schema reader for this instance.
    pub fn reader(&self) -> SchemaReader {
        SchemaReader::new(self.executor.clone())
    }

    /// Read every field category and the ticket forms.
    pub async fn read_schema(&self) -> Result<InstanceSchema, Error> {
        self.reader().read_schema().await
    }

    /// Create an object and return the id the instance assigned.
    ///
    /// `payload` must already be wrapped in the kind's singular key.
    ///
    /// A create that times out or fails with a `5xx` is resent like any
    /// other request. If the instance had committed the first attempt, the
    /// resend either collides on the key or leaves a duplicate whose id never
    /// reached the caller, and so is absent from the rollback log. Check the
    /// target by hand after a run that logged retried creates.
    pub async fn create(&self, kind: EntityKind, payload: Value) -> Result<u64, Error> {
        let request = Self::create_request(kind, payload);
        let response = self.executor.execute(&request).await?;
        self.created(kind, &response.body)
    }

    /// [`create`](Self::create), abandoning retry waits once `shutdown_rx`
    /// fires.
    pub async fn create_until_shutdown(
        &self,
        kind: EntityKind,
        payload: Value,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<u64, Error> {
        let request = Self::create_request(kind, payload);
        let response = self
            .executor
            .execute_until_shutdown(&request, shutdown_rx)
            .await?;
        self.created(kind, &response.body)
    }

    fn create_request(kind: EntityKind, payload: Value) -> ApiRequest {
        ApiRequest::post(format!("{}.json", kind.endpoint()), payload)
    }

    fn created(&self, kind: EntityKind, body: &str) -> Result<u64, Error> {
        let id = created_id(body, kind.wrapper())?;
        debug!(instance = %self.label(), kind = %kind, id, "created object");
        Ok(id)
    }

    /// Delete an object.
    ///
    /// A `404` is returned as [`Error::Permanent`]; callers that treat an
    /// absent object as deleted check [`Error::is_not_found`].
    pub async fn delete(&self, kind: EntityKind, id: u64) -> Result<(), Error> {
        let request = ApiRequest::delete(format!("{}/{}.json", kind.endpoint(), id));
        self.executor.execute(&request).await?;
        debug!(instance = %self.label(), kind = %kind, id, "deleted object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHelpdesk;
    use deskmig_proto::FieldCategory;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_returns_assigned_id() {
        let mock = Arc::new(MockHelpdesk::new().with_next_id(501));
        let client = HelpdeskClient::with_transport("target", mock.clone(), ExecutorConfig::without_delays());

        let id = client
            .create(
                EntityKind::Field(FieldCategory::Ticket),
                json!({"ticket_field": {"type": "text", "title": "Notes"}}),
            )
            .await
            .unwrap();
        assert_eq!(id, 501);
        assert_eq!(mock.requests()[0].path, "ticket_fields.json");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_until_shutdown_stops_waiting() {
        let mock = Arc::new(MockHelpdesk::new());
        mock.push_response(crate::ApiResponse::rate_limited(Some(std::time::Duration::from_secs(120))));
        let client = HelpdeskClient::with_transport("target", mock.clone(), ExecutorConfig::new());

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        shutdown_tx.send(()).unwrap();
        let err = client
            .create_until_shutdown(
                EntityKind::TicketForm,
                json!({"ticket_form": {"name": "Main Form"}}),
                &mut shutdown_rx,
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(mock.objects(EntityKind::TicketForm).is_empty());
    }

    #[tokio::test]
    async fn test_delete_absent_is_not_found() {
        let mock = Arc::new(MockHelpdesk::new());
        let client = HelpdeskClient::with_transport("target", mock, ExecutorConfig::without_delays());

        let err = client.delete(EntityKind::TicketForm, 42).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
