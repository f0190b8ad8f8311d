//! The broker seam the pub/sub binding drives.

use crate::config::{BindingConfig, TlsConfig};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use hstp_bus::{BrokerClient, BrokerError, Delivery, InMemoryBroker};
use tokio::sync::mpsc;
use tracing::debug;

/// A live session plus the queue its deliveries arrive on. The queue closes
/// when the connection is lost.
pub type Connection = (Box<dyn BrokerSession>, mpsc::Receiver<Delivery>);

/// Connection parameters taken from a binding's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub client_id: String,
    pub endpoint: String,
    pub tls: TlsConfig,
    pub max_connections: usize,
}

impl ConnectOptions {
    pub fn from_config(config: &BindingConfig, client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            endpoint: config.endpoint.clone(),
            tls: config.tls.clone(),
            max_connections: config.max_connections,
        }
    }
}

/// Opens broker sessions.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> Result<Connection, TransportError>;
}

/// One broker session.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;
    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;
    async fn close(&self);
}

fn connection_error(err: BrokerError) -> TransportError {
    TransportError::Connection(err.to_string())
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    /// The in-process broker has no TLS layer and always opens one session.
    async fn connect(&self, options: &ConnectOptions) -> Result<Connection, TransportError> {
        if options.tls.enabled {
            return Err(TransportError::Connection(format!(
                "{}: TLS is not available on the in-process broker",
                options.endpoint
            )));
        }
        debug!(
            client_id = %options.client_id,
            endpoint = %options.endpoint,
            max_connections = options.max_connections,
            "Opening in-process broker session"
        );
        let (client, deliveries) =
            InMemoryBroker::connect(self, options.client_id.as_str()).map_err(connection_error)?;
        Ok((Box::new(client), deliveries))
    }
}

#[async_trait]
impl BrokerSession for BrokerClient {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        BrokerClient::subscribe(self, topic).map_err(connection_error)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        BrokerClient::unsubscribe(self, topic).map_err(connection_error)
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        BrokerClient::publish(self, topic, payload)
            .map(|_| ())
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn close(&self) {
        BrokerClient::close(self);
    }
}
