//! Connection broker
//!
//! Picks a server for each operation and hands out an exclusive [`Lease`]
//! on it:
//!
//! - Acquisitions against the client's default pool start at a rotating
//!   cursor; per-call server lists are always scanned from the first entry.
//! - An endpoint serves at most one operation at a time. Each endpoint has a
//!   single-permit fair semaphore, so a caller targeting a busy endpoint
//!   waits and is served in arrival order.
//! - Candidates are tried one after another (readiness probe, then protocol
//!   connect) until one succeeds. If none does, every failure is reported.

use crate::ldap::adapter::{DirectoryConnection, DirectoryConnector, ProtocolError, ReadinessProbe};
use crate::metrics;
use dirauth_core::{EndpointSet, Error, Result, ServerEndpoint, TlsOptions};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Per-endpoint exclusion slots. An entry lives only while a lease holds
/// the endpoint or a caller waits for it.
#[derive(Clone, Default)]
struct Slots(Arc<Mutex<HashMap<ServerEndpoint, Arc<Semaphore>>>>);

impl Slots {
    fn get(&self, endpoint: &ServerEndpoint) -> Arc<Semaphore> {
        self.0
            .lock()
            .entry(endpoint.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    fn is_busy(&self, endpoint: &ServerEndpoint) -> bool {
        self.0
            .lock()
            .get(endpoint)
            .map(|slot| slot.available_permits() == 0)
            .unwrap_or(false)
    }

    /// Give the permit back and forget the slot once nobody else refers to it.
    fn free(&self, endpoint: &ServerEndpoint, permit: OwnedSemaphorePermit) {
        drop(permit);
        let mut slots = self.0.lock();
        if slots
            .get(endpoint)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(endpoint);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.lock().len()
    }
}

pub struct ConnectionBroker {
    default_set: EndpointSet,
    cursor: AtomicUsize,
    slots: Slots,
    connector: Arc<dyn DirectoryConnector>,
    probe: Arc<dyn ReadinessProbe>,
}

impl ConnectionBroker {
    pub fn new(
        default_set: EndpointSet,
        connector: Arc<dyn DirectoryConnector>,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Self {
        Self {
            default_set,
            cursor: AtomicUsize::new(0),
            slots: Slots::default(),
            connector,
            probe,
        }
    }

    /// The pool used when a call does not name its own servers
    pub fn default_set(&self) -> &EndpointSet {
        &self.default_set
    }

    /// Whether an operation currently holds this endpoint
    pub fn is_busy(&self, endpoint: &ServerEndpoint) -> bool {
        self.slots.is_busy(endpoint)
    }

    /// Acquire a connected lease on one endpoint of `endpoints`.
    pub async fn acquire(
        &self,
        endpoints: &EndpointSet,
        tls: &TlsOptions,
        timeout: Duration,
    ) -> Result<Lease> {
        self.connector.prepare(tls)?;

        let count = endpoints.len();
        let rotating = endpoints.same_set(&self.default_set);
        let start = if rotating {
            self.cursor.fetch_add(1, Ordering::Relaxed) % count
        } else {
            0
        };

        let mut errors = Vec::new();
        for attempt in 0..count {
            if rotating && attempt > 0 {
                // Next acquisition starts after the last endpoint tried.
                self.cursor.fetch_add(1, Ordering::Relaxed);
            }

            let Some(endpoint) = endpoints.get((start + attempt) % count) else {
                break;
            };

            match self.try_endpoint(endpoint, tls, timeout).await {
                Ok((connection, permit)) => {
                    info!("Connected to directory server {}", endpoint);
                    metrics::record_connection(&endpoint.url());
                    return Ok(Lease {
                        endpoint: endpoint.clone(),
                        connection,
                        permit: Some(permit),
                        slots: self.slots.clone(),
                        failed_attempts: errors,
                    });
                }
                Err(e) => {
                    warn!("Directory server {} unavailable: {}", endpoint, e);
                    metrics::record_endpoint_failure(&endpoint.url());
                    errors.push(e.to_string());
                }
            }
        }

        Err(Error::AllEndpointsExhausted { errors })
    }

    async fn try_endpoint(
        &self,
        endpoint: &ServerEndpoint,
        tls: &TlsOptions,
        timeout: Duration,
    ) -> std::result::Result<(Box<dyn DirectoryConnection>, OwnedSemaphorePermit), ProtocolError>
    {
        let slot = self.slots.get(endpoint);
        if slot.available_permits() == 0 {
            debug!("Waiting for busy directory server {}", endpoint);
        }

        let permit = slot
            .acquire_owned()
            .await
            .map_err(|_| ProtocolError::Closed(format!("{}: endpoint slot closed", endpoint)))?;

        let connected = match self.probe.probe(endpoint, timeout).await {
            Ok(()) => self.connector.connect(endpoint, tls, timeout).await,
            Err(e) => Err(e),
        };

        match connected {
            Ok(connection) => Ok((connection, permit)),
            Err(e) => {
                self.slots.free(endpoint, permit);
                Err(e)
            }
        }
    }
}

/// Exclusive use of one connected endpoint.
///
/// Call [`Lease::release`] when the operation is done. A lease that is
/// dropped instead still frees its endpoint, but skips the unbind.
pub struct Lease {
    endpoint: ServerEndpoint,
    connection: Box<dyn DirectoryConnection>,
    permit: Option<OwnedSemaphorePermit>,
    slots: Slots,
    failed_attempts: Vec<String>,
}

impl Lease {
    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    pub fn connection(&self) -> &dyn DirectoryConnection {
        self.connection.as_ref()
    }

    /// Failures from endpoints tried before this one
    pub fn failed_attempts(&self) -> &[String] {
        &self.failed_attempts
    }

    /// Unbind and free the endpoint.
    pub async fn release(mut self) {
        self.connection.unbind().await;
        if let Some(permit) = self.permit.take() {
            self.slots.free(&self.endpoint, permit);
        }
        debug!("Released directory server {}", self.endpoint);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.slots.free(&self.endpoint, permit);
            warn!("Lease on {} dropped without release", self.endpoint);
        }
    }
}
