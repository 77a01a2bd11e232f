//! Bus handler: connection lifecycle, handler registration, and sends
//!
//! Orchestrates connect → subscribe → run → disconnect against the abstract
//! [`BusClient`]. `start` returns once subscribed, leaving dispatch running
//! in the background; `run` additionally blocks until an interrupt,
//! termination signal, or shutdown handle fires, then disconnects.

use crate::audit::AuditLogger;
use crate::config::SettingsProvider;
use crate::error::BusError;
use crate::handler::{HandlerFunc, HandlerRegistry, MessageDispatcher};
use crate::platform::Platform;
use crate::retry::{AttemptRetryStrategy, RetryDecision};
use crate::transport::{credentials, BusClient};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Initial connection retry bound
pub const CONNECT_MAX_ATTEMPTS: u32 = 4;
/// Per-publish retry bound
pub const PUBLISH_MAX_ATTEMPTS: u32 = 3;
/// Fixed inter-attempt delay; constant by design, no backoff or jitter
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Private per-agent subscription subject: `agent.{agent_id}`
pub fn agent_subject(agent_id: &str) -> String {
    format!("agent.{agent_id}")
}

/// Outbound send subject: `{target}.agent.{topic}.{agent_id}`
pub fn send_subject(target: &str, topic: &str, agent_id: &str) -> String {
    format!("{target}.agent.{topic}.{agent_id}")
}

/// Clonable handle that ends a blocking [`BusHandler::run`] without OS
/// signal delivery (embedded use and tests)
#[derive(Clone)]
pub struct ShutdownHandle(Arc<Notify>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.notify_one();
    }
}

/// Control-plane bus handler for a host-resident management agent
pub struct BusHandler {
    settings: Arc<dyn SettingsProvider>,
    client: Arc<dyn BusClient>,
    platform: Arc<dyn Platform>,
    registry: Arc<HandlerRegistry>,
    audit: Arc<AuditLogger>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
}

impl BusHandler {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        client: Arc<dyn BusClient>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        let audit = Arc::new(AuditLogger::new(settings.clone(), platform.audit_sink()));
        Self {
            settings,
            client,
            platform,
            registry: Arc::new(HandlerRegistry::new()),
            audit,
            dispatch_task: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Register the handler, resolve credentials, connect with retry, and
    /// subscribe to the agent's private subject. Returns once subscribed,
    /// leaving the subscription active in the background.
    ///
    /// Concurrent `start` calls are a caller error; `start` and `stop` are
    /// expected to come from a single controlling task.
    pub async fn start(&self, handler: HandlerFunc) -> Result<(), BusError> {
        self.register_additional_func(handler);

        let settings = self.settings.settings();
        let info = credentials::resolve_connection_info(&settings)?;

        // Pre-connect hook: evict any stale neighbor-cache entry for a
        // literal-IP bus address. Failure is logged, not fatal.
        if let Some(ip) = literal_ip(&info.addr) {
            if let Err(e) = self.platform.delete_arp_entry(ip) {
                error!("Cleaning ip-mac address cache for {ip}: {e}");
            }
        }

        let strategy = AttemptRetryStrategy::new(CONNECT_MAX_ATTEMPTS, RETRY_DELAY);
        let info_ref = &info;
        strategy
            .run(|| {
                let client = Arc::clone(&self.client);
                async move { client.connect(info_ref).await.map_err(RetryDecision::Retry) }
            })
            .await
            .map_err(|e| match e {
                BusError::Connection(_) => e,
                other => BusError::Connection(other.to_string()),
            })?;

        let subject = agent_subject(&settings.agent.id);
        info!("Subscribing to {subject}");

        let mut deliveries = self
            .client
            .subscribe(&subject)
            .await
            .map_err(|e| BusError::Subscription {
                subject: subject.clone(),
                reason: e.to_string(),
            })?;

        let dispatcher = MessageDispatcher::new(
            self.registry.clone(),
            self.client.clone(),
            self.audit.clone(),
        );
        let handle = tokio::spawn(async move {
            while let Some(msg) = deliveries.recv().await {
                dispatcher.dispatch(&msg).await;
            }
            debug!("Subscription channel closed, dispatch loop ending");
        });
        self.dispatch_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle);

        Ok(())
    }

    /// `start` plus block-until-signal plus guaranteed disconnect on return
    pub async fn run(&self, handler: HandlerFunc) -> Result<(), BusError> {
        match self.start(handler).await {
            Ok(()) => {
                self.run_until_interrupted().await;
                self.stop().await;
                Ok(())
            }
            Err(e) => {
                self.stop().await;
                Err(e)
            }
        }
    }

    /// Append another handler; callable at any time and never touches
    /// connection state
    pub fn register_additional_func(&self, handler: HandlerFunc) {
        self.registry.add(handler);
    }

    /// Publish a message not tied to any inbound request
    pub async fn send<T: Serialize>(
        &self,
        target: &str,
        topic: &str,
        message: &T,
    ) -> Result<(), BusError> {
        // Marshal failure is fatal to the call; retrying cannot fix a
        // non-serializable value.
        let bytes = serde_json::to_vec(message).map_err(BusError::Encoding)?;

        info!("Sending {target} message '{topic}'");
        debug!("Message payload: {}", String::from_utf8_lossy(&bytes));

        let settings = self.settings.settings();
        let subject = send_subject(target, topic, &settings.agent.id);

        let strategy = AttemptRetryStrategy::new(PUBLISH_MAX_ATTEMPTS, RETRY_DELAY);
        strategy
            .run(|| {
                let client = Arc::clone(&self.client);
                let subject = subject.clone();
                let bytes = bytes.clone();
                async move {
                    client
                        .publish(&subject, bytes)
                        .await
                        .map_err(RetryDecision::Retry)
                }
            })
            .await
            .map_err(|e| match e {
                BusError::Transport(_) => e,
                other => BusError::Transport(other.to_string()),
            })
    }

    /// Disconnect the transport. Idempotent and best-effort: in-flight
    /// handler execution is not waited on, and disconnect failures are not
    /// surfaced.
    pub async fn stop(&self) {
        self.client.disconnect().await;
        // Detach rather than abort: the dispatch loop ends when the
        // subscription channel closes.
        let _detached = self
            .dispatch_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    /// Handle to end a blocking `run` from within the process
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    async fn run_until_interrupted(&self) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupt received, shutting down"),
            _ = terminate_signal() => info!("Termination signal received, shutting down"),
            _ = self.shutdown.notified() => info!("Shutdown requested, shutting down"),
        }
    }
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::warn!("Installing SIGTERM handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}

fn literal_ip(addr: &str) -> Option<IpAddr> {
    addr.split(':').next().and_then(|host| host.parse().ok())
}
