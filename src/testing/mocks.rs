//! Mock implementations for testing
//!
//! `MockBusClient` records connects and publishes and lets tests deliver
//! inbound messages; `MockPlatform` records neighbor-cache evictions and
//! exposes a recording audit sink.

use crate::error::BusError;
use crate::platform::{AuditSink, Platform, PlatformError};
use crate::transport::{BusClient, ConnectionInfo, InboundMessage};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, Mutex};

/// Subject/payload pair captured by [`MockBusClient::publish`]
pub type PublishedMessage = (String, Vec<u8>);

/// What a connect attempt carried, minus the un-clonable TLS material
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedConnect {
    pub addr: String,
    pub username: Option<String>,
    pub tls_enabled: bool,
}

#[derive(Default)]
struct MockBusState {
    connected: bool,
    connect_attempts: u32,
    remaining_connect_failures: u32,
    fail_subscribe: bool,
    remaining_publish_failures: u32,
    connects: Vec<RecordedConnect>,
    published: Vec<PublishedMessage>,
    subscriptions: Vec<String>,
    delivery_tx: Option<mpsc::Sender<InboundMessage>>,
    disconnect_calls: u32,
}

/// Mock bus client for testing
#[derive(Default)]
pub struct MockBusClient {
    state: Mutex<MockBusState>,
}

impl MockBusClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `n` connect attempts fail
    pub async fn fail_connects(&self, n: u32) {
        self.state.lock().await.remaining_connect_failures = n;
    }

    /// Make the next `n` publishes fail
    pub async fn fail_publishes(&self, n: u32) {
        self.state.lock().await.remaining_publish_failures = n;
    }

    pub async fn fail_subscribe(&self) {
        self.state.lock().await.fail_subscribe = true;
    }

    /// Deliver an inbound message as if the bus pushed it
    pub async fn deliver(&self, msg: InboundMessage) {
        let tx = self.state.lock().await.delivery_tx.clone();
        if let Some(tx) = tx {
            tx.send(msg).await.expect("subscription channel closed");
        }
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().await.published.clone()
    }

    pub async fn connects(&self) -> Vec<RecordedConnect> {
        self.state.lock().await.connects.clone()
    }

    pub async fn connect_attempts(&self) -> u32 {
        self.state.lock().await.connect_attempts
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.state.lock().await.subscriptions.clone()
    }

    pub async fn disconnect_calls(&self) -> u32 {
        self.state.lock().await.disconnect_calls
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }
}

#[async_trait]
impl BusClient for MockBusClient {
    async fn connect(&self, info: &ConnectionInfo) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        state.connect_attempts += 1;
        state.connects.push(RecordedConnect {
            addr: info.addr.clone(),
            username: info.username.clone(),
            tls_enabled: info.tls.is_some(),
        });
        if state.remaining_connect_failures > 0 {
            state.remaining_connect_failures -= 1;
            return Err(BusError::Connection("mock connect failure".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
    ) -> Result<mpsc::Receiver<InboundMessage>, BusError> {
        let mut state = self.state.lock().await;
        if state.fail_subscribe {
            return Err(BusError::Transport("mock subscribe failure".to_string()));
        }
        state.subscriptions.push(subject.to_string());
        let (tx, rx) = mpsc::channel(32);
        state.delivery_tx = Some(tx);
        Ok(rx)
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        if state.remaining_publish_failures > 0 {
            state.remaining_publish_failures -= 1;
            return Err(BusError::Transport("mock publish failure".to_string()));
        }
        state.published.push((subject.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        state.disconnect_calls += 1;
        state.connected = false;
        // Dropping the sender closes the subscription channel, ending the
        // dispatch loop.
        state.delivery_tx = None;
    }
}

/// Audit sink that records event lines for assertions
#[derive(Default)]
pub struct RecordingAuditSink {
    errs: StdMutex<Vec<String>>,
    debugs: StdMutex<Vec<String>>,
}

impl RecordingAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn err_lines(&self) -> Vec<String> {
        self.errs.lock().unwrap().clone()
    }

    pub fn debug_lines(&self) -> Vec<String> {
        self.debugs.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn err(&self, line: &str) {
        self.errs.lock().unwrap().push(line.to_string());
    }

    fn debug(&self, line: &str) {
        self.debugs.lock().unwrap().push(line.to_string());
    }
}

/// Mock platform recording neighbor-cache evictions
pub struct MockPlatform {
    pub sink: Arc<RecordingAuditSink>,
    evicted: StdMutex<Vec<IpAddr>>,
    fail_evictions: bool,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sink: RecordingAuditSink::new(),
            evicted: StdMutex::new(Vec::new()),
            fail_evictions: false,
        })
    }

    /// Platform whose eviction operation always fails; start must treat that
    /// as non-fatal
    pub fn with_failing_evictions() -> Arc<Self> {
        Arc::new(Self {
            sink: RecordingAuditSink::new(),
            evicted: StdMutex::new(Vec::new()),
            fail_evictions: true,
        })
    }

    pub fn evicted_ips(&self) -> Vec<IpAddr> {
        self.evicted.lock().unwrap().clone()
    }
}

impl Platform for MockPlatform {
    fn audit_sink(&self) -> Arc<dyn AuditSink> {
        self.sink.clone()
    }

    fn delete_arp_entry(&self, ip: IpAddr) -> Result<(), PlatformError> {
        if self.fail_evictions {
            return Err(PlatformError::NeighborEviction {
                ip,
                reason: "mock eviction failure".to_string(),
            });
        }
        self.evicted.lock().unwrap().push(ip);
        Ok(())
    }
}
