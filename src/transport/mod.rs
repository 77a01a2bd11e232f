//! Transport abstraction over the pub/sub bus
//!
//! The wire encoding of the bus is out of scope here: the underlying client
//! is assumed to be a reliable ordered pub/sub primitive with subject-based
//! routing. This module defines the seam the protocol layer talks through,
//! plus the connection parameters handed to it.

use crate::error::BusError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

pub mod credentials;
pub mod verify;

pub use credentials::resolve_connection_info;
pub use verify::PeerCertificateValidator;

/// One delivery from the bus
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Routing key this delivery arrived on
    pub subject: String,
    /// Opaque payload; audited as JSON with `method` and `reply_to` fields
    pub payload: Vec<u8>,
    /// Subject to publish a response to; empty means no reply is expected
    pub reply_to: String,
}

/// Callback invoked with the peer's verified certificate chains during the
/// TLS handshake; an error aborts the handshake
pub type PeerVerifyFn =
    Arc<dyn Fn(&[Vec<CertificateDer<'static>>]) -> Result<(), BusError> + Send + Sync>;

/// TLS material for a mutually authenticated connection
pub struct TlsInfo {
    /// Trusted CA pool; `None` falls back to the client's default trust
    pub ca_roots: Option<RootCertStore>,
    /// Client certificate chain and matching private key
    pub client_cert: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
    /// Peer-certificate verification hook
    pub verify_peer: Option<PeerVerifyFn>,
}

impl fmt::Debug for TlsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsInfo")
            .field("ca_roots", &self.ca_roots.as_ref().map(|r| r.len()))
            .field("client_cert", &self.client_cert.is_some())
            .field("verify_peer", &self.verify_peer.is_some())
            .finish()
    }
}

/// Connection parameters, rebuilt fresh on every `start` since credentials
/// may change between resolutions
pub struct ConnectionInfo {
    /// `host:port` of the bus endpoint
    pub addr: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// `None` means the transport is unauthenticated and unencrypted
    pub tls: Option<TlsInfo>,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("addr", &self.addr)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .finish()
    }
}

/// Client for the pub/sub bus primitive
///
/// Implementations must make `publish` safe for concurrent invocation (or
/// serialize it internally); the protocol layer adds no publish-side lock.
#[async_trait::async_trait]
pub trait BusClient: Send + Sync {
    /// Establish the connection described by `info`
    async fn connect(&self, info: &ConnectionInfo) -> Result<(), BusError>;

    /// Subscribe to `subject`; deliveries arrive on the returned channel.
    /// The channel closes when the connection is torn down.
    async fn subscribe(&self, subject: &str)
        -> Result<mpsc::Receiver<InboundMessage>, BusError>;

    /// Publish `payload` to `subject`
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Tear down the connection; best-effort and idempotent
    async fn disconnect(&self);
}
