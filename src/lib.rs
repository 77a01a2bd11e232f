//! Secure message-bus client protocol layer for a host-resident management
//! agent.
//!
//! The agent holds a single publish/subscribe connection to a remote
//! orchestrator ("director"), receives command requests on its private
//! subject, dispatches them to registered business-logic handlers, returns
//! responses, and produces a tamper-evident audit trail of every exchange.
//!
//! # Overview
//!
//! - [`bus::BusHandler`] — lifecycle controller: connect with bounded retry,
//!   subscribe, dispatch, disconnect
//! - [`transport::BusClient`] — seam to the underlying pub/sub primitive
//! - [`transport::resolve_connection_info`] — credentials and mutual-TLS
//!   material from settings
//! - [`transport::PeerCertificateValidator`] — trust-domain check on the
//!   peer certificate during the handshake
//! - [`handler`] — handler registry and message dispatcher
//! - [`audit`] — structured audit events per processed request
//!
//! # Quick start
//!
//! ```rust,no_run
//! use agentbus::bus::BusHandler;
//! use agentbus::config::{Settings, StaticSettings};
//! use agentbus::platform::DefaultPlatform;
//! use agentbus::testing::mocks::MockBusClient;
//! use std::sync::Arc;
//!
//! # async fn example(settings: Settings) -> Result<(), agentbus::BusError> {
//! let handler = BusHandler::new(
//!     Arc::new(StaticSettings(settings)),
//!     MockBusClient::new(), // a real BusClient in production
//!     Arc::new(DefaultPlatform),
//! );
//!
//! handler
//!     .start(Arc::new(|req| {
//!         Ok(Some(serde_json::json!({ "value": format!("handled {}", req.method) })))
//!     }))
//!     .await?;
//!
//! handler.send("director", "heartbeat", &serde_json::json!({"x": 1})).await?;
//! handler.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod bus;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod platform;
pub mod retry;
pub mod testing;
pub mod transport;

pub use bus::{BusHandler, ShutdownHandle};
pub use config::{Settings, SettingsProvider, StaticSettings};
pub use error::{BusError, BusResult, HandlerError};
pub use handler::{HandlerFunc, HandlerRegistry, Request, MAX_RESPONSE_LEN};
pub use transport::{BusClient, ConnectionInfo, InboundMessage};
