//! Fan-out of inbound messages to registered handlers
//!
//! For each delivery the dispatcher snapshots the registry under its lock,
//! releases it, then invokes every handler outside the lock. A failing
//! handler is logged and audited but never aborts the other handlers, the
//! connection, or future messages.

use crate::audit::{AuditLogger, AuditSeverity};
use crate::error::HandlerError;
use crate::handler::{HandlerFunc, HandlerRegistry, Request, MAX_RESPONSE_LEN};
use crate::transport::{BusClient, InboundMessage};
use std::sync::Arc;
use tracing::{debug, error};

pub struct MessageDispatcher {
    registry: Arc<HandlerRegistry>,
    client: Arc<dyn BusClient>,
    audit: Arc<AuditLogger>,
}

impl MessageDispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        client: Arc<dyn BusClient>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            registry,
            client,
            audit,
        }
    }

    /// Process one inbound message through every registered handler.
    ///
    /// Emits one failure-severity audit event per failing handler, and a
    /// single success-severity event for the message when no handler failed.
    pub async fn dispatch(&self, msg: &InboundMessage) {
        let funcs = self.registry.snapshot();
        debug!(
            "Dispatching message on {} to {} handler(s)",
            msg.subject,
            funcs.len()
        );

        let mut any_failed = false;
        for func in funcs {
            match Self::perform(&msg.payload, &func) {
                Ok(Some(response)) => {
                    if !msg.reply_to.is_empty() {
                        // Reply publish failure does not change the audit
                        // verdict already computed from handler success.
                        if let Err(e) = self.client.publish(&msg.reply_to, response).await {
                            error!("Publishing reply to {}: {e}", msg.reply_to);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    any_failed = true;
                    error!("Running handler: {e}");
                    self.audit
                        .log_request(msg, AuditSeverity::Failure, &e.to_string());
                }
            }
        }

        if !any_failed {
            self.audit.log_request(msg, AuditSeverity::Success, "");
        }
    }

    /// Decode the payload, run one handler, and encode its response within
    /// the size bound
    fn perform(payload: &[u8], func: &HandlerFunc) -> Result<Option<Vec<u8>>, HandlerError> {
        let request: Request =
            serde_json::from_slice(payload).map_err(|e| HandlerError::Decode(e.to_string()))?;

        match func(request)? {
            None => Ok(None),
            Some(value) => {
                let bytes = serde_json::to_vec(&value).map_err(HandlerError::Encode)?;
                if bytes.len() > MAX_RESPONSE_LEN {
                    return Err(HandlerError::ResponseTooLarge {
                        size: bytes.len(),
                        max: MAX_RESPONSE_LEN,
                    });
                }
                Ok(Some(bytes))
            }
        }
    }
}
