//! Structured audit events for processed bus requests
//!
//! Every inbound exchange produces one event line handed to the platform's
//! audit sink. This module must never raise: audit logging is not allowed to
//! crash message processing, so all internal errors are logged and swallowed.

use crate::config::SettingsProvider;
use crate::platform::AuditSink;
use crate::transport::InboundMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Two severities are used: informational success and error-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Success,
    Failure,
}

/// One processed inbound request and its outcome
#[derive(Debug, Serialize)]
pub struct AuditEvent<'a> {
    pub timestamp: DateTime<Utc>,
    pub severity: AuditSeverity,
    pub source_ip: &'a str,
    pub source_port: &'a str,
    pub reply_to: &'a str,
    pub method: &'a str,
    pub subject: &'a str,
    pub status_reason: &'a str,
}

/// Fields extracted defensively from the request payload; a payload that is
/// not the expected JSON object still yields an event with empty fields
#[derive(Debug, Default, Deserialize)]
struct PayloadFields {
    #[serde(default)]
    method: String,
    #[serde(default)]
    reply_to: String,
}

/// Converts processed inbound messages into audit event lines
pub struct AuditLogger {
    settings: Arc<dyn SettingsProvider>,
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(settings: Arc<dyn SettingsProvider>, sink: Arc<dyn AuditSink>) -> Self {
        Self { settings, sink }
    }

    /// Emit one event for `msg` with the given outcome. Failure-severity
    /// events go to the error sink, everything else to the debug sink.
    pub fn log_request(&self, msg: &InboundMessage, severity: AuditSeverity, status_reason: &str) {
        let settings = self.settings.settings();
        let (source_ip, source_port) = match parse_source(&settings.mbus.url) {
            Ok(parts) => parts,
            Err(reason) => {
                error!("Deriving audit event source from mbus URL: {reason}");
                (String::new(), String::new())
            }
        };

        let fields: PayloadFields = match serde_json::from_slice(&msg.payload) {
            Ok(fields) => fields,
            Err(e) => {
                error!("Parsing payload for audit event: {e}");
                PayloadFields::default()
            }
        };

        let event = AuditEvent {
            timestamp: Utc::now(),
            severity,
            source_ip: &source_ip,
            source_port: &source_port,
            reply_to: &fields.reply_to,
            method: &fields.method,
            subject: &msg.subject,
            status_reason,
        };

        match serde_json::to_string(&event) {
            Ok(line) => match severity {
                AuditSeverity::Failure => self.sink.err(&line),
                AuditSeverity::Success => self.sink.debug(&line),
            },
            Err(e) => error!("Serializing audit event: {e}"),
        }
    }
}

fn parse_source(mbus_url: &str) -> Result<(String, String), String> {
    let url = url::Url::parse(mbus_url).map_err(|e| e.to_string())?;
    let host = url.host_str().ok_or_else(|| "URL has no host".to_string())?;
    let port = url
        .port()
        .map(|p| p.to_string())
        .unwrap_or_default();
    Ok((host.to_string(), port))
}
