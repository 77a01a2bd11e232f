//! Platform collaborator: audit-log sink and neighbor-cache eviction
//!
//! The bus layer never writes audit events or touches the ARP cache itself;
//! both are side effects delegated to the hosting platform so they stay
//! independently testable.

use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Destination for structured audit event lines
pub trait AuditSink: Send + Sync {
    /// Failure-severity events
    fn err(&self, line: &str);
    /// All other events
    fn debug(&self, line: &str);
}

/// Platform operation failures
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Evicting neighbor-cache entry for {ip}: {reason}")]
    NeighborEviction { ip: IpAddr, reason: String },
}

/// Host platform services consumed by the bus layer
pub trait Platform: Send + Sync {
    fn audit_sink(&self) -> Arc<dyn AuditSink>;

    /// Remove any stale ARP entry for `ip` before connecting. Defends against
    /// stale MAC-to-IP mappings after IaaS-level network changes.
    fn delete_arp_entry(&self, ip: IpAddr) -> Result<(), PlatformError>;
}

/// Audit sink that routes events through the `tracing` stack under the
/// `audit` target
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn err(&self, line: &str) {
        error!(target: "audit", "{line}");
    }

    fn debug(&self, line: &str) {
        debug!(target: "audit", "{line}");
    }
}

/// Default platform: tracing-backed audit sink and best-effort neighbor-cache
/// eviction via `ip neigh` on Linux (a no-op elsewhere)
pub struct DefaultPlatform;

impl Platform for DefaultPlatform {
    fn audit_sink(&self) -> Arc<dyn AuditSink> {
        Arc::new(TracingAuditSink)
    }

    #[cfg(target_os = "linux")]
    fn delete_arp_entry(&self, ip: IpAddr) -> Result<(), PlatformError> {
        let output = std::process::Command::new("ip")
            .args(["neigh", "flush", "to", &ip.to_string()])
            .output()
            .map_err(|e| PlatformError::NeighborEviction {
                ip,
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(PlatformError::NeighborEviction {
                ip,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn delete_arp_entry(&self, _ip: IpAddr) -> Result<(), PlatformError> {
        Ok(())
    }
}
