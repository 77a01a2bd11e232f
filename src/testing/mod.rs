//! Test doubles for the bus layer
//!
//! Provides mock bus client, platform, and audit sink implementations to
//! enable comprehensive testing without a live bus.

pub mod mocks;
