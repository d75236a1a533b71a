//! Command implementations for the CLI
//!
//! This module contains the implementation of all CLI commands:
//! - serve: Start the aggregator
//! - test: Test configuration validity
//! - discover: List control endpoints on this host
//! - send: Send one request to a control endpoint

pub mod discover;
pub mod send;
pub mod serve;
pub mod test;
