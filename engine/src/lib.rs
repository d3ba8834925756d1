//! Cadence Engine Library
//!
//! This library provides the core functionality of the Cadence orchestration
//! kernel. It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module (objectives, memory store, continuity ledger)
pub mod db;

/// Capability router module
pub mod router;

/// Tool gateway module
pub mod gateway;

/// Cycle controller module
pub mod cycle;

/// Built-in persona handlers
pub mod persona;

/// Built-in native tools
pub mod tools;

/// Message bus for inter-component communication
pub mod message_bus;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
