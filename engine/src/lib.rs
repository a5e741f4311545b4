//! Quant Copilot Engine Library
//!
//! This library provides the core functionality of the copilot client.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// Backend API client
pub mod backend;

/// Message bus for inter-component communication
pub mod message_bus;

/// Conversation state and submission flow
pub mod conversation;

/// Single-flight backtest job tracker
pub mod tracker;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
