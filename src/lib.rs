//! AttendChain - a tamper-evident audit ledger for an academic hierarchy
//!
//! Every department, class and student owns its own append-only,
//! proof-of-work sealed chain. A child chain's genesis links to its parent
//! chain's tip at creation time, so the ledger is a tree of chains.
//!
//! # Architecture
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, canonical encoding, chains and validation
//! - [`miner`] - Proof-of-work sealing
//! - [`registry`] - Chain creation and hierarchical anchoring
//! - [`payload`] - Genesis, update, tombstone and attendance payloads
//! - [`entity`] - Departments, classes and students
//!
//! ## State Management
//! - [`persistence`] - JSON file, SQLite and in-memory stores
//! - [`service`] - Single-writer async handle
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod entity;
pub mod miner;
pub mod payload;
pub mod registry;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;
pub mod service;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
