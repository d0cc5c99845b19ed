//! Trade Ledger Library
//!
//! Accounts, market snapshots and a delayed, lock-protected settlement
//! pipeline behind an authenticated HTTP API.

pub mod application;
pub mod auth;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod server;
