//! # TCM Shared Library
//!
//! Types, persistence and business logic used by the TCM API server and the
//! housekeeping worker.
//!
//! ## Module Organization
//!
//! - `db`: connection pool and embedded migrations
//! - `models`: database models for the organization → project → module →
//!   suite → test case hierarchy, executions and onboarding tokens
//! - `auth`: passwords, session tokens, one-time tokens and access checks
//! - `analytics`: pass/fail aggregation over latest executions
//! - `transfer`: spreadsheet import and export of test cases
//! - `mail`: onboarding mail delivery

pub mod analytics;
pub mod auth;
pub mod db;
pub mod mail;
pub mod models;
pub mod transfer;

/// Current version of the TCM shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
