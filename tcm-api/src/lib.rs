//! # TCM API Server Library
//!
//! HTTP interface of the test case management system: organizations, users
//! and invitations, the project / module / suite / test case hierarchy,
//! executions, analytics and spreadsheet transfer.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: JSON extractor and input helpers
//! - `middleware`: Security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
