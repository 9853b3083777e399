//! # TCM Worker Library
//!
//! Background housekeeping for the TCM API.
//!
//! ## Modules
//!
//! - `sweeper`: Purges expired invitations and used or expired email
//!   verification tokens

pub mod sweeper;
