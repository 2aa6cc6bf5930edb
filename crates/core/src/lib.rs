//! Printline Core - Shared types library.
//!
//! This crate provides the types shared by every printline component:
//! - `engine` - Order sync, personalization extraction and print task generation
//! - `cli` - Command-line entry points for migrations, sync and processing
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. The optional `postgres` feature adds `sqlx` encoding
//! so the same types can be bound directly in queries.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs and the status enums that drive the pipeline

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
