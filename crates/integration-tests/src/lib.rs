//! End-to-end tests for printline.
//!
//! The services are driven through their trait seams with in-memory fakes,
//! so no database, ShipStation account or model API is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p printline-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `reconcile_pipeline` - Personalization resolution and print task writes
//! - `order_sync` - ShipStation to database mirroring

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc)]

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakeShipStation, MemoryStore, MemorySyncStore, ScriptedModel, StaticArchives};
pub use fixtures::Harness;
