//! Printline engine library.
//!
//! Mirrors ShipStation orders into `PostgreSQL`, resolves each line item's
//! personalization and writes the print queue the workshop works from.
//!
//! # Personalization sources
//!
//! In priority order:
//! - Amazon customization archives (`CustomizedURL` zip with a JSON manifest)
//! - Structured blocks in eBay buyer notes
//! - An `OpenAI`-compatible chat model, one call per order
//!
//! Items none of them resolve get a placeholder task flagged for review.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod ai;
pub mod config;
pub mod customization;
pub mod db;
pub mod models;
pub mod services;
pub mod shipstation;
pub mod telemetry;
