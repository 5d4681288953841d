//! AUTOTRADER — daily equity auto-trader for the KIS brokerage API.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod accounts;
pub mod analysis;
pub mod broker;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod notify;
pub mod storage;
pub mod strategy;
pub mod types;
