//! Multi-tenant process usage rollups.
//!
//! Devices report periodic resource snapshots which are stored per tenant. Queries rank
//! processes by CPU or RAM over a time window and return averaged, grouped time series.

pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod model;
pub mod protocol;
pub mod socket;
pub mod store;
