//! Library crate for ride-relay-back: ride lifecycle, live subscriptions and inbox, exposed for the binaries and integration tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
