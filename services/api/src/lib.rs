//! services/api/src/lib.rs
//!
//! The HTTP service around `schedule_core`: store adapters, configuration and
//! the Axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
