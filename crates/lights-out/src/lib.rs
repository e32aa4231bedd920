//! Lights-out agent
//!
//! Serves the action contract and health endpoints over HTTP and optionally
//! drives the work-window loop.

pub mod api;
pub mod config;
