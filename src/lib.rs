// ABOUTME: Library root for upshift - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod output;
pub mod runtime;
pub mod self_update;
pub mod status;
pub mod types;
pub mod upgrade;
