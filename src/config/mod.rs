//! Engine Configuration Module
//!
//! Loads the collector, monitor, snapshot and recovery settings plus the
//! service topology from a TOML file.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line
//! 2. `MESH_HEALER_CONFIG` environment variable (path to TOML file)
//! 3. `mesh_healer.toml` in the current working directory
//! 4. Built-in defaults
//!
//! `MESH_HEALER_ADDR`, `MESH_HEALER_DATA_DIR`, `MESH_HEALER_CORS_ORIGINS` and
//! `MESH_HEALER_ALERT_WEBHOOK` override the file afterwards.
//!
//! The loaded config is passed by `Arc` to each component at construction;
//! there is no process-wide config singleton.

mod engine_config;
pub mod defaults;

pub use engine_config::*;
