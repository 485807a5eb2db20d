//! Storage layer for the turtle router
//!
//! Only configuration is persisted, as human-readable JSON. Caches, tunnels
//! and statistics live in memory and die with the process.
//!
//! # Example
//!
//! ```no_run
//! use turtle_router::storage::config::{load_config, save_config, TurtleConfig};
//! use std::path::Path;
//!
//! let config = TurtleConfig::default().with_max_tunnel_depth(5);
//! save_config(Path::new("turtle.json"), &config).unwrap();
//!
//! let loaded = load_config(Path::new("turtle.json")).unwrap();
//! assert_eq!(loaded.max_tunnel_depth, 5);
//! ```

pub mod config;

pub use config::{config_exists, default_config, load_config, save_config, TurtleConfig};
