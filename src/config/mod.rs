//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → registry.rs (per-API profiles, RequestConfig built once)
//!     → apply_to(envelope) hands each envelope its own copy
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → registry.rs validates and swaps profiles atomically
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A rejected reload leaves the current profiles in place

pub mod loader;
pub mod registry;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use registry::{ApiProfile, ApiRegistry};
pub use schema::{AdvancedSettings, ApiConfig, EnvelopeSettings, ObservabilityConfig, ProxyConfig};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
