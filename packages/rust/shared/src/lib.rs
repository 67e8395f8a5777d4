//! Shared types, error model, and configuration for LinkScout.
//!
//! This crate is the foundation depended on by all other LinkScout crates.
//! It provides:
//! - [`LinkScoutError`] — the unified error type
//! - Pipeline state types ([`PipelineState`], [`LinkSearchInput`], [`LinkSearchOutput`])
//! - Configuration ([`AppConfig`], [`BridgeConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BridgeConfig, DefaultsConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, validate_api_key,
};
pub use error::{LinkScoutError, Result};
pub use types::{
    LINK_URLS_KEY, LinkSearchInput, LinkSearchOutput, PARSED_DOC_KEY, PipelineState,
    RELEVANT_LINKS_KEY, RelevantLinks, USER_PROMPT_KEY,
};
