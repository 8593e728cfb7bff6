//! Configuration module for the dataprovider.
//!
//! Handles backend settings, generic domains and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, split_column, DomainSettings, RelationSettings, RelationalSettings,
    SearchSettings, Settings, SettingsError, TableSettings,
};
