//! YAML configuration file loading.
//!
//! Example configuration:
//! ```yaml
//! gitlab_base_url: https://gitlab.example.com
//! auth_mode: group_token_per_root_group
//! webhooks:
//!   merge_request_url: https://hooks.example.com/gitlab
//!   # secret_token: optional, auto-generated when omitted
//! root_groups:
//!   - engineering
//! projects:
//!   - engineering/auth
//! token_expires_in_days: 365
//! ```

use std::path::Path;

use config::{File, FileFormat};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Load and deserialize the YAML configuration at `path`.
pub fn load(path: &Path) -> Result<outfitter::Config, ConfigFileError> {
    let settings = config::Config::builder()
        .add_source(File::from(path.to_path_buf()).format(FileFormat::Yaml))
        .build()?;
    Ok(settings.try_deserialize::<outfitter::Config>()?)
}
