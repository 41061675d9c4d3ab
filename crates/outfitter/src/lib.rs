//! Outfitter - idempotent GitLab provisioning for a merge-request
//! integration.
//!
//! Given a desired-state configuration (root groups, projects, webhook
//! template, auth mode), outfitter converges each target to exactly one
//! integration access token and one webhook, creating or updating only
//! what drifted, and reports everything it did, skipped, or failed.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use outfitter::{GitLabClient, Provisioner, ReqwestTransport};
//!
//! let transport = Arc::new(ReqwestTransport::with_timeout(Duration::from_secs(30))?);
//! let client = GitLabClient::new(&config.gitlab_base_url, &token, config.dry_run, transport);
//! let mut provisioner = Provisioner::new(config, client);
//! let status = provisioner.run().await;
//! std::process::exit(status.code());
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod provision;
pub mod report;
pub mod resolve;
pub mod token;
pub mod types;
pub mod webhook;

pub use config::{AuthMode, Config, ConfigError, WebhookConfig};
pub use error::GitLabError;
pub use gateway::{GitLabClient, Mutation};
pub use http::{HttpTransport, ReqwestTransport};
pub use provision::{ExitStatus, Provisioner};
pub use report::{ActionReport, CheckResult, CheckStatus};
