//! A provisioner that binds claims to directories that already exist on the
//! node.
//!
//! Each claim names a dataset through its `component` label. The dataset is the
//! directory `<base dir>/<component>`, populated by some other process before
//! any claim asks for it. Volumes are handed out read-only to any number of
//! consumers and the data behind them is never created, modified or deleted
//! here.
//!
//! ```rust
//! use provisioner::config::Config;
//! use provisioner::Provisioner;
//! use shared_data_provider::SharedDataProvisioner;
//!
//! let config = Config::new("node-a").with_base_dir("/var/shared-data");
//! let provisioner = SharedDataProvisioner::new(&config);
//! assert_eq!(provisioner.name(), "shared-data");
//! ```
//!
//! The provisioner is driven by a [`provisioner::Controller`].

#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use provisioner::config::Config;
use provisioner::volume::{Identity, ProvisionRequest, VolumeDescriptor};
use provisioner::{ProvisionError, Provisioner, ReclaimError, ReclaimOutcome};

pub mod provision;
pub mod reclaim;
pub mod resolver;

/// SharedDataProvisioner exposes pre-populated host directories as
/// read-only volumes.
///
/// It holds nothing but its immutable settings, so one instance can serve any
/// number of concurrent calls.
#[derive(Clone, Debug)]
pub struct SharedDataProvisioner {
    name: String,
    base_dir: PathBuf,
    identity: Identity,
}

impl SharedDataProvisioner {
    /// Create a provisioner from its configuration.
    pub fn new(config: &Config) -> Self {
        SharedDataProvisioner {
            name: config.provisioner_name.clone(),
            base_dir: config.base_dir.clone(),
            identity: config.identity(),
        }
    }

    /// The directory datasets are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The identity stamped on every volume this instance provisions.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

#[async_trait]
impl Provisioner for SharedDataProvisioner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn provision(
        &self,
        request: ProvisionRequest,
    ) -> Result<VolumeDescriptor, ProvisionError> {
        let resolved = resolver::resolve(&self.base_dir, &request.component)?;
        Ok(provision::provision(request, resolved, &self.identity))
    }

    async fn delete(&self, volume: &VolumeDescriptor) -> Result<ReclaimOutcome, ReclaimError> {
        reclaim::reclaim(volume, &self.identity)
    }
}
