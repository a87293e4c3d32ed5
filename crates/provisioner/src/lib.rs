//! A crate for building Kubernetes [external volume provisioners](https://kubernetes.io/docs/concepts/storage/dynamic-provisioning/).
//!
//! The crate provides the [`Provisioner`] trait for declaring the backend that
//! decides how a claim becomes a volume, as well as the [`Controller`] type which
//! takes a [`Provisioner`] and drives it from PersistentVolumeClaim and
//! PersistentVolume watch events.
//!
//! # Example
//! ```rust,no_run
//! use provisioner::config::Config;
//! use provisioner::volume::{ProvisionRequest, VolumeDescriptor};
//! use provisioner::{Controller, ProvisionError, Provisioner, ReclaimError, ReclaimOutcome};
//!
//! struct MyProvisioner;
//!
//! #[async_trait::async_trait]
//! impl Provisioner for MyProvisioner {
//!     fn name(&self) -> &str {
//!         "example.com/my-provisioner"
//!     }
//!
//!     async fn provision(
//!         &self,
//!         request: ProvisionRequest,
//!     ) -> Result<VolumeDescriptor, ProvisionError> {
//!         todo!("Implement Provisioner::provision")
//!     }
//!
//!     // Implement the rest of the methods
//!     # async fn delete(&self, volume: &VolumeDescriptor) -> Result<ReclaimOutcome, ReclaimError> { todo!() }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new("node-1");
//!     let kubeconfig = kube::Config::infer().await?;
//!     let client = kube::Client::try_from(kubeconfig)?;
//!     Controller::new(client, MyProvisioner, &config).start().await
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(feature = "docs", feature(doc_cfg))]

pub mod config;
pub mod controller;
pub mod error;
pub mod provisioner;
pub mod volume;

#[doc(inline)]
pub use controller::Controller;
#[doc(inline)]
pub use error::{ProvisionError, ReclaimError};
#[doc(inline)]
pub use provisioner::{Provisioner, ReclaimOutcome};
