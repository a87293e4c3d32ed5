//! Traits and types needed to create backend provisioners.
use async_trait::async_trait;

use crate::error::{ProvisionError, ReclaimError};
use crate::volume::{ProvisionRequest, VolumeDescriptor};

/// A back-end for a [`Controller`](crate::Controller).
///
/// The primary responsibility of a Provisioner is to decide whether a claim can
/// be satisfied and to describe the volume that satisfies it. Talking to the API
/// server, binding, retrying and backing off are the controller's job, so
/// implementations stay free of Kubernetes client code and can be tested on
/// their own.
///
/// Calls for different objects may run concurrently, so implementations must
/// not rely on being called one at a time.
///
/// **Note**: this trait is defined using [async-trait](https://crates.io/crates/async-trait) which
/// allows for the use of async methods on traits.
///
/// # Example
/// ```rust
/// use async_trait::async_trait;
/// use provisioner::volume::{ProvisionRequest, VolumeDescriptor};
/// use provisioner::{ProvisionError, Provisioner, ReclaimError, ReclaimOutcome};
///
/// struct MyProvisioner;
///
/// #[async_trait]
/// impl Provisioner for MyProvisioner {
///     fn name(&self) -> &str {
///         "example.com/my-provisioner"
///     }
///
///     async fn provision(
///         &self,
///         request: ProvisionRequest,
///     ) -> Result<VolumeDescriptor, ProvisionError> {
///         todo!("Implement Provisioner::provision")
///     }
///
///     // Implement the rest of the methods using `async` for the ones that return futures ...
///     # async fn delete(&self, volume: &VolumeDescriptor) -> Result<ReclaimOutcome, ReclaimError> { todo!() }
/// }
/// ```
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// The name StorageClasses use in their `provisioner` field to select this
    /// provisioner.
    fn name(&self) -> &str;

    /// Given a pending claim, describe the volume that satisfies it.
    ///
    /// Every call is terminal: it either returns the finished volume or a
    /// classified failure. Calling again with the same request must give the
    /// same answer.
    async fn provision(
        &self,
        request: ProvisionRequest,
    ) -> Result<VolumeDescriptor, ProvisionError>;

    /// Given a released volume, decide whether the controller may remove it.
    ///
    /// This does not need to delete the PersistentVolume object itself, the
    /// controller does that after [`ReclaimOutcome::Confirmed`].
    async fn delete(&self, volume: &VolumeDescriptor) -> Result<ReclaimOutcome, ReclaimError>;
}

/// The answer to a release request that is not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// The volume is released and its object may be removed.
    Confirmed,
    /// The volume belongs to somebody else; leave it alone and do not retry.
    Ignored(String),
}
