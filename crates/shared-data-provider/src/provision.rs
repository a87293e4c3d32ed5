//! Describes the volume a resolved dataset directory becomes.
use provisioner::volume::{AccessMode, Identity, ProvisionRequest, VolumeDescriptor};

use crate::resolver::ResolvedPath;

/// Describes the volume exposing `resolved` for `request`, owned by `identity`.
///
/// The request's component must already have been resolved, which is why this
/// takes a [`ResolvedPath`] and cannot fail. No I/O happens here and the same
/// inputs always produce the same descriptor.
pub fn provision(
    request: ProvisionRequest,
    resolved: ResolvedPath,
    identity: &Identity,
) -> VolumeDescriptor {
    VolumeDescriptor {
        name: request.volume_name,
        owner_identity: Some(identity.clone()),
        reclaim_policy: request.reclaim_policy,
        // Many consumers may mount the same directory at once
        access_mode: AccessMode::ReadOnlyMany,
        // Reported only, the directory size is neither measured nor enforced
        capacity: request.requested_capacity,
        host_path: resolved.into_path_buf(),
    }
}
