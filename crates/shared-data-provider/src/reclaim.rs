//! Decides whether a released volume belongs to this provisioner instance.
use provisioner::volume::{Identity, VolumeDescriptor};
use provisioner::{ReclaimError, ReclaimOutcome};

/// Reason given when a volume belongs to another provisioner instance.
pub const IDENTITY_MISMATCH: &str = "identity mismatch";

/// Decides what releasing `volume` means for the instance called `identity`.
///
/// Shared data is never deleted. A volume we own is confirmed as released and
/// nothing else happens; a volume owned by another instance is ignored.
pub fn reclaim(
    volume: &VolumeDescriptor,
    identity: &Identity,
) -> Result<ReclaimOutcome, ReclaimError> {
    let owner = volume
        .owner_identity
        .as_ref()
        .ok_or_else(|| ReclaimError::MissingIdentityAnnotation {
            volume: volume.name.clone(),
        })?;
    if owner != identity {
        return Ok(ReclaimOutcome::Ignored(IDENTITY_MISMATCH.to_owned()));
    }
    Ok(ReclaimOutcome::Confirmed)
}
