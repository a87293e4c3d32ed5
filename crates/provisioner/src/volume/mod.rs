//! The values exchanged between the [`Controller`](crate::Controller) and a
//! [`Provisioner`](crate::Provisioner), and their mapping to Kubernetes
//! PersistentVolumeClaim and PersistentVolume objects.
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

mod claim;
mod descriptor;

pub use claim::{volume_name_for, ProvisionRequest, COMPONENT_LABEL};
pub use descriptor::{VolumeDescriptor, IDENTITY_ANNOTATION};

/// Error describes objects that cannot be mapped to or from the provisioner's
/// values.
#[derive(Error, Debug)]
pub enum Error {
    /// An unrecognized `persistentVolumeReclaimPolicy`.
    #[error("bad reclaim policy {0:?}")]
    BadReclaimPolicy(String),
    /// An unrecognized access mode.
    #[error("bad access mode {0:?}")]
    BadAccessMode(String),
    /// A field the mapping depends on is unset.
    #[error("object is missing required field {0}")]
    MissingField(&'static str),
}

/// Identifies one running provisioner instance. It is set once from the name of
/// the node the provisioner runs on.
///
/// Node names repeat across clusters, so treat this as a coarse ownership tag
/// and never as an authorization boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Wraps a node name.
    pub fn new(identity: impl Into<String>) -> Self {
        Identity(identity.into())
    }

    /// The identity as it is written into volume annotations.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(identity: &str) -> Self {
        Identity::new(identity)
    }
}

impl From<String> for Identity {
    fn from(identity: String) -> Self {
        Identity(identity)
    }
}

/// What happens to a volume once its claim is released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReclaimPolicy {
    /// Hand the volume back to the provisioner for cleanup.
    Delete,
    /// Deprecated upstream; kept so existing objects still parse.
    Recycle,
    /// Leave the volume for an administrator.
    Retain,
}

impl ReclaimPolicy {
    /// The Kubernetes spelling of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReclaimPolicy::Delete => "Delete",
            ReclaimPolicy::Recycle => "Recycle",
            ReclaimPolicy::Retain => "Retain",
        }
    }
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        ReclaimPolicy::Delete
    }
}

impl FromStr for ReclaimPolicy {
    type Err = Error;

    // "Delete" is implied when the storage class leaves the policy out.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Delete" => Ok(ReclaimPolicy::Delete),
            "Recycle" => Ok(ReclaimPolicy::Recycle),
            "Retain" => Ok(ReclaimPolicy::Retain),
            "" => Ok(ReclaimPolicy::Delete),
            _ => Err(Error::BadReclaimPolicy(s.to_owned())),
        }
    }
}

impl fmt::Display for ReclaimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a volume may be mounted by its consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum AccessMode {
    /// Mounted read-only by any number of nodes.
    ReadOnlyMany,
    /// Mounted read-write by any number of nodes.
    ReadWriteMany,
    /// Mounted read-write by a single node.
    ReadWriteOnce,
}

impl AccessMode {
    /// The Kubernetes spelling of the access mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::ReadOnlyMany => "ReadOnlyMany",
            AccessMode::ReadWriteMany => "ReadWriteMany",
            AccessMode::ReadWriteOnce => "ReadWriteOnce",
        }
    }
}

impl FromStr for AccessMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ReadOnlyMany" => Ok(AccessMode::ReadOnlyMany),
            "ReadWriteMany" => Ok(AccessMode::ReadWriteMany),
            "ReadWriteOnce" => Ok(AccessMode::ReadWriteOnce),
            _ => Err(Error::BadAccessMode(s.to_owned())),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_reclaim_policy_means_delete() {
        assert_eq!(ReclaimPolicy::from_str("").unwrap(), ReclaimPolicy::Delete);
        assert_eq!(
            ReclaimPolicy::from_str("Retain").unwrap(),
            ReclaimPolicy::Retain
        );
        assert!(matches!(
            ReclaimPolicy::from_str("Shred"),
            Err(Error::BadReclaimPolicy(p)) if p == "Shred"
        ));
    }

    #[test]
    fn access_mode_uses_kubernetes_spelling() {
        assert_eq!(AccessMode::ReadOnlyMany.to_string(), "ReadOnlyMany");
        assert_eq!(
            AccessMode::from_str("ReadWriteOnce").unwrap(),
            AccessMode::ReadWriteOnce
        );
        assert!(AccessMode::from_str("readonlymany").is_err());
    }
}
