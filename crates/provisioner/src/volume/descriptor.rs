use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use k8s_openapi::api::core::v1::{HostPathVolumeSource, PersistentVolume, PersistentVolumeSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;

use super::{AccessMode, Error, Identity, ReclaimPolicy};

/// Annotation holding the identity of the provisioner instance that created a
/// volume.
pub const IDENTITY_ANNOTATION: &str = "sharedDataProvisionerIdentity";

const STORAGE_RESOURCE: &str = "storage";

/// A volume as the provisioner sees it: a host directory plus the metadata
/// needed to recognize it again at release time.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeDescriptor {
    /// Name of the PersistentVolume.
    pub name: String,
    /// Who created the volume. `None` only for volumes read back from objects
    /// that lost or never had the annotation.
    pub owner_identity: Option<Identity>,
    /// What to do once the claim goes away.
    pub reclaim_policy: ReclaimPolicy,
    /// How consumers may mount the volume.
    pub access_mode: AccessMode,
    /// Nominal size. Never measured or enforced.
    pub capacity: Option<Quantity>,
    /// Directory on the node backing the volume.
    pub host_path: PathBuf,
}

impl VolumeDescriptor {
    /// Renders the descriptor as a PersistentVolume object. Binding to the
    /// claim is left to the caller.
    pub fn into_persistent_volume(self) -> PersistentVolume {
        let annotations = self.owner_identity.map(|identity| {
            let mut annotations = BTreeMap::new();
            annotations.insert(IDENTITY_ANNOTATION.to_owned(), identity.to_string());
            annotations
        });
        let capacity = self.capacity.map(|quantity| {
            let mut capacity = BTreeMap::new();
            capacity.insert(STORAGE_RESOURCE.to_owned(), quantity);
            capacity
        });

        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(self.name),
                annotations,
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                persistent_volume_reclaim_policy: Some(self.reclaim_policy.to_string()),
                access_modes: Some(vec![self.access_mode.to_string()]),
                capacity,
                host_path: Some(HostPathVolumeSource {
                    path: self.host_path.to_string_lossy().into_owned(),
                    type_: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl TryFrom<&PersistentVolume> for VolumeDescriptor {
    type Error = Error;

    fn try_from(volume: &PersistentVolume) -> Result<Self, Self::Error> {
        let name = volume
            .metadata
            .name
            .clone()
            .ok_or(Error::MissingField("metadata.name"))?;
        let owner_identity = volume
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(IDENTITY_ANNOTATION))
            .map(|identity| Identity::new(identity.as_str()));
        let spec = volume
            .spec
            .as_ref()
            .ok_or(Error::MissingField("spec"))?;

        let reclaim_policy = match &spec.persistent_volume_reclaim_policy {
            Some(policy) => ReclaimPolicy::from_str(policy)?,
            None => ReclaimPolicy::default(),
        };
        let access_mode = spec
            .access_modes
            .as_ref()
            .and_then(|modes| modes.first())
            .ok_or(Error::MissingField("spec.accessModes"))
            .and_then(|mode| AccessMode::from_str(mode))?;
        let host_path = spec
            .host_path
            .as_ref()
            .map(|source| PathBuf::from(&source.path))
            .ok_or(Error::MissingField("spec.hostPath"))?;
        let capacity = spec
            .capacity
            .as_ref()
            .and_then(|capacity| capacity.get(STORAGE_RESOURCE))
            .cloned();

        Ok(VolumeDescriptor {
            name,
            owner_identity,
            reclaim_policy,
            access_mode,
            capacity,
            host_path,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn descriptor() -> VolumeDescriptor {
        VolumeDescriptor {
            name: "pvc-1".to_owned(),
            owner_identity: Some(Identity::new("node-a")),
            reclaim_policy: ReclaimPolicy::Delete,
            access_mode: AccessMode::ReadOnlyMany,
            capacity: Some(Quantity("1Gi".to_owned())),
            host_path: PathBuf::from("/data/catalog"),
        }
    }

    #[test]
    fn persistent_volume_carries_identity_and_host_path() {
        let pv = descriptor().into_persistent_volume();

        assert_eq!(pv.metadata.name.as_deref(), Some("pvc-1"));
        assert_eq!(
            pv.metadata.annotations.as_ref().unwrap()[IDENTITY_ANNOTATION],
            "node-a"
        );
        let spec = pv.spec.unwrap();
        assert_eq!(spec.access_modes, Some(vec!["ReadOnlyMany".to_owned()]));
        assert_eq!(spec.persistent_volume_reclaim_policy.as_deref(), Some("Delete"));
        assert_eq!(spec.capacity.unwrap()["storage"], Quantity("1Gi".to_owned()));
        assert_eq!(spec.host_path.unwrap().path, "/data/catalog");
    }

    #[test]
    fn descriptor_reads_back_from_persistent_volume() {
        let pv = descriptor().into_persistent_volume();
        assert_eq!(VolumeDescriptor::try_from(&pv).unwrap(), descriptor());
    }

    #[test]
    fn missing_annotation_reads_back_as_no_identity() {
        let pv: PersistentVolume = serde_json::from_value(json!({
            "metadata": { "name": "pvc-2" },
            "spec": {
                "accessModes": ["ReadOnlyMany"],
                "persistentVolumeReclaimPolicy": "Delete",
                "hostPath": { "path": "/data/catalog" }
            }
        }))
        .unwrap();

        let descriptor = VolumeDescriptor::try_from(&pv).unwrap();
        assert_eq!(descriptor.owner_identity, None);
        assert_eq!(descriptor.capacity, None);
    }

    #[test]
    fn non_host_path_volume_is_rejected() {
        let pv: PersistentVolume = serde_json::from_value(json!({
            "metadata": { "name": "pvc-3" },
            "spec": {
                "accessModes": ["ReadWriteOnce"],
                "nfs": { "server": "nfs.local", "path": "/exports" }
            }
        }))
        .unwrap();

        assert!(matches!(
            VolumeDescriptor::try_from(&pv),
            Err(Error::MissingField("spec.hostPath"))
        ));
    }
}
