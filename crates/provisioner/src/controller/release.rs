use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::api::{Api, DeleteParams};
use tracing::{debug, info};

use super::{is_not_found, ObjectKey, Reconcile, ReconcileError, PROVISIONED_BY_ANNOTATION};
use crate::provisioner::{Provisioner, ReclaimOutcome};
use crate::volume::{ReclaimPolicy, VolumeDescriptor};

const RELEASED_PHASE: &str = "Released";

/// Hands released volumes back to the provisioner and removes their objects
/// once it confirms.
pub(crate) struct ReleaseReconciler<P> {
    client: kube::Client,
    provisioner: Arc<P>,
}

impl<P: Provisioner> ReleaseReconciler<P> {
    pub(crate) fn new(client: kube::Client, provisioner: Arc<P>) -> Self {
        ReleaseReconciler {
            client,
            provisioner,
        }
    }
}

#[async_trait]
impl<P: Provisioner + 'static> Reconcile for ReleaseReconciler<P> {
    async fn reconcile(&mut self, key: &ObjectKey) -> Result<(), ReconcileError> {
        let volumes: Api<PersistentVolume> = Api::all(self.client.clone());
        let volume = match volumes.get(key.name()).await {
            Ok(volume) => volume,
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !needs_reclaim(&volume, self.provisioner.name()) {
            return Ok(());
        }

        let descriptor = VolumeDescriptor::try_from(&volume)?;
        match self.provisioner.delete(&descriptor).await? {
            ReclaimOutcome::Confirmed => {
                match volumes.delete(key.name(), &DeleteParams::default()).await {
                    Ok(_) => info!(volume = %key, "Deleted released volume."),
                    Err(e) if is_not_found(&e) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            ReclaimOutcome::Ignored(reason) => {
                debug!(volume = %key, %reason, "Ignoring released volume.");
            }
        }
        Ok(())
    }
}

/// A volume is ours to reclaim once it is released, asks to be deleted and was
/// provisioned under our name.
pub(crate) fn needs_reclaim(volume: &PersistentVolume, provisioner_name: &str) -> bool {
    if volume.metadata.deletion_timestamp.is_some() {
        return false;
    }
    let released = volume
        .status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some(RELEASED_PHASE);
    let delete_policy = volume
        .spec
        .as_ref()
        .and_then(|spec| spec.persistent_volume_reclaim_policy.as_deref())
        == Some(ReclaimPolicy::Delete.as_str());
    let provisioned_by_us = volume
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(PROVISIONED_BY_ANNOTATION))
        .map_or(false, |name| name == provisioner_name);

    released && delete_policy && provisioned_by_us
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn volume(phase: &str, policy: &str, provisioned_by: &str) -> PersistentVolume {
        serde_json::from_value(json!({
            "metadata": {
                "name": "pvc-0000-1111",
                "annotations": {
                    "pv.kubernetes.io/provisioned-by": provisioned_by,
                    "sharedDataProvisionerIdentity": "node-a"
                }
            },
            "spec": {
                "accessModes": ["ReadOnlyMany"],
                "persistentVolumeReclaimPolicy": policy,
                "hostPath": { "path": "/var/shared-data/catalog" }
            },
            "status": { "phase": phase }
        }))
        .unwrap()
    }

    #[test]
    fn released_delete_volume_of_ours_needs_reclaim() {
        assert!(needs_reclaim(
            &volume("Released", "Delete", "shared-data"),
            "shared-data"
        ));
    }

    #[test]
    fn bound_volume_is_left_alone() {
        assert!(!needs_reclaim(
            &volume("Bound", "Delete", "shared-data"),
            "shared-data"
        ));
    }

    #[test]
    fn retained_volume_is_left_alone() {
        assert!(!needs_reclaim(
            &volume("Released", "Retain", "shared-data"),
            "shared-data"
        ));
    }

    #[test]
    fn volume_of_other_provisioner_is_left_alone() {
        assert!(!needs_reclaim(
            &volume("Released", "Delete", "kubernetes.io/no-provisioner"),
            "shared-data"
        ));
    }
}
