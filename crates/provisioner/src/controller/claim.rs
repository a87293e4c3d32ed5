use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ObjectReference, PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, PostParams};
use tracing::{debug, info, warn};

use super::{
    is_conflict, is_not_found, ObjectKey, Reconcile, ReconcileError, PROVISIONED_BY_ANNOTATION,
};
use crate::provisioner::Provisioner;
use crate::volume::{volume_name_for, ProvisionRequest};

/// Creates volumes for unbound claims that ask for one of our StorageClasses.
pub(crate) struct ClaimReconciler<P> {
    client: kube::Client,
    provisioner: Arc<P>,
    rejected: Rejections,
}

/// The resourceVersion at which each claim failed permanently. A rejected
/// claim is skipped until it is edited.
#[derive(Default)]
pub(crate) struct Rejections(HashMap<ObjectKey, String>);

impl Rejections {
    pub(crate) fn reject(&mut self, key: &ObjectKey, version: &str) {
        self.0.insert(key.clone(), version.to_owned());
    }

    pub(crate) fn clear(&mut self, key: &ObjectKey) {
        self.0.remove(key);
    }

    /// True while the claim is still at the version it was rejected at.
    pub(crate) fn is_unchanged(&self, key: &ObjectKey, version: &str) -> bool {
        self.0.get(key).map_or(false, |rejected| rejected == version)
    }
}

impl<P: Provisioner> ClaimReconciler<P> {
    pub(crate) fn new(client: kube::Client, provisioner: Arc<P>) -> Self {
        ClaimReconciler {
            client,
            provisioner,
            rejected: Rejections::default(),
        }
    }

    async fn provision(
        &self,
        claim: &PersistentVolumeClaim,
        storage_class: &StorageClass,
    ) -> Result<(), ReconcileError> {
        let volume_name = volume_name_for(claim)?;
        let volumes: Api<PersistentVolume> = Api::all(self.client.clone());
        match volumes.get(&volume_name).await {
            Ok(_) => {
                debug!(volume = %volume_name, "Volume already provisioned.");
                return Ok(());
            }
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }

        let request = ProvisionRequest::from_claim(claim, storage_class, &volume_name)?;
        let descriptor = self.provisioner.provision(request).await?;
        let mut volume = descriptor.into_persistent_volume();
        bind_to_claim(&mut volume, claim, storage_class, self.provisioner.name());

        match volumes.create(&PostParams::default(), &volume).await {
            Ok(_) => info!(volume = %volume_name, "Provisioned volume."),
            // Another controller instance got there first with the same name
            Err(e) if is_conflict(&e) => debug!(volume = %volume_name, "Volume already exists."),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

#[async_trait]
impl<P: Provisioner + 'static> Reconcile for ClaimReconciler<P> {
    async fn reconcile(&mut self, key: &ObjectKey) -> Result<(), ReconcileError> {
        let claims: Api<PersistentVolumeClaim> =
            Api::namespaced(self.client.clone(), key.namespace().unwrap_or("default"));
        let claim = match claims.get(key.name()).await {
            Ok(claim) => claim,
            Err(e) if is_not_found(&e) => {
                self.rejected.clear(key);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let class_name = match pending_storage_class(&claim) {
            Some(name) => name,
            None => return Ok(()),
        };
        let version = claim.metadata.resource_version.clone().unwrap_or_default();
        if self.rejected.is_unchanged(key, &version) {
            debug!(claim = %key, "Claim unchanged since it was rejected.");
            return Ok(());
        }

        let classes: Api<StorageClass> = Api::all(self.client.clone());
        let storage_class = match classes.get(class_name).await {
            Ok(class) => class,
            Err(e) if is_not_found(&e) => {
                debug!(claim = %key, storage_class = class_name, "StorageClass not found.");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if storage_class.provisioner != self.provisioner.name() {
            return Ok(());
        }

        if has_selector(&claim) {
            warn!(claim = %key, "claim Selector is not supported");
            self.rejected.reject(key, &version);
            return Ok(());
        }

        debug!(claim = %key, "Provisioning volume for claim.");
        let result = self.provision(&claim, &storage_class).await;
        match &result {
            Err(e) if e.is_permanent() => self.rejected.reject(key, &version),
            _ => self.rejected.clear(key),
        }
        result
    }
}

/// Returns the storage class an unbound, live claim asks for.
///
/// Claims without a class are left to the cluster's default-class machinery.
pub(crate) fn pending_storage_class(claim: &PersistentVolumeClaim) -> Option<&str> {
    if claim.metadata.deletion_timestamp.is_some() {
        return None;
    }
    let spec = claim.spec.as_ref()?;
    if spec.volume_name.as_deref().map_or(false, |name| !name.is_empty()) {
        return None;
    }
    spec.storage_class_name
        .as_deref()
        .filter(|name| !name.is_empty())
}

fn has_selector(claim: &PersistentVolumeClaim) -> bool {
    claim
        .spec
        .as_ref()
        .and_then(|spec| spec.selector.as_ref())
        .is_some()
}

/// Pre-binds a freshly described volume to the claim it was made for.
pub(crate) fn bind_to_claim(
    volume: &mut PersistentVolume,
    claim: &PersistentVolumeClaim,
    storage_class: &StorageClass,
    provisioner_name: &str,
) {
    volume
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(
            PROVISIONED_BY_ANNOTATION.to_owned(),
            provisioner_name.to_owned(),
        );

    let spec = volume.spec.get_or_insert_with(Default::default);
    spec.claim_ref = Some(ObjectReference {
        api_version: Some("v1".to_owned()),
        kind: Some("PersistentVolumeClaim".to_owned()),
        name: claim.metadata.name.clone(),
        namespace: claim.metadata.namespace.clone(),
        uid: claim.metadata.uid.clone(),
        resource_version: claim.metadata.resource_version.clone(),
        ..Default::default()
    });
    spec.storage_class_name = storage_class.metadata.name.clone();
    if spec.mount_options.is_none() {
        spec.mount_options = storage_class.mount_options.clone();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn claim(spec: serde_json::Value) -> PersistentVolumeClaim {
        serde_json::from_value(json!({
            "metadata": {
                "name": "reference-data",
                "namespace": "default",
                "uid": "0000-1111",
                "resourceVersion": "42",
                "labels": { "component": "catalog" }
            },
            "spec": spec
        }))
        .unwrap()
    }

    fn storage_class() -> StorageClass {
        serde_json::from_value(json!({
            "metadata": { "name": "shared-data" },
            "provisioner": "shared-data",
            "reclaimPolicy": "Delete",
            "mountOptions": ["ro"]
        }))
        .unwrap()
    }

    #[test]
    fn unbound_claim_is_pending() {
        let claim = claim(json!({ "storageClassName": "shared-data" }));
        assert_eq!(pending_storage_class(&claim), Some("shared-data"));
    }

    #[test]
    fn bound_claim_is_not_pending() {
        let claim = claim(json!({
            "storageClassName": "shared-data",
            "volumeName": "pvc-0000-1111"
        }));
        assert_eq!(pending_storage_class(&claim), None);
    }

    #[test]
    fn claim_without_class_is_not_pending() {
        assert_eq!(pending_storage_class(&claim(json!({}))), None);
        assert_eq!(
            pending_storage_class(&claim(json!({ "storageClassName": "" }))),
            None
        );
    }

    #[test]
    fn deleted_claim_is_not_pending() {
        let mut claim = claim(json!({ "storageClassName": "shared-data" }));
        claim.metadata.deletion_timestamp =
            serde_json::from_value(json!("2024-01-01T00:00:00Z")).unwrap();
        assert_eq!(pending_storage_class(&claim), None);
    }

    #[test]
    fn selector_is_detected() {
        let claim = claim(json!({
            "storageClassName": "shared-data",
            "selector": { "matchLabels": { "tier": "gold" } }
        }));
        assert!(has_selector(&claim));
    }

    #[test]
    fn volume_is_bound_to_claim() {
        let claim = claim(json!({ "storageClassName": "shared-data" }));
        let mut volume = PersistentVolume::default();

        bind_to_claim(&mut volume, &claim, &storage_class(), "shared-data");

        assert_eq!(
            volume.metadata.annotations.unwrap()[PROVISIONED_BY_ANNOTATION],
            "shared-data"
        );
        let spec = volume.spec.unwrap();
        let claim_ref = spec.claim_ref.unwrap();
        assert_eq!(claim_ref.kind.as_deref(), Some("PersistentVolumeClaim"));
        assert_eq!(claim_ref.name.as_deref(), Some("reference-data"));
        assert_eq!(claim_ref.namespace.as_deref(), Some("default"));
        assert_eq!(claim_ref.uid.as_deref(), Some("0000-1111"));
        assert_eq!(spec.storage_class_name.as_deref(), Some("shared-data"));
        assert_eq!(spec.mount_options, Some(vec!["ro".to_owned()]));
    }

    #[test]
    fn rejected_claim_is_skipped_until_edited() {
        let key = ObjectKey::new(Some("default"), "reference-data");
        let mut rejections = Rejections::default();
        assert!(!rejections.is_unchanged(&key, "42"));

        rejections.reject(&key, "42");
        assert!(rejections.is_unchanged(&key, "42"));
        assert!(!rejections.is_unchanged(&key, "43"));
        assert!(!rejections.is_unchanged(&ObjectKey::new(Some("other"), "reference-data"), "42"));

        rejections.clear(&key);
        assert!(!rejections.is_unchanged(&key, "42"));
    }
}
