use std::str::FromStr;

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::{Error, ReclaimPolicy};

/// The claim label naming the shared dataset to mount.
pub const COMPONENT_LABEL: &str = "component";

const STORAGE_RESOURCE: &str = "storage";

/// Everything a [`Provisioner`](crate::Provisioner) needs to know about a
/// pending claim. Built fresh for every attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct ProvisionRequest {
    /// Raw value of the claim's `component` label. It is untrusted and may be
    /// empty.
    pub component: String,
    /// The `storage` request of the claim, if any.
    pub requested_capacity: Option<Quantity>,
    /// Taken from the claim's storage class.
    pub reclaim_policy: ReclaimPolicy,
    /// Name the resulting volume must carry. Assigned by the caller.
    pub volume_name: String,
}

impl ProvisionRequest {
    /// Extracts a request from a claim and the storage class it asked for.
    ///
    /// A missing `component` label becomes an empty component; rejecting it is
    /// left to the provisioner.
    pub fn from_claim(
        claim: &PersistentVolumeClaim,
        storage_class: &StorageClass,
        volume_name: &str,
    ) -> Result<Self, Error> {
        let component = claim
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(COMPONENT_LABEL))
            .cloned()
            .unwrap_or_default();

        let requested_capacity = claim
            .spec
            .as_ref()
            .and_then(|spec| spec.resources.as_ref())
            .and_then(|resources| resources.requests.as_ref())
            .and_then(|requests| requests.get(STORAGE_RESOURCE))
            .cloned();

        let reclaim_policy = match &storage_class.reclaim_policy {
            Some(policy) => ReclaimPolicy::from_str(policy)?,
            None => ReclaimPolicy::default(),
        };

        Ok(ProvisionRequest {
            component,
            requested_capacity,
            reclaim_policy,
            volume_name: volume_name.to_owned(),
        })
    }
}

/// Name of the volume provisioned for a claim, derived from the claim's UID so
/// that every controller instance picks the same name.
pub fn volume_name_for(claim: &PersistentVolumeClaim) -> Result<String, Error> {
    let uid = claim
        .metadata
        .uid
        .as_ref()
        .ok_or(Error::MissingField("metadata.uid"))?;
    Ok(format!("pvc-{}", uid))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn claim(labels: serde_json::Value) -> PersistentVolumeClaim {
        serde_json::from_value(json!({
            "metadata": {
                "name": "reference-data",
                "namespace": "default",
                "uid": "8f0e5d3a-1b2c-4d5e-9f00-112233445566",
                "labels": labels,
            },
            "spec": {
                "accessModes": ["ReadOnlyMany"],
                "storageClassName": "shared-data",
                "resources": {
                    "requests": { "storage": "5Gi" }
                }
            }
        }))
        .unwrap()
    }

    fn storage_class(reclaim_policy: Option<&str>) -> StorageClass {
        serde_json::from_value(json!({
            "metadata": { "name": "shared-data" },
            "provisioner": "shared-data",
            "reclaimPolicy": reclaim_policy,
        }))
        .unwrap()
    }

    #[test]
    fn request_copies_label_capacity_and_policy() {
        let claim = claim(json!({ "component": "catalog" }));
        let request =
            ProvisionRequest::from_claim(&claim, &storage_class(Some("Retain")), "pvc-1").unwrap();

        assert_eq!(request.component, "catalog");
        assert_eq!(request.requested_capacity, Some(Quantity("5Gi".to_owned())));
        assert_eq!(request.reclaim_policy, ReclaimPolicy::Retain);
        assert_eq!(request.volume_name, "pvc-1");
    }

    #[test]
    fn missing_label_yields_empty_component() {
        let claim = claim(json!({ "app": "web" }));
        let request =
            ProvisionRequest::from_claim(&claim, &storage_class(None), "pvc-1").unwrap();

        assert_eq!(request.component, "");
        assert_eq!(request.reclaim_policy, ReclaimPolicy::Delete);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let claim = claim(json!({ "component": "catalog" }));
        let result = ProvisionRequest::from_claim(&claim, &storage_class(Some("Shred")), "pvc-1");
        assert!(matches!(result, Err(Error::BadReclaimPolicy(_))));
    }

    #[test]
    fn volume_name_comes_from_uid() {
        let claim = claim(json!({}));
        assert_eq!(
            volume_name_for(&claim).unwrap(),
            "pvc-8f0e5d3a-1b2c-4d5e-9f00-112233445566"
        );

        let mut anonymous = claim;
        anonymous.metadata.uid = None;
        assert!(matches!(
            volume_name_for(&anonymous),
            Err(Error::MissingField("metadata.uid"))
        ));
    }
}
