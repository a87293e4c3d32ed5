//! Drives a [`Provisioner`] from PersistentVolumeClaim and PersistentVolume
//! watch events.
//!
//! Each kind of object gets its own watcher task feeding object keys into a
//! work queue, and one worker draining that queue. Objects that fail to
//! reconcile are retried with exponential backoff unless the failure is
//! permanent.
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::{Api, ListParams};
use kube::error::ErrorResponse;
use kube::{Resource, ResourceExt};
use kube_runtime::watcher::{watcher, Event};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{ProvisionError, ReclaimError};
use crate::provisioner::Provisioner;
use crate::volume;

mod claim;
mod queue;
mod release;

use claim::ClaimReconciler;
use queue::{QueueHandle, WorkQueue};
use release::ReleaseReconciler;

/// Annotation naming the provisioner responsible for a volume. Set on every
/// volume the controller creates and checked before any volume is reclaimed.
pub const PROVISIONED_BY_ANNOTATION: &str = "pv.kubernetes.io/provisioned-by";

const QUEUE_BUFFER: usize = 32;

/// Runs a [`Provisioner`] against the cluster.
///
/// The controller watches claims across all namespaces, asks the provisioner
/// for a volume whenever an unbound claim names a StorageClass owned by the
/// provisioner, and creates the resulting PersistentVolume pre-bound to the
/// claim. Released volumes with a `Delete` policy are handed to
/// [`Provisioner::delete`] and their objects removed once it confirms.
pub struct Controller<P> {
    client: kube::Client,
    provisioner: Arc<P>,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
}

impl<P: Provisioner + 'static> Controller<P> {
    /// Create a new controller for a provisioner. Retry timing comes from the
    /// given config.
    pub fn new(client: kube::Client, provisioner: P, config: &Config) -> Self {
        Controller {
            client,
            provisioner: Arc::new(provisioner),
            retry_base_delay: config.retry_base_delay,
            retry_max_delay: config.retry_max_delay,
        }
    }

    /// Start watching and reconciling. Only returns if a worker fails.
    pub async fn start(self) -> anyhow::Result<()> {
        info!(
            provisioner = self.provisioner.name(),
            "Starting provisioner controller."
        );
        let claims = run_worker(
            Api::<PersistentVolumeClaim>::all(self.client.clone()),
            ClaimReconciler::new(self.client.clone(), Arc::clone(&self.provisioner)),
            self.queue(),
        );
        let volumes = run_worker(
            Api::<PersistentVolume>::all(self.client.clone()),
            ReleaseReconciler::new(self.client.clone(), Arc::clone(&self.provisioner)),
            self.queue(),
        );
        futures::future::try_join(claims, volumes).await?;
        Ok(())
    }

    fn queue(&self) -> WorkQueue {
        WorkQueue::new(QUEUE_BUFFER, self.retry_base_delay, self.retry_max_delay)
    }
}

/// Identifies an object independently of its version.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub(crate) struct ObjectKey {
    namespace: Option<String>,
    name: String,
}

impl ObjectKey {
    pub(crate) fn new(namespace: Option<&str>, name: &str) -> Self {
        ObjectKey {
            namespace: namespace.map(str::to_owned),
            name: name.to_owned(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl<R: Resource> From<&R> for ObjectKey {
    fn from(object: &R) -> ObjectKey {
        ObjectKey {
            namespace: object.namespace(),
            name: object.name(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Everything that can stop one object from reconciling.
#[derive(Error, Debug)]
pub(crate) enum ReconcileError {
    #[error("kubernetes API request failed: {0}")]
    Kube(#[from] kube::Error),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Reclaim(#[from] ReclaimError),
    #[error(transparent)]
    Volume(#[from] volume::Error),
}

impl ReconcileError {
    /// Permanent failures are not retried until the object changes.
    pub(crate) fn is_permanent(&self) -> bool {
        match self {
            ReconcileError::Kube(_) => false,
            ReconcileError::Provision(e) => e.is_permanent(),
            ReconcileError::Reclaim(_) => true,
            ReconcileError::Volume(_) => true,
        }
    }
}

/// Brings one object in line with the provisioner's view of it.
#[async_trait]
pub(crate) trait Reconcile: Send {
    /// Must be safe to call any number of times for the same key.
    async fn reconcile(&mut self, key: &ObjectKey) -> Result<(), ReconcileError>;
}

pub(crate) fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(ErrorResponse { code: 404, .. }))
}

pub(crate) fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(ErrorResponse { code: 409, .. }))
}

async fn run_worker<K, R>(
    api: Api<K>,
    mut reconciler: R,
    mut queue: WorkQueue,
) -> anyhow::Result<()>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R: Reconcile,
{
    let kind = K::kind(&()).to_string();
    let watcher = tokio::spawn(launch_watcher(api, queue.handle()));

    while let Some(key) = queue.next().await {
        match reconciler.reconcile(&key).await {
            Ok(()) => queue.forget(&key),
            Err(error) if error.is_permanent() => {
                error!(
                    kind = kind.as_str(),
                    object = %key,
                    %error,
                    "Giving up on object until it changes."
                );
                queue.forget(&key);
            }
            Err(error) => match queue.requeue(key.clone()).await {
                Some(delay) => warn!(
                    kind = kind.as_str(),
                    object = %key,
                    %error,
                    ?delay,
                    "Failed to reconcile object, retrying."
                ),
                None => warn!(
                    kind = kind.as_str(),
                    object = %key,
                    %error,
                    "Failed to reconcile object, retry already pending."
                ),
            },
        }
    }

    watcher.abort();
    Ok(())
}

/// Watcher task which forwards the key of every changed object to the work
/// queue.
async fn launch_watcher<K>(api: Api<K>, queue: QueueHandle)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + 'static,
{
    info!(kind = &*K::kind(&()), "Starting watcher.");
    let mut watcher = watcher(api, ListParams::default()).boxed();
    loop {
        let keys: Vec<ObjectKey> = match watcher.try_next().await {
            Ok(Some(Event::Applied(object))) | Ok(Some(Event::Deleted(object))) => {
                vec![ObjectKey::from(&object)]
            }
            Ok(Some(Event::Restarted(objects))) => {
                objects.iter().map(ObjectKey::from).collect()
            }
            Ok(None) => break,
            Err(error) => {
                warn!(?error, "Error streaming object events.");
                // The watcher re-lists on the next poll; keep that off the
                // API server's hot path
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        for key in keys {
            if !queue.add(key).await {
                return;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn object_key_display() {
        assert_eq!(
            ObjectKey::new(Some("default"), "data").to_string(),
            "default/data"
        );
        assert_eq!(ObjectKey::new(None, "pvc-1").to_string(), "pvc-1");
    }

    #[test]
    fn object_key_from_claim() {
        let claim: PersistentVolumeClaim = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "data", "namespace": "team-a" }
        }))
        .unwrap();
        let key = ObjectKey::from(&claim);
        assert_eq!(key.name(), "data");
        assert_eq!(key.namespace(), Some("team-a"));
    }

    #[test]
    fn only_invalid_input_is_permanent() {
        let transient = ReconcileError::from(ProvisionError::NotADirectory {
            path: PathBuf::from("/data/catalog"),
        });
        assert!(!transient.is_permanent());

        let permanent = ReconcileError::from(ProvisionError::InvalidComponent {
            component: String::new(),
            reason: "is empty or not defined",
        });
        assert!(permanent.is_permanent());

        let corrupt = ReconcileError::from(ReclaimError::MissingIdentityAnnotation {
            volume: "pvc-1".to_owned(),
        });
        assert!(corrupt.is_permanent());

        let api = ReconcileError::from(kube::Error::Api(ErrorResponse {
            status: "Failure".to_owned(),
            message: "etcdserver: request timed out".to_owned(),
            reason: "InternalError".to_owned(),
            code: 500,
        }));
        assert!(!api.is_permanent());
    }
}
