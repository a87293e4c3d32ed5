//! Classified failures returned by a [`Provisioner`](crate::Provisioner).
//!
//! Nothing in here is logged or retried by the code that produces it. The
//! [`Controller`](crate::Controller) reads the classification and decides what
//! to do.
use std::path::PathBuf;

use thiserror::Error;

/// Why a claim could not be turned into a volume.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The claim's component label is empty or would escape the base directory.
    #[error("PVC label 'component' {component:?} is invalid: {reason}")]
    InvalidComponent {
        /// The label value as found on the claim.
        component: String,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// The directory could not be stat'ed. Missing paths and permission
    /// failures both land here.
    #[error("failed to stat path {}: {source}", .path.display())]
    PathNotFound {
        /// The joined path that was checked.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The path exists but is not a directory.
    #[error("path is not a directory: {}", .path.display())]
    NotADirectory {
        /// The joined path that was checked.
        path: PathBuf,
    },
}

impl ProvisionError {
    /// Returns true when retrying with the same claim can never succeed.
    ///
    /// An invalid component stays invalid until the requester edits the claim,
    /// while a missing directory may be populated at any moment.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ProvisionError::InvalidComponent { .. })
    }
}

/// Why a released volume could not be reclaimed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReclaimError {
    /// The volume carries no owner identity, so it was not created by this
    /// provisioner or its metadata was altered.
    #[error("identity annotation not found on PV {volume}")]
    MissingIdentityAnnotation {
        /// Name of the offending volume.
        volume: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_invalid_component_is_permanent() {
        let invalid = ProvisionError::InvalidComponent {
            component: "a/b".to_owned(),
            reason: "contains a path separator",
        };
        assert!(invalid.is_permanent());

        let missing = ProvisionError::PathNotFound {
            path: PathBuf::from("/var/shared-data/catalog"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(!missing.is_permanent());

        let file = ProvisionError::NotADirectory {
            path: PathBuf::from("/var/shared-data/catalog"),
        };
        assert!(!file.is_permanent());
    }

    #[test]
    fn messages_name_the_path() {
        let err = ProvisionError::NotADirectory {
            path: PathBuf::from("/data/catalog"),
        };
        assert_eq!(err.to_string(), "path is not a directory: /data/catalog");

        let err = ReclaimError::MissingIdentityAnnotation {
            volume: "pvc-1234".to_owned(),
        };
        assert_eq!(err.to_string(), "identity annotation not found on PV pvc-1234");
    }
}
