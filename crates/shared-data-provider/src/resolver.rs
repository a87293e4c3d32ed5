//! Turns a component label into a directory under the base directory.
use std::path::{is_separator, Path, PathBuf};

use provisioner::ProvisionError;

/// A directory that existed when it was resolved.
///
/// Only [`resolve`] builds these, so holding one means the path was checked to
/// exist and to be a directory. The check is not cached; the directory may
/// vanish afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
    path: PathBuf,
}

impl ResolvedPath {
    /// The absolute path of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consumes the value, returning the path.
    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

/// Resolves `component` to `base_dir/component` and checks that it is a
/// directory.
///
/// The component is validated before the path is built, so a rejected
/// component never touches the filesystem. Every call stats the path again.
/// A stat failure of any kind, permission errors included, is reported as
/// [`ProvisionError::PathNotFound`].
pub fn resolve(base_dir: &Path, component: &str) -> Result<ResolvedPath, ProvisionError> {
    validate_component(component)?;

    let path = base_dir.join(component);
    let metadata = match std::fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(source) => return Err(ProvisionError::PathNotFound { path, source }),
    };
    if !metadata.is_dir() {
        return Err(ProvisionError::NotADirectory { path });
    }
    Ok(ResolvedPath { path })
}

/// Rejects components that are empty or could name anything other than a
/// direct child of the base directory.
pub fn validate_component(component: &str) -> Result<(), ProvisionError> {
    let reason = if component.is_empty() {
        "is empty or not defined"
    } else if component.contains('/') || component.chars().any(is_separator) {
        "contains a path separator"
    } else if component == "." || component == ".." {
        "refers to the base directory or its parent"
    } else {
        return Ok(());
    };
    Err(ProvisionError::InvalidComponent {
        component: component.to_owned(),
        reason,
    })
}
