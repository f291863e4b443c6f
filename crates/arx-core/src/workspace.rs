//! Per-package scratch directories
//!
//! Every analysis gets its own directory under the scratch root. The
//! [`Workspace`] guard removes it when released or dropped, so error paths
//! and panics clean up the same way the happy path does.

use crate::error::{AnalysisError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

lazy_static! {
    /// Characters not allowed in a workspace directory name
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._+-]").unwrap();
}

/// Number of suffixed names tried after the plain one is taken
const MAX_COLLISION_SUFFIX: usize = 64;

/// Environment variable overriding the scratch root
pub const TEMP_DIR_ENV: &str = "ARX_TEMP_DIR";

/// Scratch root used when none is configured: `$ARX_TEMP_DIR`, else `<tmp>/arx`
pub fn default_scratch_root() -> PathBuf {
    match std::env::var_os(TEMP_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir().join("arx"),
    }
}

/// Replace every character outside `[A-Za-z0-9._+-]` with `_`
pub fn sanitize_name(package_name: &str) -> String {
    UNSAFE_CHARS.replace_all(package_name, "_").into_owned()
}

/// Creates workspaces under one scratch root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    scratch_root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
        }
    }

    /// Manager over the configured root, falling back to [`default_scratch_root`]
    pub fn from_config(scratch_root: Option<&Path>) -> Self {
        match scratch_root {
            Some(root) => Self::new(root),
            None => Self::new(default_scratch_root()),
        }
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Create a fresh, empty directory for one package.
    ///
    /// The directory is `<root>/arx_<sanitized>`; if that exists the suffixes
    /// `-1`, `-2`, ... are tried in order.
    pub fn acquire(&self, package_name: &str) -> Result<Workspace> {
        fs::create_dir_all(&self.scratch_root).map_err(|source| AnalysisError::Workspace {
            path: self.scratch_root.clone(),
            source,
        })?;

        let base = format!("arx_{}", sanitize_name(package_name));
        for attempt in 0..=MAX_COLLISION_SUFFIX {
            let dir_name = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };
            let path = self.scratch_root.join(dir_name);

            match fs::create_dir(&path) {
                Ok(()) => {
                    debug!("Acquired workspace {}", path.display());
                    return Ok(Workspace {
                        path,
                        package_name: package_name.to_string(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(AnalysisError::Workspace { path, source }),
            }
        }

        Err(AnalysisError::Workspace {
            path: self.scratch_root.join(base),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("all {} suffixed names are taken", MAX_COLLISION_SUFFIX),
            ),
        })
    }

    /// Remove a workspace now rather than when it goes out of scope
    pub fn release(&self, workspace: Workspace) {
        workspace.release();
    }
}

/// A scratch directory owned by exactly one analysis
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    package_name: String,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Remove the directory tree. Failures are logged, never returned.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Released workspace {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}
