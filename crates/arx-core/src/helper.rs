//! yay integration
//!
//! Locates the `yay` AUR helper, asks it whether packages exist and has it
//! download build recipes into a workspace.

use crate::error::{AnalysisError, Result};
use crate::source::{RecipeSource, RECIPE_FILE};
use crate::workspace::Workspace;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Locations checked when `yay` is not on PATH
const FALLBACK_PATHS: &[&str] = &["/usr/bin/yay", "/usr/local/bin/yay"];

/// stderr fragments yay prints for unknown packages
const NOT_FOUND_MARKERS: &[&str] = &["not found", "no results", "no packages", "could not find"];

/// Handle to a `yay` binary
#[derive(Debug, Clone)]
pub struct YayHelper {
    program: PathBuf,
    leading_args: Vec<OsString>,
    query_timeout: Duration,
    fetch_timeout: Duration,
}

impl YayHelper {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            program: path.into(),
            leading_args: Vec::new(),
            query_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(60),
        }
    }

    /// Find `yay` on PATH or in the usual install locations
    pub fn locate() -> Result<Self> {
        if let Ok(path) = which::which("yay") {
            return Ok(Self::new(path));
        }
        FALLBACK_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.is_file())
            .map(Self::new)
            .ok_or_else(|| AnalysisError::Helper("yay not found. Please install yay first.".into()))
    }

    pub fn with_timeouts(mut self, query: Duration, fetch: Duration) -> Self {
        self.query_timeout = query;
        self.fetch_timeout = fetch;
        self
    }

    /// Binary used for pass-through invocations
    pub fn path(&self) -> &Path {
        &self.program
    }

    /// Whether yay knows the package, in the repos or the AUR
    pub async fn package_exists(&self, package_name: &str) -> Result<bool> {
        let output = self
            .run(&["-Si", package_name], None, self.query_timeout)
            .await?;
        Ok(output.status.success())
    }

    /// Download a package's recipe into `workspace` and read it back
    pub async fn fetch_recipe(&self, package_name: &str, workspace: &Workspace) -> Result<Option<Vec<u8>>> {
        // `repo/pkg` is valid for yay; the directory is named after the package
        let dir_name = package_name.rsplit('/').next().unwrap_or(package_name);
        if dir_name.is_empty() || dir_name == "." || dir_name == ".." {
            return Err(AnalysisError::Helper(format!(
                "invalid package name: {}",
                package_name
            )));
        }

        let output = self
            .run(
                &["--getpkgbuild", package_name],
                Some(workspace.path()),
                self.fetch_timeout,
            )
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
            if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
                debug!("yay has no recipe for {}", package_name);
                return Ok(None);
            }
            return Err(AnalysisError::Helper(format!(
                "yay --getpkgbuild {} failed: {}",
                package_name,
                stderr.trim()
            )));
        }

        let recipe_path = workspace.path().join(dir_name).join(RECIPE_FILE);
        match tokio::fs::read(&recipe_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} not found at {}", RECIPE_FILE, recipe_path.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run(&self, args: &[&str], cwd: Option<&Path>, limit: Duration) -> Result<Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        debug!("Running {} {}", self.program.display(), args.join(" "));
        match tokio::time::timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(AnalysisError::Helper(format!(
                "failed to run {}: {}",
                self.program.display(),
                e
            ))),
            Err(_) => Err(AnalysisError::Helper(format!(
                "{} {} timed out after {}s",
                self.program.display(),
                args.join(" "),
                limit.as_secs_f32()
            ))),
        }
    }
}

#[async_trait]
impl RecipeSource for YayHelper {
    fn name(&self) -> &str {
        "yay"
    }

    async fn fetch(&self, package_name: &str, workspace: &Workspace) -> Result<Option<Vec<u8>>> {
        self.fetch_recipe(package_name, workspace).await
    }
}
