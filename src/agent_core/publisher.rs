//! Publisher — materializes a bundle on disk and ships it.
//!
//! The orchestrator only sees the [`Publisher`] trait. [`CommandPublisher`]
//! writes the bundle under the artifact root and runs an external CLI
//! (`shopify theme push --store <store>` by default) in that directory.
//!
//! The command only runs once every entry is on disk, or from the fallback
//! directory when the artifact root itself cannot be created.
//!
//! Publishing never fails the run: every problem ends up in the returned
//! [`PublishOutcome`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use super::errors::PublishError;
use super::types::{ArtifactBundle, PublishOutcome};

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, bundle: &ArtifactBundle, target_dir: &Path) -> PublishOutcome;
}

// ─── Bundle Materialization ─────────────────────────────────────────────────

/// Map a bundle key to a path under `root`.
///
/// Keys are `/`-separated relative paths. Absolute keys, empty segments,
/// `.`/`..` segments and backslashes are rejected.
pub fn resolve_key(root: &Path, key: &str) -> Result<PathBuf, PublishError> {
    let unsafe_path = |reason: &str| PublishError::UnsafePath {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(unsafe_path("empty path"));
    }
    if key.starts_with('/') || Path::new(key).is_absolute() {
        return Err(unsafe_path("absolute path"));
    }
    if key.contains('\\') || key.contains(':') {
        return Err(unsafe_path("path contains '\\' or ':'"));
    }

    let mut path = root.to_path_buf();
    for segment in key.split('/') {
        match segment {
            "" => return Err(unsafe_path("empty path segment")),
            "." | ".." => return Err(unsafe_path("relative path segment")),
            s => path.push(s),
        }
    }
    Ok(path)
}

/// Write every entry under `root`, creating directories and overwriting files.
///
/// All keys are checked before anything is written.
pub async fn write_bundle(
    bundle: &ArtifactBundle,
    root: &Path,
) -> Result<Vec<PathBuf>, PublishError> {
    let resolved = bundle
        .iter()
        .map(|(key, content)| resolve_key(root, key).map(|path| (path, content)))
        .collect::<Result<Vec<_>, _>>()?;

    tokio::fs::create_dir_all(root).await.map_err(io_error(root))?;

    let mut written = Vec::with_capacity(resolved.len());
    for (path, content) in resolved {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(io_error(&path))?;
        written.push(path);
    }

    tracing::info!(root = %root.display(), files = written.len(), "theme files written");
    Ok(written)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PublishError {
    let path = path.display().to_string();
    move |source| PublishError::Io { path, source }
}

// ─── CommandPublisher ───────────────────────────────────────────────────────

/// Runs `<program> <verb...> --store <store>` in the artifact directory.
#[derive(Debug, Clone)]
pub struct CommandPublisher {
    pub program: String,
    pub verb: Vec<String>,
    /// Appended as `--store <store>` when non-empty.
    pub store: String,
    /// Working directory used when the artifact root cannot be created.
    /// A root that exists but fails mid-write is never published.
    pub fallback_dir: Option<PathBuf>,
}

impl CommandPublisher {
    fn command_line(&self) -> Vec<String> {
        let mut args = self.verb.clone();
        if !self.store.is_empty() {
            args.push("--store".to_string());
            args.push(self.store.clone());
        }
        args
    }

    /// Pick where the command runs: the artifact root if it exists, else the fallback.
    fn working_dir(&self, target_dir: &Path) -> Option<PathBuf> {
        if target_dir.is_dir() {
            return Some(target_dir.to_path_buf());
        }
        let fallback = self.fallback_dir.as_ref().filter(|d| d.is_dir())?;
        tracing::warn!(
            target = %target_dir.display(),
            fallback = %fallback.display(),
            "artifact directory missing, publishing from fallback directory"
        );
        Some(fallback.clone())
    }
}

#[async_trait]
impl Publisher for CommandPublisher {
    async fn publish(&self, bundle: &ArtifactBundle, target_dir: &Path) -> PublishOutcome {
        let mut write_failure = None;
        match write_bundle(bundle, target_dir).await {
            Ok(_) => {}
            Err(e @ PublishError::UnsafePath { .. }) => {
                tracing::warn!(error = %e, "refusing to write bundle");
                return PublishOutcome::failed(e.to_string());
            }
            // The root exists but is only partly written: never publish it.
            Err(e) if target_dir.is_dir() => {
                tracing::warn!(error = %e, "bundle only partly written, not publishing");
                return PublishOutcome::failed(e.to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "artifact directory could not be created");
                write_failure = Some(e.to_string());
            }
        }

        let Some(cwd) = self.working_dir(target_dir) else {
            let diagnostic = write_failure.unwrap_or_else(|| {
                format!("artifact directory {} does not exist", target_dir.display())
            });
            return PublishOutcome::failed(diagnostic);
        };

        let args = self.command_line();
        tracing::info!(
            program = %self.program,
            args = ?args,
            cwd = %cwd.display(),
            "=== PUBLISH ==="
        );

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&cwd)
            .stdin(std::process::Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => {
                let outcome = PublishOutcome {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    diagnostic: write_failure,
                };
                if outcome.success {
                    tracing::info!(exit_code = ?outcome.exit_code, "publish succeeded");
                } else {
                    tracing::warn!(
                        exit_code = ?outcome.exit_code,
                        stderr = %outcome.stderr,
                        "publish command failed"
                    );
                }
                outcome
            }
            Err(e) => {
                let diagnostic = format!("failed to launch '{}': {e}", self.program);
                tracing::warn!(diagnostic = %diagnostic, "publish command did not start");
                PublishOutcome::failed(diagnostic)
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
