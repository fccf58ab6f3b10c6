//! Locates the Claude CLI binary and caches the result for the process
//! lifetime.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::ClaudeClientError;
use crate::types::VerifyStatus;
use crate::Result;

/// How long `--version` may take before the binary is declared unresponsive.
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A successfully resolved Claude CLI.
#[derive(Debug, Clone)]
pub struct ResolvedClaude {
    pub path: PathBuf,
    pub version: String,
    pub resolved_at: DateTime<Utc>,
}

/// Resolution order: explicit configured path, cached record, known install
/// locations, then `$PATH`. The cache survives until [`invalidate`] — called
/// when an invocation reports the binary missing.
///
/// [`invalidate`]: ClaudeResolver::invalidate
pub struct ClaudeResolver {
    explicit: Option<PathBuf>,
    cache: RwLock<Option<ResolvedClaude>>,
}

impl ClaudeResolver {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        ClaudeResolver {
            explicit,
            cache: RwLock::new(None),
        }
    }

    /// Resolve the CLI, verifying it responds to `--version` on a cache miss.
    pub async fn resolve(&self) -> Result<ResolvedClaude> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let path = self.locate()?;
        let version = probe_version(&path).await?;
        let resolved = ResolvedClaude {
            path,
            version,
            resolved_at: Utc::now(),
        };
        tracing::info!(
            path = %resolved.path.display(),
            version = %resolved.version,
            "resolved claude cli"
        );
        *self.cache.write().await = Some(resolved.clone());
        Ok(resolved)
    }

    /// Drop the cached record; the next [`resolve`] re-runs discovery.
    ///
    /// [`resolve`]: ClaudeResolver::resolve
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Probe the CLI and report availability without failing.
    pub async fn verify(&self) -> VerifyStatus {
        match self.resolve().await {
            Ok(resolved) => VerifyStatus::available(resolved.version),
            Err(e) => VerifyStatus::unavailable(e.to_string()),
        }
    }

    fn locate(&self) -> Result<PathBuf> {
        if let Some(path) = &self.explicit {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(ClaudeClientError::NotInstalled(format!(
                "configured path does not exist: {}",
                path.display()
            )));
        }

        for candidate in install_candidates() {
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        which::which("claude")
            .map_err(|e| ClaudeClientError::NotInstalled(format!("claude not on PATH: {e}")))
    }
}

/// Known install locations, user-local first.
fn install_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = home::home_dir() {
        candidates.push(home.join(".claude/local/claude"));
        candidates.push(home.join(".local/bin/claude"));
        candidates.push(home.join(".npm-global/bin/claude"));
    }
    candidates.push(PathBuf::from("/usr/local/bin/claude"));
    candidates.push(PathBuf::from("/opt/homebrew/bin/claude"));
    candidates
}

async fn probe_version(path: &std::path::Path) -> Result<String> {
    let mut cmd = tokio::process::Command::new(path);
    cmd.arg("--version")
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .stdin(std::process::Stdio::null());

    let output = tokio::time::timeout(VERSION_PROBE_TIMEOUT, async {
        cmd.kill_on_drop(true).output().await
    })
    .await
    .map_err(|_| ClaudeClientError::Unresponsive {
        path: path.to_path_buf(),
        timeout_ms: VERSION_PROBE_TIMEOUT.as_millis() as u64,
    })?
    .map_err(ClaudeClientError::Io)?;

    if !output.status.success() {
        return Err(ClaudeClientError::Process(format!(
            "{} --version exited with {}",
            path.display(),
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn fake_cli(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("claude");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolves_explicit_path_and_caches() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = fake_cli(&dir, "echo 9.9.9-test");
        let resolver = ClaudeResolver::new(Some(path.clone()));

        let first = resolver.resolve().await.unwrap();
        assert_eq!(first.path, path);
        assert_eq!(first.version, "9.9.9-test");

        // Second resolve hits the cache even if the binary disappears.
        std::fs::remove_file(&path).unwrap();
        let second = resolver.resolve().await.unwrap();
        assert_eq!(second.version, "9.9.9-test");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalidate_forces_rediscovery() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = fake_cli(&dir, "echo 1.0.0");
        let resolver = ClaudeResolver::new(Some(path.clone()));
        resolver.resolve().await.unwrap();

        std::fs::remove_file(&path).unwrap();
        resolver.invalidate().await;

        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, ClaudeClientError::NotInstalled(_)));
    }

    #[tokio::test]
    async fn missing_explicit_path_is_not_installed() {
        let resolver = ClaudeResolver::new(Some(PathBuf::from("/nonexistent/claude-bin")));
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, ClaudeClientError::NotInstalled(_)));
        assert!(err.is_binary_missing());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_version_probe_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = fake_cli(&dir, "exit 3");
        let resolver = ClaudeResolver::new(Some(path));
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, ClaudeClientError::Process(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn verify_reports_available() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = fake_cli(&dir, "echo 2.1.0");
        let resolver = ClaudeResolver::new(Some(path));
        let status = resolver.verify().await;
        assert!(status.available);
        assert_eq!(status.version.as_deref(), Some("2.1.0"));
    }

    #[tokio::test]
    async fn verify_reports_unavailable() {
        let resolver = ClaudeResolver::new(Some(PathBuf::from("/nonexistent/claude-bin")));
        let status = resolver.verify().await;
        assert!(!status.available);
        assert!(status.error.is_some());
    }
}
