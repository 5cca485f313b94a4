//! Mirror transports for nightly publication.
//!
//! A mirror makes the destination directory's contents exactly equal to the
//! local staging directory: new files are transferred, changed files are
//! replaced and files absent locally are deleted remotely.

use crate::error::PublishError;
use std::collections::BTreeSet;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Deletion-synchronizing transfer of a flat directory.
pub trait MirrorTransport: Send + Sync {
    /// Human readable destination
    fn destination(&self) -> String;

    /// Make the destination equal to `source`.
    fn mirror(&self, source: &Path) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// rsync over SSH with a private key taken from the environment.
#[derive(Clone)]
pub struct RsyncTransport {
    host: String,
    user: String,
    port: u16,
    remote_path: String,
    private_key: String,
}

impl std::fmt::Debug for RsyncTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsyncTransport")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("port", &self.port)
            .field("remote_path", &self.remote_path)
            .finish_non_exhaustive()
    }
}

impl RsyncTransport {
    /// Create a transport; `private_key` is the PEM/OpenSSH key text.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        port: u16,
        remote_path: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port,
            remote_path: remote_path.into(),
            private_key: private_key.into(),
        }
    }

    fn transfer_error(&self, reason: impl Into<String>) -> PublishError {
        PublishError::Transfer {
            destination: self.destination(),
            reason: reason.into(),
        }
    }

    /// rsync arguments for a key staged at `key_path`.
    fn rsync_args(&self, source: &Path, key_path: &Path) -> Vec<String> {
        let ssh = format!(
            "ssh -i {} -p {} -o StrictHostKeyChecking=accept-new -o BatchMode=yes",
            key_path.display(),
            self.port
        );
        // trailing slashes: copy the directory's contents, not the directory
        vec![
            "--archive".to_string(),
            "--delete".to_string(),
            "--verbose".to_string(),
            "-e".to_string(),
            ssh,
            format!("{}/", source.display()),
            format!("{}@{}:{}/", self.user, self.host, self.remote_path.trim_end_matches('/')),
        ]
    }
}

impl MirrorTransport for RsyncTransport {
    fn destination(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.remote_path)
    }

    async fn mirror(&self, source: &Path) -> Result<(), PublishError> {
        let rsync = which::which("rsync").map_err(|e| self.transfer_error(format!("rsync not found: {}", e)))?;
        which::which("ssh").map_err(|e| self.transfer_error(format!("ssh not found: {}", e)))?;

        // NamedTempFile is created with owner-only permissions and removed on drop
        let mut key_file = tempfile::NamedTempFile::new()
            .map_err(|e| self.transfer_error(format!("cannot stage private key: {}", e)))?;
        let mut key = self.private_key.clone();
        if !key.ends_with('\n') {
            key.push('\n');
        }
        key_file
            .write_all(key.as_bytes())
            .and_then(|_| key_file.flush())
            .map_err(|e| self.transfer_error(format!("cannot stage private key: {}", e)))?;

        let args = self.rsync_args(source, key_file.path());
        log::debug!("{} {}", rsync.display(), args.join(" "));

        let output = tokio::process::Command::new(&rsync)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.transfer_error(format!("failed to run rsync: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|l| l.starts_with("deleting ")) {
            log::info!("Mirror {}", line);
        }

        if !output.status.success() {
            return Err(self.transfer_error(format!(
                "rsync exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        log::info!("Mirrored {} to {}", source.display(), self.destination());
        Ok(())
    }
}

/// Mirror into a directory on a local or mounted filesystem.
#[derive(Clone, Debug)]
pub struct LocalMirror {
    target: PathBuf,
}

impl LocalMirror {
    /// Mirror into `target`
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    fn transfer_error(&self, reason: String) -> PublishError {
        PublishError::Transfer {
            destination: self.destination(),
            reason,
        }
    }
}

impl MirrorTransport for LocalMirror {
    fn destination(&self) -> String {
        self.target.display().to_string()
    }

    async fn mirror(&self, source: &Path) -> Result<(), PublishError> {
        tokio::fs::create_dir_all(&self.target)
            .await
            .map_err(|e| self.transfer_error(format!("cannot create {}: {}", self.target.display(), e)))?;

        let staged = list_entries(source).await.map_err(|e| self.transfer_error(e))?;
        let mut local: BTreeSet<String> = BTreeSet::new();
        for (path, name, is_file) in staged {
            if !is_file {
                log::warn!("Skipping non-file {} in staging directory", path.display());
                continue;
            }
            tokio::fs::copy(&path, self.target.join(&name))
                .await
                .map_err(|e| self.transfer_error(format!("copy {} failed: {}", name, e)))?;
            log::debug!("Mirrored {}", name);
            local.insert(name);
        }

        let existing = list_entries(&self.target).await.map_err(|e| self.transfer_error(e))?;
        for (path, name, is_file) in existing {
            if local.contains(&name) {
                continue;
            }
            let removed = if is_file {
                tokio::fs::remove_file(&path).await
            } else {
                tokio::fs::remove_dir_all(&path).await
            };
            removed.map_err(|e| self.transfer_error(format!("delete {} failed: {}", name, e)))?;
            log::info!("Mirror deleting {}", name);
        }

        Ok(())
    }
}

/// Top-level entries of `dir` as (path, name, is_file), listed off the async runtime.
async fn list_entries(dir: &Path) -> Result<Vec<(PathBuf, String, bool)>, String> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<Vec<(PathBuf, String, bool)>, String> {
        walkdir::WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| {
                let entry = entry.map_err(|e| format!("cannot list {}: {}", dir.display(), e))?;
                Ok((
                    entry.path().to_path_buf(),
                    entry.file_name().to_string_lossy().into_owned(),
                    !entry.file_type().is_dir(),
                ))
            })
            .collect()
    })
    .await
    .map_err(|e| format!("directory listing task failed: {}", e))?
}

/// The configured nightly destination.
#[derive(Clone, Debug)]
pub enum MirrorDestination {
    /// Remote host over SSH
    Rsync(RsyncTransport),
    /// Local or mounted directory
    Local(LocalMirror),
}

impl MirrorTransport for MirrorDestination {
    fn destination(&self) -> String {
        match self {
            MirrorDestination::Rsync(t) => t.destination(),
            MirrorDestination::Local(t) => t.destination(),
        }
    }

    async fn mirror(&self, source: &Path) -> Result<(), PublishError> {
        match self {
            MirrorDestination::Rsync(t) => t.mirror(source).await,
            MirrorDestination::Local(t) => t.mirror(source).await,
        }
    }
}
