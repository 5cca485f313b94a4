//! SHA-256 checksum manifest.
//!
//! The verifier runs in two distinct passes. [`ChecksumVerifier::compute`]
//! hashes every staged artifact and writes `SHA256SUMS.txt`, one
//! `<hexdigest>  <filename>` line per artifact ordered by file name (the
//! format `sha256sum -c` understands). [`ChecksumVerifier::verify`] then
//! re-reads the manifest from disk, re-reads every file, and compares. Any
//! corruption introduced between staging and publication surfaces as a
//! [`ChecksumError`].

use super::ArtifactRef;
use crate::error::ChecksumError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Name of the manifest file shipped next to the artifacts
pub const CHECKSUM_FILE_NAME: &str = "SHA256SUMS.txt";

const DIGEST_HEX_LEN: usize = 64;

/// Recorded digest of one artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChecksumEntry {
    file_name: String,
    digest: String,
    verified: bool,
}

impl ChecksumEntry {
    /// Unverified entry
    pub fn new(file_name: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            digest: digest.into(),
            verified: false,
        }
    }

    /// Artifact file name
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Lowercase hex SHA-256 digest
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Whether the digest was re-checked against the file on disk
    pub fn verified(&self) -> bool {
        self.verified
    }

    pub(crate) fn into_verified(self) -> Self {
        Self {
            verified: true,
            ..self
        }
    }
}

/// Computes and re-verifies the checksum manifest of a staging directory.
#[derive(Clone, Debug)]
pub struct ChecksumVerifier {
    dir: PathBuf,
}

impl ChecksumVerifier {
    /// Verifier for the manifest in `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of `SHA256SUMS.txt`
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(CHECKSUM_FILE_NAME)
    }

    /// First pass: hash every artifact and write the manifest.
    pub async fn compute(&self, artifacts: &[ArtifactRef]) -> Result<Vec<ChecksumEntry>, ChecksumError> {
        let mut ordered: Vec<&ArtifactRef> = artifacts.iter().collect();
        ordered.sort_by(|a, b| a.file_name().cmp(b.file_name()));

        let mut entries = Vec::with_capacity(ordered.len());
        for artifact in ordered {
            let digest = sha256_file(artifact.source_path()).await?;
            log::debug!("{}  {}", digest, artifact.file_name());
            entries.push(ChecksumEntry::new(artifact.file_name(), digest));
        }

        let path = self.manifest_path();
        tokio::fs::write(&path, render_manifest(&entries))
            .await
            .map_err(|source| ChecksumError::Io {
                context: "writing",
                path: path.clone(),
                source,
            })?;
        log::info!("Wrote {} with {} entries", path.display(), entries.len());

        Ok(entries)
    }

    /// Second pass: re-read the manifest and every artifact, and compare.
    ///
    /// Fails on a digest mismatch, on a listed file that no longer exists and
    /// on an artifact the manifest does not list.
    pub async fn verify(&self, artifacts: &[ArtifactRef]) -> Result<Vec<ChecksumEntry>, ChecksumError> {
        let recorded = self.read_manifest().await?;

        let listed: BTreeMap<&str, ()> = recorded.iter().map(|e| (e.file_name(), ())).collect();
        if let Some(unlisted) = artifacts.iter().find(|a| !listed.contains_key(a.file_name())) {
            return Err(ChecksumError::Unlisted {
                file_name: unlisted.file_name().to_string(),
            });
        }

        let locations: BTreeMap<&str, &Path> = artifacts
            .iter()
            .map(|a| (a.file_name(), a.source_path()))
            .collect();

        let mut verified = Vec::with_capacity(recorded.len());
        for entry in recorded {
            let path = locations
                .get(entry.file_name())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| self.dir.join(entry.file_name()));
            verified.push(self.verify_entry(entry, &path).await?);
        }
        Ok(verified)
    }

    /// Both passes in sequence.
    pub async fn compute_and_verify(
        &self,
        artifacts: &[ArtifactRef],
    ) -> Result<Vec<ChecksumEntry>, ChecksumError> {
        self.compute(artifacts).await?;
        self.verify(artifacts).await
    }

    /// Verify every entry of an existing manifest against the files next to it.
    pub async fn verify_listed(&self) -> Result<Vec<ChecksumEntry>, ChecksumError> {
        let recorded = self.read_manifest().await?;
        let mut verified = Vec::with_capacity(recorded.len());
        for entry in recorded {
            let path = self.dir.join(entry.file_name());
            verified.push(self.verify_entry(entry, &path).await?);
        }
        Ok(verified)
    }

    async fn read_manifest(&self) -> Result<Vec<ChecksumEntry>, ChecksumError> {
        let path = self.manifest_path();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ChecksumError::Io {
                context: "reading",
                path,
                source,
            })?;
        parse_manifest(&content)
    }

    async fn verify_entry(&self, entry: ChecksumEntry, path: &Path) -> Result<ChecksumEntry, ChecksumError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ChecksumError::Missing {
                file_name: entry.file_name,
            });
        }
        let actual = sha256_file(path).await?;
        if actual != entry.digest {
            return Err(ChecksumError::Mismatch {
                file_name: entry.file_name,
                expected: entry.digest,
                actual,
            });
        }
        Ok(entry.into_verified())
    }
}

/// Hex SHA-256 of a file, read in 8KB chunks.
pub async fn sha256_file(path: &Path) -> Result<String, ChecksumError> {
    let io_err = |context: &'static str| {
        move |source| ChecksumError::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    };

    let mut file = tokio::fs::File::open(path).await.map_err(io_err("opening"))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer).await.map_err(io_err("reading"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Manifest text for `entries`, in the given order.
pub fn render_manifest(entries: &[ChecksumEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}  {}\n", e.digest, e.file_name))
        .collect()
}

/// Parse manifest text. Blank lines are ignored; binary-mode markers (`*`) are accepted.
pub fn parse_manifest(content: &str) -> Result<Vec<ChecksumEntry>, ChecksumError> {
    let mut entries = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = || ChecksumError::Malformed {
            line: idx + 1,
            content: line.to_string(),
        };

        let (digest, rest) = line.split_once(' ').ok_or_else(malformed)?;
        let file_name = rest
            .strip_prefix(' ')
            .or_else(|| rest.strip_prefix('*'))
            .ok_or_else(malformed)?;

        let valid_digest = digest.len() == DIGEST_HEX_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit());
        if !valid_digest || file_name.is_empty() {
            return Err(malformed());
        }

        entries.push(ChecksumEntry::new(file_name, digest.to_ascii_lowercase()));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha256("hello")
    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn stage(dir: &Path, files: &[(&str, &str)]) -> Vec<ArtifactRef> {
        files
            .iter()
            .map(|(name, content)| {
                let path = dir.join(name);
                std::fs::write(&path, content).unwrap();
                ArtifactRef::new(*name, path, content.len() as u64)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_compute_writes_sorted_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = stage(tmp.path(), &[("b.dmg", "world"), ("a.exe", "hello")]);
        let verifier = ChecksumVerifier::new(tmp.path());

        let entries = verifier.compute(&artifacts).await.unwrap();
        assert_eq!(entries[0].file_name(), "a.exe");
        assert_eq!(entries[0].digest(), HELLO);
        assert!(!entries[0].verified());

        let text = std::fs::read_to_string(verifier.manifest_path()).unwrap();
        let first_line = text.lines().next().unwrap();
        assert_eq!(first_line, format!("{}  a.exe", HELLO));
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = stage(tmp.path(), &[("a.exe", "hello"), ("b.dmg", "world")]);
        let verifier = ChecksumVerifier::new(tmp.path());

        let first = verifier.compute_and_verify(&artifacts).await.unwrap();
        let first_text = std::fs::read_to_string(verifier.manifest_path()).unwrap();
        let second = verifier.compute_and_verify(&artifacts).await.unwrap();
        let second_text = std::fs::read_to_string(verifier.manifest_path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_text, second_text);
        assert!(second.iter().all(ChecksumEntry::verified));
    }

    #[tokio::test]
    async fn test_corruption_between_passes_is_a_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = stage(tmp.path(), &[("a.exe", "hello")]);
        let verifier = ChecksumVerifier::new(tmp.path());

        verifier.compute(&artifacts).await.unwrap();
        std::fs::write(tmp.path().join("a.exe"), "hellp").unwrap();

        match verifier.verify(&artifacts).await.unwrap_err() {
            ChecksumError::Mismatch { file_name, expected, .. } => {
                assert_eq!(file_name, "a.exe");
                assert_eq!(expected, HELLO);
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deleted_file_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = stage(tmp.path(), &[("a.exe", "hello"), ("b.dmg", "world")]);
        let verifier = ChecksumVerifier::new(tmp.path());

        verifier.compute(&artifacts).await.unwrap();
        std::fs::remove_file(tmp.path().join("b.dmg")).unwrap();

        let err = verifier.verify_listed().await.unwrap_err();
        assert!(matches!(err, ChecksumError::Missing { ref file_name } if file_name == "b.dmg"));
    }

    #[tokio::test]
    async fn test_unlisted_artifact_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = stage(tmp.path(), &[("a.exe", "hello"), ("b.dmg", "world")]);
        let verifier = ChecksumVerifier::new(tmp.path());

        verifier.compute(&artifacts[..1]).await.unwrap();
        let err = verifier.verify(&artifacts).await.unwrap_err();
        assert!(matches!(err, ChecksumError::Unlisted { ref file_name } if file_name == "b.dmg"));
    }

    #[test]
    fn test_parse_accepts_binary_marker_and_rejects_garbage() {
        let parsed = parse_manifest(&format!("{} *a.exe\n\n", HELLO.to_uppercase())).unwrap();
        assert_eq!(parsed, vec![ChecksumEntry::new("a.exe", HELLO)]);

        let err = parse_manifest("deadbeef  a.exe").unwrap_err();
        assert!(matches!(err, ChecksumError::Malformed { line: 1, .. }));
        assert!(parse_manifest(HELLO).is_err());
    }
}
