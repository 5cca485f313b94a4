//! `verify`: re-check a directory against its SHA256SUMS.txt.

use crate::artifact::ChecksumVerifier;
use crate::cli::RuntimeConfig;
use crate::error::Result;
use std::path::Path;

pub(super) async fn execute_verify(dir: &Path, config: &RuntimeConfig) -> Result<i32> {
    let verifier = ChecksumVerifier::new(dir);
    config.verbose_println(&format!("Reading {}", verifier.manifest_path().display()));

    let entries = verifier.verify_listed().await?;
    for entry in &entries {
        let digest = entry.digest();
        let short = digest.get(..12).unwrap_or(digest);
        config.indent(&format!("{}  {}", short, entry.file_name()));
    }
    config.success_println(&format!("{} file(s) match {}", entries.len(), dir.display()));
    Ok(0)
}
