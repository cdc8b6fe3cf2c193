/// Manifest discovery and YAML decoding
use super::{validate_set, TeamManifest};
use crate::error::{SyncError, SyncResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Expand files and directories into a sorted, de-duplicated list of
/// manifest files. Explicit files are taken as-is; directories are walked.
pub fn discover_manifest_files(paths: &[PathBuf]) -> SyncResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = entry?;
                if entry.file_type().is_file() && is_manifest_file(entry.path()) {
                    found.push(entry.into_path());
                }
            }
            found.sort();
            debug!("Found {} manifest files under {}", found.len(), path.display());
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(SyncError::Manifest(format!(
                "{}: no such file or directory",
                path.display()
            )));
        }
    }

    let mut seen = std::collections::HashSet::new();
    files.retain(|f| seen.insert(f.clone()));
    Ok(files)
}

/// Decode every YAML document in `contents`; empty documents are skipped
pub fn parse_manifests(contents: &str, source: &Path) -> SyncResult<Vec<TeamManifest>> {
    let mut manifests = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(contents).enumerate() {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| {
            SyncError::Manifest(format!("{} (document {}): {}", source.display(), index + 1, e))
        })?;
        if value.is_null() {
            continue;
        }

        let mut manifest: TeamManifest = serde_yaml::from_value(value).map_err(|e| {
            SyncError::Manifest(format!("{} (document {}): {}", source.display(), index + 1, e))
        })?;
        manifest.source = source.to_path_buf();
        manifests.push(manifest);
    }

    Ok(manifests)
}

/// Discover, decode, and validate manifests from the given paths
pub fn load_manifests(paths: &[PathBuf]) -> SyncResult<Vec<TeamManifest>> {
    let files = discover_manifest_files(paths)?;
    let mut manifests = Vec::new();

    for file in &files {
        let contents = std::fs::read_to_string(file)
            .map_err(|e| SyncError::Io(format!("{}: {}", file.display(), e)))?;
        manifests.extend(parse_manifests(&contents, file)?);
    }

    validate_set(&manifests)?;
    info!(
        "Loaded {} team manifests from {} files",
        manifests.len(),
        files.len()
    );
    Ok(manifests)
}
