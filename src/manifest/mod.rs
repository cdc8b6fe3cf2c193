/// Team manifests
///
/// Declarative YAML documents describing the desired membership of a team.

pub mod loader;

pub use loader::{discover_manifest_files, load_manifests, parse_manifests};

use crate::{
    api::Role,
    error::{SyncError, SyncResult},
    identity::normalize_identity,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Manifest kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestKind {
    Team,
}

/// One member entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberSpec {
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

/// A team manifest document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamManifest {
    pub kind: ManifestKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberSpec>,
    /// File the document came from
    #[serde(skip)]
    pub source: PathBuf,
}

impl TeamManifest {
    /// Check a single manifest for internal consistency
    pub fn validate(&self) -> SyncResult<()> {
        let origin = self.source.display();

        if !is_valid_team_name(&self.name) {
            return Err(SyncError::Manifest(format!(
                "{}: invalid team name '{}' (use lowercase letters, digits, '-' or '_')",
                origin, self.name
            )));
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            let email = normalize_identity(&member.email);
            if email.is_empty() {
                return Err(SyncError::Manifest(format!(
                    "{}: team '{}' has a member with an empty email",
                    origin, self.name
                )));
            }
            if !email.contains('@') {
                return Err(SyncError::Manifest(format!(
                    "{}: team '{}' member '{}' is not an email address",
                    origin, self.name, member.email
                )));
            }
            if !seen.insert(email) {
                return Err(SyncError::Manifest(format!(
                    "{}: team '{}' lists '{}' more than once",
                    origin, self.name, member.email
                )));
            }
        }

        Ok(())
    }

    /// Member emails in manifest order
    pub fn emails(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.email.as_str())
    }
}

fn is_valid_team_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Check the set: every manifest valid, team names unique
pub fn validate_set(manifests: &[TeamManifest]) -> SyncResult<()> {
    let mut names = HashSet::new();
    for manifest in manifests {
        manifest.validate()?;
        if !names.insert(manifest.name.as_str()) {
            return Err(SyncError::Manifest(format!(
                "{}: team '{}' is defined more than once",
                manifest.source.display(),
                manifest.name
            )));
        }
    }
    Ok(())
}
