// src/recipe/cellar.rs

//! Install layout and install receipts
//!
//! Every build lands in its own prefix, `<cellar>/<name>/<version>[_<revision>]`,
//! or `<cellar>/<name>/HEAD` for head checkouts. A successful build leaves an
//! `INSTALL_RECEIPT.json` in the prefix; a prefix without a receipt is
//! treated as not installed.
//!
//! While a keg is rebuilt, the old install waits next to it as
//! `<keg>.previous` and is restored if the rebuild fails.

use crate::error::{Error, Result};
use crate::recipe::format::{Os, Phase, Variant};
use crate::recipe::resolved::ResolvedRecipe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Receipt file name inside each prefix
pub const RECEIPT_FILE: &str = "INSTALL_RECEIPT.json";

/// Suffix of a keg set aside during a rebuild
pub const PREVIOUS_SUFFIX: &str = ".previous";

/// Fingerprint recorded for system-provided dependencies
pub const SYSTEM_FINGERPRINT: &str = "system";

/// An install prefix and its standard subdirectories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPrefix {
    path: PathBuf,
}

impl InstallPrefix {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bin(&self) -> PathBuf {
        self.path.join("bin")
    }

    pub fn lib(&self) -> PathBuf {
        self.path.join("lib")
    }

    pub fn include(&self) -> PathBuf {
        self.path.join("include")
    }

    pub fn share(&self) -> PathBuf {
        self.path.join("share")
    }

    pub fn man(&self) -> PathBuf {
        self.path.join("share").join("man")
    }

    pub fn receipt_path(&self) -> PathBuf {
        self.path.join(RECEIPT_FILE)
    }

    /// Where the current install waits while this prefix is rebuilt
    pub fn previous_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(PREVIOUS_SUFFIX);
        self.path.with_file_name(name)
    }

    /// Whether anything other than a receipt was installed
    pub fn is_populated(&self) -> Result<bool> {
        if !self.path.is_dir() {
            return Ok(false);
        }
        for entry in fs::read_dir(&self.path)? {
            if entry?.file_name() != RECEIPT_FILE {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// A dependency as seen by a dependent's build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledDep {
    pub name: String,
    pub prefix: InstallPrefix,
    /// Build fingerprint, or [`SYSTEM_FINGERPRINT`] for system packages
    pub fingerprint: String,
    pub phase: Phase,
}

impl InstalledDep {
    pub fn system(name: &str, system_prefix: &Path, phase: Phase) -> Self {
        Self {
            name: name.to_string(),
            prefix: InstallPrefix::new(system_prefix),
            fingerprint: SYSTEM_FINGERPRINT.to_string(),
            phase,
        }
    }

    pub fn is_system(&self) -> bool {
        self.fingerprint == SYSTEM_FINGERPRINT
    }
}

/// One dependency line in a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptDependency {
    pub name: String,
    pub phase: Phase,
    pub fingerprint: String,
}

/// Metadata written next to every installed build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub revision: u32,
    pub variant: Variant,
    pub os: Os,
    /// Checksum of the archive, or `url#branch` for head checkouts
    pub source: String,
    pub dependencies: Vec<ReceiptDependency>,
    pub fingerprint: String,
    /// Commit the checkout was at, for head builds
    #[serde(default)]
    pub source_revision: Option<String>,
    pub built_at: DateTime<Utc>,
}

impl InstallReceipt {
    pub fn new(recipe: &ResolvedRecipe, deps: &[InstalledDep], fingerprint: &str) -> Self {
        Self {
            name: recipe.name.clone(),
            version: recipe.version.clone(),
            revision: recipe.revision,
            variant: recipe.variant,
            os: recipe.os,
            source: recipe.source.describe(),
            dependencies: deps
                .iter()
                .map(|d| ReceiptDependency {
                    name: d.name.clone(),
                    phase: d.phase,
                    fingerprint: d.fingerprint.clone(),
                })
                .collect(),
            fingerprint: fingerprint.to_string(),
            source_revision: None,
            built_at: Utc::now(),
        }
    }

    /// Write the receipt into a prefix
    pub fn write(&self, prefix: &InstallPrefix) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::ParseError(format!("Failed to serialize receipt: {}", e)))?;
        fs::write(prefix.receipt_path(), json).map_err(|e| {
            Error::IoError(format!(
                "Failed to write receipt in {}: {}",
                prefix.path().display(),
                e
            ))
        })
    }

    /// Read the receipt of a prefix, if it has one
    pub fn read(prefix: &InstallPrefix) -> Result<Option<Self>> {
        let path = prefix.receipt_path();
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::ParseError(format!("Invalid receipt {}: {}", path.display(), e)))
    }
}

/// The install root
#[derive(Debug, Clone)]
pub struct Cellar {
    root: PathBuf,
}

impl Cellar {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Prefix a resolved recipe installs into
    pub fn prefix_for(&self, recipe: &ResolvedRecipe) -> InstallPrefix {
        InstallPrefix::new(self.root.join(&recipe.name).join(recipe.keg_name()))
    }

    /// Receipt of the build for this exact recipe version, if installed
    pub fn receipt(&self, recipe: &ResolvedRecipe) -> Result<Option<InstallReceipt>> {
        InstallReceipt::read(&self.prefix_for(recipe))
    }

    /// Every installed build of a package, newest build first
    pub fn installed(&self, name: &str) -> Result<Vec<(InstallPrefix, InstallReceipt)>> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir()
                || entry.file_name().to_string_lossy().ends_with(PREVIOUS_SUFFIX)
            {
                continue;
            }
            let prefix = InstallPrefix::new(entry.path());
            if let Some(receipt) = InstallReceipt::read(&prefix)? {
                found.push((prefix, receipt));
            }
        }
        found.sort_by(|a, b| b.1.built_at.cmp(&a.1.built_at));
        Ok(found)
    }

    /// Most recently built installed prefix of a package
    pub fn find_installed(&self, name: &str) -> Result<Option<(InstallPrefix, InstallReceipt)>> {
        Ok(self.installed(name)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parser::parse_recipe;
    use tempfile::TempDir;

    fn resolved(revision: u32) -> ResolvedRecipe {
        let content = format!(
            r#"
[package]
name = "liblouis"
version = "3.22.0"
revision = {}

[stable]
url = "https://example.com/liblouis-%(version)s.tar.gz"
checksum = "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
"#,
            revision
        );
        parse_recipe(&content)
            .unwrap()
            .resolve(Variant::Stable, Os::Linux)
            .unwrap()
    }

    #[test]
    fn test_prefix_layout() {
        let cellar = Cellar::new("/opt/cellar");
        assert_eq!(
            cellar.prefix_for(&resolved(0)).path(),
            Path::new("/opt/cellar/liblouis/3.22.0")
        );
        let prefix = cellar.prefix_for(&resolved(1));
        assert_eq!(prefix.path(), Path::new("/opt/cellar/liblouis/3.22.0_1"));
        assert_eq!(prefix.man(), Path::new("/opt/cellar/liblouis/3.22.0_1/share/man"));
    }

    #[test]
    fn test_receipt_roundtrip_and_lookup() {
        let tmp = TempDir::new().unwrap();
        let cellar = Cellar::new(tmp.path());
        let recipe = resolved(0);
        let prefix = cellar.prefix_for(&recipe);

        assert!(!prefix.is_populated().unwrap());
        assert!(cellar.find_installed("liblouis").unwrap().is_none());

        fs::create_dir_all(prefix.bin()).unwrap();
        let deps = vec![InstalledDep::system("python", Path::new("/usr"), Phase::Build)];
        let receipt = InstallReceipt::new(&recipe, &deps, "abc123");
        receipt.write(&prefix).unwrap();

        assert!(prefix.is_populated().unwrap());
        assert_eq!(cellar.receipt(&recipe).unwrap(), Some(receipt.clone()));

        let (found_prefix, found) = cellar.find_installed("liblouis").unwrap().unwrap();
        assert_eq!(found_prefix, prefix);
        assert_eq!(found.dependencies[0].fingerprint, SYSTEM_FINGERPRINT);
        assert!(found.source.starts_with("sha256:"));
    }

    #[test]
    fn test_previous_keg_is_not_listed() {
        let tmp = TempDir::new().unwrap();
        let cellar = Cellar::new(tmp.path());
        let recipe = resolved(0);
        let prefix = cellar.prefix_for(&recipe);
        assert_eq!(
            prefix.previous_path(),
            tmp.path().join("liblouis/3.22.0.previous")
        );

        fs::create_dir_all(prefix.previous_path()).unwrap();
        InstallReceipt::new(&recipe, &[], "old")
            .write(&InstallPrefix::new(prefix.previous_path()))
            .unwrap();
        assert!(cellar.installed("liblouis").unwrap().is_empty());
    }

    #[test]
    fn test_prefix_without_receipt_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let cellar = Cellar::new(tmp.path());
        fs::create_dir_all(tmp.path().join("liblouis/3.21.0/bin")).unwrap();
        assert!(cellar.installed("liblouis").unwrap().is_empty());
    }
}
