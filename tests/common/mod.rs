// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use cellar::recipe::{KitchenConfig, RecipeBook};
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch tree with a recipe directory, a source directory and a cellar.
///
/// Keep the fixture alive for the duration of the test to prevent cleanup.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("recipes")).unwrap();
        fs::create_dir_all(dir.path().join("upstream")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn recipes(&self) -> PathBuf {
        self.root().join("recipes")
    }

    pub fn config(&self) -> KitchenConfig {
        let mut config = KitchenConfig::rooted_at(&self.root().join("state"));
        config.jobs = 2;
        config.timeout_secs = 60;
        config
    }

    /// Write `<name>-<version>.tar.gz` holding `files` under `<name>-<version>/`.
    ///
    /// Returns the archive path and its `sha256:` checksum.
    pub fn source_archive(&self, name: &str, version: &str, files: &[(&str, &str)]) -> (PathBuf, String) {
        let top = format!("{}-{}", name, version);
        let path = self.root().join("upstream").join(format!("{}.tar.gz", top));
        let file = fs::File::create(&path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

        for (rel, body) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(if rel.ends_with(".sh") { 0o755 } else { 0o644 });
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{}/{}", top, rel), body.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();

        let checksum = sha256_file(&path);
        (path, checksum)
    }

    /// Write `<recipes>/<name>.toml` with a generated source archive.
    ///
    /// `body` is appended after the `[package]` and `[stable]` tables.
    pub fn recipe(&self, name: &str, depends: &[&str], body: &str) {
        self.recipe_toml(name, &depends_line(depends), body);
    }

    /// Like [`Fixture::recipe`], with raw top-level keys instead of a depends list
    pub fn recipe_toml(&self, name: &str, top: &str, body: &str) {
        let (url, checksum) = self.source_archive(name, "1.0", &[("README", name)]);
        self.recipe_with_source(name, top, &url.display().to_string(), &checksum, body);
    }

    pub fn recipe_with_source(&self, name: &str, top: &str, url: &str, checksum: &str, body: &str) {
        let content = format!(
            r#"{top}

[package]
name = "{name}"
version = "1.0"
description = "{name} for tests"
homepage = "https://example.com/{name}"
license = "MIT"

[stable]
url = "{url}"
checksum = "{checksum}"

{body}
"#
        );
        fs::write(self.recipes().join(format!("{}.toml", name)), content).unwrap();
    }

    pub fn book(&self) -> RecipeBook {
        RecipeBook::load_dir(&self.recipes()).unwrap()
    }
}

/// `depends = [...]` for a list of run-time dependencies
pub fn depends_line(depends: &[&str]) -> String {
    let quoted: Vec<String> = depends.iter().map(|d| format!("{:?}", d)).collect();
    format!("depends = [{}]", quoted.join(", "))
}

pub fn sha256_file(path: &Path) -> String {
    let digest = Sha256::digest(fs::read(path).unwrap());
    format!("sha256:{:x}", digest)
}

/// A build step that installs `bin/<name>` printing `output`
pub fn install_tool_step(tool: &str, output: &str) -> String {
    format!(
        r#"[[build]]
command = "sh"
args = ["-c", "mkdir -p %(bin)s && printf '#!/bin/sh\necho {output}\n' > %(bin)s/{tool} && chmod +x %(bin)s/{tool}"]
"#
    )
}
