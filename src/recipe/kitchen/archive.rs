// src/recipe/kitchen/archive.rs

//! Archive and source file utilities for the Kitchen

use crate::error::{Error, Result};
use crate::recipe::format::VcsKind;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::Command;

/// Supported source archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarXz,
    TarZst,
    TarBz2,
    Tar,
}

impl ArchiveFormat {
    /// Detect the format from a file name
    pub fn detect(filename: &str) -> Option<Self> {
        let name = filename.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Some(Self::TarZst)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// File name component of a URL, without query or fragment
pub fn url_filename(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("source")
        .to_string()
}

/// Local path for `file://` URLs and plain paths
fn local_source(url: &str) -> Option<&Path> {
    if let Some(path) = url.strip_prefix("file://") {
        Some(Path::new(path))
    } else if url.contains("://") {
        None
    } else {
        Some(Path::new(url))
    }
}

/// Download a file from a URL
///
/// `file://` URLs and bare paths are copied; everything else goes through curl.
pub fn download_file(url: &str, dest: &Path) -> Result<()> {
    if let Some(path) = local_source(url) {
        fs::copy(path, dest)
            .map_err(|e| Error::DownloadError(format!("Failed to copy {}: {}", url, e)))?;
        return Ok(());
    }

    let output = Command::new("curl")
        .args(["-fsSL", "-o"])
        .arg(dest)
        .arg(url)
        .output()
        .map_err(|e| Error::DownloadError(format!("curl failed: {}", e)))?;

    if !output.status.success() {
        return Err(Error::DownloadError(format!(
            "Failed to download {}: {}",
            url,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}

/// Extract an archive to a destination directory
///
/// Supports: .tar.gz, .tgz, .tar.xz, .txz, .tar.zst, .tar in process;
/// .tar.bz2 and .tbz2 through the `tar` tool.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let filename = archive.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let format = ArchiveFormat::detect(filename)
        .ok_or_else(|| Error::ParseError(format!("Unknown archive format: {}", filename)))?;

    fs::create_dir_all(dest)?;

    let open = || -> Result<BufReader<File>> { Ok(BufReader::new(File::open(archive)?)) };
    match format {
        ArchiveFormat::TarGz => unpack_tar(flate2::read::GzDecoder::new(open()?), dest),
        ArchiveFormat::TarXz => unpack_tar(xz2::read::XzDecoder::new(open()?), dest),
        ArchiveFormat::TarZst => unpack_tar(zstd::stream::read::Decoder::new(open()?)?, dest),
        ArchiveFormat::Tar => unpack_tar(open()?, dest),
        ArchiveFormat::TarBz2 => extract_with_tar_tool(archive, dest),
    }
}

fn unpack_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    // tar::Archive::unpack refuses entries that escape `dest`
    archive
        .unpack(dest)
        .map_err(|e| Error::IoError(format!("Failed to extract archive: {}", e)))
}

fn extract_with_tar_tool(archive: &Path, dest: &Path) -> Result<()> {
    let output = Command::new("tar")
        .arg("-xjf")
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .output()
        .map_err(|e| Error::IoError(format!("tar failed: {}", e)))?;

    if !output.status.success() {
        return Err(Error::IoError(format!(
            "Failed to extract archive: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}

/// Commit a checkout is at (`git rev-parse HEAD` or `hg id -i`)
pub fn vcs_revision(vcs: VcsKind, checkout: &Path) -> Result<String> {
    let mut cmd = match vcs {
        VcsKind::Git => {
            let mut cmd = Command::new("git");
            cmd.args(["rev-parse", "HEAD"]);
            cmd
        }
        VcsKind::Hg => {
            let mut cmd = Command::new("hg");
            cmd.args(["id", "-i"]);
            cmd
        }
    };
    let output = cmd
        .current_dir(checkout)
        .output()
        .map_err(|e| Error::DownloadError(format!("Failed to run {:?}: {}", vcs, e)))?;

    let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || revision.is_empty() {
        return Err(Error::DownloadError(format!(
            "Failed to read revision of {}: {}",
            checkout.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(revision)
}

/// Shallow-clone a repository for a head build
pub fn clone_vcs(vcs: VcsKind, url: &str, branch: Option<&str>, dest: &Path) -> Result<()> {
    let mut cmd = match vcs {
        VcsKind::Git => {
            let mut cmd = Command::new("git");
            cmd.args(["clone", "--depth", "1"]);
            if let Some(branch) = branch {
                cmd.args(["--branch", branch]);
            }
            cmd
        }
        VcsKind::Hg => {
            let mut cmd = Command::new("hg");
            cmd.arg("clone");
            if let Some(branch) = branch {
                cmd.args(["-b", branch]);
            }
            cmd
        }
    };
    cmd.arg(url).arg(dest);

    let output = cmd
        .output()
        .map_err(|e| Error::DownloadError(format!("Failed to run {:?} clone: {}", vcs, e)))?;

    if !output.status.success() {
        return Err(Error::DownloadError(format!(
            "Failed to clone {}: {}",
            url,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}
