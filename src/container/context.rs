//! Build context archives.
//!
//! A build context is a tar stream holding the service's Dockerfile plus a
//! filtered snapshot of the project tree. Only manifest files at the project
//! root and files under the source prefixes are included, hidden paths are
//! skipped, and entries are written in sorted order with fixed metadata so
//! the same tree always produces the same archive.

use crate::container::{ContainerError, Result};
use crate::env;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Project files sent to the daemon with every build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
    manifests: Vec<String>,
    prefixes: Vec<String>,
}

impl BuildContext {
    /// Context rooted at `root` with the default manifest and prefix filters.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifests: env::build::MANIFEST_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            prefixes: env::build::SOURCE_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Replace the filters.
    pub fn with_filters<M, P>(mut self, manifests: M, prefixes: P) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        self.manifests = manifests.into_iter().map(Into::into).collect();
        self.prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn includes(&self, relative: &str) -> bool {
        self.manifests.iter().any(|m| m == relative)
            || self.prefixes.iter().any(|p| relative.starts_with(p.as_str()))
    }

    /// Relative paths (with `/` separators) of the project files in the
    /// context, sorted.
    ///
    /// # Errors
    ///
    /// Returns error if the project tree cannot be walked.
    pub fn entries(&self) -> Result<Vec<String>> {
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                ContainerError::IoError(std::io::Error::other(format!(
                    "Failed to walk {}: {}",
                    self.root.display(),
                    e
                )))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if self.includes(&relative) {
                entries.push(relative);
            }
        }

        entries.sort();
        Ok(entries)
    }

    /// Build the tar archive with `dockerfile` stored as `Dockerfile`.
    ///
    /// # Errors
    ///
    /// Returns error if a project file cannot be read.
    pub fn archive(&self, dockerfile: &str) -> Result<Vec<u8>> {
        let mut archive = tar::Builder::new(Vec::new());
        archive.mode(tar::HeaderMode::Deterministic);

        append_file(
            &mut archive,
            env::build::DOCKERFILE_NAME,
            dockerfile.as_bytes(),
        )?;

        let entries = self.entries()?;
        debug!(
            "Build context {} with {} project files",
            self.root.display(),
            entries.len()
        );
        for relative in &entries {
            let data = std::fs::read(self.root.join(relative))?;
            append_file(&mut archive, relative, &data)?;
        }

        Ok(archive.into_inner()?)
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Append a regular file with fixed metadata.
fn append_file(archive: &mut tar::Builder<Vec<u8>>, path: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_entry_type(tar::EntryType::Regular);
    archive.append_data(&mut header, path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("cardinal/system")).unwrap();
        fs::create_dir_all(root.join("cardinal/.git")).unwrap();
        fs::create_dir_all(root.join("nakama")).unwrap();
        fs::write(root.join("world.toml"), "[cardinal]\n").unwrap();
        fs::write(root.join("README.md"), "readme").unwrap();
        fs::write(root.join("cardinal/main.go"), "package main").unwrap();
        fs::write(root.join("cardinal/system/move.go"), "package system").unwrap();
        fs::write(root.join("cardinal/.env"), "SECRET=1").unwrap();
        fs::write(root.join("cardinal/.git/HEAD"), "ref").unwrap();
        fs::write(root.join("nakama/main.go"), "package main").unwrap();
        dir
    }

    #[test]
    fn test_entries_are_filtered_and_sorted() {
        let dir = project();
        let context = BuildContext::new(dir.path());
        assert_eq!(
            context.entries().unwrap(),
            vec!["cardinal/main.go", "cardinal/system/move.go", "world.toml"]
        );
    }

    #[test]
    fn test_archive_contains_dockerfile_and_sources() {
        let dir = project();
        let bytes = BuildContext::new(dir.path())
            .archive("FROM scratch\n")
            .unwrap();

        let mut archive = tar::Archive::new(&bytes[..]);
        let mut names = Vec::new();
        let mut dockerfile = String::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            if name == "Dockerfile" {
                std::io::Read::read_to_string(&mut entry, &mut dockerfile).unwrap();
            }
            names.push(name);
        }

        assert_eq!(
            names,
            vec![
                "Dockerfile",
                "cardinal/main.go",
                "cardinal/system/move.go",
                "world.toml"
            ]
        );
        assert_eq!(dockerfile, "FROM scratch\n");
    }

    #[test]
    fn test_archive_is_deterministic() {
        let dir = project();
        let context = BuildContext::new(dir.path());
        assert_eq!(
            context.archive("FROM scratch").unwrap(),
            context.archive("FROM scratch").unwrap()
        );
    }

    #[test]
    fn test_custom_filters() {
        let dir = project();
        let context = BuildContext::new(dir.path()).with_filters(["README.md"], ["nakama/"]);
        assert_eq!(
            context.entries().unwrap(),
            vec!["README.md", "nakama/main.go"]
        );
    }
}
