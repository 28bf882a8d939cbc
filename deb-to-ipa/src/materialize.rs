// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Materialization of tar archives onto the filesystem.

Entries are applied strictly in archive order, one filesystem action per
entry. Only directories, regular files and symlinks can be materialized.
Anything else (hard links, device nodes, FIFOs) aborts extraction: an app
bundle silently missing some of its content is worse than no bundle.
*/

use {
    crate::{
        error::{ConversionError, Result},
        pipeline::CancellationToken,
    },
    log::debug,
    std::{
        io::{Cursor, Read},
        path::{Component, Path, PathBuf},
    },
};

/// Classification of a tar entry for materialization purposes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TarEntryKind {
    Directory,
    RegularFile,
    Symlink,
    /// Headers carrying archive metadata rather than content.
    Metadata,
    Other(tar::EntryType),
}

impl From<tar::EntryType> for TarEntryKind {
    fn from(entry_type: tar::EntryType) -> Self {
        match entry_type {
            tar::EntryType::Directory => Self::Directory,
            tar::EntryType::Regular | tar::EntryType::Continuous => Self::RegularFile,
            tar::EntryType::Symlink => Self::Symlink,
            tar::EntryType::XGlobalHeader
            | tar::EntryType::XHeader
            | tar::EntryType::GNULongName
            | tar::EntryType::GNULongLink => Self::Metadata,
            other => Self::Other(other),
        }
    }
}

/// Counters describing a finished materialization.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MaterializeStats {
    pub directories: usize,
    pub files: usize,
    pub symlinks: usize,
    pub bytes_written: u64,
}

impl MaterializeStats {
    /// Total number of filesystem entries created.
    pub fn entries(&self) -> usize {
        self.directories + self.files + self.symlinks
    }
}

fn corrupt(e: std::io::Error) -> ConversionError {
    ConversionError::CorruptArchive(format!("tar: {}", e))
}

/// Normalize a tar entry path to a path relative to the extraction root.
///
/// `./` prefixes and leading `/` are dropped. `..` components are refused.
fn normalize_entry_path(path: &Path) -> Result<PathBuf> {
    let mut res = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(p) => res.push(p),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(ConversionError::UnsafeEntryPath(path.display().to_string()));
            }
        }
    }

    Ok(res)
}

/// Resolve the destination of a normalized entry path under `root`.
///
/// Errors if any parent directory is a symlink, since writing through it
/// could land outside of `root`.
fn resolve_destination(root: &Path, relative: &Path) -> Result<PathBuf> {
    if let Some(parent) = relative.parent() {
        for ancestor in parent.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }

            if let Ok(metadata) = std::fs::symlink_metadata(root.join(ancestor)) {
                if metadata.file_type().is_symlink() {
                    return Err(ConversionError::UnsafeEntryPath(
                        relative.display().to_string(),
                    ));
                }
            }
        }
    }

    Ok(root.join(relative))
}

fn destination(root: &Path, raw_path: &Path) -> Result<(PathBuf, PathBuf)> {
    let relative = normalize_entry_path(raw_path)?;
    let dest = resolve_destination(root, &relative)?;

    Ok((relative, dest))
}

/// Remove a file or symlink occupying `path`, if any.
fn remove_non_directory(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if !metadata.is_dir() => Ok(std::fs::remove_file(path)?),
        _ => Ok(()),
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    // setuid/setgid/sticky bits have no business in an app bundle.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Extract tar data into `root`.
///
/// `root` is created if it does not exist. Each entry results in exactly one
/// of: a directory being created (existing directories are fine), a file
/// being written (replacing existing content), or a symlink being created
/// with the entry's link target verbatim.
///
/// `cancel` is checked before every entry is applied.
pub fn materialize_tar(
    data: &[u8],
    root: &Path,
    cancel: &CancellationToken,
) -> Result<MaterializeStats> {
    std::fs::create_dir_all(root)?;

    let mut stats = MaterializeStats::default();
    let mut archive = tar::Archive::new(Cursor::new(data));

    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        cancel.check()?;

        let raw_path = entry.path().map_err(corrupt)?.into_owned();
        let entry_type = entry.header().entry_type();

        match TarEntryKind::from(entry_type) {
            TarEntryKind::Other(entry_type) => {
                return Err(ConversionError::UnknownTarEntryType(
                    raw_path.display().to_string(),
                    entry_type,
                ));
            }
            TarEntryKind::Metadata => {
                debug!("skipping tar metadata entry {}", raw_path.display());
            }
            TarEntryKind::Directory => {
                let (relative, dest) = destination(root, &raw_path)?;
                debug!("creating directory {}", relative.display());
                std::fs::create_dir_all(&dest)?;
                stats.directories += 1;
            }
            TarEntryKind::RegularFile => {
                let (relative, dest) = destination(root, &raw_path)?;
                if relative.as_os_str().is_empty() {
                    return Err(ConversionError::UnsafeEntryPath(
                        raw_path.display().to_string(),
                    ));
                }

                // The header size is untrusted.
                let expected = entry.size();
                let mut content = Vec::new();
                entry.read_to_end(&mut content).map_err(corrupt)?;

                if content.len() as u64 != expected {
                    return Err(ConversionError::CorruptArchive(format!(
                        "tar entry {} is truncated: expected {} bytes, got {}",
                        raw_path.display(),
                        expected,
                        content.len()
                    )));
                }

                debug!("writing {} ({} bytes)", relative.display(), content.len());
                create_parent(&dest)?;
                remove_non_directory(&dest)?;
                std::fs::write(&dest, &content)?;

                if let Ok(mode) = entry.header().mode() {
                    set_mode(&dest, mode)?;
                }

                stats.files += 1;
                stats.bytes_written += content.len() as u64;
            }
            TarEntryKind::Symlink => {
                let (relative, dest) = destination(root, &raw_path)?;
                let target = entry
                    .link_name()
                    .map_err(corrupt)?
                    .ok_or_else(|| {
                        ConversionError::CorruptArchive(format!(
                            "symlink {} has no target",
                            raw_path.display()
                        ))
                    })?
                    .into_owned();

                debug!(
                    "creating symlink {} -> {}",
                    relative.display(),
                    target.display()
                );
                create_parent(&dest)?;
                remove_non_directory(&dest)?;
                create_symlink(&target, &dest)?;

                stats.symlinks += 1;
            }
        }
    }

    Ok(stats)
}
