// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Production of `.ipa` archives.

An `.ipa` is a zip file whose root holds a `Payload/` directory containing
one or more `.app` bundles.
*/

use {
    crate::{
        bundle::AppBundle,
        error::{ConversionError, Result},
    },
    log::{debug, info},
    std::{
        fmt::Display,
        io::{Seek, Write},
        path::{Path, PathBuf},
    },
};

/// Filename extension of iOS application archives.
pub const IPA_EXTENSION: &str = "ipa";

fn write_failure(e: impl Display) -> ConversionError {
    ConversionError::ArchiveWriteFailure(e.to_string())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

/// Move bundles into the `Payload` staging directory.
///
/// Returns the bundles at their new location, in the order given.
pub fn stage_payload(payload_dir: &Path, bundles: &[AppBundle]) -> Result<Vec<AppBundle>> {
    std::fs::create_dir_all(payload_dir).map_err(write_failure)?;

    bundles
        .iter()
        .map(|bundle| {
            let dest = payload_dir.join(bundle.name());
            debug!(
                "moving {} to {}",
                bundle.root_dir().display(),
                dest.display()
            );
            std::fs::rename(bundle.root_dir(), &dest).map_err(write_failure)?;

            AppBundle::new_from_path(&dest)
        })
        .collect::<Result<Vec<_>>>()
}

/// Write a zip file containing a directory tree.
///
/// Entries are named relative to the parent of `dir`, so the zip's root
/// contains `dir`'s name (e.g. `Payload/`). Traversal order is sorted by
/// file name, making output deterministic. Symlinks are stored as symlinks.
///
/// Returns the writer and the number of entries written.
pub fn zip_directory_to_writer<W: Write + Seek>(dir: &Path, writer: W) -> Result<(W, usize)> {
    let base = dir.parent().unwrap_or_else(|| Path::new(""));

    let mut zf = zip::ZipWriter::new(writer);
    let mut count = 0;

    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(write_failure)?;
        let path = entry.path();

        let name = path
            .strip_prefix(base)
            .map_err(write_failure)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        if entry.file_type().is_symlink() {
            let target = std::fs::read_link(path).map_err(write_failure)?;
            debug!("adding symlink {} -> {}", name, target.display());
            zf.add_symlink(name, target.to_string_lossy(), options)
                .map_err(write_failure)?;
        } else if entry.file_type().is_dir() {
            zf.add_directory(format!("{}/", name), options.unix_permissions(0o755))
                .map_err(write_failure)?;
        } else {
            let metadata = entry.metadata().map_err(write_failure)?;
            let options = options.unix_permissions(if is_executable(&metadata) {
                0o0755
            } else {
                0o0644
            });

            debug!("adding {} ({} bytes)", name, metadata.len());
            zf.start_file(name, options).map_err(write_failure)?;
            let mut fh = std::fs::File::open(path).map_err(write_failure)?;
            std::io::copy(&mut fh, &mut zf).map_err(write_failure)?;
        }

        count += 1;
    }

    let mut writer = zf.finish().map_err(write_failure)?;
    writer.flush().map_err(write_failure)?;

    Ok((writer, count))
}

/// Write a zip file of a directory tree to a new file at `zip_path`.
///
/// See [zip_directory_to_writer]. Returns the number of entries written.
pub fn zip_directory(dir: &Path, zip_path: &Path) -> Result<usize> {
    let fh = std::fs::File::create(zip_path).map_err(write_failure)?;

    Ok(zip_directory_to_writer(dir, fh)?.1)
}

/// Write `<dest_dir>/<stem>.ipa` from a staged `Payload` directory.
///
/// The zip is first written to a uniquely named temporary `.zip` file in
/// `dest_dir`. `before_rename` is then called with its path and entry count.
/// Finally the zip is renamed to `<stem>.ipa`, replacing any existing file.
/// No other file in `dest_dir` is touched.
///
/// If any step fails the temporary zip is removed. The payload directory is
/// never touched, so a retry doesn't require extracting again.
pub fn write_ipa(
    payload_dir: &Path,
    dest_dir: &Path,
    stem: &str,
    before_rename: impl FnOnce(&Path, usize) -> Result<()>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir).map_err(write_failure)?;
    let ipa_path = dest_dir.join(format!("{}.{}", stem, IPA_EXTENSION));

    // Removed on drop unless persisted.
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}-", stem))
        .suffix(".zip")
        .tempfile_in(dest_dir)
        .map_err(write_failure)?;

    let (_, count) = zip_directory_to_writer(payload_dir, temp.as_file_mut())?;
    before_rename(temp.path(), count)?;

    if ipa_path.exists() {
        info!("replacing existing {}", ipa_path.display());
    }
    temp.persist(&ipa_path).map_err(write_failure)?;

    Ok(ipa_path)
}
