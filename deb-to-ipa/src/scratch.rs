// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Scratch storage for conversions.

The scratch area is a directory owned exclusively by one converter. Its
layout is:

* `deb_extracted/` - the extracted `data.tar` tree.
* `Payload/` - staging directory that becomes the root of the `.ipa`.
* `data.tar.*` - the raw data member read from the `.deb`.

These entries are removed by [ScratchArea::purge]. Anything else in the
directory is left alone.
*/

use {
    crate::{container::DATA_MEMBER_PREFIX, error::Result},
    log::debug,
    std::path::{Path, PathBuf},
};

/// Name of the directory holding the extracted package tree.
pub const EXTRACTED_DIR: &str = "deb_extracted";

/// Name of the directory staging the archive root.
pub const PAYLOAD_DIR: &str = "Payload";

/// A directory used for intermediate conversion state.
///
/// Only the entries of the scratch layout are ever written or removed, so
/// the directory may be shared with unrelated files.
#[derive(Debug)]
pub struct ScratchArea {
    root: PathBuf,
    // Keeps a self-created temporary directory alive.
    _temp: Option<tempfile::TempDir>,
}

impl ScratchArea {
    /// Use an existing or to-be-created directory as the scratch area.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            _temp: None,
        }
    }

    /// Create a private temporary directory as the scratch area.
    ///
    /// The directory is deleted when this instance is dropped.
    pub fn temporary() -> Result<Self> {
        let temp = tempfile::Builder::new().prefix("deb-to-ipa-").tempdir()?;

        Ok(Self {
            root: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    /// The root directory of the scratch area.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the `data.tar` content is extracted into.
    pub fn extracted_dir(&self) -> PathBuf {
        self.root.join(EXTRACTED_DIR)
    }

    /// Directory staged as the root of the `.ipa`.
    pub fn payload_dir(&self) -> PathBuf {
        self.root.join(PAYLOAD_DIR)
    }

    /// Path a raw archive member is written to.
    ///
    /// Path separators in the member name are replaced so the file always
    /// lands directly in the scratch root.
    pub fn member_path(&self, member_name: &str) -> PathBuf {
        self.root.join(member_name.replace(&['/', '\\'][..], "_"))
    }

    /// Whether a file name in the scratch root belongs to the scratch layout.
    pub fn is_layout_entry(name: &str) -> bool {
        name == EXTRACTED_DIR || name == PAYLOAD_DIR || name.starts_with(DATA_MEMBER_PREFIX)
    }

    /// Remove all scratch layout entries.
    ///
    /// The scratch root itself is (re)created so it exists afterwards. Other
    /// content of the root is preserved. Calling this repeatedly is harmless.
    pub fn purge(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;

            if !Self::is_layout_entry(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let path = entry.path();
            debug!("removing {}", path.display());
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }

        Ok(())
    }
}
