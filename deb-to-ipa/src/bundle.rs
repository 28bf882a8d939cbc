// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Location of iOS application bundles in an extracted package.

use {
    crate::error::{ConversionError, Result},
    log::warn,
    std::path::{Path, PathBuf},
};

/// Directory of an extracted package holding application bundles.
pub const APPLICATIONS_DIR: &str = "Applications";

/// Directory name suffix of application bundles.
pub const APP_BUNDLE_SUFFIX: &str = ".app";

/// Placeholder for metadata that could not be resolved.
pub const UNKNOWN: &str = "Unknown";

/// Minimal metadata describing an application bundle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BundleDescriptor {
    pub display_name: String,
    pub version: String,
    pub bundle_identifier: String,
}

impl Default for BundleDescriptor {
    fn default() -> Self {
        Self {
            display_name: UNKNOWN.to_string(),
            version: UNKNOWN.to_string(),
            bundle_identifier: UNKNOWN.to_string(),
        }
    }
}

impl std::fmt::Display for BundleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.display_name, self.version, self.bundle_identifier
        )
    }
}

impl BundleDescriptor {
    /// Derive an instance from a parsed `Info.plist`.
    ///
    /// Keys that are missing or not strings resolve to [UNKNOWN]. The display
    /// name comes from `CFBundleDisplayName`, falling back to `CFBundleName`.
    pub fn from_info_plist(info_plist: &plist::Dictionary) -> Self {
        let string_key = |key: &str| -> Option<String> {
            match info_plist.get(key) {
                Some(value) => match value.as_string() {
                    Some(s) => Some(s.to_string()),
                    None => {
                        warn!("Info.plist key {} is not a string; ignoring", key);
                        None
                    }
                },
                None => None,
            }
        };

        Self {
            display_name: string_key("CFBundleDisplayName")
                .or_else(|| string_key("CFBundleName"))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            version: string_key("CFBundleVersion").unwrap_or_else(|| UNKNOWN.to_string()),
            bundle_identifier: string_key("CFBundleIdentifier")
                .unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

/// An iOS application bundle backed by a directory.
///
/// iOS bundles are shallow: `Info.plist` lives directly in the bundle root.
#[derive(Clone, Debug)]
pub struct AppBundle {
    root: PathBuf,
    name: String,
}

impl AppBundle {
    /// Open a bundle from the path of its root directory.
    pub fn new_from_path(directory: &Path) -> Result<Self> {
        let name = directory
            .file_name()
            .ok_or(ConversionError::NoApplicationBundle)?
            .to_string_lossy()
            .to_string();

        Ok(Self {
            root: directory.to_path_buf(),
            name,
        })
    }

    /// The root directory of this bundle.
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// The on-disk name of this bundle, including the `.app` suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path to the bundle's `Info.plist`.
    pub fn info_plist_path(&self) -> PathBuf {
        self.root.join("Info.plist")
    }

    /// Read and parse `Info.plist`.
    ///
    /// Both XML and binary property lists are accepted.
    pub fn info_plist(&self) -> std::result::Result<plist::Dictionary, String> {
        let path = self.info_plist_path();
        let data = std::fs::read(&path).map_err(|e| format!("reading {}: {}", path.display(), e))?;

        plist::Value::from_reader(std::io::Cursor::new(data))
            .map_err(|e| format!("parsing {}: {}", path.display(), e))?
            .into_dictionary()
            .ok_or_else(|| format!("{} is not a dictionary", path.display()))
    }

    /// Resolve the [BundleDescriptor] for this bundle.
    ///
    /// This never fails. A missing or malformed `Info.plist` yields
    /// placeholder values.
    pub fn descriptor(&self) -> BundleDescriptor {
        match self.info_plist() {
            Ok(info_plist) => BundleDescriptor::from_info_plist(&info_plist),
            Err(e) => {
                warn!("unable to read bundle metadata of {}: {}", self.name, e);
                BundleDescriptor::default()
            }
        }
    }
}

/// Find application bundles in an extracted package tree.
///
/// Looks for `*.app` directories directly under `<root>/Applications`.
/// Bundles are returned sorted by name so the choice of a primary bundle
/// does not depend on directory enumeration order.
pub fn locate_bundles(root: &Path) -> Result<Vec<AppBundle>> {
    let applications = root.join(APPLICATIONS_DIR);

    match std::fs::symlink_metadata(&applications) {
        Ok(metadata) if metadata.is_dir() => {}
        _ => return Err(ConversionError::NoApplicationsFolder),
    }

    let mut bundles = vec![];

    for entry in std::fs::read_dir(&applications)? {
        let entry = entry?;
        let file_type = entry.file_type()?;

        if !file_type.is_dir() {
            continue;
        }

        if entry
            .file_name()
            .to_string_lossy()
            .ends_with(APP_BUNDLE_SUFFIX)
        {
            bundles.push(AppBundle::new_from_path(&entry.path())?);
        }
    }

    if bundles.is_empty() {
        return Err(ConversionError::NoApplicationBundle);
    }

    bundles.sort_by(|a, b| a.name().cmp(b.name()));

    Ok(bundles)
}
