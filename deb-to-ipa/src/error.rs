// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {std::path::PathBuf, thiserror::Error};

/// Represents a failed `.deb` to `.ipa` conversion.
///
/// Every stage of the conversion maps the errors it encounters into exactly
/// one of these variants. Anything not otherwise classified lands in
/// [ConversionError::Io].
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("no permission to read {0}")]
    NoPermission(PathBuf),

    #[error("malformed ar container: {0}")]
    MalformedContainer(String),

    #[error("no data.tar member found in .deb")]
    NoDataFound,

    #[error("unsupported compression for member: {0}")]
    UnsupportedCompression(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("unknown tar entry type {1:?} for {0}")]
    UnknownTarEntryType(String, tar::EntryType),

    #[error("tar entry path escapes extraction root: {0}")]
    UnsafeEntryPath(String),

    #[error("extracted package has no Applications directory")]
    NoApplicationsFolder,

    #[error("Applications directory contains no .app bundle")]
    NoApplicationBundle,

    #[error("failed to write archive: {0}")]
    ArchiveWriteFailure(String),

    #[error("conversion cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    /// Obtain the explanatory message to present to an end-user.
    ///
    /// Each variant has a single fixed message. Unclassified errors are
    /// rendered as an unknown error with the underlying message appended.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoPermission(_) => "No permission to view the file.".to_string(),
            Self::MalformedContainer(_) => {
                "The file you imported is not a valid .deb archive. Are you sure it isn't corrupted?"
                    .to_string()
            }
            Self::NoDataFound => {
                "Data wasn't found in .deb. Are you sure the .deb you imported isn't corrupted?"
                    .to_string()
            }
            Self::UnsupportedCompression(_) => {
                "The .deb uses a data compression format that is not supported. \
                Supported formats are gzip, xz, bzip2 and lzma."
                    .to_string()
            }
            Self::CorruptArchive(_) => {
                "The data archive inside the .deb failed an integrity check. \
                The .deb is most likely corrupted or truncated."
                    .to_string()
            }
            Self::UnknownTarEntryType(_, _) => {
                "The .deb contains a file type that cannot be placed in an .ipa \
                (hard link, device node or pipe)."
                    .to_string()
            }
            Self::UnsafeEntryPath(_) => {
                "The .deb contains a file path that points outside of its own contents \
                and was refused."
                    .to_string()
            }
            Self::NoApplicationsFolder => {
                "The .deb you imported is UNSUPPORTED and CANNOT be converted to .ipa, \
                as it doesn't have an Applications folder. You can try using a PC/Mac to \
                inject the tweak into an .ipa."
                    .to_string()
            }
            Self::NoApplicationBundle => {
                "The .deb you imported has an Applications folder but no .app bundle inside \
                it, so it CANNOT be converted to .ipa."
                    .to_string()
            }
            Self::ArchiveWriteFailure(_) => {
                "Creating the .ipa archive failed. Check that there is enough free space \
                and that the output location is writable."
                    .to_string()
            }
            Self::Cancelled => "The conversion was cancelled.".to_string(),
            Self::Io(e) => format!("Unknown error.\n{}", e),
        }
    }
}

/// Result type for conversion functionality.
pub type Result<T> = std::result::Result<T, ConversionError>;
