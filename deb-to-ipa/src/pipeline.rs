// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Orchestration of `.deb` to `.ipa` conversion.

A conversion moves through the stages of [ConversionStage] strictly in
order. Each stage announces itself through a [ConversionEvent] before doing
any work. The first error ends the run; no stage is retried.
*/

use {
    crate::{
        archiver::{stage_payload, write_ipa},
        bundle::{locate_bundles, BundleDescriptor},
        compression::CompressionKind,
        container::find_data_member,
        error::{ConversionError, Result},
        materialize::{materialize_tar, MaterializeStats},
        scratch::ScratchArea,
    },
    log::{debug, info, warn},
    std::{
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    },
};

/// Cooperative cancellation flag for a conversion.
///
/// Clones share the same flag. Conversions check it between stages and
/// before every extracted tar entry.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Error with [ConversionError::Cancelled] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ConversionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A stage of a conversion.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum ConversionStage {
    Idle,
    Cleaning,
    Reading,
    Decompressing,
    Materializing,
    Locating,
    Archiving,
    Renaming,
    Done,
    Failed,
}

impl std::fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "Idle",
            Self::Cleaning => "Cleaning up",
            Self::Reading => "Reading .deb",
            Self::Decompressing => "Decompressing data archive",
            Self::Materializing => "Creating files",
            Self::Locating => "Locating application bundle",
            Self::Archiving => "Zipping app",
            Self::Renaming => "Renaming .zip to .ipa",
            Self::Done => "Done",
            Self::Failed => "Failed",
        })
    }
}

/// Describes progress of a conversion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConversionEvent {
    /// A stage is starting.
    StageEntered(ConversionStage),

    /// The data archive member with the given name and size was read.
    DataMemberFound(String, usize),

    /// Decompression with the given codec is starting.
    Decompressing(CompressionKind),

    /// The data archive was extracted.
    Materialized(MaterializeStats),

    /// An application bundle with the given name was found.
    BundleFound(String),

    /// A zip with the given number of entries was written to a path.
    ArchiveWritten(PathBuf, usize),

    /// The conversion failed during a stage.
    Failed(ConversionStage, String),
}

impl std::fmt::Display for ConversionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StageEntered(stage) => write!(f, "{}", stage),
            Self::DataMemberFound(name, size) => {
                write!(f, "found {} ({} bytes)", name, size)
            }
            Self::Decompressing(kind) if kind.is_slow() => {
                write!(f, "Decompressing {} data.\nThis might take a while", kind)
            }
            Self::Decompressing(kind) => write!(f, "Decompressing {} data", kind),
            Self::Materialized(stats) => write!(
                f,
                "created {} directories, {} files ({} bytes) and {} symlinks",
                stats.directories, stats.files, stats.bytes_written, stats.symlinks
            ),
            Self::BundleFound(name) => write!(f, "found application bundle {}", name),
            Self::ArchiveWritten(path, count) => {
                write!(f, "wrote {} entries to {}", count, path.display())
            }
            Self::Failed(stage, message) => {
                write!(f, "failed during stage \"{}\": {}", stage, message)
            }
        }
    }
}

/// The outcome of a successful conversion.
///
/// The `.ipa` file at `archive_path` belongs to the caller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConversionResult {
    /// Metadata of the primary (first by name) application bundle.
    pub descriptor: BundleDescriptor,

    /// Path of the produced `.ipa`.
    pub archive_path: PathBuf,

    /// Names of all application bundles in the archive.
    pub bundle_names: Vec<String>,
}

/// Converts `.deb` files to `.ipa` files.
///
/// A converter owns a [ScratchArea]. Conversions take `&mut self`, so a
/// scratch area is only ever used by one conversion at a time.
pub struct DebConverter {
    scratch: ScratchArea,
    output_dir: PathBuf,
    cancel: CancellationToken,
    stage: ConversionStage,
}

impl DebConverter {
    /// Construct a new instance writing `.ipa` files to `output_dir`.
    pub fn new(scratch: ScratchArea, output_dir: impl AsRef<Path>) -> Self {
        Self {
            scratch,
            output_dir: output_dir.as_ref().to_path_buf(),
            cancel: CancellationToken::default(),
            stage: ConversionStage::Idle,
        }
    }

    /// Attach a [CancellationToken] to conversions.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The scratch area used by this converter.
    pub fn scratch(&self) -> &ScratchArea {
        &self.scratch
    }

    /// The directory `.ipa` files are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Change the directory subsequent `.ipa` files are written to.
    pub fn set_output_dir(&mut self, path: impl AsRef<Path>) {
        self.output_dir = path.as_ref().to_path_buf();
    }

    /// The stage the most recent conversion reached.
    pub fn stage(&self) -> ConversionStage {
        self.stage
    }

    fn enter(
        &mut self,
        stage: ConversionStage,
        progress_cb: Option<&dyn Fn(ConversionEvent)>,
    ) -> Result<()> {
        self.cancel.check()?;

        debug!("entering stage {:?}", stage);
        self.stage = stage;
        emit(progress_cb, ConversionEvent::StageEntered(stage));

        Ok(())
    }

    /// Convert a `.deb` file to an `.ipa`.
    ///
    /// The scratch area is purged before anything else happens, so state
    /// left by an earlier run cannot leak into this one. The produced
    /// archive is `<output_dir>/<deb file stem>.ipa`, replacing any existing
    /// file.
    ///
    /// `progress_cb` receives events in stage order. It is called on the
    /// calling thread.
    pub fn convert(
        &mut self,
        deb_path: &Path,
        progress_cb: Option<&dyn Fn(ConversionEvent)>,
    ) -> Result<ConversionResult> {
        info!("converting {}", deb_path.display());

        match self.run(deb_path, progress_cb) {
            Ok(res) => {
                self.stage = ConversionStage::Done;
                emit(progress_cb, ConversionEvent::StageEntered(ConversionStage::Done));
                info!(
                    "wrote {} for {}",
                    res.archive_path.display(),
                    res.descriptor
                );
                Ok(res)
            }
            Err(e) => {
                let stage = self.stage;
                warn!("conversion failed during {:?}: {}", stage, e);
                self.stage = ConversionStage::Failed;
                emit(progress_cb, ConversionEvent::Failed(stage, e.to_string()));
                Err(e)
            }
        }
    }

    fn run(
        &mut self,
        deb_path: &Path,
        progress_cb: Option<&dyn Fn(ConversionEvent)>,
    ) -> Result<ConversionResult> {
        self.enter(ConversionStage::Cleaning, progress_cb)?;
        self.scratch.purge()?;

        self.enter(ConversionStage::Reading, progress_cb)?;
        let fh = std::fs::File::open(deb_path).map_err(|e| open_error(deb_path, e))?;
        let member = find_data_member(std::io::BufReader::new(fh))?;
        emit(
            progress_cb,
            ConversionEvent::DataMemberFound(member.name().to_string(), member.payload().len()),
        );
        std::fs::write(self.scratch.member_path(member.name()), member.payload())?;

        self.enter(ConversionStage::Decompressing, progress_cb)?;
        let kind = CompressionKind::from_member_name(member.name());
        let decompressor = kind.decompressor()?;
        emit(progress_cb, ConversionEvent::Decompressing(kind));
        let tar_data = decompressor.decompress(member.payload())?;
        drop(member);

        self.enter(ConversionStage::Materializing, progress_cb)?;
        let extracted_dir = self.scratch.extracted_dir();
        let stats = materialize_tar(&tar_data, &extracted_dir, &self.cancel)?;
        drop(tar_data);
        emit(progress_cb, ConversionEvent::Materialized(stats));

        self.enter(ConversionStage::Locating, progress_cb)?;
        let bundles = locate_bundles(&extracted_dir)?;
        for bundle in &bundles {
            emit(progress_cb, ConversionEvent::BundleFound(bundle.name().to_string()));
        }
        if bundles.len() > 1 {
            warn!(
                "found {} application bundles; using metadata of {}",
                bundles.len(),
                bundles[0].name()
            );
        }

        self.enter(ConversionStage::Archiving, progress_cb)?;
        let staged = stage_payload(&self.scratch.payload_dir(), &bundles)?;
        let descriptor = staged
            .first()
            .map(|bundle| bundle.descriptor())
            .unwrap_or_default();
        let output_dir = self.output_dir.clone();
        let archive_path = write_ipa(
            &self.scratch.payload_dir(),
            &output_dir,
            &archive_stem(deb_path),
            |zip_path, count| {
                emit(
                    progress_cb,
                    ConversionEvent::ArchiveWritten(zip_path.to_path_buf(), count),
                );
                self.enter(ConversionStage::Renaming, progress_cb)
            },
        )?;

        Ok(ConversionResult {
            descriptor,
            archive_path,
            bundle_names: staged.iter().map(|b| b.name().to_string()).collect(),
        })
    }

    /// Remove all intermediate state from the scratch area.
    ///
    /// Call this once the produced archive has been consumed. Produced
    /// archives live outside the scratch area and are not touched. Calling
    /// this repeatedly is harmless.
    pub fn cleanup(&mut self) -> Result<()> {
        info!("cleaning up {}", self.scratch.root().display());
        self.scratch.purge()?;
        self.stage = ConversionStage::Idle;

        Ok(())
    }
}

fn emit(progress_cb: Option<&dyn Fn(ConversionEvent)>, event: ConversionEvent) {
    if let Some(cb) = progress_cb {
        cb(event);
    }
}

/// Classify a failure to open the source `.deb`.
fn open_error(path: &Path, e: std::io::Error) -> ConversionError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ConversionError::NoPermission(path.to_path_buf())
    } else {
        ConversionError::Io(e)
    }
}

/// The file name stem of the produced archive.
fn archive_stem(deb_path: &Path) -> String {
    deb_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "package".to_string())
}
