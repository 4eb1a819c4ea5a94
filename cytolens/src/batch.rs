//! Depth-bounded walk over nested image folders, one report per folder.

use std::path::{Path, PathBuf};

use common::{CancelToken, file_utils};

use crate::classifier::{self, HumanVerifier};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::report::{FolderReport, ReportSettings};

/// Deepest subfolder level that is still visited; the root is level 0.
pub const MAX_DEPTH: usize = 5;

/// Folders with this name hold rendered output and are never analysed.
pub const SKIPPED_FOLDER: &str = "Labelled";

#[derive(Debug, Clone, PartialEq)]
pub struct FolderOutcome {
    pub folder: PathBuf,
    pub report_path: PathBuf,
    pub report: FolderReport,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalkSummary {
    /// Analysed folders, parents before their subfolders.
    pub folders: Vec<FolderOutcome>,
    pub cancelled: bool,
}

impl WalkSummary {
    pub fn cell_count(&self) -> usize {
        self.folders.iter().map(|f| f.report.total_cells).sum()
    }
}

pub struct FolderWalker<'p, 'm> {
    pipeline: &'p Pipeline<'m>,
    library_folder: PathBuf,
}

impl<'p, 'm> FolderWalker<'p, 'm> {
    pub fn new(pipeline: &'p Pipeline<'m>, library_folder: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            library_folder: library_folder.into(),
        }
    }

    /// Analyses `root` and its subfolders down to [`MAX_DEPTH`], writing a
    /// report into every folder that holds images.
    pub fn walk(
        &self,
        root: &Path,
        mut verifier: Option<&mut dyn HumanVerifier>,
        cancel: &CancelToken,
    ) -> Result<WalkSummary> {
        self.pipeline.require_verifier(verifier.is_some())?;
        let mut summary = WalkSummary::default();
        self.visit(root, 0, &mut verifier, cancel, &mut summary)?;
        if summary.cancelled {
            tracing::info!(
                "Folder walk cancelled after {} folders",
                summary.folders.len()
            );
        }
        Ok(summary)
    }

    fn visit(
        &self,
        folder: &Path,
        depth: usize,
        verifier: &mut Option<&mut dyn HumanVerifier>,
        cancel: &CancelToken,
        summary: &mut WalkSummary,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            return Ok(());
        }
        self.process_folder(folder, verifier, cancel, summary)?;
        if summary.cancelled || depth >= MAX_DEPTH {
            return Ok(());
        }

        let subfolders = file_utils::subdirectories(folder).map_err(|e| Error::io(folder, e))?;
        for subfolder in subfolders {
            if is_skipped(&subfolder) {
                tracing::debug!("Skipping {}", subfolder.display());
                continue;
            }
            self.visit(&subfolder, depth + 1, verifier, cancel, summary)?;
            if summary.cancelled {
                return Ok(());
            }
        }
        Ok(())
    }

    fn process_folder(
        &self,
        folder: &Path,
        verifier: &mut Option<&mut dyn HumanVerifier>,
        cancel: &CancelToken,
        summary: &mut WalkSummary,
    ) -> Result<()> {
        let images = file_utils::image_files(folder).map_err(|e| Error::io(folder, e))?;
        if images.is_empty() {
            tracing::debug!("No images in {}", folder.display());
            return Ok(());
        }
        tracing::info!("Analysing {} images in {}", images.len(), folder.display());

        let batch = self
            .pipeline
            .run_batch(&images, classifier::reborrow(verifier), cancel)?;
        let settings = ReportSettings {
            image_folder: folder.to_path_buf(),
            library_folder: self.library_folder.clone(),
            config: self.pipeline.config().clone(),
        };
        let report = FolderReport::build(
            file_utils::file_stem(folder),
            settings,
            self.pipeline.categories(),
            &batch,
        );
        let report_path = report.write(folder)?;

        summary.cancelled |= batch.cancelled;
        summary.folders.push(FolderOutcome {
            folder: folder.to_path_buf(),
            report_path,
            report,
        });
        Ok(())
    }
}

fn is_skipped(folder: &Path) -> bool {
    folder
        .file_name()
        .is_some_and(|name| name == SKIPPED_FOLDER)
}
