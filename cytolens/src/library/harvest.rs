//! Library bootstrapping: cut every in-bounds cell out of raw images.

use std::path::{Path, PathBuf};

use common::{CancelToken, file_utils};

use crate::error::{Error, Result};
use crate::io;
use crate::patch::{self, CellPatch};
use crate::segmentation::Segmenter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub images: usize,
    pub written: usize,
    pub edge_cells: usize,
    /// Images that could not be decoded, with the reason.
    pub failures: Vec<(PathBuf, String)>,
    pub cancelled: bool,
}

/// Writes `{image}_{cell}.tif` into `output_dir` for every non-edge cell
/// found in the images of `images_dir`. Cells are numbered from 1 in locate
/// order, edge cells included.
pub fn harvest(
    images_dir: &Path,
    output_dir: &Path,
    segmenter: &Segmenter,
    patch_config: &patch::Config,
    cancel: &CancelToken,
) -> Result<HarvestSummary> {
    patch_config.validate()?;
    std::fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;
    let files = file_utils::image_files(images_dir).map_err(|e| Error::io(images_dir, e))?;

    let mut summary = HarvestSummary::default();
    for file in files {
        if cancel.is_cancelled() {
            tracing::info!("Harvest cancelled");
            summary.cancelled = true;
            break;
        }

        let image = match io::load_image(&file) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Skipping image: {e}");
                summary.failures.push((file.clone(), e.to_string()));
                continue;
            }
        };
        summary.images += 1;

        let stem = file_utils::file_stem(&file);
        let centroids = segmenter.detect(&image);
        for (index, centroid) in centroids.iter().enumerate() {
            let cell = patch::extract(
                &image,
                *centroid,
                patch_config.radius,
                patch_config.channel,
                patch_config.depth,
            );
            match cell {
                CellPatch::Cell(pixels) => {
                    let path = output_dir.join(format!("{}_{}.tif", stem, index + 1));
                    io::save_gray(&path, &pixels)?;
                    summary.written += 1;
                }
                CellPatch::Edge => summary.edge_cells += 1,
            }
        }
        tracing::info!("{}: {} cells", file.display(), centroids.len());
    }
    Ok(summary)
}
