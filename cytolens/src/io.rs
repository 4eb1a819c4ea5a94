//! Decoding and encoding of raster files through the `image` crate.
//!
//! The segmentation and classification core never touches files; drivers,
//! the library folder and the harvester go through these helpers.

use std::path::Path;

use common::Buffer2;

use crate::error::ImageLoadError;
use crate::image::CellImage;

/// Decodes png/jpeg/tiff into an 8-bit grey or RGB image.
pub fn load_image(path: &Path) -> Result<CellImage, ImageLoadError> {
    let decoded = image::open(path).map_err(|source| ImageLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let (cols, rows) = (decoded.width() as usize, decoded.height() as usize);
    if rows == 0 || cols == 0 {
        return Err(ImageLoadError::UnsupportedLayout {
            path: path.to_path_buf(),
            reason: "image has no pixels".into(),
        });
    }

    if decoded.color().has_color() {
        Ok(CellImage::new_rgb(rows, cols, decoded.to_rgb8().into_raw()))
    } else {
        Ok(CellImage::new_gray(rows, cols, decoded.to_luma8().into_raw()))
    }
}

/// Decodes a stored patch as a single grey plane.
pub fn load_gray(path: &Path) -> Result<Buffer2<u8>, ImageLoadError> {
    let decoded = image::open(path).map_err(|source| ImageLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let (cols, rows) = (decoded.width() as usize, decoded.height() as usize);
    Ok(Buffer2::new(rows, cols, decoded.to_luma8().into_raw()))
}

/// Encodes a grey plane; the format follows the extension of `path`.
pub fn save_gray(path: &Path, pixels: &Buffer2<u8>) -> Result<(), ImageLoadError> {
    let buffer = image::GrayImage::from_raw(
        pixels.cols() as u32,
        pixels.rows() as u32,
        pixels.data().to_vec(),
    )
    .ok_or_else(|| ImageLoadError::UnsupportedLayout {
        path: path.to_path_buf(),
        reason: format!("{}x{} grey buffer", pixels.rows(), pixels.cols()),
    })?;

    buffer.save(path).map_err(|source| ImageLoadError::Encode {
        path: path.to_path_buf(),
        source,
    })
}
