//! Category-per-subfolder patch library on disk.
//!
//! ```text
//! library/
//!   library_model.bin
//!   Lymphocyte/  *.tif
//!   Neutrophil/  *.tif
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use common::file_utils;

use super::model::LibraryModel;
use crate::error::{Error, Result};
use crate::io;
use crate::patch::CellPatch;

/// File name of the trained model inside a library folder.
pub const MODEL_FILE_NAME: &str = "library_model.bin";

#[derive(Debug, Clone)]
pub struct LibraryFolder {
    root: PathBuf,
}

impl LibraryFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_path(&self) -> PathBuf {
        self.root.join(MODEL_FILE_NAME)
    }

    /// Subfolder names, sorted.
    pub fn categories(&self) -> Result<Vec<String>> {
        let dirs = file_utils::subdirectories(&self.root).map_err(|e| Error::io(&self.root, e))?;
        Ok(dirs
            .iter()
            .filter_map(|d| d.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    /// Reads every image of every category as a patch. Unreadable files are
    /// skipped with a warning.
    pub fn load_patches(&self) -> Result<BTreeMap<String, Vec<CellPatch>>> {
        let mut sets = BTreeMap::new();
        for category in self.categories()? {
            let dir = self.root.join(&category);
            let files = file_utils::image_files(&dir).map_err(|e| Error::io(&dir, e))?;
            let mut patches = Vec::with_capacity(files.len());
            for file in files {
                match io::load_gray(&file) {
                    Ok(pixels) => patches.push(CellPatch::Cell(pixels)),
                    Err(e) => tracing::warn!("Skipping library patch: {e}"),
                }
            }
            tracing::debug!("Category '{}': {} patches", category, patches.len());
            sets.insert(category, patches);
        }
        Ok(sets)
    }

    /// Trains a model from the folder contents and stores it next to them.
    pub fn compile(&self) -> Result<LibraryModel> {
        let sets = self.load_patches()?;
        let model = LibraryModel::train(&sets)?;
        model.save(&self.model_path())?;
        Ok(model)
    }

    pub fn load_model(&self) -> Result<LibraryModel> {
        LibraryModel::load(&self.model_path())
    }

    /// Stores a human-verified patch in `category`'s folder for a later
    /// retrain and returns the written path.
    pub fn archive_verified(&self, category: &str, patch: &CellPatch) -> Result<PathBuf> {
        let Some(pixels) = patch.pixels() else {
            return Err(Error::config("edge sentinel cannot be archived"));
        };
        let dir = self.root.join(category);
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut path = dir.join(format!("verified_{stamp}.tif"));
        let mut suffix = 1;
        while path.exists() {
            path = dir.join(format!("verified_{stamp}_{suffix}.tif"));
            suffix += 1;
        }

        io::save_gray(&path, pixels)?;
        tracing::info!("Archived verified '{}' patch to {}", category, path.display());
        Ok(path)
    }
}
