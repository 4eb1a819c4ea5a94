//! Offline appearance library: training, persistence and the on-disk folder.

mod folder;
mod harvest;
mod model;

#[cfg(test)]
mod tests;

pub use folder::{LibraryFolder, MODEL_FILE_NAME};
pub use harvest::{HarvestSummary, harvest};
pub use model::LibraryModel;
pub(crate) use model::dot;
