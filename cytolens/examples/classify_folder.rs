//! Example: Classify every cell in a tree of image folders
//!
//! Loads the trained model of a library, walks the image folder (and its
//! subfolders, skipping `Labelled`) and writes `cytolens_report.json` next to
//! the images of every folder.
//!
//! With `interactive: true` in the configuration, low-confidence cells are
//! shown as ASCII art on the terminal and the category is read from stdin.
//! Verified cells are archived into the library for the next training run.
//!
//! # Usage
//!
//! ```bash
//! CYTOLENS_LIBRARY_DIR=/path/to/library \
//! CYTOLENS_IMAGES_DIR=/path/to/images \
//! CYTOLENS_CONFIG=run.yaml \
//!   cargo run --release --example classify_folder
//! ```

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use cytolens::{
    CancelToken, CellPatch, FolderWalker, HumanVerifier, LibraryFolder, Pipeline, PipelineConfig,
    Verdict,
};

/// Grey ramp used to print patches, darkest first.
const RAMP: &[u8] = b" .:-=+*#%@";

/// Only every n-th row and column is printed.
const PRINT_STRIDE: usize = 4;

/// Asks on the terminal.
struct ConsoleVerifier;

impl ConsoleVerifier {
    fn print_patch(patch: &CellPatch) {
        let Some(pixels) = patch.pixels() else {
            return;
        };
        for row in (0..pixels.rows()).step_by(PRINT_STRIDE) {
            let line: String = (0..pixels.cols())
                .step_by(PRINT_STRIDE)
                .map(|col| {
                    let v = pixels[(row, col)] as usize;
                    RAMP[v * (RAMP.len() - 1) / 255] as char
                })
                .collect();
            println!("{line}");
        }
    }
}

impl HumanVerifier for ConsoleVerifier {
    fn verify(&mut self, patch: &CellPatch, categories: &[String]) -> Verdict {
        Self::print_patch(patch);
        for (index, category) in categories.iter().enumerate() {
            println!("  {}) {}", index + 1, category);
        }
        println!("  i) Ignore");

        let stdin = io::stdin();
        loop {
            print!("Category: ");
            let _ = io::stdout().flush();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => return Verdict::Ignore,
                Ok(_) => {}
            }
            let answer = line.trim();
            if answer.eq_ignore_ascii_case("i") {
                return Verdict::Ignore;
            }
            if let Ok(choice) = answer.parse::<usize>() {
                if let Some(category) = choice.checked_sub(1).and_then(|i| categories.get(i)) {
                    return Verdict::Category(category.clone());
                }
            }
            println!("Enter a number between 1 and {} or 'i'", categories.len());
        }
    }
}

fn main() -> anyhow::Result<()> {
    common::log_setup::setup_logging("classify_folder", "info")?;

    let library_dir = env::var("CYTOLENS_LIBRARY_DIR")
        .map(PathBuf::from)
        .context("CYTOLENS_LIBRARY_DIR environment variable must be set")?;
    let images_dir = env::var("CYTOLENS_IMAGES_DIR")
        .map(PathBuf::from)
        .context("CYTOLENS_IMAGES_DIR environment variable must be set")?;
    let config = match env::var("CYTOLENS_CONFIG") {
        Ok(path) => PipelineConfig::load(path.as_ref())?,
        Err(_) => PipelineConfig::default(),
    };
    let interactive = config.classifier.interactive;

    let library = LibraryFolder::new(&library_dir);
    let model = library.load_model()?;
    let mut pipeline = Pipeline::new(&model, config)?;
    if interactive {
        pipeline = pipeline.with_archive(library);
    }

    let start = Instant::now();
    let walker = FolderWalker::new(&pipeline, &library_dir);
    let mut console = ConsoleVerifier;
    let verifier: Option<&mut dyn HumanVerifier> = if interactive {
        Some(&mut console)
    } else {
        None
    };
    let summary = walker.walk(&images_dir, verifier, &CancelToken::new())?;

    for folder in &summary.folders {
        let report = &folder.report;
        tracing::info!(
            "{}: {} cells, {} identified, mean confidence {:.1}%",
            report.name,
            report.total_cells,
            report.identified,
            report.mean_confidence
        );
        for failure in &report.failures {
            tracing::warn!("{}: {}", failure.name, failure.reason);
        }
    }
    tracing::info!(
        "Classified {} cells in {} folders in {:.1?}",
        summary.cell_count(),
        summary.folders.len(),
        start.elapsed()
    );
    Ok(())
}
