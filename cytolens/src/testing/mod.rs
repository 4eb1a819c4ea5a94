//! Synthetic images and patches for tests and benches.

use std::collections::BTreeMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::image::{CellImage, Channel};
use crate::library::LibraryModel;
use crate::patch::{self, CellPatch};
use crate::segmentation;

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Filled disk centred at `(row, col)`.
#[derive(Debug, Clone, Copy)]
pub struct Disk {
    pub row: f32,
    pub col: f32,
    pub radius: f32,
}

impl Disk {
    pub fn new(row: f32, col: f32, radius: f32) -> Self {
        Self { row, col, radius }
    }

    #[inline]
    fn contains(&self, row: usize, col: usize) -> bool {
        let dr = row as f32 - self.row;
        let dc = col as f32 - self.col;
        dr * dr + dc * dc <= self.radius * self.radius
    }
}

/// Grey image of `disks` painted with `foreground` over `background`.
pub fn disk_image(
    rows: usize,
    cols: usize,
    disks: &[Disk],
    background: u8,
    foreground: u8,
) -> CellImage {
    let mut data = vec![background; rows * cols];
    for row in 0..rows {
        for col in 0..cols {
            if disks.iter().any(|d| d.contains(row, col)) {
                data[row * cols + col] = foreground;
            }
        }
    }
    CellImage::new_gray(rows, cols, data)
}

/// RGB image whose disks only differ from the background in `channel_index`.
pub fn rgb_disk_image(
    rows: usize,
    cols: usize,
    disks: &[Disk],
    channel_index: usize,
    background: u8,
    foreground: u8,
) -> CellImage {
    let mut data = vec![background; rows * cols * 3];
    for row in 0..rows {
        for col in 0..cols {
            if disks.iter().any(|d| d.contains(row, col)) {
                data[(row * cols + col) * 3 + channel_index] = foreground;
            }
        }
    }
    CellImage::new_rgb(rows, cols, data)
}

/// Adds uniform integer noise in `[-amplitude, amplitude]` with a fixed seed.
pub fn add_noise(image: &CellImage, amplitude: i16, seed: u64) -> CellImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<u8> = image
        .data()
        .iter()
        .map(|&v| {
            let delta = rng.random_range(-amplitude..=amplitude);
            (v as i16 + delta).clamp(0, 255) as u8
        })
        .collect();
    if image.is_gray() {
        CellImage::new_gray(image.rows(), image.cols(), data)
    } else {
        CellImage::new_rgb(image.rows(), image.cols(), data)
    }
}

/// Grey image of `side`×`side` with a radial profile whose ring sits at
/// `ring_radius`, used as a stand-in for one cell appearance.
pub fn ring_patch_image(side: usize, ring_radius: f32, seed: u64, noise: i16) -> CellImage {
    let centre = (side as f32 - 1.0) / 2.0;
    let mut data = Vec::with_capacity(side * side);
    for row in 0..side {
        for col in 0..side {
            let r = ((row as f32 - centre).powi(2) + (col as f32 - centre).powi(2)).sqrt();
            let v = 255.0 * (-(r - ring_radius).powi(2) / 4.0).exp();
            data.push(v.round() as u8);
        }
    }
    let image = CellImage::new_gray(side, side, data);
    if noise > 0 {
        add_noise(&image, noise, seed)
    } else {
        image
    }
}

/// Quantised patch covering the whole of `image`.
pub fn quantized(image: &CellImage, depth: u8) -> CellPatch {
    CellPatch::Cell(patch::quantize(&image.plane(Channel::Blue), depth))
}

/// Dark disks ("round") and bright rings ("ring") of `side`×`side` pixels.
pub fn disk_and_ring_sets(side: usize) -> BTreeMap<String, Vec<CellPatch>> {
    let centre = (side as f32 - 1.0) / 2.0;
    let round = [0.30f32, 0.36, 0.42]
        .iter()
        .map(|share| {
            let disk = Disk::new(centre, centre, share * side as f32);
            quantized(&disk_image(side, side, &[disk], 200, 60), 3)
        })
        .collect();
    let ring = [0.20f32, 0.26, 0.32]
        .iter()
        .enumerate()
        .map(|(seed, share)| {
            quantized(&ring_patch_image(side, share * side as f32, seed as u64, 6), 3)
        })
        .collect();

    let mut sets = BTreeMap::new();
    sets.insert("round".to_string(), round);
    sets.insert("ring".to_string(), ring);
    sets
}

pub fn disk_and_ring_model(side: usize) -> LibraryModel {
    LibraryModel::train(&disk_and_ring_sets(side)).unwrap()
}

/// 100×100 bright-field scene: one disk clipped by the top border and two
/// whole disks of radius `radius`.
pub fn cell_scene(radius: f32) -> CellImage {
    disk_image(
        100,
        100,
        &[
            Disk::new(8.0, 50.0, 10.0),
            Disk::new(30.0, 30.0, radius),
            Disk::new(70.0, 68.0, radius),
        ],
        200,
        60,
    )
}

/// Segmentation settings sized for the synthetic scenes.
pub fn scene_segmentation() -> segmentation::Config {
    segmentation::Config {
        min_size: 200,
        ..segmentation::Config::default()
    }
}

pub fn save_scene(path: &Path, image: &CellImage) {
    crate::io::save_gray(path, &image.plane(Channel::Blue)).unwrap();
}
