use std::collections::BTreeSet;

use common::Buffer2;

/// Per-pixel region ids produced by the watershed.
///
/// `1` is background, `-1` marks region boundaries and the image frame, and
/// each object carries a distinct id `>= 2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMap {
    ids: Buffer2<i32>,
}

impl RegionMap {
    pub const BOUNDARY: i32 = -1;
    pub const UNASSIGNED: i32 = 0;
    pub const BACKGROUND: i32 = 1;
    pub const FIRST_REGION: i32 = 2;

    pub fn new(ids: Buffer2<i32>) -> Self {
        Self { ids }
    }

    /// Map filled with background and framed by boundary pixels.
    pub fn framed_background(rows: usize, cols: usize) -> Self {
        let mut ids = Buffer2::new_filled(rows, cols, Self::BACKGROUND);
        for row in 0..rows {
            for col in 0..cols {
                if ids.is_frame(row, col) {
                    ids[(row, col)] = Self::BOUNDARY;
                }
            }
        }
        Self { ids }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.ids.rows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.ids.cols()
    }

    #[inline]
    pub fn at(&self, row: usize, col: usize) -> i32 {
        self.ids[(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, id: i32) {
        self.ids[(row, col)] = id;
    }

    #[inline]
    pub fn ids(&self) -> &Buffer2<i32> {
        &self.ids
    }

    /// Number of distinct object ids.
    pub fn region_count(&self) -> usize {
        self.ids
            .iter()
            .filter(|&&id| id >= Self::FIRST_REGION)
            .collect::<BTreeSet<_>>()
            .len()
    }
}
