//! 8-bit raster images handed to the segmenter and patch extractor.

use common::Buffer2;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Colour channel inspected on three-channel images. Ignored for grey images.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Channel {
    #[strum(to_string = "Red", serialize = "R")]
    Red,
    #[strum(to_string = "Green", serialize = "G")]
    Green,
    #[default]
    #[strum(to_string = "Blue", serialize = "B")]
    Blue,
}

impl Channel {
    /// Offset of the channel inside an interleaved RGB pixel.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

/// Grey or RGB image, samples interleaved per pixel, origin top-left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellImage {
    rows: usize,
    cols: usize,
    channels: usize,
    data: Vec<u8>,
}

impl CellImage {
    pub fn new_gray(rows: usize, cols: usize, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), rows * cols, "grey data length mismatch");
        Self {
            rows,
            cols,
            channels: 1,
            data,
        }
    }

    /// `data` holds `rows * cols` pixels in R, G, B order.
    pub fn new_rgb(rows: usize, cols: usize, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), rows * cols * 3, "rgb data length mismatch");
        Self {
            rows,
            cols,
            channels: 3,
            data,
        }
    }

    /// Ingests samples in `[0, 1]`, scaling them by 255.
    pub fn from_unit_floats(rows: usize, cols: usize, channels: usize, samples: &[f32]) -> Self {
        assert!(channels == 1 || channels == 3, "channels must be 1 or 3");
        let data = samples
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0) as u8)
            .collect();
        if channels == 1 {
            Self::new_gray(rows, cols, data)
        } else {
            Self::new_rgb(rows, cols, data)
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn is_gray(&self) -> bool {
        self.channels == 1
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Sample of `channel` at `(row, col)`; grey images ignore `channel`.
    #[inline]
    pub fn sample(&self, row: usize, col: usize, channel: Channel) -> u8 {
        let base = (row * self.cols + col) * self.channels;
        if self.is_gray() {
            self.data[base]
        } else {
            self.data[base + channel.index()]
        }
    }

    /// Pixel as RGB, grey replicated into all three channels.
    #[inline]
    pub fn rgb(&self, row: usize, col: usize) -> [u8; 3] {
        let base = (row * self.cols + col) * self.channels;
        if self.is_gray() {
            let v = self.data[base];
            [v, v, v]
        } else {
            [self.data[base], self.data[base + 1], self.data[base + 2]]
        }
    }

    /// Single-channel plane used for thresholding and patch extraction.
    pub fn plane(&self, channel: Channel) -> Buffer2<u8> {
        if self.is_gray() {
            return Buffer2::new(self.rows, self.cols, self.data.clone());
        }
        let offset = channel.index();
        let data = self
            .data
            .chunks_exact(3)
            .map(|pixel| pixel[offset])
            .collect();
        Buffer2::new(self.rows, self.cols, data)
    }
}

impl From<Buffer2<u8>> for CellImage {
    fn from(buffer: Buffer2<u8>) -> Self {
        let rows = buffer.rows();
        let cols = buffer.cols();
        Self::new_gray(rows, cols, buffer.into_vec())
    }
}
