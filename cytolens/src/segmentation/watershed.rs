//! Marker-controlled watershed flooding.
//!
//! Pixels enter a 256-level priority queue keyed by the largest per-channel
//! absolute difference to the labeled neighbour that reached them; within a
//! level the queue is FIFO. Propagation is 4-connected. A pixel reached by two
//! different labels becomes a boundary and does not propagate.

use std::collections::VecDeque;

use common::Buffer2;
use common::buffer2::NEIGHBOURS_4;

use super::region_map::RegionMap;
use crate::image::CellImage;

const LEVELS: usize = 256;

/// Marker state for a pixel that waits in the queue.
const IN_QUEUE: i32 = -2;

#[inline]
fn color_diff(a: [u8; 3], b: [u8; 3]) -> usize {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x.abs_diff(y) as usize)
        .max()
        .unwrap_or(0)
}

struct PriorityQueue {
    levels: Vec<VecDeque<(usize, usize)>>,
    active: usize,
}

impl PriorityQueue {
    fn new() -> Self {
        Self {
            levels: (0..LEVELS).map(|_| VecDeque::new()).collect(),
            active: LEVELS,
        }
    }

    fn push(&mut self, priority: usize, pixel: (usize, usize)) {
        self.levels[priority].push_back(pixel);
        self.active = self.active.min(priority);
    }

    fn pop(&mut self) -> Option<(usize, usize)> {
        while self.active < LEVELS {
            if let Some(pixel) = self.levels[self.active].pop_front() {
                return Some(pixel);
            }
            self.active += 1;
        }
        None
    }
}

/// Floods `markers` in place over `image`.
///
/// `markers` holds background `1`, seeds `>= 2` and `0` for the unknown band.
/// On return the frame is boundary and every pixel is labeled or boundary.
pub fn watershed(image: &CellImage, markers: &mut Buffer2<i32>) {
    let rows = markers.rows();
    let cols = markers.cols();
    assert_eq!((rows, cols), (image.rows(), image.cols()), "marker shape mismatch");

    for row in 0..rows {
        for col in 0..cols {
            if markers.is_frame(row, col) {
                markers[(row, col)] = RegionMap::BOUNDARY;
            } else if markers[(row, col)] < 0 {
                markers[(row, col)] = RegionMap::UNASSIGNED;
            }
        }
    }

    if rows < 3 || cols < 3 {
        return;
    }

    let mut queue = PriorityQueue::new();

    // Initial fronts: unknown pixels touching a labeled one.
    for row in 1..rows - 1 {
        for col in 1..cols - 1 {
            if markers[(row, col)] != RegionMap::UNASSIGNED {
                continue;
            }
            let here = image.rgb(row, col);
            let mut priority = LEVELS;
            for (r, c) in markers.neighbours(row, col, &NEIGHBOURS_4) {
                if markers[(r, c)] > 0 {
                    priority = priority.min(color_diff(here, image.rgb(r, c)));
                }
            }
            if priority < LEVELS {
                queue.push(priority, (row, col));
                markers[(row, col)] = IN_QUEUE;
            }
        }
    }

    while let Some((row, col)) = queue.pop() {
        let mut label = RegionMap::UNASSIGNED;
        for (r, c) in markers.neighbours(row, col, &NEIGHBOURS_4) {
            let t = markers[(r, c)];
            if t > 0 {
                if label == RegionMap::UNASSIGNED {
                    label = t;
                } else if t != label {
                    label = RegionMap::BOUNDARY;
                }
            }
        }
        if label == RegionMap::UNASSIGNED {
            label = RegionMap::BOUNDARY;
        }

        markers[(row, col)] = label;
        if label == RegionMap::BOUNDARY {
            continue;
        }

        let here = image.rgb(row, col);
        for (r, c) in markers.neighbours(row, col, &NEIGHBOURS_4) {
            if markers[(r, c)] == RegionMap::UNASSIGNED {
                queue.push(color_diff(here, image.rgb(r, c)), (r, c));
                markers[(r, c)] = IN_QUEUE;
            }
        }
    }

    // Pockets sealed off by boundaries never receive a label.
    for id in markers.iter_mut() {
        if *id == RegionMap::UNASSIGNED {
            *id = RegionMap::BOUNDARY;
        }
    }
}
