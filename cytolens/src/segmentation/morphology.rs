//! Binary morphology with a 3×3 square structuring element.
//!
//! Pixels outside the image never influence the result: erosion treats them
//! as foreground and dilation as background.

use std::collections::VecDeque;

use common::BitBuffer2;
use common::buffer2::NEIGHBOURS_4;

fn step(mask: &BitBuffer2, dilate: bool) -> BitBuffer2 {
    let rows = mask.rows();
    let cols = mask.cols();
    BitBuffer2::from_fn(rows, cols, |row, col| {
        let r0 = row.saturating_sub(1);
        let r1 = (row + 1).min(rows - 1);
        let c0 = col.saturating_sub(1);
        let c1 = (col + 1).min(cols - 1);
        let mut any = false;
        let mut all = true;
        for r in r0..=r1 {
            for c in c0..=c1 {
                let v = mask.at(r, c);
                any |= v;
                all &= v;
            }
        }
        if dilate { any } else { all }
    })
}

pub fn erode(mask: &BitBuffer2, iterations: usize) -> BitBuffer2 {
    let mut out = mask.clone();
    for _ in 0..iterations {
        if out.is_empty() {
            break;
        }
        out = step(&out, false);
    }
    out
}

pub fn dilate(mask: &BitBuffer2, iterations: usize) -> BitBuffer2 {
    let mut out = mask.clone();
    for _ in 0..iterations {
        if out.is_empty() {
            break;
        }
        out = step(&out, true);
    }
    out
}

/// Erosion followed by dilation, each repeated `iterations` times.
pub fn open(mask: &BitBuffer2, iterations: usize) -> BitBuffer2 {
    dilate(&erode(mask, iterations), iterations)
}

/// Sets every background pixel that cannot reach the image border through
/// 4-connected background.
pub fn fill_holes(mask: &BitBuffer2) -> BitBuffer2 {
    let rows = mask.rows();
    let cols = mask.cols();
    let mut outside = BitBuffer2::new_default(rows, cols);
    let mut queue = VecDeque::new();

    for row in 0..rows {
        for col in 0..cols {
            let on_frame = row == 0 || col == 0 || row + 1 == rows || col + 1 == cols;
            if on_frame && !mask.at(row, col) {
                outside.set_at(row, col, true);
                queue.push_back((row, col));
            }
        }
    }

    while let Some((row, col)) = queue.pop_front() {
        for &(dr, dc) in &NEIGHBOURS_4 {
            let r = row as isize + dr;
            let c = col as isize + dc;
            if mask.get_at(r, c) == Some(false) && outside.get_at(r, c) == Some(false) {
                outside.set_at(r as usize, c as usize, true);
                queue.push_back((r as usize, c as usize));
            }
        }
    }

    outside.invert();
    outside
}
