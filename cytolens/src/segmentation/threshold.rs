//! Global histogram thresholds and mask binarisation.
//!
//! Both selectors return the level `t` of a binary split where "above" means
//! `value > t`. The Triangle selector may return `-1` (every sample above).

use common::{BitBuffer2, Buffer2};

use super::config::{Illumination, ThresholdMethod};

const LEVELS: usize = 256;

pub fn histogram(plane: &Buffer2<u8>) -> [u64; LEVELS] {
    let mut hist = [0u64; LEVELS];
    for &v in plane.iter() {
        hist[v as usize] += 1;
    }
    hist
}

/// Level maximising the between-class variance.
pub fn otsu(hist: &[u64; LEVELS]) -> i32 {
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0;
    }
    let total = total as f64;
    let mu: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum::<f64>()
        / total;

    let mut mu1 = 0.0f64;
    let mut q1 = 0.0f64;
    let mut max_sigma = 0.0f64;
    let mut max_val = 0i32;

    for (i, &h) in hist.iter().enumerate() {
        let p_i = h as f64 / total;
        mu1 *= q1;
        q1 += p_i;
        let q2 = 1.0 - q1;

        if q1.min(q2) < f32::EPSILON as f64 || q1.max(q2) > 1.0 - f32::EPSILON as f64 {
            continue;
        }

        mu1 = (mu1 + i as f64 * p_i) / q1;
        let mu2 = (mu - q1 * mu1) / q2;
        let sigma = q1 * q2 * (mu1 - mu2) * (mu1 - mu2);
        if sigma > max_sigma {
            max_sigma = sigma;
            max_val = i as i32;
        }
    }
    max_val
}

/// Triangle heuristic: the level farthest from the line joining the histogram
/// peak to the far end of the longer tail, shifted one level towards the tail.
pub fn triangle(hist: &[u64; LEVELS]) -> i32 {
    let n = LEVELS as i64;
    let mut h: Vec<i64> = hist.iter().map(|&v| v as i64).collect();

    let mut left_bound = h.iter().position(|&v| v > 0).unwrap_or(0) as i64;
    if left_bound > 0 {
        left_bound -= 1;
    }

    let mut right_bound = (1..LEVELS).rev().find(|&i| h[i] > 0).unwrap_or(0) as i64;
    if right_bound < n - 1 {
        right_bound += 1;
    }

    let mut max = 0i64;
    let mut max_ind = 0i64;
    for (i, &v) in h.iter().enumerate() {
        if v > max {
            max = v;
            max_ind = i as i64;
        }
    }

    let flipped = max_ind - left_bound < right_bound - max_ind;
    if flipped {
        h.reverse();
        left_bound = n - 1 - right_bound;
        max_ind = n - 1 - max_ind;
    }

    let mut thresh = left_bound;
    let a = max;
    let b = left_bound - max_ind;
    let mut dist = 0i64;
    for i in (left_bound + 1)..=max_ind {
        let candidate = a * i + b * h[i as usize];
        if candidate > dist {
            dist = candidate;
            thresh = i;
        }
    }
    thresh -= 1;

    if flipped {
        thresh = n - 1 - thresh;
    }
    thresh as i32
}

pub fn select_threshold(plane: &Buffer2<u8>, method: ThresholdMethod) -> i32 {
    let hist = histogram(plane);
    match method {
        ThresholdMethod::Otsu => otsu(&hist),
        ThresholdMethod::Triangle => triangle(&hist),
    }
}

/// Foreground mask of `plane` at `threshold` for the given polarity.
pub fn binarize(plane: &Buffer2<u8>, threshold: i32, illumination: Illumination) -> BitBuffer2 {
    BitBuffer2::from_fn(plane.rows(), plane.cols(), |row, col| {
        let above = plane[(row, col)] as i32 > threshold;
        match illumination {
            Illumination::BrightField => !above,
            Illumination::Fluorescence => above,
        }
    })
}
