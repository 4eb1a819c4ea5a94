//! Exact Euclidean distance transform (Felzenszwalb & Huttenlocher).

use common::{BitBuffer2, Buffer2};

/// Stand-in for infinity that keeps the parabola arithmetic finite.
const FAR: f64 = 1e20;

/// Distance from every foreground pixel to the nearest background pixel.
/// Background pixels map to 0. A mask without background yields huge values.
pub fn distance_transform(mask: &BitBuffer2) -> Buffer2<f32> {
    let rows = mask.rows();
    let cols = mask.cols();
    let mut sq = Buffer2::from_fn(rows, cols, |r, c| if mask.at(r, c) { FAR } else { 0.0 });

    let longest = rows.max(cols);
    let mut f = vec![0.0f64; longest];
    let mut d = vec![0.0f64; longest];
    let mut v = vec![0usize; longest];
    let mut z = vec![0.0f64; longest + 1];

    for col in 0..cols {
        for row in 0..rows {
            f[row] = sq[(row, col)];
        }
        transform_1d(&f[..rows], &mut d[..rows], &mut v, &mut z);
        for row in 0..rows {
            sq[(row, col)] = d[row];
        }
    }

    for row in 0..rows {
        f[..cols].copy_from_slice(sq.row(row));
        transform_1d(&f[..cols], &mut d[..cols], &mut v, &mut z);
        for col in 0..cols {
            sq[(row, col)] = d[col];
        }
    }

    sq.map(|&v| v.sqrt() as f32)
}

/// Lower envelope of parabolas rooted at `(q, f[q])`.
fn transform_1d(f: &[f64], d: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }

    let intersect = |q: usize, p: usize| {
        let (qf, pf) = (q as f64, p as f64);
        ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
    };

    let mut k = 0usize;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    for q in 1..n {
        let mut s = intersect(q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    k = 0;
    for (q, out) in d.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let dq = q as f64 - v[k] as f64;
        *out = dq * dq + f[v[k]];
    }
}
