//! Bit-packed 2D buffer for binary masks.
//!
//! Uses 1 bit per element instead of 1 byte. Addressed by `(row, col)` like
//! [`Buffer2`](crate::buffer2::Buffer2); bits past `rows * cols` in the last
//! word are always kept clear.

/// Number of bits per storage word.
const BITS_PER_WORD: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBuffer2 {
    /// Packed bit storage, LSB first.
    words: Vec<u64>,
    rows: usize,
    cols: usize,
    len: usize,
}

impl BitBuffer2 {
    #[inline]
    pub fn new_filled(rows: usize, cols: usize, value: bool) -> Self {
        let len = rows * cols;
        let fill = if value { !0u64 } else { 0u64 };
        let mut buffer = Self {
            words: vec![fill; len.div_ceil(BITS_PER_WORD)],
            rows,
            cols,
            len,
        };
        buffer.clear_tail();
        buffer
    }

    #[inline]
    pub fn new_default(rows: usize, cols: usize) -> Self {
        Self::new_filled(rows, cols, false)
    }

    /// Builds a mask from a predicate evaluated at every `(row, col)`.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut buffer = Self::new_default(rows, cols);
        for row in 0..rows {
            for col in 0..cols {
                if f(row, col) {
                    buffer.set(row * cols + col, true);
                }
            }
        }
        buffer
    }

    /// The slice length must equal `rows * cols`.
    pub fn from_slice(rows: usize, cols: usize, data: &[bool]) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "data length {} does not match dimensions {}x{}",
            data.len(),
            rows,
            cols
        );
        let mut buffer = Self::new_default(rows, cols);
        for (i, &value) in data.iter().enumerate() {
            if value {
                buffer.set(i, true);
            }
        }
        buffer
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
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit at linear index `idx`.
    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len);
        (self.words[idx / BITS_PER_WORD] >> (idx % BITS_PER_WORD)) & 1 != 0
    }

    #[inline]
    pub fn set(&mut self, idx: usize, value: bool) {
        debug_assert!(idx < self.len);
        let mask = 1u64 << (idx % BITS_PER_WORD);
        if value {
            self.words[idx / BITS_PER_WORD] |= mask;
        } else {
            self.words[idx / BITS_PER_WORD] &= !mask;
        }
    }

    #[inline]
    pub fn at(&self, row: usize, col: usize) -> bool {
        debug_assert!(row < self.rows && col < self.cols);
        self.get(row * self.cols + col)
    }

    #[inline]
    pub fn set_at(&mut self, row: usize, col: usize, value: bool) {
        debug_assert!(row < self.rows && col < self.cols);
        self.set(row * self.cols + col, value);
    }

    /// Signed lookup; `None` outside the grid.
    #[inline]
    pub fn get_at(&self, row: isize, col: isize) -> Option<bool> {
        if row < 0 || col < 0 || row as usize >= self.rows || col as usize >= self.cols {
            return None;
        }
        Some(self.at(row as usize, col as usize))
    }

    #[inline]
    pub fn fill(&mut self, value: bool) {
        self.words.fill(if value { !0u64 } else { 0u64 });
        self.clear_tail();
    }

    #[inline]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Flips every bit.
    pub fn invert(&mut self) {
        for word in &mut self.words {
            *word = !*word;
        }
        self.clear_tail();
    }

    /// `self &= !other`.
    pub fn and_not(&mut self, other: &Self) {
        assert_eq!((self.rows, self.cols), (other.rows, other.cols), "shape mismatch");
        for (dst, src) in self.words.iter_mut().zip(&other.words) {
            *dst &= !*src;
        }
    }

    /// Linear indices of all set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut remaining = word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(word_idx * BITS_PER_WORD + bit)
            })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.get(idx))
    }

    fn clear_tail(&mut self) {
        let used = self.len % BITS_PER_WORD;
        if used == 0 {
            return;
        }
        if let Some(last) = self.words.last_mut() {
            *last &= (1u64 << used) - 1;
        }
    }
}
