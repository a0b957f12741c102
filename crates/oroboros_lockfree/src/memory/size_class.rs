//! # Size Classes
//!
//! Power-of-two classes `MIN_SIZE << 0 ..= MIN_SIZE << (max_power - min_power)`.
//! Dispatch is a bit-scan, no loop:
//!
//! ```text
//! units = ceil(size / MIN_SIZE)            (at least 1)
//! index = ceil(log2(units))                = BITS - leading_zeros(units - 1)
//! ```

/// Power-of-two size classes between `2^min_power` and `2^max_power` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeClasses {
    min_power: u32,
    max_power: u32,
}

impl SizeClasses {
    /// Creates the class table.
    ///
    /// # Panics
    ///
    /// Panics (at compile time when used in a const) if `min_power > max_power`
    /// or `max_power` does not fit a `usize` shift.
    #[must_use]
    pub const fn new(min_power: u32, max_power: u32) -> Self {
        assert!(min_power <= max_power, "min size power above max size power");
        assert!(max_power < usize::BITS, "max size power overflows usize");
        Self {
            min_power,
            max_power,
        }
    }

    /// Smallest class size in bytes.
    #[inline]
    #[must_use]
    pub const fn min_size(&self) -> usize {
        1 << self.min_power
    }

    /// Largest class size in bytes.
    #[inline]
    #[must_use]
    pub const fn max_size(&self) -> usize {
        1 << self.max_power
    }

    /// Number of classes.
    #[inline]
    #[must_use]
    pub const fn count(&self) -> usize {
        (self.max_power - self.min_power + 1) as usize
    }

    /// Size in bytes of class `index`.
    #[inline]
    #[must_use]
    pub const fn class_size(&self, index: usize) -> usize {
        self.min_size() << index
    }

    /// Class that serves a request of `target` bytes, or `None` above the
    /// largest class. Zero maps to the smallest class.
    #[inline]
    #[must_use]
    pub const fn index_for(&self, target: usize) -> Option<usize> {
        if target > self.max_size() {
            return None;
        }
        let units = target.div_ceil(self.min_size());
        if units <= 1 {
            return Some(0);
        }
        Some((usize::BITS - (units - 1).leading_zeros()) as usize)
    }

    /// Splits the byte range `[start, end)` of a slab into maximal pieces that
    /// are powers of two, naturally aligned, and within the class range.
    ///
    /// Offsets must be relative to a base aligned to [`Self::max_size`].
    /// Bytes that cannot form a minimum-size piece are skipped.
    #[must_use]
    pub const fn fragments(&self, start: usize, end: usize) -> Fragments {
        Fragments {
            classes: *self,
            offset: start,
            end,
        }
    }
}

/// Iterator over `(offset, class index)` pieces of a leftover range.
#[derive(Clone, Debug)]
pub struct Fragments {
    classes: SizeClasses,
    offset: usize,
    end: usize,
}

impl Iterator for Fragments {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let min = self.classes.min_size();
        let max = self.classes.max_size();

        let start = self.offset.checked_next_multiple_of(min)?;
        if start >= self.end || self.end - start < min {
            self.offset = self.end;
            return None;
        }

        // Largest power of two that both the offset's alignment and the
        // remaining length allow.
        let align_limit = if start == 0 {
            max
        } else {
            (1usize << start.trailing_zeros()).min(max)
        };
        let room = 1usize << (self.end - start).ilog2();
        let piece = align_limit.min(room).min(max);

        self.offset = start + piece;
        let index = (piece.trailing_zeros() - min.trailing_zeros()) as usize;
        Some((start, index))
    }
}
