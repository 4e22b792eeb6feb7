use core::ops::Range;

pub(crate) trait RangeSplitAtHalf: Sized {
    /// Split into two halves; the right half takes the extra element.
    fn split_at_half(self) -> (Self, Self);
}

impl RangeSplitAtHalf for Range<usize> {
    #[inline]
    fn split_at_half(self) -> (Self, Self) {
        debug_assert!(self.start <= self.end, "RangeSplitAtHalf: inverted range");
        let mid = self.start + self.len() / 2;
        (self.start..mid, mid..self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::RangeSplitAtHalf;

    #[test]
    fn halves_cover_the_range() {
        assert_eq!((0..5).split_at_half(), (0..2, 2..5));
        assert_eq!((3..5).split_at_half(), (3..4, 4..5));
        assert_eq!((7..8).split_at_half(), (7..7, 7..8));
        assert_eq!((4..4).split_at_half(), (4..4, 4..4));
    }
}
