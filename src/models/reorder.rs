/// Vertical extent of a rendered row, in terminal cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    pub top: u16,
    pub height: u16,
}

impl RowBounds {
    pub fn new(top: u16, height: u16) -> Self {
        Self { top, height }
    }

    /// Midpoint doubled, so odd heights compare without rounding
    fn midpoint2(&self) -> u32 {
        self.top as u32 * 2 + self.height as u32
    }

    pub fn contains(&self, y: u16) -> bool {
        y >= self.top && y < self.top.saturating_add(self.height)
    }
}

/// Insertion index for a drop at `pointer_y`: before the first row whose midpoint is
/// below the pointer, or after the last row.
pub fn drop_index(pointer_y: u16, rows: &[RowBounds]) -> usize {
    let y2 = pointer_y as u32 * 2;
    rows.iter()
        .position(|row| y2 < row.midpoint2())
        .unwrap_or(rows.len())
}

/// Final position of an item moved from `from` to insertion index `to` in one list
pub fn adjust_for_removal(from: usize, to: usize) -> usize {
    if from < to {
        to - 1
    } else {
        to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<RowBounds> {
        vec![RowBounds::new(2, 1), RowBounds::new(3, 1), RowBounds::new(4, 2)]
    }

    #[test]
    fn drop_above_everything_is_zero() {
        assert_eq!(drop_index(0, &rows()), 0);
    }

    #[test]
    fn drop_below_everything_is_len() {
        assert_eq!(drop_index(10, &rows()), 3);
        assert_eq!(drop_index(5, &[]), 0);
    }

    #[test]
    fn drop_index_uses_midpoints() {
        let rows = rows();
        // row 0 spans y=2 with midpoint 2.5
        assert_eq!(drop_index(2, &rows), 0);
        assert_eq!(drop_index(3, &rows), 1);
        // row 2 spans y=4..6 with midpoint 5
        assert_eq!(drop_index(4, &rows), 2);
        assert_eq!(drop_index(5, &rows), 3);
    }

    #[test]
    fn drop_index_is_monotonic() {
        let rows = rows();
        let indexes: Vec<usize> = (0..10).map(|y| drop_index(y, &rows)).collect();
        assert!(indexes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn adjust_for_removal_only_shifts_downward_moves() {
        assert_eq!(adjust_for_removal(0, 3), 2);
        assert_eq!(adjust_for_removal(3, 0), 0);
        assert_eq!(adjust_for_removal(2, 2), 2);
    }

    #[test]
    fn contains_respects_height() {
        let row = RowBounds::new(4, 2);
        assert!(!row.contains(3));
        assert!(row.contains(4));
        assert!(row.contains(5));
        assert!(!row.contains(6));
    }
}
