//! Partitioning of the source into fixed-size offset windows.

use serde::{Deserialize, Serialize};

/// A contiguous range of source records, the unit of concurrent fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchWindow {
    /// Position of the window in the partition (offset / batch size).
    pub index: usize,
    pub offset: u64,
    pub size: u64,
}

impl BatchWindow {
    /// One past the last record covered by this window.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Split `[0, total_records)` into windows of `batch_size` records.
///
/// The windows are non-overlapping, cover the range without gaps, and only
/// the last one may be shorter than `batch_size`. Returns no windows when
/// `total_records` or `batch_size` is zero.
pub fn partition(total_records: u64, batch_size: u64) -> Vec<BatchWindow> {
    if total_records == 0 || batch_size == 0 {
        return Vec::new();
    }

    let count = total_records.div_ceil(batch_size);
    (0..count)
        .map(|i| {
            let offset = i * batch_size;
            BatchWindow {
                index: i as usize,
                offset,
                size: batch_size.min(total_records - offset),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assert_tiles(total: u64, batch: u64) {
        let windows = partition(total, batch);
        assert_eq!(windows.len() as u64, total.div_ceil(batch));

        let mut next = 0;
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.index, i);
            assert_eq!(w.offset, next, "gap or overlap before window {i}");
            assert!(w.size > 0 && w.size <= batch);
            next = w.end();
        }
        assert_eq!(next, total);
    }

    #[test]
    fn test_partition_tiles_range() {
        for (total, batch) in [(1, 1), (10, 3), (10, 5), (10, 10), (10, 50), (99_999, 50_000)] {
            assert_tiles(total, batch);
        }
    }

    #[test]
    fn test_partition_last_window_shorter() {
        let windows = partition(7, 3);
        assert_eq!(
            windows,
            vec![
                BatchWindow { index: 0, offset: 0, size: 3 },
                BatchWindow { index: 1, offset: 3, size: 3 },
                BatchWindow { index: 2, offset: 6, size: 1 },
            ]
        );
    }

    #[test]
    fn test_partition_empty_source() {
        assert!(partition(0, 100).is_empty());
    }
}
