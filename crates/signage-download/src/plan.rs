//! Chunk plan computation (spec.md §3, "Chunk plan").

/// One `[start, end]` (inclusive) byte range within a file, identified by
/// its index so workers can dispatch in non-decreasing order while chunks
/// arrive in any order (spec.md §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: u64,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Splits `total_size` into fixed-size ranges of `chunk_size`, with the
/// last chunk truncated to whatever remains (spec.md §8, "Boundary
/// behaviours").
pub fn compute_chunk_plan(total_size: u64, chunk_size: u64) -> Vec<ChunkRange> {
    if total_size == 0 || chunk_size == 0 {
        return Vec::new();
    }
    let mut ranges = Vec::new();
    let mut start = 0u64;
    let mut index = 0u64;
    while start < total_size {
        let end = (start + chunk_size - 1).min(total_size - 1);
        ranges.push(ChunkRange { index, start, end });
        start = end + 1;
        index += 1;
    }
    ranges
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn even_division_has_full_last_chunk() {
        let plan = compute_chunk_plan(100, 50);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].len(), 50);
    }

    #[test]
    fn remainder_truncates_last_chunk() {
        let plan = compute_chunk_plan(105, 50);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[2].start, 100);
        assert_eq!(plan[2].end, 104);
        assert_eq!(plan[2].len(), 5);
    }

    #[test]
    fn empty_file_has_no_chunks() {
        assert!(compute_chunk_plan(0, 50).is_empty());
    }

    #[test]
    fn indexes_are_non_decreasing() {
        let plan = compute_chunk_plan(500, 50);
        for (i, range) in plan.iter().enumerate() {
            assert_eq!(range.index, i as u64);
        }
    }
}
