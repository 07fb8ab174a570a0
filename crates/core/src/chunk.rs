//! Deterministic fixed-size chunking.

use bytes::Bytes;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;

/// Partition of a file into fixed-size chunks.
///
/// The partition depends only on `file_size` and `chunk_size`. Every chunk is
/// `chunk_size` bytes except the last, which holds the remainder. An empty file
/// has no chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// Create a plan, rejecting a zero chunk size or a chunk count that does
    /// not fit in a `u32` index.
    pub fn new(file_size: u64, chunk_size: u64) -> crate::Result<Self> {
        if chunk_size == 0 {
            return Err(crate::Error::InvalidChunkSize {
                size: 0,
                min: 1,
                max: u64::MAX,
            });
        }
        if file_size.div_ceil(chunk_size) > u64::from(u32::MAX) {
            return Err(crate::Error::TooManyChunks {
                file_size,
                chunk_size,
                max: u64::from(u32::MAX),
            });
        }
        Ok(Self {
            file_size,
            chunk_size,
        })
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Nominal chunk size in bytes.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks, `ceil(file_size / chunk_size)`.
    pub fn chunk_count(&self) -> u32 {
        // Bounded by the check in `new`.
        self.file_size.div_ceil(self.chunk_size) as u32
    }

    /// All chunk indices in order.
    pub fn indices(&self) -> Range<u32> {
        0..self.chunk_count()
    }

    fn check_index(&self, index: u32) -> crate::Result<()> {
        let count = self.chunk_count();
        if index >= count {
            return Err(crate::Error::IndexOutOfRange { index, count });
        }
        Ok(())
    }

    /// Byte range `[start, end)` covered by `index`.
    pub fn range(&self, index: u32) -> crate::Result<Range<u64>> {
        self.check_index(index)?;
        let start = u64::from(index) * self.chunk_size;
        let end = (start + self.chunk_size).min(self.file_size);
        Ok(start..end)
    }

    /// Expected payload length of `index`.
    pub fn expected_len(&self, index: u32) -> crate::Result<u64> {
        let range = self.range(index)?;
        Ok(range.end - range.start)
    }

    /// Indices in `[0, N)` that are not in `persisted`, in ascending order.
    pub fn missing(&self, persisted: &BTreeSet<u32>) -> Vec<u32> {
        self.indices().filter(|i| !persisted.contains(i)).collect()
    }

    /// True when `persisted` is exactly `[0, N)`.
    pub fn is_complete(&self, persisted: &BTreeSet<u32>) -> bool {
        let count = self.chunk_count();
        persisted.len() == count as usize && persisted.iter().all(|&i| i < count)
    }

    /// Lazily split an in-memory buffer along this plan.
    ///
    /// Slices share the buffer's allocation. Panics if `data` is not
    /// `file_size` bytes long.
    pub fn split(self, data: Bytes) -> impl Iterator<Item = Chunk> {
        assert_eq!(
            data.len() as u64,
            self.file_size,
            "buffer length does not match plan"
        );
        self.indices().map(move |index| {
            let start = u64::from(index) * self.chunk_size;
            let end = (start + self.chunk_size).min(self.file_size);
            Chunk {
                index,
                range: start..end,
                data: data.slice(start as usize..end as usize),
            }
        })
    }
}

/// One chunk of a file.
#[derive(Clone)]
pub struct Chunk {
    /// Zero-based position in the file.
    pub index: u32,
    /// Byte range `[start, end)` in the source file.
    pub range: Range<u64>,
    /// Chunk payload.
    pub data: Bytes,
}

impl Chunk {
    /// Payload length in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("index", &self.index)
            .field("range", &self.range)
            .finish()
    }
}

/// Split data into chunks of the given size.
pub fn split(data: Bytes, chunk_size: u64) -> crate::Result<Vec<Chunk>> {
    let plan = ChunkPlan::new(data.len() as u64, chunk_size)?;
    Ok(plan.split(data).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_chunk_data_splitting() {
        let data = Bytes::from(vec![0u8; 100]);
        let chunks = split(data, 30).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].size(), 30);
        assert_eq!(chunks[3].size(), 10); // Last chunk is smaller
        assert_eq!(chunks[3].range, 90..100);
    }

    #[test]
    fn test_exact_multiple_keeps_full_last_chunk() {
        let plan = ChunkPlan::new(128, 64).unwrap();
        assert_eq!(plan.chunk_count(), 2);
        assert_eq!(plan.expected_len(1).unwrap(), 64);
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        let plan = ChunkPlan::new(0, 64).unwrap();
        assert_eq!(plan.chunk_count(), 0);
        assert!(plan.is_complete(&BTreeSet::new()));
        assert!(split(Bytes::new(), 64).unwrap().is_empty());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(matches!(
            ChunkPlan::new(10, 0),
            Err(crate::Error::InvalidChunkSize { size: 0, .. })
        ));
    }

    #[test]
    fn test_out_of_range_index() {
        let plan = ChunkPlan::new(10, 4).unwrap();
        assert!(matches!(
            plan.range(3),
            Err(crate::Error::IndexOutOfRange { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_missing_and_complete() {
        let plan = ChunkPlan::new(10 * 1024 * 1024, 1024 * 1024).unwrap();
        let persisted: BTreeSet<u32> = [3, 7].into_iter().collect();
        assert_eq!(plan.missing(&persisted), vec![0, 1, 2, 4, 5, 6, 8, 9]);
        assert!(!plan.is_complete(&persisted));

        let all: BTreeSet<u32> = plan.indices().collect();
        assert!(plan.missing(&all).is_empty());
        assert!(plan.is_complete(&all));

        let mut stray = all.clone();
        stray.remove(&0);
        stray.insert(10);
        assert!(!plan.is_complete(&stray));
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_file_exactly(file_size in 0u64..5000, chunk_size in 1u64..700) {
            let plan = ChunkPlan::new(file_size, chunk_size).unwrap();
            let mut next = 0u64;
            for index in plan.indices() {
                let range = plan.range(index).unwrap();
                prop_assert_eq!(range.start, next);
                prop_assert!(range.end > range.start);
                prop_assert!(range.end - range.start <= chunk_size);
                next = range.end;
            }
            prop_assert_eq!(next, file_size);
        }

        #[test]
        fn prop_fingerprint_ignores_chunk_boundaries(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            a in 1u64..512,
            b in 1u64..512,
        ) {
            let data = Bytes::from(data);
            let fingerprint = |size: u64| {
                let mut hasher = crate::FingerprintHasher::new();
                for chunk in split(data.clone(), size).unwrap() {
                    hasher.update(&chunk.data);
                }
                hasher.finalize()
            };
            prop_assert_eq!(fingerprint(a), fingerprint(b));
            prop_assert_eq!(fingerprint(a), crate::FileFingerprint::compute(&data));
        }

        #[test]
        fn prop_split_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..2048), chunk_size in 1u64..300) {
            let data = Bytes::from(data);
            let a = split(data.clone(), chunk_size).unwrap();
            let b = split(data.clone(), chunk_size).unwrap();
            prop_assert_eq!(a.len(), b.len());
            let joined: Vec<u8> = a.iter().flat_map(|c| c.data.iter().copied()).collect();
            prop_assert_eq!(&joined[..], &data[..]);
            for (x, y) in a.iter().zip(b.iter()) {
                prop_assert_eq!(&x.data, &y.data);
                prop_assert_eq!(&x.range, &y.range);
            }
        }
    }
}
