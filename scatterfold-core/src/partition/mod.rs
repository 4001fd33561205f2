//! Splitting an input into indexed chunks and putting it back together.
//!
//! Chunks are contiguous and their indices run over `[0, N)`. Every chunk
//! carries the position of its first element in the original input, which is
//! what lets element-wise operations observe the original index of each
//! element after distribution.

/// A contiguous slice of the input, the unit of distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<T> {
    /// Position of the chunk in the partition.
    pub index: usize,
    /// Position of `items[0]` in the original input.
    pub offset: usize,
    pub items: Vec<T>,
}

impl<T> Chunk<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Split `input` into at most `count` contiguous chunks.
///
/// The number of chunks is `min(count, input.len())`. Every chunk holds
/// `input.len() / chunks` elements, except the last one which absorbs the
/// remainder. An empty input, or a `count` of zero, yields no chunks.
///
/// ```
/// use scatterfold::partition::partition;
///
/// let chunks = partition(vec![1, 2, 3, 4, 5], 2);
/// assert_eq!(chunks[0].items, vec![1, 2]);
/// assert_eq!(chunks[1].items, vec![3, 4, 5]);
/// assert_eq!(chunks[1].offset, 2);
/// ```
pub fn partition<T>(input: Vec<T>, count: usize) -> Vec<Chunk<T>> {
    let len = input.len();
    let chunks = count.min(len);
    if chunks == 0 {
        return Vec::new();
    }

    let size = len / chunks;
    let mut rest = input.into_iter();
    (0..chunks)
        .map(|index| {
            let offset = index * size;
            let take = if index + 1 == chunks { len - offset } else { size };
            Chunk {
                index,
                offset,
                items: rest.by_ref().take(take).collect(),
            }
        })
        .collect()
}

/// Concatenate chunk payloads in index order.
///
/// Chunks may be supplied in any order.
pub fn reassemble<T>(mut chunks: Vec<Chunk<T>>) -> Vec<T> {
    chunks.sort_by_key(|chunk| chunk.index);
    chunks.into_iter().flat_map(|chunk| chunk.items).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fewer_elements_than_chunks() {
        let chunks = partition(vec![1, 2, 3, 4, 5, 6], 10);
        assert_eq!(chunks.len(), 6);
        assert!(chunks.iter().all(|c| c.len() == 1));
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            (0..6).collect::<Vec<_>>()
        );
    }

    #[test]
    fn last_chunk_absorbs_remainder() {
        let chunks = partition((0..10).collect(), 3);
        let sizes: Vec<_> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(sizes, vec![3, 3, 4]);
        let offsets: Vec<_> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 3, 6]);
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(partition(Vec::<u8>::new(), 4).is_empty());
        assert!(partition(vec![1, 2, 3], 0).is_empty());
    }

    #[test]
    fn reassemble_restores_input_for_any_count() {
        let input: Vec<u32> = (0..37).collect();
        for count in 1..=40 {
            let mut chunks = partition(input.clone(), count);
            assert!(chunks.iter().all(|c| !c.is_empty()));
            chunks.reverse();
            assert_eq!(reassemble(chunks), input, "count = {count}");
        }
    }
}
