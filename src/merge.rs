use crate::codec::ElementCodec;
use crate::order::Comparator;
use crate::spill_file::{SpillFile, SpillReader, SpillWriter};
use crate::Result;
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeMode {
    /// Drain sources one after another, in source order.
    Concat,
    /// Globally sorted, every occurrence kept.
    Sorted,
    /// Globally sorted, only the first of each run of equal elements kept.
    Distinct,
}

/// One input to a merge: the in-memory buffer or a spill file.
///
/// Spill files are opened on first use and their handle is dropped as soon as
/// they run dry.
enum Source<T> {
    Memory(std::vec::IntoIter<T>),
    Unopened { path: PathBuf, len: usize },
    Open(SpillReader),
    Done,
}

impl<T> Source<T> {
    fn from_file(file: &SpillFile) -> Self {
        Source::Unopened {
            path: file.path().to_path_buf(),
            len: file.len(),
        }
    }

    fn advance<C: ElementCodec<T>>(&mut self, codec: &C) -> Result<Option<T>> {
        if let Source::Unopened { path, len } = self {
            trace!("opening spill source {:?} ({} elements)", path, len);
            let reader = SpillReader::open_path(path, *len)?;
            *self = Source::Open(reader);
        }
        let next = match self {
            Source::Memory(items) => items.next(),
            Source::Open(reader) => reader.next_item(codec)?,
            Source::Unopened { .. } | Source::Done => None,
        };
        if next.is_none() {
            *self = Source::Done;
        }
        Ok(next)
    }
}

/// Current head of one source, ordered for a min-heap.
///
/// Equal heads pop in source order, so the lower source index wins ties.
struct HeapItem<'a, T, O> {
    item: T,
    source: usize,
    comparator: &'a O,
}

impl<T, O: Comparator<T>> Ord for HeapItem<'_, T, O> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap
        self.comparator
            .compare(&other.item, &self.item)
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl<T, O: Comparator<T>> PartialOrd for HeapItem<'_, T, O> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, O: Comparator<T>> PartialEq for HeapItem<'_, T, O> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, O: Comparator<T>> Eq for HeapItem<'_, T, O> {}

/// Lazy k-way merge over sorted sources.
///
/// Nothing is opened or decoded until the first `next()`. Among equal elements
/// the source added first wins, so the output is stable with respect to source
/// order. The first error ends the sequence and releases every open file.
pub struct MergeSequence<'a, T, C, O> {
    sources: Vec<Source<T>>,
    heap: BinaryHeap<HeapItem<'a, T, O>>,
    codec: &'a C,
    comparator: &'a O,
    mode: MergeMode,
    cursor: usize,
    primed: bool,
    finished: bool,
}

impl<'a, T, C, O> MergeSequence<'a, T, C, O>
where
    C: ElementCodec<T>,
    O: Comparator<T>,
{
    /// `files` come first, in creation order, then each in-memory run.
    pub(crate) fn new(
        files: &[SpillFile],
        memory: Vec<Vec<T>>,
        codec: &'a C,
        comparator: &'a O,
        mode: MergeMode,
    ) -> Self {
        let mut sources: Vec<Source<T>> = files.iter().map(Source::from_file).collect();
        sources.extend(
            memory
                .into_iter()
                .filter(|run| !run.is_empty())
                .map(|run| Source::Memory(run.into_iter())),
        );
        Self {
            sources,
            heap: BinaryHeap::new(),
            codec,
            comparator,
            mode,
            cursor: 0,
            primed: false,
            finished: false,
        }
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    fn prime(&mut self) -> Result<()> {
        self.primed = true;
        if self.mode == MergeMode::Concat {
            return Ok(());
        }
        for idx in 0..self.sources.len() {
            self.refill(idx)?;
        }
        Ok(())
    }

    /// Push the next element of `source`, if any, onto the heap.
    fn refill(&mut self, source: usize) -> Result<()> {
        if let Some(item) = self.sources[source].advance(self.codec)? {
            self.heap.push(HeapItem {
                item,
                source,
                comparator: self.comparator,
            });
        }
        Ok(())
    }

    fn pop_min(&mut self) -> Result<Option<T>> {
        let Some(top) = self.heap.pop() else {
            return Ok(None);
        };
        self.refill(top.source)?;
        Ok(Some(top.item))
    }

    fn step(&mut self) -> Result<Option<T>> {
        if !self.primed {
            self.prime()?;
        }
        match self.mode {
            MergeMode::Concat => {
                while let Some(source) = self.sources.get_mut(self.cursor) {
                    if let Some(item) = source.advance(self.codec)? {
                        return Ok(Some(item));
                    }
                    self.cursor += 1;
                }
                Ok(None)
            }
            MergeMode::Sorted => self.pop_min(),
            MergeMode::Distinct => {
                let Some(item) = self.pop_min()? else {
                    return Ok(None);
                };
                while self
                    .heap
                    .peek()
                    .is_some_and(|next| self.comparator.equal(&next.item, &item))
                {
                    if let Some(duplicate) = self.heap.pop() {
                        self.refill(duplicate.source)?;
                    }
                }
                Ok(Some(item))
            }
        }
    }

    fn release(&mut self) {
        self.finished = true;
        self.sources.clear();
        self.heap.clear();
    }
}

impl<T, C, O> Iterator for MergeSequence<'_, T, C, O>
where
    C: ElementCodec<T>,
    O: Comparator<T>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.release();
                None
            }
            Err(e) => {
                self.release();
                Some(Err(e))
            }
        }
    }
}

/// Merge `files` into a single new spill file in `dir`, consuming the inputs.
pub(crate) fn merge_into_file<T, C, O>(
    files: Vec<SpillFile>,
    dir: &Path,
    codec: &C,
    comparator: &O,
    mode: MergeMode,
) -> Result<SpillFile>
where
    C: ElementCodec<T>,
    O: Comparator<T>,
{
    let mut writer = SpillWriter::create(dir)?;
    for item in MergeSequence::new(&files, Vec::new(), codec, comparator, mode) {
        writer.write(codec, &item?)?;
    }
    let merged = writer.finish()?;
    for file in files {
        let path = file.path().to_path_buf();
        if let Err(e) = file.delete() {
            warn!("failed to delete premerged spill file {:?}: {}", path, e);
        }
    }
    Ok(merged)
}

/// Run premerge rounds until at most `max_files` spill files remain.
///
/// Each round merges consecutive groups of up to `max_files` files (at least
/// two), oldest first, so the relative order of equal elements is unchanged.
/// A target of 1 collapses everything into a single file.
pub(crate) fn premerge<T, C, O>(
    mut files: Vec<SpillFile>,
    max_files: usize,
    dir: &Path,
    codec: &C,
    comparator: &O,
    mode: MergeMode,
) -> Result<Vec<SpillFile>>
where
    C: ElementCodec<T>,
    O: Comparator<T>,
{
    let target = max_files.max(1);
    let group_size = max_files.max(2);
    let mut round = 0;
    while files.len() > target {
        round += 1;
        let before = files.len();
        let mut next_round = Vec::with_capacity(before.div_ceil(group_size));
        for group in &files.into_iter().chunks(group_size) {
            let mut group: Vec<SpillFile> = group.collect();
            if group.len() == 1 {
                next_round.append(&mut group);
            } else {
                next_round.push(merge_into_file(group, dir, codec, comparator, mode)?);
            }
        }
        files = next_round;
        debug!("premerge round {}: {} spill files -> {}", round, before, files.len());
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BagError;
    use crate::codec::BincodeCodec;
    use crate::order::NaturalOrder;
    use tempfile::TempDir;

    fn spill(dir: &Path, items: &[u32]) -> SpillFile {
        let codec = BincodeCodec::<u32>::new();
        let mut writer = SpillWriter::create(dir).unwrap();
        for item in items {
            writer.write(&codec, item).unwrap();
        }
        writer.finish().unwrap()
    }

    fn collect<C: ElementCodec<u32>>(seq: MergeSequence<'_, u32, C, NaturalOrder>) -> Vec<u32> {
        seq.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_merge_files_and_memory() {
        let temp_dir = TempDir::new().unwrap();
        let files = vec![spill(temp_dir.path(), &[1, 4, 7]), spill(temp_dir.path(), &[2, 5, 8])];
        let codec = BincodeCodec::<u32>::new();
        let seq = MergeSequence::new(
            &files,
            vec![vec![0, 3, 6, 9]],
            &codec,
            &NaturalOrder,
            MergeMode::Sorted,
        );
        assert_eq!(seq.source_count(), 3);
        assert_eq!(collect(seq), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_distinct_drops_duplicates_across_and_within_sources() {
        let temp_dir = TempDir::new().unwrap();
        let files = vec![
            spill(temp_dir.path(), &[1, 1, 2, 5]),
            spill(temp_dir.path(), &[1, 2, 2, 6]),
        ];
        let codec = BincodeCodec::<u32>::new();
        let seq = MergeSequence::new(
            &files,
            vec![vec![2, 5, 9]],
            &codec,
            &NaturalOrder,
            MergeMode::Distinct,
        );
        assert_eq!(collect(seq), vec![1, 2, 5, 6, 9]);
    }

    #[test]
    fn test_concat_keeps_source_order() {
        let temp_dir = TempDir::new().unwrap();
        let files = vec![spill(temp_dir.path(), &[9, 1]), spill(temp_dir.path(), &[5])];
        let codec = BincodeCodec::<u32>::new();
        let seq = MergeSequence::new(
            &files,
            vec![vec![3, 2]],
            &codec,
            &NaturalOrder,
            MergeMode::Concat,
        );
        assert_eq!(collect(seq), vec![9, 1, 5, 3, 2]);
    }

    #[test]
    fn test_ties_prefer_older_source() {
        let temp_dir = TempDir::new().unwrap();
        let codec = BincodeCodec::<(u32, u32)>::new();
        let mut older = SpillWriter::create(temp_dir.path()).unwrap();
        older.write(&codec, &(1, 100)).unwrap();
        let mut newer = SpillWriter::create(temp_dir.path()).unwrap();
        newer.write(&codec, &(1, 200)).unwrap();
        let files = vec![older.finish().unwrap(), newer.finish().unwrap()];

        let by_key = |a: &(u32, u32), b: &(u32, u32)| a.0.cmp(&b.0);
        let out: Vec<_> = MergeSequence::new(
            &files,
            vec![vec![(1, 300)]],
            &codec,
            &by_key,
            MergeMode::Sorted,
        )
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(out, vec![(1, 100), (1, 200), (1, 300)]);
    }

    #[test]
    fn test_empty_merge() {
        let codec = BincodeCodec::<u32>::new();
        let mut seq = MergeSequence::new(&[], Vec::new(), &codec, &NaturalOrder, MergeMode::Sorted);
        assert!(seq.next().is_none());
        assert!(seq.next().is_none());
    }

    #[test]
    fn test_error_ends_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let files = vec![spill(temp_dir.path(), &[1, 2, 3])];
        std::fs::write(files[0].path(), b"").unwrap();
        let codec = BincodeCodec::<u32>::new();
        let mut seq = MergeSequence::new(
            &files,
            vec![vec![0]],
            &codec,
            &NaturalOrder,
            MergeMode::Sorted,
        );
        assert!(matches!(seq.next(), Some(Err(BagError::Corrupt(_)))));
        assert!(seq.next().is_none());
    }

    #[test]
    fn test_premerge_reduces_to_cap_and_cleans_inputs() {
        let temp_dir = TempDir::new().unwrap();
        let files: Vec<SpillFile> = (0..7u32)
            .map(|i| spill(temp_dir.path(), &[i, i + 10, i + 20]))
            .collect();
        let codec = BincodeCodec::<u32>::new();
        let merged = premerge(
            files,
            2,
            temp_dir.path(),
            &codec,
            &NaturalOrder,
            MergeMode::Sorted,
        )
        .unwrap();

        assert!(merged.len() <= 2);
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), merged.len());
        let total: usize = merged.iter().map(|f| f.len()).sum();
        assert_eq!(total, 21);

        let out = collect(MergeSequence::new(
            &merged,
            Vec::new(),
            &codec,
            &NaturalOrder,
            MergeMode::Sorted,
        ));
        let mut expected: Vec<u32> = (0..7).flat_map(|i| [i, i + 10, i + 20]).collect();
        expected.sort();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_premerge_noop_within_cap() {
        let temp_dir = TempDir::new().unwrap();
        let files = vec![spill(temp_dir.path(), &[1]), spill(temp_dir.path(), &[2])];
        let paths: Vec<_> = files.iter().map(|f| f.path().to_path_buf()).collect();
        let codec = BincodeCodec::<u32>::new();
        let kept = premerge(
            files,
            5,
            temp_dir.path(),
            &codec,
            &NaturalOrder,
            MergeMode::Sorted,
        )
        .unwrap();
        let kept_paths: Vec<_> = kept.iter().map(|f| f.path().to_path_buf()).collect();
        assert_eq!(kept_paths, paths);
    }

    #[test]
    fn test_premerge_to_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let files: Vec<SpillFile> = (0..5u32)
            .map(|i| spill(temp_dir.path(), &[i, i + 5]))
            .collect();
        let codec = BincodeCodec::<u32>::new();
        let merged = premerge(
            files,
            1,
            temp_dir.path(),
            &codec,
            &NaturalOrder,
            MergeMode::Distinct,
        )
        .unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
        assert_eq!(merged[0].read_all(&codec).unwrap(), (0..10).collect::<Vec<_>>());
    }
}
