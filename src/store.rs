use crate::codec::ElementCodec;
use crate::merge::{self, MergeMode};
use crate::order::Comparator;
use crate::spill_file::{SpillFile, SpillWriter};
use crate::Result;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Buffer plus the spill files written from it.
///
/// Owns every spill file it creates; whatever is still tracked when the store
/// is dropped is removed from disk.
pub(crate) struct SpillStore<T> {
    buffer: Vec<T>,
    buffered_weight: usize,
    files: Vec<SpillFile>,
    dir: PathBuf,
    spilled_len: usize,
}

impl<T> SpillStore<T> {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self {
            buffer: Vec::new(),
            buffered_weight: 0,
            files: Vec::new(),
            dir,
            spilled_len: 0,
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn buffered_weight(&self) -> usize {
        self.buffered_weight
    }

    pub(crate) fn files(&self) -> &[SpillFile] {
        &self.files
    }

    /// Elements recorded so far, spilled or buffered.
    pub(crate) fn len(&self) -> usize {
        self.spilled_len + self.buffer.len()
    }

    pub(crate) fn push(&mut self, item: T, weight: usize) {
        self.buffer.push(item);
        self.buffered_weight += weight;
    }

    /// Position of `item` in a buffer kept sorted and duplicate-free.
    pub(crate) fn search<O: Comparator<T>>(
        &self,
        item: &T,
        comparator: &O,
    ) -> std::result::Result<usize, usize> {
        self.buffer.binary_search_by(|probe| comparator.compare(probe, item))
    }

    pub(crate) fn insert_at(&mut self, pos: usize, item: T, weight: usize) {
        self.buffer.insert(pos, item);
        self.buffered_weight += weight;
    }

    /// Stable, so equal elements keep insertion order.
    pub(crate) fn sort_buffer<O: Comparator<T>>(&mut self, comparator: &O) {
        self.buffer.sort_by(|a, b| comparator.compare(a, b));
    }

    /// True if any spill file holds `item`. Files must be sorted by `comparator`.
    pub(crate) fn spilled_contains<C, O>(&self, item: &T, codec: &C, comparator: &O) -> Result<bool>
    where
        C: ElementCodec<T>,
        O: Comparator<T>,
    {
        for file in self.files.iter().rev() {
            if file.contains(item, codec, comparator)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Write the buffer, as it currently stands, to a new spill file.
    pub(crate) fn spill<C: ElementCodec<T>>(&mut self, codec: &C) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut writer = SpillWriter::create(&self.dir)?;
        for item in &self.buffer {
            writer.write(codec, item)?;
        }
        let file = writer.finish()?;
        debug!("spilled {} elements to {:?}", file.len(), file.path());

        self.spilled_len += file.len();
        self.files.push(file);
        self.buffer.clear();
        self.buffered_weight = 0;
        Ok(())
    }

    /// Premerge until no more than `max_files` spill files remain.
    pub(crate) fn premerge<C, O>(
        &mut self,
        max_files: usize,
        codec: &C,
        comparator: &O,
        mode: MergeMode,
    ) -> Result<()>
    where
        C: ElementCodec<T>,
        O: Comparator<T>,
    {
        let files = std::mem::take(&mut self.files);
        self.files = merge::premerge(files, max_files, &self.dir, codec, comparator, mode)?;
        self.spilled_len = self.files.iter().map(|f| f.len()).sum();
        Ok(())
    }

    /// Move another store's spill files to the end of this one.
    pub(crate) fn adopt_files(&mut self, other: &mut SpillStore<T>) {
        self.spilled_len += other.spilled_len;
        other.spilled_len = 0;
        self.files.append(&mut other.files);
    }

    pub(crate) fn take_buffer(&mut self) -> Vec<T> {
        self.buffered_weight = 0;
        std::mem::take(&mut self.buffer)
    }

    /// Drop the buffer and delete every tracked spill file.
    ///
    /// Tries every file even after a failure and returns the first error.
    pub(crate) fn clear(&mut self) -> io::Result<usize> {
        self.buffer = Vec::new();
        self.buffered_weight = 0;
        self.spilled_len = 0;

        let mut deleted = 0;
        let mut first_error = None;
        for file in self.files.drain(..) {
            let path = file.path().to_path_buf();
            match file.delete() {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!("failed to delete spill file {:?}: {}", path, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }

    pub(crate) fn file_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path().to_path_buf()).collect()
    }
}
