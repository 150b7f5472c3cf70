use crate::codec::ElementCodec;
use crate::order::Comparator;
use crate::{BagError, Result};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::TempPath;

/// Every `FENCE_INTERVAL`-th element has its byte offset recorded while writing.
pub const FENCE_INTERVAL: usize = 64;

/// One sorted (or, for unordered bags, insertion-ordered) run on disk.
///
/// The file is removed when this value is dropped or `delete`d. Contents never
/// change after `SpillWriter::finish`.
#[derive(Debug)]
pub struct SpillFile {
    path: TempPath,
    len: usize,
    fences: Vec<u64>,
}

impl SpillFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn open(&self) -> Result<SpillReader> {
        SpillReader::open_path(&self.path, self.len)
    }

    /// Decode the whole file. Meant for tests and small files.
    pub fn read_all<T, C: ElementCodec<T>>(&self, codec: &C) -> Result<Vec<T>> {
        let mut reader = self.open()?;
        let mut items = Vec::with_capacity(self.len);
        while let Some(item) = reader.next_item(codec)? {
            items.push(item);
        }
        Ok(items)
    }

    /// Exact membership test for a file sorted by `comparator`.
    ///
    /// Binary-searches the fence offsets, decoding one element per probe, then
    /// scans at most one block.
    pub fn contains<T, C, O>(&self, item: &T, codec: &C, comparator: &O) -> Result<bool>
    where
        C: ElementCodec<T>,
        O: Comparator<T>,
    {
        if self.len == 0 {
            return Ok(false);
        }
        let mut reader = BufReader::new(File::open(&self.path)?);

        // Largest fence whose element is <= item.
        let mut lo = 0usize;
        let mut hi = self.fences.len();
        let mut block = None;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            reader.seek(SeekFrom::Start(self.fences[mid]))?;
            let probe = codec
                .decode(&mut reader)?
                .ok_or_else(|| {
                    BagError::Corrupt(format!("fence {} past end of {:?}", mid, self.path()))
                })?;
            match comparator.compare(&probe, item) {
                Ordering::Equal => return Ok(true),
                Ordering::Less => {
                    block = Some(mid);
                    lo = mid + 1;
                }
                Ordering::Greater => hi = mid,
            }
        }

        let Some(block) = block else {
            return Ok(false);
        };
        reader.seek(SeekFrom::Start(self.fences[block]))?;
        let start = block * FENCE_INTERVAL;
        let end = (start + FENCE_INTERVAL).min(self.len);
        for _ in start..end {
            let candidate = codec
                .decode(&mut reader)?
                .ok_or_else(|| {
                    BagError::Corrupt(format!("{:?} ended inside a block", self.path()))
                })?;
            match comparator.compare(&candidate, item) {
                Ordering::Equal => return Ok(true),
                Ordering::Greater => return Ok(false),
                Ordering::Less => {}
            }
        }
        Ok(false)
    }

    /// Remove the file now, reporting failure instead of swallowing it.
    pub fn delete(self) -> io::Result<()> {
        self.path.close()
    }
}

struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streams elements into a new spill file in `dir`.
///
/// Dropping an unfinished writer deletes the partial file.
pub struct SpillWriter {
    path: TempPath,
    writer: CountingWriter<BufWriter<File>>,
    len: usize,
    fences: Vec<u64>,
}

impl SpillWriter {
    pub fn create(dir: &Path) -> Result<Self> {
        let named = tempfile::Builder::new()
            .prefix("spill-")
            .suffix(".bin")
            .tempfile_in(dir)?;
        let (file, path) = named.into_parts();
        Ok(Self {
            path,
            writer: CountingWriter {
                inner: BufWriter::new(file),
                written: 0,
            },
            len: 0,
            fences: Vec::new(),
        })
    }

    pub fn write<T, C: ElementCodec<T>>(&mut self, codec: &C, item: &T) -> Result<()> {
        if self.len % FENCE_INTERVAL == 0 {
            self.fences.push(self.writer.written);
        }
        codec.encode(item, &mut self.writer)?;
        self.len += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<SpillFile> {
        self.writer.flush()?;
        Ok(SpillFile {
            path: self.path,
            len: self.len,
            fences: self.fences,
        })
    }
}

/// Sequential reader over one spill file.
///
/// The element count recorded at write time is authoritative: running out of
/// bytes early is corruption, and nothing is read past the last element.
pub struct SpillReader {
    reader: BufReader<File>,
    remaining: usize,
}

impl SpillReader {
    pub(crate) fn open_path(path: &Path, len: usize) -> Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
            remaining: len,
        })
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn next_item<T, C: ElementCodec<T>>(&mut self, codec: &C) -> Result<Option<T>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        match codec.decode(&mut self.reader)? {
            Some(item) => {
                self.remaining -= 1;
                Ok(Some(item))
            }
            None => Err(BagError::Corrupt(format!(
                "spill file ended with {} elements unread",
                self.remaining
            ))),
        }
    }
}
