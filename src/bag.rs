use crate::codec::ElementCodec;
use crate::config::SpillConfig;
use crate::merge::{MergeMode, MergeSequence};
use crate::order::{Comparator, InsertionOrder};
use crate::policy::ThresholdPolicy;
use crate::store::SpillStore;
use crate::{BagError, Result};
use std::path::PathBuf;
use tracing::debug;

/// What a bag promises about its output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BagKind {
    /// Insertion order, every element.
    Default,
    /// Comparator order, every element.
    Sorted,
    /// Comparator order, one element per equivalence class.
    Distinct,
}

impl BagKind {
    fn merge_mode(self) -> MergeMode {
        match self {
            BagKind::Default => MergeMode::Concat,
            BagKind::Sorted => MergeMode::Sorted,
            BagKind::Distinct => MergeMode::Distinct,
        }
    }
}

/// Bounded-memory collection that spills to disk and is read back once.
///
/// Lifecycle: construct, `add` any number of elements, `read` once, `close`.
/// `read` finalizes the bag; further adds fail with `BagError::IllegalState`.
/// Dropping the bag performs the same cleanup as `close`.
pub struct SpillBag<T, C, O, P> {
    store: SpillStore<T>,
    codec: C,
    comparator: O,
    policy: P,
    kind: BagKind,
    max_spill_files: usize,
    finalized: bool,
    closed: bool,
}

/// Unordered bag: no comparator needed.
pub type DefaultSpillBag<T, C, P> = SpillBag<T, C, InsertionOrder, P>;

impl<T, C, O, P> SpillBag<T, C, O, P>
where
    C: ElementCodec<T>,
    O: Comparator<T>,
    P: ThresholdPolicy<T>,
{
    pub fn new(
        kind: BagKind,
        policy: P,
        codec: C,
        comparator: O,
        config: &SpillConfig,
    ) -> Result<Self> {
        config.validate()?;
        let dir = config.spill_dir();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            store: SpillStore::new(dir),
            codec,
            comparator,
            policy,
            kind,
            max_spill_files: config.max_spill_files,
            finalized: false,
            closed: false,
        })
    }

    pub fn sorted(policy: P, codec: C, comparator: O, config: &SpillConfig) -> Result<Self> {
        Self::new(BagKind::Sorted, policy, codec, comparator, config)
    }

    pub fn distinct(policy: P, codec: C, comparator: O, config: &SpillConfig) -> Result<Self> {
        Self::new(BagKind::Distinct, policy, codec, comparator, config)
    }

    pub fn kind(&self) -> BagKind {
        self.kind
    }

    pub fn is_sorted(&self) -> bool {
        self.kind != BagKind::Default
    }

    pub fn is_distinct(&self) -> bool {
        self.kind == BagKind::Distinct
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Elements currently recorded. For distinct bags this counts each spill
    /// file's elements, so it can exceed the number of distinct elements.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn buffered_len(&self) -> usize {
        self.store.buffer_len()
    }

    pub fn spill_file_count(&self) -> usize {
        self.store.files().len()
    }

    pub fn spill_file_handles(&self) -> Vec<PathBuf> {
        self.store.file_paths()
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.closed {
            return Err(BagError::IllegalState("bag is closed".to_string()));
        }
        if self.finalized {
            return Err(BagError::IllegalState("bag has already been read".to_string()));
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        if self.kind == BagKind::Sorted {
            self.store.sort_buffer(&self.comparator);
        }
        self.store.spill(&self.codec)
    }

    fn spill_if_needed(&mut self) -> Result<()> {
        if self.store.buffer_len() > 0 && self.policy.should_spill(self.store.buffered_weight()) {
            self.spill()?;
        }
        Ok(())
    }

    pub fn add(&mut self, item: T) -> Result<()> {
        self.ensure_writable()?;
        let weight = self.policy.weigh(&item);
        match self.kind {
            BagKind::Distinct => {
                // The buffer is kept sorted and duplicate-free as it fills.
                if self.store.search(&item, &self.comparator).is_ok() {
                    return Ok(());
                }
                self.spill_if_needed()?;
                if let Err(pos) = self.store.search(&item, &self.comparator) {
                    self.store.insert_at(pos, item, weight);
                }
            }
            BagKind::Sorted | BagKind::Default => {
                self.spill_if_needed()?;
                self.store.push(item, weight);
            }
        }
        Ok(())
    }

    pub fn add_all<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.add(item)?;
        }
        Ok(())
    }

    /// Finalize the bag and return its contents as one lazy sequence.
    ///
    /// Spill files beyond the configured cap are premerged first. The sequence
    /// borrows the bag, so it must be dropped before `close`.
    pub fn read(&mut self) -> Result<MergeSequence<'_, T, C, O>> {
        self.ensure_writable()?;
        self.finalized = true;

        let mode = self.kind.merge_mode();
        if self.kind == BagKind::Sorted {
            self.store.sort_buffer(&self.comparator);
        }
        if mode != MergeMode::Concat {
            self.store
                .premerge(self.max_spill_files, &self.codec, &self.comparator, mode)?;
        }
        let memory = self.store.take_buffer();
        debug!(
            "reading {:?} bag: {} spill files, {} buffered",
            self.kind,
            self.store.files().len(),
            memory.len()
        );
        Ok(MergeSequence::new(
            self.store.files(),
            vec![memory],
            &self.codec,
            &self.comparator,
            mode,
        ))
    }

    /// Release the buffer and delete every spill file. Safe to call repeatedly,
    /// before any read, or after a failed operation.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.finalized = true;
        let deleted = self.store.clear()?;
        debug!("closed {:?} bag, deleted {} spill files", self.kind, deleted);
        Ok(())
    }
}

impl<T, C, P> SpillBag<T, C, InsertionOrder, P>
where
    C: ElementCodec<T>,
    P: ThresholdPolicy<T>,
{
    pub fn unordered(policy: P, codec: C, config: &SpillConfig) -> Result<Self> {
        Self::new(BagKind::Default, policy, codec, InsertionOrder, config)
    }
}

impl<T, C, O, P> Drop for SpillBag<T, C, O, P> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.store.clear();
        }
    }
}
