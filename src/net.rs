use crate::codec::ElementCodec;
use crate::config::SpillConfig;
use crate::merge::{MergeMode, MergeSequence};
use crate::order::Comparator;
use crate::policy::ThresholdPolicy;
use crate::sorted_diff::SortedDifference;
use crate::store::SpillStore;
use crate::{BagError, Result};
use std::path::PathBuf;
use tracing::debug;

/// Elements pending in the net that `net_add` never reported.
pub type NetRemainder<'a, T, C, O> =
    SortedDifference<'a, MergeSequence<'a, T, C, O>, MergeSequence<'a, T, C, O>, T, O>;

/// Distinct bag with an incremental "is this new?" test.
///
/// Keeps two lanes: `confirmed` holds what `net_add` reported as new, `pending`
/// holds what plain `add` recorded. Both lanes stay sorted and duplicate-free in
/// memory and spill to indexed files, so membership checks never scan a whole
/// file.
pub struct DistinctSpillNet<T, C, O, P> {
    confirmed: SpillStore<T>,
    pending: SpillStore<T>,
    codec: C,
    comparator: O,
    policy: P,
    max_spill_files: usize,
    finalized: bool,
    closed: bool,
}

impl<T, C, O, P> DistinctSpillNet<T, C, O, P>
where
    C: ElementCodec<T>,
    O: Comparator<T>,
    P: ThresholdPolicy<T>,
{
    pub fn new(policy: P, codec: C, comparator: O, config: &SpillConfig) -> Result<Self> {
        config.validate()?;
        let dir = config.spill_dir();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            confirmed: SpillStore::new(dir.clone()),
            pending: SpillStore::new(dir),
            codec,
            comparator,
            policy,
            max_spill_files: config.max_spill_files,
            finalized: false,
            closed: false,
        })
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_distinct(&self) -> bool {
        true
    }

    /// Elements recorded in both lanes, counting spilled copies.
    pub fn len(&self) -> usize {
        self.confirmed.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn buffered_len(&self) -> usize {
        self.confirmed.buffer_len() + self.pending.buffer_len()
    }

    pub fn spill_file_count(&self) -> usize {
        self.confirmed.files().len() + self.pending.files().len()
    }

    pub fn spill_file_handles(&self) -> Vec<PathBuf> {
        let mut paths = self.confirmed.file_paths();
        paths.extend(self.pending.file_paths());
        paths
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.closed {
            return Err(BagError::IllegalState("net is closed".to_string()));
        }
        if self.finalized {
            return Err(BagError::IllegalState("net has already been read".to_string()));
        }
        Ok(())
    }

    fn spill_if_needed(&mut self) -> Result<()> {
        let buffered = self.confirmed.buffer_len() + self.pending.buffer_len();
        let weight = self.confirmed.buffered_weight() + self.pending.buffered_weight();
        if buffered > 0 && self.policy.should_spill(weight) {
            self.confirmed.spill(&self.codec)?;
            self.pending.spill(&self.codec)?;
        }
        Ok(())
    }

    fn seen(&self, item: &T) -> Result<bool> {
        if self.confirmed.search(item, &self.comparator).is_ok()
            || self.pending.search(item, &self.comparator).is_ok()
        {
            return Ok(true);
        }
        Ok(self.confirmed.spilled_contains(item, &self.codec, &self.comparator)?
            || self.pending.spilled_contains(item, &self.codec, &self.comparator)?)
    }

    /// Record `item` unless an equal element is already present. Returns
    /// whether it was new.
    pub fn net_add(&mut self, item: T) -> Result<bool> {
        self.ensure_writable()?;
        if self.seen(&item)? {
            return Ok(false);
        }
        let weight = self.policy.weigh(&item);
        self.spill_if_needed()?;
        if let Err(pos) = self.confirmed.search(&item, &self.comparator) {
            self.confirmed.insert_at(pos, item, weight);
        }
        Ok(true)
    }

    /// Record `item` without reporting whether it is new.
    pub fn add(&mut self, item: T) -> Result<()> {
        self.ensure_writable()?;
        if self.pending.search(&item, &self.comparator).is_ok() {
            return Ok(());
        }
        let weight = self.policy.weigh(&item);
        self.spill_if_needed()?;
        if let Err(pos) = self.pending.search(&item, &self.comparator) {
            self.pending.insert_at(pos, item, weight);
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

    fn finalize(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.finalized = true;
        Ok(())
    }

    /// Every distinct element recorded by either `add` or `net_add`.
    pub fn read(&mut self) -> Result<MergeSequence<'_, T, C, O>> {
        self.finalize()?;
        let mut pending = std::mem::replace(
            &mut self.pending,
            SpillStore::new(self.confirmed.dir().to_path_buf()),
        );
        self.confirmed.adopt_files(&mut pending);
        self.confirmed
            .premerge(self.max_spill_files, &self.codec, &self.comparator, MergeMode::Distinct)?;

        let memory = vec![self.confirmed.take_buffer(), pending.take_buffer()];
        debug!(
            "reading distinct net: {} spill files, {} buffered",
            self.confirmed.files().len(),
            memory.iter().map(Vec::len).sum::<usize>()
        );
        Ok(MergeSequence::new(
            self.confirmed.files(),
            memory,
            &self.codec,
            &self.comparator,
            MergeMode::Distinct,
        ))
    }

    /// Distinct elements recorded by `add` that `net_add` never reported.
    ///
    /// Together with the `true` results of `net_add`, every distinct element
    /// surfaces exactly once.
    pub fn net_read(&mut self) -> Result<NetRemainder<'_, T, C, O>> {
        self.finalize()?;
        // Both lanes are merged side by side and share the fan-in cap.
        let confirmed_cap = (self.max_spill_files / 2).max(1);
        let pending_cap = self.max_spill_files.saturating_sub(confirmed_cap).max(1);
        self.pending
            .premerge(pending_cap, &self.codec, &self.comparator, MergeMode::Distinct)?;
        self.confirmed
            .premerge(confirmed_cap, &self.codec, &self.comparator, MergeMode::Distinct)?;

        let pending_memory = self.pending.take_buffer();
        let confirmed_memory = self.confirmed.take_buffer();
        debug!(
            "net read: {} pending files, {} confirmed files",
            self.pending.files().len(),
            self.confirmed.files().len()
        );
        let pending = MergeSequence::new(
            self.pending.files(),
            vec![pending_memory],
            &self.codec,
            &self.comparator,
            MergeMode::Distinct,
        );
        let confirmed = MergeSequence::new(
            self.confirmed.files(),
            vec![confirmed_memory],
            &self.codec,
            &self.comparator,
            MergeMode::Distinct,
        );
        Ok(SortedDifference::new(pending, confirmed, &self.comparator))
    }

    /// Delete every spill file of both lanes. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.finalized = true;
        let confirmed = self.confirmed.clear();
        let pending = self.pending.clear();
        let deleted = confirmed? + pending?;
        debug!("closed distinct net, deleted {} spill files", deleted);
        Ok(())
    }
}

impl<T, C, O, P> Drop for DistinctSpillNet<T, C, O, P> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.confirmed.clear();
            let _ = self.pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BincodeCodec;
    use crate::order::NaturalOrder;
    use crate::policy::CountThreshold;
    use tempfile::TempDir;

    type TestNet = DistinctSpillNet<u32, BincodeCodec<u32>, NaturalOrder, CountThreshold>;

    fn net(dir: &TempDir, capacity: usize) -> TestNet {
        let config = SpillConfig::default()
            .with_temp_dir(dir.path())
            .with_max_spill_files(2);
        let policy = CountThreshold::new(capacity);
        DistinctSpillNet::new(policy, BincodeCodec::new(), NaturalOrder, &config).unwrap()
    }

    #[test]
    fn test_net_add_reports_new_elements_once() {
        let temp_dir = TempDir::new().unwrap();
        let mut net = net(&temp_dir, 3);
        let added: Vec<bool> = [5, 1, 5, 7, 9, 1, 2, 9, 5]
            .into_iter()
            .map(|x| net.net_add(x).unwrap())
            .collect();
        assert_eq!(added, vec![true, true, false, true, true, false, true, false, false]);
        assert!(net.spill_file_count() > 0);
    }

    #[test]
    fn test_net_add_sees_plain_adds() {
        let temp_dir = TempDir::new().unwrap();
        let mut net = net(&temp_dir, 2);
        net.add_all([10, 20, 30, 40, 50]).unwrap();
        assert!(!net.net_add(30).unwrap());
        assert!(!net.net_add(50).unwrap());
        assert!(net.net_add(35).unwrap());
    }

    #[test]
    fn test_net_read_skips_reported_elements() {
        let temp_dir = TempDir::new().unwrap();
        let mut net = net(&temp_dir, 2);
        assert!(net.net_add(3).unwrap());
        assert!(net.net_add(8).unwrap());
        net.add_all([1, 3, 4, 8, 4, 9, 1]).unwrap();

        let rest: Vec<u32> = net.net_read().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rest, vec![1, 4, 9]);
        net.close().unwrap();
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_read_merges_both_lanes() {
        let temp_dir = TempDir::new().unwrap();
        let mut net = net(&temp_dir, 2);
        net.net_add(6).unwrap();
        net.add_all([2, 6, 4, 2]).unwrap();
        net.net_add(1).unwrap();

        let all: Vec<u32> = net.read().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(all, vec![1, 2, 4, 6]);
    }

    #[test]
    fn test_net_read_fan_in_stays_within_cap() {
        let temp_dir = TempDir::new().unwrap();
        let mut net = net(&temp_dir, 1);
        for x in 0..20 {
            net.net_add(x).unwrap();
            net.add(x + 100).unwrap();
        }
        assert!(net.spill_file_count() > 2);

        let rest: Vec<u32> = net.net_read().unwrap().map(|r| r.unwrap()).collect();
        assert!(net.spill_file_count() <= 2);
        assert_eq!(rest, (100..120).collect::<Vec<_>>());
    }

    #[test]
    fn test_finalized_after_net_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut net = net(&temp_dir, 4);
        net.add(1).unwrap();
        drop(net.net_read().unwrap());
        assert!(matches!(net.net_add(2), Err(BagError::IllegalState(_))));
        assert!(matches!(net.add(2), Err(BagError::IllegalState(_))));
        assert!(net.read().is_err());
    }
}
