use proptest::prelude::*;
use spillbag::{BincodeCodec, CountThreshold, NaturalOrder, SerdeCodec, SpillBag, SpillConfig};
use std::collections::{BTreeMap, BTreeSet};
use tempfile::TempDir;

type Binding = BTreeMap<String, String>;

fn binding(pairs: &[(&str, &str)]) -> Binding {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn distinct_strings(input: &[&str], capacity: usize) -> Vec<String> {
    let temp_dir = TempDir::new().unwrap();
    let config = SpillConfig::default().with_temp_dir(temp_dir.path());
    let mut bag = SpillBag::distinct(
        CountThreshold::new(capacity),
        BincodeCodec::<String>::new(),
        NaturalOrder,
        &config,
    )
    .unwrap();
    bag.add_all(input.iter().map(|s| s.to_string())).unwrap();
    bag.read().unwrap().map(|r| r.unwrap()).collect()
}

#[test]
fn test_distinct_fixed_input_any_capacity() {
    let input = ["b12", "b19", "b02", "b12", "b19", "b12", "b02", "x10"];
    for capacity in [1, 2, 3, 5, 100] {
        let out = distinct_strings(&input, capacity);
        assert_eq!(out.len(), 4, "capacity {}", capacity);
        let set: BTreeSet<&str> = out.iter().map(String::as_str).collect();
        assert_eq!(set, BTreeSet::from(["b02", "b12", "b19", "x10"]));
    }
}

#[test]
fn test_heterogeneous_bindings_across_spill_boundary() {
    let narrow = binding(&[("v1", "x")]);
    let wide = binding(&[("v1", "x"), ("v2", "y")]);

    for capacity in [1, 2, 10] {
        let temp_dir = TempDir::new().unwrap();
        let config = SpillConfig::default().with_temp_dir(temp_dir.path());
        let mut bag = SpillBag::distinct(
            CountThreshold::new(capacity),
            SerdeCodec::<Binding>::new(),
            NaturalOrder,
            &config,
        )
        .unwrap();
        bag.add_all([narrow.clone(), wide.clone(), narrow.clone()]).unwrap();

        let out: Vec<Binding> = bag.read().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(out.len(), 2, "capacity {}", capacity);
        assert!(out.contains(&narrow));
        assert!(out.contains(&wide));
    }
}

#[test]
fn test_distinct_with_key_comparator() {
    // Only the key matters for equality; the first value seen for a key survives.
    let by_key = |a: &(u8, u32), b: &(u8, u32)| a.0.cmp(&b.0);
    let temp_dir = TempDir::new().unwrap();
    let config = SpillConfig::default().with_temp_dir(temp_dir.path());
    let mut bag = SpillBag::distinct(
        CountThreshold::new(100),
        BincodeCodec::<(u8, u32)>::new(),
        by_key,
        &config,
    )
    .unwrap();
    bag.add_all([(2, 10), (1, 20), (2, 30)]).unwrap();

    let out: Vec<(u8, u32)> = bag.read().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(out, vec![(1, 20), (2, 10)]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sorted_output_matches_std_sort(
        input in prop::collection::vec(any::<i32>(), 0..300),
        capacity in 1usize..20,
        cap in 2usize..6,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let config = SpillConfig::default()
            .with_temp_dir(temp_dir.path())
            .with_max_spill_files(cap);
        let mut bag = SpillBag::sorted(
            CountThreshold::new(capacity),
            BincodeCodec::<i32>::new(),
            NaturalOrder,
            &config,
        )
        .unwrap();
        bag.add_all(input.iter().copied()).unwrap();
        let out: Vec<i32> = bag.read().unwrap().map(|r| r.unwrap()).collect();

        let mut expected = input.clone();
        expected.sort();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn distinct_output_is_input_set(
        input in prop::collection::vec(0u16..50, 0..300),
        capacity in 1usize..20,
        cap in 2usize..6,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let config = SpillConfig::default()
            .with_temp_dir(temp_dir.path())
            .with_max_spill_files(cap);
        let mut bag = SpillBag::distinct(
            CountThreshold::new(capacity),
            BincodeCodec::<u16>::new(),
            NaturalOrder,
            &config,
        )
        .unwrap();
        bag.add_all(input.iter().copied()).unwrap();
        let out: Vec<u16> = bag.read().unwrap().map(|r| r.unwrap()).collect();

        let expected: BTreeSet<u16> = input.iter().copied().collect();
        prop_assert_eq!(out.len(), expected.len());
        prop_assert_eq!(out.into_iter().collect::<BTreeSet<_>>(), expected);
    }
}
