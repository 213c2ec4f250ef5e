use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use proptest::collection::{btree_map, btree_set, vec};
use proptest::prelude::*;
use roaring::RoaringBitmap;
use ugnos_index::{
    merge_tables, BlockKind, Grouping, GroupingScanner, IndexConfig, IndexEvent, IndexEventListener, MemoryStreamWriter, MemoryTable,
    Merger, TableReader, TagFilter, TagForwardFlusher, TagForwardMerger, TagForwardReader, TagInvertedFlusher,
    TagInvertedMerger, TagInvertedReader, TagKeyMetaFlusher, TagKeyMetaMerger, TagKeyMetaReader,
};

const HOST: u32 = 1;

#[derive(Debug, Default)]
struct Events(Mutex<Vec<IndexEvent>>);

impl IndexEventListener for Events {
    fn on_event(&self, event: IndexEvent) {
        self.0.lock().unwrap().push(event);
    }
}

fn bitmap(values: impl IntoIterator<Item = u32>) -> RoaringBitmap {
    values.into_iter().collect()
}

/// Series -> tag value ids, flushed container by container.
fn forward_table(tag_key_id: u32, series: &BTreeMap<u32, Vec<u32>>) -> MemoryTable {
    let mut f = TagForwardFlusher::new(MemoryStreamWriter::new(), &IndexConfig::default());
    f.prepare_tag_key(tag_key_id);
    let mut high_key = None;
    let (mut ids, mut counts) = (Vec::new(), Vec::new());
    for (&s, values) in series {
        if high_key.is_some() && high_key != Some(s >> 16) {
            f.flush_forward_index_with_counts(&ids, &counts).unwrap();
            ids.clear();
            counts.clear();
        }
        high_key = Some(s >> 16);
        ids.extend_from_slice(values);
        counts.push(values.len() as u32);
    }
    if high_key.is_some() {
        f.flush_forward_index_with_counts(&ids, &counts).unwrap();
    }
    f.commit_tag_key(&bitmap(series.keys().copied())).unwrap();
    f.into_inner().into_table()
}

/// Tag value id -> series, in ascending id order.
fn inverted_table(tag_key_id: u32, postings: &BTreeMap<u32, RoaringBitmap>) -> MemoryTable {
    let mut f = TagInvertedFlusher::new(MemoryStreamWriter::new(), &IndexConfig::default());
    f.prepare_tag_key(tag_key_id);
    for (&id, series) in postings {
        f.flush_inverted_index(id, series).unwrap();
    }
    f.commit_tag_key().unwrap();
    f.into_inner().into_table()
}

fn merge_into_table<M: Merger>(mut merger: M, key: u32, inputs: &[&MemoryTable]) -> M {
    let blocks: Vec<&[u8]> = inputs.iter().filter_map(|t| t.get(key)).collect();
    merger.merge(key, &blocks).unwrap();
    merger
}

#[test]
fn tag_lookup_end_to_end() {
    let config = IndexConfig::default();
    let hosts = ["db-01", "db-02", "web-01", "web-02", "web-10"];

    let mut meta = TagKeyMetaFlusher::new(MemoryStreamWriter::new(), &config);
    for (i, h) in hosts.iter().enumerate() {
        meta.flush_tag_value(h, i as u32 + 1);
    }
    meta.flush_tag_key_id(HOST, hosts.len() as u32).unwrap();
    let meta_table = meta.into_inner().into_table();

    // series 100 + i carries host i + 1
    let postings: BTreeMap<u32, RoaringBitmap> = (1..=hosts.len() as u32).map(|id| (id, bitmap([99 + id]))).collect();
    let inverted = inverted_table(HOST, &postings);
    let series: BTreeMap<u32, Vec<u32>> = (1..=hosts.len() as u32).map(|id| (99 + id, vec![id])).collect();
    let forward = forward_table(HOST, &series);

    let metas = TagKeyMetaReader::new(vec![&meta_table], &config);
    let ids = metas
        .find_value_ids_by_expr(HOST, &TagFilter::Regex("web-0[0-9]".to_string()))
        .unwrap();
    assert_eq!(ids, bitmap([3, 4]));

    let found = TagInvertedReader::new(vec![&inverted], &config)
        .get_series_ids_by_tag_value_ids(HOST, &ids)
        .unwrap();
    assert_eq!(found, bitmap([102, 103]));

    let forward_reader = TagForwardReader::new(vec![&forward], &config);
    let mut scanners = forward_reader.get_grouping_scanners(HOST, &found).unwrap();
    assert_eq!(scanners.len(), 1);
    let container = scanners[0].get_series_and_tag_value(0).unwrap().unwrap();
    let mut group_ids = RoaringBitmap::new();
    for s in found.iter() {
        group_ids.extend(container.get(s).unwrap().iter().copied());
    }

    let mut names = HashMap::new();
    metas.collect_tag_values(HOST, &mut group_ids, &mut names).unwrap();
    assert!(group_ids.is_empty());
    assert_eq!(names.get(&3).map(String::as_str), Some("web-01"));
    assert_eq!(names.get(&4).map(String::as_str), Some("web-02"));
}

#[test]
fn forward_merge_preserves_input_order() {
    let a = forward_table(HOST, &BTreeMap::from([(1, vec![1]), (2, vec![3])]));
    let b = forward_table(HOST, &BTreeMap::from([(1, vec![2]), (2, vec![4])]));
    let merged = merge_into_table(TagForwardMerger::new(MemoryStreamWriter::new(), &IndexConfig::default()), HOST, &[&a, &b])
        .into_inner()
        .into_table();
    let reader = TagForwardReader::new(vec![&merged], &IndexConfig::default());
    assert_eq!(reader.get_tag_value_ids_for_series(HOST, 1).unwrap(), vec![1, 2]);
    assert_eq!(reader.get_tag_value_ids_for_series(HOST, 2).unwrap(), vec![3, 4]);

    // reading the unmerged tables in the same order gives the same answer
    let unmerged = TagForwardReader::new(vec![&a, &b], &IndexConfig::default());
    assert_eq!(unmerged.get_tag_value_ids_for_series(HOST, 1).unwrap(), vec![1, 2]);
}

#[test]
fn tag_key_meta_merge_across_generations() {
    let config = IndexConfig::default();
    let mut tables = Vec::new();
    for (gen, values) in [&["a", "b"][..], &["b", "c"][..], &["d"][..]].iter().enumerate() {
        let mut f = TagKeyMetaFlusher::new(MemoryStreamWriter::new(), &config);
        for v in values.iter() {
            f.flush_tag_value(v, (v.as_bytes()[0] - b'a') as u32 + 1);
        }
        f.flush_tag_key_id(HOST, gen as u32 + 10).unwrap();
        tables.push(f.into_inner().into_table());
    }
    let inputs: Vec<&MemoryTable> = tables.iter().collect();
    let merged = merge_into_table(TagKeyMetaMerger::new(MemoryStreamWriter::new(), &config), HOST, &inputs)
        .into_inner()
        .into_table();

    let reader = TagKeyMetaReader::new(vec![&merged], &config);
    assert_eq!(reader.get_tag_value_seq(HOST).unwrap(), 12);
    assert_eq!(reader.get_tag_value_ids_for_tag_key_id(HOST).unwrap(), bitmap(1..=4));
    assert_eq!(reader.suggest_tag_values(HOST, "", 100).unwrap(), vec!["a", "b", "c", "d"]);

    let unmerged = TagKeyMetaReader::new(tables.iter().map(|t| t as &dyn TableReader).collect(), &config);
    assert_eq!(unmerged.get_tag_value_seq(HOST).unwrap(), 12);
    assert_eq!(unmerged.suggest_tag_values(HOST, "", 100).unwrap(), vec!["a", "b", "c", "d"]);
}

#[test]
fn compaction_merges_every_tag_key() {
    let config = IndexConfig::default();
    let generation = |values: &[(u32, &str, u32)]| {
        let mut f = TagKeyMetaFlusher::new(MemoryStreamWriter::new(), &config);
        let mut keys: Vec<u32> = values.iter().map(|v| v.0).collect();
        keys.dedup();
        for key in keys {
            for (_, v, id) in values.iter().filter(|v| v.0 == key) {
                f.flush_tag_value(v, *id);
            }
            f.flush_tag_key_id(key, 100 + key).unwrap();
        }
        f.into_inner().into_table()
    };
    let a = generation(&[(1, "db-01", 1), (2, "eu", 1)]);
    let b = generation(&[(2, "us", 2), (3, "prod", 1)]);

    let mut merger = TagKeyMetaMerger::new(MemoryStreamWriter::new(), &config);
    assert_eq!(merge_tables(&mut merger, &[&a, &b]).unwrap(), 3);
    let merged = merger.into_inner().into_table();
    assert_eq!(merged.keys(), vec![1, 2, 3]);

    let reader = TagKeyMetaReader::new(vec![&merged], &config);
    assert_eq!(reader.suggest_tag_values(2, "", 10).unwrap(), vec!["eu", "us"]);
    assert_eq!(reader.get_tag_value_id(3, "prod").unwrap(), 1);
}

#[test]
fn flush_and_merge_events_are_reported() {
    let events = Arc::new(Events::default());
    let config = IndexConfig::default().with_event_listener(events.clone());

    let a = inverted_table(HOST, &BTreeMap::from([(1, bitmap([1]))]));
    let b = inverted_table(HOST, &BTreeMap::from([(1, bitmap([2]))]));
    merge_into_table(TagInvertedMerger::new(MemoryStreamWriter::new(), &config), HOST, &[&a, &b]);

    let events = events.0.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        IndexEvent::TagKeyFlushed { kind: BlockKind::TagInverted, tag_key_id: HOST, .. }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        IndexEvent::MergeCompleted { kind: BlockKind::TagInverted, inputs: 2, .. }
    )));
}

fn postings_strategy() -> impl Strategy<Value = BTreeMap<u32, RoaringBitmap>> {
    // ids straddle a container boundary so buckets change mid-block
    btree_map(
        prop_oneof![0u32..40, 65_530u32..65_560],
        btree_set(0u32..200_000, 0..20).prop_map(|s| bitmap(s)),
        0..24,
    )
}

fn inverted_answers(table: &MemoryTable) -> BTreeMap<u32, RoaringBitmap> {
    let reader = TagInvertedReader::new(vec![table], &IndexConfig::default());
    reader
        .get_tag_value_ids(HOST)
        .unwrap()
        .iter()
        .map(|id| (id, reader.get_series_ids_by_tag_value_ids(HOST, &bitmap([id])).unwrap()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn inverted_merge_is_associative(a in postings_strategy(), b in postings_strategy(), c in postings_strategy()) {
        let (ta, tb, tc) = (inverted_table(HOST, &a), inverted_table(HOST, &b), inverted_table(HOST, &c));
        let merger = || TagInvertedMerger::new(MemoryStreamWriter::new(), &IndexConfig::default());

        let direct = merge_into_table(merger(), HOST, &[&ta, &tb, &tc]).into_inner().into_table();
        let ab = merge_into_table(merger(), HOST, &[&ta, &tb]).into_inner().into_table();
        let staged = merge_into_table(merger(), HOST, &[&ab, &tc]).into_inner().into_table();

        let answers = inverted_answers(&direct);
        prop_assert_eq!(&answers, &inverted_answers(&staged));

        let mut expected: BTreeMap<u32, RoaringBitmap> = BTreeMap::new();
        for part in [&a, &b, &c] {
            for (id, series) in part {
                *expected.entry(*id).or_default() |= series;
            }
        }
        prop_assert_eq!(answers, expected);
    }

    #[test]
    fn forward_merge_concatenates(
        a in btree_map(0u32..150_000, vec(0u32..1_000, 0..4), 0..40),
        b in btree_map(0u32..150_000, vec(0u32..1_000, 0..4), 0..40),
    ) {
        let (ta, tb) = (forward_table(HOST, &a), forward_table(HOST, &b));
        let merged = merge_into_table(TagForwardMerger::new(MemoryStreamWriter::new(), &IndexConfig::default()), HOST, &[&ta, &tb])
            .into_inner()
            .into_table();
        let reader = TagForwardReader::new(vec![&merged], &IndexConfig::default());

        let all = bitmap(a.keys().chain(b.keys()).copied());
        prop_assert_eq!(reader.get_series_ids_for_tag_key_id(HOST).unwrap(), all.clone());
        for s in all.iter() {
            let mut expected = a.get(&s).cloned().unwrap_or_default();
            expected.extend(b.get(&s).cloned().unwrap_or_default());
            prop_assert_eq!(reader.get_tag_value_ids_for_series(HOST, s).unwrap(), expected);
        }
    }
}
