use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::error::ErrorKind;
use crate::vector::index::config::{Config, TrainConfig};
use crate::vector::index::ivf::model::train;

fn random_dataset(rows: usize, dim: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..rows * dim).map(|_| rng.random_range(-1.0..1.0)).collect();
    Dataset::new(dim, data).unwrap()
}

fn trained(nlist: usize, metric: MetricType) -> (TrainedModel, Dataset) {
    let dataset = random_dataset(1000, 4, 42);
    let model = train(&dataset, &TrainConfig::new(nlist, metric).with_seed(7)).unwrap();
    (model, dataset)
}

fn brute_force(
    data: &Dataset,
    ids: &[i64],
    query: &[f32],
    k: usize,
    metric: MetricType,
) -> (Vec<i64>, Vec<f32>) {
    let mut scored: Vec<(f32, i64)> = data
        .iter_rows()
        .zip(ids)
        .map(|(row, &id)| (metric.score(query, row), id))
        .collect();
    scored.sort_by(|a, b| metric.compare(a.0, b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(d, id)| (id, d)).unzip()
}

#[test]
fn test_exact_match_returns_stored_id() {
    let (model, _) = trained(16, MetricType::L2);
    let index = IvfIndex::from_model(&model);

    let base = random_dataset(500, 4, 99);
    let ids: Vec<i64> = (1000..1500).collect();
    let dataset = Dataset::with_ids(4, base.data().to_vec(), ids).unwrap();
    index.add(&dataset).unwrap();
    assert_eq!(index.count(), 500);

    let query = Dataset::new(4, base.row(123).to_vec()).unwrap();
    let result = index.search(&query, &SearchConfig::new(1, 1)).unwrap();
    assert_eq!(result.row_ids(0), &[1123]);
    assert_eq!(result.row_distances(0), &[0.0]);
}

#[test]
fn test_full_probe_matches_brute_force() {
    let (model, _) = trained(8, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    let base = random_dataset(300, 4, 5);
    index.add_without_ids(&base).unwrap();
    let ids: Vec<i64> = (0..300).collect();

    let queries = random_dataset(20, 4, 6);
    let result = index.search(&queries, &SearchConfig::new(10, 8)).unwrap();
    for (i, query) in queries.iter_rows().enumerate() {
        let (expected, _) = brute_force(&base, &ids, query, 10, MetricType::L2);
        assert_eq!(result.row_ids(i), expected.as_slice());
    }
}

#[test]
fn test_exhaustive_search_is_exact_for_both_metrics() {
    for metric in [MetricType::L2, MetricType::InnerProduct] {
        let base = random_dataset(1000, 8, 23);
        let model = train(&base, &TrainConfig::new(10, metric).with_seed(3)).unwrap();
        let index = IvfIndex::from_model(&model);
        index.add_without_ids(&base).unwrap();
        let ids: Vec<i64> = (0..1000).collect();

        let queries = random_dataset(25, 8, 24);
        let result = index.search(&queries, &SearchConfig::new(5, 10)).unwrap();
        for (i, query) in queries.iter_rows().enumerate() {
            let (expected_ids, expected_distances) = brute_force(&base, &ids, query, 5, metric);
            assert_eq!(result.row_ids(i), expected_ids.as_slice(), "{metric:?} query {i}");
            assert_eq!(result.row_distances(i), expected_distances.as_slice());
        }
    }
}

#[test]
fn test_count_tracks_additions() {
    let (model, _) = trained(4, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    assert_eq!(index.count(), 0);
    index.add_without_ids(&random_dataset(10, 4, 1)).unwrap();
    index.add_without_ids(&random_dataset(15, 4, 2)).unwrap();
    assert_eq!(index.count(), 25);
    assert_eq!(index.list_sizes().unwrap().iter().sum::<usize>(), 25);
}

#[test]
fn test_sequential_ids_continue_from_count() {
    let (model, _) = trained(4, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    let first = random_dataset(3, 4, 1);
    let second = random_dataset(2, 4, 2);
    index.add_without_ids(&first).unwrap();
    index.add_without_ids(&second).unwrap();

    let query = Dataset::new(4, second.row(1).to_vec()).unwrap();
    let result = index.search(&query, &SearchConfig::new(1, 4)).unwrap();
    assert_eq!(result.row_ids(0), &[4]);
}

#[test]
fn test_padding_when_k_exceeds_count() {
    let (model, _) = trained(4, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    index.add_without_ids(&random_dataset(3, 4, 8)).unwrap();

    let result = index
        .search(&random_dataset(1, 4, 9), &SearchConfig::new(5, 4))
        .unwrap();
    assert_eq!(&result.row_ids(0)[3..], &[-1, -1]);
    assert!(result.row_distances(0)[3..].iter().all(|d| *d == f32::INFINITY));
    assert!(result.row_ids(0)[..3].iter().all(|id| *id >= 0));
}

#[test]
fn test_inner_product_padding_uses_negative_infinity() {
    let (model, _) = trained(4, MetricType::InnerProduct);
    let index = IvfIndex::from_model(&model);
    let result = index
        .search(&random_dataset(2, 4, 3), &SearchConfig::new(2, 1))
        .unwrap();
    assert_eq!(result.ids(), &[-1, -1, -1, -1]);
    assert!(result.distances().iter().all(|d| *d == f32::NEG_INFINITY));
}

#[test]
fn test_results_are_ordered_best_first() {
    for metric in [MetricType::L2, MetricType::InnerProduct] {
        let (model, _) = trained(8, metric);
        let index = IvfIndex::from_model(&model);
        index.add_without_ids(&random_dataset(200, 4, 12)).unwrap();
        let result = index
            .search(&random_dataset(5, 4, 13), &SearchConfig::new(8, 3))
            .unwrap();
        for i in 0..result.nq() {
            let row = result.row_distances(i);
            assert!(row.windows(2).all(|w| !metric.is_better(w[1], w[0])));
        }
    }
}

#[test]
fn test_untrained_index() {
    let index = IvfIndex::new();
    let dataset = random_dataset(2, 4, 1);
    assert!(!index.is_trained());
    assert_eq!(index.count(), 0);
    assert_eq!(index.dimension(), 0);

    let err = index.add_without_ids(&dataset).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotTrained);
    let err = index.search(&dataset, &SearchConfig::new(1, 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotTrained);
    assert_eq!(index.serialize().unwrap_err().kind(), ErrorKind::NotTrained);
    assert!(index.clone_index().is_err());
}

#[test]
fn test_add_requires_ids() {
    let (model, _) = trained(4, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    let err = index.add(&random_dataset(2, 4, 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_id_collisions_reject_whole_batch() {
    let (model, _) = trained(4, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    let rows = random_dataset(3, 4, 1).data().to_vec();

    let dup_in_batch = Dataset::with_ids(4, rows.clone(), vec![1, 2, 1]).unwrap();
    assert!(index.add(&dup_in_batch).is_err());
    assert_eq!(index.count(), 0);

    index
        .add(&Dataset::with_ids(4, rows.clone(), vec![1, 2, 3]).unwrap())
        .unwrap();
    let clash = Dataset::with_ids(4, rows.clone(), vec![4, 5, 3]).unwrap();
    assert_eq!(index.add(&clash).unwrap_err().kind(), ErrorKind::InvalidInput);
    assert_eq!(index.count(), 3);

    let negative = Dataset::with_ids(4, rows, vec![7, -2, 8]).unwrap();
    assert!(index.add(&negative).is_err());
    assert_eq!(index.count(), 3);
}

#[test]
fn test_dimension_mismatch_is_rejected() {
    let (model, _) = trained(4, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    assert!(index.add_without_ids(&random_dataset(2, 3, 1)).is_err());
    assert!(index.search(&random_dataset(1, 5, 1), &SearchConfig::new(1, 1)).is_err());
    assert_eq!(index.count(), 0);
}

#[test]
fn test_model_is_not_aliased() {
    let (model, _) = trained(4, MetricType::L2);
    let a = IvfIndex::from_model(&model);
    let b = IvfIndex::from_model(&model);
    a.add_without_ids(&random_dataset(10, 4, 1)).unwrap();
    assert_eq!(a.count(), 10);
    assert_eq!(b.count(), 0);
    assert_eq!(IvfIndex::from_model(&model).count(), 0);
}

#[test]
fn test_set_model_replaces_contents() {
    let (model, _) = trained(4, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    index.add_without_ids(&random_dataset(10, 4, 1)).unwrap();

    let (other, _) = trained(8, MetricType::InnerProduct);
    index.set_model(&other);
    assert_eq!(index.count(), 0);
    assert_eq!(index.nlist().unwrap(), 8);
    assert_eq!(index.metric(), Some(MetricType::InnerProduct));
}

#[test]
fn test_serialize_load_roundtrip() {
    let (model, _) = trained(8, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    index.add_without_ids(&random_dataset(120, 4, 17)).unwrap();

    let set = index.serialize().unwrap();
    let restored = IvfIndex::new();
    restored.load(&set).unwrap();
    assert_eq!(restored.count(), 120);
    assert_eq!(restored.list_sizes().unwrap(), index.list_sizes().unwrap());

    let queries = random_dataset(10, 4, 18);
    let params = SearchConfig::new(5, 3);
    assert_eq!(
        index.search(&queries, &params).unwrap(),
        restored.search(&queries, &params).unwrap()
    );

    restored.add_without_ids(&random_dataset(1, 4, 19)).unwrap();
    assert_eq!(restored.count(), 121);
}

#[test]
fn test_failed_load_keeps_state() {
    let (model, _) = trained(4, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    index.add_without_ids(&random_dataset(5, 4, 1)).unwrap();

    let mut set = index.serialize().unwrap();
    set.remove(serialize::CENTROIDS_KEY);
    let err = index.load(&set).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert_eq!(index.count(), 5);
}

#[test]
fn test_clone_is_independent() {
    let (model, _) = trained(4, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    index.add_without_ids(&random_dataset(10, 4, 1)).unwrap();

    let copy = index.clone_index().unwrap();
    copy.add_without_ids(&random_dataset(5, 4, 2)).unwrap();
    assert_eq!(index.count(), 10);
    assert_eq!(copy.count(), 15);
}

#[test]
fn test_default_nprobe_from_config() {
    let (model, _) = trained(4, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    index.add_without_ids(&random_dataset(50, 4, 1)).unwrap();

    let config = Config::new().with("k", 3);
    let queries = random_dataset(2, 4, 2);
    let by_config = index.search_with_config(&queries, &config).unwrap();
    let explicit = index.search(&queries, &SearchConfig::new(3, 1)).unwrap();
    assert_eq!(by_config, explicit);
}

#[test]
fn test_gen_graph_self_neighbors() {
    let (model, _) = trained(4, MetricType::L2);
    let index = IvfIndex::from_model(&model);
    let base = random_dataset(130, 4, 21);
    index.add_without_ids(&base).unwrap();

    let graph = index.gen_graph(4, &base, &SearchConfig::new(4, 4)).unwrap();
    assert_eq!(graph.len(), 130);
    assert!(graph.iter().enumerate().all(|(i, row)| row[0] == i as i64));

    let err = IvfIndex::new()
        .gen_graph(4, &base, &SearchConfig::new(4, 4))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotTrained);
}
