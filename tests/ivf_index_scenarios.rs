use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ivfflat::error::{ErrorKind, Result};
use ivfflat::vector::index::config::{Config, SearchConfig, TrainConfig};
use ivfflat::vector::index::ivf::model::{self, TrainedModel};
use ivfflat::vector::index::ivf::serialize::{CENTROIDS_KEY, META_KEY, list_key};
use ivfflat::vector::index::ivf::IvfIndex;
use ivfflat::vector::{BinarySet, Dataset, MetricType, VectorIndex};

fn random_dataset(rows: usize, dim: usize, seed: u64) -> Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..rows * dim).map(|_| rng.random_range(-1.0..1.0)).collect();
    Dataset::new(dim, data)
}

#[test]
fn exact_vector_is_found_with_one_probe() -> Result<()> {
    let train_set = random_dataset(1000, 4, 1)?;
    let model = model::train(&train_set, &TrainConfig::new(16, MetricType::L2).with_seed(2))?;
    let index = IvfIndex::from_model(&model);

    let base = random_dataset(500, 4, 3)?;
    let ids: Vec<i64> = (1000..1500).collect();
    index.add(&Dataset::with_ids(4, base.data().to_vec(), ids)?)?;
    assert_eq!(index.count(), 500);

    for row in [0usize, 250, 499] {
        let query = Dataset::new(4, base.row(row).to_vec())?;
        let result = index.search(&query, &SearchConfig::new(1, 1))?;
        assert_eq!(result.row_ids(0), &[1000 + row as i64]);
        assert_eq!(result.row_distances(0), &[0.0]);
    }
    Ok(())
}

#[test]
fn config_driven_training_and_search() -> Result<()> {
    let config = Config::from_json(r#"{"nlist": 8, "metric_type": "IP", "seed": 9}"#)?;
    let train_config = TrainConfig::from_config(&config)?;
    assert_eq!(train_config.metric, MetricType::InnerProduct);

    let base = random_dataset(400, 8, 4)?;
    let index = IvfIndex::from_model(&model::train(&base, &train_config)?);
    index.add_without_ids(&base)?;

    let queries = random_dataset(3, 8, 5)?;
    let result = index.search_with_config(&queries, &Config::new().with("k", 4).with("nprobe", 8))?;
    assert_eq!(result.nq(), 3);
    assert_eq!(result.k(), 4);
    for i in 0..3 {
        let row = result.row_distances(i);
        assert!(row.windows(2).all(|w| w[0] >= w[1]));
    }
    Ok(())
}

#[test]
fn invalid_search_parameters_are_rejected() -> Result<()> {
    let base = random_dataset(64, 2, 6)?;
    let index = IvfIndex::from_model(&model::train(&base, &TrainConfig::new(4, MetricType::L2))?);
    index.add_without_ids(&base)?;

    let query = random_dataset(1, 2, 7)?;
    let err = index.search(&query, &SearchConfig::new(0, 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let err = index.search(&query, &SearchConfig::new(3, 0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(index.search_with_config(&query, &Config::new()).is_err());

    // Larger nprobe than nlist scans everything.
    let clamped = index.search(&query, &SearchConfig::new(3, 1000))?;
    let full = index.search(&query, &SearchConfig::new(3, 4))?;
    assert_eq!(clamped, full);
    Ok(())
}

#[test]
fn training_preconditions() -> Result<()> {
    let small = random_dataset(5, 3, 8)?;
    let err = model::train(&small, &TrainConfig::new(10, MetricType::L2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TrainingPrecondition);
    let err = model::train(&small, &TrainConfig::new(0, MetricType::L2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TrainingPrecondition);

    let exact = model::train(&small, &TrainConfig::new(5, MetricType::L2))?;
    assert_eq!(exact.nlist(), 5);
    Ok(())
}

#[test]
fn serialized_index_survives_roundtrip() -> Result<()> {
    let base = random_dataset(300, 6, 10)?;
    let index = IvfIndex::from_model(&model::train(&base, &TrainConfig::new(12, MetricType::L2))?);
    index.add_without_ids(&base)?;

    let set = index.serialize()?;
    assert!(set.contains(META_KEY));
    assert!(set.contains(CENTROIDS_KEY));
    assert!(set.contains(&list_key(11)));

    // Blobs travel as plain bytes.
    let mut copied = BinarySet::new();
    for (key, blob) in set.iter() {
        copied.append(key, blob.to_vec());
    }
    let restored = IvfIndex::from_binary_set(&copied)?;
    assert_eq!(restored.count(), 300);
    assert_eq!(restored.dimension(), 6);

    let queries = random_dataset(15, 6, 11)?;
    for nprobe in [1, 3, 12] {
        let params = SearchConfig::new(7, nprobe);
        assert_eq!(index.search(&queries, &params)?, restored.search(&queries, &params)?);
    }
    Ok(())
}

#[test]
fn corrupted_blobs_are_format_errors() -> Result<()> {
    let base = random_dataset(50, 2, 12)?;
    let index = IvfIndex::from_model(&model::train(&base, &TrainConfig::new(2, MetricType::L2))?);
    index.add_without_ids(&base)?;
    let set = index.serialize()?;

    let mut flipped = BinarySet::new();
    for (key, blob) in set.iter() {
        let mut blob = blob.to_vec();
        if key == list_key(0) {
            blob[10] ^= 0xff;
        }
        flipped.append(key, blob);
    }
    let err = IvfIndex::from_binary_set(&flipped).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);

    let mut bad_meta = BinarySet::new();
    for (key, blob) in set.iter() {
        bad_meta.append(key, blob.to_vec());
    }
    bad_meta.append(META_KEY, br#"{"format":"IVF_FLAT","version":99}"#.to_vec());
    assert_eq!(
        IvfIndex::from_binary_set(&bad_meta).unwrap_err().kind(),
        ErrorKind::Format
    );

    assert_eq!(
        IvfIndex::from_binary_set(&BinarySet::new()).unwrap_err().kind(),
        ErrorKind::Format
    );
    Ok(())
}

#[test]
fn model_roundtrip_seeds_identical_indexes() -> Result<()> {
    let base = random_dataset(200, 3, 13)?;
    let model = model::train(&base, &TrainConfig::new(6, MetricType::L2).with_seed(4))?;
    let restored = TrainedModel::load(&model.serialize()?)?;
    assert_eq!(restored, model);

    let a = IvfIndex::from_model(&model);
    let b = IvfIndex::new();
    b.set_model(&restored);
    a.add_without_ids(&base)?;
    b.add_without_ids(&base)?;
    assert_eq!(a.list_sizes()?, b.list_sizes()?);

    // A populated index is not a model.
    assert!(TrainedModel::load(&a.serialize()?).is_err());
    Ok(())
}

#[test]
fn seeded_training_is_reproducible() -> Result<()> {
    let base = random_dataset(300, 4, 14)?;
    let config = TrainConfig::new(8, MetricType::L2).with_seed(77);
    assert_eq!(model::train(&base, &config)?, model::train(&base, &config)?);
    Ok(())
}
