//! Immutable training artifact for IVF indexes.

use log::info;

use crate::error::{IvfError, Result};
use crate::vector::binary_set::BinarySet;
use crate::vector::core::dataset::Dataset;
use crate::vector::core::distance::MetricType;
use crate::vector::index::config::TrainConfig;
use crate::vector::index::ivf::lists::InvertedLists;
use crate::vector::index::ivf::quantizer::CoarseQuantizer;
use crate::vector::index::ivf::serialize;

/// A trained quantizer with an empty list per partition.
///
/// A model never aliases a live index: [`crate::vector::index::ivf::IvfIndex::from_model`]
/// deep-copies it, so one model can seed any number of independent indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    quantizer: CoarseQuantizer,
    lists: InvertedLists,
    metric: MetricType,
}

impl TrainedModel {
    /// Train a coarse quantizer on `dataset`.
    ///
    /// Fails with [`IvfError::TrainingPrecondition`] when `nlist` is zero or
    /// the dataset has fewer than `nlist` rows.
    pub fn train(dataset: &Dataset, config: &TrainConfig) -> Result<Self> {
        let quantizer = CoarseQuantizer::train(dataset, config)?;
        let lists = InvertedLists::new(quantizer.nlist(), quantizer.dim());
        info!(
            "Trained IVF model: nlist={} dim={} metric={}",
            quantizer.nlist(),
            quantizer.dim(),
            config.metric
        );
        Ok(Self {
            quantizer,
            lists,
            metric: config.metric,
        })
    }

    pub fn quantizer(&self) -> &CoarseQuantizer {
        &self.quantizer
    }

    pub fn metric(&self) -> MetricType {
        self.metric
    }

    pub fn dimension(&self) -> usize {
        self.quantizer.dim()
    }

    pub fn nlist(&self) -> usize {
        self.quantizer.nlist()
    }

    /// Deep copies of the parts an index needs.
    pub(crate) fn materialize(&self) -> (CoarseQuantizer, InvertedLists, MetricType) {
        (self.quantizer.clone(), self.lists.clone(), self.metric)
    }

    /// Serialize the quantizer and empty lists.
    pub fn serialize(&self) -> Result<BinarySet> {
        serialize::encode(&self.quantizer, &self.lists, self.metric, 0)
    }

    /// Restore a model. Sets carrying list entries are rejected.
    pub fn load(set: &BinarySet) -> Result<Self> {
        let decoded = serialize::decode(set)?;
        if decoded.ntotal != 0 {
            return Err(IvfError::format(format!(
                "expected an untrained-list model, found {} stored vectors",
                decoded.ntotal
            )));
        }
        Ok(Self {
            quantizer: decoded.quantizer,
            lists: decoded.lists,
            metric: decoded.metric,
        })
    }
}

/// Train a model; shorthand for [`TrainedModel::train`].
pub fn train(dataset: &Dataset, config: &TrainConfig) -> Result<TrainedModel> {
    TrainedModel::train(dataset, config)
}
