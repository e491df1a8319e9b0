use std::sync::Arc;

use ndarray::{Array1, Array2, Array3};
use pk_core::Tensor;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::{shape, Result};

type Sample = (Array2<f32>, i32);

/// In-memory dataset of (point cloud, label) pairs. Every cloud must share
/// the same point count so batches stack into one (batch, n, 3) tensor.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    pub fn from_vec(samples: Vec<Sample>) -> Result<Self> {
        let mut dataset = Self::new();
        for (cloud, label) in samples {
            dataset.push(cloud, label)?;
        }
        Ok(dataset)
    }

    pub fn push(&mut self, cloud: Array2<f32>, label: i32) -> Result<()> {
        let (n, cols) = cloud.dim();
        if cols != 3 {
            return Err(shape(format!(
                "dataset: clouds must have 3 coordinate columns (got {cols})"
            )));
        }
        if let Some((first, _)) = self.samples.first() {
            let expected = first.dim().0;
            if n != expected {
                return Err(shape(format!(
                    "dataset: cloud has {n} points, expected {expected}"
                )));
            }
        }
        self.samples.push((cloud, label));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Points per cloud, or `None` while the dataset is empty.
    pub fn num_points(&self) -> Option<usize> {
        self.samples.first().map(|(cloud, _)| cloud.dim().0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    pub fn loader(&self) -> DataLoader {
        DataLoader::new(self.samples.clone().into())
    }

    pub fn into_loader(self) -> DataLoader {
        DataLoader::new(self.samples.into())
    }
}

/// Builder-style loader over a [`Dataset`]: deterministic shuffling and
/// fixed batch sizes; the final short batch is kept.
#[derive(Clone)]
pub struct DataLoader {
    samples: Arc<[Sample]>,
    order: Arc<Vec<usize>>,
    batch_size: usize,
}

impl DataLoader {
    fn new(samples: Arc<[Sample]>) -> Self {
        let len = samples.len();
        Self {
            samples,
            order: Arc::new((0..len).collect()),
            batch_size: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Same samples, deterministically shuffled visitation order.
    pub fn shuffle(mut self, seed: u64) -> Self {
        let mut indices: Vec<usize> = (0..self.samples.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        self.order = Arc::new(indices);
        self
    }

    pub fn batched(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn iter(&self) -> Batches {
        Batches {
            samples: self.samples.clone(),
            order: self.order.clone(),
            batch_size: self.batch_size,
            position: 0,
        }
    }
}

impl IntoIterator for DataLoader {
    type Item = Result<(Tensor, Tensor)>;
    type IntoIter = Batches;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over (points (batch, n, 3) f32, labels (batch,) i32) tensors.
pub struct Batches {
    samples: Arc<[Sample]>,
    order: Arc<Vec<usize>>,
    batch_size: usize,
    position: usize,
}

impl Iterator for Batches {
    type Item = Result<(Tensor, Tensor)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }
        let start = self.position;
        let end = (self.position + self.batch_size).min(self.order.len());
        self.position = end;
        let indices = &self.order[start..end];
        Some(stack_batch(&self.samples, indices))
    }
}

fn stack_batch(samples: &[Sample], indices: &[usize]) -> Result<(Tensor, Tensor)> {
    let bs = indices.len();
    let n = samples[indices[0]].0.dim().0;
    let mut points = Array3::<f32>::zeros((bs, n, 3));
    let mut labels = Array1::<i32>::zeros(bs);
    for (row, &idx) in indices.iter().enumerate() {
        let (cloud, label) = &samples[idx];
        if cloud.dim().0 != n {
            return Err(shape(format!(
                "dataset: cloud has {} points, expected {n}",
                cloud.dim().0
            )));
        }
        points
            .index_axis_mut(ndarray::Axis(0), row)
            .assign(cloud);
        labels[row] = *label;
    }
    Ok((
        Tensor::from_array(points.into_dyn()),
        Tensor::from_i32(labels.into_dyn()),
    ))
}
