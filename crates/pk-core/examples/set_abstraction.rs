//! A PointNet++-style set abstraction assembled from the point kernels:
//! sample centroids, gather their coordinates, group neighbours around each
//! centroid, then look up the three nearest centroids for every input point.

use pk_core::{ops, Result, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn main() -> Result<()> {
    let (batch, n, centroids, k) = (2usize, 512usize, 64usize, 16usize);
    let mut rng = StdRng::seed_from_u64(7);
    let data: Vec<f32> = (0..batch * n * 3).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let points = Tensor::from_array(
        ndarray::Array::from_shape_vec((batch, n, 3), data)
            .expect("cloud shape")
            .into_dyn(),
    );

    let centroid_idx = ops::farthest_point_sample(&points, centroids)?;
    let centroid_xyz = ops::gather_points(&points, &centroid_idx)?;
    let groups = ops::ball_point(&points, &centroid_xyz, 0.3, k)?;
    let (nn_dist, nn_idx) = ops::three_nn(&centroid_xyz, &points)?;

    println!("input cloud      : {:?}", points.shape());
    println!("sampled centroids: {:?}", centroid_xyz.shape());
    println!("ball groups      : {:?}", groups.shape());
    println!("3-nn distances   : {:?}", nn_dist.shape());
    println!("3-nn indices     : {:?}", nn_idx.shape());
    Ok(())
}
