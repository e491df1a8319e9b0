use ndarray::Ix3;
use pk_core::{ops, PointError, Tensor};

fn cluster_points() -> Tensor {
    let pts = ndarray::arr3(&[[
        [0.0f32, 0.0, 0.0],
        [0.1, 0.0, 0.0],
        [5.0, 0.0, 0.0],
        [0.2, 0.0, 0.0],
    ]]);
    Tensor::from_array(pts.into_dyn())
}

#[test]
fn finds_neighbors_in_ascending_index_order() {
    let points = cluster_points();
    let queries = Tensor::from_array(ndarray::arr3(&[[[0.0f32, 0.0, 0.0]]]).into_dyn());
    let idx = ops::ball_point(&points, &queries, 0.25, 3).unwrap();
    assert_eq!(idx.shape(), vec![1, 1, 3]);
    let iv = idx.data_i32().into_dimensionality::<Ix3>().unwrap();
    assert_eq!(iv[[0, 0, 0]], 0);
    assert_eq!(iv[[0, 0, 1]], 1);
    assert_eq!(iv[[0, 0, 2]], 3);
}

#[test]
fn pads_underfull_rows_with_first_neighbor() {
    let points = cluster_points();
    let queries = Tensor::from_array(ndarray::arr3(&[[[0.05f32, 0.0, 0.0]]]).into_dyn());
    // only indices 0 and 1 fall within 0.12 of the query
    let idx = ops::ball_point(&points, &queries, 0.12, 4).unwrap();
    let iv = idx.data_i32().into_dimensionality::<Ix3>().unwrap();
    assert_eq!(iv[[0, 0, 0]], 0);
    assert_eq!(iv[[0, 0, 1]], 1);
    assert_eq!(iv[[0, 0, 2]], 0);
    assert_eq!(iv[[0, 0, 3]], 0);
}

#[test]
fn query_with_no_neighbors_yields_zero_row() {
    let points = cluster_points();
    let queries = Tensor::from_array(ndarray::arr3(&[[[100.0f32, 100.0, 100.0]]]).into_dyn());
    let idx = ops::ball_point(&points, &queries, 1.0, 2).unwrap();
    let iv = idx.data_i32().into_dimensionality::<Ix3>().unwrap();
    assert_eq!(iv[[0, 0, 0]], 0);
    assert_eq!(iv[[0, 0, 1]], 0);
}

#[test]
fn output_shape_is_fixed_and_members_lie_within_radius() {
    let pts = ndarray::arr3(&[
        [
            [0.0f32, 0.0, 0.0],
            [0.3, 0.0, 0.0],
            [0.0, 0.3, 0.0],
            [3.0, 3.0, 3.0],
        ],
        [
            [1.0, 1.0, 1.0],
            [1.2, 1.0, 1.0],
            [9.0, 9.0, 9.0],
            [1.0, 1.3, 1.0],
        ],
    ]);
    let qs = ndarray::arr3(&[
        [[0.0f32, 0.0, 0.0], [3.0, 3.0, 3.0]],
        [[1.0, 1.0, 1.0], [9.0, 9.0, 9.0]],
    ]);
    let points = Tensor::from_array(pts.clone().into_dyn());
    let queries = Tensor::from_array(qs.clone().into_dyn());
    let radius = 0.5f32;
    let idx = ops::ball_point(&points, &queries, radius, 3).unwrap();
    assert_eq!(idx.shape(), vec![2, 2, 3]);
    let iv = idx.data_i32().into_dimensionality::<Ix3>().unwrap();
    for bi in 0..2 {
        for mi in 0..2 {
            let in_radius: Vec<i32> = (0..4)
                .filter(|&i| {
                    let dx = pts[[bi, i, 0]] - qs[[bi, mi, 0]];
                    let dy = pts[[bi, i, 1]] - qs[[bi, mi, 1]];
                    let dz = pts[[bi, i, 2]] - qs[[bi, mi, 2]];
                    dx * dx + dy * dy + dz * dz <= radius * radius
                })
                .map(|i| i as i32)
                .collect();
            for s in 0..3 {
                let v = iv[[bi, mi, s]];
                if in_radius.is_empty() {
                    assert_eq!(v, 0);
                } else {
                    assert!(in_radius.contains(&v), "index {v} outside radius");
                }
            }
        }
    }
}

#[test]
fn rejects_bad_radius_and_k() {
    let points = cluster_points();
    let queries = Tensor::from_array(ndarray::arr3(&[[[0.0f32, 0.0, 0.0]]]).into_dyn());
    let err = ops::ball_point(&points, &queries, 0.0, 3).unwrap_err();
    assert!(matches!(err, PointError::InvalidArgument(_)));
    let err = ops::ball_point(&points, &queries, -1.0, 3).unwrap_err();
    assert!(matches!(err, PointError::InvalidArgument(_)));
    let err = ops::ball_point(&points, &queries, f32::NAN, 3).unwrap_err();
    assert!(matches!(err, PointError::InvalidArgument(_)));
    let err = ops::ball_point(&points, &queries, 0.5, 0).unwrap_err();
    assert!(matches!(err, PointError::InvalidArgument(_)));
}

#[test]
fn rejects_batch_mismatch() {
    let points = cluster_points();
    let queries = Tensor::from_array(
        ndarray::arr3(&[[[0.0f32, 0.0, 0.0]], [[1.0, 0.0, 0.0]]]).into_dyn(),
    );
    let err = ops::ball_point(&points, &queries, 0.5, 2).unwrap_err();
    assert!(matches!(err, PointError::InvalidArgument(_)));
}
