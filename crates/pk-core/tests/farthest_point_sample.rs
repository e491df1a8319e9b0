use ndarray::Ix2;
use pk_core::{ops, PointError, Tensor};

#[test]
fn line_of_points_selects_both_extremes() {
    let pts = ndarray::arr3(&[[
        [0.0f32, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [2.0, 0.0, 0.0],
        [3.0, 0.0, 0.0],
        [4.0, 0.0, 0.0],
    ]]);
    let points = Tensor::from_array(pts.into_dyn());
    let idx = ops::farthest_point_sample(&points, 2).unwrap();
    assert_eq!(idx.shape(), vec![1, 2]);
    let iv = idx.data_i32().into_dimensionality::<Ix2>().unwrap();
    assert_eq!(iv[[0, 0]], 0);
    assert_eq!(iv[[0, 1]], 4);
}

#[test]
fn returns_unique_in_range_indices_per_batch() {
    let pts = ndarray::arr3(&[
        [
            [0.0f32, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [-2.0, 0.5, 0.0],
            [0.0, 3.0, 1.0],
            [4.0, -1.0, 2.0],
            [-1.0, -1.0, -1.0],
        ],
        [
            [10.0, 0.0, 0.0],
            [10.5, 0.0, 0.0],
            [11.0, 0.0, 0.0],
            [20.0, 0.0, 0.0],
            [30.0, 0.0, 0.0],
            [10.2, 0.1, 0.0],
        ],
    ]);
    let points = Tensor::from_array(pts.into_dyn());
    let idx = ops::farthest_point_sample(&points, 4).unwrap();
    let iv = idx.data_i32().into_dimensionality::<Ix2>().unwrap();
    for bi in 0..2 {
        let mut seen = std::collections::HashSet::new();
        for s in 0..4 {
            let v = iv[[bi, s]];
            assert!((0..6).contains(&v), "index {v} out of range");
            assert!(seen.insert(v), "index {v} repeated in batch {bi}");
        }
        assert_eq!(iv[[bi, 0]], 0);
    }
}

#[test]
fn coincident_points_still_yield_unique_indices() {
    let pts = ndarray::arr3(&[[
        [1.0f32, 1.0, 1.0],
        [1.0, 1.0, 1.0],
        [1.0, 1.0, 1.0],
        [1.0, 1.0, 1.0],
    ]]);
    let points = Tensor::from_array(pts.into_dyn());
    let idx = ops::farthest_point_sample(&points, 3).unwrap();
    let iv = idx.data_i32().into_dimensionality::<Ix2>().unwrap();
    assert_eq!(iv[[0, 0]], 0);
    assert_eq!(iv[[0, 1]], 1);
    assert_eq!(iv[[0, 2]], 2);
}

#[test]
fn rejects_bad_num_samples() {
    let pts = ndarray::arr3(&[[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0]]]);
    let points = Tensor::from_array(pts.into_dyn());
    let err = ops::farthest_point_sample(&points, 0).unwrap_err();
    assert!(matches!(err, PointError::InvalidArgument(_)));
    let err = ops::farthest_point_sample(&points, 3).unwrap_err();
    assert!(matches!(err, PointError::InvalidArgument(_)));
}

#[test]
fn rejects_non_coordinate_points() {
    let flat = Tensor::from_array(ndarray::arr2(&[[0.0f32, 1.0], [2.0, 3.0]]).into_dyn());
    let err = ops::farthest_point_sample(&flat, 1).unwrap_err();
    assert!(matches!(err, PointError::InvalidArgument(_)));

    let two_col = Tensor::from_array(ndarray::arr3(&[[[0.0f32, 1.0], [2.0, 3.0]]]).into_dyn());
    let err = ops::farthest_point_sample(&two_col, 1).unwrap_err();
    assert!(matches!(err, PointError::InvalidArgument(_)));

    let ints = Tensor::from_i32(ndarray::arr3(&[[[0, 0, 0]]]).into_dyn());
    let err = ops::farthest_point_sample(&ints, 1).unwrap_err();
    assert!(matches!(err, PointError::DType(_)));
}
