//! Tensor-level entry points for the wgpu backend: upload the call's inputs,
//! run the kernel, land the result back on the caller's device tag.

use ndarray::IxDyn;

use crate::backend::{Backend, WgpuBackend};
use crate::{
    device::Device,
    error::{invalid, Result},
    Tensor,
};

pub fn farthest_point_sample(points: &Tensor, b: usize, n: usize, s: usize) -> Result<Tensor> {
    let be = WgpuBackend::new();
    let dp = be.from_host_f32(&points.data())?;
    let out = be.farthest_point_sample(&dp, b, n, s)?;
    let arr = be
        .to_host_i32(&out)?
        .into_shape(IxDyn(&[b, s]))
        .map_err(|_| invalid("farthest_point_sample: output reshape failed"))?;
    Ok(Tensor::from_i32_on(arr, Device::Wgpu))
}

pub fn ball_point(
    points: &Tensor,
    queries: &Tensor,
    b: usize,
    n: usize,
    m: usize,
    radius: f32,
    k: usize,
) -> Result<Tensor> {
    let be = WgpuBackend::new();
    let dp = be.from_host_f32(&points.data())?;
    let dq = be.from_host_f32(&queries.data())?;
    let out = be.ball_point(&dp, &dq, b, n, m, radius, k)?;
    let arr = be
        .to_host_i32(&out)?
        .into_shape(IxDyn(&[b, m, k]))
        .map_err(|_| invalid("ball_point: output reshape failed"))?;
    Ok(Tensor::from_i32_on(arr, Device::Wgpu))
}

pub fn gather_points(
    points: &Tensor,
    indices: &Tensor,
    b: usize,
    n: usize,
    m: usize,
    c: usize,
) -> Result<Tensor> {
    let be = WgpuBackend::new();
    let dp = be.from_host_f32(&points.data())?;
    let di = be.from_host_i32(&indices.data_i32())?;
    let out = be.gather_points(&dp, &di, b, n, m, c)?;
    let arr = be
        .to_host_f32(&out)?
        .into_shape(IxDyn(&[b, m, c]))
        .map_err(|_| invalid("gather_points: output reshape failed"))?;
    Ok(Tensor::from_array_on(arr, Device::Wgpu))
}

pub fn gather_points_backward(
    grad: &Tensor,
    indices: &Tensor,
    b: usize,
    m: usize,
    c: usize,
    n: usize,
) -> Result<Tensor> {
    let be = WgpuBackend::new();
    let dg = be.from_host_f32(&grad.data())?;
    let di = be.from_host_i32(&indices.data_i32())?;
    let out = be.gather_points_backward(&dg, &di, b, m, c, n)?;
    let arr = be
        .to_host_f32(&out)?
        .into_shape(IxDyn(&[b, n, c]))
        .map_err(|_| invalid("gather_points_backward: output reshape failed"))?;
    Ok(Tensor::from_array_on(arr, Device::Wgpu))
}

pub fn three_nn(
    points: &Tensor,
    queries: &Tensor,
    b: usize,
    n: usize,
    m: usize,
) -> Result<(Tensor, Tensor)> {
    let be = WgpuBackend::new();
    let dp = be.from_host_f32(&points.data())?;
    let dq = be.from_host_f32(&queries.data())?;
    let (out_d, out_i) = be.three_nn(&dp, &dq, b, n, m)?;
    let dists = be
        .to_host_f32(&out_d)?
        .into_shape(IxDyn(&[b, m, 3]))
        .map_err(|_| invalid("three_nn: distance reshape failed"))?;
    let idxs = be
        .to_host_i32(&out_i)?
        .into_shape(IxDyn(&[b, m, 3]))
        .map_err(|_| invalid("three_nn: index reshape failed"))?;
    Ok((
        Tensor::from_array_on(dists, Device::Wgpu),
        Tensor::from_i32_on(idxs, Device::Wgpu),
    ))
}
