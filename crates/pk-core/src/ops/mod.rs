use ndarray::{Array2, Array3, ArrayD, Ix2, Ix3, IxDyn};

use crate::{
    autograd::{BackwardNode, GradFn},
    device::Device,
    dtype::DType,
    error::{device as device_err, dtype as dtype_err, invalid, Result},
    Tensor,
};

#[cfg(feature = "wgpu")]
mod gpu;
#[cfg(not(feature = "wgpu"))]
mod gpu {
    use super::*;

    fn off(op: &str) -> crate::error::PointError {
        device_err(format!("{op}: wgpu backend not compiled in (enable the `wgpu` feature)"))
    }

    pub fn farthest_point_sample(_points: &Tensor, _b: usize, _n: usize, _s: usize) -> Result<Tensor> {
        Err(off("farthest_point_sample"))
    }
    pub fn ball_point(
        _points: &Tensor,
        _queries: &Tensor,
        _b: usize,
        _n: usize,
        _m: usize,
        _radius: f32,
        _k: usize,
    ) -> Result<Tensor> {
        Err(off("ball_point"))
    }
    pub fn gather_points(
        _points: &Tensor,
        _indices: &Tensor,
        _b: usize,
        _n: usize,
        _m: usize,
        _c: usize,
    ) -> Result<Tensor> {
        Err(off("gather_points"))
    }
    pub fn gather_points_backward(
        _grad: &Tensor,
        _indices: &Tensor,
        _b: usize,
        _m: usize,
        _c: usize,
        _n: usize,
    ) -> Result<Tensor> {
        Err(off("gather_points_backward"))
    }
    pub fn three_nn(
        _points: &Tensor,
        _queries: &Tensor,
        _b: usize,
        _n: usize,
        _m: usize,
    ) -> Result<(Tensor, Tensor)> {
        Err(off("three_nn"))
    }
}

// ---------- validation helpers ----------

/// (batch, count) of a 3-column coordinate tensor.
fn coords3(op: &str, arg: &str, t: &Tensor) -> Result<(usize, usize)> {
    if t.dtype() != DType::F32 {
        return Err(dtype_err(format!("{op}: {arg} must be f32")));
    }
    let shape = t.shape();
    if shape.len() != 3 || shape[2] != 3 {
        return Err(invalid(format!(
            "{op}: {arg} must have shape (batch, num_points, 3), got {:?}",
            shape
        )));
    }
    Ok((shape[0], shape[1]))
}

/// (batch, count, channels) of a feature tensor.
fn features3(op: &str, arg: &str, t: &Tensor) -> Result<(usize, usize, usize)> {
    if t.dtype() != DType::F32 {
        return Err(dtype_err(format!("{op}: {arg} must be f32")));
    }
    let shape = t.shape();
    if shape.len() != 3 {
        return Err(invalid(format!(
            "{op}: {arg} must have shape (batch, count, channels), got {:?}",
            shape
        )));
    }
    Ok((shape[0], shape[1], shape[2]))
}

/// (batch, count) of an index tensor.
fn index2(op: &str, arg: &str, t: &Tensor) -> Result<(usize, usize)> {
    if t.dtype() != DType::I32 {
        return Err(dtype_err(format!("{op}: {arg} must be i32")));
    }
    let shape = t.shape();
    if shape.len() != 2 {
        return Err(invalid(format!(
            "{op}: {arg} must have shape (batch, count), got {:?}",
            shape
        )));
    }
    Ok((shape[0], shape[1]))
}

fn same_device(op: &str, tensors: &[&Tensor]) -> Result<Device> {
    let dev = tensors[0].device();
    for t in &tensors[1..] {
        if t.device() != dev {
            return Err(device_err(format!("{op}: inputs must share one device")));
        }
    }
    Ok(dev)
}

fn check_index_range(op: &str, indices: &Array2<i32>, n: usize) -> Result<()> {
    let (b, m) = indices.dim();
    for bi in 0..b {
        for mi in 0..m {
            let raw = indices[[bi, mi]];
            if raw < 0 || raw as usize >= n {
                return Err(invalid(format!(
                    "{op}: indices[{bi}, {mi}] = {raw} out of range for {n} points"
                )));
            }
        }
    }
    Ok(())
}

// ---------- basic op used in tests ----------

pub fn sum(x: &Tensor) -> Result<Tensor> {
    if x.dtype() != DType::F32 {
        return Err(dtype_err("sum: input must be f32"));
    }
    let xv = x.data();
    let s = xv.sum();
    let out = Tensor::from_array(ndarray::arr0(s).into_dyn());
    if x.0.borrow().requires_grad {
        struct Node {
            x: Tensor,
        }
        impl BackwardNode for Node {
            fn name(&self) -> &'static str {
                "sum"
            }
            fn parents(&self) -> Vec<Tensor> {
                vec![self.x.clone()]
            }
            fn backward(&self, grad_out: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
                let go = grad_out.sum();
                vec![Some(ArrayD::<f32>::from_elem(IxDyn(&self.x.shape()), go))]
            }
        }
        out.attach_grad_fn(GradFn::new(Node { x: x.clone() }), true);
    }
    Ok(out)
}

// ---------- farthest_point_sample ----------

/// Iterative farthest-point selection over each batch: the first pick is
/// index 0, every following pick is the unselected point with the greatest
/// minimum distance to the already-selected set (lowest index on ties, so
/// the result is unique even for coincident points).
pub fn farthest_point_sample(points: &Tensor, num_samples: usize) -> Result<Tensor> {
    let (b, n) = coords3("farthest_point_sample", "points", points)?;
    if num_samples == 0 || num_samples > n {
        return Err(invalid(format!(
            "farthest_point_sample: num_samples must be in 1..={n} (got {num_samples})"
        )));
    }
    match same_device("farthest_point_sample", &[points])? {
        Device::Cpu => {}
        Device::Wgpu => return gpu::farthest_point_sample(points, b, n, num_samples),
    }

    let pts = points
        .data()
        .into_dimensionality::<Ix3>()
        .map_err(|_| invalid("farthest_point_sample: points must be rank 3"))?;
    let mut out = Array2::<i32>::zeros((b, num_samples));
    for bi in 0..b {
        let mut selected = vec![false; n];
        let mut min_d = vec![f32::INFINITY; n];
        let mut cur = 0usize;
        selected[0] = true;
        out[[bi, 0]] = 0;
        for s in 1..num_samples {
            let cx = pts[[bi, cur, 0]];
            let cy = pts[[bi, cur, 1]];
            let cz = pts[[bi, cur, 2]];
            let mut best = 0usize;
            let mut best_d = f32::NEG_INFINITY;
            for i in 0..n {
                if selected[i] {
                    continue;
                }
                let dx = pts[[bi, i, 0]] - cx;
                let dy = pts[[bi, i, 1]] - cy;
                let dz = pts[[bi, i, 2]] - cz;
                let d = dx * dx + dy * dy + dz * dz;
                if d < min_d[i] {
                    min_d[i] = d;
                }
                // strict > keeps the lowest unselected index on ties
                if min_d[i] > best_d {
                    best_d = min_d[i];
                    best = i;
                }
            }
            selected[best] = true;
            out[[bi, s]] = best as i32;
            cur = best;
        }
    }
    Ok(Tensor::from_i32(out.into_dyn()))
}

// ---------- ball_point ----------

/// Radius neighbor search: for each query, up to `k` point indices within
/// `radius`, in ascending index order. Underfull rows are padded with the
/// first found neighbor's index; rows with no neighbor stay zero.
pub fn ball_point(points: &Tensor, queries: &Tensor, radius: f32, k: usize) -> Result<Tensor> {
    let (b, n) = coords3("ball_point", "points", points)?;
    let (bq, m) = coords3("ball_point", "queries", queries)?;
    if b != bq {
        return Err(invalid(format!(
            "ball_point: batch mismatch between points ({b}) and queries ({bq})"
        )));
    }
    if !(radius > 0.0) || !radius.is_finite() {
        return Err(invalid(format!(
            "ball_point: radius must be positive and finite (got {radius})"
        )));
    }
    if k < 1 {
        return Err(invalid("ball_point: k must be at least 1 (got 0)"));
    }
    match same_device("ball_point", &[points, queries])? {
        Device::Cpu => {}
        Device::Wgpu => return gpu::ball_point(points, queries, b, n, m, radius, k),
    }

    let pts = points
        .data()
        .into_dimensionality::<Ix3>()
        .map_err(|_| invalid("ball_point: points must be rank 3"))?;
    let qs = queries
        .data()
        .into_dimensionality::<Ix3>()
        .map_err(|_| invalid("ball_point: queries must be rank 3"))?;
    let r2 = radius * radius;
    let mut out = Array3::<i32>::zeros((b, m, k));
    for bi in 0..b {
        for mi in 0..m {
            let qx = qs[[bi, mi, 0]];
            let qy = qs[[bi, mi, 1]];
            let qz = qs[[bi, mi, 2]];
            let mut found = 0usize;
            for i in 0..n {
                let dx = pts[[bi, i, 0]] - qx;
                let dy = pts[[bi, i, 1]] - qy;
                let dz = pts[[bi, i, 2]] - qz;
                if dx * dx + dy * dy + dz * dz <= r2 {
                    if found == 0 {
                        for slot in 0..k {
                            out[[bi, mi, slot]] = i as i32;
                        }
                    }
                    out[[bi, mi, found]] = i as i32;
                    found += 1;
                    if found == k {
                        break;
                    }
                }
            }
        }
    }
    Ok(Tensor::from_i32(out.into_dyn()))
}

// ---------- gather_points / gather_points_backward ----------

fn scatter_accumulate(grad: &Array3<f32>, indices: &Array2<i32>, n: usize) -> Array3<f32> {
    let (b, m, c) = grad.dim();
    let mut out = Array3::<f32>::zeros((b, n, c));
    for bi in 0..b {
        for mi in 0..m {
            let src = indices[[bi, mi]] as usize;
            for ci in 0..c {
                out[[bi, src, ci]] += grad[[bi, mi, ci]];
            }
        }
    }
    out
}

/// Per-batch row gather: `out[b, m, :] = points[b, indices[b, m], :]`.
/// Differentiable in `points`; the backward pass is the scatter-accumulate
/// of [`gather_points_backward`].
pub fn gather_points(points: &Tensor, indices: &Tensor) -> Result<Tensor> {
    let (b, n, c) = features3("gather_points", "points", points)?;
    let (bi_, m) = index2("gather_points", "indices", indices)?;
    if b != bi_ {
        return Err(invalid(format!(
            "gather_points: batch mismatch between points ({b}) and indices ({bi_})"
        )));
    }
    let iv = indices
        .data_i32()
        .into_dimensionality::<Ix2>()
        .map_err(|_| invalid("gather_points: indices must be rank 2"))?;
    check_index_range("gather_points", &iv, n)?;

    let out_t = match same_device("gather_points", &[points, indices])? {
        Device::Cpu => {
            let pv = points
                .data()
                .into_dimensionality::<Ix3>()
                .map_err(|_| invalid("gather_points: points must be rank 3"))?;
            let mut out = Array3::<f32>::zeros((b, m, c));
            for bi in 0..b {
                for mi in 0..m {
                    let src = iv[[bi, mi]] as usize;
                    for ci in 0..c {
                        out[[bi, mi, ci]] = pv[[bi, src, ci]];
                    }
                }
            }
            Tensor::from_array(out.into_dyn())
        }
        Device::Wgpu => gpu::gather_points(points, indices, b, n, m, c)?,
    };

    if points.0.borrow().requires_grad {
        struct Node {
            points: Tensor,
            indices: Tensor,
        }
        impl BackwardNode for Node {
            fn name(&self) -> &'static str {
                "gather_points"
            }
            fn parents(&self) -> Vec<Tensor> {
                vec![self.points.clone()]
            }
            fn backward(&self, grad_out: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
                let n = self.points.shape()[1];
                let iv = self
                    .indices
                    .data_i32()
                    .into_dimensionality::<Ix2>()
                    .unwrap();
                let go = grad_out.clone().into_dimensionality::<Ix3>().unwrap();
                vec![Some(scatter_accumulate(&go, &iv, n).into_dyn())]
            }
        }
        let gf = GradFn::new(Node {
            points: points.clone(),
            indices: indices.clone(),
        });
        out_t.attach_grad_fn(gf, true);
    }
    Ok(out_t)
}

/// Adjoint of [`gather_points`]: zero-initialized (batch, n, channels)
/// output with `out[b, indices[b,m], :] += grad[b, m, :]` for every m.
/// Accumulation across repeated indices is exact.
pub fn gather_points_backward(grad: &Tensor, indices: &Tensor, n: usize) -> Result<Tensor> {
    let (b, m, c) = features3("gather_points_backward", "grad", grad)?;
    let (bi_, mi_) = index2("gather_points_backward", "indices", indices)?;
    if b != bi_ || m != mi_ {
        return Err(invalid(format!(
            "gather_points_backward: grad ({b}, {m}, _) and indices ({bi_}, {mi_}) disagree"
        )));
    }
    if n == 0 {
        return Err(invalid(
            "gather_points_backward: n must be at least 1 (got 0)",
        ));
    }
    let iv = indices
        .data_i32()
        .into_dimensionality::<Ix2>()
        .map_err(|_| invalid("gather_points_backward: indices must be rank 2"))?;
    check_index_range("gather_points_backward", &iv, n)?;

    match same_device("gather_points_backward", &[grad, indices])? {
        Device::Cpu => {
            let gv = grad
                .data()
                .into_dimensionality::<Ix3>()
                .map_err(|_| invalid("gather_points_backward: grad must be rank 3"))?;
            Ok(Tensor::from_array(
                scatter_accumulate(&gv, &iv, n).into_dyn(),
            ))
        }
        Device::Wgpu => gpu::gather_points_backward(grad, indices, b, m, c, n),
    }
}

// ---------- three_nn ----------

/// Three nearest points per query, sorted ascending by Euclidean distance
/// (ties to the lower index). Returns (distances, indices), both
/// (batch, num_queries, 3).
pub fn three_nn(points: &Tensor, queries: &Tensor) -> Result<(Tensor, Tensor)> {
    let (b, n) = coords3("three_nn", "points", points)?;
    let (bq, m) = coords3("three_nn", "queries", queries)?;
    if b != bq {
        return Err(invalid(format!(
            "three_nn: batch mismatch between points ({b}) and queries ({bq})"
        )));
    }
    if n < 3 {
        return Err(invalid(format!(
            "three_nn: need at least 3 points per batch (got {n})"
        )));
    }
    match same_device("three_nn", &[points, queries])? {
        Device::Cpu => {}
        Device::Wgpu => return gpu::three_nn(points, queries, b, n, m),
    }

    let pts = points
        .data()
        .into_dimensionality::<Ix3>()
        .map_err(|_| invalid("three_nn: points must be rank 3"))?;
    let qs = queries
        .data()
        .into_dimensionality::<Ix3>()
        .map_err(|_| invalid("three_nn: queries must be rank 3"))?;
    let mut dists = Array3::<f32>::zeros((b, m, 3));
    let mut idxs = Array3::<i32>::zeros((b, m, 3));
    for bi in 0..b {
        for mi in 0..m {
            let qx = qs[[bi, mi, 0]];
            let qy = qs[[bi, mi, 1]];
            let qz = qs[[bi, mi, 2]];
            let mut bd = [f32::INFINITY; 3];
            let mut bn = [0usize; 3];
            for i in 0..n {
                let dx = pts[[bi, i, 0]] - qx;
                let dy = pts[[bi, i, 1]] - qy;
                let dz = pts[[bi, i, 2]] - qz;
                let d = dx * dx + dy * dy + dz * dz;
                // strict < keeps the earlier index on ties
                if d < bd[0] {
                    bd[2] = bd[1];
                    bn[2] = bn[1];
                    bd[1] = bd[0];
                    bn[1] = bn[0];
                    bd[0] = d;
                    bn[0] = i;
                } else if d < bd[1] {
                    bd[2] = bd[1];
                    bn[2] = bn[1];
                    bd[1] = d;
                    bn[1] = i;
                } else if d < bd[2] {
                    bd[2] = d;
                    bn[2] = i;
                }
            }
            for j in 0..3 {
                dists[[bi, mi, j]] = bd[j].sqrt();
                idxs[[bi, mi, j]] = bn[j] as i32;
            }
        }
    }
    Ok((
        Tensor::from_array(dists.into_dyn()),
        Tensor::from_i32(idxs.into_dyn()),
    ))
}
