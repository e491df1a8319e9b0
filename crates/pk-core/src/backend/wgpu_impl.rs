use bytemuck::{Pod, Zeroable};
use ndarray::ArrayD;
use once_cell::sync::OnceCell;
use tracing::info;
use wgpu::util::DeviceExt;

use crate::{
    device::Device,
    error::{device as dev_err, exhausted, Result},
};

const WGSL_SRC: &str = include_str!("point_kernels.wgsl");
const WORKGROUP: u32 = 256;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct GatherInfo {
    pub b: u32,
    pub n: u32,
    pub m: u32,
    pub c: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct BallInfo {
    pub b: u32,
    pub n: u32,
    pub m: u32,
    pub k: u32,
    pub r2: f32,
    pub _p0: u32,
    pub _p1: u32,
    pub _p2: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct NnInfo {
    pub b: u32,
    pub n: u32,
    pub m: u32,
    pub _p: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FpsInfo {
    pub b: u32,
    pub n: u32,
    pub s: u32,
    pub _p: u32,
}

/// Flat device-resident f32 buffer; shape bookkeeping stays with the caller.
pub struct BackendArrayF32 {
    pub len: usize,
    pub buffer: wgpu::Buffer,
}

pub struct BackendArrayI32 {
    pub len: usize,
    pub buffer: wgpu::Buffer,
}

pub trait Backend {
    fn name(&self) -> &'static str;
    fn device(&self) -> Device;
    fn from_host_f32(&self, host: &ArrayD<f32>) -> Result<BackendArrayF32>;
    fn to_host_f32(&self, arr: &BackendArrayF32) -> Result<ArrayD<f32>>;
}

pub struct WgpuBackend;

impl WgpuBackend {
    pub fn new() -> Self {
        WgpuBackend
    }
}

impl Default for WgpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct Ctx {
    device: wgpu::Device,
    queue: wgpu::Queue,
    p_gather: wgpu::ComputePipeline,
    p_gather_grad: wgpu::ComputePipeline,
    p_ball: wgpu::ComputePipeline,
    p_three_nn: wgpu::ComputePipeline,
    p_fps: wgpu::ComputePipeline,
}

static CTX: OnceCell<Ctx> = OnceCell::new();

fn ctx() -> Result<&'static Ctx> {
    CTX.get_or_try_init(|| {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        )
        .ok_or_else(|| dev_err("wgpu: no suitable adapter"))?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("pointkit-wgpu"),
                features: wgpu::Features::empty(),
                limits: wgpu::Limits::downlevel_defaults(),
            },
            None,
        ))
        .map_err(|e| dev_err(format!("wgpu: device request failed: {e}")))?;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("pk-wgsl"),
            source: wgpu::ShaderSource::Wgsl(WGSL_SRC.into()),
        });
        let pipe = |entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: None,
                module: &shader,
                entry_point: entry,
            })
        };
        let p_gather = pipe("gather_points");
        let p_gather_grad = pipe("gather_points_grad");
        let p_ball = pipe("ball_point");
        let p_three_nn = pipe("three_nn");
        let p_fps = pipe("farthest_point_sample");
        info!(adapter = %adapter.get_info().name, "initialized wgpu point-kernel context");
        Ok(Ctx {
            device,
            queue,
            p_gather,
            p_gather_grad,
            p_ball,
            p_three_nn,
            p_fps,
        })
    })
}

fn buf(device: &wgpu::Device, size: u64, usage: wgpu::BufferUsages, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    })
}

fn storage_usage() -> wgpu::BufferUsages {
    wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST
}

fn uniform_init<T: Pod>(c: &Ctx, info: &T, label: &str) -> wgpu::Buffer {
    c.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(info),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
}

fn read_back(c: &Ctx, src: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
    let read = buf(
        &c.device,
        size,
        wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        "read",
    );
    let mut enc = c
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("rb-enc") });
    enc.copy_buffer_to_buffer(src, 0, &read, 0, size);
    c.queue.submit(std::iter::once(enc.finish()));
    let slice = read.slice(..);
    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    c.device.poll(wgpu::Maintain::Wait);
    match pollster::block_on(rx.receive()) {
        Some(Ok(())) => {}
        _ => return Err(exhausted("wgpu: output buffer map failed")),
    }
    let data = slice.get_mapped_range().to_vec();
    read.unmap();
    Ok(data)
}

fn dispatch(c: &Ctx, pipeline: &wgpu::ComputePipeline, group: u32, bind: &wgpu::BindGroup, groups_x: u32, label: &str) {
    let mut e = c
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
    {
        let mut p = e.begin_compute_pass(&wgpu::ComputePassDescriptor { label: Some(label) });
        p.set_pipeline(pipeline);
        p.set_bind_group(group, bind, &[]);
        p.dispatch_workgroups(groups_x, 1, 1);
    }
    c.queue.submit(std::iter::once(e.finish()));
}

fn groups_for(total: usize) -> u32 {
    ((total as u32) + WORKGROUP - 1) / WORKGROUP
}

impl Backend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }
    fn device(&self) -> Device {
        Device::Wgpu
    }
    fn from_host_f32(&self, host: &ArrayD<f32>) -> Result<BackendArrayF32> {
        let c = ctx()?;
        let slice = host
            .as_slice()
            .ok_or_else(|| dev_err("wgpu: host array not contiguous"))?;
        let buffer = c
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("upload-f32"),
                contents: bytemuck::cast_slice(slice),
                usage: storage_usage(),
            });
        Ok(BackendArrayF32 {
            len: host.len(),
            buffer,
        })
    }
    fn to_host_f32(&self, arr: &BackendArrayF32) -> Result<ArrayD<f32>> {
        let c = ctx()?;
        let data = read_back(c, &arr.buffer, (arr.len * 4) as u64)?;
        let v: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        Ok(ndarray::Array1::from_vec(v).into_dyn())
    }
}

impl WgpuBackend {
    pub fn from_host_i32(&self, host: &ArrayD<i32>) -> Result<BackendArrayI32> {
        let c = ctx()?;
        let slice = host
            .as_slice()
            .ok_or_else(|| dev_err("wgpu: host array not contiguous"))?;
        let buffer = c
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("upload-i32"),
                contents: bytemuck::cast_slice(slice),
                usage: storage_usage(),
            });
        Ok(BackendArrayI32 {
            len: host.len(),
            buffer,
        })
    }

    pub fn to_host_i32(&self, arr: &BackendArrayI32) -> Result<ArrayD<i32>> {
        let c = ctx()?;
        let data = read_back(c, &arr.buffer, (arr.len * 4) as u64)?;
        let v: Vec<i32> = bytemuck::cast_slice(&data).to_vec();
        Ok(ndarray::Array1::from_vec(v).into_dyn())
    }

    pub fn gather_points(
        &self,
        points: &BackendArrayF32,
        indices: &BackendArrayI32,
        b: usize,
        n: usize,
        m: usize,
        ch: usize,
    ) -> Result<BackendArrayF32> {
        let c = ctx()?;
        let total = b * m * ch;
        let out = buf(&c.device, (total * 4) as u64, storage_usage(), "gather-out");
        let info = GatherInfo {
            b: b as u32,
            n: n as u32,
            m: m as u32,
            c: ch as u32,
        };
        let ub = uniform_init(c, &info, "gather-info");
        let bind = c.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gather-bind"),
            layout: &c.p_gather.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: points.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: indices.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: ub.as_entire_binding(),
                },
            ],
        });
        dispatch(c, &c.p_gather, 0, &bind, groups_for(total), "gather-enc");
        Ok(BackendArrayF32 {
            len: total,
            buffer: out,
        })
    }

    pub fn gather_points_backward(
        &self,
        grad: &BackendArrayF32,
        indices: &BackendArrayI32,
        b: usize,
        m: usize,
        ch: usize,
        n: usize,
    ) -> Result<BackendArrayF32> {
        let c = ctx()?;
        let total = b * n * ch;
        let out = buf(
            &c.device,
            (total * 4) as u64,
            storage_usage(),
            "gather-grad-out",
        );
        let info = GatherInfo {
            b: b as u32,
            n: n as u32,
            m: m as u32,
            c: ch as u32,
        };
        let ub = uniform_init(c, &info, "gather-grad-info");
        let bind = c.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gather-grad-bind"),
            layout: &c.p_gather_grad.get_bind_group_layout(1),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: grad.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: indices.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: ub.as_entire_binding(),
                },
            ],
        });
        dispatch(
            c,
            &c.p_gather_grad,
            1,
            &bind,
            groups_for(total),
            "gather-grad-enc",
        );
        Ok(BackendArrayF32 {
            len: total,
            buffer: out,
        })
    }

    pub fn ball_point(
        &self,
        points: &BackendArrayF32,
        queries: &BackendArrayF32,
        b: usize,
        n: usize,
        m: usize,
        radius: f32,
        k: usize,
    ) -> Result<BackendArrayI32> {
        let c = ctx()?;
        let total = b * m;
        let out = buf(
            &c.device,
            (total * k * 4) as u64,
            storage_usage(),
            "ball-out",
        );
        let info = BallInfo {
            b: b as u32,
            n: n as u32,
            m: m as u32,
            k: k as u32,
            r2: radius * radius,
            _p0: 0,
            _p1: 0,
            _p2: 0,
        };
        let ub = uniform_init(c, &info, "ball-info");
        let bind = c.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ball-bind"),
            layout: &c.p_ball.get_bind_group_layout(2),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: points.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: queries.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: ub.as_entire_binding(),
                },
            ],
        });
        dispatch(c, &c.p_ball, 2, &bind, groups_for(total), "ball-enc");
        Ok(BackendArrayI32 {
            len: total * k,
            buffer: out,
        })
    }

    pub fn three_nn(
        &self,
        points: &BackendArrayF32,
        queries: &BackendArrayF32,
        b: usize,
        n: usize,
        m: usize,
    ) -> Result<(BackendArrayF32, BackendArrayI32)> {
        let c = ctx()?;
        let total = b * m;
        let out_d = buf(
            &c.device,
            (total * 3 * 4) as u64,
            storage_usage(),
            "three-nn-dist",
        );
        let out_i = buf(
            &c.device,
            (total * 3 * 4) as u64,
            storage_usage(),
            "three-nn-idx",
        );
        let info = NnInfo {
            b: b as u32,
            n: n as u32,
            m: m as u32,
            _p: 0,
        };
        let ub = uniform_init(c, &info, "three-nn-info");
        let bind = c.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("three-nn-bind"),
            layout: &c.p_three_nn.get_bind_group_layout(3),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: points.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: queries.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: out_d.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: out_i.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: ub.as_entire_binding(),
                },
            ],
        });
        dispatch(c, &c.p_three_nn, 3, &bind, groups_for(total), "three-nn-enc");
        Ok((
            BackendArrayF32 {
                len: total * 3,
                buffer: out_d,
            },
            BackendArrayI32 {
                len: total * 3,
                buffer: out_i,
            },
        ))
    }

    /// One workgroup per batch element; selection rounds are sequential,
    /// the per-round distance update and argmax run across the workgroup.
    pub fn farthest_point_sample(
        &self,
        points: &BackendArrayF32,
        b: usize,
        n: usize,
        num_samples: usize,
    ) -> Result<BackendArrayI32> {
        let c = ctx()?;
        let total = b * num_samples;
        let out = buf(&c.device, (total * 4) as u64, storage_usage(), "fps-out");
        let init = vec![1.0e10f32; b * n];
        let min_dist = c
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("fps-mind"),
                contents: bytemuck::cast_slice(&init),
                usage: storage_usage(),
            });
        let info = FpsInfo {
            b: b as u32,
            n: n as u32,
            s: num_samples as u32,
            _p: 0,
        };
        let ub = uniform_init(c, &info, "fps-info");
        let bind = c.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fps-bind"),
            layout: &c.p_fps.get_bind_group_layout(4),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: points.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: min_dist.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: ub.as_entire_binding(),
                },
            ],
        });
        dispatch(c, &c.p_fps, 4, &bind, b as u32, "fps-enc");
        Ok(BackendArrayI32 {
            len: total,
            buffer: out,
        })
    }
}
