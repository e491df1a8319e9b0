use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
    sync::atomic::{AtomicUsize, Ordering},
};

use ndarray::{ArrayD, IxDyn};

use crate::{
    autograd::GradFn,
    device::Device,
    dtype::DType,
    error::{device as device_err, Result},
};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Shared immutable-view handle over a batched array. Cloning is cheap and
/// aliases the same storage; kernels never mutate their inputs.
#[derive(Clone)]
pub struct Tensor(pub(crate) Rc<RefCell<Inner>>);

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Tensor")
            .field("id", &inner.id)
            .field("dtype", &inner.dtype)
            .field("device", &inner.device)
            .field("requires_grad", &inner.requires_grad)
            .finish()
    }
}

pub enum Storage {
    F32(ArrayD<f32>),
    I32(ArrayD<i32>),
}

pub struct Inner {
    id: usize,
    pub storage: Storage,
    pub dtype: DType,
    pub device: Device,
    pub requires_grad: bool,
    pub grad: Option<ArrayD<f32>>,
    pub grad_fn: Option<GradFn>,
}

impl Tensor {
    fn with_storage(storage: Storage, dtype: DType, device: Device) -> Self {
        let inner = Inner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            storage,
            dtype,
            device,
            requires_grad: false,
            grad: None,
            grad_fn: None,
        };
        Tensor(Rc::new(RefCell::new(inner)))
    }

    pub fn from_array(data: ArrayD<f32>) -> Self {
        Self::with_storage(Storage::F32(data), DType::F32, Device::Cpu)
    }
    pub fn from_i32(data: ArrayD<i32>) -> Self {
        Self::with_storage(Storage::I32(data), DType::I32, Device::Cpu)
    }
    pub(crate) fn from_array_on(data: ArrayD<f32>, device: Device) -> Self {
        Self::with_storage(Storage::F32(data), DType::F32, device)
    }
    pub(crate) fn from_i32_on(data: ArrayD<i32>, device: Device) -> Self {
        Self::with_storage(Storage::I32(data), DType::I32, device)
    }
    pub fn zeros(shape: &[usize]) -> Self {
        Self::from_array(ArrayD::<f32>::zeros(IxDyn(shape)))
    }

    pub fn id(&self) -> usize {
        self.0.borrow().id
    }
    pub fn dtype(&self) -> DType {
        self.0.borrow().dtype
    }
    pub fn device(&self) -> Device {
        self.0.borrow().device
    }
    pub fn shape(&self) -> Vec<usize> {
        match &self.0.borrow().storage {
            Storage::F32(a) => a.shape().to_vec(),
            Storage::I32(a) => a.shape().to_vec(),
        }
    }
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn requires_grad(self, flag: bool) -> Self {
        if matches!(self.0.borrow().dtype, DType::F32) {
            self.0.borrow_mut().requires_grad = flag;
        }
        self
    }

    /// Host copy of f32 storage. Panics on dtype mismatch; public kernels
    /// validate dtypes before touching storage.
    pub fn data(&self) -> ArrayD<f32> {
        match &self.0.borrow().storage {
            Storage::F32(a) => a.clone(),
            _ => panic!("dtype != f32"),
        }
    }
    pub fn data_i32(&self) -> ArrayD<i32> {
        match &self.0.borrow().storage {
            Storage::I32(a) => a.clone(),
            _ => panic!("dtype != i32"),
        }
    }
    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.0.borrow().grad.clone()
    }

    /// Retags the tensor onto `device`. Storage stays host-resident in this
    /// bundle; device-tagged tensors are uploaded per kernel call.
    pub fn to_device(self, device: Device) -> Result<Self> {
        if device == Device::Wgpu && !cfg!(feature = "wgpu") {
            return Err(device_err(
                "to_device: wgpu backend not compiled in (enable the `wgpu` feature)",
            ));
        }
        self.0.borrow_mut().device = device;
        Ok(self)
    }

    pub fn attach_grad_fn(&self, gf: GradFn, requires_grad: bool) {
        self.0.borrow_mut().grad_fn = Some(gf);
        if requires_grad && matches!(self.0.borrow().dtype, DType::F32) {
            self.0.borrow_mut().requires_grad = true;
        }
    }

    pub fn backward(&self) -> Result<()> {
        let seed = if self.ndim() == 0 {
            ArrayD::<f32>::from_elem(IxDyn(&[]), 1.0)
        } else {
            ArrayD::<f32>::from_elem(IxDyn(&self.shape()), 1.0)
        };
        self.backward_with_grad(&seed)
    }

    pub fn backward_with_grad(&self, grad: &ArrayD<f32>) -> Result<()> {
        accumulate_grad(self, grad.clone());
        let root = match self.0.borrow().grad_fn.clone() {
            Some(gf) => gf,
            None => return Ok(()),
        };

        // Parents-before-children order, walked in reverse below.
        let mut topo: Vec<GradFn> = Vec::new();
        let mut visited: HashSet<usize> = HashSet::new();
        fn collect(gf: &GradFn, topo: &mut Vec<GradFn>, visited: &mut HashSet<usize>) {
            if !visited.insert(gf.key()) {
                return;
            }
            for p in gf.0.borrow().parents() {
                if let Some(pgf) = p.0.borrow().grad_fn.clone() {
                    collect(&pgf, topo, visited);
                }
            }
            topo.push(gf.clone());
        }
        collect(&root, &mut topo, &mut visited);

        let mut pending: HashMap<usize, ArrayD<f32>> = HashMap::new();
        pending.insert(root.key(), grad.clone());
        for gf in topo.into_iter().rev() {
            let go = match pending.remove(&gf.key()) {
                Some(g) => g,
                None => continue,
            };
            let gin = gf.0.borrow().backward(&go);
            let parents = gf.0.borrow().parents();
            for (p, maybe_g) in parents.into_iter().zip(gin.into_iter()) {
                if let Some(gp) = maybe_g {
                    accumulate_grad(&p, gp.clone());
                    if let Some(pgf) = p.0.borrow().grad_fn.clone() {
                        let entry = pending.entry(pgf.key());
                        entry
                            .and_modify(|old| *old = old.clone() + &gp)
                            .or_insert(gp);
                    }
                }
            }
        }
        Ok(())
    }
}

fn accumulate_grad(t: &Tensor, g: ArrayD<f32>) {
    if !matches!(t.0.borrow().dtype, DType::F32) {
        return;
    }
    let updated = if let Some(old) = &t.0.borrow().grad {
        old.clone() + &g
    } else {
        g
    };
    t.0.borrow_mut().grad = Some(updated);
}
