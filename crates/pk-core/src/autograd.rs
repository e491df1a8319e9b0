use std::{cell::RefCell, rc::Rc};

use ndarray::ArrayD;

use crate::Tensor;

/// A node in the reverse-mode graph. `backward` maps the gradient flowing
/// into this node's output to one gradient slot per parent (`None` for
/// non-differentiable parents such as index tensors).
pub trait BackwardNode {
    fn name(&self) -> &'static str;
    fn parents(&self) -> Vec<Tensor>;
    fn backward(&self, grad_out: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>>;
}

#[derive(Clone)]
pub struct GradFn(pub Rc<RefCell<dyn BackwardNode>>);

impl GradFn {
    pub fn new<N: BackwardNode + 'static>(node: N) -> Self {
        GradFn(Rc::new(RefCell::new(node)))
    }
    pub fn key(&self) -> usize {
        self.0.as_ptr() as *const () as usize
    }
}
