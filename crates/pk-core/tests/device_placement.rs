use pk_core::{Device, Tensor};

#[test]
fn tensors_start_on_cpu() {
    let t = Tensor::zeros(&[2, 3]);
    assert_eq!(t.device(), Device::Cpu);
    let t = t.to_device(Device::Cpu).unwrap();
    assert_eq!(t.device(), Device::Cpu);
}

#[cfg(not(feature = "wgpu"))]
#[test]
fn moving_to_wgpu_without_the_feature_is_a_device_error() {
    let t = Tensor::zeros(&[2, 3]);
    let err = t.to_device(Device::Wgpu).unwrap_err();
    assert!(matches!(err, pk_core::PointError::Device(_)));
}
