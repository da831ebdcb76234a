use candle_core::{DType, Device, Tensor};
use ndarray::Array2;
use once_cell::sync::Lazy;

static CANDLE_DEVICE: Lazy<Device> = Lazy::new(|| {
    // CUDA first, then Metal, then CPU. Which one ran never changes results.
    match Device::cuda_if_available(0) {
        Ok(device) if device.is_cuda() => {
            log::info!("Successfully initialized Candle CUDA device (GPU).");
            return device;
        }
        Ok(_) => {}
        Err(err) => {
            log::warn!("Failed to initialize Candle CUDA device: {:?}", err);
        }
    }

    match Device::new_metal(0) {
        Ok(metal_device) => {
            if metal_device.is_metal() {
                log::info!("Successfully initialized Candle Metal device (GPU).");
                metal_device
            } else {
                log::warn!(
                    "Device::new_metal(0) succeeded but device.is_metal() is false. Using CPU."
                );
                Device::Cpu
            }
        }
        Err(err) => {
            log::debug!("Candle Metal device unavailable: {:?}", err);
            log::info!("Using Candle CPU device.");
            Device::Cpu
        }
    }
});

/// Device shared by every model loaded in this process.
pub fn candle_device() -> &'static Device {
    &CANDLE_DEVICE
}

/// Copies a rank-2 tensor back to host memory as an `ndarray` matrix.
pub fn tensor_to_array2(tensor: &Tensor) -> candle_core::Result<Array2<f32>> {
    let (rows, cols) = tensor.dims2()?;
    let flat: Vec<f32> = tensor
        .to_dtype(DType::F32)?
        .flatten_all()?
        .to_vec1::<f32>()?;
    Array2::from_shape_vec((rows, cols), flat)
        .map_err(|e| candle_core::Error::Msg(format!("tensor to matrix conversion failed: {e}")))
}
