#![forbid(unsafe_code)]

use std::fmt;

use tc_core::Device;

/// Reports whether an accelerator can take allocations right now.
pub trait AcceleratorProbe {
    fn accelerator_available(&self) -> bool;
}

impl AcceleratorProbe for bool {
    fn accelerator_available(&self) -> bool {
        *self
    }
}

impl<P: AcceleratorProbe + ?Sized> AcceleratorProbe for &P {
    fn accelerator_available(&self) -> bool {
        (**self).accelerator_available()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    Unknown { name: String },
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { name } => write!(f, "Invalid device string: {name}"),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Outcome of resolving a device name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceResolution {
    pub requested: Device,
    pub device: Device,
}

impl DeviceResolution {
    /// True when the name asked for the accelerator but CPU was handed out.
    #[must_use]
    pub fn fell_back(&self) -> bool {
        self.requested != self.device
    }
}

/// Resolves `name` to a device code.
///
/// `"cpu"` always resolves. `"cuda"` resolves to the accelerator only if the
/// probe reports one at call time and silently degrades to CPU otherwise.
/// Every other name, including other casings, is rejected.
pub fn resolve_device(
    name: &str,
    probe: &impl AcceleratorProbe,
) -> Result<DeviceResolution, DeviceError> {
    match name {
        "cpu" => Ok(DeviceResolution {
            requested: Device::Cpu,
            device: Device::Cpu,
        }),
        "cuda" => {
            let device = if probe.accelerator_available() {
                Device::Cuda
            } else {
                Device::Cpu
            };
            Ok(DeviceResolution {
                requested: Device::Cuda,
                device,
            })
        }
        other => Err(DeviceError::Unknown {
            name: other.to_string(),
        }),
    }
}
