//! Error handling for device bring-up and runtime GPU calls.
//!
//! Bring-up failures (no loader, no usable GPU) are recoverable by the
//! application, so they surface as [`DeviceInitError`]. Once a device exists,
//! a failing Vulkan call means the GPU state can no longer be trusted;
//! [`fatal`] and [`vk_check`] log the failing call and abort the process.

use ash::vk;
use thiserror::Error;

/// Errors that can occur while bringing up the Vulkan device stack.
#[derive(Error, Debug)]
pub enum DeviceInitError {
    /// The Vulkan loader could not be found or initialized.
    #[error("failed to load the Vulkan library: {0}")]
    LoaderUnavailable(String),

    /// Validation layers were requested but are not installed.
    #[error("requested validation layers are not available")]
    MissingValidationLayers,

    /// No physical device satisfied the selection criteria.
    #[error("no suitable GPU found: {reason}")]
    NoSuitableGpu {
        /// Why every enumerated device was rejected.
        reason: String,
    },

    /// A Vulkan API call failed during initialization.
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),
}

/// Result type for device initialization.
pub type DeviceResult<T> = Result<T, DeviceInitError>;

/// Log a fatal rendering error and abort the process.
///
/// Used for unrecoverable conditions after device bring-up, where unwinding
/// past half-recorded GPU state would only obscure the original failure.
pub fn fatal(context: &str) -> ! {
    log::error!("fatal rendering error: {context}");
    std::process::abort()
}

/// Unwrap the result of a Vulkan call made after device bring-up.
///
/// On failure the call site and result code are logged and the process
/// aborts.
pub fn vk_check<T>(result: Result<T, vk::Result>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(code) => {
            log::error!("{context} failed: {code:?}");
            std::process::abort()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_errors_format_with_context() {
        let err = DeviceInitError::NoSuitableGpu {
            reason: "no discrete GPU".to_string(),
        };
        assert_eq!(err.to_string(), "no suitable GPU found: no discrete GPU");

        let err = DeviceInitError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(err.to_string().contains("ERROR_OUT_OF_DEVICE_MEMORY"));
    }

    #[test]
    fn vk_check_passes_through_success() {
        let value = vk_check(Ok::<_, vk::Result>(7u32), "unit test");
        assert_eq!(value, 7);
    }
}
