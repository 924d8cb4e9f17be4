//! Error kinds surfaced by the frame loop.
//!
//! Everything in here is fatal to the run loop. Transient surface conditions
//! (out-of-date, suboptimal, resize) never become a [`RenderError`]; they are
//! absorbed by the presenter and reported as a
//! [`FrameOutcome`](crate::presenter::FrameOutcome).

use thiserror::Error;
use vulkanalia::vk;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Surface reports no supported formats")]
    NoCompatibleFormat,

    #[error("Surface reports no supported present modes")]
    NoPresentModes,

    #[error("Surface format changed from {expected:?} to {found:?}; render pass is stale")]
    FormatChanged {
        expected: vk::Format,
        found: vk::Format,
    },

    #[error("Swapchain returned {count} images, outside [{min}, {max}]")]
    ImageCountOutOfRange { count: usize, min: u32, max: u32 },

    #[error("Image index {index} out of range for a swapchain of {count} images")]
    InvalidImageIndex { index: u32, count: usize },

    #[error("Window closed before it had a drawable area")]
    WindowClosed,

    #[error("At least one frame in flight is required")]
    NoFrameSlots,

    #[error("Device lost")]
    DeviceLost,

    #[error("Queue submission rejected: {0}")]
    SubmitRejected(vk::ErrorCode),

    #[error("Failed to acquire swapchain image: {0}")]
    AcquireFailed(vk::ErrorCode),

    #[error("Failed to present swapchain image: {0}")]
    PresentFailed(vk::ErrorCode),

    #[error("Vulkan error during {context}: {code}")]
    Vulkan {
        context: &'static str,
        code: vk::ErrorCode,
    },
}

impl RenderError {
    /// Wraps a failed call, promoting `ERROR_DEVICE_LOST` to [`RenderError::DeviceLost`].
    pub fn vulkan(context: &'static str, code: vk::ErrorCode) -> Self {
        if code == vk::ErrorCode::DEVICE_LOST {
            Self::DeviceLost
        } else {
            Self::Vulkan { context, code }
        }
    }

    pub fn submit(code: vk::ErrorCode) -> Self {
        if code == vk::ErrorCode::DEVICE_LOST {
            Self::DeviceLost
        } else {
            Self::SubmitRejected(code)
        }
    }

    pub fn acquire(code: vk::ErrorCode) -> Self {
        if code == vk::ErrorCode::DEVICE_LOST {
            Self::DeviceLost
        } else {
            Self::AcquireFailed(code)
        }
    }

    pub fn present(code: vk::ErrorCode) -> Self {
        if code == vk::ErrorCode::DEVICE_LOST {
            Self::DeviceLost
        } else {
            Self::PresentFailed(code)
        }
    }
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
