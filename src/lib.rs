//! A Vulkan frame loop: swapchain lifecycle, frames-in-flight synchronization,
//! per-frame command recording and a presenter that recovers from resizes and
//! stale surfaces.
//!
//! The core (`swapchain`, `sync`, `recorder`, `presenter`) only talks to the
//! GPU through [`RenderDevice`] and to the window through [`WindowHost`].

pub mod backend;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod presenter;
pub mod recorder;
pub mod swapchain;
pub mod sync;
pub mod teardown;
pub mod validation;
pub mod vertex;
pub mod window;

pub use config::RendererConfig;
pub use device::{QueueFamilyIndices, RenderDevice, SwapchainRequest, SwapchainSupport, VkResult};
pub use error::{RenderError, RenderResult};
pub use presenter::{DrawInputs, FrameOutcome, PresentStatus, Presenter, PresenterState, SkipReason};
pub use recorder::{CommandRecorder, RecordInputs};
pub use swapchain::{SwapchainLifecycle, SwapchainState};
pub use sync::{FrameSlot, FrameSynchronizer};
pub use window::{ResizeSignal, WindowHost};
