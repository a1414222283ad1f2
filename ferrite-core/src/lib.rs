pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod frame;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod shader;
pub mod staging;
pub mod swapchain;
pub mod uniform;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use device::{Device, Extent2D, TextureFormat};
pub use engine::Engine;
pub use error::{FerriteError, FerriteResult};
pub use frame::FrameStatus;
pub use instance::{Instance, InstanceDescriptor, Surface, WindowSurface};
pub use pipeline::Vertex;
pub use registry::Handle;
pub use staging::ImageData;
pub use uniform::{Transform, IDENTITY};
