use std::fmt;
use std::path::PathBuf;
use std::sync::PoisonError;

use crate::registry::Handle;

#[derive(Debug)]
pub enum FerriteError {
    InvalidConfig(String),
    LibraryLoadFailed(String),
    InstanceCreationFailed(String),
    SurfaceCreationFailed(String),
    NoEligibleDevice,
    DeviceCreationFailed(String),
    SwapchainCreationFailed(String),
    ShaderLoadFailed { path: PathBuf, reason: String },
    PipelineCreationFailed(String),
    ResourceCreationFailed(String),
    NoMatchingMemoryType { type_bits: u32, required: u32 },
    DescriptorPoolExhausted { capacity: u32 },
    StagingOverflow { requested: u64, capacity: u64 },
    UnknownHandle(Handle),
    ResourceInUse(Handle),
    InvalidImageData(String),
    RenderTimeout,
    TransferTimeout,
    SubmissionFailed(String),
    PresentationFailed(String),
    RenderLoopFailed(String),
    BackendError(String),
}

impl FerriteError {
    /// Timeouts mean the GPU stopped making progress; nothing at this layer can recover.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FerriteError::RenderTimeout | FerriteError::TransferTimeout)
    }
}

impl fmt::Display for FerriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FerriteError::InvalidConfig(msg) => write!(f, "Invalid Config: {}", msg),
            FerriteError::LibraryLoadFailed(msg) => write!(f, "Library Load Failed: {}", msg),
            FerriteError::InstanceCreationFailed(msg) => write!(f, "Instance Creation Failed: {}", msg),
            FerriteError::SurfaceCreationFailed(msg) => write!(f, "Surface Creation Failed: {}", msg),
            FerriteError::NoEligibleDevice => write!(f, "No physical device supports graphics, presentation and swap chains"),
            FerriteError::DeviceCreationFailed(msg) => write!(f, "Device Creation Failed: {}", msg),
            FerriteError::SwapchainCreationFailed(msg) => write!(f, "Swapchain Creation Failed: {}", msg),
            FerriteError::ShaderLoadFailed { path, reason } => {
                write!(f, "Shader Load Failed ({}): {}", path.display(), reason)
            }
            FerriteError::PipelineCreationFailed(msg) => write!(f, "Pipeline Creation Failed: {}", msg),
            FerriteError::ResourceCreationFailed(msg) => write!(f, "Resource Creation Failed: {}", msg),
            FerriteError::NoMatchingMemoryType { type_bits, required } => write!(
                f,
                "No memory type matches bits {:#x} with properties {:#x}",
                type_bits, required
            ),
            FerriteError::DescriptorPoolExhausted { capacity } => {
                write!(f, "Descriptor pool exhausted ({} sets)", capacity)
            }
            FerriteError::StagingOverflow { requested, capacity } => write!(
                f,
                "Transfer of {} bytes exceeds staging capacity of {} bytes",
                requested, capacity
            ),
            FerriteError::UnknownHandle(handle) => write!(f, "Unknown resource handle {}", handle),
            FerriteError::ResourceInUse(handle) => write!(f, "Resource {} is still referenced by a mesh", handle),
            FerriteError::InvalidImageData(msg) => write!(f, "Invalid Image Data: {}", msg),
            FerriteError::RenderTimeout => write!(f, "Timed out waiting for a frame fence"),
            FerriteError::TransferTimeout => write!(f, "Timed out waiting for the transfer fence"),
            FerriteError::SubmissionFailed(msg) => write!(f, "Submission Failed: {}", msg),
            FerriteError::PresentationFailed(msg) => write!(f, "Presentation Failed: {}", msg),
            FerriteError::RenderLoopFailed(msg) => write!(f, "Render Loop Failed: {}", msg),
            FerriteError::BackendError(msg) => write!(f, "Backend Error: {}", msg),
        }
    }
}

impl std::error::Error for FerriteError {}

pub type FerriteResult<T> = Result<T, FerriteError>;

impl<T> From<PoisonError<T>> for FerriteError {
    fn from(_: PoisonError<T>) -> Self {
        FerriteError::BackendError("A thread panicked while holding an engine lock".to_string())
    }
}
