use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::device::Extent2D;

pub struct InstanceDescriptor<'a> {
    pub app_name: &'a str,
    pub app_version: u32,
    pub validation: bool,
}

/// The window collaborator: raw handles for surface creation plus the current
/// drawable size in physical pixels.
pub trait WindowSurface: HasDisplayHandle + HasWindowHandle {
    fn inner_extent(&self) -> Extent2D;
}

pub trait Instance: Sized + 'static {
    type Device: crate::Device;
    type Surface: Surface;

    /// Load the backend library and create the API instance. The window is consulted
    /// for the platform surface extensions only.
    fn new(descriptor: &InstanceDescriptor, window: &impl WindowSurface) -> crate::FerriteResult<Self>;

    fn create_surface(&self, window: &impl WindowSurface) -> crate::FerriteResult<Self::Surface>;

    /// Select a physical device able to render to `surface`, assign queue families and
    /// create the logical device. The device takes ownership of the surface so it is
    /// released after the device itself.
    fn request_device(
        &self,
        surface: Self::Surface,
        preferred_device: Option<usize>,
    ) -> crate::FerriteResult<Self::Device>;
}

pub trait Surface: Send + Sync + 'static {}
