use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{debug, info};

use crate::device::{ColorSpace, Device, Extent2D, Swapchain, TextureFormat};
use crate::queue::QueueAssignment;
use crate::{FerriteError, FerriteResult};

pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Used when the surface reports a single undefined format, meaning "anything goes".
pub const FALLBACK_SURFACE_FORMAT: SurfaceFormat = SurfaceFormat {
    format: TextureFormat::Bgra8Unorm,
    color_space: ColorSpace::SrgbNonlinear,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// Zero means no upper bound.
    pub max_image_count: u32,
    /// `None` when the surface lets the swap chain decide its size.
    pub current_extent: Option<Extent2D>,
    pub min_image_extent: Extent2D,
    pub max_image_extent: Extent2D,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SurfaceFormat {
    pub format: TextureFormat,
    pub color_space: ColorSpace,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceSupport {
    pub capabilities: SurfaceCapabilities,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SharingMode {
    Exclusive,
    /// Graphics and present family, in that order.
    Concurrent([u32; 2]),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ChainConfig {
    pub extent: Extent2D,
    pub image_count: u32,
    pub surface_format: SurfaceFormat,
    pub present_mode: PresentMode,
    pub sharing: SharingMode,
}

pub fn choose_extent(capabilities: &SurfaceCapabilities, requested: Extent2D) -> Extent2D {
    match capabilities.current_extent {
        Some(current) => current,
        None => Extent2D {
            width: requested
                .width
                .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
            height: requested
                .height
                .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
        },
    }
}

pub fn choose_image_count(capabilities: &SurfaceCapabilities) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

pub fn choose_surface_format(formats: &[SurfaceFormat]) -> Option<SurfaceFormat> {
    match formats {
        [] => None,
        [only] if only.format == TextureFormat::Undefined => Some(FALLBACK_SURFACE_FORMAT),
        [first, ..] => Some(*first),
    }
}

pub fn choose_present_mode(modes: &[PresentMode]) -> PresentMode {
    if modes.contains(&PresentMode::Mailbox) {
        PresentMode::Mailbox
    } else {
        PresentMode::Fifo
    }
}

/// Split graphics and present families share swap chain images concurrently, which
/// lets frames present without queue ownership transfers.
pub fn choose_sharing_mode(queues: &QueueAssignment) -> SharingMode {
    if queues.has_split_present() {
        SharingMode::Concurrent([queues.graphics, queues.present])
    } else {
        SharingMode::Exclusive
    }
}

pub fn negotiate_chain(
    support: &SurfaceSupport,
    requested: Extent2D,
    queues: &QueueAssignment,
) -> FerriteResult<ChainConfig> {
    let surface_format = choose_surface_format(&support.formats).ok_or_else(|| {
        FerriteError::SwapchainCreationFailed("Surface reports no supported formats".to_string())
    })?;

    Ok(ChainConfig {
        extent: choose_extent(&support.capabilities, requested),
        image_count: choose_image_count(&support.capabilities),
        surface_format,
        present_mode: choose_present_mode(&support.present_modes),
        sharing: choose_sharing_mode(queues),
    })
}

/// Swap chain plus the depth buffer sized to match it.
///
/// Field order is teardown order: the depth buffer goes first, then the swap chain
/// (which releases its image views before the chain handle).
pub struct PresentationChain<D: Device> {
    depth: D::DepthBuffer,
    swapchain: D::Swapchain,
    config: ChainConfig,
}

impl<D: Device> PresentationChain<D> {
    pub fn new(device: &D, requested: Extent2D) -> FerriteResult<Self> {
        let support = device.surface_support()?;
        let config = negotiate_chain(&support, requested, &device.queues())?;
        if config.extent.is_empty() {
            return Err(FerriteError::SwapchainCreationFailed(
                "Surface has zero area".to_string(),
            ));
        }

        let swapchain = device.create_swapchain(&config, None)?;
        let depth = device.create_depth_buffer(config.extent, DEPTH_FORMAT)?;

        info!(
            "Presentation chain created: {}x{}, {} images, {:?}, {:?}",
            config.extent.width,
            config.extent.height,
            swapchain.image_count(),
            config.surface_format.format,
            config.present_mode
        );

        Ok(Self { depth, swapchain, config })
    }

    /// Replaces the swap chain and depth buffer. Returns `Ok(false)` when the surface
    /// currently has zero area and the rebuild has to wait.
    ///
    /// The device is drained first; the old chain is handed to the backend as a reuse
    /// hint and only released once the new one exists.
    pub fn rebuild(&mut self, device: &D, requested: Extent2D) -> FerriteResult<bool> {
        let support = device.surface_support()?;
        let config = negotiate_chain(&support, requested, &device.queues())?;
        if config.extent.is_empty() {
            debug!("Deferring swap chain rebuild while the surface has zero area");
            return Ok(false);
        }
        if config.surface_format.format != self.config.surface_format.format {
            return Err(FerriteError::SwapchainCreationFailed(format!(
                "Surface format changed from {:?} to {:?}",
                self.config.surface_format.format, config.surface_format.format
            )));
        }

        device.wait_idle()?;

        let swapchain = device.create_swapchain(&config, Some(&self.swapchain))?;
        let depth = device.create_depth_buffer(config.extent, DEPTH_FORMAT)?;

        self.depth = depth;
        drop(std::mem::replace(&mut self.swapchain, swapchain));
        self.config = config;

        info!(
            "Presentation chain rebuilt: {}x{}, {} images",
            config.extent.width,
            config.extent.height,
            self.swapchain.image_count()
        );
        Ok(true)
    }

    pub fn swapchain(&self) -> &D::Swapchain {
        &self.swapchain
    }

    pub fn depth_buffer(&self) -> &D::DepthBuffer {
        &self.depth
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn extent(&self) -> Extent2D {
        self.swapchain.extent()
    }

    pub fn format(&self) -> TextureFormat {
        self.config.surface_format.format
    }

    pub fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }
}

/// Cross-thread rebuild bookkeeping: pending resize requests from the window, the
/// re-entrancy guard, and a counter of completed rebuilds.
#[derive(Debug)]
pub struct ChainSignals {
    resize_pending: AtomicBool,
    requested_extent: AtomicU64,
    rebuilding: AtomicBool,
    rebuilds: AtomicU64,
}

impl ChainSignals {
    pub fn new(extent: Extent2D) -> Self {
        Self {
            resize_pending: AtomicBool::new(false),
            requested_extent: AtomicU64::new(pack_extent(extent)),
            rebuilding: AtomicBool::new(false),
            rebuilds: AtomicU64::new(0),
        }
    }

    pub fn request_resize(&self, extent: Extent2D) {
        self.requested_extent.store(pack_extent(extent), Ordering::Release);
        self.resize_pending.store(true, Ordering::Release);
    }

    pub fn mark_pending(&self) {
        self.resize_pending.store(true, Ordering::Release);
    }

    /// Clears and returns the pending flag.
    pub fn take_pending(&self) -> bool {
        self.resize_pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.resize_pending.load(Ordering::Acquire)
    }

    pub fn requested_extent(&self) -> Extent2D {
        unpack_extent(self.requested_extent.load(Ordering::Acquire))
    }

    /// `None` while another rebuild is in progress.
    pub fn try_begin_rebuild(&self) -> Option<RebuildGuard<'_>> {
        self.rebuilding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RebuildGuard { signals: self })
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Acquire)
    }
}

pub struct RebuildGuard<'a> {
    signals: &'a ChainSignals,
}

impl RebuildGuard<'_> {
    pub fn complete(self) {
        self.signals.rebuilds.fetch_add(1, Ordering::AcqRel);
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.signals.rebuilding.store(false, Ordering::Release);
    }
}

fn pack_extent(extent: Extent2D) -> u64 {
    ((extent.width as u64) << 32) | extent.height as u64
}

fn unpack_extent(packed: u64) -> Extent2D {
    Extent2D::new((packed >> 32) as u32, packed as u32)
}
