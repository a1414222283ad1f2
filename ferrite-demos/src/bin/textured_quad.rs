//! Spinning textured quad on the Vulkan backend.
//!
//! Usage: `textured_quad [image]`. Without an image a checkerboard is generated.
//! Run from the workspace root so the default shader paths resolve, or point
//! `FERRITE_SHADER_DIR` at the directory holding `mesh.vert` and `mesh.frag`.

use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use ferrite_core::{Engine, EngineConfig, Extent2D, FerriteResult, Handle, ImageData, Vertex, WindowSurface};
use ferrite_vulkan::VulkanInstance;
use glam::{Mat4, Vec3};
use raw_window_handle::{DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

const QUAD: [Vertex; 6] = [
    Vertex::new([-0.5, -0.5, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, -0.5, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.0], [1.0, 1.0]),
    Vertex::new([-0.5, -0.5, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.0], [1.0, 1.0]),
    Vertex::new([-0.5, 0.5, 0.0], [0.0, 1.0]),
];

static LOGGING: Once = Once::new();

/// Installs the global logger once; later calls are no-ops. Honors `RUST_LOG` and
/// defaults to `info`.
fn init_logging() {
    LOGGING.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    });
}

/// The winit window as the engine sees it.
struct AppWindow(Arc<Window>);

impl HasWindowHandle for AppWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.0.window_handle()
    }
}

impl HasDisplayHandle for AppWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.0.display_handle()
    }
}

impl WindowSurface for AppWindow {
    fn inner_extent(&self) -> Extent2D {
        let size = self.0.inner_size();
        Extent2D::new(size.width, size.height)
    }
}

fn load_image(path: Option<&str>) -> FerriteResult<ImageData> {
    let rgba = match path.map(image::open) {
        Some(Ok(img)) => img.to_rgba8(),
        Some(Err(e)) => {
            log::warn!("Failed to load {:?} ({}), using a checkerboard", path, e);
            checkerboard()
        }
        None => checkerboard(),
    };
    let (width, height) = rgba.dimensions();
    ImageData::rgba8(width, height, rgba.into_raw())
}

fn checkerboard() -> image::RgbaImage {
    image::RgbaImage::from_fn(256, 256, |x, y| {
        if (x / 32 + y / 32) % 2 == 0 {
            image::Rgba([230, 120, 40, 255])
        } else {
            image::Rgba([30, 30, 40, 255])
        }
    })
}

struct Scene {
    engine: Engine<VulkanInstance>,
    quad: Handle,
}

struct App {
    window: Option<AppWindow>,
    scene: Option<Scene>,
    image_path: Option<String>,
    start_time: Instant,
}

impl App {
    fn build_scene(&self, window: &AppWindow) -> FerriteResult<Scene> {
        let config = EngineConfig {
            app_name: "Ferrite Textured Quad".to_string(),
            clear_color: [0.1, 0.2, 0.3, 1.0],
            ..EngineConfig::from_env()
        };

        let mut engine = Engine::<VulkanInstance>::initialize(config, window)?;
        let vertex_buffer = engine.create_vertex_buffer(&QUAD)?;
        let texture = engine.create_texture(&load_image(self.image_path.as_deref())?)?;
        let quad = engine.create_mesh(vertex_buffer, texture)?;
        engine.start()?;

        Ok(Scene { engine, quad })
    }

    fn update(&self) -> FerriteResult<()> {
        let (Some(scene), Some(window)) = (&self.scene, &self.window) else {
            return Ok(());
        };

        let extent = window.inner_extent();
        if extent.is_empty() {
            return Ok(());
        }
        let aspect = extent.width as f32 / extent.height as f32;
        let time = self.start_time.elapsed().as_secs_f32();

        let mut proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, aspect, 0.1, 100.0);
        proj.col_mut(1).y *= -1.0;
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y);
        let model = Mat4::from_rotation_y(time) * Mat4::from_rotation_z(time * 0.5);

        scene.engine.update_transform(scene.quad, &(proj * view * model).to_cols_array())
    }

    fn shutdown(&mut self) {
        if let Some(scene) = self.scene.take() {
            log::info!("Shutting down renderer");
            if let Err(e) = scene.engine.destroy() {
                log::error!("Renderer shut down with an error: {}", e);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = Window::default_attributes()
            .with_title("Ferrite - Textured Quad")
            .with_inner_size(winit::dpi::LogicalSize::new(800.0, 600.0));
        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => AppWindow(Arc::new(window)),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match self.build_scene(&window) {
            Ok(scene) => {
                log::info!("Textured quad initialized");
                self.scene = Some(scene);
            }
            Err(e) => {
                log::error!("Failed to initialize renderer: {}", e);
                event_loop.exit();
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(scene) = &self.scene {
                    scene.engine.notify_resized(Extent2D::new(size.width, size.height));
                }
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.update() {
            log::error!("Frame update failed: {}", e);
            self.shutdown();
            event_loop.exit();
            return;
        }
        if let Some(scene) = &self.scene {
            if !scene.engine.is_running() {
                log::error!("Render loop stopped unexpectedly");
                self.shutdown();
                event_loop.exit();
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + FRAME_INTERVAL));
    }
}

fn main() {
    init_logging();
    log::info!("Starting textured quad demo");

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };

    let mut app = App {
        window: None,
        scene: None,
        image_path: std::env::args().nth(1),
        start_time: Instant::now(),
    };

    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {}", e);
    }
    app.shutdown();
}
