//! Application runner and event loop.

use std::path::PathBuf;

use ember_gpu::GpuContextBuilder;
use ember_platform::{WindowConfig, WindowSurface};
use ember_render::{FrameStatus, RenderOptions, Renderer, SceneAssets, SceneData};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title, also used as the Vulkan application name.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Prefer FIFO even when mailbox is available.
    pub vsync: bool,
    /// Frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Directory the scene asset paths are relative to.
    pub assets_root: PathBuf,
    pub scene: SceneAssets,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Ember Viewer".to_string(),
            width: 800,
            height: 600,
            validation: cfg!(debug_assertions),
            vsync: false,
            frames_in_flight: RenderOptions::default().frames_in_flight,
            assets_root: PathBuf::from("assets"),
            scene: SceneAssets::default(),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    pub fn with_assets_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.assets_root = root.into();
        self
    }

    pub fn with_scene(mut self, scene: SceneAssets) -> Self {
        self.scene = scene;
        self
    }

    fn window_config(&self) -> WindowConfig {
        WindowConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            resizable: true,
        }
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            vsync: self.vsync,
            frames_in_flight: self.frames_in_flight,
        }
    }
}

/// Load the scene, open a window and draw until it is closed.
///
/// Returns the first fatal error after the event loop has stopped.
pub fn run_app(config: AppConfig) -> anyhow::Result<()> {
    // A subscriber installed by the caller takes precedence.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    info!("{} starting...", config.title);

    let scene = config.scene.load(&config.assets_root)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        config,
        scene: Some(scene),
        state: None,
        error: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner {
    config: AppConfig,
    /// Taken when the renderer is created.
    scene: Option<SceneData>,
    state: Option<AppState>,
    error: Option<anyhow::Error>,
}

struct AppState {
    renderer: Renderer<WindowSurface>,
    parked: bool,
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating renderer...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    tracing::debug!("Resized to {}x{}", size.width, size.height);
                    state.renderer.notify_resized();
                    state.renderer.provider().request_redraw();
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                match state.renderer.draw_frame() {
                    Ok(FrameStatus::Parked) => {
                        if !state.parked {
                            tracing::debug!("Framebuffer has no area; waiting for a resize");
                        }
                        state.parked = true;
                        event_loop.set_control_flow(ControlFlow::Wait);
                    }
                    Ok(FrameStatus::Presented | FrameStatus::Rebuilt) => {
                        state.parked = false;
                        event_loop.set_control_flow(ControlFlow::Poll);
                    }
                    Err(e) => self.fail(event_loop, e.into()),
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            if !state.parked {
                state.renderer.provider().request_redraw();
            }
        }
    }
}

impl AppRunner {
    fn create_state(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        let scene = self
            .scene
            .take()
            .ok_or_else(|| anyhow::anyhow!("scene already consumed"))?;

        let surface = WindowSurface::create(event_loop, &self.config.window_config())?;

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation);

        let renderer = Renderer::new(surface, gpu, scene, self.config.render_options())?;

        Ok(AppState {
            renderer,
            parked: false,
        })
    }

    /// Keep the first fatal error, release the GPU and stop the loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("Fatal error: {e:#}");
        self.error.get_or_insert(e);
        self.shutdown();
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        let stats = state.renderer.stats();
        if stats.frames > 0 {
            info!("FPS Statistics:");
            info!("  Min: {:.1}", stats.min_fps);
            info!("  Max: {:.1}", stats.max_fps);
            info!("  Avg: {:.1}", stats.avg_fps);
            info!("  Total frames: {}", stats.frames);
            info!("  Swapchain rebuilds: {}", stats.rebuilds);
        }

        info!("Starting cleanup...");
        drop(state);
        info!("Cleanup complete");
    }
}
