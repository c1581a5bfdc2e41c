// =============================================================================
// VULKAN FRAME LOOP - host application
// =============================================================================
//
// Owns the window and drives the renderer from winit's event loop.
//
// FRAME FLOW:
// 1. Resize / scale change -> renderer.resize() marks the swapchain stale
// 2. RedrawRequested -> renderer.render() (recreates first if stale)
// 3. about_to_wait -> request the next redraw
//
// DEVICE LOSS:
// The whole renderer (instance, device, surface, swapchain) is dropped and
// rebuilt against the same window, up to `graphics.device_lost_retries`
// times. After that the application exits with an error.
//
// =============================================================================

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use vk_frameloop::{Config, FrameStatus, Renderer, ShaderBundle, WindowMetrics};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting Vulkan frame loop");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let shaders = config.shaders.load_bundle()?;

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, shaders);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// `RUST_LOG` refines the level from config.toml.
fn init_logging(config: &Config) {
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();
}

/// Logical size and scale factor as the renderer expects them.
fn window_metrics(window: &Window) -> WindowMetrics {
    let scale_factor = window.scale_factor();
    let logical = window.inner_size().to_logical::<f64>(scale_factor);
    WindowMetrics::new(logical.width, logical.height, scale_factor)
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the renderer's surface must be destroyed
/// before the window it was created from.
struct App {
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    config: Config,
    shaders: ShaderBundle,
    is_fullscreen: bool,
    device_losses: u32,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config, shaders: ShaderBundle) -> Self {
        let is_fullscreen = config.window.fullscreen;
        Self {
            renderer: None,
            window: None,
            config,
            shaders,
            is_fullscreen,
            device_losses: 0,
            fatal: None,
        }
    }

    fn create_renderer(&self, window: &Window) -> Result<Renderer> {
        let mut renderer = Renderer::new(
            window,
            window_metrics(window),
            &self.shaders,
            self.config.renderer_options(),
        )
        .context("Failed to initialize Vulkan")?;

        renderer
            .setup_swapchain()
            .context("Failed to build swapchain")?;

        Ok(renderer)
    }

    fn render_frame(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match renderer.render() {
            Ok(FrameStatus::Presented { .. }) | Ok(FrameStatus::Skipped) => {}
            Err(e) if e.is_device_lost() => self.recover_from_device_loss(event_loop),
            Err(e) => self.fail(event_loop, anyhow::Error::new(e).context("Render error")),
        }
    }

    fn recover_from_device_loss(&mut self, event_loop: &ActiveEventLoop) {
        self.device_losses += 1;

        // Everything created from the lost device goes first.
        self.renderer = None;

        let retries = self.config.graphics.device_lost_retries;
        if self.device_losses > retries {
            self.fail(
                event_loop,
                anyhow!("GPU device lost {} time(s), giving up", self.device_losses),
            );
            return;
        }

        log::warn!(
            "GPU device lost, rebuilding renderer (attempt {}/{})",
            self.device_losses,
            retries
        );

        let Some(window) = self.window.clone() else {
            return;
        };
        match self.create_renderer(&window) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.renderer = None;
        self.fatal = Some(error);
        event_loop.exit();
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
            // The resulting Resized event triggers recreation.
        }
    }

    fn window_changed(&mut self) {
        if let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) {
            renderer.resize(window_metrics(window));
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match self.create_renderer(&window) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                self.fail(event_loop, e);
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.renderer = None;
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.window_changed();
            }

            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                log::debug!("Scale factor changed to {}", scale_factor);
                self.window_changed();
            }

            WindowEvent::RedrawRequested => self.render_frame(event_loop),

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                self.renderer = None;
                                event_loop.exit();
                            }
                            KeyCode::F11 => self.toggle_fullscreen(),
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Continuous redraw.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
