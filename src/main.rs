// =============================================================================
// VULKAN TRIANGLE - GPU bootstrap for a single window
// =============================================================================
//
// The window and event loop live here; everything Vulkan lives in `backend`.
//
// BOOTSTRAP CHAIN:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Instance (+ validation messenger)                              │
// │    └── Surface (bound to the winit window)                      │
// │          └── Physical device + queue families                   │
// │                └── Logical device + queues                      │
// │                      └── Swapchain + image views                │
// │                            └── Render pass → Pipeline           │
// │                                  └── Framebuffers, commands,    │
// │                                      frame sync                 │
// └─────────────────────────────────────────────────────────────────┘
//
// Teardown walks the same tree bottom-up.
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use backend::Renderer;
use config::Config;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting Vulkan triangle");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.resizable { "resizable" } else { "fixed size" }
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging. `RUST_LOG` overrides the configured level.
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::new();
    builder.filter_level(config.debug.level_filter());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Owns the window and the renderer bound to it.
///
/// IMPORTANT: the renderer holds a surface created from the window, so it
/// is declared (and therefore dropped) first.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,

    /// Set when the window is resized - triggers swapchain recreation
    needs_resize: bool,
    /// Set when the window is minimized (size = 0)
    is_minimized: bool,

    /// First unrecoverable error; returned from `main` after the loop exits
    fatal_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            needs_resize: false,
            is_minimized: false,
            fatal_error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.fatal_error.is_none() {
            self.fatal_error = Some(error);
        }
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) else {
            return Ok(());
        };

        if self.needs_resize && !self.is_minimized {
            let recreated = renderer
                .recreate_chain(&**window)
                .context("Failed to recreate swapchain")?;
            if recreated {
                self.needs_resize = false;
            }
        }

        if renderer.state().is_ready() {
            renderer.draw().context("Draw failed")?;
        }
        Ok(())
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(self.config.window.resizable);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match Renderer::init(&*window, self.config.renderer_settings()) {
            Ok(renderer) => {
                if let (Some(gpu), Some(extent)) =
                    (renderer.physical_device(), renderer.swapchain_extent())
                {
                    log::info!("Rendering on {} at {}x{}", gpu.name, extent.width, extent.height);
                }
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to initialize Vulkan"));
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref renderer) = self.renderer {
                    if let Err(e) = renderer.wait_idle() {
                        log::warn!("{}", e);
                    }
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    self.needs_resize = true;
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Nothing animates yet, so only redraw when the chain needs rebuilding.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            if self.needs_resize && !self.is_minimized {
                window.request_redraw();
            }
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        // Surface must go before the window it was created from
        if let Some(mut renderer) = self.renderer.take() {
            renderer.teardown();
        }
        self.window = None;
        log::info!("Cleanup complete");
    }
}
