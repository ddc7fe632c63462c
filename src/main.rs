// =============================================================================
// HELLO TRIANGLE - one Vulkan frame, then wait for the window to close
// =============================================================================
//
// FLOW:
// 1. Load config.toml, start logging
// 2. Window is created when the event loop resumes
// 3. Vulkan bring-up (see renderer.rs) and a single presented frame
// 4. Block on window events until a termination event arrives
// 5. Teardown: device-idle wait, then everything in reverse creation order
//
// Any bring-up failure ends the event loop and is returned from main, so the
// process exits with a nonzero status and the error chain on stderr.
// =============================================================================

mod backend;
mod config;
mod renderer;

use anyhow::{Context, Result};
use ash::vk;
use backend::context::APP_NAME;
use backend::{BringupError, ShaderBinaries};
use config::Config;
use renderer::TriangleRenderer;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml; problems are reported once logging is up
    let (config, config_error) = Config::load();

    init_logging(&config);
    log::info!("Starting {}", APP_NAME.to_string_lossy());
    if let Some(e) = config_error {
        log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
    }
    log::debug!("Config: {:?}", config);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    // Nothing animates: sleep until the OS has something for us
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Configured level first, RUST_LOG on top of it
fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_filter());
    builder.parse_default_env();
    builder.init();
}

/// Events that end the wait after the frame has been presented.
fn is_termination(event: &WindowEvent) -> bool {
    match event {
        WindowEvent::CloseRequested => true,
        WindowEvent::KeyboardInput {
            event:
                KeyEvent {
                    physical_key: PhysicalKey::Code(KeyCode::Escape),
                    state: ElementState::Pressed,
                    ..
                },
            ..
        } => true,
        _ => false,
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: Field order matters for Drop! The renderer must go before the
/// window its surface was created from.
struct App {
    config: Config,
    renderer: Option<TriangleRenderer>,
    window: Option<Window>,
    /// First fatal error, handed back to main after the loop ends
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            failure: None,
        }
    }

    /// Create the window, bring Vulkan up and present the one frame.
    fn bring_up(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attributes = Window::default_attributes()
            .with_title(APP_NAME.to_string_lossy())
            .with_inner_size(winit::dpi::PhysicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT))
            // The swapchain is never recreated
            .with_resizable(false);

        let window = event_loop
            .create_window(window_attributes)
            .context("Failed to create window")?;

        let (vertex, fragment) = self.config.shader_paths();
        let shaders = ShaderBinaries::load(&vertex, &fragment)?;

        let requested = vk::Extent2D {
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
        };
        let mut renderer = TriangleRenderer::new(
            &window,
            requested,
            &shaders,
            self.config.enable_validation(),
        )
        .context("Vulkan bring-up failed")?;

        renderer.draw_frame().context("Failed to draw frame")?;
        log::debug!("Frame state: {:?}", renderer.frame_state());

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        match error.downcast_ref::<BringupError>() {
            Some(cause) => log::error!("{:?} failure: {:#}", cause.kind(), error),
            None => log::error!("{:#}", error),
        }
        if self.failure.is_none() {
            self.failure = Some(error);
        }
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.failure.is_some() {
            return;
        }

        if let Err(e) = self.bring_up(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if is_termination(&event) {
            log::info!("Termination requested, shutting down...");
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Tear Vulkan down while the window still exists
        self.renderer = None;
        self.window = None;
    }
}
