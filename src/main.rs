// =============================================================================
// VULKANIZE - Vulkan bring-up behind a window
// =============================================================================
//
// INIT FLOW:
// 1. Load config.toml, start logging
// 2. Create the event loop (needed to know the display server)
// 3. Create instance (+ validation layers and debug messenger in debug builds)
// 4. Pick a physical device with a suitable queue family
// 5. Create the logical device and fetch its queue
// 6. Open the window and pump events until it is closed
//
// Everything Vulkan lives in locals of `run`, declared parent first. They
// are dropped in reverse order, and the borrows between them stop that
// order from being changed by accident.
//
// =============================================================================

use anyhow::{Context, Result};
use raw_window_handle::HasDisplayHandle;
use std::fs::OpenOptions;
use std::io::Write;
use vulkanize::backend::{
    DebugMessenger, DeviceRequirements, DeviceSelector, Instance, LogicalDevice,
};
use vulkanize::config::{Config, WindowConfig};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, load_warning) = Config::load();

    init_logging(&config, load_warning);
    log::info!("Starting vulkanize");
    log::info!(
        "Window: {}x{} \"{}\"",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    run(&config, event_loop)?;

    log::info!("Cleanup complete");
    Ok(())
}

/// Initialize logging with optional file output. Anything that went wrong
/// before the logger existed is reported once it is installed.
fn init_logging(config: &Config, load_warning: Option<String>) {
    use env_logger::{Builder, Target};

    let mut builder = Builder::from_default_env();

    let (level, level_error) = match config.log_level() {
        Ok(level) => (level, None),
        Err(e) => (log::LevelFilter::Info, Some(e)),
    };
    builder.filter_level(level);

    let mut file_error = None;
    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== vulkanize log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => file_error = Some(e),
        }
    }

    builder.init();

    if let Some(warning) = load_warning {
        log::warn!("{}", warning);
    }

    if let Some(e) = level_error {
        log::warn!("{:#}, defaulting to info", e);
    }

    if let Some(e) = file_error {
        log::warn!(
            "Could not open log file {}: {}. Logging to stderr.",
            config.debug.log_file,
            e
        );
    }
}

// =============================================================================
// VULKAN SETUP
// =============================================================================

fn run(config: &Config, event_loop: EventLoop<()>) -> Result<()> {
    let display = event_loop
        .display_handle()
        .context("Failed to get display handle")?
        .as_raw();

    let enable_validation = config.validation_enabled();

    let entry = unsafe { ash::Entry::load() }
        .context("Failed to load Vulkan library. Is Vulkan installed?")?;

    let instance = Instance::new(&entry, config, display, enable_validation)?;

    let messenger = if enable_validation {
        Some(DebugMessenger::new(&entry, &instance)?)
    } else {
        None
    };
    if let Some(messenger) = &messenger {
        log::debug!("Debug messenger: {:?}", messenger.handle());
    }

    let selector = DeviceSelector::new(DeviceRequirements::from_config(config));
    log::debug!("Device requirements: {:?}", selector.requirements());
    let selected = selector.pick_physical_device(&instance.loader)?;

    let device = LogicalDevice::new(&instance, &selected, config, enable_validation)?;
    log::debug!(
        "Device {:?}: queue {:?} from family {}",
        device.handle().get(),
        device.queue(),
        device.queue_family()
    );

    let mut app = App::new(&config.window, &device);
    event_loop.run_app(&mut app)?;

    log::info!("Cleaning up Vulkan resources...");
    app.finish()
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App<'a> {
    window_config: &'a WindowConfig,
    device: &'a LogicalDevice<'a>,
    window: Option<Window>,
    /// Set when the window could not be created; reported once the loop ends
    error: Option<anyhow::Error>,
}

impl<'a> App<'a> {
    fn new(window_config: &'a WindowConfig, device: &'a LogicalDevice<'a>) -> Self {
        Self {
            window_config,
            device,
            window: None,
            error: None,
        }
    }

    fn finish(self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn shutdown(&self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle: {:?}", e);
        }
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App<'_> {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.window_config.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.window_config.width,
                self.window_config.height,
            ))
            .with_resizable(self.window_config.resizable);

        match event_loop.create_window(window_attributes) {
            Ok(window) => {
                log::info!("Window opened");
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.error = Some(anyhow::anyhow!("Failed to create window: {}", e));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                let escape = event.physical_key == PhysicalKey::Code(KeyCode::Escape);
                if event.state.is_pressed() && escape {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }
}
