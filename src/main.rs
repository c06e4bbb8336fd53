// =============================================================================
// GPU BOOTSTRAP - window + one-time Vulkan setup
// =============================================================================
//
// Opens a window, runs the renderer's setup chain against it and then idles
// until the window is closed. Drawing is not part of this program; a
// successful run means the device, swapchain, render pass and pipeline are
// all ready.
//
// SETUP FLOW:
// 1. Instance (+ debug messenger when validation is on)
// 2. Surface for the window
// 3. Physical device selection, logical device + queues
// 4. Swapchain + image views
// 5. Render pass, pipeline layout, graphics pipeline
//
// =============================================================================

use anyhow::{Context, Result};
use gpu_bootstrap::config::Config;
use gpu_bootstrap::Renderer;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use parking_lot::Mutex;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Logger first so config loading is reported
    let log_sink = init_logging();

    // Load configuration from config.toml
    let config = Config::load();
    if config.debug.log_to_file {
        if let Err(e) = log_sink.attach(&config.debug.log_file) {
            log::warn!("Failed to open log file {}: {}", config.debug.log_file, e);
        }
    }

    log::info!("Starting GPU bootstrap");
    log::info!("Window: {}x{}", config.window.width, config.window.height);
    log::info!("Preferred present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated with an error")?;

    if app.failed {
        anyhow::bail!("GPU context unusable, see log for the failing step");
    }
    Ok(())
}

/// Initialize logging to stderr; a log file can be attached later
fn init_logging() -> LogSink {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let sink = LogSink::default();

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();
    builder.target(Target::Pipe(Box::new(sink.clone())));
    builder.init();

    sink
}

/// Log output: always stderr, plus a copy in the log file once attached
#[derive(Clone, Default)]
struct LogSink {
    file: Arc<Mutex<Option<File>>>,
}

impl LogSink {
    /// Create/clear the log file and mirror everything written from now on
    fn attach<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        writeln!(file, "=== GPU Bootstrap Log ===")?;
        writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
        writeln!(file)?;

        *self.file.lock() = Some(file);
        Ok(())
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = self.file.lock().as_mut() {
            // File errors are dropped, stderr still gets the line
            let _ = file.write_all(buf);
        }
        io::stderr().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.lock().as_mut() {
            let _ = file.flush();
        }
        io::stderr().flush()
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// The renderer is declared before the window so it is dropped first: the
/// surface must go before the native window it was created for.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Window>,
    failed: bool,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            failed: false,
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.quit();
        }
        event_loop.exit();
    }
}

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
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => w,
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.failed = true;
                event_loop.exit();
                return;
            }
        };

        let mut renderer = Renderer::new(self.config.renderer_settings());
        let result = renderer.setup(&window);

        self.renderer = Some(renderer);
        self.window = Some(window);

        if result.is_err() {
            // Already logged by the renderer
            self.failed = true;
            self.shutdown(event_loop);
        }
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_reaches_the_file_before_attach() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vulkan_debug.log");
        let mut sink = LogSink::default();

        sink.write_all(b"early line\n").unwrap();
        sink.attach(&path).unwrap();
        sink.write_all(b"[INFO] Created render pass\n").unwrap();
        sink.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("=== GPU Bootstrap Log ==="));
        assert!(contents.contains("[INFO] Created render pass"));
        assert!(!contents.contains("early line"));
    }

    #[test]
    fn clones_share_the_attached_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.log");
        let sink = LogSink::default();
        let mut logger_side = sink.clone();

        sink.attach(&path).unwrap();
        logger_side.write_all(b"validation message\n").unwrap();
        logger_side.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("validation message"));
    }

    #[test]
    fn attach_truncates_previous_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        std::fs::write(&path, "stale output from last run\n").unwrap();

        LogSink::default().attach(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("stale output"));
    }

    #[test]
    fn unwritable_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("x.log");

        assert!(LogSink::default().attach(&path).is_err());
    }
}
