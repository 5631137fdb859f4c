//! Desktop window platform built on winit's pump-events loop.
//!
//! The frame loop owns the schedule, so instead of handing control to winit
//! the platform pumps pending events once per iteration.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use crate::driver::Platform;
use crate::error::{Result, RuntimeError};
use crate::render::Presenter;
use crate::video::PresentFrame;

const WINDOW_TITLE: &str = "Retros";
const INITIAL_SIZE: LogicalSize<u32> = LogicalSize::new(640, 480);

/// Pumps allowed for the window to appear before giving up.
const STARTUP_PUMPS: usize = 100;

/// Event handler state shared with winit during each pump.
#[derive(Default)]
struct WindowState {
    presenter: Option<Presenter>,
    quit: bool,
    error: Option<RuntimeError>,
}

impl WindowState {
    fn fail(&mut self, message: String) {
        warn!("{message}");
        self.error.get_or_insert(RuntimeError::Platform(message));
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.presenter.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(INITIAL_SIZE);
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => return self.fail(format!("failed to create window: {err}")),
        };
        match block_on(Presenter::new(window)) {
            Ok(presenter) => self.presenter = Some(presenter),
            Err(err) => self.fail(format!("failed to initialize renderer: {err:#}")),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(presenter) = self.presenter.as_mut() else {
            return;
        };
        if window_id != presenter.window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => self.quit = true,
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => self.quit = true,
            WindowEvent::Resized(size) => presenter.resize(size),
            _ => {}
        }
    }
}

/// A single window presenting the video surface.
pub struct WindowPlatform {
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl WindowPlatform {
    /// Opens the window and its GPU presenter.
    pub fn new() -> Result<Self> {
        let event_loop = EventLoop::new()
            .map_err(|err| RuntimeError::Platform(format!("failed to create event loop: {err}")))?;
        let mut platform = Self {
            event_loop,
            state: WindowState::default(),
        };

        for _ in 0..STARTUP_PUMPS {
            platform.pump(Some(Duration::from_millis(10)));
            if platform.state.presenter.is_some() || platform.state.error.is_some() {
                break;
            }
        }
        if let Some(err) = platform.state.error.take() {
            return Err(err);
        }
        if platform.state.presenter.is_none() {
            return Err(RuntimeError::Platform("window never became available".into()));
        }
        info!("window opened");
        Ok(platform)
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            debug!("event loop exited with status {code}");
            self.state.quit = true;
        }
    }
}

impl Platform for WindowPlatform {
    fn poll_quit(&mut self) -> bool {
        self.pump(Some(Duration::ZERO));
        self.state.quit
    }

    fn present(&mut self, frame: Option<PresentFrame<'_>>) -> Result<()> {
        if let Some(err) = self.state.error.take() {
            return Err(err);
        }
        let Some(presenter) = self.state.presenter.as_mut() else {
            return Ok(());
        };

        if let Some(display) = frame.as_ref().and_then(|frame| frame.resize) {
            debug!("resizing window to {}x{}", display.width, display.height);
            let requested = LogicalSize::new(display.width, display.height);
            if let Some(applied) = presenter.window().request_inner_size(requested) {
                presenter.resize(applied);
            }
        }

        match presenter.render(frame) {
            Ok(()) => Ok(()),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = presenter.window().inner_size();
                presenter.resize(size);
                Ok(())
            }
            Err(wgpu::SurfaceError::Timeout) => {
                info!("surface timeout; retrying next frame");
                Ok(())
            }
            Err(err) => Err(RuntimeError::Platform(format!("surface error: {err}"))),
        }
    }

    fn release(&mut self) {
        if self.state.presenter.take().is_some() {
            debug!("window released");
        }
    }
}
