// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! winit window driven by an externally pumped event loop.

pub use winit;

use anyhow::{bail, Context, Result};
use flint_render::{RenderSize, WindowSystem};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use std::time::Duration;
use tracing::{debug, info};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

// How long `open` blocks per pump while waiting for the window to appear.
const OPEN_PUMP_TIMEOUT: Duration = Duration::from_millis(16);

struct WindowState {
    attrs: WindowAttributes,
    window: Option<Window>,
    size: RenderSize,
    close_requested: bool,
    // The event loop itself has exited; nothing more will be delivered.
    exited: bool,
    create_error: Option<OsError>,
}

impl WindowState {
    fn new(attrs: WindowAttributes) -> Self {
        Self {
            attrs,
            window: None,
            size: RenderSize::default(),
            close_requested: false,
            exited: false,
            create_error: None,
        }
    }

    fn handle(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                self.size = RenderSize::new(size.width, size.height);
                debug!("resized to {}x{}", size.width, size.height);
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attrs.clone()) {
            Ok(window) => {
                let size = window.inner_size();
                self.size = RenderSize::new(size.width, size.height);
                info!("window created ({}x{})", size.width, size.height);
                self.window = Some(window);
            }
            Err(err) => self.create_error = Some(err),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|w| w.id() == id) {
            self.handle(&event);
        }
    }
}

/// One resizable window plus the event loop that feeds it.
///
/// Events are only processed inside [`WindowSystem::poll_events`] and
/// [`WindowSystem::wait_events`].
pub struct PlatformWindow {
    // Field order is drop order: the window goes before its event loop.
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl PlatformWindow {
    /// Creates the window and pumps the loop until it exists.
    pub fn open(title: &str, width: u32, height: u32) -> Result<Self> {
        let event_loop = EventLoop::new().context("create event loop")?;
        let attrs = Window::default_attributes()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let mut this = Self {
            state: WindowState::new(attrs),
            event_loop,
        };
        while this.state.window.is_none() {
            if let Some(err) = this.state.create_error.take() {
                return Err(err).context("create window");
            }
            if this.state.exited {
                bail!("event loop exited before the window was created");
            }
            this.pump(Some(OPEN_PUMP_TIMEOUT));
        }
        Ok(this)
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if self.state.exited {
            return;
        }
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            debug!("event loop exited ({code})");
            self.state.exited = true;
        }
    }
}

impl WindowSystem for PlatformWindow {
    fn framebuffer_size(&self) -> RenderSize {
        self.state.size
    }

    fn should_close(&self) -> bool {
        self.state.close_requested || self.state.exited
    }

    fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }
}

impl HasWindowHandle for PlatformWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.state
            .window
            .as_ref()
            .ok_or(HandleError::Unavailable)?
            .window_handle()
    }
}

impl HasDisplayHandle for PlatformWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.event_loop.display_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> WindowState {
        WindowState::new(Window::default_attributes())
    }

    #[test]
    fn resize_events_update_the_framebuffer_size() {
        let mut s = state();
        s.handle(&WindowEvent::Resized(PhysicalSize::new(800, 450)));
        assert_eq!(s.size, RenderSize::new(800, 450));

        s.handle(&WindowEvent::Resized(PhysicalSize::new(0, 0)));
        assert!(s.size.is_zero_area());
        assert!(!s.close_requested);
    }

    #[test]
    fn close_request_is_latched() {
        let mut s = state();
        s.handle(&WindowEvent::CloseRequested);
        s.handle(&WindowEvent::Focused(true));
        assert!(s.close_requested);
    }
}
