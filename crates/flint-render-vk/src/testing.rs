// SPDX-License-Identifier: CEPL-1.0
//! In-memory stand-ins shared by the unit tests.

use flint_render::{RenderSize, WindowSystem};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use std::collections::VecDeque;

/// A window whose size changes only when events are waited for.
#[derive(Debug, Default)]
pub(crate) struct FakeWindow {
    pub size: RenderSize,
    /// Size to switch to on each successive `wait_events`.
    pub resizes: VecDeque<RenderSize>,
    /// Close is requested once this many waits have happened.
    pub close_after_waits: Option<usize>,
    pub waits: usize,
    pub closed: bool,
}

impl FakeWindow {
    pub(crate) fn sized(width: u32, height: u32) -> Self {
        Self {
            size: RenderSize::new(width, height),
            ..Default::default()
        }
    }
}

impl HasWindowHandle for FakeWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl HasDisplayHandle for FakeWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl WindowSystem for FakeWindow {
    fn framebuffer_size(&self) -> RenderSize {
        self.size
    }

    fn should_close(&self) -> bool {
        self.closed
    }

    fn poll_events(&mut self) {}

    fn wait_events(&mut self) {
        self.waits += 1;
        if let Some(size) = self.resizes.pop_front() {
            self.size = size;
        }
        if self.close_after_waits == Some(self.waits) {
            self.closed = true;
        }
    }
}
