//! Seams between the preview engine and the host window system.
//!
//! [`WindowSystem`] covers the foreign windows we monitor; [`SurfaceHost`]
//! covers the thumbnail surfaces we own. The X11 implementation lives in
//! `x11.rs`; tests use an in-memory fake.

use anyhow::Result;
use image::RgbaImage;
use std::time::Duration;
use tiny_skia::Pixmap;

use crate::error::CaptureError;
use crate::types::{Geometry, HostEvent, Point, Size, SurfaceId, WindowId, WindowInfo};

/// Raw pixels read from a window's backing surface.
pub struct Snapshot {
    pub width: i32,
    pub height: i32,
    /// Straight RGBA, `width * height * 4` bytes when the size is positive.
    pub rgba: Vec<u8>,
}

pub trait WindowSystem {
    /// Every top-level client window currently known to the window manager.
    fn list_windows(&self) -> Result<Vec<WindowId>>;

    /// Re-query a window. `None` once the window has vanished.
    fn window_info(&self, id: WindowId) -> Option<WindowInfo>;

    fn is_minimized(&self, id: WindowId) -> Option<bool>;

    fn active_window(&self) -> Option<WindowId>;

    /// The window's own icon, if it publishes one.
    fn window_icon(&self, id: WindowId) -> Option<RgbaImage>;

    /// Application class used for themed icon lookup.
    fn window_class(&self, id: WindowId) -> Option<String>;

    fn minimize(&self, id: WindowId) -> Result<()>;

    fn unminimize(&self, id: WindowId, time: u32) -> Result<()>;

    fn activate(&self, id: WindowId, time: u32) -> Result<()>;

    fn primary_monitor(&self) -> Geometry;

    /// Prepare `id` for repeated capture.
    fn bind_capture(&self, id: WindowId) -> Result<()>;

    fn release_capture(&self, id: WindowId);

    /// Read the current pixels of a bound window at native resolution.
    fn capture(&self, id: WindowId) -> Result<Snapshot, CaptureError>;
}

#[derive(Clone, Debug)]
pub struct SurfaceOptions {
    pub title: String,
    pub position: Point,
    pub size: Size,
    pub opacity: f64,
    pub keep_above: bool,
}

pub trait SurfaceHost {
    fn create_surface(&self, options: &SurfaceOptions) -> Result<SurfaceId>;

    fn destroy_surface(&self, surface: SurfaceId);

    fn present(&self, surface: SurfaceId, frame: &Pixmap) -> Result<()>;

    fn move_surface(&self, surface: SurfaceId, position: Point) -> Result<()>;

    fn resize_surface(&self, surface: SurfaceId, size: Size) -> Result<()>;

    fn surface_position(&self, surface: SurfaceId) -> Option<Point>;

    fn set_opacity(&self, surface: SurfaceId, opacity: f64) -> Result<()>;

    fn set_visible(&self, surface: SurfaceId, visible: bool) -> Result<()>;

    fn set_keep_above(&self, surface: SurfaceId, keep_above: bool) -> Result<()>;

    /// Hand the surface to the window manager's interactive move, as if the
    /// pointer had been pressed at `origin` at `time`.
    fn begin_move_drag(&self, surface: SurfaceId, button: u8, origin: Point, time: u32)
    -> Result<()>;
}

/// Source of host events for the control loop.
pub trait EventSource {
    /// Return pending events, blocking for at most `timeout` when none are
    /// queued.
    fn wait_events(&mut self, timeout: Duration) -> Result<Vec<HostEvent>>;
}

pub trait Host: WindowSystem + SurfaceHost {}

impl<T: WindowSystem + SurfaceHost> Host for T {}
