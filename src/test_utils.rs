//! In-memory host for unit tests. Only compiled in test builds.

use anyhow::{Result, bail};
use image::RgbaImage;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use tiny_skia::Pixmap;

use crate::backend::{Snapshot, SurfaceHost, SurfaceOptions, WindowSystem};
use crate::error::CaptureError;
use crate::types::{Geometry, Point, Size, SurfaceId, WindowId, WindowInfo};

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Create(SurfaceId),
    Destroy(SurfaceId),
    Move(SurfaceId, Point),
    Resize(SurfaceId, Size),
    Opacity(SurfaceId, f64),
    Visible(SurfaceId, bool),
    KeepAbove(SurfaceId, bool),
    Minimize(WindowId),
    Unminimize(WindowId, u32),
    Activate(WindowId, u32),
    MoveDrag(SurfaceId, u8, Point, u32),
}

struct FakeWindow {
    info: WindowInfo,
    pixels: Option<(i32, i32, [u8; 4])>,
    icon: Option<[u8; 4]>,
    class: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FakeSurface {
    pub title: String,
    pub position: Point,
    pub size: Size,
    pub opacity: f64,
    pub visible: bool,
    pub keep_above: bool,
    pub presented: usize,
    pub last_frame: Option<Pixmap>,
}

pub struct FakeHost {
    windows: RefCell<BTreeMap<WindowId, FakeWindow>>,
    surfaces: RefCell<BTreeMap<SurfaceId, FakeSurface>>,
    next_surface: Cell<SurfaceId>,
    active: Cell<Option<WindowId>>,
    bound: RefCell<BTreeSet<WindowId>>,
    actions: RefCell<Vec<Action>>,
    captures: Cell<usize>,
    monitor: Cell<Geometry>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            windows: RefCell::default(),
            surfaces: RefCell::default(),
            next_surface: Cell::new(1000),
            active: Cell::new(None),
            bound: RefCell::default(),
            actions: RefCell::default(),
            captures: Cell::new(0),
            monitor: Cell::new(Geometry {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            }),
        }
    }
}

impl FakeHost {
    pub fn add_window(&self, id: WindowId, title: &str, pid: u32) {
        self.windows.borrow_mut().insert(
            id,
            FakeWindow {
                info: WindowInfo {
                    id,
                    title: title.to_string(),
                    pid: Some(pid),
                    minimized: false,
                    geometry: Geometry {
                        x: 0,
                        y: 0,
                        width: 1280,
                        height: 800,
                    },
                },
                pixels: None,
                icon: None,
                class: None,
            },
        );
    }

    pub fn close_window(&self, id: WindowId) {
        self.windows.borrow_mut().remove(&id);
        if self.active.get() == Some(id) {
            self.active.set(None);
        }
    }

    fn with_window(&self, id: WindowId, f: impl FnOnce(&mut FakeWindow)) {
        if let Some(window) = self.windows.borrow_mut().get_mut(&id) {
            f(window);
        }
    }

    /// Solid-colour backing surface; zero sizes simulate an unmapped window.
    pub fn set_pixels(&self, id: WindowId, width: i32, height: i32, rgba: [u8; 4]) {
        self.with_window(id, |w| w.pixels = Some((width, height, rgba)));
    }

    pub fn set_icon(&self, id: WindowId, rgba: [u8; 4]) {
        self.with_window(id, |w| w.icon = Some(rgba));
    }

    pub fn set_class(&self, id: WindowId, class: &str) {
        self.with_window(id, |w| w.class = Some(class.to_string()));
    }

    pub fn set_minimized(&self, id: WindowId, minimized: bool) {
        self.with_window(id, |w| w.info.minimized = minimized);
    }

    pub fn set_title(&self, id: WindowId, title: &str) {
        self.with_window(id, |w| w.info.title = title.to_string());
    }

    pub fn set_active(&self, id: Option<WindowId>) {
        self.active.set(id);
    }

    pub fn set_monitor(&self, geometry: Geometry) {
        self.monitor.set(geometry);
    }

    pub fn surface(&self, id: SurfaceId) -> Option<FakeSurface> {
        self.surfaces.borrow().get(&id).cloned()
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.borrow().len()
    }

    pub fn bound_windows(&self) -> Vec<WindowId> {
        self.bound.borrow().iter().copied().collect()
    }

    pub fn capture_calls(&self) -> usize {
        self.captures.get()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.borrow().clone()
    }

    pub fn actions_of(&self, filter: impl Fn(&Action) -> bool) -> Vec<Action> {
        self.actions
            .borrow()
            .iter()
            .filter(|action| filter(action))
            .cloned()
            .collect()
    }

    pub fn clear_actions(&self) {
        self.actions.borrow_mut().clear();
    }

    fn record(&self, action: Action) {
        self.actions.borrow_mut().push(action);
    }

    fn with_surface(&self, id: SurfaceId, f: impl FnOnce(&mut FakeSurface)) -> Result<()> {
        match self.surfaces.borrow_mut().get_mut(&id) {
            Some(surface) => {
                f(surface);
                Ok(())
            }
            None => bail!("no surface {id}"),
        }
    }
}

impl WindowSystem for FakeHost {
    fn list_windows(&self) -> Result<Vec<WindowId>> {
        Ok(self.windows.borrow().keys().copied().collect())
    }

    fn window_info(&self, id: WindowId) -> Option<WindowInfo> {
        self.windows.borrow().get(&id).map(|w| w.info.clone())
    }

    fn is_minimized(&self, id: WindowId) -> Option<bool> {
        self.windows.borrow().get(&id).map(|w| w.info.minimized)
    }

    fn active_window(&self) -> Option<WindowId> {
        self.active.get()
    }

    fn window_icon(&self, id: WindowId) -> Option<RgbaImage> {
        let rgba = self.windows.borrow().get(&id)?.icon?;
        Some(RgbaImage::from_pixel(16, 16, image::Rgba(rgba)))
    }

    fn window_class(&self, id: WindowId) -> Option<String> {
        self.windows.borrow().get(&id)?.class.clone()
    }

    fn minimize(&self, id: WindowId) -> Result<()> {
        self.record(Action::Minimize(id));
        self.set_minimized(id, true);
        Ok(())
    }

    fn unminimize(&self, id: WindowId, time: u32) -> Result<()> {
        self.record(Action::Unminimize(id, time));
        self.set_minimized(id, false);
        Ok(())
    }

    fn activate(&self, id: WindowId, time: u32) -> Result<()> {
        self.record(Action::Activate(id, time));
        self.active.set(Some(id));
        Ok(())
    }

    fn primary_monitor(&self) -> Geometry {
        self.monitor.get()
    }

    fn bind_capture(&self, id: WindowId) -> Result<()> {
        self.bound.borrow_mut().insert(id);
        Ok(())
    }

    fn release_capture(&self, id: WindowId) {
        self.bound.borrow_mut().remove(&id);
    }

    fn capture(&self, id: WindowId) -> Result<Snapshot, CaptureError> {
        self.captures.set(self.captures.get() + 1);
        let windows = self.windows.borrow();
        let window = windows.get(&id).ok_or(CaptureError::WindowGone(id))?;
        let (width, height, rgba) = window
            .pixels
            .ok_or_else(|| CaptureError::Host("no pixels".to_string()))?;
        let count = (width.max(0) * height.max(0)) as usize;
        Ok(Snapshot {
            width,
            height,
            rgba: rgba.repeat(count),
        })
    }
}

impl SurfaceHost for FakeHost {
    fn create_surface(&self, options: &SurfaceOptions) -> Result<SurfaceId> {
        let id = self.next_surface.get();
        self.next_surface.set(id + 1);
        self.surfaces.borrow_mut().insert(
            id,
            FakeSurface {
                title: options.title.clone(),
                position: options.position,
                size: options.size,
                opacity: options.opacity,
                visible: true,
                keep_above: options.keep_above,
                presented: 0,
                last_frame: None,
            },
        );
        self.record(Action::Create(id));
        Ok(id)
    }

    fn destroy_surface(&self, surface: SurfaceId) {
        self.surfaces.borrow_mut().remove(&surface);
        self.record(Action::Destroy(surface));
    }

    fn present(&self, surface: SurfaceId, frame: &Pixmap) -> Result<()> {
        let size = Size::new(frame.width(), frame.height());
        self.with_surface(surface, |s| {
            assert_eq!(s.size, size, "presented frame must match surface size");
            s.presented += 1;
            s.last_frame = Some(frame.clone());
        })
    }

    fn move_surface(&self, surface: SurfaceId, position: Point) -> Result<()> {
        self.record(Action::Move(surface, position));
        self.with_surface(surface, |s| s.position = position)
    }

    fn resize_surface(&self, surface: SurfaceId, size: Size) -> Result<()> {
        self.record(Action::Resize(surface, size));
        self.with_surface(surface, |s| s.size = size)
    }

    fn surface_position(&self, surface: SurfaceId) -> Option<Point> {
        self.surfaces.borrow().get(&surface).map(|s| s.position)
    }

    fn set_opacity(&self, surface: SurfaceId, opacity: f64) -> Result<()> {
        self.record(Action::Opacity(surface, opacity));
        self.with_surface(surface, |s| s.opacity = opacity)
    }

    fn set_visible(&self, surface: SurfaceId, visible: bool) -> Result<()> {
        self.record(Action::Visible(surface, visible));
        self.with_surface(surface, |s| s.visible = visible)
    }

    fn set_keep_above(&self, surface: SurfaceId, keep_above: bool) -> Result<()> {
        self.record(Action::KeepAbove(surface, keep_above));
        self.with_surface(surface, |s| s.keep_above = keep_above)
    }

    fn begin_move_drag(
        &self,
        surface: SurfaceId,
        button: u8,
        origin: Point,
        time: u32,
    ) -> Result<()> {
        self.record(Action::MoveDrag(surface, button, origin, time));
        Ok(())
    }
}
