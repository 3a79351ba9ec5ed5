/// Host identifier of a foreign (monitored) window.
pub type WindowId = u32;

/// Host identifier of one of our own thumbnail surfaces.
pub type SurfaceId = u32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self {
            width: ((self.width as f64) * factor).round().max(1.0) as u32,
            height: ((self.height as f64) * factor).round().max(1.0) as u32,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Snapshot of a foreign window's attributes, valid only for the moment it
/// was queried.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    pub pid: Option<u32>,
    pub minimized: bool,
    pub geometry: Geometry,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: u8,
    pub x_root: i32,
    pub y_root: i32,
    pub time: u32,
    pub control: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerEvent {
    Press(ButtonEvent),
    Release(ButtonEvent),
    Motion { x_root: i32, y_root: i32, time: u32 },
    Enter,
    Leave,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostEvent {
    WindowOpened(WindowId),
    WindowClosed(WindowId),
    TitleChanged(WindowId),
    ActiveWindowChanged,
    Pointer {
        surface: SurfaceId,
        event: PointerEvent,
    },
    Redraw(SurfaceId),
}
