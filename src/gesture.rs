//! Click-versus-drag disambiguation for thumbnail pointer input.

use crate::types::{ButtonEvent, Point, PointerEvent};

const PRIMARY_BUTTON: u8 = 1;
const SECONDARY_BUTTON: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureState {
    Idle,
    Pressed { origin: Point, time: u32 },
    Dragging,
}

/// What the owning surface must do in response to one pointer event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureAction {
    None,
    Minimize,
    /// Hand off to the window manager's move, seeded with the press point.
    BeginMoveDrag { button: u8, origin: Point, time: u32 },
    /// Unminimize if needed, then activate.
    Click { time: u32 },
}

#[derive(Debug)]
pub struct GestureController {
    state: GestureState,
    threshold: i32,
}

impl GestureController {
    pub fn new(threshold: i32) -> Self {
        Self {
            state: GestureState::Idle,
            threshold,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
    }

    pub fn handle(&mut self, event: &PointerEvent) -> GestureAction {
        match *event {
            PointerEvent::Press(press) => self.press(press),
            PointerEvent::Motion { x_root, y_root, .. } => self.motion(Point::new(x_root, y_root)),
            PointerEvent::Release(release) => self.release(release),
            PointerEvent::Enter | PointerEvent::Leave => GestureAction::None,
        }
    }

    fn press(&mut self, press: ButtonEvent) -> GestureAction {
        let origin = Point::new(press.x_root, press.y_root);
        match press.button {
            PRIMARY_BUTTON if press.control => {
                self.state = GestureState::Idle;
                GestureAction::Minimize
            }
            PRIMARY_BUTTON => {
                self.state = GestureState::Pressed {
                    origin,
                    time: press.time,
                };
                GestureAction::None
            }
            SECONDARY_BUTTON => {
                self.state = GestureState::Idle;
                GestureAction::BeginMoveDrag {
                    button: SECONDARY_BUTTON,
                    origin,
                    time: press.time,
                }
            }
            _ => GestureAction::None,
        }
    }

    fn motion(&mut self, at: Point) -> GestureAction {
        let GestureState::Pressed { origin, time } = self.state else {
            return GestureAction::None;
        };
        let dx = (at.x - origin.x).abs();
        let dy = (at.y - origin.y).abs();
        if dx < self.threshold && dy < self.threshold {
            return GestureAction::None;
        }
        self.state = GestureState::Dragging;
        GestureAction::BeginMoveDrag {
            button: PRIMARY_BUTTON,
            origin,
            time,
        }
    }

    fn release(&mut self, release: ButtonEvent) -> GestureAction {
        if release.button != PRIMARY_BUTTON {
            return GestureAction::None;
        }
        let previous = std::mem::replace(&mut self.state, GestureState::Idle);
        match previous {
            GestureState::Pressed { .. } => GestureAction::Click { time: release.time },
            GestureState::Dragging | GestureState::Idle => GestureAction::None,
        }
    }
}
