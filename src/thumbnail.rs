//! One live preview: a surface we own mirroring one client window.

use anyhow::Result;
use std::time::Instant;
use tiny_skia::Pixmap;
use tracing::{debug, trace, warn};

use crate::backend::{Host, SurfaceOptions};
use crate::capture::{CaptureOutcome, CaptureSource};
use crate::config::{ConfigStore, DRAG_THRESHOLD, Settings};
use crate::gesture::{GestureAction, GestureController};
use crate::icon::IconCache;
use crate::matcher::display_name;
use crate::render::{Decoration, LabelRenderer, compose};
use crate::timer::RepeatingTimer;
use crate::types::{Point, PointerEvent, Size, SurfaceId, WindowId, WindowInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unbound,
    Bound,
    Destroyed,
}

pub struct ThumbnailSurface {
    window: WindowId,
    surface: SurfaceId,
    title: String,
    label: Option<Pixmap>,
    base_size: Size,
    size: Size,
    hovering: bool,
    active: bool,
    visible: bool,
    /// Placed at the position saved for its title.
    restored: bool,
    phase: Phase,
    timer: RepeatingTimer,
    frame: Option<Pixmap>,
    capture: CaptureSource,
    gestures: GestureController,
}

fn surface_title(title: &str) -> String {
    format!("EVE-O Preview - {}", display_name(title))
}

fn log_failure(window: WindowId, what: &str, result: Result<()>) {
    if let Err(err) = result {
        debug!(window, "{what} failed: {err:#}");
    }
}

impl ThumbnailSurface {
    /// Create the display surface at `position`. Capture starts with
    /// [`ThumbnailSurface::bind`].
    pub fn create<H: Host + ?Sized>(
        host: &H,
        info: &WindowInfo,
        position: Point,
        settings: &Settings,
        labels: &LabelRenderer,
    ) -> Result<Self> {
        let size = settings.thumbnail_size();
        let surface = host.create_surface(&SurfaceOptions {
            title: surface_title(&info.title),
            position,
            size,
            opacity: settings.opacity,
            keep_above: settings.always_on_top,
        })?;

        let thumbnail = Self {
            window: info.id,
            surface,
            title: info.title.clone(),
            label: labels.render(&display_name(&info.title)),
            base_size: size,
            size,
            hovering: false,
            active: false,
            visible: true,
            restored: settings.saved_position(&info.title) == Some(position),
            phase: Phase::Unbound,
            timer: RepeatingTimer::new(settings.refresh_period()),
            frame: None,
            capture: CaptureSource::new(info.id, size),
            gestures: GestureController::new(DRAG_THRESHOLD),
        };
        thumbnail.redraw(host, settings);
        Ok(thumbnail)
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    #[cfg(test)]
    pub fn size(&self) -> Size {
        self.size
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[cfg(test)]
    pub fn is_hovering(&self) -> bool {
        self.hovering
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timer(&self) -> &RepeatingTimer {
        &self.timer
    }

    #[cfg(test)]
    pub fn frame(&self) -> Option<&Pixmap> {
        self.frame.as_ref()
    }

    pub fn bind<H: Host + ?Sized>(&mut self, host: &H, now: Instant) {
        if self.phase != Phase::Unbound {
            return;
        }
        self.capture.bind(host);
        self.timer.start(now);
        self.phase = Phase::Bound;
        debug!(window = self.window, period = ?self.timer.period(), "capture bound");
    }

    /// Run one capture tick if the refresh timer is due.
    pub fn fire_if_due<H: Host + ?Sized>(
        &mut self,
        host: &H,
        icons: &mut IconCache,
        settings: &Settings,
        now: Instant,
    ) {
        if self.phase == Phase::Bound && self.timer.poll(now) {
            self.tick(host, icons, settings);
        }
    }

    pub fn tick<H: Host + ?Sized>(&mut self, host: &H, icons: &mut IconCache, settings: &Settings) {
        match self.capture.tick(host, icons) {
            CaptureOutcome::Live(frame) | CaptureOutcome::Fallback(frame) => {
                self.frame = Some(frame);
                self.redraw(host, settings);
            }
            CaptureOutcome::Unchanged => trace!(window = self.window, "keeping previous frame"),
        }
    }

    pub fn redraw<H: Host + ?Sized>(&self, host: &H, settings: &Settings) {
        if self.phase == Phase::Destroyed {
            return;
        }
        let decoration = Decoration {
            active: self.active,
            active_rgb: settings.active_border_rgb(),
            label: if settings.show_overlay {
                self.label.as_ref()
            } else {
                None
            },
        };
        let Some(canvas) = compose(self.frame.as_ref(), self.size, &decoration) else {
            return;
        };
        log_failure(self.window, "present", host.present(self.surface, &canvas));
    }

    pub fn hover_enter<H: Host + ?Sized>(&mut self, host: &H, settings: &Settings) {
        if !settings.zoom_on_hover || self.hovering {
            return;
        }
        self.hovering = true;
        self.resize(host, settings, self.base_size.scaled(settings.zoom_factor));
    }

    pub fn hover_leave<H: Host + ?Sized>(&mut self, host: &H, settings: &Settings) {
        if !self.hovering {
            return;
        }
        self.hovering = false;
        self.resize(host, settings, self.base_size);
    }

    fn resize<H: Host + ?Sized>(&mut self, host: &H, settings: &Settings, size: Size) {
        if size == self.size {
            return;
        }
        self.size = size;
        log_failure(self.window, "resize", host.resize_surface(self.surface, size));
        self.redraw(host, settings);
    }

    pub fn set_active<H: Host + ?Sized>(&mut self, host: &H, settings: &Settings, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        self.apply_state(host, settings);
        self.redraw(host, settings);
    }

    /// Opacity and visibility for the current active flag.
    fn apply_state<H: Host + ?Sized>(&mut self, host: &H, settings: &Settings) {
        let opacity = if self.active { 1.0 } else { settings.opacity };
        log_failure(self.window, "set opacity", host.set_opacity(self.surface, opacity));

        let visible = !(self.active && settings.hide_active_client);
        if visible != self.visible {
            self.visible = visible;
            log_failure(self.window, "set visibility", host.set_visible(self.surface, visible));
        }
    }

    /// Re-apply display settings to the live surface without recreating it.
    pub fn apply_settings<H: Host + ?Sized>(&mut self, host: &H, settings: &Settings, now: Instant) {
        self.base_size = settings.thumbnail_size();
        self.capture.set_target(self.base_size);
        if self.hovering && !settings.zoom_on_hover {
            self.hovering = false;
        }
        let size = if self.hovering {
            self.base_size.scaled(settings.zoom_factor)
        } else {
            self.base_size
        };
        if size != self.size {
            self.size = size;
            log_failure(self.window, "resize", host.resize_surface(self.surface, size));
        }

        log_failure(
            self.window,
            "set keep-above",
            host.set_keep_above(self.surface, settings.always_on_top),
        );
        self.apply_state(host, settings);

        let period = settings.refresh_period();
        if self.phase == Phase::Bound && self.timer.period() != period {
            self.timer.restart(period, now);
            debug!(window = self.window, ?period, "refresh timer restarted");
        }
        self.redraw(host, settings);
    }

    pub fn set_title<H: Host + ?Sized>(
        &mut self,
        host: &H,
        settings: &Settings,
        labels: &LabelRenderer,
        title: &str,
    ) {
        if title == self.title {
            return;
        }
        debug!(window = self.window, title, "title changed");
        self.title = title.to_string();
        self.label = labels.render(&display_name(title));
        self.redraw(host, settings);
    }

    /// Move to a position saved for the current title. Only the first call
    /// moves, and only when the surface was not already placed from a record.
    pub fn restore_position<H: Host + ?Sized>(&mut self, host: &H, position: Point) {
        if self.restored {
            return;
        }
        self.restored = true;
        debug!(window = self.window, x = position.x, y = position.y, "restoring saved position");
        log_failure(self.window, "move", host.move_surface(self.surface, position));
    }

    pub fn handle_pointer<H: Host + ?Sized>(
        &mut self,
        host: &H,
        settings: &Settings,
        event: &PointerEvent,
    ) {
        let action = match event {
            PointerEvent::Enter => return self.hover_enter(host, settings),
            PointerEvent::Leave => return self.hover_leave(host, settings),
            _ => self.gestures.handle(event),
        };

        match action {
            GestureAction::None => {}
            GestureAction::Minimize => {
                log_failure(self.window, "minimize", host.minimize(self.window));
            }
            GestureAction::BeginMoveDrag {
                button,
                origin,
                time,
            } => {
                trace!(window = self.window, button, ?origin, "move drag");
                log_failure(
                    self.window,
                    "move drag",
                    host.begin_move_drag(self.surface, button, origin, time),
                );
            }
            GestureAction::Click { time } => {
                if host.is_minimized(self.window) == Some(true) {
                    log_failure(self.window, "unminimize", host.unminimize(self.window, time));
                }
                log_failure(self.window, "activate", host.activate(self.window, time));
            }
        }
    }

    /// Cancel the timer, remember where the surface was and tear it down.
    pub fn destroy<H: Host + ?Sized>(&mut self, host: &H, config: &mut ConfigStore) {
        if self.phase == Phase::Destroyed {
            return;
        }
        self.timer.cancel();
        self.gestures.reset();

        match host.surface_position(self.surface) {
            Some(position) => config.record_position(&self.title, position),
            None => warn!(window = self.window, "surface position unknown, not saved"),
        }

        self.capture.release(host);
        host.destroy_surface(self.surface);
        self.phase = Phase::Destroyed;
        debug!(window = self.window, "thumbnail destroyed");
    }
}
