//! Tracks one [`ThumbnailSurface`] per live client window.

use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::backend::Host;
use crate::config::{ConfigStore, GRID_MARGIN, Settings, ValidationWarning};
use crate::icon::IconCache;
use crate::matcher::WindowMatcher;
use crate::render::LabelRenderer;
use crate::thumbnail::ThumbnailSurface;
use crate::types::{Geometry, HostEvent, Point, Size, SurfaceId, WindowId};

pub struct ThumbnailRegistry {
    config: ConfigStore,
    matcher: WindowMatcher,
    labels: LabelRenderer,
    icons: IconCache,
    thumbnails: HashMap<WindowId, ThumbnailSurface>,
    surfaces: HashMap<SurfaceId, WindowId>,
    reported: Option<usize>,
}

/// Slot `index` of a left-to-right, top-to-bottom grid on `monitor`.
pub fn grid_position(monitor: Geometry, size: Size, index: usize) -> Point {
    let width = size.width as i32;
    let height = size.height as i32;
    let cols = ((monitor.width - GRID_MARGIN) / (width + GRID_MARGIN)).max(1) as usize;
    let col = (index % cols) as i32;
    let row = (index / cols) as i32;
    Point::new(
        monitor.x + GRID_MARGIN + col * (width + GRID_MARGIN),
        monitor.y + GRID_MARGIN + row * (height + GRID_MARGIN),
    )
}

impl ThumbnailRegistry {
    pub fn new(config: ConfigStore, matcher: WindowMatcher, labels: LabelRenderer) -> Self {
        Self {
            config,
            matcher,
            labels,
            icons: IconCache::default(),
            thumbnails: HashMap::new(),
            surfaces: HashMap::new(),
            reported: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        self.config.settings()
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.thumbnails.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.thumbnails.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, window: WindowId) -> Option<&ThumbnailSurface> {
        self.thumbnails.get(&window)
    }

    /// Track every matching window that already exists.
    pub fn scan_existing<H: Host + ?Sized>(&mut self, host: &H, now: Instant) {
        match host.list_windows() {
            Ok(windows) => {
                for window in windows {
                    self.on_window_opened(host, window, now);
                }
            }
            Err(err) => warn!("failed to list windows: {err:#}"),
        }
        self.on_active_window_changed(host);
        self.report_count();
    }

    pub fn on_window_opened<H: Host + ?Sized>(&mut self, host: &H, window: WindowId, now: Instant) {
        if self.thumbnails.contains_key(&window) {
            return;
        }
        let Some(info) = host.window_info(window) else {
            trace!(window, "window vanished before it could be inspected");
            return;
        };
        if !self.matcher.is_target(&info) {
            trace!(window, title = info.title, "not a client window");
            return;
        }

        let settings = self.config.settings();
        let position = settings.saved_position(&info.title).unwrap_or_else(|| {
            grid_position(
                host.primary_monitor(),
                settings.thumbnail_size(),
                self.thumbnails.len(),
            )
        });

        let mut thumbnail =
            match ThumbnailSurface::create(host, &info, position, settings, &self.labels) {
                Ok(thumbnail) => thumbnail,
                Err(err) => {
                    warn!(window, "failed to create thumbnail: {err:#}");
                    return;
                }
            };
        thumbnail.bind(host, now);
        thumbnail.set_active(host, settings, host.active_window() == Some(window));
        info!(window, title = info.title, x = position.x, y = position.y, "tracking client");

        self.surfaces.insert(thumbnail.surface(), window);
        self.thumbnails.insert(window, thumbnail);
        self.report_count();
    }

    pub fn on_window_closed<H: Host + ?Sized>(&mut self, host: &H, window: WindowId) {
        let Some(mut thumbnail) = self.thumbnails.remove(&window) else {
            return;
        };
        self.surfaces.remove(&thumbnail.surface());
        thumbnail.destroy(host, &mut self.config);
        info!(window, title = thumbnail.title(), "client closed");
        self.report_count();
    }

    /// Every surface's active flag is updated before this returns.
    pub fn on_active_window_changed<H: Host + ?Sized>(&mut self, host: &H) {
        let Some(active) = host.active_window() else {
            return;
        };
        let settings = self.config.settings();
        for (window, thumbnail) in &mut self.thumbnails {
            thumbnail.set_active(host, settings, *window == active);
        }
    }

    /// Refresh a tracked window's label, or give an untracked window a
    /// second chance once its title is final.
    pub fn on_title_changed<H: Host + ?Sized>(&mut self, host: &H, window: WindowId, now: Instant) {
        if !self.thumbnails.contains_key(&window) {
            return self.on_window_opened(host, window, now);
        }
        let Some(info) = host.window_info(window) else {
            return;
        };
        let Some(thumbnail) = self.thumbnails.get_mut(&window) else {
            return;
        };
        let settings = self.config.settings();
        thumbnail.set_title(host, settings, &self.labels, &info.title);
        // Clients accepted before login carry a generic title; their record
        // only becomes reachable now.
        if let Some(position) = settings.saved_position(&info.title) {
            thumbnail.restore_position(host, position);
        }
    }

    /// Persist `settings` and re-apply them to every live surface.
    pub fn apply_settings<H: Host + ?Sized>(
        &mut self,
        host: &H,
        settings: Settings,
        now: Instant,
    ) -> Vec<ValidationWarning> {
        let warnings = self.config.apply_settings(settings);
        let settings = self.config.settings();
        for thumbnail in self.thumbnails.values_mut() {
            thumbnail.apply_settings(host, settings, now);
        }
        info!(clients = self.thumbnails.len(), "settings applied");
        warnings
    }

    pub fn dispatch<H: Host + ?Sized>(&mut self, host: &H, event: HostEvent, now: Instant) {
        match event {
            HostEvent::WindowOpened(window) => self.on_window_opened(host, window, now),
            HostEvent::WindowClosed(window) => self.on_window_closed(host, window),
            HostEvent::TitleChanged(window) => self.on_title_changed(host, window, now),
            HostEvent::ActiveWindowChanged => self.on_active_window_changed(host),
            HostEvent::Pointer { surface, event } => {
                let Some(window) = self.surfaces.get(&surface) else {
                    return;
                };
                if let Some(thumbnail) = self.thumbnails.get_mut(window) {
                    thumbnail.handle_pointer(host, self.config.settings(), &event);
                }
            }
            HostEvent::Redraw(surface) => {
                let Some(window) = self.surfaces.get(&surface) else {
                    return;
                };
                if let Some(thumbnail) = self.thumbnails.get(window) {
                    thumbnail.redraw(host, self.config.settings());
                }
            }
        }
    }

    pub fn fire_due_timers<H: Host + ?Sized>(&mut self, host: &H, now: Instant) {
        let settings = self.config.settings();
        for thumbnail in self.thumbnails.values_mut() {
            thumbnail.fire_if_due(host, &mut self.icons, settings, now);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.thumbnails
            .values()
            .filter_map(|thumbnail| thumbnail.timer().deadline())
            .min()
    }

    /// Tear down every surface, saving positions.
    pub fn shutdown<H: Host + ?Sized>(&mut self, host: &H) {
        for (_, mut thumbnail) in self.thumbnails.drain() {
            thumbnail.destroy(host, &mut self.config);
        }
        self.surfaces.clear();
        debug!("all thumbnails destroyed");
    }

    fn report_count(&mut self) {
        let count = self.thumbnails.len();
        if self.reported == Some(count) {
            return;
        }
        self.reported = Some(count);
        if count == 0 {
            info!("no clients detected");
        } else {
            info!("monitoring {count} client{}", if count == 1 { "" } else { "s" });
        }
    }
}
