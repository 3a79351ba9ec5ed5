use image::RgbaImage;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::{debug, trace};

use crate::backend::WindowSystem;
use crate::icon::IconCache;
use crate::render::scale_bilinear;
use crate::types::{Size, WindowId};

/// Result of one capture tick.
pub enum CaptureOutcome {
    /// Live pixels scaled to the target size.
    Live(Pixmap),
    /// The window's icon scaled to the target size.
    Fallback(Pixmap),
    /// Nothing usable; keep showing the previous frame.
    Unchanged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Live,
    Fallback,
}

/// Periodic snapshot source for one target window.
pub struct CaptureSource {
    window: WindowId,
    target: Size,
    bound: bool,
    mode: Option<Mode>,
    icon: Option<Arc<RgbaImage>>,
    fallback_frame: Option<Pixmap>,
}

impl CaptureSource {
    pub fn new(window: WindowId, target: Size) -> Self {
        Self {
            window,
            target,
            bound: false,
            mode: None,
            icon: None,
            fallback_frame: None,
        }
    }

    #[cfg(test)]
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn set_target(&mut self, target: Size) {
        if target != self.target {
            self.target = target;
            self.fallback_frame = None;
        }
    }

    pub fn bind<H: WindowSystem + ?Sized>(&mut self, host: &H) {
        if let Err(err) = host.bind_capture(self.window) {
            debug!(window = self.window, "capture bind failed: {err:#}");
        }
        self.bound = true;
    }

    pub fn release<H: WindowSystem + ?Sized>(&mut self, host: &H) {
        if self.bound {
            host.release_capture(self.window);
            self.bound = false;
        }
    }

    pub fn tick<H: WindowSystem + ?Sized>(
        &mut self,
        host: &H,
        icons: &mut IconCache,
    ) -> CaptureOutcome {
        if host.is_minimized(self.window) == Some(true) {
            return self.fallback(host, icons, "minimized");
        }

        match host.capture(self.window) {
            Ok(snapshot) if snapshot.width > 0 && snapshot.height > 0 => {
                let scaled = RgbaImage::from_raw(
                    snapshot.width as u32,
                    snapshot.height as u32,
                    snapshot.rgba,
                )
                .and_then(|image| scale_bilinear(&image, self.target));
                match scaled {
                    Some(frame) => {
                        self.note_mode(Mode::Live, "captured");
                        CaptureOutcome::Live(frame)
                    }
                    None => self.fallback(host, icons, "unusable pixels"),
                }
            }
            Ok(snapshot) => {
                trace!(
                    window = self.window,
                    width = snapshot.width,
                    height = snapshot.height,
                    "non-positive surface size"
                );
                self.fallback(host, icons, "non-positive size")
            }
            Err(err) => {
                trace!(window = self.window, "capture failed: {err}");
                self.fallback(host, icons, "capture failed")
            }
        }
    }

    fn fallback<H: WindowSystem + ?Sized>(
        &mut self,
        host: &H,
        icons: &mut IconCache,
        reason: &str,
    ) -> CaptureOutcome {
        self.note_mode(Mode::Fallback, reason);
        if let Some(frame) = &self.fallback_frame {
            return CaptureOutcome::Fallback(frame.clone());
        }

        if self.icon.is_none() {
            self.icon = host.window_icon(self.window).map(Arc::new).or_else(|| {
                host.window_class(self.window)
                    .and_then(|class| icons.icon_for(&class))
            });
        }
        let Some(icon) = &self.icon else {
            return CaptureOutcome::Unchanged;
        };
        match scale_bilinear(icon, self.target) {
            Some(frame) => {
                self.fallback_frame = Some(frame.clone());
                CaptureOutcome::Fallback(frame)
            }
            None => CaptureOutcome::Unchanged,
        }
    }

    fn note_mode(&mut self, mode: Mode, reason: &str) {
        if self.mode != Some(mode) {
            debug!(window = self.window, ?mode, reason, "capture mode changed");
            self.mode = Some(mode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeHost;

    fn source(host: &FakeHost, id: WindowId) -> CaptureSource {
        let mut source = CaptureSource::new(id, Size::new(32, 20));
        source.bind(host);
        source
    }

    #[test]
    fn live_capture_is_scaled_to_target() {
        let host = FakeHost::default();
        host.add_window(1, "EVE - A", 10);
        host.set_pixels(1, 64, 40, [10, 200, 30, 255]);
        let mut source = source(&host, 1);

        let CaptureOutcome::Live(frame) = source.tick(&host, &mut IconCache::default()) else {
            panic!("expected live frame");
        };
        assert_eq!((frame.width(), frame.height()), (32, 20));
        assert_eq!(frame.pixel(5, 5).unwrap().green(), 200);
        assert_eq!(host.bound_windows(), vec![1]);
    }

    #[test]
    fn minimized_window_uses_icon() {
        let host = FakeHost::default();
        host.add_window(1, "EVE - A", 10);
        host.set_pixels(1, 64, 40, [10, 200, 30, 255]);
        host.set_icon(1, [255, 0, 0, 255]);
        host.set_minimized(1, true);
        let mut source = source(&host, 1);

        let CaptureOutcome::Fallback(frame) = source.tick(&host, &mut IconCache::default()) else {
            panic!("expected fallback frame");
        };
        assert_eq!((frame.width(), frame.height()), (32, 20));
        assert_eq!(frame.pixel(1, 1).unwrap().red(), 255);
        assert_eq!(host.capture_calls(), 0);
    }

    #[test]
    fn zero_size_surface_falls_back_to_icon() {
        let host = FakeHost::default();
        host.add_window(1, "EVE - A", 10);
        host.set_pixels(1, 0, 0, [0, 0, 0, 255]);
        host.set_icon(1, [0, 0, 255, 255]);
        let mut source = source(&host, 1);

        assert!(matches!(
            source.tick(&host, &mut IconCache::default()),
            CaptureOutcome::Fallback(_)
        ));
    }

    #[test]
    fn window_without_icon_uses_themed_icon_for_its_class() {
        let host = FakeHost::default();
        host.add_window(1, "EVE - A", 10);
        host.set_class(1, "exefile.exe");
        host.set_minimized(1, true);
        let mut icons = IconCache::default();
        icons.insert(
            "exefile.exe",
            RgbaImage::from_pixel(8, 8, image::Rgba([0, 255, 0, 255])),
        );
        let mut source = source(&host, 1);

        let CaptureOutcome::Fallback(frame) = source.tick(&host, &mut icons) else {
            panic!("expected fallback frame");
        };
        assert_eq!((frame.width(), frame.height()), (32, 20));
        assert_eq!(frame.pixel(16, 10).unwrap().green(), 255);
    }

    #[test]
    fn capture_error_without_icon_leaves_frame_unchanged() {
        let host = FakeHost::default();
        host.add_window(1, "EVE - A", 10);
        let mut source = source(&host, 1);
        host.close_window(1);

        assert!(matches!(
            source.tick(&host, &mut IconCache::default()),
            CaptureOutcome::Unchanged
        ));
    }

    #[test]
    fn icon_survives_window_closing() {
        let host = FakeHost::default();
        host.add_window(1, "EVE - A", 10);
        host.set_pixels(1, 0, 0, [0, 0, 0, 255]);
        host.set_icon(1, [0, 0, 255, 255]);
        let mut source = source(&host, 1);
        assert!(matches!(
            source.tick(&host, &mut IconCache::default()),
            CaptureOutcome::Fallback(_)
        ));

        host.close_window(1);
        assert!(matches!(
            source.tick(&host, &mut IconCache::default()),
            CaptureOutcome::Fallback(_)
        ));
    }

    #[test]
    fn release_unbinds_once() {
        let host = FakeHost::default();
        host.add_window(1, "EVE - A", 10);
        let mut source = source(&host, 1);
        source.release(&host);
        source.release(&host);
        assert!(!source.is_bound());
        assert!(host.bound_windows().is_empty());
    }
}
