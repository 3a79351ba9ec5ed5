use anyhow::{Context, Result};
use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::backend::{EventSource, Host};
use crate::config::{ConfigStore, read_settings};
use crate::matcher::WindowMatcher;
use crate::registry::ThumbnailRegistry;
use crate::render::LabelRenderer;
use crate::watcher::ConfigWatcher;
use crate::x11::X11Host;

/// Upper bound on one blocking wait, so config changes and signals are
/// noticed without host traffic.
const MAX_WAIT: Duration = Duration::from_millis(250);

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    let handler = request_shutdown as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signal in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
        // SAFETY: the handler only stores to an atomic.
        unsafe {
            libc::signal(signal, handler);
        }
    }
}

fn connect_host() -> Result<X11Host> {
    let display = std::env::var_os("DISPLAY");
    let session = std::env::var("XDG_SESSION_TYPE").unwrap_or_default();
    if display.is_none() && session == "wayland" {
        anyhow::bail!(
            "Wayland session without DISPLAY: live capture needs X11 or XWayland (run the client under XWayland and export DISPLAY)"
        );
    }
    let host = X11Host::connect().context("X11 session unavailable")?;
    info!(session = %session, "connected to X11 display");
    Ok(host)
}

/// Re-read the config file after an external edit and apply it when it
/// changes anything the thumbnails show.
fn reload_config<H: Host + ?Sized>(registry: &mut ThumbnailRegistry, host: &H, now: Instant) {
    let Some(path) = registry.config().path().map(PathBuf::from) else {
        return;
    };
    let mut edited = match read_settings(&path) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(path = %path.display(), "ignoring config change: {err}");
            return;
        }
    };
    let warnings = edited.validate_against(registry.settings());
    if edited.same_display(registry.settings())
        && warnings.is_empty()
        && !registry.config().file_kept()
    {
        debug!("config change does not affect thumbnails");
        return;
    }
    info!(path = %path.display(), "config changed, applying");
    registry.apply_settings(host, edited, now);
}

pub fn run_daemon(config_path: Option<PathBuf>) -> Result<()> {
    let config = ConfigStore::load(config_path);
    let mut host = connect_host()?;

    let watcher = config.path().and_then(|path| match ConfigWatcher::new(path) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            warn!("config changes will not be picked up: {err:#}");
            None
        }
    });

    let labels = LabelRenderer::with_system_fonts();
    let mut registry = ThumbnailRegistry::new(config, WindowMatcher::default(), labels);
    install_signal_handlers();
    registry.scan_existing(&host, Instant::now());

    while !SHUTDOWN.load(Ordering::SeqCst) {
        let now = Instant::now();
        let timeout = registry
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(MAX_WAIT)
            .min(MAX_WAIT);

        let events = host.wait_events(timeout).context("X11 connection lost")?;
        let now = Instant::now();
        for event in events {
            registry.dispatch(&host, event, now);
        }
        registry.fire_due_timers(&host, Instant::now());

        if watcher.as_ref().is_some_and(ConfigWatcher::changed) {
            reload_config(&mut registry, &host, Instant::now());
        }
    }

    info!("shutting down");
    registry.shutdown(&host);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONFIG_FILE_NAME, Settings, write_settings};
    use crate::test_utils::{Action, FakeHost};
    use pretty_assertions::assert_eq;
    use std::fs;

    struct Fixture {
        host: FakeHost,
        registry: ThumbnailRegistry,
        path: PathBuf,
        _dir: tempfile::TempDir,
    }

    fn fixture(contents: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, contents).unwrap();
        let matcher = WindowMatcher::new(1, dir.path().join("proc"));
        let mut registry = ThumbnailRegistry::new(
            ConfigStore::load(Some(path.clone())),
            matcher,
            LabelRenderer::without_fonts(),
        );
        let host = FakeHost::default();
        host.add_window(1, "EVE - A", 10);
        registry.scan_existing(&host, Instant::now());
        host.clear_actions();
        Fixture {
            host,
            registry,
            path,
            _dir: dir,
        }
    }

    #[test]
    fn position_only_edit_is_not_applied() {
        let mut f = fixture("{}");
        let mut edited = Settings::default();
        edited
            .thumbnail_positions
            .insert("EVE - B".to_string(), [5, 5]);
        write_settings(&f.path, &edited).unwrap();

        reload_config(&mut f.registry, &f.host, Instant::now());
        assert!(f.host.actions().is_empty());
        assert_eq!(f.registry.settings().saved_position("EVE - B"), None);
    }

    #[test]
    fn display_edit_reaches_live_surfaces() {
        let mut f = fixture("{}");
        let edited = Settings {
            opacity: 0.5,
            always_on_top: false,
            ..Settings::default()
        };
        write_settings(&f.path, &edited).unwrap();

        reload_config(&mut f.registry, &f.host, Instant::now());
        assert_eq!(f.registry.settings().opacity, 0.5);
        let surface = f.registry.get(1).unwrap().surface();
        let live = f.host.surface(surface).unwrap();
        assert_eq!(live.opacity, 0.5);
        assert!(!live.keep_above);
        assert!(f.host.actions().contains(&Action::KeepAbove(surface, false)));
    }

    #[test]
    fn invalid_edit_keeps_running_settings() {
        let mut f = fixture(r##"{"active_border_color": "#FF0000"}"##);
        fs::write(&f.path, "{ broken").unwrap();
        reload_config(&mut f.registry, &f.host, Instant::now());
        assert!(f.host.actions().is_empty());

        fs::write(&f.path, r#"{"active_border_color": "blue"}"#).unwrap();
        reload_config(&mut f.registry, &f.host, Instant::now());
        assert_eq!(f.registry.settings().active_border_color, "#FF0000");
    }

    #[test]
    fn repaired_file_is_adopted() {
        let mut f = fixture("{ broken");
        assert!(f.registry.config().file_kept());

        fs::write(&f.path, r#"{"thumbnail_positions": {"EVE - B": [5, 5]}}"#).unwrap();
        reload_config(&mut f.registry, &f.host, Instant::now());
        assert!(!f.registry.config().file_kept());
        assert_eq!(
            f.registry.settings().saved_position("EVE - B"),
            Some(crate::types::Point::new(5, 5))
        );
    }
}
