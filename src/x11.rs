//! X11 host: EWMH window queries and actions, Composite capture, and the
//! thumbnail surfaces themselves.

use anyhow::{Context, Result};
use image::RgbaImage;
use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    os::fd::{AsRawFd, RawFd},
    time::Duration,
};
use tiny_skia::Pixmap;
use tracing::{debug, info, trace, warn};
use x11rb::{
    connection::{Connection, RequestConnection},
    properties::{WmHints, WmSizeHints, WmSizeHintsSpecification},
    protocol::{
        Event,
        composite::{self, ConnectionExt as _, Redirect},
        randr::ConnectionExt as _,
        xproto::{
            Atom, AtomEnum, ButtonPressEvent, ChangeWindowAttributesAux, ClientMessageEvent,
            ColormapAlloc, ConfigureWindowAux, ConnectionExt as _, CreateGCAux, CreateWindowAux,
            EventMask, Gcontext, ImageFormat, KeyButMask, PropMode, Screen, VisualClass,
            Visualid, Window, WindowClass,
        },
    },
    rust_connection::RustConnection,
    wrapper::ConnectionExt as _,
};

use crate::backend::{EventSource, Snapshot, SurfaceHost, SurfaceOptions, WindowSystem};
use crate::error::CaptureError;
use crate::types::{
    ButtonEvent, Geometry, HostEvent, Point, PointerEvent, Size, SurfaceId, WindowId, WindowInfo,
};

x11rb::atom_manager! {
    pub Atoms: AtomsCookie {
        _NET_CLIENT_LIST,
        _NET_ACTIVE_WINDOW,
        _NET_WM_NAME,
        _NET_WM_PID,
        _NET_WM_ICON,
        _NET_WM_STATE,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_STATE_ABOVE,
        _NET_WM_STATE_SKIP_TASKBAR,
        _NET_WM_STATE_SKIP_PAGER,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_UTILITY,
        _NET_WM_WINDOW_OPACITY,
        _NET_WM_MOVERESIZE,
        _MOTIF_WM_HINTS,
        WM_STATE,
        WM_CHANGE_STATE,
        UTF8_STRING,
    }
}

const ICONIC_STATE: u32 = 3;
const MOVERESIZE_MOVE: u32 = 8;
const SOURCE_PAGER: u32 = 2;
const SOURCE_APPLICATION: u32 = 1;
const STATE_REMOVE: u32 = 0;
const STATE_ADD: u32 = 1;
const MOTIF_HINTS_DECORATIONS: u32 = 2;
const SURFACE_CLASS: &[u8] = b"eve-preview\0EVE-Preview\0";

struct SurfaceResources {
    gc: Gcontext,
    depth: u8,
}

pub struct X11Host {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
    root_depth: u8,
    root_visual: Visualid,
    screen_size: (u16, u16),
    argb: Option<(Visualid, u32)>,
    clients: RefCell<HashSet<Window>>,
    surfaces: RefCell<HashMap<Window, SurfaceResources>>,
}

impl X11Host {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) =
            x11rb::connect(None).context("connect to X11 display (is DISPLAY set?)")?;
        let screen = conn.setup().roots[screen_num].clone();

        conn.extension_information(composite::X11_EXTENSION_NAME)
            .context("query Composite extension")?
            .context("Composite extension not available")?;
        let version = conn
            .composite_query_version(0, 4)
            .context("send Composite version query")?
            .reply()
            .context("query Composite version")?;
        info!(
            "Composite extension {}.{}",
            version.major_version, version.minor_version
        );
        if let Ok(cookie) = conn.randr_query_version(1, 5) {
            let _ = cookie.reply();
        }

        let atoms = Atoms::new(&conn)
            .context("send atom requests")?
            .reply()
            .context("intern atoms")?;

        conn.change_window_attributes(
            screen.root,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )
        .context("subscribe to root window properties")?;

        let argb = match argb_visual(&screen) {
            Some(visual) => {
                let colormap = conn.generate_id().context("allocate colormap id")?;
                conn.create_colormap(ColormapAlloc::NONE, colormap, screen.root, visual)
                    .context("create ARGB colormap")?;
                Some((visual, colormap))
            }
            None => {
                warn!("no 32-bit visual; thumbnails will be opaque rectangles");
                None
            }
        };

        let host = Self {
            root: screen.root,
            root_depth: screen.root_depth,
            root_visual: screen.root_visual,
            screen_size: (screen.width_in_pixels, screen.height_in_pixels),
            conn,
            atoms,
            argb,
            clients: RefCell::new(HashSet::new()),
            surfaces: RefCell::new(HashMap::new()),
        };

        let initial = host.read_client_list();
        if initial.is_none() {
            warn!("window manager does not publish _NET_CLIENT_LIST; no clients will be found");
        }
        let initial = initial.unwrap_or_default();
        for &id in &initial {
            host.watch_client(id);
        }
        *host.clients.borrow_mut() = initial.into_iter().collect();
        host.conn.flush().context("flush X11 connection")?;
        Ok(host)
    }

    fn property32(&self, window: Window, property: Atom, kind: impl Into<Atom>) -> Option<Vec<u32>> {
        let reply = self
            .conn
            .get_property(false, window, property, kind, 0, u32::MAX / 4)
            .ok()?
            .reply()
            .ok()?;
        Some(
            reply
                .value32()
                .map(|values| values.collect())
                .unwrap_or_default(),
        )
    }

    fn property_bytes(&self, window: Window, property: Atom, kind: impl Into<Atom>) -> Option<Vec<u8>> {
        let reply = self
            .conn
            .get_property(false, window, property, kind, 0, 1024)
            .ok()?
            .reply()
            .ok()?;
        Some(reply.value)
    }

    fn read_client_list(&self) -> Option<Vec<Window>> {
        let clients = self.property32(self.root, self.atoms._NET_CLIENT_LIST, AtomEnum::WINDOW)?;
        if clients.is_empty() {
            return None;
        }
        Some(clients)
    }

    fn watch_client(&self, id: Window) {
        let _ = self.conn.change_window_attributes(
            id,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        );
    }

    fn title(&self, id: Window) -> String {
        let utf8 = self
            .property_bytes(id, self.atoms._NET_WM_NAME, self.atoms.UTF8_STRING)
            .filter(|bytes| !bytes.is_empty());
        let bytes = utf8.or_else(|| {
            self.property_bytes(id, AtomEnum::WM_NAME.into(), AtomEnum::STRING)
                .filter(|bytes| !bytes.is_empty())
        });
        bytes
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }

    fn geometry(&self, id: Window) -> Option<Geometry> {
        let geom = self.conn.get_geometry(id).ok()?.reply().ok()?;
        let origin = self
            .conn
            .translate_coordinates(id, self.root, 0, 0)
            .ok()?
            .reply()
            .ok()?;
        Some(Geometry {
            x: origin.dst_x.into(),
            y: origin.dst_y.into(),
            width: geom.width.into(),
            height: geom.height.into(),
        })
    }

    fn send_root_message(&self, window: Window, kind: Atom, data: [u32; 5]) -> Result<()> {
        let event = ClientMessageEvent::new(32, window, kind, data);
        self.conn
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
                event,
            )
            .context("send client message")?;
        self.conn.flush().context("flush X11 connection")?;
        Ok(())
    }

    fn is_surface(&self, window: Window) -> bool {
        self.surfaces.borrow().contains_key(&window)
    }

    fn diff_clients(&self, out: &mut Vec<HostEvent>) {
        let current = self
            .read_client_list()
            .unwrap_or_default()
            .into_iter()
            .collect::<HashSet<_>>();
        let mut known = self.clients.borrow_mut();

        let mut opened = current.difference(&known).copied().collect::<Vec<_>>();
        let mut closed = known.difference(&current).copied().collect::<Vec<_>>();
        opened.sort_unstable();
        closed.sort_unstable();
        for id in opened {
            // Our own surfaces keep the event mask they were created with.
            if self.is_surface(id) {
                continue;
            }
            self.watch_client(id);
            out.push(HostEvent::WindowOpened(id));
        }
        for id in closed {
            out.push(HostEvent::WindowClosed(id));
        }
        *known = current;
    }

    fn translate(&self, event: Event, out: &mut Vec<HostEvent>) {
        match event {
            Event::PropertyNotify(e) if e.window == self.root => {
                if e.atom == self.atoms._NET_CLIENT_LIST {
                    self.diff_clients(out);
                } else if e.atom == self.atoms._NET_ACTIVE_WINDOW {
                    out.push(HostEvent::ActiveWindowChanged);
                }
            }
            Event::PropertyNotify(e) => {
                let is_title = e.atom == self.atoms._NET_WM_NAME
                    || e.atom == Atom::from(AtomEnum::WM_NAME);
                if is_title && self.clients.borrow().contains(&e.window) {
                    out.push(HostEvent::TitleChanged(e.window));
                }
            }
            Event::ButtonPress(e) if self.is_surface(e.event) => out.push(HostEvent::Pointer {
                surface: e.event,
                event: PointerEvent::Press(button_event(&e)),
            }),
            Event::ButtonRelease(e) if self.is_surface(e.event) => out.push(HostEvent::Pointer {
                surface: e.event,
                event: PointerEvent::Release(button_event(&e)),
            }),
            Event::MotionNotify(e) if self.is_surface(e.event) => out.push(HostEvent::Pointer {
                surface: e.event,
                event: PointerEvent::Motion {
                    x_root: e.root_x.into(),
                    y_root: e.root_y.into(),
                    time: e.time,
                },
            }),
            Event::EnterNotify(e) if self.is_surface(e.event) => out.push(HostEvent::Pointer {
                surface: e.event,
                event: PointerEvent::Enter,
            }),
            Event::LeaveNotify(e) if self.is_surface(e.event) => out.push(HostEvent::Pointer {
                surface: e.event,
                event: PointerEvent::Leave,
            }),
            Event::Expose(e) if e.count == 0 && self.is_surface(e.window) => {
                out.push(HostEvent::Redraw(e.window))
            }
            Event::Error(err) => trace!(?err, "X11 error"),
            _ => {}
        }
    }

    fn drain_events(&self, out: &mut Vec<HostEvent>) -> Result<()> {
        while let Some(event) = self.conn.poll_for_event().context("read X11 event")? {
            self.translate(event, out);
        }
        Ok(())
    }
}

fn argb_visual(screen: &Screen) -> Option<Visualid> {
    screen
        .allowed_depths
        .iter()
        .filter(|depth| depth.depth == 32)
        .flat_map(|depth| depth.visuals.iter())
        .find(|visual| visual.class == VisualClass::TRUE_COLOR)
        .map(|visual| visual.visual_id)
}

fn button_event(e: &ButtonPressEvent) -> ButtonEvent {
    ButtonEvent {
        button: e.detail,
        x_root: e.root_x.into(),
        y_root: e.root_y.into(),
        time: e.time,
        control: u16::from(e.state) & u16::from(KeyButMask::CONTROL) != 0,
    }
}

fn host_err(err: impl std::fmt::Display) -> CaptureError {
    CaptureError::Host(err.to_string())
}

/// Convert 32-bpp BGRX scanlines into opaque straight RGBA.
fn bgrx_to_rgba(id: WindowId, data: &[u8], width: i32, height: i32) -> Result<Vec<u8>, CaptureError> {
    let expected = width as usize * height as usize * 4;
    if data.len() < expected {
        return Err(CaptureError::ShortImage {
            id,
            got: data.len(),
            expected,
        });
    }
    let mut rgba = Vec::with_capacity(expected);
    for pixel in data[..expected].chunks_exact(4) {
        rgba.extend_from_slice(&[pixel[2], pixel[1], pixel[0], 255]);
    }
    Ok(rgba)
}

/// Pick the largest image from a `_NET_WM_ICON` value (repeated
/// `width, height, ARGB pixels...` records).
fn largest_icon(data: &[u32]) -> Option<RgbaImage> {
    let mut best: Option<(u32, u32, &[u32])> = None;
    let mut idx = 0;
    while idx + 2 <= data.len() {
        let width = data[idx];
        let height = data[idx + 1];
        let count = (width as usize).saturating_mul(height as usize);
        if width == 0 || height == 0 || idx + 2 + count > data.len() {
            break;
        }
        let pixels = &data[idx + 2..idx + 2 + count];
        if best.is_none_or(|(w, h, _)| width * height > w * h) {
            best = Some((width, height, pixels));
        }
        idx += 2 + count;
    }

    let (width, height, pixels) = best?;
    let mut bytes = Vec::with_capacity(pixels.len() * 4);
    for pixel in pixels {
        let [b, g, r, a] = pixel.to_le_bytes();
        bytes.extend_from_slice(&[r, g, b, a]);
    }
    RgbaImage::from_raw(width, height, bytes)
}

fn swizzle_rgba_to_bgra(bytes: &mut [u8]) {
    for pixel in bytes.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }
}

fn wait_readable(fd: RawFd, timeout: Duration) {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
    // SAFETY: `pollfd` is a single valid entry that outlives the call.
    let _ = unsafe { libc::poll(&mut pollfd, 1, millis) };
}

fn opacity_cardinal(opacity: f64) -> u32 {
    (opacity.clamp(0.0, 1.0) * f64::from(u32::MAX)).round() as u32
}

impl WindowSystem for X11Host {
    fn list_windows(&self) -> Result<Vec<WindowId>> {
        Ok(self.read_client_list().unwrap_or_default())
    }

    fn window_info(&self, id: WindowId) -> Option<WindowInfo> {
        let geometry = self.geometry(id)?;
        Some(WindowInfo {
            id,
            title: self.title(id),
            pid: self
                .property32(id, self.atoms._NET_WM_PID, AtomEnum::CARDINAL)
                .and_then(|values| values.first().copied()),
            minimized: self.is_minimized(id).unwrap_or(false),
            geometry,
        })
    }

    fn is_minimized(&self, id: WindowId) -> Option<bool> {
        let state = self.property32(id, self.atoms._NET_WM_STATE, AtomEnum::ATOM)?;
        let hidden = state.contains(&self.atoms._NET_WM_STATE_HIDDEN);
        let iconic = self
            .property32(id, self.atoms.WM_STATE, self.atoms.WM_STATE)
            .and_then(|values| values.first().copied())
            == Some(ICONIC_STATE);
        Some(hidden || iconic)
    }

    fn active_window(&self) -> Option<WindowId> {
        self.property32(self.root, self.atoms._NET_ACTIVE_WINDOW, AtomEnum::WINDOW)?
            .first()
            .copied()
            .filter(|&id| id != x11rb::NONE)
    }

    fn window_icon(&self, id: WindowId) -> Option<RgbaImage> {
        let data = self.property32(id, self.atoms._NET_WM_ICON, AtomEnum::CARDINAL)?;
        largest_icon(&data)
    }

    fn window_class(&self, id: WindowId) -> Option<String> {
        let bytes = self.property_bytes(id, AtomEnum::WM_CLASS.into(), AtomEnum::STRING)?;
        let mut parts = bytes
            .split(|&b| b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned());
        let instance = parts.next();
        parts.next().or(instance)
    }

    fn minimize(&self, id: WindowId) -> Result<()> {
        debug!(window = id, "minimize");
        self.send_root_message(id, self.atoms.WM_CHANGE_STATE, [ICONIC_STATE, 0, 0, 0, 0])
    }

    fn unminimize(&self, id: WindowId, time: u32) -> Result<()> {
        debug!(window = id, "unminimize");
        self.conn.map_window(id).context("map window")?;
        self.send_root_message(id, self.atoms._NET_ACTIVE_WINDOW, [SOURCE_PAGER, time, 0, 0, 0])
    }

    fn activate(&self, id: WindowId, time: u32) -> Result<()> {
        debug!(window = id, "activate");
        self.send_root_message(id, self.atoms._NET_ACTIVE_WINDOW, [SOURCE_PAGER, time, 0, 0, 0])
    }

    fn primary_monitor(&self) -> Geometry {
        let monitors = self
            .conn
            .randr_get_monitors(self.root, true)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map(|reply| reply.monitors)
            .unwrap_or_default();
        let monitor = monitors
            .iter()
            .find(|monitor| monitor.primary)
            .or_else(|| monitors.first());
        match monitor {
            Some(monitor) => Geometry {
                x: monitor.x.into(),
                y: monitor.y.into(),
                width: monitor.width.into(),
                height: monitor.height.into(),
            },
            None => Geometry {
                x: 0,
                y: 0,
                width: self.screen_size.0.into(),
                height: self.screen_size.1.into(),
            },
        }
    }

    fn bind_capture(&self, id: WindowId) -> Result<()> {
        let cookie = self
            .conn
            .composite_redirect_window(id, Redirect::AUTOMATIC)
            .context("send composite redirect")?;
        if let Err(err) = cookie.check() {
            debug!(window = id, "composite redirect refused: {err}");
        }
        Ok(())
    }

    fn release_capture(&self, id: WindowId) {
        if let Ok(cookie) = self.conn.composite_unredirect_window(id, Redirect::AUTOMATIC) {
            let _ = cookie.check();
        }
    }

    fn capture(&self, id: WindowId) -> Result<Snapshot, CaptureError> {
        let geom = self
            .conn
            .get_geometry(id)
            .map_err(host_err)?
            .reply()
            .map_err(|_| CaptureError::WindowGone(id))?;
        let (width, height) = (i32::from(geom.width), i32::from(geom.height));
        if width <= 0 || height <= 0 {
            return Ok(Snapshot {
                width,
                height,
                rgba: Vec::new(),
            });
        }

        let pixmap = self.conn.generate_id().map_err(host_err)?;
        let named = self
            .conn
            .composite_name_window_pixmap(id, pixmap)
            .map_err(host_err)?
            .check()
            .is_ok();
        let drawable = if named { pixmap } else { id };
        let image = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, drawable, 0, 0, geom.width, geom.height, !0)
            .map_err(host_err)?
            .reply();
        if named {
            let _ = self.conn.free_pixmap(pixmap);
        }
        let image = image.map_err(host_err)?;

        Ok(Snapshot {
            width,
            height,
            rgba: bgrx_to_rgba(id, &image.data, width, height)?,
        })
    }
}

impl SurfaceHost for X11Host {
    fn create_surface(&self, options: &SurfaceOptions) -> Result<SurfaceId> {
        let window = self.conn.generate_id().context("allocate window id")?;
        let (depth, visual, colormap) = match self.argb {
            Some((visual, colormap)) => (32, visual, colormap),
            None => (self.root_depth, self.root_visual, x11rb::COPY_FROM_PARENT),
        };
        let aux = CreateWindowAux::new()
            .background_pixel(0)
            .border_pixel(0)
            .colormap(colormap)
            .event_mask(
                EventMask::EXPOSURE
                    | EventMask::BUTTON_PRESS
                    | EventMask::BUTTON_RELEASE
                    | EventMask::POINTER_MOTION
                    | EventMask::ENTER_WINDOW
                    | EventMask::LEAVE_WINDOW,
            );
        self.conn
            .create_window(
                depth,
                window,
                self.root,
                options.position.x as i16,
                options.position.y as i16,
                options.size.width as u16,
                options.size.height as u16,
                0,
                WindowClass::INPUT_OUTPUT,
                visual,
                &aux,
            )
            .context("create thumbnail window")?;

        let atoms = &self.atoms;
        let title = options.title.as_bytes();
        self.conn
            .change_property8(PropMode::REPLACE, window, AtomEnum::WM_NAME, AtomEnum::STRING, title)?;
        self.conn
            .change_property8(PropMode::REPLACE, window, atoms._NET_WM_NAME, atoms.UTF8_STRING, title)?;
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            SURFACE_CLASS,
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms._NET_WM_PID,
            AtomEnum::CARDINAL,
            &[std::process::id()],
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms._NET_WM_WINDOW_TYPE,
            AtomEnum::ATOM,
            &[atoms._NET_WM_WINDOW_TYPE_UTILITY],
        )?;
        let mut state = vec![atoms._NET_WM_STATE_SKIP_TASKBAR, atoms._NET_WM_STATE_SKIP_PAGER];
        if options.keep_above {
            state.push(atoms._NET_WM_STATE_ABOVE);
        }
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms._NET_WM_STATE,
            AtomEnum::ATOM,
            &state,
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms._MOTIF_WM_HINTS,
            atoms._MOTIF_WM_HINTS,
            &[MOTIF_HINTS_DECORATIONS, 0, 0, 0, 0],
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms._NET_WM_WINDOW_OPACITY,
            AtomEnum::CARDINAL,
            &[opacity_cardinal(options.opacity)],
        )?;

        let mut size_hints = WmSizeHints::new();
        size_hints.position = Some((
            WmSizeHintsSpecification::UserSpecified,
            options.position.x,
            options.position.y,
        ));
        size_hints.size = Some((
            WmSizeHintsSpecification::UserSpecified,
            options.size.width as i32,
            options.size.height as i32,
        ));
        size_hints
            .set_normal_hints(&self.conn, window)
            .context("set size hints")?;
        let mut wm_hints = WmHints::new();
        wm_hints.input = Some(true);
        wm_hints.set(&self.conn, window).context("set WM hints")?;

        let gc = self.conn.generate_id().context("allocate gc id")?;
        self.conn
            .create_gc(gc, window, &CreateGCAux::new())
            .context("create gc")?;
        self.conn.map_window(window).context("map thumbnail window")?;
        self.conn.flush().context("flush X11 connection")?;

        self.surfaces
            .borrow_mut()
            .insert(window, SurfaceResources { gc, depth });
        debug!(surface = window, title = %options.title, "created thumbnail surface");
        Ok(window)
    }

    fn destroy_surface(&self, surface: SurfaceId) {
        let Some(resources) = self.surfaces.borrow_mut().remove(&surface) else {
            return;
        };
        let _ = self.conn.free_gc(resources.gc);
        let _ = self.conn.destroy_window(surface);
        let _ = self.conn.flush();
    }

    fn present(&self, surface: SurfaceId, frame: &Pixmap) -> Result<()> {
        let surfaces = self.surfaces.borrow();
        let Some(resources) = surfaces.get(&surface) else {
            return Ok(());
        };
        let mut data = frame.data().to_vec();
        swizzle_rgba_to_bgra(&mut data);

        let stride = frame.width() as usize * 4;
        if stride == 0 {
            return Ok(());
        }
        let budget = self.conn.maximum_request_bytes().saturating_sub(64);
        let rows_per_chunk = (budget / stride).max(1);
        for (index, chunk) in data.chunks(rows_per_chunk * stride).enumerate() {
            let rows = chunk.len() / stride;
            let y = index * rows_per_chunk;
            self.conn
                .put_image(
                    ImageFormat::Z_PIXMAP,
                    surface,
                    resources.gc,
                    frame.width() as u16,
                    rows as u16,
                    0,
                    y as i16,
                    0,
                    resources.depth,
                    chunk,
                )
                .context("upload thumbnail frame")?;
        }
        self.conn.flush().context("flush X11 connection")?;
        Ok(())
    }

    fn move_surface(&self, surface: SurfaceId, position: Point) -> Result<()> {
        self.conn
            .configure_window(surface, &ConfigureWindowAux::new().x(position.x).y(position.y))
            .context("move thumbnail")?;
        self.conn.flush()?;
        Ok(())
    }

    fn resize_surface(&self, surface: SurfaceId, size: Size) -> Result<()> {
        self.conn
            .configure_window(
                surface,
                &ConfigureWindowAux::new()
                    .width(size.width)
                    .height(size.height),
            )
            .context("resize thumbnail")?;
        self.conn.flush()?;
        Ok(())
    }

    fn surface_position(&self, surface: SurfaceId) -> Option<Point> {
        let origin = self
            .conn
            .translate_coordinates(surface, self.root, 0, 0)
            .ok()?
            .reply()
            .ok()?;
        Some(Point::new(origin.dst_x.into(), origin.dst_y.into()))
    }

    fn set_opacity(&self, surface: SurfaceId, opacity: f64) -> Result<()> {
        self.conn
            .change_property32(
                PropMode::REPLACE,
                surface,
                self.atoms._NET_WM_WINDOW_OPACITY,
                AtomEnum::CARDINAL,
                &[opacity_cardinal(opacity)],
            )
            .context("set thumbnail opacity")?;
        self.conn.flush()?;
        Ok(())
    }

    fn set_visible(&self, surface: SurfaceId, visible: bool) -> Result<()> {
        if visible {
            self.conn.map_window(surface).context("map thumbnail")?;
        } else {
            self.conn.unmap_window(surface).context("unmap thumbnail")?;
        }
        self.conn.flush()?;
        Ok(())
    }

    fn set_keep_above(&self, surface: SurfaceId, keep_above: bool) -> Result<()> {
        let action = if keep_above { STATE_ADD } else { STATE_REMOVE };
        self.send_root_message(
            surface,
            self.atoms._NET_WM_STATE,
            [action, self.atoms._NET_WM_STATE_ABOVE, 0, SOURCE_APPLICATION, 0],
        )
    }

    fn begin_move_drag(&self, surface: SurfaceId, button: u8, origin: Point, time: u32) -> Result<()> {
        self.conn.ungrab_pointer(time).context("release pointer grab")?;
        self.send_root_message(
            surface,
            self.atoms._NET_WM_MOVERESIZE,
            [
                origin.x as u32,
                origin.y as u32,
                MOVERESIZE_MOVE,
                u32::from(button),
                SOURCE_APPLICATION,
            ],
        )
    }
}

impl EventSource for X11Host {
    fn wait_events(&mut self, timeout: Duration) -> Result<Vec<HostEvent>> {
        let mut events = Vec::new();
        self.drain_events(&mut events)?;
        if events.is_empty() {
            self.conn.flush().context("flush X11 connection")?;
            wait_readable(self.conn.stream().as_raw_fd(), timeout);
            self.drain_events(&mut events)?;
        }
        Ok(events)
    }
}
