//! Runs the full handshake against an in-process compositor.
//!
//! The compositor side is a minimal `wl_drm` implementation generated from the
//! same protocol XML as the client bindings, served over a `UnixStream` pair
//! on a background thread. Device paths point at real filesystem nodes
//! (`/dev/null` is a character device everywhere), and the token primitive is
//! injected, so no DRM hardware is involved.

use std::io::Write as _;
use std::os::unix::io::BorrowedFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use wayland_client::Connection;
use wayland_drm_client::auth::{AuthTokenError, AuthTokenSource, MagicCookieSource};
use wayland_drm_client::{BuiltinDescriptors, DrmHandshake, DriverNameError, HandshakeError, Phase};

use server_protocol::wl_drm::{self, WlDrm};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New};

mod server_protocol {
    #![allow(dead_code, non_camel_case_types, unused_unsafe, unused_variables)]
    #![allow(non_upper_case_globals, non_snake_case, unused_imports)]
    #![allow(missing_docs, clippy::all)]

    use wayland_server;
    use wayland_server::protocol::*;

    pub mod __interfaces {
        use wayland_server::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("protocols/wayland-drm.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_server_code!("protocols/wayland-drm.xml");
}

fn logger() -> slog::Logger {
    use slog::Drain;
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build();
    let drain = std::sync::Mutex::new(drain).fuse();
    slog::Logger::root(drain, slog::o!())
}

/// Token source that hands out a fixed token without touching the kernel.
struct FixedToken(u32);

impl AuthTokenSource for FixedToken {
    fn request_token(&mut self, _fd: BorrowedFd<'_>) -> Result<u32, AuthTokenError> {
        Ok(self.0)
    }
}

struct ServerState;

#[derive(Clone)]
struct DrmGlobalConfig {
    device_path: String,
    grant_auth: bool,
    received_token: Arc<Mutex<Option<u32>>>,
}

impl GlobalDispatch<WlDrm, DrmGlobalConfig> for ServerState {
    fn bind(
        _state: &mut Self,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<WlDrm>,
        global_data: &DrmGlobalConfig,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let drm = data_init.init(resource, global_data.clone());
        drm.device(global_data.device_path.clone());
        // Mesa's server advertises its formats right after the device.
        drm.format(wl_drm::Format::Argb8888 as u32);
        drm.format(wl_drm::Format::Xrgb8888 as u32);
    }
}

impl Dispatch<WlDrm, DrmGlobalConfig> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        drm: &WlDrm,
        request: wl_drm::Request,
        data: &DrmGlobalConfig,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_drm::Request::Authenticate { id } => {
                *data.received_token.lock().unwrap() = Some(id);
                if data.grant_auth {
                    drm.authenticated();
                }
            }
            // The buffer-creation requests are never issued by the handshake.
            _ => unreachable!(),
        }
    }
}

struct NoopClientData;

impl wayland_server::backend::ClientData for NoopClientData {
    fn initialized(&self, _client_id: wayland_server::backend::ClientId) {}
    fn disconnected(
        &self,
        _client_id: wayland_server::backend::ClientId,
        _reason: wayland_server::backend::DisconnectReason,
    ) {
    }
}

struct Compositor {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    received_token: Arc<Mutex<Option<u32>>>,
}

impl Compositor {
    /// Spawns a compositor thread serving one client over a socket pair.
    ///
    /// `device_path: None` leaves the `wl_drm` global out entirely.
    fn spawn(device_path: Option<&str>, grant_auth: bool) -> (Compositor, UnixStream) {
        let (client_stream, server_stream) = UnixStream::pair().unwrap();
        let received_token = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let config = device_path.map(|path| DrmGlobalConfig {
            device_path: path.to_owned(),
            grant_auth,
            received_token: received_token.clone(),
        });

        let run = running.clone();
        let thread = std::thread::spawn(move || {
            let mut display = wayland_server::Display::<ServerState>::new().unwrap();
            let mut dh = display.handle();

            if let Some(config) = config {
                dh.create_global::<ServerState, WlDrm, _>(1, config);
            }
            dh.insert_client(server_stream, Arc::new(NoopClientData)).unwrap();

            let mut state = ServerState;
            while run.load(Ordering::SeqCst) {
                if display.dispatch_clients(&mut state).is_err() {
                    break;
                }
                if display.flush_clients().is_err() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        });

        (
            Compositor {
                running,
                thread: Some(thread),
                received_token,
            },
            client_stream,
        )
    }

    fn received_token(&self) -> Option<u32> {
        *self.received_token.lock().unwrap()
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[test]
fn handshake_succeeds_against_char_device() {
    let (compositor, stream) = Compositor::spawn(Some("/dev/null"), true);
    let conn = Connection::from_socket(stream).unwrap();

    let mut handshake =
        DrmHandshake::initialize_with(&conn, BuiltinDescriptors, FixedToken(42), logger()).unwrap();

    assert_eq!(handshake.phase(), Phase::Authorized);
    assert!(handshake.is_authenticated());
    assert_eq!(compositor.received_token(), Some(42));

    let device = handshake.device().expect("device must stay open");
    assert_eq!(device.auth_type(), wayland_drm_client::AuthType::Custom);

    // An extra synchronization round after the handshake is a no-op.
    handshake.roundtrip().unwrap();
    assert_eq!(handshake.phase(), Phase::Authorized);
    assert!(handshake.is_authenticated());
}

#[test]
fn regular_file_fails_before_authentication() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"not a device").unwrap();
    let path = file.path().to_str().unwrap().to_owned();

    let (compositor, stream) = Compositor::spawn(Some(&path), true);
    let conn = Connection::from_socket(stream).unwrap();

    let err = DrmHandshake::initialize_with(&conn, BuiltinDescriptors, FixedToken(42), logger())
        .unwrap_err();

    assert!(matches!(err, HandshakeError::DeviceNotOpened));
    // The device never opened, so no token was ever sent.
    assert_eq!(compositor.received_token(), None);
}

#[test]
fn token_failure_counts_as_unopened_device() {
    // /dev/null is a character device but refuses the DRM magic ioctl, so the
    // real token source fails and the device must be treated as never opened.
    let (compositor, stream) = Compositor::spawn(Some("/dev/null"), true);
    let conn = Connection::from_socket(stream).unwrap();

    let err = DrmHandshake::initialize_with(&conn, BuiltinDescriptors, MagicCookieSource, logger())
        .unwrap_err();

    assert!(matches!(err, HandshakeError::DeviceNotOpened));
    assert_eq!(compositor.received_token(), None);
}

#[test]
fn missing_global_fails_after_retry() {
    let (_compositor, stream) = Compositor::spawn(None, true);
    let conn = Connection::from_socket(stream).unwrap();

    let err = DrmHandshake::initialize_with(&conn, BuiltinDescriptors, FixedToken(42), logger())
        .unwrap_err();

    assert!(matches!(err, HandshakeError::GlobalNotAdvertised));
}

#[test]
fn withheld_confirmation_fails_after_second_roundtrip() {
    let (compositor, stream) = Compositor::spawn(Some("/dev/null"), false);
    let conn = Connection::from_socket(stream).unwrap();

    let err = DrmHandshake::initialize_with(&conn, BuiltinDescriptors, FixedToken(7), logger())
        .unwrap_err();

    assert!(matches!(err, HandshakeError::NotAuthenticated));
    // The token did go out; only the confirmation was withheld.
    assert_eq!(compositor.received_token(), Some(7));
}

#[test]
fn finalize_is_idempotent() {
    let (_compositor, stream) = Compositor::spawn(Some("/dev/null"), true);
    let conn = Connection::from_socket(stream).unwrap();

    let mut handshake =
        DrmHandshake::initialize_with(&conn, BuiltinDescriptors, FixedToken(42), logger()).unwrap();

    handshake.finalize();
    handshake.finalize();

    assert_eq!(handshake.phase(), Phase::Unbound);
    assert!(!handshake.is_authenticated());
    assert!(handshake.device().is_none());
    assert!(matches!(
        handshake.driver_name(),
        Err(DriverNameError::DeviceClosed)
    ));
}
