//! Event handlers for the handshake.
//!
//! All callbacks run synchronously inside the blocking round-trip that the
//! orchestrator drives, on the same thread; there is no concurrent invocation
//! to guard against. The handlers only record facts on the state struct, the
//! orchestrator draws the conclusions after each round-trip returns.

use slog::{debug, error, trace};
use wayland_client::{
    protocol::wl_registry::{self, WlRegistry},
    Connection, Dispatch, QueueHandle,
};

use super::{HandshakeState, WL_DRM_GLOBAL};
use crate::device::{AuthType, DeviceState};
use crate::protocol::wl_drm::{self, WlDrm};

impl Dispatch<WlRegistry, ()> for HandshakeState {
    fn event(
        state: &mut Self,
        _registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        {
            if interface == WL_DRM_GLOBAL {
                debug!(state.log, "compositor advertises {}", interface;
                       "name" => name, "version" => version);
                state.drm_global = Some((name, version));
            }
        }
    }
}

impl Dispatch<WlDrm, ()> for HandshakeState {
    fn event(
        state: &mut Self,
        drm: &WlDrm,
        event: wl_drm::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_drm::Event::Device { name } => state.handle_device(drm, &name),
            wl_drm::Event::Format { format } => {
                // Format advertisements are for buffer export, which this
                // handshake does not do.
                trace!(state.log, "ignoring format advertisement"; "format" => format);
            }
            wl_drm::Event::Authenticated => {
                debug!(state.log, "compositor confirmed authentication");
                state.authenticated = true;
                if let Some(device) = state.device.as_mut() {
                    device.set_auth_type(AuthType::Custom);
                }
            }
            wl_drm::Event::Capabilities { value } => {
                trace!(state.log, "ignoring capabilities"; "value" => value);
            }
        }
    }
}

impl HandshakeState {
    /// The compositor named its device; open it and send the token back.
    ///
    /// Every failure here is logged and leaves `self.device` unset, which the
    /// orchestrator detects once the round-trip returns.
    fn handle_device(&mut self, drm: &WlDrm, path: &str) {
        use std::os::unix::io::AsFd;

        debug!(self.log, "compositor uses drm device {}", path);

        let device = match DeviceState::open(path) {
            Ok(device) => device,
            Err(err) => {
                error!(self.log, "failed to open {}: {}", path, err);
                return;
            }
        };

        let token = match self.authenticator.request_token(device.as_fd()) {
            Ok(token) => token,
            Err(err) => {
                error!(self.log, "no authentication token for {}: {}", path, err);
                return;
            }
        };

        drm.authenticate(token);
        self.device = Some(device);
    }
}
