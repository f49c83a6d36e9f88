//! The `wl_drm` acquisition-and-authorization handshake.
//!
//! The protocol is asynchronous, but a client needs a synchronous yes/no
//! before it can use the device. [`DrmHandshake::initialize`] converts the
//! event stream into a two-step rendezvous: one blocking round-trip to receive
//! the device path (and send the authentication token back), and a second one
//! to receive the authentication confirmation. Failure at any step is terminal
//! for the handshake; the caller abandons it and every acquired resource is
//! released.
//!
//! There is deliberately no timeout: a round-trip blocks until the compositor
//! has processed everything sent so far, and an unresponsive compositor blocks
//! initialization indefinitely. Callers that cannot accept that must wrap the
//! call themselves.

mod handlers;

use slog::{debug, info, o, Logger};
use wayland_backend::protocol::same_interface;
use wayland_client::{Connection, DispatchError, EventQueue, Proxy};

use crate::auth::{AuthTokenSource, MagicCookieSource};
use crate::descriptor::{BuiltinDescriptors, DescriptorError, DescriptorSource};
use crate::device::DeviceState;
use crate::driver::{self, DriverNameError};
use crate::protocol::wl_drm::WlDrm;

/// The global name the compositor advertises the protocol object under.
const WL_DRM_GLOBAL: &str = "wl_drm";

/// The interface version the handshake binds. Version 1 carries everything the
/// handshake needs; later versions only add buffer-export capabilities.
const WL_DRM_BIND_VERSION: u32 = 1;

/// An error emitted while establishing the device handshake.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// The compositor does not advertise a `wl_drm` global.
    #[error("The compositor does not advertise a wl_drm global")]
    GlobalNotAdvertised,

    /// The `wl_drm` object descriptor could not be resolved.
    #[error("The wl_drm object descriptor could not be resolved")]
    Descriptor(DescriptorError),

    /// Dispatching events on the connection failed.
    #[error("Dispatching events on the connection failed")]
    Dispatch(DispatchError),

    /// The compositor never named a device node this client could open.
    #[error("The compositor never named a device node this client could open")]
    DeviceNotOpened,

    /// The compositor did not confirm authentication.
    #[error("The compositor did not confirm authentication")]
    NotAuthenticated,
}

impl From<DescriptorError> for HandshakeError {
    fn from(err: DescriptorError) -> Self {
        Self::Descriptor(err)
    }
}

impl From<DispatchError> for HandshakeError {
    fn from(err: DispatchError) -> Self {
        Self::Dispatch(err)
    }
}

/// Progress of the handshake.
///
/// Transitions are driven exclusively by the orchestrator after each blocking
/// round-trip returns; the event handlers only record what the compositor
/// said.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No protocol object has been bound yet.
    Unbound,
    /// The protocol object is bound, the device is not yet known.
    Bound,
    /// The device node is open and the token has been sent.
    DeviceKnown,
    /// The compositor has confirmed authentication.
    Authorized,
    /// A round-trip completed without producing its expected side effect.
    Failed,
}

pub(crate) struct HandshakeState {
    phase: Phase,
    /// Registry name and advertised version of the `wl_drm` global.
    drm_global: Option<(u32, u32)>,
    drm: Option<WlDrm>,
    device: Option<DeviceState>,
    authenticated: bool,
    descriptors: Option<Box<dyn DescriptorSource>>,
    authenticator: Box<dyn AuthTokenSource>,
    log: Logger,
}

impl HandshakeState {
    fn release(&mut self) {
        // Everything is checked for presence, so this is safe to run after a
        // partially failed initialize and safe to run more than once.
        if let Some(drm) = self.drm.take() {
            // wl_drm has no destructor request; dropping the proxy handle is
            // the whole teardown on the client side.
            drop(drm);
        }
        self.authenticated = false;
        if let Some(descriptors) = self.descriptors.take() {
            drop(descriptors);
        }
        if let Some(device) = self.device.take() {
            drop(device);
        }
    }
}

/// An established (or in-progress) `wl_drm` device handshake.
///
/// A successful [`initialize`](DrmHandshake::initialize) leaves the device
/// open and authorized; [`driver_name`](DrmHandshake::driver_name) is then
/// available as a query and [`finalize`](DrmHandshake::finalize) releases
/// everything.
pub struct DrmHandshake {
    queue: EventQueue<HandshakeState>,
    state: HandshakeState,
}

impl std::fmt::Debug for DrmHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrmHandshake")
            .field("phase", &self.state.phase)
            .field("authenticated", &self.state.authenticated)
            .finish_non_exhaustive()
    }
}

impl DrmHandshake {
    /// Runs the handshake with the default descriptor source and the kernel
    /// magic-cookie authenticator.
    pub fn initialize<L>(conn: &Connection, logger: L) -> Result<DrmHandshake, HandshakeError>
    where
        L: Into<Option<Logger>>,
    {
        Self::initialize_with(conn, BuiltinDescriptors, MagicCookieSource, logger)
    }

    /// Runs the handshake with explicit descriptor and token sources.
    ///
    /// Blocks for two synchronization round-trips with the compositor (three
    /// if the `wl_drm` global is advertised late). On error all partially
    /// acquired resources have already been released.
    pub fn initialize_with<D, A, L>(
        conn: &Connection,
        descriptors: D,
        authenticator: A,
        logger: L,
    ) -> Result<DrmHandshake, HandshakeError>
    where
        D: DescriptorSource + 'static,
        A: AuthTokenSource + 'static,
        L: Into<Option<Logger>>,
    {
        let log = crate::slog_or_fallback(logger).new(o!("wldrm_module" => "handshake"));

        let mut queue = conn.new_event_queue();
        let qh = queue.handle();

        let mut state = HandshakeState {
            phase: Phase::Unbound,
            drm_global: None,
            drm: None,
            device: None,
            authenticated: false,
            descriptors: None,
            authenticator: Box::new(authenticator),
            log: log.clone(),
        };

        let registry = conn.display().get_registry(&qh, ());

        // Populate the registry view, then retry the lookup exactly once for
        // a compositor that advertises the global late.
        let global = discover_global(&log, || {
            queue.roundtrip(&mut state)?;
            Ok::<_, DispatchError>(state.drm_global)
        })?;
        let (name, version) = match global {
            Some(global) => global,
            None => return Err(HandshakeError::GlobalNotAdvertised),
        };

        let mut descriptors: Box<dyn DescriptorSource> = Box::new(descriptors);
        let descriptor = descriptors.object_descriptor()?;
        if !same_interface(descriptor, WlDrm::interface()) {
            return Err(DescriptorError::InterfaceMismatch.into());
        }
        state.descriptors = Some(descriptors);

        // Binding registers the event handlers; the state struct itself is
        // the listener.
        let drm: WlDrm = registry.bind(name, WL_DRM_BIND_VERSION.min(version), &qh, ());
        state.drm = Some(drm);
        state.phase = Phase::Bound;

        // First rendezvous: the device event must have fired and the node
        // must have been opened, or there is nothing to authorize.
        queue.roundtrip(&mut state)?;
        if state.device.is_none() {
            state.phase = Phase::Failed;
            state.release();
            return Err(HandshakeError::DeviceNotOpened);
        }
        state.phase = Phase::DeviceKnown;

        // Second rendezvous: the compositor has now seen the token and must
        // have confirmed it.
        queue.roundtrip(&mut state)?;
        if !state.authenticated {
            state.phase = Phase::Failed;
            state.release();
            return Err(HandshakeError::NotAuthenticated);
        }
        state.phase = Phase::Authorized;

        info!(log, "drm device handshake complete");
        Ok(DrmHandshake { queue, state })
    }

    /// Current phase of the handshake.
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Whether the compositor has confirmed authentication.
    pub fn is_authenticated(&self) -> bool {
        self.state.authenticated
    }

    /// The open, authorized device, if the handshake still owns one.
    pub fn device(&self) -> Option<&DeviceState> {
        self.state.device.as_ref()
    }

    /// Resolves the logical driver name for the authorized device.
    pub fn driver_name(&self) -> Result<String, DriverNameError> {
        match self.state.device {
            Some(ref device) => driver::resolve_driver_name(device),
            None => Err(DriverNameError::DeviceClosed),
        }
    }

    /// Drives one extra synchronization round with the compositor.
    ///
    /// Not needed for the handshake itself; useful for consumers that want
    /// late `format`/`capabilities` traffic flushed out.
    pub fn roundtrip(&mut self) -> Result<(), HandshakeError> {
        self.queue.roundtrip(&mut self.state)?;
        Ok(())
    }

    /// Releases the bound protocol object, the descriptor source and the
    /// device descriptor.
    ///
    /// Idempotent: every resource is checked for presence, so calling this
    /// twice, or after a failed initialize, is harmless. Also invoked on drop.
    pub fn finalize(&mut self) {
        self.state.release();
        self.state.phase = Phase::Unbound;
    }
}

impl Drop for DrmHandshake {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// Looks the `wl_drm` global up in the registry view, driving synchronization
/// rounds through `sync_round`.
///
/// `sync_round` performs one blocking round-trip and reports the global as
/// advertised so far. It is called at most twice: once to populate the view,
/// and exactly once more if the global was not there yet.
fn discover_global<E>(
    log: &Logger,
    mut sync_round: impl FnMut() -> Result<Option<(u32, u32)>, E>,
) -> Result<Option<(u32, u32)>, E> {
    if let Some(global) = sync_round()? {
        return Ok(Some(global));
    }
    debug!(log, "{} not advertised yet, retrying once", WL_DRM_GLOBAL);
    sync_round()
}
