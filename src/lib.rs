//! Client-side negotiation of direct rendering access on Wayland.
//!
//! Compositors that render through DRM advertise a `wl_drm` global naming the
//! device node they use. Before a client may do hardware-accelerated work on
//! that device it has to open the node and prove to the compositor that it is
//! allowed to, by exchanging an authentication token. This crate implements
//! that acquisition-and-authorization sequence and nothing after it: no
//! rendering, no buffer sharing.
//!
//! The entry point is [`DrmHandshake::initialize`], which blocks until the
//! compositor has either confirmed authorization or the handshake has failed:
//!
//! ```no_run
//! use wayland_client::Connection;
//! use wayland_drm_client::DrmHandshake;
//!
//! let conn = Connection::connect_to_env().unwrap();
//! let handshake = DrmHandshake::initialize(&conn, None).unwrap();
//! let driver = handshake.driver_name().unwrap();
//! println!("loading driver {}", driver);
//! ```
//!
//! The pieces with side effects (the kernel token primitive and the
//! object-descriptor lookup) are injectable through
//! [`auth::AuthTokenSource`] and [`descriptor::DescriptorSource`], which is
//! how the test suite runs the full handshake against a fake compositor.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod auth;
pub mod descriptor;
pub mod device;
pub mod driver;
pub mod handshake;
pub mod protocol;

pub use auth::{AuthTokenSource, MagicCookieSource};
pub use descriptor::{BuiltinDescriptors, DescriptorSource};
pub use device::{AuthType, DeviceState};
pub use driver::{resolve_driver_name, DriverNameError};
pub use handshake::{DrmHandshake, HandshakeError, Phase};

fn slog_or_fallback<L>(logger: L) -> ::slog::Logger
where
    L: Into<Option<::slog::Logger>>,
{
    use slog::Drain;
    logger
        .into()
        .unwrap_or_else(|| ::slog::Logger::root(::slog_stdlog::StdLog.fuse(), slog::o!()))
}
