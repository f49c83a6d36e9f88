//! Requesting authentication tokens for an open DRM device.
//!
//! The compositor only honors requests on a device it has authorized, and the
//! proof is an opaque token generated against the client's open descriptor.
//! The kernel primitive that mints the token lives behind [`AuthTokenSource`]
//! so the handshake can run against hardware-free stand-ins in tests.

use std::os::unix::io::{AsRawFd, BorrowedFd};

use nix::errno::Errno;

/// An error which may occur while requesting an authentication token.
#[derive(Debug, thiserror::Error)]
pub enum AuthTokenError {
    /// The device did not issue an authentication token.
    #[error("The device did not issue an authentication token")]
    Token(Errno),
}

impl From<Errno> for AuthTokenError {
    fn from(err: Errno) -> Self {
        Self::Token(err)
    }
}

/// Produces one-shot authentication tokens for an open device descriptor.
pub trait AuthTokenSource {
    /// Requests a token suitable for a single `wl_drm.authenticate` exchange.
    fn request_token(&mut self, fd: BorrowedFd<'_>) -> Result<u32, AuthTokenError>;
}

/// Token source backed by the kernel's legacy magic-cookie exchange.
///
/// This is the `drmGetMagic` path: the kernel ties a fresh cookie to the
/// descriptor, and the compositor later validates that same cookie through
/// `drmAuthMagic` on its master descriptor.
#[derive(Debug, Default)]
pub struct MagicCookieSource;

impl AuthTokenSource for MagicCookieSource {
    fn request_token(&mut self, fd: BorrowedFd<'_>) -> Result<u32, AuthTokenError> {
        let auth = drm_ffi::auth::get_magic_token(fd.as_raw_fd())?;
        Ok(auth.magic)
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::io::AsFd;

    use super::{AuthTokenError, AuthTokenSource, MagicCookieSource};

    #[test]
    fn non_drm_device_yields_no_token() {
        // /dev/null is a character device but does not speak the DRM ioctls.
        let file = std::fs::File::open("/dev/null").unwrap();
        let mut source = MagicCookieSource;
        let err = source.request_token(file.as_fd()).unwrap_err();
        assert!(matches!(err, AuthTokenError::Token(_)));
    }
}
