//! State of the DRM device node named by the compositor.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsFd, BorrowedFd};

use nix::errno::Errno;
use nix::sys::stat::{stat, SFlag};

/// How the device descriptor was authorized with the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// The descriptor has not been authorized yet.
    None,
    /// Authorized through the compositor's own authentication exchange.
    Custom,
}

/// An error which may occur when opening the device node named by the compositor.
#[derive(Debug, thiserror::Error)]
pub enum OpenDeviceError {
    /// The device node could not be identified.
    #[error("The device node could not be identified")]
    Stat(Errno),

    /// The path does not name a character device.
    #[error("The path does not name a character device")]
    NotCharDevice,

    /// The device node could not be opened for reading and writing.
    #[error("The device node could not be opened")]
    Open(io::Error),
}

impl From<Errno> for OpenDeviceError {
    fn from(err: Errno) -> Self {
        Self::Stat(err)
    }
}

impl From<io::Error> for OpenDeviceError {
    fn from(err: io::Error) -> Self {
        Self::Open(err)
    }
}

/// An open DRM device node together with its authorization tag.
///
/// Holds the device open for as long as it exists; dropping it closes the
/// descriptor. Created by the handshake when the compositor names a device,
/// and released by [`finalize`](crate::DrmHandshake::finalize).
#[derive(Debug)]
pub struct DeviceState {
    file: File,
    auth: AuthType,
}

impl DeviceState {
    /// Opens the device node at `path` for read-write access.
    ///
    /// The path must name an existing character-special file. Anything else is
    /// rejected before the open is attempted, mirroring the checks compositors
    /// expect their clients to perform.
    pub fn open(path: &str) -> Result<DeviceState, OpenDeviceError> {
        let stat_buf = stat(path).map_err(OpenDeviceError::Stat)?;

        // Extract the file type code with S_IFMT and require a character device.
        let flags = SFlag::from_bits_truncate(stat_buf.st_mode);
        if (flags & SFlag::S_IFMT) != SFlag::S_IFCHR {
            return Err(OpenDeviceError::NotCharDevice);
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(DeviceState {
            file,
            auth: AuthType::None,
        })
    }

    /// Returns how this device was authorized, if at all.
    pub fn auth_type(&self) -> AuthType {
        self.auth
    }

    pub(crate) fn set_auth_type(&mut self, auth: AuthType) {
        self.auth = auth;
    }
}

impl AsFd for DeviceState {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl drm::Device for DeviceState {}
