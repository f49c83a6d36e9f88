//! Mapping the kernel driver behind a device to a logical driver name.

use std::os::unix::ffi::OsStrExt;

use drm::Device as _;
use drm::SystemError;

use crate::device::DeviceState;

/// An error which may occur while resolving the logical driver name.
#[derive(Debug, thiserror::Error)]
pub enum DriverNameError {
    /// Querying the kernel driver identity failed.
    #[error("Querying the kernel driver identity failed")]
    Identity(SystemError),

    /// The kernel driver matches no known logical driver.
    #[error("Unknown kernel driver \"{0}\"")]
    UnknownDriver(String),

    /// The handshake no longer owns an open device to query.
    #[error("No open device to query")]
    DeviceClosed,
}

impl From<SystemError> for DriverNameError {
    fn from(err: SystemError) -> Self {
        Self::Identity(err)
    }
}

struct DriverNameMapping {
    key: &'static str,
    name: &'static str,
}

// Scanned in declaration order; the order encodes deliberate precedence
// between kernel drivers whose prefixes could otherwise collide.
const DRIVER_NAME_TABLE: &[DriverNameMapping] = &[
    DriverNameMapping {
        key: "i915",
        name: "i965", // Intel OTC GenX driver
    },
    DriverNameMapping {
        key: "pvrsrvkm",
        name: "pvr", // Intel UMG PVR driver
    },
    DriverNameMapping {
        key: "emgd",
        name: "emgd", // Intel ECG PVR driver
    },
];

fn lookup(identity: &[u8]) -> Option<&'static str> {
    DRIVER_NAME_TABLE
        .iter()
        .find(|mapping| identity.starts_with(mapping.key.as_bytes()))
        .map(|mapping| mapping.name)
}

/// Resolves the logical driver name for an open device.
///
/// Queries the kernel for the driver identity string and scans the static
/// name table with a prefix match, first match winning. The name is what a
/// caller feeds into its own driver loading, e.g. `"i965"` for any `i915`
/// kernel device.
pub fn resolve_driver_name(device: &DeviceState) -> Result<String, DriverNameError> {
    let driver = device.get_driver().map_err(DriverNameError::Identity)?;
    let identity = driver.name();

    match lookup(identity.as_bytes()) {
        Some(name) => Ok(name.to_owned()),
        None => Err(DriverNameError::UnknownDriver(
            identity.to_string_lossy().into_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::lookup;

    #[test]
    fn known_prefixes_resolve() {
        assert_eq!(lookup(b"i915"), Some("i965"));
        assert_eq!(lookup(b"i915 DRM driver"), Some("i965"));
        assert_eq!(lookup(b"pvrsrvkm"), Some("pvr"));
        assert_eq!(lookup(b"emgd"), Some("emgd"));
    }

    #[test]
    fn unknown_identity_fails() {
        assert_eq!(lookup(b"radeon"), None);
        assert_eq!(lookup(b""), None);
        // A strict prefix of a key is not a match.
        assert_eq!(lookup(b"i91"), None);
    }
}
