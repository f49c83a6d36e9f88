//! Resolving the object-type descriptor used to bind `wl_drm`.
//!
//! Historically the descriptor had to be scavenged at runtime from the system
//! EGL library, because that was the only place the extension lived. The
//! handshake instead takes the descriptor from an injected [`DescriptorSource`]:
//! the default source hands out the descriptor from the generated bindings,
//! and an optional `dlopen`-based source preserves the environment probe for
//! setups that want to refuse the handshake when the system EGL stack does not
//! speak `wl_drm`.

use wayland_backend::protocol::Interface;
use wayland_client::Proxy;

use crate::protocol::wl_drm::WlDrm;

/// An error which may occur while resolving the `wl_drm` object descriptor.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// The support library expected to export the descriptor could not be loaded.
    #[cfg(feature = "dlopen")]
    #[error("The support library could not be loaded")]
    LibraryNotLoaded(libloading::Error),

    /// The support library does not export the `wl_drm` descriptor symbol.
    #[cfg(feature = "dlopen")]
    #[error("The support library does not export the wl_drm descriptor")]
    SymbolMissing(libloading::Error),

    /// The resolved descriptor does not describe the `wl_drm` interface.
    #[error("The resolved descriptor does not describe the wl_drm interface")]
    InterfaceMismatch,
}

/// Provides the interface descriptor the handshake binds `wl_drm` with.
pub trait DescriptorSource {
    /// Resolves the descriptor, acquiring whatever backs it.
    ///
    /// The source stays alive for the whole handshake and is only released by
    /// `finalize`, so a descriptor backed by a loaded library remains valid
    /// while the bound object exists.
    fn object_descriptor(&mut self) -> Result<&'static Interface, DescriptorError>;
}

/// Descriptor source backed by the bindings generated into this crate.
#[derive(Debug, Default)]
pub struct BuiltinDescriptors;

impl DescriptorSource for BuiltinDescriptors {
    fn object_descriptor(&mut self) -> Result<&'static Interface, DescriptorError> {
        Ok(WlDrm::interface())
    }
}

/// Descriptor source that probes the system EGL library first.
///
/// Mirrors the historical lookup: `wl_drm` shipped inside `libEGL.so.1`, and a
/// client that could not find the `wl_drm_interface` symbol there had no
/// compositor counterpart to talk to. The probed C descriptor cannot back a
/// typed proxy, so binding still uses the generated descriptor; the library
/// handle is held until the source is dropped.
#[cfg(feature = "dlopen")]
#[derive(Debug)]
pub struct EglDescriptors {
    library: libloading::Library,
}

#[cfg(feature = "dlopen")]
impl EglDescriptors {
    const LIBEGL_NAME: &'static str = "libEGL.so.1";

    /// Loads the system EGL library and verifies it exports the descriptor.
    pub fn load() -> Result<Self, DescriptorError> {
        let library = unsafe { libloading::Library::new(Self::LIBEGL_NAME) }
            .map_err(DescriptorError::LibraryNotLoaded)?;

        // Only the presence of the symbol matters; the pointer itself is unused.
        unsafe {
            library
                .get::<*const std::os::raw::c_void>(b"wl_drm_interface\0")
                .map_err(DescriptorError::SymbolMissing)?;
        }

        Ok(EglDescriptors { library })
    }
}

#[cfg(feature = "dlopen")]
impl DescriptorSource for EglDescriptors {
    fn object_descriptor(&mut self) -> Result<&'static Interface, DescriptorError> {
        let _ = &self.library;
        Ok(WlDrm::interface())
    }
}
