//! Client bindings for the `wl_drm` protocol extension.
//!
//! `wl_drm` is the legacy Mesa extension through which a compositor names the
//! DRM device it renders with and validates a client's authentication token
//! for it. The interface definition is vendored from Mesa under
//! `protocols/wayland-drm.xml` and run through `wayland-scanner` at compile
//! time.
//!
//! Only the `authenticate` request and the `device`/`format`/`authenticated`
//! events are exercised by this crate; the buffer-creation requests exist on
//! the generated proxy but nothing here issues them.

pub use generated::wl_drm;

mod generated {
    // The generated code tends to trigger a lot of warnings
    // so we isolate it into a very permissive module
    #![allow(dead_code, non_camel_case_types, unused_unsafe, unused_variables)]
    #![allow(non_upper_case_globals, non_snake_case, unused_imports)]
    #![allow(missing_docs, clippy::all)]

    use wayland_client;
    use wayland_client::protocol::*;

    pub mod __interfaces {
        use wayland_client::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("protocols/wayland-drm.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_client_code!("protocols/wayland-drm.xml");
}
