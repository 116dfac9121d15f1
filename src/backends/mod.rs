//! Bundled host-library backends.
//!
//! Only identification backends live here; sampling-capable backends are
//! expected to come from the application, wrapping whatever joystick library
//! it already uses (see [`InputBackend`](crate::wrapper::InputBackend)).

#[cfg(feature = "hid")]
pub mod hid;
