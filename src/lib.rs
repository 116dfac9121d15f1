#![cfg_attr(docsrs, feature(doc_cfg))]
//! `padmap`: a queryable game-controller mapping database.
//!
//! Padmap compiles a human-written text description of logical input
//! vocabularies ("interfaces" such as `basic_gamepad.a`), display labels with
//! colors and icon glyphs, and devices identified by USB HID vendor/product
//! ids into an in-memory database. Given a concrete device and a set of
//! runtime config tags it resolves the exhaustive bindings from interface
//! inputs to physical inputs (buttons, hats, absolute and relative axes),
//! each with a display label.
//!
//! Padmap focuses on **mapping resolution**. It does not read devices itself:
//! wire it to whatever joystick library you already use through
//! [`InputBackend`].
//!
//! # Quick start
//! ```no_run
//! use padmap::{HidIds, MappingsDb};
//!
//! let mut db = MappingsDb::new();
//! db.set_global_tags(["linux", "sdl"]);
//! db.parse_default(Some(&mut std::io::stderr())).expect("load database");
//!
//! let pad = db.device(HidIds::new(0x054c, 0x0268));
//! if !pad.is_empty() {
//!     println!("{}", pad.name());
//!     for (hash, infos) in pad.iter() {
//!         println!("  {} -> {:?}", db.string_from_hash(hash), infos.bindings);
//!     }
//! }
//! ```
//!
//! # Database text
//! Four top-level blocks; newlines are significant, `#` starts a comment.
//! ```text
//! interfaces { gp { btn: a b
//!                   abs: lsx } }
//! icons { psx_cross "✕" }
//! labels { psx { gp.a "$psx_cross Cross" 7d7ef8 } }
//! devices {
//!     054c.0268 {
//!         name = "DualShock 3"
//!         interfaces = gp
//!         labels = psx
//!         default: gp.a = b14
//!         gp.lsx = a0
//!         xinput: { gp.a = b0 }
//!     }
//! }
//! ```
//! Parsing is transactional: a stream either merges completely or not at all.
//!
//! # Modules
//! - [`hash`] — pre-hashed identifier keys ([`StrHash`])
//! - [`types`] — value types of resolved mappings
//! - [`device`] — the resolved per-device view
//! - [`db`] — the database facade ([`MappingsDb`])
//! - [`settings`] — optional TOML runtime settings
//! - [`wrapper`] — backend trait, slot manager and binding evaluation
//! - [`backends`] — bundled identification backends
//!
//! # Feature flags
//! - **`hid`** — the `hidapi`-based identification backend (default).
//! - **`debug-log`** — enumeration chatter on stderr.
//!
//! ## Threading
//! A [`MappingsDb`] is mutated only by its `parse_*` methods; queries are
//! read-only and the views they return are self-contained. Serialize parses
//! against in-flight queries yourself; there are no internal locks.

pub mod backends;
pub mod db;
pub mod device;
pub mod hash;
pub mod settings;
pub mod types;
pub mod wrapper;

mod diag;
mod parser;
mod store;
mod tokens;

/// Error and Result types for the crate.
pub mod error {
    //! Error and result types used across padmap.
    //!
    //! Parse diagnostics are not carried here: they go line-by-line to the
    //! optional sink passed to the `parse_*` methods, and the error value
    //! only records that the stream was rejected.

    /// Crate-wide error type.
    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        /// The database text was rejected; details went to the diagnostics
        /// sink.
        #[error("invalid database text")]
        Parse,

        /// No `padmapdb.txt` in the user-data directory nor the working
        /// directory.
        #[error("no database file found")]
        NoDatabaseFile,

        /// The requested backend is not available for this build/OS.
        #[error("HID backend not available on this platform/build")]
        BackendUnavailable,

        /// Settings file did not parse.
        #[error("invalid settings: {0}")]
        Settings(#[from] toml::de::Error),

        /// Underlying I/O failure.
        #[error(transparent)]
        Io(#[from] std::io::Error),

        /// Opaque failure surfaced as a message.
        #[error("{0}")]
        Other(String),
    }

    /// Convenient crate-wide result alias.
    pub type Result<T> = core::result::Result<T, Error>;
}

pub use error::{Error, Result};

pub use db::MappingsDb;
pub use device::Device;
pub use hash::{StrHash, StrHashMap};
pub use settings::Settings;
pub use types::{
    Color, DeviceInputType, FullBinding, HalfBinding, HidIds, InputInfos, InterfaceInputType,
    LabelInfos, SingleBinding,
};
pub use wrapper::{DeviceStatus, InputBackend, InputMapper};

// A tiny prelude for downstreams.
pub mod prelude {
    pub use crate::db::MappingsDb;
    pub use crate::device::Device;
    pub use crate::hash::StrHash;
    pub use crate::settings::Settings;
    pub use crate::types::{
        Color, DeviceInputType, FullBinding, HidIds, InputInfos, InterfaceInputType, LabelInfos,
        SingleBinding,
    };
    pub use crate::wrapper::{DeviceStatus, InputBackend, InputMapper};
}
