//! In-memory mapping database.
//!
//! [`DevicesDb`] is the root aggregate the parser fills and the resolver
//! reads: interface definitions, icon glyphs, the reverse hash→string table,
//! label presets and per-device data. Parsing is transactional: a scratch
//! `DevicesDb` is built per stream and [`DevicesDb::absorb`]ed into the live
//! one only on full success.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use crate::hash::{IdentityHasher, StrHash, StrHashMap};
use crate::types::{Color, FullBinding, HidIds, InterfaceInputType};

/// Interface definition: input short name → input type.
pub(crate) type Interface = StrHashMap<InterfaceInputType>;

/// Map keyed by HID ids (pre-hashed as `vid << 16 | pid`).
pub(crate) type HidIdsMap<T> = HashMap<HidIds, T, BuildHasherDefault<IdentityHasher>>;

/// Raw label as written in the database: the `$name`/`$name fallback` form is
/// kept verbatim and only expanded at resolution time.
#[derive(Clone, Debug, Default)]
pub(crate) struct DbLabel {
    pub has_color: bool,
    pub color: Color,
    /// May be empty (a `nil` entry that drops an inherited label).
    pub label: String,
}

/// Named reusable label set, optionally extending another preset.
#[derive(Clone, Debug, Default)]
pub(crate) struct LabelsPreset {
    /// Parent preset, [`StrHash::EMPTY`] for none. Applied before `entries`.
    pub parent: StrHash,
    /// Labels keyed by the fully-qualified `"iface.input"` hash.
    pub entries: StrHashMap<DbLabel>,
}

/// Bindings gated on one config tag being present or absent.
///
/// At most two owned children per tag; the recursion through `Option<Box<_>>`
/// keeps the ownership a DAG with unique owners.
#[derive(Debug, Default)]
pub(crate) struct TagGate {
    pub present: Option<Box<ConfigTagBindings>>,
    pub absent: Option<Box<ConfigTagBindings>>,
}

/// One node of a device's binding tree.
///
/// The root node's `bindings` are the device's default bindings; `nested`
/// holds subtrees selected by the active config tag set at resolution time.
#[derive(Debug, Default)]
pub(crate) struct ConfigTagBindings {
    /// Bindings installed at this node, keyed by `"iface.input"` hash.
    pub bindings: StrHashMap<FullBinding>,
    /// Tag-gated subtrees.
    pub nested: StrHashMap<TagGate>,
}

/// Everything the database knows about one device.
#[derive(Debug, Default)]
pub(crate) struct DeviceData {
    /// Parent device, [`HidIds::INVALID`] for none.
    pub parent: HidIds,
    /// Display name; empty means "inherit".
    pub name: String,
    /// Interfaces declared on this device (not inherited ones), sorted by
    /// hash for set operations.
    pub interfaces: Vec<StrHash>,
    /// Label presets in application order; later presets override earlier.
    pub preset_labels: Vec<StrHash>,
    /// Device-local labels, applied after all presets.
    pub own_labels: StrHashMap<DbLabel>,
    /// Binding tree for every config tag combination.
    pub bindings: ConfigTagBindings,
}

/// Complete devices database.
#[derive(Debug, Default)]
pub(crate) struct DevicesDb {
    /// Interface definitions keyed by interface name hash.
    pub interfaces: StrHashMap<Interface>,
    /// Icon variable → UTF-8 glyph.
    pub icons: StrHashMap<String>,
    /// Reverse lookup: `"iface.input"` hash → the string itself.
    pub name_of_hash: StrHashMap<String>,
    /// Label presets keyed by preset name hash.
    pub labels: StrHashMap<LabelsPreset>,
    /// Device data keyed by HID ids.
    pub devices: HidIdsMap<DeviceData>,
}

impl DevicesDb {
    /// Merge a successfully parsed scratch database into this one.
    ///
    /// Replace-on-key for every table; interface compatibility across streams
    /// is enforced earlier by the parser's redeclaration check.
    pub fn absorb(&mut self, staged: DevicesDb) {
        self.interfaces.extend(staged.interfaces);
        self.icons.extend(staged.icons);
        self.name_of_hash.extend(staged.name_of_hash);
        self.labels.extend(staged.labels);
        self.devices.extend(staged.devices);
    }
}
