//! Resolved per-device mapping view.
//!
//! A [`Device`] is an owned, immutable snapshot produced for one `(HidIds,
//! config tags)` query: every interface input the device binds, with fully
//! expanded [`InputInfos`]. It does not retain references into the database
//! and stays valid across later parses.
//!
//! Resolution walks the device's parent chain root-first, overlays label
//! presets (each preset's parent first), selects bindings along the config
//! tag gates, applies device-local labels last, materializes display labels
//! (icon substitution included) and prunes inputs whose bindings ended up
//! empty.

use serde::Serialize;

use crate::hash::{StrHash, StrHashMap};
use crate::store::{ConfigTagBindings, DbLabel, DeviceData, DevicesDb};
use crate::types::{DeviceInputType, HidIds, InputInfos, LabelInfos};

/// A device's input mappings and labels for one specific set of config tags.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Device {
    name: String,
    inputs: StrHashMap<InputInfos>,
}

impl Device {
    /// Materialize the view for `ids`. An unknown device yields an empty
    /// view ([`Device::is_empty`]).
    pub(crate) fn resolve(ids: HidIds, db: &DevicesDb, tags: &[StrHash]) -> Device {
        let mut device = Device::default();
        let Some(data) = db.devices.get(&ids) else {
            return device;
        };
        let mut visited = vec![ids];
        device.fill(data, db, tags, &mut visited);
        device.prune_nil_bindings();
        device.fill_generic_labels();
        device
    }

    /// Apply one level of the parent chain (parents first).
    fn fill(
        &mut self,
        data: &DeviceData,
        db: &DevicesDb,
        tags: &[StrHash],
        visited: &mut Vec<HidIds>,
    ) {
        if data.parent.is_valid() && !visited.contains(&data.parent) {
            visited.push(data.parent);
            if let Some(parent) = db.devices.get(&data.parent) {
                self.fill(parent, db, tags, visited);
            }
        }
        if !data.name.is_empty() {
            self.name = data.name.clone();
        }
        let mut seen = Vec::new();
        for &preset in &data.preset_labels {
            self.apply_preset(preset, db, &mut seen);
        }
        self.apply_bindings(&data.bindings, tags);
        self.apply_labels(&data.own_labels, db);
    }

    /// Apply a labels preset, its parent chain first.
    fn apply_preset(&mut self, preset: StrHash, db: &DevicesDb, seen: &mut Vec<StrHash>) {
        if seen.contains(&preset) {
            return;
        }
        seen.push(preset);
        if let Some(labels) = db.labels.get(&preset) {
            if labels.parent != StrHash::EMPTY {
                self.apply_preset(labels.parent, db, seen);
            }
            self.apply_labels(&labels.entries, db);
        }
    }

    fn apply_labels(&mut self, entries: &StrHashMap<DbLabel>, db: &DevicesDb) {
        for (&input, label) in entries {
            self.inputs.entry(input).or_default().label = gen_label(label, db);
        }
    }

    /// Install bindings from a tree node, then follow every tag gate that
    /// matches the active tag set.
    fn apply_bindings(&mut self, node: &ConfigTagBindings, tags: &[StrHash]) {
        for (&input, binding) in &node.bindings {
            self.inputs.entry(input).or_default().bindings = binding.clone();
        }
        for (&tag, gate) in &node.nested {
            let branch = if tags.contains(&tag) {
                gate.present.as_deref()
            } else {
                gate.absent.as_deref()
            };
            if let Some(nested) = branch {
                self.apply_bindings(nested, tags);
            }
        }
    }

    /// Drop inputs whose bindings ended up empty on both halves (label-only
    /// entries from presets, or inherited bindings suppressed with `nil`).
    fn prune_nil_bindings(&mut self) {
        self.inputs.retain(|_, info| !info.bindings.is_empty());
    }

    fn fill_generic_labels(&mut self) {
        for info in self.inputs.values_mut() {
            if !info.label.has_label {
                gen_generic_label(info);
            }
        }
    }

    // ---- public surface ----

    /// Device display name, possibly inherited.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Override the display name (used by wrappers for fallback devices).
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// True when the view holds no inputs at all — the "not in the database"
    /// sentinel.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Check whether an interface input is bound on this device.
    ///
    /// The key is a `"iface.input"` hash; `&str` converts implicitly.
    pub fn has_input(&self, key: impl Into<StrHash>) -> bool {
        self.inputs
            .get(&key.into())
            .is_some_and(|info| !info.bindings.is_empty())
    }

    /// Bindings and label for an interface input, if bound.
    pub fn input_infos(&self, key: impl Into<StrHash>) -> Option<&InputInfos> {
        self.inputs
            .get(&key.into())
            .filter(|info| !info.bindings.is_empty())
    }

    /// Label for an interface input, if bound.
    pub fn label(&self, key: impl Into<StrHash>) -> Option<&LabelInfos> {
        self.input_infos(key).map(|info| &info.label)
    }

    /// Iterate `(input hash, infos)` pairs. Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (StrHash, &InputInfos)> {
        self.inputs.iter().map(|(&hash, info)| (hash, info))
    }

    /// Replace the whole input map (used by wrappers to inject fallback
    /// mappings when the database has nothing). Nil bindings are pruned and
    /// generic labels regenerated.
    pub fn set_input_infos(&mut self, inputs: StrHashMap<InputInfos>) {
        self.inputs = inputs;
        self.prune_nil_bindings();
        self.fill_generic_labels();
    }

    /// Serialize the resolved view to JSON for tooling/UI.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Expand a raw database label into display form, resolving the optional
/// `$name` / `$name fallback` icon reference.
fn gen_label(label: &DbLabel, db: &DevicesDb) -> LabelInfos {
    let mut out = LabelInfos {
        has_color: label.has_color,
        color: label.color,
        ..LabelInfos::default()
    };
    if label.label.is_empty() {
        return out;
    }
    out.has_label = true;
    if let Some(dollar) = label.label.strip_prefix('$') {
        match dollar.split_once(' ') {
            Some((name, fallback)) => {
                out.variable_name = name.to_owned();
                out.ascii = fallback.to_owned();
            }
            None => {
                out.variable_name = dollar.to_owned();
                out.ascii = humanize(dollar);
            }
        }
        out.utf8 = db
            .icons
            .get(&StrHash::of(&out.variable_name))
            .cloned()
            .unwrap_or_else(|| out.ascii.clone());
    } else {
        out.ascii = label.label.clone();
        out.utf8 = label.label.clone();
    }
    out
}

/// `psx_cross` → `psx cross`: underscores become spaces and everything but
/// the first character is lowercased.
fn humanize(name: &str) -> String {
    name.chars()
        .enumerate()
        .map(|(pos, c)| match c {
            '_' => ' ',
            c if pos > 0 => c.to_ascii_lowercase(),
            c => c,
        })
        .collect()
}

/// Synthesize a generic label (`B1`, `H2`, `A3+`, `~R1`) from the first bound
/// atom when the database provides no label.
fn gen_generic_label(info: &mut InputInfos) {
    let from_positive = info
        .bindings
        .positive
        .first()
        .and_then(|group| group.first())
        .copied();
    let atom = from_positive.or_else(|| {
        info.bindings
            .negative
            .first()
            .and_then(|group| group.first())
            .copied()
    });
    let Some(atom) = atom else {
        return;
    };
    let mut ascii = String::new();
    if atom.invert && !atom.half {
        ascii.push('~');
    }
    match atom.kind {
        DeviceInputType::Nil => return,
        DeviceInputType::Button => {
            ascii.push('B');
            ascii.push_str(&(u32::from(atom.index) + 1).to_string());
        }
        DeviceInputType::Hat => {
            ascii.push('H');
            ascii.push_str(&(u32::from(atom.index) / 2 + 1).to_string());
        }
        DeviceInputType::AbsoluteAxis => {
            ascii.push('A');
            ascii.push_str(&(u32::from(atom.index) + 1).to_string());
        }
        DeviceInputType::RelativeAxis => {
            ascii.push('R');
            ascii.push_str(&(u32::from(atom.index) + 1).to_string());
        }
    }
    if atom.half {
        // No half marker when the negative half mirrors the same physical
        // input (a full axis split into two halves reads as one axis).
        let symmetric = from_positive.is_some()
            && info
                .bindings
                .negative
                .first()
                .and_then(|group| group.first())
                .is_some_and(|n| n.kind == atom.kind && n.index == atom.index);
        if !symmetric {
            ascii.push(if atom.invert { '-' } else { '+' });
        }
    }
    info.label.variable_name.clear();
    info.label.utf8 = ascii.clone();
    info.label.ascii = ascii;
}
