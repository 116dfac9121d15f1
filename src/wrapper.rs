//! Host-library integration layer.
//!
//! The database itself never touches hardware. An [`InputBackend`] wraps
//! whatever joystick library the application uses and exposes the capability
//! set the mapper needs: enumerate slots, identify HID ids, sample buttons,
//! axes and hats. [`InputMapper`] sits on top, keeps one
//! `{status, device}` pair per slot, refreshes them against a
//! [`MappingsDb`], and turns bindings plus live samples into interface input
//! values.
//!
//! Sampling methods default to "nothing there" so identification-only
//! backends (like the bundled HID one) stay small.

use crate::db::MappingsDb;
use crate::device::Device;
use crate::hash::{StrHash, StrHashMap};
use crate::types::{DeviceInputType, HalfBinding, HidIds, InputInfos, SingleBinding};

/// Whether a slot has a device and how well the database covers it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum DeviceStatus {
    /// No device at this slot.
    #[default]
    Disconnected,
    /// Connected, but neither the database nor the host library provide
    /// mappings; generic defaults were generated.
    Unsupported,
    /// Connected, mappings synthesized from the host library's own data.
    Fallback,
    /// Connected and present in the database.
    Supported,
}

/// One slot: connection status plus the resolved device view.
#[derive(Clone, Debug, Default)]
pub struct Slot {
    pub status: DeviceStatus,
    pub device: Device,
}

/// Capability set a host input library must provide.
///
/// Only slot enumeration and identification are required; sampling methods
/// default to neutral values and `fallback_device` to `None`.
pub trait InputBackend {
    /// Refresh the backend's internal state (re-enumerate, pump events, …).
    fn update(&mut self) {}

    /// Number of slots currently exposed.
    fn num_slots(&self) -> u8;

    /// Whether a device is connected at this slot.
    fn connected(&self, slot: u8) -> bool;

    /// HID ids of the device at this slot.
    fn hid_ids(&self, slot: u8) -> HidIds;

    /// Extra config tags for this slot (e.g. `fw_0110`), applied on top of
    /// the mapper's tags for the database lookup.
    fn slot_tags(&self, _slot: u8) -> Vec<String> {
        Vec::new()
    }

    /// Host-reported device name, used when the database has none.
    fn device_name(&self, _slot: u8) -> String {
        String::new()
    }

    /// Mappings synthesized from the host library's own mapping data, when it
    /// has any (e.g. a game-controller layout).
    fn fallback_device(&self, _slot: u8) -> Option<Device> {
        None
    }

    fn num_buttons(&self, _slot: u8) -> u8 {
        0
    }

    fn button_pressed(&self, _slot: u8, _button: u8) -> bool {
        false
    }

    fn num_abs_axes(&self, _slot: u8) -> u8 {
        0
    }

    /// Absolute axis position in `[-1, 1]`.
    fn abs_axis(&self, _slot: u8, _axis: u8) -> f32 {
        0.0
    }

    /// Relative axis displacement since the last update.
    fn rel_axis(&self, _slot: u8, _axis: u8) -> f32 {
        0.0
    }

    fn num_hats(&self, _slot: u8) -> u8 {
        0
    }

    /// Hat position, each component in `{-1, 0, 1}`.
    fn hat(&self, _slot: u8, _hat: u8) -> (f32, f32) {
        (0.0, 0.0)
    }
}

/// Per-slot device resolution and binding evaluation over a backend.
pub struct InputMapper<B: InputBackend> {
    backend: B,
    slots: Vec<Slot>,
    tags: Vec<StrHash>,
}

impl<B: InputBackend> InputMapper<B> {
    /// Wrap a backend. The tag set starts with the build target's OS tags.
    pub fn new(backend: B) -> Self {
        InputMapper {
            backend,
            slots: Vec::new(),
            tags: os_tags(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Config tags this mapper adds to every lookup.
    pub fn tags(&self) -> &[StrHash] {
        &self.tags
    }

    /// Add a config tag (deduplicated).
    pub fn push_tag(&mut self, tag: &str) {
        let hash = StrHash::of(tag);
        if !self.tags.contains(&hash) {
            self.tags.push(hash);
        }
    }

    /// Update the backend and re-resolve every slot against the database.
    pub fn refresh(&mut self, db: &MappingsDb) {
        self.backend.update();
        let count = usize::from(self.backend.num_slots());
        self.slots.clear();
        self.slots.resize_with(count, Slot::default);
        for index in 0..count {
            let slot = index as u8;
            if !self.backend.connected(slot) {
                continue;
            }
            let mut tags = self.tags.clone();
            for tag in self.backend.slot_tags(slot) {
                let hash = StrHash::of(&tag);
                if !tags.contains(&hash) {
                    tags.push(hash);
                }
            }
            let device = db.device_with_tags(self.backend.hid_ids(slot), &tags);
            self.slots[index] = if !device.is_empty() {
                Slot {
                    status: DeviceStatus::Supported,
                    device,
                }
            } else if let Some(fallback) = self.backend.fallback_device(slot) {
                Slot {
                    status: DeviceStatus::Fallback,
                    device: fallback,
                }
            } else {
                let mut device = default_mappings(
                    self.backend.num_buttons(slot),
                    self.backend.num_abs_axes(slot),
                    self.backend.num_hats(slot),
                );
                device.set_name(self.backend.device_name(slot));
                Slot {
                    status: DeviceStatus::Unsupported,
                    device,
                }
            };
        }
    }

    pub fn status(&self, slot: u8) -> DeviceStatus {
        self.slots
            .get(usize::from(slot))
            .map(|s| s.status)
            .unwrap_or_default()
    }

    pub fn device(&self, slot: u8) -> Option<&Device> {
        self.slots.get(usize::from(slot)).map(|s| &s.device)
    }

    /// Evaluate an interface input against the live device state:
    /// `half(positive) - half(negative)`, where a half is the max over its OR
    /// clauses of the min over each clause's AND atoms. Disconnected slots
    /// and unbound inputs read 0.
    pub fn input_value(&self, slot: u8, key: impl Into<StrHash>) -> f32 {
        let Some(entry) = self.slots.get(usize::from(slot)) else {
            return 0.0;
        };
        if entry.status == DeviceStatus::Disconnected {
            return 0.0;
        }
        let Some(infos) = entry.device.input_infos(key) else {
            return 0.0;
        };
        self.half_value(slot, &infos.bindings.positive)
            - self.half_value(slot, &infos.bindings.negative)
    }

    fn half_value(&self, slot: u8, half: &HalfBinding) -> f32 {
        let mut value = 0.0_f32;
        for clause in half {
            let mut clause_value = 1.0_f32;
            for atom in clause {
                let mut sample = match atom.kind {
                    DeviceInputType::Nil => 0.0,
                    DeviceInputType::Button => {
                        if self.backend.button_pressed(slot, atom.index) {
                            1.0
                        } else {
                            -1.0
                        }
                    }
                    DeviceInputType::Hat => {
                        let (x, y) = self.backend.hat(slot, atom.index / 2);
                        let axis = if atom.index % 2 == 1 { y } else { x };
                        remap_half(axis, atom.half)
                    }
                    DeviceInputType::AbsoluteAxis => {
                        remap_half(self.backend.abs_axis(slot, atom.index), atom.half)
                    }
                    DeviceInputType::RelativeAxis => self.backend.rel_axis(slot, atom.index),
                };
                if atom.invert {
                    sample = if atom.half { 1.0 - sample } else { -sample };
                }
                clause_value = clause_value.min(sample.max(0.0));
            }
            value = value.max(clause_value);
        }
        value
    }
}

#[inline]
fn remap_half(value: f32, half: bool) -> f32 {
    if half {
        (value + 1.0) * 0.5
    } else {
        value
    }
}

/// Interface inputs generic buttons map onto, in index order.
const BUTTON_INPUTS: [&str; 32] = [
    "basic_gamepad.a",
    "basic_gamepad.b",
    "basic_gamepad.x",
    "basic_gamepad.y",
    "basic_gamepad.l1",
    "basic_gamepad.r1",
    "basic_gamepad.l2",
    "basic_gamepad.r2",
    "basic_gamepad.select",
    "basic_gamepad.start",
    "basic_gamepad.ls",
    "basic_gamepad.rs",
    "extended_gamepad.c",
    "extended_gamepad.z",
    "extended_gamepad.l3",
    "extended_gamepad.r3",
    "extended_gamepad.l4",
    "extended_gamepad.r4",
    "extended_gamepad.home",
    "extended_gamepad.capture",
    "extra.btn0",
    "extra.btn1",
    "extra.btn2",
    "extra.btn3",
    "extra.btn4",
    "extra.btn5",
    "extra.btn6",
    "extra.btn7",
    "extra.btn8",
    "extra.btn9",
    "extra.btn10",
    "extra.btn11",
];

/// Interface inputs generic absolute axes map onto, in index order.
const ABS_INPUTS: [&str; 8] = [
    "basic_gamepad.lsx",
    "basic_gamepad.lsy",
    "basic_gamepad.rsx",
    "basic_gamepad.rsy",
    "extra.abs0",
    "extra.abs1",
    "extra.abs2",
    "extra.abs3",
];

/// Generate generic mappings for a device absent from the database: buttons
/// and axes onto the `basic_gamepad`/`extended_gamepad`/`extra` vocabulary,
/// the first hat onto the d-pad.
pub fn default_mappings(buttons: u8, abs_axes: u8, hats: u8) -> Device {
    let mut inputs: StrHashMap<InputInfos> = StrHashMap::default();

    let mut bind = |name: &str, kind: DeviceInputType, index: u8| {
        let signed = matches!(kind, DeviceInputType::AbsoluteAxis | DeviceInputType::Hat);
        let positive = SingleBinding {
            kind,
            index,
            invert: false,
            half: signed,
        };
        let mut infos = InputInfos::default();
        infos.bindings.positive.push(vec![positive]);
        if signed {
            infos.bindings.negative.push(vec![SingleBinding {
                invert: true,
                ..positive
            }]);
        }
        inputs.insert(StrHash::of(name), infos);
    };

    for index in 0..usize::from(buttons).min(BUTTON_INPUTS.len()) {
        bind(BUTTON_INPUTS[index], DeviceInputType::Button, index as u8);
    }
    for index in 0..usize::from(abs_axes).min(ABS_INPUTS.len()) {
        bind(ABS_INPUTS[index], DeviceInputType::AbsoluteAxis, index as u8);
    }
    if hats > 0 {
        bind("basic_gamepad.dpx", DeviceInputType::Hat, 0);
        bind("basic_gamepad.dpy", DeviceInputType::Hat, 1);
    }

    let mut device = Device::default();
    device.set_input_infos(inputs);
    device
}

fn os_tags() -> Vec<StrHash> {
    let mut tags = Vec::new();
    let mut push = |tag: &str| {
        let hash = StrHash::of(tag);
        if !tags.contains(&hash) {
            tags.push(hash);
        }
    };
    if cfg!(target_os = "android") {
        push("android");
        push("linux");
    }
    if cfg!(target_os = "linux") {
        push("linux");
    }
    if cfg!(target_vendor = "apple") {
        push("apple");
    }
    if cfg!(target_os = "macos") {
        push("macos");
    }
    if cfg!(target_os = "ios") {
        push("ios");
    }
    if cfg!(windows) {
        push("windows");
    }
    tags
}
