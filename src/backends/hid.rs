//! HID identification backend.
//!
//! Enumerates joystick/gamepad-class HID devices through `hidapi` and
//! exposes them as mapper slots: HID ids, product names and a firmware tag
//! per slot. It does not decode input reports — report layouts are
//! device-specific and belong to the application's input library — so the
//! sampling methods stay at the trait defaults and devices resolved through
//! this backend are useful for mapping/label display and database coverage
//! checks.

use hidapi::HidApi;

use crate::error::{Error, Result};
use crate::types::HidIds;
use crate::wrapper::InputBackend;

// HID usage page/ids for devices worth showing as controllers.
const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
const USAGE_JOYSTICK: u16 = 0x04;
const USAGE_GAMEPAD: u16 = 0x05;

struct SlotInfo {
    ids: HidIds,
    name: String,
    firmware_tag: String,
}

/// `hidapi`-based identification backend.
pub struct HidBackend {
    api: HidApi,
    slots: Vec<SlotInfo>,
}

impl HidBackend {
    /// Initialize hidapi and run a first enumeration.
    pub fn new() -> Result<Self> {
        let api = HidApi::new().map_err(|_| Error::BackendUnavailable)?;
        let mut backend = HidBackend {
            api,
            slots: Vec::new(),
        };
        backend.enumerate();
        Ok(backend)
    }

    fn enumerate(&mut self) {
        self.slots.clear();
        for info in self.api.device_list() {
            let is_controller = info.usage_page() == USAGE_PAGE_GENERIC_DESKTOP
                && matches!(info.usage(), USAGE_JOYSTICK | USAGE_GAMEPAD);
            if !is_controller {
                continue;
            }
            self.slots.push(SlotInfo {
                ids: HidIds::new(info.vendor_id(), info.product_id()),
                name: info.product_string().unwrap_or("").to_owned(),
                firmware_tag: format!("fw_{:04x}", info.release_number()),
            });
        }
        #[cfg(feature = "debug-log")]
        eprintln!("[padmap/hid] {} controller(s) enumerated", self.slots.len());
    }
}

impl InputBackend for HidBackend {
    fn update(&mut self) {
        if self.api.refresh_devices().is_ok() {
            self.enumerate();
        }
    }

    fn num_slots(&self) -> u8 {
        self.slots.len().min(u8::MAX as usize) as u8
    }

    fn connected(&self, slot: u8) -> bool {
        usize::from(slot) < self.slots.len()
    }

    fn hid_ids(&self, slot: u8) -> HidIds {
        self.slots
            .get(usize::from(slot))
            .map(|s| s.ids)
            .unwrap_or(HidIds::INVALID)
    }

    fn slot_tags(&self, slot: u8) -> Vec<String> {
        self.slots
            .get(usize::from(slot))
            .map(|s| vec![s.firmware_tag.clone()])
            .unwrap_or_default()
    }

    fn device_name(&self, slot: u8) -> String {
        self.slots
            .get(usize::from(slot))
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }
}
