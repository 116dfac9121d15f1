//! Public value types for device mappings.
//!
//! Everything a query returns is built from these: HID identity, input type
//! enums, colors, labels, and the OR-of-ANDs binding trees. All of them are
//! plain owned data with `serde` derives so resolved mappings can be exported
//! for UI or tooling.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// USB HID vendor/product id pair identifying a device model.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct HidIds {
    /// Vendor id.
    pub vid: u16,
    /// Product id.
    pub pid: u16,
}

impl Default for HidIds {
    fn default() -> Self {
        HidIds::INVALID
    }
}

impl HidIds {
    /// Sentinel meaning "no device" (used for "no parent").
    pub const INVALID: HidIds = HidIds { vid: 0, pid: 0 };

    /// Construct from a vendor/product pair.
    pub const fn new(vid: u16, pid: u16) -> Self {
        HidIds { vid, pid }
    }

    /// True unless this is the [`HidIds::INVALID`] sentinel.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.vid != 0 || self.pid != 0
    }
}

impl Hash for HidIds {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(u32::from(self.vid) << 16 | u32::from(self.pid));
    }
}

/// An interface's input type, as declared in an `interfaces` block.
///
/// Absolute and relative axes are signed; buttons are nonnegative.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum InterfaceInputType {
    /// Unknown input (returned for hashes absent from the database).
    #[default]
    Nil,
    /// Nonnegative input in `[0, 1]`.
    Button,
    /// Signed position in `[-1, 1]`.
    AbsoluteAxis,
    /// Signed displacement, unbounded.
    RelativeAxis,
}

/// A device's physical input type, as seen by the host input library.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum DeviceInputType {
    /// Explicit "no binding".
    #[default]
    Nil,
    /// Physical button.
    Button,
    /// Hat/POV switch. Encoded as two indices per hat: even = X, odd = Y.
    Hat,
    /// Absolute axis.
    AbsoluteAxis,
    /// Relative axis.
    RelativeAxis,
}

/// sRGB color attached to a label.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Display label for one interface input on one device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfos {
    /// True if this input has a distinctive color.
    pub has_color: bool,
    /// True if the database provided a label; false when `ascii`/`utf8` hold
    /// a generated generic name (`B1`, `H2`, `A3+`, …).
    pub has_label: bool,
    /// Input color when `has_color`, dummy value otherwise.
    pub color: Color,
    /// ASCII label, provided or generated.
    pub ascii: String,
    /// UTF-8 label: the icon glyph when the label names a known icon
    /// variable, otherwise the same as `ascii`.
    pub utf8: String,
    /// Icon variable name for custom handling of non-ASCII labels, empty when
    /// the label is a plain string.
    pub variable_name: String,
}

/// One physical input reference inside a binding expression.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SingleBinding {
    /// Physical input type.
    pub kind: DeviceInputType,
    /// Index as seen by the host library. Hats use `hat * 2` for the X axis
    /// and `hat * 2 + 1` for the Y axis.
    pub index: u8,
    /// Invert the sampled value (negate, or `1 - v` in half mode).
    pub invert: bool,
    /// Sample only half of a signed input, remapped from `[-1, 1]` to
    /// `[0, 1]`.
    pub half: bool,
}

impl Default for SingleBinding {
    fn default() -> Self {
        SingleBinding {
            kind: DeviceInputType::Nil,
            index: 0,
            invert: false,
            half: false,
        }
    }
}

/// Binding for half an interface input (or the whole input when it cannot go
/// negative): an OR (outer) of ANDs (inner) of physical inputs.
pub type HalfBinding = Vec<Vec<SingleBinding>>;

/// Complete binding for one interface input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullBinding {
    /// Positive half, or the whole binding for button-typed inputs.
    pub positive: HalfBinding,
    /// Negative half; empty for button-typed inputs.
    pub negative: HalfBinding,
}

impl FullBinding {
    /// True when neither half binds anything.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}

/// Resolved mapping and label for one interface input on one device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputInfos {
    /// Physical inputs to sample.
    pub bindings: FullBinding,
    /// Display label and color.
    pub label: LabelInfos,
}
