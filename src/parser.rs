//! DSL parser.
//!
//! A single-pass, recursive-descent parser where each block (`interfaces`,
//! `icons`, `labels`, `devices`) runs an explicit enum-valued state machine
//! over the token stream. All writes go into a scratch [`DevicesDb`]; the
//! scratch is merged into the live database only when the whole stream parses
//! (end of input reached with no block in flight). Any error drops the
//! scratch and leaves the live database untouched.
//!
//! Binding expressions (`b0`, `~a2+`, `h0x|b3&b4`, `nil`) are scanned with
//! the tokenizer's stuck-token contract: the first atom may follow whitespace
//! (`gp.a = b0`), everything after it must be contiguous.

use std::io::Write;

use crate::diag::{Abort, Diagnostics, Step};
use crate::hash::StrHash;
use crate::store::{ConfigTagBindings, DbLabel, DeviceData, DevicesDb, Interface, LabelsPreset};
use crate::tokens::{Token, Tokenizer, NEWLINE};
use crate::types::{Color, DeviceInputType, FullBinding, HalfBinding, HidIds, InterfaceInputType, SingleBinding};

/// Reserved keyword and punctuation hashes, matched by exact hash.
mod kw {
    use crate::hash::StrHash;

    pub const INTERFACES: StrHash = StrHash::of("interfaces");
    pub const ICONS: StrHash = StrHash::of("icons");
    pub const LABELS: StrHash = StrHash::of("labels");
    pub const DEVICES: StrHash = StrHash::of("devices");
    pub const NAME: StrHash = StrHash::of("name");
    pub const DEFAULT: StrHash = StrHash::of("default");
    pub const BTN: StrHash = StrHash::of("btn");
    pub const ABS: StrHash = StrHash::of("abs");
    pub const REL: StrHash = StrHash::of("rel");
    pub const NIL: StrHash = StrHash::of("nil");

    pub const LBRACE: StrHash = StrHash::of("{");
    pub const RBRACE: StrHash = StrHash::of("}");
    pub const COLON: StrHash = StrHash::of(":");
    pub const DOT: StrHash = StrHash::of(".");
    pub const EQUALS: StrHash = StrHash::of("=");
    pub const PLUS: StrHash = StrHash::of("+");
    pub const MINUS: StrHash = StrHash::of("-");
    pub const TILDE: StrHash = StrHash::of("~");
    pub const COMMA: StrHash = StrHash::of(",");
    pub const BANG: StrHash = StrHash::of("!");
    pub const PIPE: StrHash = StrHash::of("|");
    pub const AMP: StrHash = StrHash::of("&");
}

/// Which halves of an interface input a binding statement defines.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Halves {
    NegativeOnly,
    PositiveOnly,
    Full,
}

/// Constraints on the atoms of one binding expression.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ExprMode {
    /// Target is a button-typed interface input: no half atoms.
    Button,
    /// Target is one half of a signed input: anything goes.
    Half,
    /// Target is both halves of a signed input: atoms are forced to half and
    /// mirrored into the negative side; buttons and explicit halves are
    /// rejected.
    Mirror,
}

pub(crate) struct Parser<'a, 'b> {
    tokens: Tokenizer<'a>,
    diag: Diagnostics<'a>,
    staged: DevicesDb,
    live: &'b mut DevicesDb,
}

impl<'a, 'b> Parser<'a, 'b> {
    pub fn new(input: &'a [u8], sink: Option<&'a mut dyn Write>, live: &'b mut DevicesDb) -> Self {
        Parser {
            tokens: Tokenizer::new(input),
            diag: Diagnostics::new(sink),
            staged: DevicesDb::default(),
            live,
        }
    }

    /// Parse the whole stream. True on success, after which the staged
    /// definitions have been merged into the live database.
    pub fn run(mut self) -> bool {
        loop {
            let tok = match self.tokens.next_token(&mut self.diag) {
                Ok(tok) => tok,
                Err(Abort) => return false,
            };
            let Some(tok) = tok else {
                // Clean end of stream: commit.
                self.live.absorb(self.staged);
                return true;
            };
            let step = match tok.hash {
                kw::INTERFACES => self.parse_interfaces_block(),
                kw::ICONS => self.parse_icons_block(),
                kw::LABELS => self.parse_labels_block(),
                kw::DEVICES => self.parse_devices_block(),
                NEWLINE => Ok(()),
                _ => {
                    self.diag.unexpected_token(&tok.text);
                    Err(Abort)
                }
            };
            if step.is_err() {
                return false;
            }
        }
    }

    // ---- token helpers ----

    fn require(&mut self) -> Step<Token> {
        match self.tokens.next_token(&mut self.diag)? {
            Some(tok) => Ok(tok),
            None => {
                self.diag.unexpected_token("");
                Err(Abort)
            }
        }
    }

    /// The common "this exact token or bail" transition.
    fn expect(&mut self, mut tok: Token, want: StrHash, skip_newlines: bool) -> Step {
        while skip_newlines && tok.hash == NEWLINE {
            tok = self.require()?;
        }
        if tok.hash == want {
            Ok(())
        } else {
            self.diag.unexpected_token(&tok.text);
            Err(Abort)
        }
    }

    fn expect_next(&mut self, want: StrHash, skip_newlines: bool) -> Step {
        let tok = self.require()?;
        self.expect(tok, want, skip_newlines)
    }

    // ---- database lookups (staged first, then live) ----

    fn interface_exists(&self, iface: StrHash) -> bool {
        self.staged.interfaces.contains_key(&iface) || self.live.interfaces.contains_key(&iface)
    }

    fn interface_input_type(&self, iface: StrHash, input: StrHash) -> Option<InterfaceInputType> {
        self.staged
            .interfaces
            .get(&iface)
            .or_else(|| self.live.interfaces.get(&iface))
            .and_then(|entries| entries.get(&input))
            .copied()
    }

    fn labels_exist(&self, preset: StrHash) -> bool {
        self.staged.labels.contains_key(&preset) || self.live.labels.contains_key(&preset)
    }

    fn device_exists(&self, ids: HidIds) -> bool {
        self.staged.devices.contains_key(&ids) || self.live.devices.contains_key(&ids)
    }

    /// Resolve an unqualified input name against a device's interface set.
    /// Errors when the short name is ambiguous or belongs to no interface.
    fn owning_input(
        &mut self,
        scope: &[StrHash],
        input: StrHash,
        name: &str,
    ) -> Step<(StrHash, InterfaceInputType)> {
        let mut found: Option<(StrHash, InterfaceInputType)> = None;
        for &iface in scope {
            if let Some(ty) = self.interface_input_type(iface, input) {
                if found.is_some() {
                    self.diag
                        .error(&format!("input {name} belongs to several interfaces"));
                    return Err(Abort);
                }
                found = Some((iface, ty));
            }
        }
        match found {
            Some(hit) => Ok(hit),
            None => {
                self.diag
                    .error(&format!("input {name} does not belong to any interface"));
                Err(Abort)
            }
        }
    }

    // ---- interfaces block ----

    fn parse_interfaces_block(&mut self) -> Step {
        enum St {
            Start,
            InsideBlock,
            InterfaceStart,
            InsideInterface,
            InputTypeColon,
        }
        let mut st = St::Start;
        let mut input_type = InterfaceInputType::Button;
        let mut type_defined = false;
        let mut iface_hash = StrHash::EMPTY;
        let mut iface_name = String::new();
        let mut fresh = Interface::default();
        // On redeclaration: the previous definition, and a copy whose entries
        // get crossed off as the new declaration lists them. Anything left at
        // the closing brace means the declarations diverge.
        let mut prior: Option<Interface> = None;
        let mut remaining: Option<Interface> = None;

        loop {
            let tok = self.require()?;
            match st {
                St::Start => {
                    self.expect(tok, kw::LBRACE, true)?;
                    st = St::InsideBlock;
                }
                St::InsideBlock => match tok.hash {
                    kw::RBRACE => return Ok(()),
                    NEWLINE => {}
                    _ => {
                        if !tok.is_name() {
                            self.diag.unexpected_token(&tok.text);
                            return Err(Abort);
                        }
                        if self.staged.interfaces.contains_key(&tok.hash) {
                            self.diag.error(&format!(
                                "multiple definition of the interface {} in the same stream",
                                tok.text
                            ));
                            return Err(Abort);
                        }
                        iface_hash = tok.hash;
                        iface_name = tok.text;
                        fresh = Interface::default();
                        prior = self.live.interfaces.get(&iface_hash).cloned();
                        remaining = prior.clone();
                        type_defined = false;
                        st = St::InterfaceStart;
                    }
                },
                St::InterfaceStart => {
                    self.expect(tok, kw::LBRACE, true)?;
                    st = St::InsideInterface;
                }
                St::InsideInterface => match tok.hash {
                    kw::BTN => {
                        input_type = InterfaceInputType::Button;
                        type_defined = true;
                        st = St::InputTypeColon;
                    }
                    kw::ABS => {
                        input_type = InterfaceInputType::AbsoluteAxis;
                        type_defined = true;
                        st = St::InputTypeColon;
                    }
                    kw::REL => {
                        input_type = InterfaceInputType::RelativeAxis;
                        type_defined = true;
                        st = St::InputTypeColon;
                    }
                    NEWLINE => {}
                    kw::RBRACE => {
                        if let Some(rem) = &remaining {
                            if !rem.is_empty() {
                                self.diag.error(
                                    "the current interface definition does not match the \
                                     previous definition",
                                );
                                return Err(Abort);
                            }
                        } else {
                            self.staged
                                .interfaces
                                .insert(iface_hash, std::mem::take(&mut fresh));
                        }
                        st = St::InsideBlock;
                    }
                    _ => {
                        if !tok.is_name() {
                            self.diag.unexpected_token(&tok.text);
                            return Err(Abort);
                        }
                        if !type_defined {
                            self.diag.error("undefined input type");
                            return Err(Abort);
                        }
                        match (&mut remaining, &prior) {
                            (Some(rem), Some(prev)) => match rem.get(&tok.hash).copied() {
                                Some(ty) if ty == input_type => {
                                    rem.remove(&tok.hash);
                                }
                                Some(_) => {
                                    self.diag.error(
                                        "the current interface definition does not match the \
                                         previous definition",
                                    );
                                    return Err(Abort);
                                }
                                None => {
                                    if prev.contains_key(&tok.hash) {
                                        self.diag.error(&format!(
                                            "input {} defined multiple times",
                                            tok.text
                                        ));
                                    } else {
                                        self.diag.error(
                                            "the current interface definition does not match \
                                             the previous definition",
                                        );
                                    }
                                    return Err(Abort);
                                }
                            },
                            _ => {
                                if fresh.contains_key(&tok.hash) {
                                    self.diag
                                        .error(&format!("input {} defined multiple times", tok.text));
                                    return Err(Abort);
                                }
                                fresh.insert(tok.hash, input_type);
                                let full = format!("{iface_name}.{}", tok.text);
                                self.staged.name_of_hash.insert(StrHash::of(&full), full);
                            }
                        }
                    }
                },
                St::InputTypeColon => {
                    self.expect(tok, kw::COLON, false)?;
                    st = St::InsideInterface;
                }
            }
        }
    }

    // ---- icons block ----

    fn parse_icons_block(&mut self) -> Step {
        enum St {
            Start,
            InsideBlock,
            ExpectString,
            LineEnd,
        }
        let mut st = St::Start;
        let mut icon = StrHash::EMPTY;

        loop {
            let tok = self.require()?;
            match st {
                St::Start => {
                    self.expect(tok, kw::LBRACE, true)?;
                    st = St::InsideBlock;
                }
                St::InsideBlock => match tok.hash {
                    kw::RBRACE => return Ok(()),
                    NEWLINE => {}
                    _ => {
                        if !tok.is_name() {
                            self.diag.unexpected_token(&tok.text);
                            return Err(Abort);
                        }
                        if self.staged.icons.contains_key(&tok.hash) {
                            self.diag.error(&format!(
                                "multiple definition of the icon {} in the same stream",
                                tok.text
                            ));
                            return Err(Abort);
                        }
                        icon = tok.hash;
                        st = St::ExpectString;
                    }
                },
                St::ExpectString => {
                    if !tok.is_string() {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                    self.staged.icons.insert(icon, tok.string_content().to_owned());
                    st = St::LineEnd;
                }
                St::LineEnd => {
                    self.expect(tok, NEWLINE, false)?;
                    st = St::InsideBlock;
                }
            }
        }
    }

    // ---- labels block ----

    fn parse_labels_block(&mut self) -> Step {
        enum St {
            Start,
            InsideBlock,
            LabelsStart,
            Inheritance,
            AfterInheritance,
        }
        let mut st = St::Start;
        let mut preset = LabelsPreset::default();
        let mut preset_hash = StrHash::EMPTY;
        let mut preset_name = String::new();

        loop {
            let tok = self.require()?;
            match st {
                St::Start => {
                    self.expect(tok, kw::LBRACE, true)?;
                    st = St::InsideBlock;
                }
                St::InsideBlock => match tok.hash {
                    kw::RBRACE => return Ok(()),
                    NEWLINE => {}
                    _ => {
                        if !tok.is_name() {
                            self.diag.unexpected_token(&tok.text);
                            return Err(Abort);
                        }
                        if self.staged.labels.contains_key(&tok.hash) {
                            self.diag.error(&format!(
                                "multiple definition of the labels {} in the same stream",
                                tok.text
                            ));
                            return Err(Abort);
                        }
                        preset = LabelsPreset::default();
                        preset_hash = tok.hash;
                        preset_name = tok.text;
                        st = St::LabelsStart;
                    }
                },
                St::LabelsStart => match tok.hash {
                    kw::LBRACE => {
                        self.parse_label_entries(None, &mut preset.entries)?;
                        self.staged
                            .labels
                            .insert(preset_hash, std::mem::take(&mut preset));
                        st = St::InsideBlock;
                    }
                    kw::COLON => st = St::Inheritance,
                    NEWLINE => {}
                    _ => {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                },
                St::Inheritance => {
                    if !tok.is_name() {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                    if !self.labels_exist(tok.hash) {
                        self.diag.error(&format!(
                            "labels {preset_name} extends unknown labels {}",
                            tok.text
                        ));
                        return Err(Abort);
                    }
                    preset.parent = tok.hash;
                    st = St::AfterInheritance;
                }
                St::AfterInheritance => match tok.hash {
                    NEWLINE => {}
                    kw::LBRACE => {
                        self.parse_label_entries(None, &mut preset.entries)?;
                        self.staged
                            .labels
                            .insert(preset_hash, std::mem::take(&mut preset));
                        st = St::InsideBlock;
                    }
                    _ => {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                },
            }
        }
    }

    /// Shared label-entry sub-block, used by `labels` presets (`scope` is
    /// `None`: entries must be qualified `iface.input`) and by device-local
    /// `labels = … { … }` blocks (`scope` is the device's interface set:
    /// unqualified inputs and `,` separators are also accepted).
    fn parse_label_entries(
        &mut self,
        scope: Option<&[StrHash]>,
        out: &mut crate::hash::StrHashMap<DbLabel>,
    ) -> Step {
        enum St {
            LineStart,
            AfterFirst,
            ExpectInput,
            ExpectValue,
            MaybeColor,
        }
        let mut st = St::LineStart;
        let mut pending: Option<Token> = None;
        let mut first_hash = StrHash::EMPTY;
        let mut first_name = String::new();
        let mut iface_hash = StrHash::EMPTY;
        let mut iface_name = String::new();
        let mut entry_key = StrHash::EMPTY;
        let mut entry = DbLabel::default();

        loop {
            let tok = match pending.take() {
                Some(tok) => tok,
                None => self.require()?,
            };
            match st {
                St::LineStart => match tok.hash {
                    kw::RBRACE => return Ok(()),
                    NEWLINE => {}
                    _ => {
                        if !tok.is_name() {
                            self.diag.unexpected_token(&tok.text);
                            return Err(Abort);
                        }
                        first_hash = tok.hash;
                        first_name = tok.text;
                        st = St::AfterFirst;
                    }
                },
                St::AfterFirst => match tok.hash {
                    kw::DOT => {
                        if !self.interface_exists(first_hash) {
                            self.diag.error(&format!("unknown interface {first_name}"));
                            return Err(Abort);
                        }
                        iface_hash = first_hash;
                        iface_name = std::mem::take(&mut first_name);
                        st = St::ExpectInput;
                    }
                    _ => {
                        // Unqualified entry; only meaningful with a device
                        // interface set to search.
                        let Some(scope) = scope else {
                            self.diag.error(&format!(
                                "label {first_name} does not belong to any interface"
                            ));
                            return Err(Abort);
                        };
                        let (iface, _) = self.owning_input(scope, first_hash, &first_name)?;
                        entry_key = self.begin_label_entry(out, iface, &first_name)?;
                        entry = DbLabel::default();
                        st = St::ExpectValue;
                        pending = Some(tok);
                    }
                },
                St::ExpectInput => {
                    if !tok.is_name() {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                    if self.interface_input_type(iface_hash, tok.hash).is_none() {
                        self.diag.error(&format!(
                            "unknown input {} in interface {iface_name}",
                            tok.text
                        ));
                        return Err(Abort);
                    }
                    entry_key = self.begin_label_entry(out, iface_hash, &tok.text)?;
                    entry = DbLabel::default();
                    st = St::ExpectValue;
                }
                St::ExpectValue => match tok.hash {
                    kw::NIL => st = St::MaybeColor,
                    _ => {
                        if !tok.is_string() {
                            self.diag.unexpected_token(&tok.text);
                            return Err(Abort);
                        }
                        entry.label = tok.string_content().to_owned();
                        st = St::MaybeColor;
                    }
                },
                St::MaybeColor => match tok.hash {
                    NEWLINE => {
                        out.insert(entry_key, std::mem::take(&mut entry));
                        st = St::LineStart;
                    }
                    kw::COMMA if scope.is_some() => {
                        out.insert(entry_key, std::mem::take(&mut entry));
                        st = St::LineStart;
                    }
                    kw::COMMA => {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                    kw::RBRACE => {
                        out.insert(entry_key, std::mem::take(&mut entry));
                        return Ok(());
                    }
                    _ => {
                        let Some(color) = parse_hex_color(&tok.text) else {
                            self.diag
                                .error(&format!("{} is not an RRGGBB sRGB hex color", tok.text));
                            return Err(Abort);
                        };
                        entry.color = color;
                        entry.has_color = true;
                        out.insert(entry_key, std::mem::take(&mut entry));
                        st = St::LineStart;
                    }
                },
            }
        }
    }

    /// Duplicate-check a label entry and return its fully-qualified key.
    fn begin_label_entry(
        &mut self,
        out: &mut crate::hash::StrHashMap<DbLabel>,
        iface: StrHash,
        input_name: &str,
    ) -> Step<StrHash> {
        let key = iface.push(b'.').extend(input_name);
        if out.contains_key(&key) {
            self.diag
                .error(&format!("label {input_name} defined multiple times"));
            return Err(Abort);
        }
        Ok(key)
    }

    // ---- devices block ----

    fn parse_devices_block(&mut self) -> Step {
        enum St {
            Start,
            InsideBlock,
            AfterVid,
            ExpectPid,
            AfterPid,
            ExpectParentVid,
            AfterParentVid,
            ExpectParentPid,
            AfterInheritance,
        }
        let mut st = St::Start;
        let mut ids = HidIds::INVALID;
        let mut parent_ids = HidIds::INVALID;
        let mut device = DeviceData::default();
        // Own plus inherited interfaces, sorted; used to qualify unqualified
        // input names. Reset per device.
        let mut scope: Vec<StrHash> = Vec::new();

        loop {
            let tok = self.require()?;
            match st {
                St::Start => {
                    self.expect(tok, kw::LBRACE, true)?;
                    st = St::InsideBlock;
                }
                St::InsideBlock => match tok.hash {
                    kw::RBRACE => return Ok(()),
                    NEWLINE => {}
                    _ => {
                        let Some(vid) = parse_hex_id(&tok.text) else {
                            self.diag.error(&format!("invalid device id {}", tok.text));
                            return Err(Abort);
                        };
                        ids.vid = vid;
                        st = St::AfterVid;
                    }
                },
                St::AfterVid => {
                    self.expect(tok, kw::DOT, false)?;
                    st = St::ExpectPid;
                }
                St::ExpectPid => {
                    let Some(pid) = parse_hex_id(&tok.text) else {
                        self.diag.error(&format!("invalid product id {}", tok.text));
                        return Err(Abort);
                    };
                    ids.pid = pid;
                    if self.staged.devices.contains_key(&ids) {
                        self.diag.error(&format!(
                            "multiple definition of the device {:04x}.{:04x} in the same stream",
                            ids.vid, ids.pid
                        ));
                        return Err(Abort);
                    }
                    device = DeviceData::default();
                    scope.clear();
                    st = St::AfterPid;
                }
                St::AfterPid => match tok.hash {
                    NEWLINE => {}
                    kw::COLON => st = St::ExpectParentVid,
                    kw::LBRACE => {
                        device.parent = HidIds::INVALID;
                        self.parse_device(&mut device, &mut scope)?;
                        self.staged.devices.insert(ids, std::mem::take(&mut device));
                        st = St::InsideBlock;
                    }
                    _ => {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                },
                St::ExpectParentVid => {
                    let Some(vid) = parse_hex_id(&tok.text) else {
                        self.diag
                            .error(&format!("invalid parent vendor id {}", tok.text));
                        return Err(Abort);
                    };
                    parent_ids.vid = vid;
                    st = St::AfterParentVid;
                }
                St::AfterParentVid => {
                    self.expect(tok, kw::DOT, false)?;
                    st = St::ExpectParentPid;
                }
                St::ExpectParentPid => {
                    let Some(pid) = parse_hex_id(&tok.text) else {
                        self.diag
                            .error(&format!("invalid parent product id {}", tok.text));
                        return Err(Abort);
                    };
                    parent_ids.pid = pid;
                    if !self.device_exists(parent_ids) {
                        self.diag.error(&format!(
                            "unknown parent {:04x}.{:04x}",
                            parent_ids.vid, parent_ids.pid
                        ));
                        return Err(Abort);
                    }
                    if parent_ids == ids {
                        self.diag.error(&format!(
                            "device {:04x}.{:04x} cannot inherit itself",
                            ids.vid, ids.pid
                        ));
                        return Err(Abort);
                    }
                    device.parent = parent_ids;
                    // Seed the interface scope with everything inherited.
                    let mut walk = parent_ids;
                    while walk.is_valid() {
                        let Some(parent) = self
                            .staged
                            .devices
                            .get(&walk)
                            .or_else(|| self.live.devices.get(&walk))
                        else {
                            break;
                        };
                        for &iface in &parent.interfaces {
                            if let Err(pos) = scope.binary_search(&iface) {
                                scope.insert(pos, iface);
                            }
                        }
                        walk = parent.parent;
                    }
                    st = St::AfterInheritance;
                }
                St::AfterInheritance => {
                    self.expect(tok, kw::LBRACE, true)?;
                    self.parse_device(&mut device, &mut scope)?;
                    self.staged.devices.insert(ids, std::mem::take(&mut device));
                    st = St::InsideBlock;
                }
            }
        }
    }

    fn parse_device(&mut self, device: &mut DeviceData, scope: &mut Vec<StrHash>) -> Step {
        #[derive(Clone, Copy)]
        enum Then {
            Body,
            Name,
            Interfaces,
            Labels,
        }
        #[derive(Clone, Copy)]
        enum St {
            InsideDevice,
            ExpectEquals(Then),
            EndOfLine(Then),
            ExpectName,
            ExpectInterface,
            ExpectLabels,
            ExpectLabelsBlock,
            TagOrInput,
            TagAbsent,
            EndTagOrInput,
            ExpectInterfaceInput,
            EqualsDeviceInput,
        }
        fn goto(then: Then) -> St {
            match then {
                Then::Body => St::InsideDevice,
                Then::Name => St::ExpectName,
                Then::Interfaces => St::ExpectInterface,
                Then::Labels => St::ExpectLabels,
            }
        }

        let mut st = St::InsideDevice;
        let mut pending: Option<Token> = None;
        let mut name_defined = false;
        let mut interfaces_defined = false;
        let mut labels_defined = false;
        // Tag edges from the binding-tree root; `depth` is the prefix pinned
        // by open braces, edges past it belong to the innermost `tag:` run.
        let mut path: Vec<(StrHash, bool)> = Vec::new();
        let mut depth: usize = 0;
        let mut halves = Halves::Full;
        let mut prev_hash = StrHash::EMPTY;
        let mut prev_name = String::new();
        let mut iface_hash = StrHash::EMPTY;
        let mut iface_name = String::new();
        let mut input_key = StrHash::EMPTY;
        let mut input_ty = InterfaceInputType::Nil;

        loop {
            let tok = match pending.take() {
                Some(tok) => tok,
                None => self.require()?,
            };
            match st {
                St::InsideDevice => match tok.hash {
                    NEWLINE => {}
                    kw::RBRACE => return Ok(()),
                    kw::NAME => {
                        if name_defined {
                            self.diag.error("multiple name definition");
                            return Err(Abort);
                        }
                        name_defined = true;
                        st = St::ExpectEquals(Then::Name);
                    }
                    kw::INTERFACES => {
                        if interfaces_defined {
                            self.diag.error("multiple interfaces definition");
                            return Err(Abort);
                        }
                        interfaces_defined = true;
                        st = St::ExpectEquals(Then::Interfaces);
                    }
                    kw::LABELS => {
                        if labels_defined {
                            self.diag.error("multiple labels definition");
                            return Err(Abort);
                        }
                        labels_defined = true;
                        st = St::ExpectEquals(Then::Labels);
                    }
                    kw::DEFAULT => {
                        path.clear();
                        depth = 0;
                        self.expect_next(kw::COLON, false)?;
                        st = St::TagOrInput;
                    }
                    kw::BANG => {
                        path.clear();
                        depth = 0;
                        st = St::TagAbsent;
                    }
                    _ => {
                        if !tok.is_name() {
                            self.diag.unexpected_token(&tok.text);
                            return Err(Abort);
                        }
                        path.clear();
                        depth = 0;
                        self.expect_next(kw::COLON, false)?;
                        self.new_tag(device, &mut path, depth, tok.hash, true)?;
                        st = St::TagOrInput;
                    }
                },
                St::ExpectEquals(then) => {
                    self.expect(tok, kw::EQUALS, false)?;
                    st = goto(then);
                }
                St::EndOfLine(then) => {
                    self.expect(tok, NEWLINE, false)?;
                    st = goto(then);
                }
                St::ExpectName => {
                    if tok.hash == NEWLINE {
                        self.diag.error("no device name at the end of line");
                        return Err(Abort);
                    }
                    if !tok.is_string() {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                    device.name = tok.string_content().to_owned();
                    st = St::EndOfLine(Then::Body);
                }
                St::ExpectInterface => match tok.hash {
                    NEWLINE => {
                        if device.interfaces.is_empty() {
                            self.diag.error("no interfaces at the end of line");
                            return Err(Abort);
                        }
                        st = St::InsideDevice;
                    }
                    kw::PLUS => {
                        if device.interfaces.is_empty() {
                            self.diag.error("no interfaces at the end of line");
                            return Err(Abort);
                        }
                        st = St::EndOfLine(Then::Interfaces);
                    }
                    _ => {
                        if !tok.is_name() {
                            self.diag.unexpected_token(&tok.text);
                            return Err(Abort);
                        }
                        if !self.interface_exists(tok.hash) {
                            self.diag.error(&format!("unknown interface {}", tok.text));
                            return Err(Abort);
                        }
                        match device.interfaces.binary_search(&tok.hash) {
                            Ok(_) => {
                                self.diag
                                    .error(&format!("interface {} listed multiple times", tok.text));
                                return Err(Abort);
                            }
                            Err(pos) => device.interfaces.insert(pos, tok.hash),
                        }
                        if let Err(pos) = scope.binary_search(&tok.hash) {
                            scope.insert(pos, tok.hash);
                        }
                    }
                },
                St::ExpectLabels => match tok.hash {
                    NEWLINE => {
                        if device.preset_labels.is_empty() && device.own_labels.is_empty() {
                            st = St::ExpectLabelsBlock;
                        } else {
                            st = St::InsideDevice;
                        }
                    }
                    kw::PLUS => {
                        if device.preset_labels.is_empty() && device.own_labels.is_empty() {
                            self.diag.error("no labels at the end of line");
                            return Err(Abort);
                        }
                        st = St::EndOfLine(Then::Labels);
                    }
                    kw::LBRACE => {
                        self.parse_label_entries(Some(scope.as_slice()), &mut device.own_labels)?;
                        st = St::EndOfLine(Then::Body);
                    }
                    _ => {
                        if !tok.is_name() {
                            self.diag.unexpected_token(&tok.text);
                            return Err(Abort);
                        }
                        if device.preset_labels.contains(&tok.hash) {
                            self.diag
                                .error(&format!("labels preset {} used multiple times", tok.text));
                            return Err(Abort);
                        }
                        if !self.labels_exist(tok.hash) {
                            self.diag.error(&format!("unknown labels {}", tok.text));
                            return Err(Abort);
                        }
                        device.preset_labels.push(tok.hash);
                    }
                },
                St::ExpectLabelsBlock => match tok.hash {
                    NEWLINE => {}
                    kw::LBRACE => {
                        self.parse_label_entries(Some(scope.as_slice()), &mut device.own_labels)?;
                        st = St::EndOfLine(Then::Body);
                    }
                    _ => {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                },
                St::TagOrInput => match tok.hash {
                    NEWLINE => {}
                    kw::LBRACE => {
                        if depth >= path.len() {
                            self.diag.error("no config tag to nest");
                            return Err(Abort);
                        }
                        depth += 1;
                    }
                    kw::RBRACE => {
                        if depth > 0 {
                            depth -= 1;
                            path.truncate(depth);
                        } else {
                            return Ok(());
                        }
                    }
                    kw::BANG => st = St::TagAbsent,
                    _ => {
                        if !tok.is_name() {
                            self.diag.unexpected_token(&tok.text);
                            return Err(Abort);
                        }
                        prev_hash = tok.hash;
                        prev_name = tok.text;
                        st = St::EndTagOrInput;
                    }
                },
                St::TagAbsent => {
                    if !tok.is_name() {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                    self.expect_next(kw::COLON, false)?;
                    self.new_tag(device, &mut path, depth, tok.hash, false)?;
                    st = St::TagOrInput;
                }
                St::EndTagOrInput => match tok.hash {
                    // The previous token was a config tag.
                    kw::COLON => {
                        self.new_tag(device, &mut path, depth, prev_hash, true)?;
                        st = St::TagOrInput;
                    }
                    // The previous token was an interface; it must be
                    // implemented by this device, directly or by inheritance.
                    kw::DOT => {
                        if scope.binary_search(&prev_hash).is_err() {
                            self.diag
                                .error(&format!("device does not implement interface {prev_name}"));
                            return Err(Abort);
                        }
                        iface_hash = prev_hash;
                        iface_name = std::mem::take(&mut prev_name);
                        st = St::ExpectInterfaceInput;
                    }
                    // The previous token was an unqualified input.
                    kw::PLUS | kw::MINUS | kw::EQUALS => {
                        let (iface, ty) = self.owning_input(scope, prev_hash, &prev_name)?;
                        input_key = iface.push(b'.').extend(&prev_name);
                        input_ty = ty;
                        match tok.hash {
                            kw::PLUS => halves = Halves::PositiveOnly,
                            kw::MINUS => halves = Halves::NegativeOnly,
                            _ => pending = Some(tok),
                        }
                        st = St::EqualsDeviceInput;
                    }
                    _ => {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                },
                St::ExpectInterfaceInput => {
                    if !tok.is_name() {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                    let Some(ty) = self.interface_input_type(iface_hash, tok.hash) else {
                        self.diag.error(&format!(
                            "unknown input {} in interface {iface_name}",
                            tok.text
                        ));
                        return Err(Abort);
                    };
                    input_key = iface_hash.push(b'.').extend(&tok.text);
                    input_ty = ty;
                    st = St::EqualsDeviceInput;
                }
                St::EqualsDeviceInput => match tok.hash {
                    kw::PLUS if halves == Halves::Full => halves = Halves::PositiveOnly,
                    kw::MINUS if halves == Halves::Full => halves = Halves::NegativeOnly,
                    kw::EQUALS => {
                        let slot = node_at(&mut device.bindings, &path)
                            .bindings
                            .entry(input_key)
                            .or_default();
                        self.parse_decomposed(slot, input_ty, halves)?;
                        halves = Halves::Full;
                        st = St::TagOrInput;
                    }
                    _ => {
                        self.diag.unexpected_token(&tok.text);
                        return Err(Abort);
                    }
                },
            }
        }
    }

    /// Install a `tag:` / `!tag:` edge at the current nesting depth and make
    /// its subtree the active node.
    fn new_tag(
        &mut self,
        device: &mut DeviceData,
        path: &mut Vec<(StrHash, bool)>,
        depth: usize,
        tag: StrHash,
        present: bool,
    ) -> Step {
        path.truncate(depth);
        let node = node_at(&mut device.bindings, path);
        let gate = node.nested.entry(tag).or_default();
        let slot = if present { &mut gate.present } else { &mut gate.absent };
        if slot.is_some() {
            self.diag.error("config tag already defined");
            return Err(Abort);
        }
        *slot = Some(Box::default());
        path.push((tag, present));
        Ok(())
    }

    // ---- binding expressions ----

    /// Route a binding expression onto the halves it defines, per the
    /// interface input's type.
    fn parse_decomposed(
        &mut self,
        slot: &mut FullBinding,
        ty: InterfaceInputType,
        halves: Halves,
    ) -> Step {
        let overlaps = (matches!(halves, Halves::PositiveOnly | Halves::Full)
            && !slot.positive.is_empty())
            || (matches!(halves, Halves::NegativeOnly | Halves::Full)
                && !slot.negative.is_empty());
        if overlaps {
            self.diag
                .error("input defined multiple times for the same config tag");
            return Err(Abort);
        }
        match ty {
            InterfaceInputType::Nil => unreachable!("interface inputs are never nil-typed"),
            InterfaceInputType::Button => {
                if halves != Halves::Full {
                    self.diag.error("can't bind to half a button");
                    return Err(Abort);
                }
                self.parse_expression(&mut slot.positive, None, ExprMode::Button)
            }
            InterfaceInputType::AbsoluteAxis | InterfaceInputType::RelativeAxis => match halves {
                Halves::NegativeOnly => {
                    self.parse_expression(&mut slot.negative, None, ExprMode::Half)
                }
                Halves::PositiveOnly => {
                    self.parse_expression(&mut slot.positive, None, ExprMode::Half)
                }
                Halves::Full => {
                    self.parse_expression(&mut slot.positive, Some(&mut slot.negative), ExprMode::Mirror)
                }
            },
        }
    }

    /// Parse one OR-of-ANDs binding expression into `positive` (and its
    /// mirror into `negative` in [`ExprMode::Mirror`]).
    fn parse_expression(
        &mut self,
        positive: &mut HalfBinding,
        mut negative: Option<&mut HalfBinding>,
        mode: ExprMode,
    ) -> Step {
        positive.push(Vec::new());
        if let Some(neg) = negative.as_mut() {
            neg.push(Vec::new());
        }
        let mut atom_count = 0usize;
        let mut last_was_nil = false;

        loop {
            let first = self.require()?;
            if first.hash == NEWLINE {
                self.diag.error("binding expected");
                return Err(Abort);
            }
            let (atom, leftover) = self.parse_atom(first, mode)?;
            atom_count += 1;
            last_was_nil = atom.kind == DeviceInputType::Nil;
            if last_was_nil && atom_count > 1 {
                self.diag.error("nil input in complex binding");
                return Err(Abort);
            }
            let atom = if mode == ExprMode::Mirror && !last_was_nil {
                SingleBinding { half: true, ..atom }
            } else {
                atom
            };
            if let Some(group) = positive.last_mut() {
                group.push(atom);
            }
            if let Some(neg) = negative.as_mut() {
                let mirrored = SingleBinding {
                    invert: !atom.invert,
                    ..atom
                };
                if let Some(group) = neg.last_mut() {
                    group.push(mirrored);
                }
            }

            // Operator position: the expression continues only while stuck.
            let op = match leftover {
                Some(tok) => tok,
                None => {
                    if !self.tokens.is_next_stuck() {
                        break;
                    }
                    self.require()?
                }
            };
            if last_was_nil {
                self.diag.error("nil input in complex binding");
                return Err(Abort);
            }
            match op.hash {
                kw::PIPE => {
                    positive.push(Vec::new());
                    if let Some(neg) = negative.as_mut() {
                        neg.push(Vec::new());
                    }
                }
                kw::AMP => {}
                _ => {
                    self.diag.unexpected_token(&op.text);
                    return Err(Abort);
                }
            }
            if !self.tokens.is_next_stuck() {
                self.diag.error("binding not complete");
                return Err(Abort);
            }
        }

        // A lone nil empties the halves, suppressing any inherited binding.
        if atom_count == 1 && last_was_nil {
            positive.clear();
            if let Some(neg) = negative {
                neg.clear();
            }
        }
        Ok(())
    }

    /// Parse one atom: `["~"] ("b" N | "h" N ("x"|"y") | "a" N ["+"|"-"] |
    /// "r" N ["+"|"-"] | "nil")`. Returns the atom plus a stuck token that
    /// turned out not to belong to it.
    fn parse_atom(&mut self, mut tok: Token, mode: ExprMode) -> Step<(SingleBinding, Option<Token>)> {
        let mut invert = false;
        if tok.hash == kw::TILDE {
            invert = true;
            if !self.tokens.is_next_stuck() {
                self.diag.error("binding not complete");
                return Err(Abort);
            }
            tok = self.require()?;
        }
        if tok.hash == kw::NIL {
            return Ok((SingleBinding::default(), None));
        }

        let kind = match tok.first_byte() {
            b'b' => DeviceInputType::Button,
            b'a' => DeviceInputType::AbsoluteAxis,
            b'r' => DeviceInputType::RelativeAxis,
            b'h' => DeviceInputType::Hat,
            _ => {
                self.diag.error(&format!("unknown input {}", tok.text));
                return Err(Abort);
            }
        };

        let text = &tok.text;
        let digits_end = 1 + text
            .as_bytes()
            .iter()
            .skip(1)
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits_end == 1 {
            self.diag.error(&format!("index is missing in {text}"));
            return Err(Abort);
        }
        let raw_index = match text[1..digits_end].parse::<u32>() {
            Ok(value) if value <= 255 => value,
            _ => {
                self.diag
                    .error(&format!("index of {text} outside range [0-255]"));
                return Err(Abort);
            }
        };
        let tail = &text[digits_end..];

        let index = match kind {
            DeviceInputType::Hat => {
                let axis = match tail {
                    "x" => 0,
                    "y" => 1,
                    _ => {
                        self.diag.unexpected_token(text);
                        return Err(Abort);
                    }
                };
                let encoded = raw_index * 2 + axis;
                if encoded > 255 {
                    self.diag
                        .error(&format!("index of {text} outside range [0-255]"));
                    return Err(Abort);
                }
                encoded as u8
            }
            _ => {
                if !tail.is_empty() {
                    self.diag.unexpected_token(text);
                    return Err(Abort);
                }
                raw_index as u8
            }
        };

        // Optional half suffix; buttons take none.
        let mut half = false;
        let mut leftover = None;
        if kind != DeviceInputType::Button && self.tokens.is_next_stuck() {
            let suffix = self.require()?;
            match suffix.hash {
                kw::PLUS => half = true,
                kw::MINUS => {
                    half = true;
                    invert = !invert;
                }
                _ => leftover = Some(suffix),
            }
        }

        match mode {
            ExprMode::Button if half => {
                self.diag.error("can't bind a button to half an axis");
                return Err(Abort);
            }
            ExprMode::Mirror if half => {
                self.diag.error("can't bind half an axis to a whole input");
                return Err(Abort);
            }
            ExprMode::Mirror if kind == DeviceInputType::Button => {
                self.diag.error("can't bind a button to a full axis");
                return Err(Abort);
            }
            _ => {}
        }

        Ok((
            SingleBinding {
                kind,
                index,
                invert,
                half,
            },
            leftover,
        ))
    }
}

/// Walk (and lazily materialize) the binding-tree node at a tag path.
fn node_at<'t>(
    root: &'t mut ConfigTagBindings,
    path: &[(StrHash, bool)],
) -> &'t mut ConfigTagBindings {
    let mut node = root;
    for &(tag, present) in path {
        let gate = node.nested.entry(tag).or_default();
        let slot = if present { &mut gate.present } else { &mut gate.absent };
        node = slot.get_or_insert_with(Box::default);
    }
    node
}

fn parse_hex_id(text: &str) -> Option<u16> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(text, 16)
        .ok()
        .filter(|&value| value <= 0xFFFF)
        .map(|value| value as u16)
}

fn parse_hex_color(text: &str) -> Option<Color> {
    let bytes = text.as_bytes();
    if bytes.len() != 6 || !bytes.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let value = u32::from_str_radix(text, 16).ok()?;
    Some(Color {
        r: (value >> 16) as u8,
        g: (value >> 8 & 0xFF) as u8,
        b: (value & 0xFF) as u8,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(src: &str) -> DevicesDb {
        let mut db = DevicesDb::default();
        parse_ok(&mut db, src);
        db
    }

    fn parse_ok(db: &mut DevicesDb, src: &str) {
        let mut diag = Vec::new();
        let ok = Parser::new(src.as_bytes(), Some(&mut diag), db).run();
        assert!(
            ok,
            "expected successful parse, got: {}",
            String::from_utf8_lossy(&diag)
        );
    }

    /// Parse a stream that must fail; returns the diagnostics text.
    fn parse_err(db: &mut DevicesDb, src: &str) -> String {
        let mut diag = Vec::new();
        let ok = Parser::new(src.as_bytes(), Some(&mut diag), db).run();
        let text = String::from_utf8_lossy(&diag).into_owned();
        assert!(!ok, "parse unexpectedly succeeded");
        text
    }

    fn device(db: &DevicesDb, vid: u16, pid: u16) -> &DeviceData {
        db.devices
            .get(&HidIds::new(vid, pid))
            .expect("device in db")
    }

    fn binding<'d>(data: &'d DeviceData, input: &str) -> &'d FullBinding {
        data.bindings
            .bindings
            .get(&StrHash::of(input))
            .expect("binding present")
    }

    const GP: &str = "interfaces { gp { btn: a b\n abs: lsx lsy\n rel: wheel } }\n";

    fn pad(body: &str) -> String {
        format!("{GP}devices {{ 044f.b323 {{ interfaces = gp\n {body}\n }} }}\n")
    }

    // ---- top level ----

    #[test]
    fn test_empty_stream_commits_nothing() {
        let db = fresh("\n\n# just a comment\n");
        assert!(db.interfaces.is_empty() && db.devices.is_empty());
    }

    #[test]
    fn test_unknown_top_level_token() {
        let text = parse_err(&mut DevicesDb::default(), "gizmos { }\n");
        assert!(text.contains("unexpected token gizmos"), "got: {text}");
    }

    // ---- interfaces ----

    #[test]
    fn test_interface_declares_inputs_and_names() {
        let db = fresh(GP);
        let gp = db.interfaces.get(&StrHash::of("gp")).expect("gp declared");
        assert_eq!(gp.get(&StrHash::of("a")), Some(&InterfaceInputType::Button));
        assert_eq!(
            gp.get(&StrHash::of("lsx")),
            Some(&InterfaceInputType::AbsoluteAxis)
        );
        assert_eq!(
            gp.get(&StrHash::of("wheel")),
            Some(&InterfaceInputType::RelativeAxis)
        );
        assert_eq!(
            db.name_of_hash.get(&StrHash::of("gp.lsx")).map(String::as_str),
            Some("gp.lsx")
        );
    }

    #[test]
    fn test_interface_redeclaration_must_match() {
        let mut db = fresh(GP);
        // Exact same declaration: fine.
        parse_ok(&mut db, GP);
        // Type change: rejected.
        let text = parse_err(&mut db, "interfaces { gp { btn: a b lsx lsy\n rel: wheel } }\n");
        assert!(text.contains("does not match"), "got: {text}");
        // Missing entry: rejected.
        let text = parse_err(&mut db, "interfaces { gp { btn: a b } }\n");
        assert!(text.contains("does not match"), "got: {text}");
        // Extra entry: rejected.
        let text = parse_err(
            &mut db,
            "interfaces { gp { btn: a b c\n abs: lsx lsy\n rel: wheel } }\n",
        );
        assert!(text.contains("does not match"), "got: {text}");
    }

    #[test]
    fn test_interface_duplicate_in_same_stream() {
        let text = parse_err(
            &mut DevicesDb::default(),
            "interfaces { gp { btn: a } gp { btn: a } }\n",
        );
        assert!(text.contains("multiple definition of the interface gp"));
    }

    #[test]
    fn test_interface_input_without_type() {
        let text = parse_err(&mut DevicesDb::default(), "interfaces { gp { a b } }\n");
        assert!(text.contains("undefined input type"));
    }

    #[test]
    fn test_interface_duplicate_input() {
        let text = parse_err(&mut DevicesDb::default(), "interfaces { gp { btn: a a } }\n");
        assert!(text.contains("input a defined multiple times"));
    }

    // ---- icons ----

    #[test]
    fn test_icons_store_content_without_quotes() {
        let db = fresh("icons { psx_cross \"✕\"\n psx_square \"□\"\n}\n");
        assert_eq!(
            db.icons.get(&StrHash::of("psx_cross")).map(String::as_str),
            Some("✕")
        );
    }

    #[test]
    fn test_icon_duplicate_in_same_stream() {
        let text = parse_err(
            &mut DevicesDb::default(),
            "icons { x \"a\"\n x \"b\" }\n",
        );
        assert!(text.contains("multiple definition of the icon x"));
    }

    // ---- labels ----

    #[test]
    fn test_labels_preset_with_parent() {
        let mut db = fresh(GP);
        parse_ok(
            &mut db,
            "labels {\n base {\n gp.a \"A\"\n }\n fancy : base {\n gp.b \"B\" ff8000\n }\n}\n",
        );
        let fancy = db.labels.get(&StrHash::of("fancy")).expect("preset");
        assert_eq!(fancy.parent, StrHash::of("base"));
        let entry = fancy.entries.get(&StrHash::of("gp.b")).expect("entry");
        assert!(entry.has_color);
        assert_eq!((entry.color.r, entry.color.g, entry.color.b), (255, 128, 0));
    }

    #[test]
    fn test_labels_unknown_parent() {
        let mut db = fresh(GP);
        let text = parse_err(&mut db, "labels { fancy : missing { gp.a \"A\" } }\n");
        assert!(text.contains("labels fancy extends unknown labels missing"));
    }

    #[test]
    fn test_labels_preset_requires_qualified_inputs() {
        let mut db = fresh(GP);
        let text = parse_err(&mut db, "labels { p { a \"A\"\n } }\n");
        assert!(text.contains("label a does not belong to any interface"));
    }

    #[test]
    fn test_labels_unknown_interface_and_input() {
        let mut db = fresh(GP);
        let text = parse_err(&mut db, "labels { p { wheel.turn \"T\"\n } }\n");
        assert!(text.contains("unknown interface wheel"));
        let text = parse_err(&mut db, "labels { p { gp.turbo \"T\"\n } }\n");
        assert!(text.contains("unknown input turbo in interface gp"));
    }

    #[test]
    fn test_labels_duplicate_entry() {
        let mut db = fresh(GP);
        let text = parse_err(&mut db, "labels { p { gp.a \"A\"\n gp.a \"B\"\n } }\n");
        assert!(text.contains("label a defined multiple times"));
    }

    #[test]
    fn test_labels_bad_color() {
        let mut db = fresh(GP);
        let text = parse_err(&mut db, "labels { p { gp.a \"A\" ff00 } }\n");
        assert!(text.contains("ff00 is not an RRGGBB sRGB hex color"));
    }

    #[test]
    fn test_label_nil_entry_keeps_empty_label() {
        let mut db = fresh(GP);
        parse_ok(&mut db, "labels { p { gp.a nil\n } }\n");
        let preset = db.labels.get(&StrHash::of("p")).expect("preset");
        let entry = preset.entries.get(&StrHash::of("gp.a")).expect("entry");
        assert!(entry.label.is_empty() && !entry.has_color);
    }

    // ---- devices: structure ----

    #[test]
    fn test_device_header_and_body() {
        let db = fresh(&pad("name = \"Pad\"\n default: gp.a = b0"));
        let data = device(&db, 0x044f, 0xb323);
        assert_eq!(data.name, "Pad");
        assert_eq!(data.parent, HidIds::INVALID);
        assert_eq!(data.interfaces, vec![StrHash::of("gp")]);
        assert_eq!(
            binding(data, "gp.a").positive,
            vec![vec![SingleBinding {
                kind: DeviceInputType::Button,
                index: 0,
                invert: false,
                half: false,
            }]]
        );
    }

    #[test]
    fn test_device_invalid_ids() {
        let text = parse_err(&mut DevicesDb::default(), "devices { zz4f.0001 { } }\n");
        assert!(text.contains("invalid device id zz4f"));
        let text = parse_err(&mut DevicesDb::default(), "devices { 044f.123456 { } }\n");
        assert!(text.contains("invalid product id 123456"));
    }

    #[test]
    fn test_device_duplicate_in_stream() {
        let src = format!(
            "{GP}devices {{ 044f.b323 {{ interfaces = gp\n }} 044f.b323 {{ }} }}\n"
        );
        let text = parse_err(&mut DevicesDb::default(), &src);
        assert!(text.contains("multiple definition of the device 044f.b323"));
    }

    #[test]
    fn test_device_override_across_streams() {
        let mut db = fresh(&pad("default: gp.a = b0"));
        parse_ok(
            &mut db,
            "devices { 044f.b323 { interfaces = gp\n default: gp.a = b9\n } }\n",
        );
        let data = device(&db, 0x044f, 0xb323);
        assert_eq!(binding(data, "gp.a").positive[0][0].index, 9);
    }

    #[test]
    fn test_device_unknown_parent() {
        let text = parse_err(
            &mut DevicesDb::default(),
            "devices { 1234.0001 : dead.beef { } }\n",
        );
        assert!(text.contains("unknown parent dead.beef"));
    }

    #[test]
    fn test_device_self_parent_rejected() {
        let mut db = fresh(&pad("default: gp.a = b0"));
        let text = parse_err(&mut db, "devices { 044f.b323 : 044f.b323 { } }\n");
        assert!(text.contains("cannot inherit itself"));
    }

    #[test]
    fn test_child_uses_inherited_interfaces_for_unqualified_inputs() {
        let mut db = fresh(&pad("default: gp.a = b0"));
        // `lsx` is unqualified and resolved through the parent's interface.
        parse_ok(
            &mut db,
            "devices { 044f.b324 : 044f.b323 {\n default: lsx = a2\n } }\n",
        );
        let data = device(&db, 0x044f, 0xb324);
        assert_eq!(
            binding(data, "gp.lsx").positive[0][0].kind,
            DeviceInputType::AbsoluteAxis
        );
    }

    #[test]
    fn test_sibling_devices_do_not_leak_interfaces() {
        let src = format!(
            "{GP}devices {{\n 044f.b323 {{ interfaces = gp\n }}\n 044f.b324 {{ default: a = b0\n }}\n }}\n"
        );
        let text = parse_err(&mut DevicesDb::default(), &src);
        assert!(
            text.contains("input a does not belong to any interface"),
            "got: {text}"
        );
    }

    #[test]
    fn test_unknown_interface_on_device() {
        let text = parse_err(
            &mut DevicesDb::default(),
            "devices { 044f.b323 { interfaces = gp\n } }\n",
        );
        assert!(text.contains("unknown interface gp"));
    }

    #[test]
    fn test_interfaces_continuation_line() {
        let src = format!(
            "{GP}interfaces {{ extra {{ btn: turbo }} }}\ndevices {{ 044f.b323 {{\n interfaces = gp +\n extra\n default: turbo = b9\n }} }}\n"
        );
        let db = fresh(&src);
        let data = device(&db, 0x044f, 0xb323);
        assert_eq!(data.interfaces.len(), 2);
        assert!(data
            .bindings
            .bindings
            .contains_key(&StrHash::of("extra.turbo")));
    }

    #[test]
    fn test_device_name_requires_string() {
        let text = parse_err(&mut DevicesDb::default(), "devices { 044f.b323 { name = pad\n } }\n");
        assert!(text.contains("unexpected token pad"));
        let text = parse_err(&mut DevicesDb::default(), "devices { 044f.b323 { name =\n } }\n");
        assert!(text.contains("no device name at the end of line"));
    }

    // ---- devices: labels ----

    #[test]
    fn test_device_labels_presets_and_inline_block() {
        let src = format!(
            "{GP}labels {{ base {{ gp.a \"A\"\n }} more {{ gp.b \"B\"\n }} }}\n\
             devices {{ 044f.b323 {{ interfaces = gp\n labels = base more {{ lsx \"Stick X\" 00ff00\n a \"Cross\", b nil\n }}\n default: gp.a = b0\n }} }}\n"
        );
        let db = fresh(&src);
        let data = device(&db, 0x044f, 0xb323);
        assert_eq!(
            data.preset_labels,
            vec![StrHash::of("base"), StrHash::of("more")]
        );
        let own = data.own_labels.get(&StrHash::of("gp.lsx")).expect("own label");
        assert_eq!(own.label, "Stick X");
        assert!(own.has_color);
        assert_eq!(
            data.own_labels
                .get(&StrHash::of("gp.a"))
                .map(|l| l.label.as_str()),
            Some("Cross"),
            "comma separates entries on one line"
        );
        assert!(data.own_labels.contains_key(&StrHash::of("gp.b")));
    }

    #[test]
    fn test_device_labels_block_on_next_line() {
        let src = format!(
            "{GP}devices {{ 044f.b323 {{ interfaces = gp\n labels =\n {{ a \"Cross\"\n }}\n default: gp.a = b0\n }} }}\n"
        );
        let db = fresh(&src);
        let data = device(&db, 0x044f, 0xb323);
        assert!(data.own_labels.contains_key(&StrHash::of("gp.a")));
    }

    #[test]
    fn test_device_unknown_labels_preset() {
        let src = format!("{GP}devices {{ 044f.b323 {{ interfaces = gp\n labels = nope\n }} }}\n");
        let text = parse_err(&mut DevicesDb::default(), &src);
        assert!(text.contains("unknown labels nope"));
    }

    #[test]
    fn test_device_labels_preset_used_twice() {
        let src = format!(
            "{GP}labels {{ base {{ gp.a \"A\"\n }} }}\ndevices {{ 044f.b323 {{ interfaces = gp\n labels = base base\n }} }}\n"
        );
        let text = parse_err(&mut DevicesDb::default(), &src);
        assert!(text.contains("labels preset base used multiple times"));
    }

    // ---- devices: config tags ----

    #[test]
    fn test_tag_trees_present_and_absent() {
        let db = fresh(&pad(
            "default: gp.a = b0\n xinput: { gp.a = b3 }\n !xinput: { gp.a = b4 }",
        ));
        let data = device(&db, 0x044f, 0xb323);
        let gate = data
            .bindings
            .nested
            .get(&StrHash::of("xinput"))
            .expect("gate");
        assert!(gate.present.is_some() && gate.absent.is_some());
    }

    #[test]
    fn test_tag_duplicate_same_level() {
        let text = parse_err(
            &mut DevicesDb::default(),
            &pad("default: gp.a = b0\n xinput: { gp.a = b3 }\n xinput: { gp.a = b4 }"),
        );
        assert!(text.contains("config tag already defined"));
    }

    #[test]
    fn test_nested_tags() {
        let db = fresh(&pad(
            "default: gp.a = b0\n xinput: {\n ps4: gp.a = b5\n }",
        ));
        let data = device(&db, 0x044f, 0xb323);
        let xinput = data
            .bindings
            .nested
            .get(&StrHash::of("xinput"))
            .and_then(|g| g.present.as_deref())
            .expect("xinput subtree");
        let ps4 = xinput
            .nested
            .get(&StrHash::of("ps4"))
            .and_then(|g| g.present.as_deref())
            .expect("nested ps4 subtree");
        assert!(ps4.bindings.contains_key(&StrHash::of("gp.a")));
    }

    #[test]
    fn test_brace_without_tag() {
        let text = parse_err(
            &mut DevicesDb::default(),
            &pad("default: {\n gp.a = b0\n }"),
        );
        assert!(text.contains("no config tag to nest"));
    }

    #[test]
    fn test_binding_after_closed_brace_lands_in_outer_scope() {
        let db = fresh(&pad("default: xinput: {\n gp.a = b3\n }\n gp.b = b5"));
        let data = device(&db, 0x044f, 0xb323);
        assert!(
            data.bindings.bindings.contains_key(&StrHash::of("gp.b")),
            "binding after }} belongs to the root scope"
        );
    }

    // ---- binding statements ----

    #[test]
    fn test_qualified_binding_requires_declared_interface() {
        let src = format!(
            "{GP}interfaces {{ extra {{ btn: turbo }} }}\ndevices {{ 044f.b323 {{ interfaces = gp\n default: extra.turbo = b0\n }} }}\n"
        );
        let text = parse_err(&mut DevicesDb::default(), &src);
        assert!(text.contains("device does not implement interface extra"));
    }

    #[test]
    fn test_unknown_input_in_interface() {
        let text = parse_err(
            &mut DevicesDb::default(),
            &pad("default: gp.turbo = b0"),
        );
        assert!(text.contains("unknown input turbo in interface gp"));
    }

    #[test]
    fn test_ambiguous_unqualified_input() {
        let src = format!(
            "{GP}interfaces {{ gp2 {{ btn: a }} }}\ndevices {{ 044f.b323 {{ interfaces = gp +\n gp2\n default: a = b0\n }} }}\n"
        );
        let text = parse_err(&mut DevicesDb::default(), &src);
        assert!(text.contains("input a belongs to several interfaces"));
    }

    #[test]
    fn test_duplicate_binding_same_tag() {
        let text = parse_err(
            &mut DevicesDb::default(),
            &pad("default: gp.a = b0\n gp.a = b1"),
        );
        assert!(text.contains("input defined multiple times for the same config tag"));
    }

    #[test]
    fn test_same_input_under_different_tags() {
        let db = fresh(&pad("default: gp.a = b0\n xinput: gp.a = b1"));
        let data = device(&db, 0x044f, 0xb323);
        assert!(data.bindings.bindings.contains_key(&StrHash::of("gp.a")));
    }

    // ---- binding expressions ----

    #[test]
    fn test_signed_axis_full_expansion() {
        let db = fresh(&pad("default: gp.lsx = a0"));
        let full = binding(device(&db, 0x044f, 0xb323), "gp.lsx");
        assert_eq!(
            full.positive,
            vec![vec![SingleBinding {
                kind: DeviceInputType::AbsoluteAxis,
                index: 0,
                invert: false,
                half: true,
            }]]
        );
        assert_eq!(
            full.negative,
            vec![vec![SingleBinding {
                kind: DeviceInputType::AbsoluteAxis,
                index: 0,
                invert: true,
                half: true,
            }]]
        );
    }

    #[test]
    fn test_half_mirroring_property() {
        // The negative half equals the positive half with invert flipped.
        let db = fresh(&pad("default: gp.lsx = ~a2|h0x"));
        let full = binding(device(&db, 0x044f, 0xb323), "gp.lsx");
        assert_eq!(full.positive.len(), full.negative.len());
        for (pos_clause, neg_clause) in full.positive.iter().zip(&full.negative) {
            for (pos, neg) in pos_clause.iter().zip(neg_clause) {
                assert_eq!(pos.kind, neg.kind);
                assert_eq!(pos.index, neg.index);
                assert_eq!(pos.half, neg.half);
                assert_eq!(pos.invert, !neg.invert);
            }
        }
    }

    #[test]
    fn test_or_and_expression_shape() {
        let db = fresh(&pad("default: gp.a = b0|b1&b2|b3"));
        let full = binding(device(&db, 0x044f, 0xb323), "gp.a");
        assert_eq!(full.positive.len(), 3, "three OR clauses");
        assert_eq!(full.positive[1].len(), 2, "middle clause ANDs two atoms");
        assert!(full.negative.is_empty());
    }

    #[test]
    fn test_hat_atoms_encode_two_axes() {
        let db = fresh(&pad("default: gp.lsx + = h1y"));
        let full = binding(device(&db, 0x044f, 0xb323), "gp.lsx");
        assert_eq!(full.positive[0][0].kind, DeviceInputType::Hat);
        assert_eq!(full.positive[0][0].index, 3, "hat 1 y-axis is index 3");
        assert!(full.negative.is_empty());
    }

    #[test]
    fn test_qualified_half_bindings() {
        let db = fresh(&pad("default: gp.lsx + = a2+\n gp.lsx - = a2-"));
        let full = binding(device(&db, 0x044f, 0xb323), "gp.lsx");
        assert_eq!(full.positive[0][0].invert, false);
        assert!(full.positive[0][0].half);
        assert!(full.negative[0][0].invert, "a2- inverts the half");
        assert!(full.negative[0][0].half);
    }

    #[test]
    fn test_tilde_composes_with_minus() {
        let db = fresh(&pad("default: gp.lsx + = ~a2-"));
        let full = binding(device(&db, 0x044f, 0xb323), "gp.lsx");
        assert!(
            !full.positive[0][0].invert,
            "~ and - cancel out on the same atom"
        );
        assert!(full.positive[0][0].half);
    }

    #[test]
    fn test_space_allowed_before_expression_only() {
        let db = fresh(&pad("default: gp.a = b0"));
        assert!(binding(device(&db, 0x044f, 0xb323), "gp.a").positive[0][0].index == 0);
        let text = parse_err(
            &mut DevicesDb::default(),
            &pad("default: gp.a = b0 | b1"),
        );
        assert!(
            text.contains("unexpected token |"),
            "operators must be stuck to their atoms: {text}"
        );
    }

    #[test]
    fn test_nil_suppresses_and_complex_nil_rejected() {
        let db = fresh(&pad("default: gp.a = nil"));
        let full = binding(device(&db, 0x044f, 0xb323), "gp.a");
        assert!(full.positive.is_empty() && full.negative.is_empty());

        let text = parse_err(&mut DevicesDb::default(), &pad("default: gp.a = b0|nil"));
        assert!(text.contains("nil input in complex binding"));
        let text = parse_err(&mut DevicesDb::default(), &pad("default: gp.a = nil&b0"));
        assert!(text.contains("nil input in complex binding"));
    }

    #[test]
    fn test_index_errors() {
        let text = parse_err(&mut DevicesDb::default(), &pad("default: gp.a = b"));
        assert!(text.contains("index is missing in b"));
        let text = parse_err(&mut DevicesDb::default(), &pad("default: gp.a = b256"));
        assert!(text.contains("index of b256 outside range [0-255]"));
        let text = parse_err(&mut DevicesDb::default(), &pad("default: gp.a = q1"));
        assert!(text.contains("unknown input q1"));
    }

    #[test]
    fn test_hat_requires_axis_suffix() {
        let text = parse_err(&mut DevicesDb::default(), &pad("default: gp.a = h0"));
        assert!(text.contains("unexpected token h0"));
    }

    #[test]
    fn test_type_mismatch_errors() {
        // Button input bound to half an axis.
        let text = parse_err(&mut DevicesDb::default(), &pad("default: gp.a = a0+"));
        assert!(text.contains("can't bind a button to half an axis"));
        // Half-only statement on a button input.
        let text = parse_err(&mut DevicesDb::default(), &pad("default: gp.a + = b0"));
        assert!(text.contains("can't bind to half a button"));
        // Button atom when both halves of a signed input are requested.
        let text = parse_err(&mut DevicesDb::default(), &pad("default: gp.lsx = b0"));
        assert!(text.contains("can't bind a button to a full axis"));
        // Explicit half atom when both halves are requested.
        let text = parse_err(&mut DevicesDb::default(), &pad("default: gp.lsx = a0+"));
        assert!(text.contains("can't bind half an axis to a whole input"));
    }

    #[test]
    fn test_binding_expected_on_empty_expression() {
        let text = parse_err(&mut DevicesDb::default(), &pad("default: gp.a ="));
        assert!(text.contains("binding expected"));
    }

    #[test]
    fn test_relative_axis_bindings() {
        let db = fresh(&pad("default: gp.wheel = r0"));
        let full = binding(device(&db, 0x044f, 0xb323), "gp.wheel");
        assert_eq!(full.positive[0][0].kind, DeviceInputType::RelativeAxis);
        assert!(full.positive[0][0].half, "full signed expansion forces half");
        assert_eq!(full.negative[0][0].invert, true);
    }

    // ---- transactionality ----

    #[test]
    fn test_failed_stream_stages_nothing() {
        let mut db = DevicesDb::default();
        let text = parse_err(
            &mut db,
            "interfaces { gp { btn: a } }\nicons { x \"!\"\n }\ndevices { 044f.0001 : dead.beef { } }\n",
        );
        assert!(text.contains("unknown parent"));
        assert!(db.interfaces.is_empty(), "interfaces must not leak");
        assert!(db.icons.is_empty(), "icons must not leak");
        assert!(db.devices.is_empty());
    }

    #[test]
    fn test_line_numbers_in_diagnostics() {
        let text = parse_err(
            &mut DevicesDb::default(),
            "interfaces {\n gp {\n btn: a\n btn: a\n }\n}\n",
        );
        assert!(
            text.starts_with("Line 4:"),
            "duplicate input reported on its line: {text}"
        );
    }
}
