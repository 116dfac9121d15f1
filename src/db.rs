//! Query facade.
//!
//! [`MappingsDb`] owns the live database and the process-wide global config
//! tags. Sources are fed in through the `parse_*` methods (each call is
//! transactional: on error the database is left exactly as it was), devices
//! come back out of [`MappingsDb::device`] as self-contained snapshots.
//!
//! ```no_run
//! use padmap::{HidIds, MappingsDb};
//!
//! let mut db = MappingsDb::new();
//! db.set_global_tags(["linux"]);
//! db.parse_default(None).expect("load database");
//! let pad = db.device(HidIds::new(0x054c, 0x0268));
//! if !pad.is_empty() {
//!     println!("{}: {:?}", pad.name(), pad.label("basic_gamepad.a"));
//! }
//! ```

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::hash::StrHash;
use crate::parser::Parser;
use crate::settings::Settings;
use crate::store::DevicesDb;
use crate::types::{HidIds, InterfaceInputType};

/// File name `parse_default` looks for.
const DEFAULT_DB_FILE: &str = "padmapdb.txt";

/// The mapping database: parse sources in, query devices out.
#[derive(Default)]
pub struct MappingsDb {
    db: DevicesDb,
    global_tags: Vec<StrHash>,
}

impl MappingsDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config tags applied to every query (e.g. `"linux"`,
    /// `"xinput"`). Duplicates are dropped.
    pub fn set_global_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.global_tags.clear();
        for tag in tags {
            let hash = StrHash::of(tag.as_ref());
            if !self.global_tags.contains(&hash) {
                self.global_tags.push(hash);
            }
        }
    }

    /// Parse database text from a reader. Diagnostics, if any, go to the
    /// optional sink as `Line N: …` lines.
    ///
    /// On success the definitions are merged into the database (replacing
    /// earlier ones on key collision); on failure the database is untouched.
    pub fn parse_stream<R: Read>(
        &mut self,
        mut reader: R,
        diagnostics: Option<&mut dyn Write>,
    ) -> Result<()> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.parse_bytes(&bytes, diagnostics)
    }

    /// Parse database text held in memory.
    pub fn parse_str(&mut self, text: &str, diagnostics: Option<&mut dyn Write>) -> Result<()> {
        self.parse_bytes(text.as_bytes(), diagnostics)
    }

    /// Parse a database file.
    pub fn parse_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        diagnostics: Option<&mut dyn Write>,
    ) -> Result<()> {
        let bytes = fs::read(path)?;
        self.parse_bytes(&bytes, diagnostics)
    }

    /// Parse the default database file: `padmapdb.txt` in the OS user-data
    /// directory first, then in the working directory.
    pub fn parse_default(&mut self, diagnostics: Option<&mut dyn Write>) -> Result<()> {
        for path in default_db_paths() {
            if path.is_file() {
                return self.parse_file(path, diagnostics);
            }
        }
        Err(Error::NoDatabaseFile)
    }

    /// Apply runtime [`Settings`]: install the global tags and parse every
    /// listed database file in order.
    pub fn apply_settings(
        &mut self,
        settings: &Settings,
        mut diagnostics: Option<&mut dyn Write>,
    ) -> Result<()> {
        self.set_global_tags(&settings.tags);
        for path in &settings.databases {
            let sink = diagnostics.as_mut().map(|out| &mut **out as &mut dyn Write);
            self.parse_file(path, sink)?;
        }
        Ok(())
    }

    fn parse_bytes<'a>(&mut self, bytes: &'a [u8], diagnostics: Option<&'a mut dyn Write>) -> Result<()> {
        if Parser::new(bytes, diagnostics, &mut self.db).run() {
            Ok(())
        } else {
            Err(Error::Parse)
        }
    }

    // ---- queries ----

    /// Whether the database has an entry for these HID ids.
    pub fn has_device(&self, ids: HidIds) -> bool {
        self.db.devices.contains_key(&ids)
    }

    /// Resolve a device with the global config tags. Unknown ids yield an
    /// empty [`Device`].
    pub fn device(&self, ids: HidIds) -> Device {
        Device::resolve(ids, &self.db, &self.global_tags)
    }

    /// Resolve a device with the global tags plus `extra_tags`. The result
    /// depends only on the *set* of tags; order and duplicates don't matter.
    pub fn device_with_tags(&self, ids: HidIds, extra_tags: &[StrHash]) -> Device {
        let mut tags = self.global_tags.clone();
        for &tag in extra_tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        Device::resolve(ids, &self.db, &tags)
    }

    /// Reverse-lookup the `"iface.input"` string behind a hash. Empty for
    /// unknown hashes.
    pub fn string_from_hash(&self, hash: StrHash) -> &str {
        self.db
            .name_of_hash
            .get(&hash)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// The declared type of an interface input, by `"iface.input"` hash.
    /// [`InterfaceInputType::Nil`] for unknown hashes.
    pub fn interface_input_type(&self, hash: StrHash) -> InterfaceInputType {
        let Some((iface, input)) = self.string_from_hash(hash).split_once('.') else {
            return InterfaceInputType::Nil;
        };
        self.db
            .interfaces
            .get(&StrHash::of(iface))
            .and_then(|entries| entries.get(&StrHash::of(input)))
            .copied()
            .unwrap_or(InterfaceInputType::Nil)
    }
}

fn default_db_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dirs) = directories::ProjectDirs::from("", "", "padmap") {
        paths.push(dirs.data_dir().join(DEFAULT_DB_FILE));
    }
    paths.push(PathBuf::from(DEFAULT_DB_FILE));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceInputType, SingleBinding};

    const PAD: HidIds = HidIds::new(0x044f, 0xb323);

    fn db_from(src: &str) -> MappingsDb {
        let mut db = MappingsDb::new();
        let mut diag = Vec::new();
        let parsed = db.parse_str(src, Some(&mut diag));
        assert!(
            parsed.is_ok(),
            "parse failed: {}",
            String::from_utf8_lossy(&diag)
        );
        db
    }

    fn button(index: u8) -> SingleBinding {
        SingleBinding {
            kind: DeviceInputType::Button,
            index,
            invert: false,
            half: false,
        }
    }

    const MINIMAL: &str = "\
interfaces { gp { btn: a b } }
devices {
\t044f.b323 {
\t\tname = \"Pad\"
\t\tinterfaces = gp
\t\tdefault: gp.a = b0
\t\tgp.b = b1
\t}
}
";

    #[test]
    fn test_empty_db_queries() {
        let db = MappingsDb::new();
        assert!(!db.has_device(HidIds::new(0x1234, 0x5678)));
        assert!(db.device(HidIds::new(0x1234, 0x5678)).is_empty());
        assert_eq!(db.string_from_hash(StrHash::of("gp.a")), "");
        assert_eq!(
            db.interface_input_type(StrHash::of("gp.a")),
            InterfaceInputType::Nil
        );
    }

    #[test]
    fn test_minimal_device() {
        let db = db_from(MINIMAL);
        assert!(db.has_device(PAD));
        let device = db.device(PAD);
        assert_eq!(device.name(), "Pad");
        let infos = device.input_infos("gp.a").expect("gp.a bound");
        assert_eq!(infos.bindings.positive, vec![vec![button(0)]]);
        assert!(infos.bindings.negative.is_empty());
        let infos = device.input_infos("gp.b").expect("gp.b bound");
        assert_eq!(infos.bindings.positive, vec![vec![button(1)]]);
    }

    #[test]
    fn test_reverse_lookup() {
        let db = db_from(MINIMAL);
        assert_eq!(db.string_from_hash(StrHash::of("gp.a")), "gp.a");
        assert_eq!(
            db.interface_input_type(StrHash::of("gp.a")),
            InterfaceInputType::Button
        );
        assert_eq!(
            db.interface_input_type(StrHash::of("gp.nope")),
            InterfaceInputType::Nil
        );
    }

    #[test]
    fn test_transactional_failure_leaves_db_unchanged() {
        let mut db = db_from(MINIMAL);
        // Valid interfaces block followed by a devices block with an unknown
        // parent: nothing of the stream may land.
        let bad = "\
interfaces { wheel { abs: turn } }
devices { 1234.0001 : dead.beef { interfaces = wheel } }
";
        assert!(matches!(db.parse_str(bad, None), Err(Error::Parse)));
        assert!(
            !db.has_device(HidIds::new(0x1234, 0x0001)),
            "failed stream must not install devices"
        );
        assert_eq!(
            db.interface_input_type(StrHash::of("wheel.turn")),
            InterfaceInputType::Nil,
            "failed stream must not install interfaces"
        );
        // The pre-existing data is still intact.
        assert!(db.device(PAD).has_input("gp.a"));
    }

    #[test]
    fn test_monotonic_success_across_streams() {
        let mut db = db_from("interfaces { gp { btn: a b } }");
        db.parse_str(
            "devices { 044f.b323 { interfaces = gp\n default: gp.a = b7 } }",
            None,
        )
        .expect("second stream uses interfaces from the first");
        assert_eq!(
            db.device(PAD)
                .input_infos("gp.a")
                .map(|i| i.bindings.positive.clone()),
            Some(vec![vec![button(7)]])
        );
    }

    #[test]
    fn test_inheritance_and_override() {
        let mut db = db_from(MINIMAL);
        db.parse_str(
            "devices { 044f.b324 : 044f.b323 {\n default: gp.a = b2\n } }",
            None,
        )
        .expect("child device");
        let child = db.device(HidIds::new(0x044f, 0xb324));
        assert_eq!(child.name(), "Pad", "name inherited from parent");
        assert_eq!(
            child.input_infos("gp.a").map(|i| i.bindings.positive.clone()),
            Some(vec![vec![button(2)]]),
            "child overrides gp.a"
        );
        assert_eq!(
            child.input_infos("gp.b").map(|i| i.bindings.positive.clone()),
            Some(vec![vec![button(1)]]),
            "gp.b inherited"
        );
    }

    #[test]
    fn test_tag_gating() {
        let src = "\
interfaces { gp { btn: a b } }
devices {
\t044f.b323 {
\t\tinterfaces = gp
\t\tdefault: gp.a = b0
\t\txinput: { gp.a = b3 }
\t\t!sdl: { gp.b = b5 }
\t}
}
";
        let db = db_from(src);

        let plain = db.device(PAD);
        assert_eq!(
            plain.input_infos("gp.a").map(|i| i.bindings.positive.clone()),
            Some(vec![vec![button(0)]])
        );
        assert!(plain.has_input("gp.b"), "sdl absent selects the !sdl branch");

        let xinput = db.device_with_tags(PAD, &[StrHash::of("xinput")]);
        assert_eq!(
            xinput.input_infos("gp.a").map(|i| i.bindings.positive.clone()),
            Some(vec![vec![button(3)]])
        );
        assert_eq!(
            xinput.input_infos("gp.b").map(|i| i.bindings.positive.clone()),
            Some(vec![vec![button(5)]])
        );

        let both = db.device_with_tags(PAD, &[StrHash::of("xinput"), StrHash::of("sdl")]);
        assert_eq!(
            both.input_infos("gp.a").map(|i| i.bindings.positive.clone()),
            Some(vec![vec![button(3)]])
        );
        assert!(
            !both.has_input("gp.b"),
            "with sdl present the !sdl branch is skipped and gp.b has no default"
        );
    }

    #[test]
    fn test_resolver_depends_only_on_tag_set() {
        let src = "\
interfaces { gp { btn: a } }
devices { 044f.b323 { interfaces = gp
 default: gp.a = b0
 x: { gp.a = b1 }
} }
";
        let db = db_from(src);
        let x = StrHash::of("x");
        let a = db.device_with_tags(PAD, &[x]);
        let b = db.device_with_tags(PAD, &[x, x, x]);
        assert_eq!(
            a.input_infos("gp.a").map(|i| i.bindings.positive.clone()),
            b.input_infos("gp.a").map(|i| i.bindings.positive.clone()),
            "duplicate tags are irrelevant"
        );
    }

    #[test]
    fn test_global_tags_dedup_and_merge() {
        let src = "\
interfaces { gp { btn: a } }
devices { 044f.b323 { interfaces = gp
 default: gp.a = b0
 x: { gp.a = b1 }
} }
";
        let mut db = db_from(src);
        db.set_global_tags(["x", "x"]);
        assert_eq!(
            db.device(PAD)
                .input_infos("gp.a")
                .map(|i| i.bindings.positive.clone()),
            Some(vec![vec![button(1)]]),
            "global tags apply to plain device() queries"
        );
    }

    #[test]
    fn test_icon_label_resolution() {
        let src = "\
interfaces { gp { btn: a } }
icons { psx_cross \"✕\" }
labels {
\tpsx {
\t\tgp.a \"$psx_cross Cross\" ff0000
\t}
}
devices { 044f.b323 { interfaces = gp
 labels = psx
 default: gp.a = b0
} }
";
        let db = db_from(src);
        let device = db.device(PAD);
        let label = device.label("gp.a").expect("labeled input");
        assert!(label.has_label && label.has_color);
        assert_eq!((label.color.r, label.color.g, label.color.b), (255, 0, 0));
        assert_eq!(label.variable_name, "psx_cross");
        assert_eq!(label.ascii, "Cross");
        assert_eq!(label.utf8, "✕");
    }

    #[test]
    fn test_nil_suppression_of_inherited_binding() {
        let mut db = db_from(MINIMAL);
        db.parse_str(
            "devices { 044f.b324 : 044f.b323 {\n default: gp.b = nil\n } }",
            None,
        )
        .expect("child device");
        let child = db.device(HidIds::new(0x044f, 0xb324));
        assert!(child.has_input("gp.a"), "gp.a still inherited");
        assert!(!child.has_input("gp.b"), "nil suppresses the inherited binding");
        assert!(
            child.iter().all(|(_, info)| !info.bindings.is_empty()),
            "no resolved input may have two empty halves"
        );
    }

    #[test]
    fn test_label_override_chain() {
        let src = "\
interfaces { gp { btn: a b } }
labels {
\tbase {
\t\tgp.a \"Base A\"
\t\tgp.b \"Base B\"
\t}
\tfancy : base {
\t\tgp.a \"Fancy A\"
\t}
}
devices {
\t044f.b323 {
\t\tinterfaces = gp
\t\tlabels = fancy {
\t\t\tb nil
\t\t}
\t\tdefault: gp.a = b0
\t\tgp.b = b1
\t}
}
";
        let db = db_from(src);
        let device = db.device(PAD);
        assert_eq!(
            device.label("gp.a").map(|l| l.ascii.as_str()),
            Some("Fancy A"),
            "child preset overrides its parent"
        );
        let b_label = device.label("gp.b").expect("gp.b bound");
        assert!(
            !b_label.has_label,
            "device-local nil drops the preset label"
        );
        assert_eq!(b_label.ascii, "B2", "generic label takes over");
    }

    #[test]
    fn test_device_view_json_export() {
        let db = db_from(MINIMAL);
        let json = db.device(PAD).to_json().expect("serializable view");
        assert!(json.contains("\"Pad\""));
    }

    #[test]
    fn test_default_file_name() {
        assert!(default_db_paths()
            .iter()
            .all(|p| p.ends_with(DEFAULT_DB_FILE)));
    }
}
