//! Index manifest (C2).
//!
//! Hand-written line-oriented text format, in the same spirit as
//! `bisync/state.rs`'s `load_from_file`/`save_to_file`: a fixed magic header
//! line, an `[hairgap]` attribute section, and a `[files]` section of
//! `<sha256-hex> = <relpath>` entries in walk order.

use crate::error::{Error, Result};

pub const MAGIC_HEADER: &str = "# *-* HAIRGAP-INDEX *-*";

/// A parsed (or about-to-be-written) index manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Attributes in caller-chosen order (insertion order preserved).
    pub attributes: Vec<(String, String)>,
    /// (sha256-hex, relative-path) entries in walk order.
    pub files: Vec<(String, String)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn push_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn push_file(&mut self, sha256_hex: impl Into<String>, relpath: impl Into<String>) {
        self.files.push((sha256_hex.into(), relpath.into()));
    }

    /// Render the manifest to its on-disk text form.
    pub fn write_text(&self) -> String {
        let mut out = String::new();
        out.push_str(MAGIC_HEADER);
        out.push('\n');
        out.push_str("[hairgap]\n");
        for (k, v) in &self.attributes {
            out.push_str(k);
            out.push_str(" = ");
            out.push_str(v);
            out.push('\n');
        }
        out.push_str("[files]\n");
        for (hash, path) in &self.files {
            out.push_str(hash);
            out.push_str(" = ");
            out.push_str(path);
            out.push('\n');
        }
        out
    }

    /// Parse a manifest from its on-disk text form. Tolerates extra
    /// whitespace around `=`. Rejects the manifest only if the magic header
    /// line is absent; unknown attribute keys are kept (the receiver decides
    /// which ones it cares about), missing expected keys simply are not
    /// present in `attributes`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        match lines.next() {
            Some(first) if first.trim() == MAGIC_HEADER => {}
            _ => {
                return Err(Error::IndexParse(
                    "missing HAIRGAP-INDEX magic header line".to_string(),
                ))
            }
        }

        let mut manifest = Manifest::new();
        #[derive(PartialEq)]
        enum Section {
            None,
            Hairgap,
            Files,
        }
        let mut section = Section::None;

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line {
                "[hairgap]" => {
                    section = Section::Hairgap;
                    continue;
                }
                "[files]" => {
                    section = Section::Files;
                    continue;
                }
                _ => {}
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::IndexParse(format!("malformed line: {line:?}")));
            };
            let key = key.trim().to_string();
            let value = value.trim().to_string();

            match section {
                Section::Hairgap => manifest.push_attribute(key, value),
                Section::Files => manifest.push_file(key, value),
                Section::None => {
                    return Err(Error::IndexParse(format!(
                        "entry outside of any section: {line:?}"
                    )))
                }
            }
        }

        Ok(manifest)
    }
}

/// A relative path is safe if it is not absolute and has no `..` segments.
pub fn validate_relative_path(relpath: &str) -> Result<()> {
    let path = std::path::Path::new(relpath);
    if path.is_absolute() {
        return Err(Error::UnsafePath(relpath.to_string()));
    }
    for component in path.components() {
        if matches!(
            component,
            std::path::Component::ParentDir | std::path::Component::Prefix(_)
        ) {
            return Err(Error::UnsafePath(relpath.to_string()));
        }
    }
    Ok(())
}
