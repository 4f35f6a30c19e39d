// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Release` file primitives.

`Release` files (or `InRelease` if it contains a PGP cleartext signature) are
the main definition of a repository suite. They hold suite-level metadata
fields followed by checksum tables listing the *indices* files of the suite:

```text
Origin: Ubuntu
Codename: focal
MD5Sum:
 7ef83228ec207df10acac48fbdd81112          5826751 main/binary-amd64/Packages
SHA1:
 aef5c36ce45bd5c3154a1bb03c62b6cfb33e2bc6  5826751 main/binary-amd64/Packages
```

[ReleaseIndex] represents a parsed release file. Each path listed in any
checksum table becomes one [FileEntry] holding the digests of every table it
appeared in.

Parsing is lenient. Lines that can't be interpreted are skipped and malformed
values fall back to defaults. Only errors reading the underlying stream are
surfaced.
*/

use {
    crate::{
        checksum::{Checksum, ChecksumType},
        cleartext::CleartextDocument,
        error::Result,
    },
    chrono::{DateTime, Utc},
    log::debug,
    serde::Serialize,
    std::{
        collections::BTreeMap,
        io::{BufRead, Write},
    },
    strum::IntoEnumIterator,
};

/// Formatter string for dates in release files.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// An indices file listed in a release file.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct FileEntry {
    /// The path to this file relative to the suite directory.
    pub path: String,

    /// The size of the file in bytes.
    pub size: u64,

    /// Hex MD5 digest, if listed.
    pub md5: Option<String>,

    /// Hex SHA-1 digest, if listed.
    pub sha1: Option<String>,

    /// Hex SHA-256 digest, if listed.
    pub sha256: Option<String>,
}

impl FileEntry {
    fn new(path: &str, size: u64) -> Self {
        Self {
            path: path.to_string(),
            size,
            ..Default::default()
        }
    }

    /// Obtain the hex digest for a checksum flavor.
    pub fn digest(&self, checksum: ChecksumType) -> Option<&str> {
        match checksum {
            ChecksumType::Md5 => self.md5.as_deref(),
            ChecksumType::Sha1 => self.sha1.as_deref(),
            ChecksumType::Sha256 => self.sha256.as_deref(),
        }
    }

    fn set_digest(&mut self, checksum: ChecksumType, digest: &str) {
        let slot = match checksum {
            ChecksumType::Md5 => &mut self.md5,
            ChecksumType::Sha1 => &mut self.sha1,
            ChecksumType::Sha256 => &mut self.sha256,
        };

        slot.replace(digest.to_string());
    }

    /// Obtain a [Checksum] for a checksum flavor, if that digest is listed.
    pub fn checksum(&self, checksum: ChecksumType) -> Option<Checksum> {
        self.digest(checksum).map(|digest| Checksum {
            checksum_type: checksum,
            digest: digest.to_string(),
        })
    }

    /// Obtain the [Checksum] of the strongest digest listed for this file.
    pub fn strongest_checksum(&self) -> Option<Checksum> {
        ChecksumType::preferred_order().find_map(|checksum| self.checksum(checksum))
    }
}

/// A parsed `Release` file.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ReleaseIndex {
    pub origin: Option<String>,
    pub label: Option<String>,
    pub suite: Option<String>,
    pub version: Option<String>,
    pub codename: Option<String>,
    pub description: Option<String>,

    /// Time the release file was created, normalized to UTC.
    ///
    /// [None] if the field is absent or could not be parsed.
    pub date: Option<DateTime<Utc>>,

    /// Machine architectures supported by this suite. e.g. `amd64`, `arm64`.
    pub architectures: Vec<String>,

    /// Names of components within this suite. e.g. `main`, `restricted`.
    pub components: Vec<String>,

    /// Indices files keyed by their path.
    pub files: BTreeMap<String, FileEntry>,
}

impl ReleaseIndex {
    /// Parse a release file from a reader.
    ///
    /// The source must not be PGP armored. Use [Self::parse_cleartext()] for
    /// `InRelease` content.
    pub fn parse<R: BufRead>(mut reader: R) -> Result<Self> {
        let mut parser = ReleaseIndexParser::default();
        let mut buf = vec![];

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }

            parser.write_line(&String::from_utf8_lossy(&buf));
        }

        Ok(parser.finish())
    }

    /// Parse an `InRelease` file.
    ///
    /// The PGP cleartext framework is stripped and the signed text is parsed.
    /// Signatures are **not** verified. Use [crate::signature] for that.
    pub fn parse_cleartext(data: &[u8]) -> Result<Self> {
        let document = CleartextDocument::parse(data)?;

        Self::parse(std::io::Cursor::new(document.text()))
    }

    /// Find the entry for an indices file by its path.
    pub fn find_index_entry(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    /// Serialize this instance as release file text.
    ///
    /// Parsing the emitted text yields an equivalent [ReleaseIndex].
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for (name, value) in [
            ("Origin", &self.origin),
            ("Label", &self.label),
            ("Suite", &self.suite),
            ("Version", &self.version),
            ("Codename", &self.codename),
        ] {
            if let Some(value) = value {
                writeln!(writer, "{}: {}", name, value)?;
            }
        }

        if let Some(date) = &self.date {
            writeln!(writer, "Date: {}", date.format(DATE_FORMAT))?;
        }
        if !self.architectures.is_empty() {
            writeln!(writer, "Architectures: {}", self.architectures.join(" "))?;
        }
        if !self.components.is_empty() {
            writeln!(writer, "Components: {}", self.components.join(" "))?;
        }
        if let Some(description) = &self.description {
            writeln!(writer, "Description: {}", description)?;
        }

        for checksum in ChecksumType::iter() {
            let rows = self
                .files
                .values()
                .filter_map(|entry| entry.digest(checksum).map(|digest| (entry, digest)))
                .collect::<Vec<_>>();

            if rows.is_empty() {
                continue;
            }

            let size_width = rows
                .iter()
                .map(|(entry, _)| entry.size.to_string().len())
                .max()
                .unwrap_or_default();

            writeln!(writer, "{}:", checksum.field_name())?;
            for (entry, digest) in rows {
                writeln!(
                    writer,
                    " {} {:>width$} {}",
                    digest,
                    entry.size,
                    entry.path,
                    width = size_width
                )?;
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for ReleaseIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut data = vec![];
        self.write(&mut data).map_err(|_| std::fmt::Error)?;

        // Only UTF-8 strings are written.
        f.write_str(&String::from_utf8_lossy(&data))
    }
}

/// Which checksum table the parser is currently inside.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ChecksumSection {
    /// Not in a checksum table.
    None,

    /// In a table for a digest flavor we record.
    Known(ChecksumType),

    /// In a table for a digest flavor we don't record. e.g. `SHA512`.
    Unsupported,
}

/// Headers of checksum tables whose digests aren't recorded.
const UNSUPPORTED_SECTIONS: &[&str] = &["SHA512"];

/// Resolve a line that opens a checksum table.
///
/// Table headers are a bare checksum field name with no value. e.g. `SHA256:`.
/// Any other line, including other bare field names, is not a header.
fn section_header(line: &str) -> Option<ChecksumSection> {
    let name = line.strip_suffix(':')?;

    if let Some(checksum) = ChecksumType::iter().find(|checksum| checksum.field_name() == name) {
        Some(ChecksumSection::Known(checksum))
    } else if UNSUPPORTED_SECTIONS.contains(&name) {
        Some(ChecksumSection::Unsupported)
    } else {
        None
    }
}

fn split_words(value: &str) -> Vec<String> {
    value
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    // Release files commonly spell the zone out by name rather than as an offset.
    let value = match value.rsplit_once(' ') {
        Some((head, "UTC" | "GMT" | "UT")) => format!("{} +0000", head),
        _ => value.to_string(),
    };

    DateTime::parse_from_str(&value, DATE_FORMAT)
        .map(|date| date.with_timezone(&Utc))
        .ok()
}

/// A line-at-a-time release file parser.
///
/// Feed lines via [Self::write_line()] and call [Self::finish()] to obtain the
/// parsed [ReleaseIndex].
#[derive(Debug)]
pub struct ReleaseIndexParser {
    section: ChecksumSection,
    index: ReleaseIndex,
}

impl Default for ReleaseIndexParser {
    fn default() -> Self {
        Self {
            section: ChecksumSection::None,
            index: ReleaseIndex::default(),
        }
    }
}

impl ReleaseIndexParser {
    /// Process a line of input.
    pub fn write_line(&mut self, line: &str) {
        let line = line.trim();

        if let Some(section) = section_header(line) {
            self.section = section;
            return;
        }

        match self.section {
            ChecksumSection::None => self.write_metadata_line(line),
            ChecksumSection::Known(checksum) => self.write_table_line(checksum, line),
            ChecksumSection::Unsupported => {}
        }
    }

    fn write_metadata_line(&mut self, line: &str) {
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.trim()),
            None => return,
        };

        let index = &mut self.index;

        match name {
            "Origin" => index.origin = Some(value.to_string()),
            "Label" => index.label = Some(value.to_string()),
            "Suite" => index.suite = Some(value.to_string()),
            "Version" => index.version = Some(value.to_string()),
            "Codename" => index.codename = Some(value.to_string()),
            "Description" => index.description = Some(value.to_string()),
            "Architectures" => index.architectures = split_words(value),
            "Components" => index.components = split_words(value),
            "Date" => {
                index.date = parse_date(value);
                if index.date.is_none() {
                    debug!("unparseable release date: {}", value);
                }
            }
            _ => {}
        }
    }

    fn write_table_line(&mut self, checksum: ChecksumType, line: &str) {
        // Values are of form: <digest> <size> <path>
        let columns = line.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>();

        let (digest, size, path) = match columns.as_slice() {
            [digest, size, path] => (*digest, *size, *path),
            _ => {
                if !line.is_empty() {
                    debug!("skipping malformed {} line: {}", checksum.field_name(), line);
                }
                return;
            }
        };

        self.index
            .files
            .entry(path.to_string())
            .or_insert_with(|| FileEntry::new(path, size.parse::<u64>().unwrap_or_default()))
            .set_digest(checksum, digest);
    }

    /// Finish parsing, returning the parsed [ReleaseIndex].
    pub fn finish(self) -> ReleaseIndex {
        self.index
    }
}
