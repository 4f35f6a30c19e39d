// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Packages` index files.

A package index is a sequence of paragraphs separated by blank lines. Each
paragraph describes one binary package as `Name: value` fields:

```text
Package: zsh
Version: 5.8-3ubuntu1
Architecture: amd64
Filename: pool/main/z/zsh/zsh_5.8-3ubuntu1_amd64.deb
Size: 707748
```

[PackageRecordReader] streams [PackageRecord] instances out of any [BufRead].
[load()] resolves a path or URL, transparently decompresses `.xz` and `.gz`
variants and collects every record.
*/

use {
    crate::{
        checksum::{Checksum, ChecksumType},
        error::Result,
        io::{read_decompressed, Compression, ContentFetcher},
    },
    log::debug,
    serde::Serialize,
    std::io::{BufRead, BufReader},
};

/// A single package paragraph.
///
/// Fields that are absent from the paragraph are empty strings. `size` is 0
/// when absent or not an integer.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub section: String,
    pub origin: String,
    pub homepage: String,
    /// Path of the package artifact relative to the repository root.
    pub filename: String,
    pub size: u64,
    pub architecture: String,
    pub md5sum: String,
    pub sha1: String,
    pub sha256: String,
}

impl PackageRecord {
    /// The strongest checksum advertised for the package artifact.
    pub fn checksum(&self) -> Option<Checksum> {
        ChecksumType::preferred_order().find_map(|checksum_type| {
            let digest = match checksum_type {
                ChecksumType::Md5 => &self.md5sum,
                ChecksumType::Sha1 => &self.sha1,
                ChecksumType::Sha256 => &self.sha256,
            };

            if digest.is_empty() {
                None
            } else {
                Some(Checksum {
                    checksum_type,
                    digest: digest.clone(),
                })
            }
        })
    }

    fn set_field(&mut self, name: &str, value: &str) {
        let slot = match name {
            "Package" => &mut self.name,
            "Version" => &mut self.version,
            "Section" => &mut self.section,
            "Origin" => &mut self.origin,
            "Homepage" => &mut self.homepage,
            "Filename" => &mut self.filename,
            "Architecture" => &mut self.architecture,
            "MD5sum" => &mut self.md5sum,
            "SHA1" => &mut self.sha1,
            "SHA256" => &mut self.sha256,
            "Size" => {
                self.size = value.parse::<u64>().unwrap_or_else(|_| {
                    debug!("invalid package size: {}", value);
                    0
                });
                return;
            }
            _ => return,
        };

        *slot = value.to_string();
    }
}

/// Streaming reader of [PackageRecord] from a package index.
///
/// Each blank line finalizes the paragraph accumulated so far. Paragraphs
/// without a `Package` field are dropped, including the empty one produced by
/// trailing blank lines.
pub struct PackageRecordReader<R: BufRead> {
    reader: R,
    current: PackageRecord,
    finished: bool,
    buf: Vec<u8>,
}

impl<R: BufRead> PackageRecordReader<R> {
    /// Create a new instance bound to a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            current: PackageRecord::default(),
            finished: false,
            buf: vec![],
        }
    }

    /// Take the accumulated paragraph, leaving a fresh one in its place.
    fn take_current(&mut self) -> Option<PackageRecord> {
        let record = std::mem::take(&mut self.current);

        if record.name.is_empty() {
            None
        } else {
            Some(record)
        }
    }

    /// Read the next record, or `None` at end of stream.
    pub fn read_record(&mut self) -> Result<Option<PackageRecord>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                self.finished = true;
                return Ok(self.take_current());
            }

            let line = String::from_utf8_lossy(&self.buf).to_string();

            if line.trim().is_empty() {
                if let Some(record) = self.take_current() {
                    return Ok(Some(record));
                }
                continue;
            }

            // Continuation lines of multi-line fields like Description.
            if line.starts_with(' ') || line.starts_with('\t') {
                continue;
            }

            if let Some((name, value)) = line.split_once(':') {
                self.current.set_field(name, value.trim());
            }
        }
    }
}

impl<R: BufRead> Iterator for PackageRecordReader<R> {
    type Item = Result<PackageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Parse every record in a package index stream.
pub fn parse(reader: impl BufRead) -> Result<Vec<PackageRecord>> {
    PackageRecordReader::new(reader).collect()
}

/// Load the package index at a local path or URL.
///
/// The compression format is derived from the suffix of `path_or_url`.
pub fn load(fetcher: &impl ContentFetcher, path_or_url: &str) -> Result<Vec<PackageRecord>> {
    let compression = Compression::from_path(path_or_url);
    debug!(
        "loading package index {} (compression: {})",
        path_or_url,
        compression.format_name()
    );

    let reader = read_decompressed(fetcher.open(path_or_url)?, compression)?;

    parse(BufReader::new(reader))
}
