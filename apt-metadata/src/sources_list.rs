// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! APT source list primitives.

`sources.list` files define the repositories a host consumes. Each
non-comment line is a *directive* of the form:

```text
deb [ option1=value1 option2=value2 ] uri suite [component1] [component2] [...]
deb-src [ option1=value1 option2=value2 ] uri suite [component1] [component2] [...]
```

A directive expands to one [SourceDescriptor] per component. Descriptors know
how to derive the URLs of the release and package indices they refer to.

Parsing is lenient: lines that can't be interpreted are skipped rather than
treated as errors.
*/

use {
    crate::{
        config::drop_in_dir,
        error::{AptError, Result},
        io::Compression,
    },
    log::{debug, warn},
    serde::Serialize,
    std::{
        fmt::{Display, Formatter},
        io::{BufRead, BufReader},
        path::Path,
        str::FromStr,
    },
};

/// The kind of index a source directive refers to.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum SourceKind {
    /// Binary packages (`deb`).
    Binary,

    /// Source packages (`deb-src`).
    Source,
}

impl SourceKind {
    /// The directive type token for this kind.
    pub fn directive(&self) -> &'static str {
        match self {
            Self::Binary => "deb",
            Self::Source => "deb-src",
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.directive())
    }
}

impl FromStr for SourceKind {
    type Err = AptError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deb" => Ok(Self::Binary),
            "deb-src" => Ok(Self::Source),
            _ => Err(AptError::UnknownSourceKind(s.to_string())),
        }
    }
}

/// A `key=value` option attached to a directive.
///
/// Options are recorded as they appear. They do not influence descriptor
/// generation or URL derivation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SourceOption {
    pub key: String,
    pub value: String,
}

impl SourceOption {
    fn parse(token: &str) -> Option<Self> {
        let token = token.trim_start_matches('[').trim_end_matches(']');
        let (key, value) = token.split_once('=')?;

        Some(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// A single repository reference: one component of one suite.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SourceDescriptor {
    /// Binary or source index.
    pub kind: SourceKind,

    /// Base URL of the repository. e.g. `http://archive.ubuntu.com/ubuntu`.
    pub base_url: String,

    /// Distribution / suite name. e.g. `focal` or `focal-updates`.
    pub suite: String,

    /// Component name. e.g. `main`.
    pub component: String,

    /// Options that appeared on the directive line.
    pub options: Vec<SourceOption>,
}

impl SourceDescriptor {
    fn dists_url(&self, segments: &[&str]) -> String {
        join_url(
            &self.base_url,
            ["dists", self.suite.as_str()]
                .iter()
                .chain(segments.iter())
                .copied(),
        )
    }

    /// URL of the unsigned `Release` file for this descriptor's suite.
    pub fn release_url(&self) -> String {
        self.dists_url(&["Release"])
    }

    /// URL of the cleartext signed `InRelease` file for this descriptor's suite.
    pub fn signed_release_url(&self) -> String {
        self.dists_url(&["InRelease"])
    }

    /// Path of the package index relative to the suite directory.
    ///
    /// This is the path under which the index is listed in the suite's release
    /// file. e.g. `main/binary-amd64/Packages`.
    pub fn index_path(&self, architecture: &str) -> String {
        match self.kind {
            SourceKind::Binary => format!(
                "{}/binary-{}/Packages",
                self.component.trim_matches('/'),
                architecture
            ),
            SourceKind::Source => format!("{}/source/Sources", self.component.trim_matches('/')),
        }
    }

    /// URL of the uncompressed package index.
    ///
    /// Binary sources resolve to `binary-<architecture>/Packages` and source sources
    /// resolve to `source/Sources`.
    pub fn index_url(&self, architecture: &str) -> String {
        self.dists_url(&[self.index_path(architecture).as_str()])
    }

    /// URL of the package index in a given compression format.
    pub fn index_url_with_compression(
        &self,
        architecture: &str,
        compression: Compression,
    ) -> String {
        format!(
            "{}{}",
            self.index_url(architecture),
            compression.extension()
        )
    }

    fn is_complete(&self) -> bool {
        !(self.base_url.is_empty() || self.suite.is_empty() || self.component.is_empty())
    }
}

/// Join URL path segments with exactly one `/` between them.
fn join_url<'a>(base: &str, segments: impl Iterator<Item = &'a str>) -> String {
    let mut url = base.trim_end_matches('/').to_string();

    for segment in segments {
        url.push('/');
        url.push_str(segment.trim_matches('/'));
    }

    url
}

/// Parse a single source list line into descriptors.
///
/// A directive with `k` components yields `k` descriptors. Comments, blank lines,
/// unknown directive types and directives with fewer than 4 positional tokens
/// yield nothing.
pub fn parse_directive_line(line: &str) -> Vec<SourceDescriptor> {
    let line = line.trim();

    if line.is_empty() || line.starts_with('#') {
        return vec![];
    }

    let mut options = vec![];
    let mut args = vec![];

    for token in line.split(' ').filter(|s| !s.is_empty()) {
        if token.contains('=') {
            options.extend(SourceOption::parse(token));
        } else if !matches!(token, "[" | "]") {
            args.push(token);
        }
    }

    if args.len() < 4 {
        debug!("ignoring source directive with too few arguments: {}", line);
        return vec![];
    }

    let kind = match SourceKind::from_str(args[0]) {
        Ok(kind) => kind,
        Err(_) => {
            debug!("ignoring unknown source directive type: {}", args[0]);
            return vec![];
        }
    };

    args[3..]
        .iter()
        .map(|component| SourceDescriptor {
            kind,
            base_url: args[1].to_string(),
            suite: args[2].to_string(),
            component: component.to_string(),
            options: options.clone(),
        })
        .filter(SourceDescriptor::is_complete)
        .collect()
}

/// Parse every line emitted by a reader.
///
/// Invalid UTF-8 is replaced rather than rejected. Only errors reading the
/// stream are surfaced.
pub fn parse_reader(mut reader: impl BufRead) -> Result<Vec<SourceDescriptor>> {
    let mut res = vec![];
    let mut buf = vec![];

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }

        res.extend(parse_directive_line(&String::from_utf8_lossy(&buf)));
    }

    Ok(res)
}

fn parse_single_file(path: &Path) -> Result<Vec<SourceDescriptor>> {
    let f = std::fs::File::open(path)
        .map_err(|e| AptError::IoPath(format!("{}", path.display()), e))?;

    parse_reader(BufReader::new(f))
}

/// Parse a source list file and its drop-in directory.
///
/// The drop-in directory is the path with `.d` appended. Its files are parsed in
/// file name order and their descriptors appended after the primary file's.
///
/// Failure to read the primary file is an error. A missing drop-in directory
/// or an unreadable drop-in file is skipped.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<SourceDescriptor>> {
    let path = path.as_ref();
    let mut res = parse_single_file(path)?;

    let dir = drop_in_dir(path);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(res),
    };

    let mut paths = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    paths.sort();

    for path in paths {
        match parse_single_file(&path) {
            Ok(descriptors) => res.extend(descriptors),
            Err(e) => warn!("skipping source list {}: {}", path.display(), e),
        }
    }

    Ok(res)
}
