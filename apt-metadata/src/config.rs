// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Host configuration.

[AptConfig] carries the handful of values that locate the host's APT state:
the source list, the target architecture used when deriving binary package
index URLs, and the trusted key store used for signature auto-discovery.

Values are plain data. They are constructed once (typically from defaults or a
YAML document at the CLI boundary) and passed explicitly to the functions that
need them.
*/

use {
    serde::Deserialize,
    std::{
        ffi::OsString,
        path::{Path, PathBuf},
    },
};

/// Default location of the primary source list.
pub const DEFAULT_SOURCE_LIST_PATH: &str = "/etc/apt/sources.list";

/// Default architecture for binary package indices.
pub const DEFAULT_ARCHITECTURE: &str = "amd64";

/// Default location of the primary trusted keyring.
pub const DEFAULT_TRUSTED_KEYRING_PATH: &str = "/etc/apt/trusted.gpg";

/// Default location of the trusted keys directory.
pub const DEFAULT_TRUSTED_KEYS_DIR: &str = "/etc/apt/trusted.gpg.d";

/// Suffix appended to the source list path to obtain the drop-in directory.
pub const DROP_IN_DIR_SUFFIX: &str = ".d";

/// Configuration for interacting with the host's APT setup.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct AptConfig {
    /// Path to the primary `sources.list` file.
    pub source_list_path: PathBuf,

    /// Architecture token used for `binary-<arch>` package indices.
    pub architecture: String,

    /// Path to the primary trusted keyring.
    pub trusted_keyring_path: PathBuf,

    /// Directory holding additional trusted keys.
    pub trusted_keys_dir: PathBuf,
}

impl Default for AptConfig {
    fn default() -> Self {
        Self {
            source_list_path: PathBuf::from(DEFAULT_SOURCE_LIST_PATH),
            architecture: DEFAULT_ARCHITECTURE.to_string(),
            trusted_keyring_path: PathBuf::from(DEFAULT_TRUSTED_KEYRING_PATH),
            trusted_keys_dir: PathBuf::from(DEFAULT_TRUSTED_KEYS_DIR),
        }
    }
}

impl AptConfig {
    /// The drop-in directory that accompanies the primary source list.
    pub fn source_list_drop_in_dir(&self) -> PathBuf {
        drop_in_dir(&self.source_list_path)
    }
}

/// Derive the drop-in directory for a source list path.
///
/// This is the path with `.d` appended. e.g. `/etc/apt/sources.list.d`.
pub fn drop_in_dir(path: impl AsRef<Path>) -> PathBuf {
    let mut s = OsString::from(path.as_ref().as_os_str());
    s.push(DROP_IN_DIR_SUFFIX);

    PathBuf::from(s)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = AptConfig::default();

        assert_eq!(config.architecture, "amd64");
        assert_eq!(
            config.source_list_drop_in_dir(),
            PathBuf::from("/etc/apt/sources.list.d")
        );
        assert_eq!(
            config.trusted_keys_dir,
            PathBuf::from("/etc/apt/trusted.gpg.d")
        );
    }

    #[test]
    fn drop_in_of_relative_path() {
        assert_eq!(
            drop_in_dir("testdata/sources.list"),
            PathBuf::from("testdata/sources.list.d")
        );
    }
}
