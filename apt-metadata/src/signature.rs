// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signature verification of cleartext signed documents.

There are two modes of operation:

* Explicit key: [verify_cleartext()] verifies a document against a single key
  supplied by the caller, either ASCII armored or binary.
* Auto-discovery: [TrustedKeyStore] tries every key in the host's trusted key
  store until one of them verifies the document.

Both modes return the recovered signed text on success. Failures are
deliberately opaque: explicit mode yields [AptError::SignatureVerification]
and auto-discovery yields [AptError::NoTrustedKeyVerified] regardless of which
step or key failed. Causes are logged at debug level.
*/

use {
    crate::{
        cleartext::CleartextDocument,
        config::AptConfig,
        error::{AptError, Result},
        io::ContentFetcher,
    },
    chrono::Utc,
    log::debug,
    pgp::{Deserializable, SignedPublicKey},
    std::{
        io::Cursor,
        path::{Path, PathBuf},
    },
};

/// File name suffix of keys in the trusted keys directory.
pub const TRUSTED_KEY_SUFFIX: &str = ".gpg";

/// Encoding of public key material.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyFormat {
    /// ASCII armored. `-----BEGIN PGP PUBLIC KEY BLOCK-----`.
    Armored,

    /// Binary OpenPGP packets.
    Binary,
}

/// Load a single public key.
///
/// If the material holds several keys, only the first is loaded.
pub fn load_public_key(data: &[u8], format: KeyFormat) -> Result<SignedPublicKey> {
    Ok(match format {
        KeyFormat::Armored => SignedPublicKey::from_armor_single(Cursor::new(data))?.0,
        KeyFormat::Binary => SignedPublicKey::from_bytes(Cursor::new(data))?,
    })
}

/// A collection of keys able to verify signatures.
///
/// Currently always holds exactly one key.
pub struct Keyring {
    key: SignedPublicKey,
}

impl Keyring {
    /// Construct a keyring holding a single key.
    ///
    /// Errors if the key's self-signatures don't verify.
    pub fn new(key: SignedPublicKey) -> Result<Self> {
        key.verify()?;

        Ok(Self { key })
    }

    /// Verify a cleartext document at a point in time.
    ///
    /// Signatures may come from the primary key or any of its subkeys.
    pub fn verify_cleartext(
        &self,
        document: &CleartextDocument,
        at: chrono::DateTime<Utc>,
    ) -> pgp::errors::Result<usize> {
        document.verify(&self.key, at)
    }
}

fn verify_document(
    document: &CleartextDocument,
    key_material: &[u8],
    format: KeyFormat,
) -> Result<()> {
    let keyring = Keyring::new(load_public_key(key_material, format)?)?;
    keyring.verify_cleartext(document, Utc::now())?;

    Ok(())
}

/// Verify a cleartext signed document against a single key.
///
/// Returns the recovered signed text. Any failure, whether parsing the
/// document, loading the key or verifying a signature, is
/// [AptError::SignatureVerification].
pub fn verify_cleartext(document: &[u8], key_material: &[u8], format: KeyFormat) -> Result<String> {
    CleartextDocument::parse(document)
        .and_then(|document| {
            verify_document(&document, key_material, format)?;
            Ok(document.text().to_string())
        })
        .map_err(|e| {
            debug!("signature verification failed: {}", e);
            AptError::SignatureVerification
        })
}

/// Verify a cleartext signed document against a key stored in a file.
///
/// Errors reading the key file are reported as I/O errors. All other failures
/// behave like [verify_cleartext()].
pub fn verify_with_key_file(
    document: &[u8],
    key_path: impl AsRef<Path>,
    format: KeyFormat,
) -> Result<String> {
    let key_path = key_path.as_ref();
    let key_material = std::fs::read(key_path)
        .map_err(|e| AptError::IoPath(format!("{}", key_path.display()), e))?;

    verify_cleartext(document, &key_material, format)
}

/// The host's store of trusted repository keys.
///
/// Consists of a primary keyring file plus a directory of additional `*.gpg`
/// key files. All keys are binary encoded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrustedKeyStore {
    keyring_path: PathBuf,
    keys_dir: PathBuf,
}

impl TrustedKeyStore {
    pub fn new(keyring_path: impl Into<PathBuf>, keys_dir: impl Into<PathBuf>) -> Self {
        Self {
            keyring_path: keyring_path.into(),
            keys_dir: keys_dir.into(),
        }
    }

    pub fn from_config(config: &AptConfig) -> Self {
        Self::new(&config.trusted_keyring_path, &config.trusted_keys_dir)
    }

    /// Key files to try, in order.
    ///
    /// The primary keyring always comes first, followed by regular `*.gpg` files
    /// in the keys directory sorted by file name. An unreadable directory
    /// contributes nothing.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut dir_candidates = match std::fs::read_dir(&self.keys_dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.is_file()
                        && path
                            .file_name()
                            .map(|name| name.to_string_lossy().ends_with(TRUSTED_KEY_SUFFIX))
                            .unwrap_or_default()
                })
                .collect::<Vec<_>>(),
            Err(e) => {
                debug!("unable to enumerate trusted keys directory: {}", e);
                vec![]
            }
        };

        dir_candidates.sort();

        std::iter::once(self.keyring_path.clone())
            .chain(dir_candidates)
            .collect()
    }

    /// Verify a cleartext signed document with the first trusted key able to.
    ///
    /// Returns the recovered signed text. If no key verifies the document the
    /// error is [AptError::NoTrustedKeyVerified].
    pub fn verify(&self, document: &[u8]) -> Result<String> {
        let document = CleartextDocument::parse(document).map_err(|e| {
            debug!("unable to parse cleartext document: {}", e);
            AptError::NoTrustedKeyVerified
        })?;

        for (i, candidate) in self.candidates().iter().enumerate() {
            let key_material = match std::fs::read(candidate) {
                Ok(data) => data,
                Err(e) => {
                    debug!("trusted key candidate #{} unreadable: {}", i, e.kind());
                    continue;
                }
            };

            match verify_document(&document, &key_material, KeyFormat::Binary) {
                Ok(()) => {
                    debug!("trusted key candidate #{} verified document", i);
                    return Ok(document.text().to_string());
                }
                Err(e) => {
                    debug!("trusted key candidate #{} rejected: {}", i, e);
                }
            }
        }

        Err(AptError::NoTrustedKeyVerified)
    }

    /// Fetch a document from a path or URL and verify it.
    pub fn verify_path(&self, fetcher: &impl ContentFetcher, path_or_url: &str) -> Result<String> {
        self.verify(&fetcher.read_all(path_or_url)?)
    }
}
