// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum AptError {
    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[cfg(feature = "http")]
    #[error("HTTP error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path {0}: {1:?}")]
    IoPath(String, std::io::Error),

    #[error("failed to fetch {url}: HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("unsupported URL scheme: {0}")]
    UnsupportedUrlScheme(String),

    #[error("unsupported checksum type: {0}")]
    UnknownChecksumType(String),

    #[error("unknown source kind: {0}")]
    UnknownSourceKind(String),

    #[error("failed to decompress {format}: {source:?}")]
    Decompression {
        format: &'static str,
        source: std::io::Error,
    },

    #[error("checksum mismatch for {path}: expected {expected}")]
    ChecksumMismatch { path: String, expected: String },

    #[error("bad PGP cleartext document: {0}")]
    CleartextFormat(String),

    #[error("cleartext signature verification failed")]
    SignatureVerification,

    #[error("no trusted key verified this document")]
    NoTrustedKeyVerified,
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, AptError>;
