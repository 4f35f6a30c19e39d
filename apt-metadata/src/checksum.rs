// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Content checksums.

Repository metadata advertises content digests for the files it references.
[Checksum] pairs a [ChecksumType] with an expected hex digest and [verify()]
compares it against the full content of a stream.
*/

use {
    crate::{
        error::{AptError, Result},
        io::ContentFetcher,
    },
    digest::Digest,
    pgp::crypto::{HashAlgorithm, Hasher},
    serde::Serialize,
    std::{
        io::{self, Read},
        str::FromStr,
    },
    strum::{EnumIter, IntoEnumIterator},
};

/// Checksum type / digest mechanism used in repository metadata.
///
/// Variants are declared from weakest to strongest.
#[derive(Clone, Copy, Debug, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ChecksumType {
    /// MD5.
    Md5,

    /// SHA-1.
    Sha1,

    /// SHA-256.
    Sha256,
}

impl ChecksumType {
    /// Emit variants in their preferred usage order.
    pub fn preferred_order() -> impl Iterator<Item = ChecksumType> {
        Self::iter().rev()
    }

    /// Name of the section header / control field holding this variant type.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5Sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Obtain a new hasher for this checksum flavor.
    pub fn new_hasher(&self) -> ContentHasher {
        match self {
            Self::Md5 => ContentHasher::md5(),
            Self::Sha1 => ContentHasher::sha1(),
            Self::Sha256 => ContentHasher::sha256(),
        }
    }
}

impl FromStr for ChecksumType {
    type Err = AptError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MD5Sum" | "MD5sum" | "MD5" | "md5" => Ok(Self::Md5),
            "SHA1" | "sha1" => Ok(Self::Sha1),
            "SHA256" | "sha256" => Ok(Self::Sha256),
            _ => Err(AptError::UnknownChecksumType(s.to_string())),
        }
    }
}

/// An expected content digest.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Checksum {
    /// The digest algorithm.
    pub checksum_type: ChecksumType,

    /// Expected digest, hex encoded.
    pub digest: String,
}

impl Checksum {
    /// Construct an instance from an algorithm name and a hex digest.
    ///
    /// Errors if the algorithm name isn't recognized.
    pub fn new(checksum_type: &str, digest: impl ToString) -> Result<Self> {
        Ok(Self {
            checksum_type: ChecksumType::from_str(checksum_type)?,
            digest: digest.to_string(),
        })
    }
}

/// Content hasher covering every digest flavor used by this crate.
///
/// Also implements the [Hasher] trait from the `pgp` crate so the same type can
/// digest cleartext signed content. Unlike boxed `pgp` hashers, instances can be
/// cloned, which signature verification relies on.
#[derive(Clone)]
pub enum ContentHasher {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl ContentHasher {
    pub fn md5() -> Self {
        Self::Md5(md5::Md5::new())
    }

    pub fn sha1() -> Self {
        Self::Sha1(sha1::Sha1::new())
    }

    pub fn sha256() -> Self {
        Self::Sha256(sha2::Sha256::new())
    }

    pub fn sha384() -> Self {
        Self::Sha384(sha2::Sha384::new())
    }

    pub fn sha512() -> Self {
        Self::Sha512(sha2::Sha512::new())
    }

    /// Resolve a hasher from the name used in cleartext `Hash:` armor headers.
    pub fn from_armor_name(name: &str) -> Option<Self> {
        match name {
            "MD5" => Some(Self::md5()),
            "SHA1" => Some(Self::sha1()),
            "SHA256" => Some(Self::sha256()),
            "SHA384" => Some(Self::sha384()),
            "SHA512" => Some(Self::sha512()),
            _ => None,
        }
    }

    /// The PGP hash algorithm this hasher implements.
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Md5(_) => HashAlgorithm::MD5,
            Self::Sha1(_) => HashAlgorithm::SHA1,
            Self::Sha256(_) => HashAlgorithm::SHA2_256,
            Self::Sha384(_) => HashAlgorithm::SHA2_384,
            Self::Sha512(_) => HashAlgorithm::SHA2_512,
        }
    }

    /// Consume the hasher, returning the digest bytes.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Md5(digest) => digest.finalize().to_vec(),
            Self::Sha1(digest) => digest.finalize().to_vec(),
            Self::Sha256(digest) => digest.finalize().to_vec(),
            Self::Sha384(digest) => digest.finalize().to_vec(),
            Self::Sha512(digest) => digest.finalize().to_vec(),
        }
    }
}

impl io::Write for ContentHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Hasher for ContentHasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(digest) => digest.update(data),
            Self::Sha1(digest) => digest.update(data),
            Self::Sha256(digest) => digest.update(data),
            Self::Sha384(digest) => digest.update(data),
            Self::Sha512(digest) => digest.update(data),
        }
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        (*self).finalize()
    }
}

/// Compute the hex digest of everything a reader emits.
pub fn hex_digest(mut reader: impl Read, checksum_type: ChecksumType) -> Result<String> {
    let mut hasher = checksum_type.new_hasher();
    io::copy(&mut reader, &mut hasher)?;

    Ok(hex::encode(hasher.finalize()))
}

/// Verify that the content of a reader matches an expected checksum.
///
/// The reader is always consumed to its end. The comparison against the expected
/// hex digest is case sensitive; digests in repository metadata are lowercase.
///
/// A mismatch is `Ok(false)`. Errors only occur if the reader fails.
pub fn verify(reader: impl Read, checksum: &Checksum) -> Result<bool> {
    let got = hex_digest(reader, checksum.checksum_type)?;

    Ok(got == checksum.digest)
}

/// Verify the content of a local path or URL against an expected checksum.
pub fn verify_path(
    fetcher: &impl ContentFetcher,
    path_or_url: &str,
    checksum: &Checksum,
) -> Result<bool> {
    verify(fetcher.open(path_or_url)?, checksum)
}
