// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! PGP cleartext signed documents.

`InRelease` files use the PGP cleartext framework defined by
[RFC 4880 Section 7](https://datatracker.ietf.org/doc/html/rfc4880.html#section-7)
to embed the signature alongside the signed text:

```text
-----BEGIN PGP SIGNED MESSAGE-----
Hash: <digest>

<dash-escaped signed content>
-----BEGIN PGP SIGNATURE-----

<signature data>
-----END PGP SIGNATURE-----
```

[CleartextDocument::parse()] splits a document into its recovered text, the
digests of the canonicalized text and the signature packets. Parsing does not
validate anything cryptographically. Use [CleartextDocument::verify()] for that.
*/

use {
    crate::{
        checksum::ContentHasher,
        error::{AptError, Result},
    },
    chrono::{DateTime, Utc},
    pgp::{
        armor::{BlockType, Dearmor},
        crypto::{HashAlgorithm, Hasher},
        packet::{Packet, PacketParser},
        types::PublicKeyTrait,
        Signature, SignedPublicKey,
    },
    std::{collections::HashMap, io::Cursor},
};

/// First line of a cleartext signed document.
pub const HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
/// Line starting the signature block.
pub const SIGNATURE_ARMOR: &str = "-----BEGIN PGP SIGNATURE-----";

fn format_error(message: impl ToString) -> AptError {
    AptError::CleartextFormat(message.to_string())
}

/// A parsed PGP cleartext signed document.
pub struct CleartextDocument {
    /// The signed text with dash escaping reversed and LF line endings.
    text: String,

    /// Hashers advertised by `Hash:` headers, fed the canonical signed text.
    hashers: HashMap<u8, ContentHasher>,

    signatures: Vec<Signature>,
}

impl CleartextDocument {
    /// Parse a cleartext signed document.
    ///
    /// Errors if the document doesn't follow the cleartext framework: missing
    /// header line, unknown `Hash:` values, no signature block, or a signature
    /// block that doesn't decode to signature packets. Absent `Hash:` headers
    /// imply MD5.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let data = String::from_utf8_lossy(data);
        let mut lines = data.split('\n').map(|line| line.trim_end_matches('\r'));

        match lines.next() {
            Some(HEADER) => {}
            line => {
                return Err(format_error(format!(
                    "expected `{}`; got `{}`",
                    HEADER,
                    line.unwrap_or_default()
                )));
            }
        }

        // One or more `Hash:` armor headers terminated by an empty line.
        let mut hashers = HashMap::new();

        loop {
            let line = lines
                .next()
                .ok_or_else(|| format_error("unexpected end of armor headers"))?;

            if let Some(names) = line.strip_prefix("Hash:") {
                for name in names.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
                    let hasher = ContentHasher::from_armor_name(name)
                        .ok_or_else(|| format_error(format!("unsupported hash type: {}", name)))?;

                    hashers.entry(hasher.algorithm() as u8).or_insert(hasher);
                }
            } else if line.trim().is_empty() {
                break;
            } else {
                return Err(format_error(format!("expected Hash: header; got {}", line)));
            }
        }

        // Without a Hash header the digest is MD5.
        if hashers.is_empty() {
            hashers.insert(HashAlgorithm::MD5 as u8, ContentHasher::md5());
        }

        // The line ending before the signature armor line is not part of the signed
        // text. So separators are fed before each line but the first.
        let mut text_lines = vec![];
        let mut found_signature = false;

        for line in lines.by_ref() {
            if line == SIGNATURE_ARMOR {
                found_signature = true;
                break;
            }

            let line = line.strip_prefix("- ").unwrap_or(line);
            let canonical = line.trim_end_matches(|c| c == ' ' || c == '\t');

            for hasher in hashers.values_mut() {
                if !text_lines.is_empty() {
                    hasher.update(b"\r\n");
                }
                hasher.update(canonical.as_bytes());
            }

            text_lines.push(line);
        }

        if !found_signature {
            return Err(format_error("no signature block"));
        }

        let armored = std::iter::once(SIGNATURE_ARMOR)
            .chain(lines)
            .collect::<Vec<_>>()
            .join("\n");

        let signatures = parse_signature_armor(armored.as_bytes())?;

        Ok(Self {
            text: text_lines.join("\n"),
            hashers,
            signatures,
        })
    }

    /// The recovered signed text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Signatures in this document.
    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.signatures.iter()
    }

    /// Signatures whose issuer is the given key.
    pub fn signatures_from_key<'slf, 'key: 'slf>(
        &'slf self,
        key: &'key impl PublicKeyTrait,
    ) -> impl Iterator<Item = &'slf Signature> {
        self.signatures
            .iter()
            .filter(move |sig| matches!(sig.issuer(), Some(issuer) if &key.key_id() == issuer))
    }

    /// Verify the document against a key and its subkeys.
    ///
    /// The primary key is tried first, then each subkey in order. The first key
    /// that issued signatures decides the outcome: every signature it issued must
    /// be valid. See [Self::verify_key()].
    ///
    /// Returns the number of signatures verified.
    pub fn verify(&self, key: &SignedPublicKey, at: DateTime<Utc>) -> pgp::errors::Result<usize> {
        if self.signatures.is_empty() {
            return Err(pgp::errors::Error::Message(
                "no PGP signatures present".to_string(),
            ));
        }

        if self.signatures_from_key(key).next().is_some() {
            return self.verify_key(key, at);
        }

        for subkey in &key.public_subkeys {
            if self.signatures_from_key(&subkey.key).next().is_some() {
                return self.verify_key(&subkey.key, at);
            }
        }

        Err(pgp::errors::Error::Message(
            "no signatures signed by provided key".into(),
        ))
    }

    /// Verify the signatures issued by a single key.
    ///
    /// Every signature from `key` must be valid: its hash algorithm was advertised,
    /// the signed hash prefix matches, the signature verifies and it was not
    /// created after `at`. Errors if there are no signatures from the key.
    pub fn verify_key(
        &self,
        key: &impl PublicKeyTrait,
        at: DateTime<Utc>,
    ) -> pgp::errors::Result<usize> {
        let mut count = 0;

        for sig in self.signatures_from_key(key) {
            self.verify_signature(sig, key, at)?;
            count += 1;
        }

        match count {
            0 => Err(pgp::errors::Error::Message(
                "no signatures signed by provided key".into(),
            )),
            _ => Ok(count),
        }
    }

    fn verify_signature(
        &self,
        sig: &Signature,
        key: &impl PublicKeyTrait,
        at: DateTime<Utc>,
    ) -> pgp::errors::Result<()> {
        if let Some(created) = sig.created() {
            if created > &at {
                return Err(pgp::errors::Error::Message(format!(
                    "signature created in the future ({})",
                    created
                )));
            }
        }

        let hash_alg = sig.config.hash_alg;

        // Each signature finishes its own copy of the document digest.
        let mut hasher = match self.hashers.get(&(hash_alg as u8)) {
            Some(hasher) => hasher.clone(),
            None => {
                return Err(pgp::errors::Error::Message(format!(
                    "{:?} signature but no matching Hash header",
                    hash_alg
                )));
            }
        };

        let len = sig.config.hash_signature_data(&mut hasher)?;
        hasher.update(&sig.config.trailer(len));
        let digest = hasher.finalize();

        if digest[0..2] != sig.signed_hash_value {
            return Err(pgp::errors::Error::Message(
                "signed hash prefix mismatch".into(),
            ));
        }

        key.verify_signature(hash_alg, &digest, &sig.signature)
    }
}

fn parse_signature_armor(data: &[u8]) -> Result<Vec<Signature>> {
    let mut dearmor = Dearmor::new(Cursor::new(data));
    dearmor.read_header()?;

    if !matches!(dearmor.typ, Some(BlockType::Signature)) {
        return Err(format_error("failed to parse PGP signature armor"));
    }

    PacketParser::new(dearmor)
        .map(|packet| match packet {
            Ok(Packet::Signature(signature)) => Ok(signature),
            Ok(packet) => Err(format_error(format!(
                "expected Signature packet; got {:?}",
                packet.tag()
            ))),
            Err(e) => Err(AptError::Pgp(e)),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::test_keys,
        indoc::indoc,
    };

    fn sign(text: &str) -> Result<String> {
        Ok(test_keys::SIGNER.sign(text))
    }

    #[test]
    fn sign_and_verify() -> Result<()> {
        let text = "Origin: Ubuntu\nSuite: focal\nMD5Sum:\n 7ef83228ec207df10acac48fbdd81112 5826751 main/binary-amd64/Packages";
        let signed = sign(text)?;

        let doc = CleartextDocument::parse(signed.as_bytes())?;
        assert_eq!(doc.text(), text);
        assert_eq!(doc.signatures().count(), 1);

        let public = &test_keys::SIGNER.public;
        assert_eq!(doc.verify(public, Utc::now())?, 1);

        let other = &test_keys::OTHER.public;
        assert!(doc.verify(other, Utc::now()).is_err());

        Ok(())
    }

    #[test]
    fn dash_escaping_reversed() -> Result<()> {
        let text = "-----BEGIN looks like armor\n- a list item\nFrom here on\nplain";
        let signed = sign(text)?;

        assert!(signed.contains("\n- -----BEGIN looks like armor\n"));
        assert!(signed.contains("\n- From here on\n"));

        let doc = CleartextDocument::parse(signed.as_bytes())?;
        assert_eq!(doc.text(), text);

        let public = &test_keys::SIGNER.public;
        assert_eq!(doc.verify(public, Utc::now())?, 1);

        Ok(())
    }

    #[test]
    fn crlf_document() -> Result<()> {
        let signed = sign("Suite: focal\nCodename: focal")?.replace('\n', "\r\n");

        let doc = CleartextDocument::parse(signed.as_bytes())?;
        assert_eq!(doc.text(), "Suite: focal\nCodename: focal");

        let public = &test_keys::SIGNER.public;
        assert_eq!(doc.verify(public, Utc::now())?, 1);

        Ok(())
    }

    #[test]
    fn tampered_text_rejected() -> Result<()> {
        let signed = sign("Suite: focal\nCodename: focal")?.replacen("focal\n", "jammy\n", 1);

        let doc = CleartextDocument::parse(signed.as_bytes())?;
        assert_eq!(doc.text(), "Suite: jammy\nCodename: focal");

        let public = &test_keys::SIGNER.public;
        assert!(doc.verify(public, Utc::now()).is_err());

        Ok(())
    }

    #[test]
    fn signature_from_the_future_rejected() -> Result<()> {
        let doc = CleartextDocument::parse(sign("Suite: focal")?.as_bytes())?;

        let public = &test_keys::SIGNER.public;
        let past = Utc::now() - chrono::Duration::days(1);
        assert!(doc.verify(public, past).is_err());

        Ok(())
    }

    #[test]
    fn missing_hash_header_implies_md5() -> Result<()> {
        let text = "Origin: Debian\nSuite: stable";
        let signer = &*test_keys::SIGNER;

        let signed = signer
            .sign_with(HashAlgorithm::MD5, "MD5", text)
            .replacen("Hash: MD5\n", "", 1);
        let doc = CleartextDocument::parse(signed.as_bytes())?;
        assert_eq!(doc.text(), text);
        assert_eq!(doc.verify(&signer.public, Utc::now())?, 1);

        // A SHA-256 signature needs its Hash header.
        let signed = signer.sign(text).replacen("Hash: SHA256\n", "", 1);
        let doc = CleartextDocument::parse(signed.as_bytes())?;
        assert!(doc.verify(&signer.public, Utc::now()).is_err());

        Ok(())
    }

    #[test]
    fn multiple_hash_headers() -> Result<()> {
        let signed = test_keys::SIGNER
            .sign("Suite: focal")
            .replacen("Hash: SHA256\n", "Hash: SHA1\nHash: SHA512, SHA256\n", 1);

        let doc = CleartextDocument::parse(signed.as_bytes())?;
        assert_eq!(doc.verify(&test_keys::SIGNER.public, Utc::now())?, 1);

        Ok(())
    }

    #[test]
    fn malformed_framework() {
        for data in [
            "Suite: focal\n",
            indoc! {"
                -----BEGIN PGP SIGNED MESSAGE-----
                Suite: focal
            "},
            indoc! {"
                -----BEGIN PGP SIGNED MESSAGE-----
                Hash: WHIRLPOOL

                Suite: focal
            "},
            indoc! {"
                -----BEGIN PGP SIGNED MESSAGE-----
                Hash: SHA256

                Suite: focal
            "},
        ] {
            assert!(
                matches!(
                    CleartextDocument::parse(data.as_bytes()),
                    Err(AptError::CleartextFormat(_))
                ),
                "{}",
                data
            );
        }
    }
}
