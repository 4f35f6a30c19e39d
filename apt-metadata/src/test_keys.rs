// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Signing keys and `InRelease` style documents for tests.
//!
//! Key generation is slow so each key is generated once per test process.

use {
    crate::cleartext::HEADER,
    chrono::{SubsecRound, Utc},
    once_cell::sync::Lazy,
    pgp::{
        armor::BlockType,
        crypto::HashAlgorithm,
        packet::{Packet, SignatureConfig, SignatureType, Subpacket},
        types::{KeyTrait, KeyVersion, SecretKeyTrait},
        KeyType, SecretKeyParamsBuilder, SignedPublicKey, SignedSecretKey,
    },
    smallvec::{smallvec, SmallVec},
    std::io::Cursor,
};

/// A generated key pair whose secret key has an empty passphrase.
pub struct TestKey {
    pub secret: SignedSecretKey,
    pub public: SignedPublicKey,
}

impl TestKey {
    fn generate(user_id: &str) -> Self {
        let params = SecretKeyParamsBuilder::default()
            .key_type(KeyType::Rsa(2048))
            .preferred_hash_algorithms(smallvec![HashAlgorithm::SHA2_256])
            .can_sign(true)
            .primary_user_id(user_id.to_string())
            .build()
            .expect("key params should build");

        let secret = params
            .generate()
            .expect("key generation should work")
            .sign(String::new)
            .expect("self signing should work");
        let public = secret
            .public_key()
            .sign(&secret, String::new)
            .expect("public key signing should work");

        Self { secret, public }
    }

    /// Produce a cleartext signed document over `text` with a SHA-256 signature.
    pub fn sign(&self, text: &str) -> String {
        self.sign_with(HashAlgorithm::SHA2_256, "SHA256", text)
    }

    /// Produce a cleartext signed document, advertising `armor_name` in its
    /// `Hash:` header.
    pub fn sign_with(&self, hash_algorithm: HashAlgorithm, armor_name: &str, text: &str) -> String {
        let lines = text.lines().map(|line| line.trim_end()).collect::<Vec<_>>();

        // The signed form uses CRLF separators and no trailing line ending.
        let canonical = lines.join("\r\n");

        let config = SignatureConfig::new_v4(
            Default::default(),
            SignatureType::Text,
            self.secret.algorithm(),
            hash_algorithm,
            vec![
                Subpacket::IssuerFingerprint(
                    KeyVersion::V4,
                    SmallVec::from_slice(&self.secret.fingerprint()),
                ),
                Subpacket::SignatureCreationTime(Utc::now().trunc_subsecs(0)),
            ],
            vec![Subpacket::Issuer(self.secret.key_id())],
        );
        let signature = config
            .sign(&self.secret, String::new, Cursor::new(canonical.into_bytes()))
            .expect("signing should work");

        let mut armor = vec![];
        pgp::armor::write(
            &Packet::Signature(signature),
            BlockType::Signature,
            &mut armor,
            None,
        )
        .expect("armoring should work");
        let armor = String::from_utf8(armor).expect("armor is ASCII");

        let mut document = format!("{}\nHash: {}\n\n", HEADER, armor_name);
        for line in lines {
            if line.starts_with('-') || line.starts_with("From ") {
                document.push_str("- ");
            }
            document.push_str(line);
            document.push('\n');
        }

        document.push_str(&armor);

        document
    }
}

/// Key used to sign test documents.
pub static SIGNER: Lazy<TestKey> = Lazy::new(|| TestKey::generate("Archive Signer <signer@example.com>"));

/// Key that signs nothing.
pub static OTHER: Lazy<TestKey> = Lazy::new(|| TestKey::generate("Unrelated <other@example.com>"));
