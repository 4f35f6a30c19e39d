// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository client.

[RepositoryClient] wires the pieces of this crate together: it resolves the
configured sources, fetches release and package indices through a
[ContentFetcher], verifies them and hands back parsed structures.
*/

use {
    crate::{
        checksum,
        config::AptConfig,
        error::{AptError, Result},
        io::{read_decompressed, Compression, ContentFetcher},
        packages::{self, PackageRecord},
        release::ReleaseIndex,
        signature::{verify_cleartext, KeyFormat, TrustedKeyStore},
        sources_list::{self, SourceDescriptor},
    },
    log::debug,
    std::io::{BufReader, Cursor},
};

/// Keys used to verify signed release files.
#[derive(Clone, Debug)]
pub enum ReleaseKeys {
    /// Try every key in a trusted key store.
    Trusted(TrustedKeyStore),

    /// A single explicit key.
    Key { material: Vec<u8>, format: KeyFormat },
}

impl ReleaseKeys {
    /// Verify a cleartext signed document, returning its signed text.
    pub fn verify(&self, document: &[u8]) -> Result<String> {
        match self {
            Self::Trusted(store) => store.verify(document),
            Self::Key { material, format } => verify_cleartext(document, material, *format),
        }
    }
}

/// Fetches and verifies repository metadata for configured sources.
pub struct RepositoryClient<F: ContentFetcher> {
    config: AptConfig,
    fetcher: F,
}

impl<F: ContentFetcher> RepositoryClient<F> {
    pub fn new(config: AptConfig, fetcher: F) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &AptConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Keys from the configured trusted key store.
    pub fn trusted_keys(&self) -> ReleaseKeys {
        ReleaseKeys::Trusted(TrustedKeyStore::from_config(&self.config))
    }

    /// Load every source from the configured source list and its drop-in directory.
    pub fn sources(&self) -> Result<Vec<SourceDescriptor>> {
        sources_list::parse_file(&self.config.source_list_path)
    }

    /// Fetch and parse the unsigned `Release` file of a source's suite.
    ///
    /// Nothing about the content is verified.
    pub fn fetch_release(&self, source: &SourceDescriptor) -> Result<ReleaseIndex> {
        let url = source.release_url();
        debug!("fetching release file {}", url);

        ReleaseIndex::parse(BufReader::new(self.fetcher.open(&url)?))
    }

    /// Fetch the `InRelease` file of a source's suite, verify and parse it.
    pub fn fetch_verified_release(
        &self,
        source: &SourceDescriptor,
        keys: &ReleaseKeys,
    ) -> Result<ReleaseIndex> {
        let url = source.signed_release_url();
        debug!("fetching signed release file {}", url);

        let text = keys.verify(&self.fetcher.read_all(&url)?)?;

        ReleaseIndex::parse(Cursor::new(text.as_bytes()))
    }

    /// Fetch and parse the package index of a source.
    ///
    /// With a release index, the most preferred compression variant it lists is
    /// fetched and its content verified against the strongest checksum listed.
    /// Without one, or if the release doesn't list the index, the uncompressed
    /// index is fetched unverified.
    pub fn fetch_packages(
        &self,
        source: &SourceDescriptor,
        release: Option<&ReleaseIndex>,
    ) -> Result<Vec<PackageRecord>> {
        let architecture = &self.config.architecture;
        let path = source.index_path(architecture);

        let listed = release.and_then(|release| {
            Compression::default_preferred_order().find_map(|compression| {
                release
                    .find_index_entry(&format!("{}{}", path, compression.extension()))
                    .map(|entry| (compression, entry))
            })
        });

        let (compression, entry) = match listed {
            Some(v) => v,
            None => {
                debug!("{} not listed in release file; fetching unverified", path);
                return packages::load(&self.fetcher, &source.index_url(architecture));
            }
        };

        let url = source.index_url_with_compression(architecture, compression);
        debug!("fetching package index {}", url);
        let data = self.fetcher.read_all(&url)?;

        if let Some(expected) = entry.strongest_checksum() {
            if !checksum::verify(Cursor::new(&data), &expected)? {
                return Err(AptError::ChecksumMismatch {
                    path: url,
                    expected: expected.digest,
                });
            }
        }

        let reader = read_decompressed(Box::new(Cursor::new(data)), compression)?;

        packages::parse(BufReader::new(reader))
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            checksum::{hex_digest, ChecksumType},
            io::DefaultFetcher,
            release::FileEntry,
            test_keys,
        },
        pgp::ser::Serialize,
        std::{io::Write, path::Path},
    };

    const PACKAGES: &str = include_str!("../testdata/packages-focal-main");
    const PLAIN_PACKAGES: &str = "Package: only-plain\nVersion: 1.0\n";

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = libflate::gzip::Encoder::new(Vec::new()).expect("gzip encoder");
        encoder.write_all(data).expect("gzip write");
        encoder.finish().into_result().expect("gzip finish")
    }

    fn file_entry(path: &str, data: &[u8]) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size: data.len() as u64,
            md5: Some(hex_digest(data, ChecksumType::Md5).expect("md5")),
            sha1: None,
            sha256: Some(hex_digest(data, ChecksumType::Sha256).expect("sha256")),
        }
    }

    /// Lays out a single suite repository on the filesystem.
    struct Fixture {
        _temp_dir: tempfile::TempDir,
        client: RepositoryClient<DefaultFetcher>,
        release: ReleaseIndex,
        suite_dir: std::path::PathBuf,
    }

    fn write_file(path: &Path, data: &[u8]) {
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        std::fs::write(path, data).expect("write file");
    }

    fn fixture() -> Fixture {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path().join("repo");
        let suite_dir = root.join("dists").join("focal");

        let gz = gzip(PACKAGES.as_bytes());
        write_file(&suite_dir.join("main/binary-amd64/Packages.gz"), &gz);
        write_file(
            &suite_dir.join("main/binary-amd64/Packages"),
            PLAIN_PACKAGES.as_bytes(),
        );

        let mut release = ReleaseIndex {
            origin: Some("Example".into()),
            suite: Some("focal".into()),
            components: vec!["main".into()],
            architectures: vec!["amd64".into()],
            ..Default::default()
        };
        for entry in [
            file_entry("main/binary-amd64/Packages.gz", &gz),
            file_entry("main/binary-amd64/Packages", PACKAGES.as_bytes()),
        ] {
            release.files.insert(entry.path.clone(), entry);
        }

        let text = release.to_string();
        write_file(&suite_dir.join("Release"), text.as_bytes());

        let signed = test_keys::SIGNER.sign(&text);
        write_file(&suite_dir.join("InRelease"), signed.as_bytes());

        let sources_list = temp_dir.path().join("sources.list");
        write_file(
            &sources_list,
            format!("deb {}/ focal main\n", root.display()).as_bytes(),
        );

        let config = AptConfig {
            source_list_path: sources_list,
            trusted_keyring_path: temp_dir.path().join("trusted.gpg"),
            trusted_keys_dir: temp_dir.path().join("trusted.gpg.d"),
            ..Default::default()
        };

        Fixture {
            _temp_dir: temp_dir,
            client: RepositoryClient::new(config, DefaultFetcher::default()),
            release,
            suite_dir,
        }
    }

    #[test]
    fn sources_and_release() -> Result<()> {
        let fixture = fixture();

        let sources = fixture.client.sources()?;
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].component, "main");

        let release = fixture.client.fetch_release(&sources[0])?;
        assert_eq!(release, fixture.release);

        Ok(())
    }

    #[test]
    fn packages_prefer_verified_compressed_variant() -> Result<()> {
        let fixture = fixture();
        let sources = fixture.client.sources()?;
        let source = &sources[0];

        let records = fixture.client.fetch_packages(source, Some(&fixture.release))?;
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].name, "zsh");

        let records = fixture.client.fetch_packages(source, None)?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "only-plain");

        Ok(())
    }

    #[test]
    fn packages_checksum_mismatch() -> Result<()> {
        let fixture = fixture();
        let sources = fixture.client.sources()?;
        let source = &sources[0];

        write_file(
            &fixture.suite_dir.join("main/binary-amd64/Packages.gz"),
            &gzip(PLAIN_PACKAGES.as_bytes()),
        );

        let res = fixture.client.fetch_packages(source, Some(&fixture.release));
        assert!(matches!(
            res,
            Err(AptError::ChecksumMismatch { path, expected })
                if path.ends_with("main/binary-amd64/Packages.gz")
                    && Some(expected.as_str()) == fixture.release.files["main/binary-amd64/Packages.gz"].sha256.as_deref()
        ));

        Ok(())
    }

    #[test]
    fn unlisted_index_is_fetched_plain() -> Result<()> {
        let fixture = fixture();
        let sources = fixture.client.sources()?;
        let source = &sources[0];

        let mut release = fixture.release.clone();
        release.files.clear();

        let records = fixture.client.fetch_packages(source, Some(&release))?;
        assert_eq!(records.len(), 1);

        Ok(())
    }

    #[test]
    fn verified_release() -> Result<()> {
        let fixture = fixture();
        let sources = fixture.client.sources()?;
        let source = &sources[0];
        let signer = &test_keys::SIGNER.public;
        let other = &test_keys::OTHER.public;

        let keys = ReleaseKeys::Key {
            material: signer.to_bytes()?,
            format: KeyFormat::Binary,
        };
        assert_eq!(
            fixture.client.fetch_verified_release(source, &keys)?,
            fixture.release
        );

        // Trusted store is empty.
        assert!(matches!(
            fixture
                .client
                .fetch_verified_release(source, &fixture.client.trusted_keys()),
            Err(AptError::NoTrustedKeyVerified)
        ));

        std::fs::write(&fixture.client.config().trusted_keyring_path, other.to_bytes()?)?;
        std::fs::create_dir(&fixture.client.config().trusted_keys_dir)?;
        std::fs::write(
            fixture.client.config().trusted_keys_dir.join("signer.gpg"),
            signer.to_bytes()?,
        )?;
        assert_eq!(
            fixture
                .client
                .fetch_verified_release(source, &fixture.client.trusted_keys())?,
            fixture.release
        );

        Ok(())
    }
}
