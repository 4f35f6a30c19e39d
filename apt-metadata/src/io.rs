// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers.

[ContentFetcher] is the generic mechanism for obtaining raw bytes given a local
path or a URL. [DefaultFetcher] is the stock implementation: HTTP(S) URLs are
retrieved with a blocking HTTP client and everything else is read from the
filesystem.

[Compression] and [read_decompressed()] provide transparent decompression of
index files.
*/

use {
    crate::error::{AptError, Result},
    log::debug,
    std::io::{BufRead, BufReader, Read},
    strum::{EnumIter, IntoEnumIterator},
    url::Url,
};

/// Generic mechanism for obtaining content at a given path or URL.
///
/// Implementations only need to implement `open()`.
pub trait ContentFetcher {
    /// Open a local path or URL for reading.
    ///
    /// Returns the raw content without any decoding applied.
    fn open(&self, path_or_url: &str) -> Result<Box<dyn Read + Send>>;

    /// Read the full content of a path or URL into memory.
    fn read_all(&self, path_or_url: &str) -> Result<Vec<u8>> {
        let mut reader = self.open(path_or_url)?;

        let mut data = vec![];
        reader.read_to_end(&mut data)?;

        Ok(data)
    }
}

/// A [ContentFetcher] that reads from HTTP servers and the local filesystem.
///
/// Values containing `://` are parsed as URLs. `http://` and `https://` URLs
/// are retrieved over HTTP and a non-success response status is an error.
/// `file://` URLs are converted to filesystem paths. Anything else is treated as
/// a local filesystem path.
#[derive(Clone, Debug, Default)]
pub struct DefaultFetcher {
    #[cfg(feature = "http")]
    client: reqwest::blocking::Client,
}

impl DefaultFetcher {
    /// Construct an instance using the given HTTP client.
    #[cfg(feature = "http")]
    pub fn new_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }

    #[cfg(feature = "http")]
    fn open_http(&self, url: Url) -> Result<Box<dyn Read + Send>> {
        debug!("fetching {}", url);

        let res = self.client.get(url.clone()).send()?;

        if !res.status().is_success() {
            return Err(AptError::HttpStatus {
                url: url.to_string(),
                status: res.status().as_u16(),
            });
        }

        Ok(Box::new(res))
    }

    #[cfg(not(feature = "http"))]
    fn open_http(&self, url: Url) -> Result<Box<dyn Read + Send>> {
        Err(AptError::UnsupportedUrlScheme(url.scheme().to_string()))
    }

    fn open_file(&self, path: &std::path::Path) -> Result<Box<dyn Read + Send>> {
        debug!("opening {}", path.display());

        let f = std::fs::File::open(path)
            .map_err(|e| AptError::IoPath(format!("{}", path.display()), e))?;

        Ok(Box::new(BufReader::new(f)))
    }
}

impl ContentFetcher for DefaultFetcher {
    fn open(&self, path_or_url: &str) -> Result<Box<dyn Read + Send>> {
        if !path_or_url.contains("://") {
            return self.open_file(std::path::Path::new(path_or_url));
        }

        let url = Url::parse(path_or_url)?;

        match url.scheme() {
            "http" | "https" => self.open_http(url),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| AptError::UnsupportedUrlScheme(path_or_url.to_string()))?;
                self.open_file(&path)
            }
            scheme => Err(AptError::UnsupportedUrlScheme(scheme.to_string())),
        }
    }
}

/// Compression format of an index file.
///
/// Variants are declared in the default retrieval preference order.
#[derive(Clone, Copy, Debug, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Compression {
    /// XZ compression (.xz extension).
    Xz,

    /// Gzip compression (.gz extension).
    Gzip,

    /// No compression (no extension).
    None,
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Xz => ".xz",
            Self::Gzip => ".gz",
        }
    }

    /// Human readable name of the format.
    pub fn format_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Xz => "xz",
            Self::Gzip => "gzip",
        }
    }

    /// Resolve the compression format from the suffix of a path or URL.
    ///
    /// Unrecognized suffixes are treated as uncompressed content.
    pub fn from_path(path: &str) -> Self {
        if path.ends_with(".xz") {
            Self::Xz
        } else if path.ends_with(".gz") {
            Self::Gzip
        } else {
            Self::None
        }
    }

    /// The default retrieval preference order for clients.
    pub fn default_preferred_order() -> impl Iterator<Item = Compression> {
        Self::iter()
    }
}

fn decompression_error(compression: Compression, source: std::io::Error) -> AptError {
    AptError::Decompression {
        format: compression.format_name(),
        source,
    }
}

/// Wrap a reader with transparent decompression.
///
/// Errors if the decompressor could not be set up, e.g. because the stream does
/// not begin with a valid header. The error names the attempted format.
pub fn read_decompressed<'a>(
    stream: Box<dyn Read + Send + 'a>,
    compression: Compression,
) -> Result<Box<dyn Read + Send + 'a>> {
    Ok(match compression {
        Compression::None => stream,
        Compression::Xz => {
            // The decoder only inspects the stream header on first read.
            let mut reader = BufReader::new(xz2::read::XzDecoder::new(stream));
            reader.fill_buf().map_err(|e| decompression_error(compression, e))?;

            Box::new(reader)
        }
        Compression::Gzip => Box::new(
            libflate::gzip::Decoder::new(stream)
                .map_err(|e| decompression_error(compression, e))?,
        ),
    })
}

#[cfg(test)]
mod test {
    use {
        super::*,
        std::io::{Cursor, Write},
    };

    #[test]
    fn compression_from_path() {
        assert_eq!(Compression::from_path("main/binary-amd64/Packages.xz"), Compression::Xz);
        assert_eq!(
            Compression::from_path("http://example.org/dists/focal/main/binary-amd64/Packages.gz"),
            Compression::Gzip
        );
        assert_eq!(Compression::from_path("Packages"), Compression::None);
        assert_eq!(Compression::from_path("Packages.bz2"), Compression::None);
    }

    #[test]
    fn gzip_round_trip() -> Result<()> {
        let mut encoder = libflate::gzip::Encoder::new(Vec::new())?;
        encoder.write_all(b"Package: foo\n")?;
        let compressed = encoder.finish().into_result()?;

        let mut reader = read_decompressed(Box::new(Cursor::new(compressed)), Compression::Gzip)?;
        let mut s = String::new();
        reader.read_to_string(&mut s)?;
        assert_eq!(s, "Package: foo\n");

        Ok(())
    }

    #[test]
    fn bad_gzip_header() {
        let res = read_decompressed(
            Box::new(Cursor::new(b"not gzip data".to_vec())),
            Compression::Gzip,
        );

        assert!(matches!(res, Err(AptError::Decompression { format: "gzip", .. })));
    }

    #[test]
    fn xz_round_trip() -> Result<()> {
        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(b"Package: foo\n")?;
        let compressed = encoder.finish()?;

        let mut reader = read_decompressed(Box::new(Cursor::new(compressed)), Compression::Xz)?;
        let mut s = String::new();
        reader.read_to_string(&mut s)?;
        assert_eq!(s, "Package: foo\n");

        Ok(())
    }

    #[test]
    fn bad_xz_header() {
        let res = read_decompressed(
            Box::new(Cursor::new(b"not xz data".to_vec())),
            Compression::Xz,
        );

        assert!(matches!(res, Err(AptError::Decompression { format: "xz", .. })));
    }

    #[test]
    fn preferred_order() {
        assert_eq!(
            Compression::default_preferred_order().collect::<Vec<_>>(),
            vec![Compression::Xz, Compression::Gzip, Compression::None]
        );
    }

    #[test]
    fn missing_file() {
        let fetcher = DefaultFetcher::default();

        assert!(matches!(
            fetcher.open("testdata/does-not-exist"),
            Err(AptError::IoPath(path, _)) if path == "testdata/does-not-exist"
        ));
    }

    #[test]
    fn unsupported_scheme() {
        let fetcher = DefaultFetcher::default();

        assert!(matches!(
            fetcher.open("ftp://example.org/debian/dists/stable/Release"),
            Err(AptError::UnsupportedUrlScheme(scheme)) if scheme == "ftp"
        ));
    }

    #[test]
    fn http_status_error_message() {
        let err = AptError::HttpStatus {
            url: "http://example.org/ubuntu/dists/focal/InRelease".into(),
            status: 404,
        };

        assert_eq!(
            err.to_string(),
            "failed to fetch http://example.org/ubuntu/dists/focal/InRelease: HTTP status 404"
        );
    }

    #[test]
    fn file_url() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("Release");
        std::fs::write(&path, b"Origin: Debian\n")?;

        let url = Url::from_file_path(&path).expect("absolute path should convert to URL");

        let fetcher = DefaultFetcher::default();
        assert_eq!(fetcher.read_all(url.as_str())?, b"Origin: Debian\n");

        Ok(())
    }
}
