// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! APT repository metadata.

This crate implements the client side of consuming a Debian-style APT
repository's metadata: discovering configured sources, fetching and parsing
release and package indices, and verifying their integrity and authenticity.

It does not resolve dependencies, install packages or manage a package
database.

# A Tour of Functionality

The [sources_list] module parses `sources.list` files. Each directive line
expands into one [sources_list::SourceDescriptor] per component, and
descriptors know how to derive the URLs of their suite's release files and
package indices.

The [release] module parses `Release` files into [release::ReleaseIndex]. The
parser switches between suite metadata fields and the checksum tables that list
every indices file of the suite, tolerating malformed content along the way.

The [packages] module reads `Packages` indices into
[packages::PackageRecord], transparently decompressing `.xz` and `.gz`
variants.

The [checksum] module verifies content digests. [signature] verifies PGP
cleartext signed documents like `InRelease` files, either against an explicit
key or by trying every key of the host's [signature::TrustedKeyStore]. The
cleartext framework itself lives in [cleartext].

Raw bytes are obtained through the [io::ContentFetcher] trait.
[io::DefaultFetcher] reads local paths and `file://` URLs and, with the `http`
feature (enabled by default), `http://` and `https://` URLs.

[client::RepositoryClient] ties everything together: given an
[config::AptConfig] it loads sources, fetches verified release files and
fetches package indices verified against the checksums their release lists.
*/

pub mod checksum;
pub mod cleartext;
pub mod client;
pub mod config;
pub mod error;
pub mod io;
pub mod packages;
pub mod release;
pub mod signature;
pub mod sources_list;

#[cfg(test)]
pub(crate) mod test_keys;
