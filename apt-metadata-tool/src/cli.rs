// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    apt_metadata::{
        checksum::{verify_path, Checksum},
        cleartext,
        client::RepositoryClient,
        config::AptConfig,
        error::AptError,
        io::{ContentFetcher, DefaultFetcher},
        packages,
        release::ReleaseIndex,
        signature::{verify_with_key_file, KeyFormat, TrustedKeyStore},
        sources_list,
    },
    clap::{Arg, ArgMatches, Command},
    log::{info, warn, LevelFilter},
    serde::Serialize,
    std::io::Cursor,
    thiserror::Error,
};

const PATHS_ABOUT: &str = "\
Paths and URLs

Commands reading repository content accept either a local filesystem path or a
URL. If a value contains `://`, it is parsed as a URL:

file://
   A local filesystem path.

http:// and https://
   Content is fetched over HTTP. Any response status other than success is an
   error.

Anything else is interpreted as a local filesystem path.
";

const CONFIG_ABOUT: &str = "\
# YAML Configuration

--config points to a YAML document with any of the following keys:

source_list_path (string)
   Path to the primary sources.list. Default /etc/apt/sources.list.
   Files in the same path with `.d` appended are loaded as well.

architecture (string)
   Architecture of binary package indices. Default amd64.

trusted_keyring_path (string)
   Primary trusted keyring. Default /etc/apt/trusted.gpg.

trusted_keys_dir (string)
   Directory of additional `*.gpg` trusted keys. Default /etc/apt/trusted.gpg.d.
";

const RELEASE_VERIFY_ABOUT: &str = "\
Verify the signature of an InRelease file.

With --pubkey, the document must be signed by that key. The key file is binary
unless --armor is given.

Without --pubkey, every key in the trusted keyring and the trusted keys
directory is tried until one verifies the document.

On success the verified release file is printed.
";

#[derive(Debug, Error)]
pub enum AmtError {
    #[error("argument parsing error: {0:?}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Apt(#[from] AptError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0:?}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),

    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(String),
}

pub type Result<T> = std::result::Result<T, AmtError>;

fn print_yaml(value: &impl Serialize) -> Result<()> {
    print!("{}", serde_yaml::to_string(value)?);

    Ok(())
}

/// Resolve the configuration from global arguments.
fn load_config(args: &ArgMatches) -> Result<AptConfig> {
    let mut config = if let Some(path) = args.value_of("config") {
        let f = std::fs::File::open(path)?;
        serde_yaml::from_reader(f)?
    } else {
        AptConfig::default()
    };

    if let Some(path) = args.value_of("sources-list") {
        config.source_list_path = path.into();
    }
    if let Some(arch) = args.value_of("arch") {
        config.architecture = arch.to_string();
    }

    Ok(config)
}

fn path_or_url_arg() -> Arg<'static> {
    Arg::new("path")
        .required(true)
        .help("Local path or URL of the file to read")
}

fn command() -> Command<'static> {
    let app = Command::new("APT Metadata Tool")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect and verify APT repository metadata")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .takes_value(true)
                .global(true)
                .help("Path to a YAML file defining host configuration"),
        )
        .arg(
            Arg::new("sources-list")
                .long("sources-list")
                .takes_value(true)
                .global(true)
                .help("Path to the primary sources.list file"),
        )
        .arg(
            Arg::new("arch")
                .long("arch")
                .takes_value(true)
                .global(true)
                .help("Architecture of binary package indices"),
        );

    let app = app.subcommand(
        Command::new("sources").about("Print the sources defined by the source list"),
    );

    let app = app.subcommand(
        Command::new("release-load")
            .about("Parse a Release or InRelease file without verifying it")
            .arg(path_or_url_arg()),
    );

    let app = app.subcommand(
        Command::new("release-verify")
            .about("Verify and parse an InRelease file")
            .long_about(RELEASE_VERIFY_ABOUT)
            .arg(path_or_url_arg())
            .arg(
                Arg::new("pubkey")
                    .long("pubkey")
                    .takes_value(true)
                    .help("Path to the public key the document must be signed by"),
            )
            .arg(
                Arg::new("armor")
                    .long("armor")
                    .requires("pubkey")
                    .help("The public key is ASCII armored"),
            ),
    );

    let app = app.subcommand(
        Command::new("packages")
            .about("Parse a Packages file, decompressing .xz and .gz variants")
            .arg(path_or_url_arg()),
    );

    let app = app.subcommand(
        Command::new("checksum")
            .about("Verify the checksum of a file")
            .arg(path_or_url_arg())
            .arg(
                Arg::new("type")
                    .long("type")
                    .takes_value(true)
                    .required(true)
                    .help("Checksum type (md5, sha1 or sha256)"),
            )
            .arg(
                Arg::new("digest")
                    .long("digest")
                    .takes_value(true)
                    .required(true)
                    .help("Expected hex digest"),
            ),
    );

    let app = app.subcommand(
        Command::new("fetch-indices")
            .about("Fetch and verify the release and package indices of every configured source")
            .arg(
                Arg::new("insecure")
                    .long("insecure")
                    .help("Fetch unsigned Release files instead of verifying InRelease files"),
            ),
    );

    let app = app.subcommand(Command::new("paths").about("Print documentation about paths and URLs"));

    app.subcommand(Command::new("yaml-config").about("Print documentation about the YAML configuration"))
}

pub fn run_cli() -> Result<()> {
    let mut app = command();
    let matches = app.clone().get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("sources", args)) => command_sources(args),
        Some(("release-load", args)) => command_release_load(args),
        Some(("release-verify", args)) => command_release_verify(args),
        Some(("packages", args)) => command_packages(args),
        Some(("checksum", args)) => command_checksum(args),
        Some(("fetch-indices", args)) => command_fetch_indices(args),
        Some(("paths", _)) => {
            println!("{}", PATHS_ABOUT);
            Ok(())
        }
        Some(("yaml-config", _)) => {
            println!("{}", CONFIG_ABOUT);
            Ok(())
        }
        Some((command, _)) => Err(AmtError::InvalidSubCommand(command.to_string())),
        None => {
            app.print_help()?;
            Ok(())
        }
    }
}

fn command_sources(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;

    print_yaml(&sources_list::parse_file(&config.source_list_path)?)
}

fn command_release_load(args: &ArgMatches) -> Result<()> {
    let path = args.value_of("path").expect("path argument is required");

    let data = DefaultFetcher::default().read_all(path)?;

    let release = if data.starts_with(cleartext::HEADER.as_bytes()) {
        warn!("signature of {} not verified", path);
        ReleaseIndex::parse_cleartext(&data)?
    } else {
        ReleaseIndex::parse(Cursor::new(data))?
    };

    print_yaml(&release)
}

fn command_release_verify(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let path = args.value_of("path").expect("path argument is required");

    let data = DefaultFetcher::default().read_all(path)?;

    let text = if let Some(key_path) = args.value_of("pubkey") {
        let format = if args.is_present("armor") {
            KeyFormat::Armored
        } else {
            KeyFormat::Binary
        };

        verify_with_key_file(&data, key_path, format)?
    } else {
        TrustedKeyStore::from_config(&config).verify(&data)?
    };

    info!("signature verified");

    print_yaml(&ReleaseIndex::parse(Cursor::new(text.as_bytes()))?)
}

fn command_packages(args: &ArgMatches) -> Result<()> {
    let path = args.value_of("path").expect("path argument is required");

    print_yaml(&packages::load(&DefaultFetcher::default(), path)?)
}

fn command_checksum(args: &ArgMatches) -> Result<()> {
    let path = args.value_of("path").expect("path argument is required");
    let checksum = Checksum::new(
        args.value_of("type").expect("type argument is required"),
        args.value_of("digest").expect("digest argument is required"),
    )?;

    if verify_path(&DefaultFetcher::default(), path, &checksum)? {
        println!("OK");
        Ok(())
    } else {
        Err(AmtError::ChecksumMismatch(path.to_string()))
    }
}

fn command_fetch_indices(args: &ArgMatches) -> Result<()> {
    let client = RepositoryClient::new(load_config(args)?, DefaultFetcher::default());
    let keys = client.trusted_keys();

    for source in client.sources()? {
        let release = if args.is_present("insecure") {
            client.fetch_release(&source)?
        } else {
            client.fetch_verified_release(&source, &keys)?
        };

        let records = client.fetch_packages(&source, Some(&release))?;

        println!(
            "{} {} {} {}: {} packages",
            source.kind,
            source.base_url,
            source.suite,
            source.component,
            records.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn verify_command() {
        command().debug_assert();
    }

    #[test]
    fn global_overrides() -> Result<()> {
        let matches = command().try_get_matches_from([
            "amt",
            "sources",
            "--sources-list",
            "/srv/sources.list",
            "--arch",
            "arm64",
        ])?;
        let (_, args) = matches.subcommand().expect("subcommand present");

        let config = load_config(args)?;
        assert_eq!(config.source_list_path, std::path::PathBuf::from("/srv/sources.list"));
        assert_eq!(config.architecture, "arm64");
        assert_eq!(config.trusted_keys_dir, AptConfig::default().trusted_keys_dir);

        Ok(())
    }

    #[test]
    fn armor_requires_pubkey() {
        assert!(command()
            .try_get_matches_from(["amt", "release-verify", "InRelease", "--armor"])
            .is_err());
    }
}
