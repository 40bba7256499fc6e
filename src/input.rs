//! Provides a means to read, parse and hold configuration options for scans.
use anyhow::Context;
use clap::Parser;
use serde_derive::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::address::Address;
use crate::errors::AddressError;
use crate::protocol::Protocol;
use crate::scanner::{default_workers, ScanSettings, DEFAULT_TASKS_PER_WORKER};

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_SCAN_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_OUT_DIR: &str = "results";
const CONFIG_FILE_NAME: &str = ".rangescan.toml";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rangescan",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Sweeps the public IPv4 space in increasing order and records every host
/// that answers an application probe.
/// WARNING Only scan networks you are allowed to scan. Many operators treat
/// unsolicited probes as hostile.
pub struct Opts {
    /// Address to start from. Defaults to 1.0.0.0.
    #[arg(short, long, default_value = "")]
    pub ip: String,

    /// The probe to run against every reachable host.
    #[arg(short, long, value_enum, ignore_case = true, default_value = "http")]
    pub scanner: Protocol,

    /// Number of workers pulling from the address queue. Defaults to the
    /// number of available cores.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Concurrent probes per worker. The total number of open sockets is
    /// workers × tasks, so keep it below your open file limit.
    #[arg(short, long, default_value_t = DEFAULT_TASKS_PER_WORKER)]
    pub tasks: usize,

    /// Port to probe instead of the scanner's default.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Only check that the port accepts connections. Reachable addresses are
    /// appended to --output when it is set.
    #[arg(long)]
    pub only_connect: bool,

    /// File that collects reachable addresses in connect-only mode.
    #[arg(short, long, value_parser)]
    pub output: Option<PathBuf>,

    /// Newline-delimited file of addresses to scan instead of the range,
    /// for example an --output file from an earlier connect-only run.
    #[arg(short = 'I', long, value_parser)]
    pub input: Option<PathBuf>,

    /// Directory the results are written to, one subdirectory per scanner.
    #[arg(long, value_parser, default_value = DEFAULT_OUT_DIR)]
    pub out_dir: PathBuf,

    /// The timeout in milliseconds for establishing a connection.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout: u64,

    /// The timeout in milliseconds for the whole probe exchange.
    #[arg(long, default_value_t = DEFAULT_SCAN_TIMEOUT_MS)]
    pub scan_timeout: u64,

    /// Target connections per second. Recorded and reported only.
    #[arg(long)]
    pub rate: Option<u32>,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(short, long)]
    pub ulimit: Option<u64>,

    /// Hide the progress spinner.
    #[arg(short, long)]
    pub quiet: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    pub fn read() -> Self {
        Self::parse()
    }

    /// Merges values found within the user configuration file into the
    /// options read from the command line.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(
            ip,
            scanner,
            tasks,
            only_connect,
            out_dir,
            connect_timeout,
            scan_timeout,
            quiet
        );
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(workers, port, output, input, rate, ulimit);
    }

    pub fn start(&self) -> Result<Address, AddressError> {
        Address::parse_start(&self.ip)
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }

    /// Engine settings described by these options.
    pub fn settings(&self) -> ScanSettings {
        ScanSettings {
            protocol: self.scanner,
            port: self.port,
            workers: self.workers(),
            tasks_per_worker: self.tasks,
            only_connect: self.only_connect,
            connect_timeout: Duration::from_millis(self.connect_timeout),
            scan_timeout: Duration::from_millis(self.scan_timeout),
            reachable_output: self.output.clone(),
            rate: self.rate,
        }
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            ip: String::new(),
            scanner: Protocol::Http,
            workers: None,
            tasks: DEFAULT_TASKS_PER_WORKER,
            port: None,
            only_connect: false,
            output: None,
            input: None,
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_MS,
            scan_timeout: DEFAULT_SCAN_TIMEOUT_MS,
            rate: None,
            ulimit: None,
            quiet: false,
            no_config: true,
            config_path: None,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[cfg(not(tarpaulin_include))]
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    ip: Option<String>,
    scanner: Option<Protocol>,
    workers: Option<usize>,
    tasks: Option<usize>,
    port: Option<u16>,
    only_connect: Option<bool>,
    output: Option<PathBuf>,
    input: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    connect_timeout: Option<u64>,
    scan_timeout: Option<u64>,
    rate: Option<u32>,
    ulimit: Option<u64>,
    quiet: Option<bool>,
}

#[cfg(not(tarpaulin_include))]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file yields an empty config.
    ///
    /// # Format
    ///
    /// scanner = "minecraft"
    /// ip = "31.0.0.0"
    /// workers = 8
    /// tasks = 256
    /// scan_timeout = 5000
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config_path = match custom_config_path {
            Some(path) => path,
            None => match default_config_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", config_path.display()))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(CONFIG_FILE_NAME);
    Some(config_path)
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use parameterized::parameterized;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::{Config, Opts};
    use crate::address::Address;
    use crate::protocol::Protocol;

    impl Config {
        fn sample() -> Self {
            Self {
                ip: Some("31.0.0.0".to_owned()),
                scanner: Some(Protocol::Handshake),
                workers: Some(8),
                tasks: Some(64),
                port: None,
                only_connect: Some(true),
                output: None,
                input: None,
                out_dir: Some(PathBuf::from("/tmp/out")),
                connect_timeout: Some(250),
                scan_timeout: None,
                rate: None,
                ulimit: Some(10_000),
                quiet: Some(true),
            }
        }
    }

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[parameterized(input = {
        vec!["rangescan"],
        vec!["rangescan", "-s", "minecraft"],
        vec!["rangescan", "--scanner", "VELOREN"],
        vec!["rangescan", "--scanner", "http", "-p", "8080"],
    }, expected = {
        (Protocol::Http, 80),
        (Protocol::Handshake, 25565),
        (Protocol::Discovery, 14006),
        (Protocol::Http, 8080),
    })]
    fn parse_scanner_and_port(input: Vec<&str>, expected: (Protocol, u16)) {
        let opts = Opts::parse_from(input);
        let settings = opts.settings();

        assert_eq!(settings.protocol, expected.0);
        assert_eq!(
            settings.port.unwrap_or(settings.protocol.default_port()),
            expected.1
        );
    }

    #[test]
    fn defaults_match_documented_values() {
        let opts = Opts::parse_from(["rangescan"]);

        assert_eq!(opts.start().unwrap(), Address::DEFAULT_START);
        assert_eq!(opts.tasks, 512);
        assert_eq!(opts.out_dir, PathBuf::from("results"));

        let settings = opts.settings();
        assert_eq!(settings.connect_timeout, Duration::from_secs(1));
        assert_eq!(settings.scan_timeout, Duration::from_secs(3));
        assert!(settings.workers >= 1);
    }

    #[test]
    fn invalid_start_is_rejected() {
        let opts = Opts::parse_from(["rangescan", "-i", "1.2.3"]);
        assert!(opts.start().is_err());
    }

    #[test]
    fn unknown_scanner_is_rejected() {
        assert!(Opts::try_parse_from(["rangescan", "-s", "gopher"]).is_err());
    }

    #[test]
    fn opts_no_merge_when_config_is_ignored() {
        let mut opts = Opts::default();
        let config = Config::sample();

        opts.merge(&config);

        assert_eq!(opts.ip, "");
        assert_eq!(opts.scanner, Protocol::Http);
        assert_eq!(opts.workers, None);
        assert!(!opts.quiet);
    }

    #[test]
    fn opts_merge_required_arguments() {
        let mut opts = Opts::default();
        let config = Config::sample();

        opts.merge_required(&config);

        assert_eq!(opts.ip, "31.0.0.0");
        assert_eq!(opts.scanner, Protocol::Handshake);
        assert_eq!(opts.tasks, 64);
        assert!(opts.only_connect);
        assert_eq!(opts.out_dir, PathBuf::from("/tmp/out"));
        assert_eq!(opts.connect_timeout, 250);
        assert_eq!(opts.scan_timeout, 3_000);
    }

    #[test]
    fn opts_merge_optional_arguments() {
        let mut opts = Opts {
            port: Some(8080),
            ..Opts::default()
        };
        let config = Config::sample();

        opts.merge_optional(&config);

        assert_eq!(opts.workers, Some(8));
        assert_eq!(opts.ulimit, Some(10_000));
        assert_eq!(opts.port, Some(8080));
    }

    #[test]
    fn parses_config_file() {
        let config = Config::parse(
            r#"
            scanner = "veloren"
            workers = 4
            rate = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.scanner, Some(Protocol::Discovery));
        assert_eq!(config.workers, Some(4));
        assert_eq!(config.rate, Some(1000));
    }

    #[test]
    fn rejects_unknown_config_keys() {
        assert!(Config::parse("batch_size = 10").is_err());
    }

    #[test]
    fn missing_config_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::read(Some(dir.path().join("absent.toml"))).unwrap();
        assert!(config.scanner.is_none());
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "workers = \"many\"").unwrap();
        assert!(Config::read(Some(path)).is_err());
    }
}
