//! Provides a means to read, parse and hold configuration options for probe runs.
use crate::error::Result;
use crate::prober::{Credential, DEFAULT_MAX_CONCURRENCY, DEFAULT_TIMEOUT};
use crate::registry::CoreNodeSpec;
use clap::Parser;
use serde_derive::Deserialize;
use std::fs;
use std::path::PathBuf;

const DEFAULT_RTSP_PORT: u16 = 554;
const CONFIG_FILE_NAME: &str = ".fleetscout.toml";

/// Parses one `user:pass` pair. The password may itself contain `:`.
pub fn parse_credential(input: &str) -> std::result::Result<Credential, String> {
    let Some((username, password)) = input.trim().split_once(':') else {
        return Err(format!(
            "Invalid credential '{input}'. Expected 'user:pass'. Example: admin:admin."
        ));
    };
    if username.is_empty() {
        return Err(format!("Missing username in credential '{input}'"));
    }
    Ok(Credential::new(username, password))
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fleetscout",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Bounded RTSP stream validation for devices you are authorized to test.
/// Tries each stream path, anonymously and with every supplied credential,
/// and reports which ones answer.
pub struct Opts {
    /// IP address or hostname of the device to probe.
    #[arg(short = 'a', long)]
    pub target: Option<String>,

    /// RTSP port on the target.
    #[arg(short, long, default_value_t = DEFAULT_RTSP_PORT)]
    pub port: u16,

    /// A comma-delimited list of stream paths. Defaults to common camera paths.
    #[arg(long, value_delimiter = ',')]
    pub paths: Option<Vec<String>>,

    /// A comma-delimited list of user:pass credentials tried on every path.
    #[arg(short = 'u', long, value_delimiter = ',', value_parser = parse_credential)]
    pub credentials: Vec<Credential>,

    /// Maximum number of attempts in flight at once. 0 is corrected to 1.
    #[arg(short, long, default_value_t = DEFAULT_MAX_CONCURRENCY)]
    pub max_concurrency: usize,

    /// The timeout in milliseconds for a single attempt.
    #[arg(short, long, default_value_t = default_timeout_ms())]
    pub timeout: u64,

    /// Refuse all active probing.
    #[arg(long)]
    pub safe_mode: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,

    /// Greppable mode. Only output working stream URIs.
    #[arg(short, long)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,
}

fn default_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    pub fn read() -> Self {
        Self::parse()
    }

    /// Merges values found within the user configuration file into the
    /// command line arguments.
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

        merge_required!(port, max_concurrency, timeout, greppable, accessible);

        // The file may switch safe mode on, never off.
        self.safe_mode |= config.safe_mode.unwrap_or(false);

        // Credentials from the command line win over the file.
        if self.credentials.is_empty() {
            if let Some(credentials) = &config.credentials {
                self.credentials = credentials
                    .iter()
                    .filter_map(|c| parse_credential(c).ok())
                    .collect();
            }
        }
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if self.$field.is_none() && config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(target, paths);
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            target: None,
            port: DEFAULT_RTSP_PORT,
            paths: None,
            credentials: vec![],
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            timeout: default_timeout_ms(),
            safe_mode: false,
            no_config: true,
            config_path: None,
            greppable: false,
            accessible: false,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    target: Option<String>,
    port: Option<u16>,
    paths: Option<Vec<String>>,
    credentials: Option<Vec<String>>,
    max_concurrency: Option<usize>,
    timeout: Option<u64>,
    safe_mode: Option<bool>,
    greppable: Option<bool>,
    accessible: Option<bool>,
    #[serde(default)]
    core_nodes: Vec<CoreNodeSpec>,
}

impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file yields an empty config.
    ///
    /// # Format
    ///
    /// ```toml
    /// port = 8554
    /// paths = ["/stream1", "/live"]
    /// credentials = ["admin:admin"]
    /// max_concurrency = 2
    /// safe_mode = false
    ///
    /// [[core_nodes]]
    /// id = "exec-pi"
    /// label = "Control Host"
    /// node_type = "control-host"
    /// capabilities = ["scan", "probe"]
    /// ```
    pub fn read(custom_config_path: Option<PathBuf>) -> Result<Self> {
        let Some(config_path) = custom_config_path.or_else(default_config_path) else {
            return Ok(Self::default());
        };
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(config_path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Baseline nodes the registry must always hold.
    pub fn core_nodes(&self) -> &[CoreNodeSpec] {
        &self.core_nodes
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

    use super::{parse_credential, Config, Opts};
    use crate::error::Error;
    use crate::registry::NodeType;

    impl Config {
        fn sample() -> Self {
            Self {
                target: Some("10.0.0.40".to_owned()),
                port: Some(8554),
                paths: Some(vec!["/live".to_owned()]),
                credentials: Some(vec!["admin:admin".to_owned(), "broken".to_owned()]),
                max_concurrency: Some(2),
                timeout: Some(750),
                safe_mode: Some(true),
                greppable: Some(true),
                accessible: None,
                core_nodes: vec![],
            }
        }
    }

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn parses_cli_defaults() {
        let opts = Opts::parse_from(["fleetscout", "--target", "10.0.0.5"]);
        assert_eq!(opts.target.as_deref(), Some("10.0.0.5"));
        assert_eq!(opts.port, 554);
        assert_eq!(opts.max_concurrency, 4);
        assert_eq!(opts.timeout, 2000);
        assert!(opts.credentials.is_empty());
        assert!(!opts.safe_mode);
    }

    #[test]
    fn parses_credential_and_path_lists() {
        let opts = Opts::parse_from([
            "fleetscout",
            "-a",
            "cam.local",
            "--paths",
            "/stream1,/live",
            "--credentials",
            "admin:admin,root:pa:ss",
        ]);
        assert_eq!(opts.paths.unwrap(), ["/stream1", "/live"]);
        let credentials = opts
            .credentials
            .iter()
            .map(|c| (c.username.as_str(), c.password.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(credentials, [("admin", "admin"), ("root", "pa:ss")]);
    }

    #[parameterized(input = {
        "admin", ":secret", "",
    })]
    fn rejects_malformed_credentials(input: &str) {
        assert!(parse_credential(input).is_err());
    }

    #[test]
    fn accepts_empty_password() {
        let credential = parse_credential("guest:").unwrap();
        assert_eq!(credential.username, "guest");
        assert!(credential.password.is_empty());
    }

    #[test]
    fn opts_no_merge_when_config_is_ignored() {
        let mut opts = Opts::default();
        opts.merge(&Config::sample());

        assert!(opts.target.is_none());
        assert_eq!(opts.port, 554);
        assert!(!opts.safe_mode);
        assert!(opts.credentials.is_empty());
    }

    #[test]
    fn opts_merge_required_arguments() {
        let mut opts = Opts::default();
        let config = Config::sample();

        opts.merge_required(&config);

        assert_eq!(opts.port, 8554);
        assert_eq!(opts.max_concurrency, 2);
        assert_eq!(opts.timeout, 750);
        assert!(opts.safe_mode);
        assert!(opts.greppable);
        assert!(!opts.accessible);
        assert_eq!(opts.credentials.len(), 1);
    }

    #[test]
    fn config_cannot_switch_off_safe_mode() {
        let mut opts = Opts {
            safe_mode: true,
            no_config: false,
            ..Opts::default()
        };
        opts.merge(&Config::parse("safe_mode = false").unwrap());
        assert!(opts.safe_mode);

        let mut opts = Opts {
            no_config: false,
            ..Opts::default()
        };
        opts.merge(&Config::parse("safe_mode = true").unwrap());
        assert!(opts.safe_mode);
    }

    #[test]
    fn opts_merge_optional_keeps_cli_values() {
        let mut opts = Opts {
            target: Some("cam.local".to_owned()),
            ..Opts::default()
        };
        let config = Config::sample();

        opts.merge_optional(&config);

        assert_eq!(opts.target.as_deref(), Some("cam.local"));
        assert_eq!(opts.paths, config.paths);
    }

    #[test]
    fn parses_core_nodes() {
        let config = Config::parse(
            r#"
            max_concurrency = 3

            [[core_nodes]]
            id = "exec-pi"
            label = "Control Host"
            node_type = "control-host"
            capabilities = ["scan", "probe"]

            [[core_nodes]]
            id = "relay-1"
            label = "Relay"
            aliases = ["pi-relay"]
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrency, Some(3));
        let nodes = config.core_nodes();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].node_type, NodeType::ControlHost);
        assert_eq!(nodes[1].node_type, NodeType::Unknown);
        assert_eq!(nodes[1].aliases, ["pi-relay"]);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(matches!(Config::parse("port = \"five\""), Err(Error::Config(_))));
    }

    #[test]
    fn missing_config_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::read(Some(dir.path().join("absent.toml"))).unwrap();
        assert!(config.core_nodes().is_empty());
        assert!(config.port.is_none());
    }
}
