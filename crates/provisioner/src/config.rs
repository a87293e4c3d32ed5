//! Configuration for a provisioner
//!
//! The best way to configure the provisioner is by using [`Config::new`] or by
//! turning on the "cli" feature and using [`Config::new_from_flags`].

use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "cli")]
use structopt::StructOpt;

use crate::volume::Identity;

/// Name StorageClasses use to select this provisioner unless told otherwise.
pub const DEFAULT_PROVISIONER_NAME: &str = "shared-data";
/// Directory holding the shared datasets unless told otherwise.
pub const DEFAULT_BASE_DIR: &str = "/var/shared-data";
/// Delay before the first retry of a failing object unless told otherwise.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(10);
/// Upper bound on the delay between retries unless told otherwise.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(300);

/// The configuration needed for a provisioner to run properly.
///
/// There is deliberately no `Default`: the node name has no sensible default and
/// a provisioner without one cannot tell its volumes apart from those of its
/// peers.
#[derive(Clone, Debug)]
pub struct Config {
    /// Name matched against the `provisioner` field of StorageClasses
    pub provisioner_name: String,
    /// Directory under which each shared dataset lives in its own subdirectory
    pub base_dir: PathBuf,
    /// Name of the node this provisioner runs on, used as its identity
    pub node_name: String,
    /// Delay before the first retry of an object that failed to reconcile
    pub retry_base_delay: Duration,
    /// Upper bound on the delay between retries
    pub retry_max_delay: Duration,
}

impl Config {
    /// Returns a Config for the given node with every other value defaulted.
    pub fn new(node_name: impl Into<String>) -> Self {
        Config {
            provisioner_name: DEFAULT_PROVISIONER_NAME.to_owned(),
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            node_name: node_name.into(),
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }

    /// Overrides the provisioner name.
    pub fn with_provisioner_name(mut self, name: impl Into<String>) -> Self {
        self.provisioner_name = name.into();
        self
    }

    /// Overrides the base directory.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// The identity stamped onto every volume this provisioner creates.
    pub fn identity(&self) -> Identity {
        Identity::new(self.node_name.as_str())
    }

    /// Parses all command line flags and sets the proper defaults. The version
    /// of your application should be passed to set the proper version for the CLI.
    ///
    /// Fails when no node name was given, which callers should treat as fatal.
    #[cfg(any(feature = "cli", feature = "docs"))]
    #[cfg_attr(feature = "docs", doc(cfg(feature = "cli")))]
    pub fn new_from_flags(version: &str) -> anyhow::Result<Self> {
        let app = Opts::clap().version(version);
        let opts = Opts::from_clap(&app.get_matches());
        Self::from_opts(opts)
    }

    #[cfg(any(feature = "cli", feature = "docs"))]
    fn from_opts(opts: Opts) -> anyhow::Result<Self> {
        if opts.node_name.is_empty() {
            return Err(anyhow::anyhow!(
                "env variable NODE_NAME must be set so that this provisioner can identify itself"
            ));
        }

        if opts.retry_base_seconds == 0 {
            return Err(anyhow::anyhow!("--retry-base-seconds must be at least 1"));
        }
        if opts.retry_cap_seconds < opts.retry_base_seconds {
            return Err(anyhow::anyhow!(
                "--retry-cap-seconds ({}) must not be less than --retry-base-seconds ({})",
                opts.retry_cap_seconds,
                opts.retry_base_seconds
            ));
        }

        // An empty environment variable counts as unset
        let provisioner_name = if opts.provisioner_name.is_empty() {
            DEFAULT_PROVISIONER_NAME.to_owned()
        } else {
            opts.provisioner_name
        };
        let base_dir = if opts.base_dir.as_os_str().is_empty() {
            PathBuf::from(DEFAULT_BASE_DIR)
        } else {
            opts.base_dir
        };

        Ok(Config {
            provisioner_name,
            base_dir,
            node_name: opts.node_name,
            retry_base_delay: Duration::from_secs(opts.retry_base_seconds),
            retry_max_delay: Duration::from_secs(opts.retry_cap_seconds),
        })
    }
}

/// CLI options that can be configured for the provisioner
///
/// These can be parsed from args using `Opts::from_args()`
#[derive(StructOpt, Clone, Debug)]
#[cfg(any(feature = "cli", feature = "docs"))]
#[cfg_attr(feature = "docs", doc(cfg(feature = "cli")))]
#[structopt(
    name = "shared-data-provisioner",
    about = "Binds PersistentVolumeClaims to pre-populated host directories"
)]
pub struct Opts {
    #[structopt(
        long = "provisioner-name",
        default_value = DEFAULT_PROVISIONER_NAME,
        env = "SHARED_DATA_PROVISIONER_NAME",
        help = "The name StorageClasses use to select this provisioner"
    )]
    provisioner_name: String,

    #[structopt(
        long = "base-dir",
        default_value = DEFAULT_BASE_DIR,
        env = "NODE_BASE_DIR",
        help = "The directory containing one subdirectory per shared dataset"
    )]
    base_dir: PathBuf,

    #[structopt(
        long = "node-name",
        env = "NODE_NAME",
        help = "The name of the node this provisioner runs on. Used to recognize the volumes it created"
    )]
    node_name: String,

    #[structopt(
        long = "retry-base-seconds",
        default_value = "10",
        env = "RETRY_BASE_SECONDS",
        help = "Seconds to wait before retrying an object that failed to reconcile"
    )]
    retry_base_seconds: u64,

    #[structopt(
        long = "retry-cap-seconds",
        default_value = "300",
        env = "RETRY_CAP_SECONDS",
        help = "Maximum seconds to wait between retries"
    )]
    retry_cap_seconds: u64,
}
