use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use ota_install::SessionConfig;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "ota-serve", version = VERSION)]
pub struct Args {
    /// Path to the app package (.ipa)
    pub package: PathBuf,

    /// Bundle identifier, e.g. com.example.app
    #[arg(long)]
    pub bundle_id: String,

    /// Bundle version string
    #[arg(long)]
    pub bundle_version: String,

    /// Display name shown in the install prompt
    #[arg(long)]
    pub name: String,

    /// PNG icon shown while installing
    #[arg(long)]
    pub icon: Option<PathBuf>,

    /// Optional session config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Hostname the device should connect to
    #[arg(long)]
    pub hostname: Option<String>,

    /// Serve plaintext and expect a TLS-terminating proxy in front
    #[arg(long)]
    pub external_tls: bool,

    /// Interface to bind, e.g. 0.0.0.0
    #[arg(long)]
    pub bind_ip: Option<IpAddr>,

    /// Advertise this base URL instead of scheme://hostname:port
    #[arg(long)]
    pub public_base_url: Option<String>,
}

impl Args {
    /// Flags win over values from the config file.
    pub fn apply_overrides(&self, cfg: &mut SessionConfig) {
        if let Some(hostname) = self.hostname.as_ref() {
            cfg.hostname = hostname.clone();
        }
        if self.external_tls {
            cfg.use_builtin_tls = false;
        }
        if let Some(ip) = self.bind_ip {
            cfg.bind_ip = ip;
        }
        if let Some(url) = self.public_base_url.as_ref() {
            cfg.public_base_url = Some(url.clone());
        }
    }
}
