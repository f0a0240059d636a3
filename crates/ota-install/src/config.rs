//! Session configuration loading and validation.
//!
//! Everything the session needs to decide about TLS, hostname and ports is
//! carried here; nothing is read from process-wide state.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;

use crate::error::SessionError;
use crate::port::PortRange;

/// Install session configuration, usually loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Terminate TLS in the session. When false a reverse proxy is expected
    /// to front the plaintext listener.
    pub use_builtin_tls: bool,
    /// Advertised hostname; also the certificate subject.
    pub hostname: String,
    /// Range the listening port is drawn from.
    pub port_range: PortRange,
    /// Interface to bind.
    pub bind_ip: IpAddr,
    /// HTTP worker threads.
    pub workers: usize,
    /// Optional certificate chain (PEM). Self-signed when unset.
    pub tls_cert: Option<PathBuf>,
    /// Optional private key (PEM).
    pub tls_key: Option<PathBuf>,
    /// Base URL the device should use instead of `scheme://hostname:port`.
    pub public_base_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            use_builtin_tls: true,
            hostname: "localhost".to_string(),
            port_range: PortRange::default(),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            workers: 1,
            tls_cert: None,
            tls_key: None,
            public_base_url: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<SessionConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.hostname.trim().is_empty() {
            return Err(SessionError::InvalidConfig("hostname is empty".to_string()));
        }
        if !self.port_range.is_valid() {
            return Err(SessionError::InvalidConfig(format!(
                "port range {}-{} is empty or includes 0",
                self.port_range.min, self.port_range.max
            )));
        }
        if self.workers == 0 {
            return Err(SessionError::InvalidConfig("workers must be at least 1".to_string()));
        }
        if let Some(raw) = self.public_base_url.as_deref() {
            let url = validate_public_url(raw)?;
            let host = url.host_str().unwrap_or_default();
            let host = host.trim_start_matches('[').trim_end_matches(']');
            // The session's own certificate is issued for `hostname` only.
            if self.use_builtin_tls && !host.eq_ignore_ascii_case(self.hostname.trim()) {
                return Err(SessionError::InvalidConfig(format!(
                    "public_base_url {raw} does not point at hostname {}",
                    self.hostname
                )));
            }
        }
        Ok(())
    }

    /// Base URL every advertised endpoint hangs off, without a trailing slash.
    pub fn advertised_base_url(&self, port: u16) -> String {
        if let Some(url) = self.public_base_url.as_ref() {
            return url.trim_end_matches('/').to_string();
        }
        let scheme = if self.use_builtin_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.hostname, port)
    }
}

fn validate_public_url(raw: &str) -> Result<Url, SessionError> {
    let invalid =
        |reason: &str| SessionError::InvalidConfig(format!("public_base_url {raw:?}: {reason}"));
    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(invalid("must use http or https")),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("host is required"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_install_protocol_expectations() {
        let cfg = SessionConfig::default();
        assert!(cfg.use_builtin_tls);
        assert_eq!(cfg.port_range, PortRange::new(4000, 8000));
        assert_eq!(cfg.workers, 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: SessionConfig = toml::from_str(
            r#"
            hostname = "install.example.net"
            use_builtin_tls = false

            [port_range]
            min = 6000
            max = 6100
            "#,
        )
        .unwrap();
        assert_eq!(cfg.hostname, "install.example.net");
        assert!(!cfg.use_builtin_tls);
        assert_eq!(cfg.port_range, PortRange::new(6000, 6100));
        assert_eq!(cfg.workers, 1);
        assert!(cfg.tls_cert.is_none());
    }

    #[test]
    fn advertised_base_url_follows_tls_mode() {
        let mut cfg = SessionConfig::default();
        assert_eq!(cfg.advertised_base_url(4321), "https://localhost:4321");
        cfg.use_builtin_tls = false;
        assert_eq!(cfg.advertised_base_url(4321), "http://localhost:4321");
    }

    #[test]
    fn advertised_base_url_prefers_public_url() {
        let cfg = SessionConfig {
            use_builtin_tls: false,
            public_base_url: Some("https://proxy.example.com/".to_string()),
            ..SessionConfig::default()
        };
        assert_eq!(cfg.advertised_base_url(4321), "https://proxy.example.com");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let cfg = SessionConfig {
            hostname: "  ".to_string(),
            ..SessionConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(SessionError::InvalidConfig(_))));

        let cfg = SessionConfig {
            port_range: PortRange::new(8000, 4000),
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = SessionConfig {
            workers: 0,
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = SessionConfig {
            public_base_url: Some("ftp://nope".to_string()),
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn builtin_tls_public_url_must_match_hostname() {
        let cfg = SessionConfig {
            hostname: "install.example.net".to_string(),
            public_base_url: Some("https://install.example.net:9443/".to_string()),
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_ok());

        let cfg = SessionConfig {
            public_base_url: Some("https://other.example.net".to_string()),
            ..cfg
        };
        assert!(matches!(cfg.validate(), Err(SessionError::InvalidConfig(_))));
    }

    #[test]
    fn public_url_must_be_absolute_with_host() {
        for raw in ["http://", "https://exa mple.com/x", "install.example.net", "ftp://install.example.net"] {
            let cfg = SessionConfig {
                use_builtin_tls: false,
                public_base_url: Some(raw.to_string()),
                ..SessionConfig::default()
            };
            assert!(
                matches!(cfg.validate(), Err(SessionError::InvalidConfig(_))),
                "{raw} accepted"
            );
        }
    }

    #[test]
    fn public_url_host_compare_ignores_case() {
        let cfg = SessionConfig {
            hostname: "Install.Example.net".to_string(),
            public_base_url: Some("https://install.example.net/".to_string()),
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_ok());

        let cfg = SessionConfig {
            hostname: "::1".to_string(),
            public_base_url: Some("https://[::1]:9443".to_string()),
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_reports_missing_file() {
        let path = std::env::temp_dir().join("ota-install-config-does-not-exist.toml");
        let err = SessionConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("read config"));
    }
}
