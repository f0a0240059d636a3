//! TLS identity provisioning.
//!
//! The device refuses the manifest unless the certificate presented by the
//! session covers the hostname the session advertises, so every identity is
//! bound to that hostname and checked against it.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use rcgen::{CertificateParams, DnType, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use x509_parser::prelude::*;

use crate::config::SessionConfig;
use crate::error::TlsConfigError;

/// Certificate chain and key bound to one hostname.
#[derive(Debug)]
pub struct TlsIdentity {
    hostname: String,
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

/// Pick the identity for a session, or `None` when TLS is terminated
/// outside the session.
pub fn provision(config: &SessionConfig) -> Result<Option<TlsIdentity>, TlsConfigError> {
    if !config.use_builtin_tls {
        tracing::info!(hostname = %config.hostname, "external tls; listening in plaintext");
        return Ok(None);
    }
    let identity = match (config.tls_cert.as_deref(), config.tls_key.as_deref()) {
        (Some(cert), Some(key)) => TlsIdentity::from_pem_files(&config.hostname, cert, key)?,
        (None, None) => TlsIdentity::self_signed(&config.hostname)?,
        _ => return Err(TlsConfigError::Incomplete),
    };
    Ok(Some(identity))
}

impl TlsIdentity {
    /// Generate a throwaway certificate whose SAN and CN are `hostname`.
    pub fn self_signed(hostname: &str) -> Result<Self, TlsConfigError> {
        let mut params = CertificateParams::new(vec![hostname.to_string()])?;
        params.distinguished_name.push(DnType::CommonName, hostname);
        let key_pair = KeyPair::generate()?;
        let cert = params.self_signed(&key_pair)?;
        tracing::info!(hostname = %hostname, "generated self-signed certificate");
        Ok(Self {
            hostname: hostname.to_string(),
            cert_chain: vec![cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        })
    }

    pub fn from_pem_files(
        hostname: &str,
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<Self, TlsConfigError> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|source| TlsConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        };
        let cert_pem = read(cert_path)?;
        let key_pem = read(key_path)?;

        let cert_chain = rustls_pemfile::certs(&mut cert_pem.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsConfigError::Parse(format!("{}: {e}", cert_path.display())))?;
        if cert_chain.is_empty() {
            return Err(TlsConfigError::MissingCertificate(cert_path.to_path_buf()));
        }
        let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
            .map_err(|e| TlsConfigError::Parse(format!("{}: {e}", key_path.display())))?
            .ok_or_else(|| TlsConfigError::MissingKey(key_path.to_path_buf()))?;

        let identity = Self {
            hostname: hostname.to_string(),
            cert_chain,
            key,
        };
        identity.check_hostname()?;
        tracing::info!(
            hostname = %hostname,
            cert = %cert_path.display(),
            chain_len = identity.cert_chain.len(),
            "loaded tls certificate"
        );
        Ok(identity)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    /// DNS and IP names the leaf certificate is valid for.
    pub fn certificate_names(&self) -> Result<Vec<String>, TlsConfigError> {
        let leaf = self
            .cert_chain
            .first()
            .ok_or_else(|| TlsConfigError::Parse("empty certificate chain".to_string()))?;
        certificate_names(leaf.as_ref())
    }

    fn check_hostname(&self) -> Result<(), TlsConfigError> {
        let names = self.certificate_names()?;
        if names.iter().any(|name| name_covers(name, &self.hostname)) {
            Ok(())
        } else {
            Err(TlsConfigError::HostnameMismatch {
                hostname: self.hostname.clone(),
                names,
            })
        }
    }

    pub fn server_config(&self) -> Result<rustls::ServerConfig, TlsConfigError> {
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(self.cert_chain.clone(), self.key.clone_key())?;
        Ok(config)
    }
}

fn certificate_names(der: &[u8]) -> Result<Vec<String>, TlsConfigError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| TlsConfigError::Parse(e.to_string()))?;

    let mut names = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => names.push(dns.to_string()),
                GeneralName::IPAddress(raw) => {
                    if let Some(ip) = ip_from_octets(raw) {
                        names.push(ip.to_string());
                    }
                }
                _ => {}
            }
        }
    }
    // Common name only counts when there are no SANs.
    if names.is_empty() {
        for cn in cert.subject().iter_common_name() {
            if let Ok(cn) = cn.as_str() {
                names.push(cn.to_string());
            }
        }
    }
    Ok(names)
}

fn ip_from_octets(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => <[u8; 4]>::try_from(raw).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(raw).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

/// Whether certificate name `pattern` covers `hostname`. A leading `*.`
/// matches exactly one label.
fn name_covers(pattern: &str, hostname: &str) -> bool {
    if let (Ok(a), Ok(b)) = (pattern.parse::<IpAddr>(), hostname.parse::<IpAddr>()) {
        return a == b;
    }
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
    if pattern == hostname {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        if let Some((label, rest)) = hostname.split_once('.') {
            return !label.is_empty() && rest == suffix;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "ota-install-tls-{}-{}",
            uuid::Uuid::new_v4(),
            name
        ));
        std::fs::write(&path, contents).expect("write temp file");
        path
    }

    fn pem_pair(names: &[&str]) -> (PathBuf, PathBuf) {
        let params =
            CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
                .unwrap();
        let key_pair = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        (
            write_temp("cert.pem", &cert.pem()),
            write_temp("key.pem", &key_pair.serialize_pem()),
        )
    }

    #[test]
    fn external_tls_provisions_nothing() {
        let cfg = SessionConfig {
            use_builtin_tls: false,
            ..SessionConfig::default()
        };
        assert!(provision(&cfg).unwrap().is_none());
    }

    #[test]
    fn self_signed_identity_covers_hostname() {
        let identity = TlsIdentity::self_signed("install.local").unwrap();
        assert_eq!(identity.hostname(), "install.local");
        assert_eq!(identity.certificate_names().unwrap(), vec!["install.local"]);
        assert!(identity.check_hostname().is_ok());
        identity.server_config().unwrap();
    }

    #[test]
    fn self_signed_for_ip_hostname() {
        let identity = TlsIdentity::self_signed("127.0.0.1").unwrap();
        assert!(identity.check_hostname().is_ok());
    }

    #[test]
    fn only_cert_or_key_is_incomplete() {
        let cfg = SessionConfig {
            tls_cert: Some(PathBuf::from("/tmp/cert.pem")),
            ..SessionConfig::default()
        };
        assert!(matches!(provision(&cfg), Err(TlsConfigError::Incomplete)));
    }

    #[test]
    fn loaded_certificate_must_cover_hostname() {
        let (cert, key) = pem_pair(&["*.example.test"]);
        let ok = TlsIdentity::from_pem_files("device.example.test", &cert, &key).unwrap();
        ok.server_config().unwrap();

        let err = TlsIdentity::from_pem_files("other.test", &cert, &key).unwrap_err();
        match err {
            TlsConfigError::HostnameMismatch { hostname, names } => {
                assert_eq!(hostname, "other.test");
                assert_eq!(names, vec!["*.example.test"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        let _ = std::fs::remove_file(cert);
        let _ = std::fs::remove_file(key);
    }

    #[test]
    fn provision_loads_configured_files() {
        let (cert, key) = pem_pair(&["localhost"]);
        let cfg = SessionConfig {
            tls_cert: Some(cert.clone()),
            tls_key: Some(key.clone()),
            ..SessionConfig::default()
        };
        let identity = provision(&cfg).unwrap().unwrap();
        assert_eq!(identity.cert_chain().len(), 1);
        let _ = std::fs::remove_file(cert);
        let _ = std::fs::remove_file(key);
    }

    #[test]
    fn garbage_pem_is_rejected() {
        let cert = write_temp("bad-cert.pem", "not a certificate");
        let key = write_temp("bad-key.pem", "not a key");
        assert!(matches!(
            TlsIdentity::from_pem_files("localhost", &cert, &key),
            Err(TlsConfigError::MissingCertificate(_))
        ));
        let _ = std::fs::remove_file(cert);
        let _ = std::fs::remove_file(key);
    }

    #[test]
    fn missing_file_is_read_error() {
        let missing = std::env::temp_dir().join("ota-install-tls-missing.pem");
        assert!(matches!(
            TlsIdentity::from_pem_files("localhost", &missing, &missing),
            Err(TlsConfigError::Read { .. })
        ));
    }

    #[test]
    fn wildcard_matches_one_label() {
        assert!(name_covers("*.localhost.direct", "app.localhost.direct"));
        assert!(!name_covers("*.localhost.direct", "localhost.direct"));
        assert!(!name_covers("*.localhost.direct", "a.b.localhost.direct"));
        assert!(name_covers("Example.COM", "example.com."));
        assert!(name_covers("::1", "0:0:0:0:0:0:0:1"));
        assert!(!name_covers("10.0.0.1", "10.0.0.2"));
    }
}
