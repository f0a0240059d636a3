//! Install manifest, redirect page and landing page rendering.
//!
//! The manifest is the XML property list the device fetches after following
//! the install-scheme URL. It is rebuilt from [`AppMetadata`] on every request.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::models::AppMetadata;

pub const INSTALL_SCHEME: &str = "itms-services";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub items: Vec<ManifestItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub assets: Vec<Asset>,
    pub metadata: ItemMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub kind: AssetKind,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    SoftwarePackage,
    DisplayImage,
    FullSizeImage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ItemMetadata {
    pub bundle_identifier: String,
    pub bundle_version: String,
    pub kind: String,
    pub title: String,
}

/// Absolute URLs of the small and large display images.
#[derive(Debug, Clone)]
pub struct ImageUrls {
    pub small: String,
    pub large: String,
}

impl Manifest {
    pub fn to_xml(&self) -> Result<Vec<u8>, plist::Error> {
        let mut out = Vec::new();
        plist::to_writer_xml(&mut out, self)?;
        Ok(out)
    }

    pub fn from_xml(data: &[u8]) -> Result<Self, plist::Error> {
        plist::from_bytes(data)
    }

    /// The single installable item.
    pub fn item(&self) -> Option<&ManifestItem> {
        self.items.first()
    }
}

pub fn build_manifest(
    metadata: &AppMetadata,
    payload_url: &str,
    images: Option<&ImageUrls>,
) -> Manifest {
    let mut assets = vec![Asset {
        kind: AssetKind::SoftwarePackage,
        url: payload_url.to_string(),
    }];
    if let Some(images) = images {
        assets.push(Asset {
            kind: AssetKind::DisplayImage,
            url: images.small.clone(),
        });
        assets.push(Asset {
            kind: AssetKind::FullSizeImage,
            url: images.large.clone(),
        });
    }
    Manifest {
        items: vec![ManifestItem {
            assets,
            metadata: ItemMetadata {
                bundle_identifier: metadata.identifier.clone(),
                bundle_version: metadata.version.clone(),
                kind: "software".to_string(),
                title: metadata.name.clone(),
            },
        }],
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

/// Install-scheme URL that makes the device fetch `manifest_url`.
pub fn install_url(manifest_url: &str, metadata: &AppMetadata, payload_url: &str) -> String {
    // `version` carries the display name, not metadata.version. Devices in the
    // field have always been sent this mapping.
    format!(
        "{INSTALL_SCHEME}://?action=download-manifest&url={}&bundleid={}&name={}&version={}&fetchurl={}",
        encode(manifest_url),
        encode(&metadata.identifier),
        encode(&metadata.name),
        encode(&metadata.name),
        encode(payload_url),
    )
}

/// Page whose only job is to navigate the browser to `install_url`.
///
/// `install_url` must already be percent-encoded (see [`install_url`]), so it
/// cannot break out of the string literal.
pub fn build_redirect(install_url: &str) -> String {
    format!(r#"<script type="text/javascript">window.location="{install_url}"</script>"#)
}

pub fn landing_page(redirect_path: &str, name: &str) -> String {
    let name = escape_html(name);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Install {name}</title>
</head>
<body>
<h1>{name}</h1>
<p><a href="{redirect_path}">Install</a></p>
</body>
</html>
"#
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
