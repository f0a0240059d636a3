//! Paths and absolute URLs advertised by one session.

use uuid::Uuid;

pub const PING_PATH: &str = "/ping";
pub const INDEX_PATHS: [&str; 2] = ["/", "/index.html"];
pub const REDIRECT_PATH: &str = "/i";
pub const SMALL_IMAGE_PATH: &str = "/app57x57.png";
pub const LARGE_IMAGE_PATH: &str = "/app512x512.png";

/// Fixed route table of a session. Manifest and payload paths embed the
/// session id so a stale install URL never reaches a newer session.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
    manifest_path: String,
    payload_path: String,
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>, session_id: Uuid) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            manifest_path: format!("/{session_id}.plist"),
            payload_path: format!("/{session_id}.ipa"),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn manifest_path(&self) -> &str {
        &self.manifest_path
    }

    pub fn payload_path(&self) -> &str {
        &self.payload_path
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn manifest_url(&self) -> String {
        self.url(&self.manifest_path)
    }

    pub fn payload_url(&self) -> String {
        self.url(&self.payload_path)
    }

    /// The page to open on the device to start installing.
    pub fn redirect_url(&self) -> String {
        self.url(REDIRECT_PATH)
    }

    pub fn small_image_url(&self) -> String {
        self.url(SMALL_IMAGE_PATH)
    }

    pub fn large_image_url(&self) -> String {
        self.url(LARGE_IMAGE_PATH)
    }
}
