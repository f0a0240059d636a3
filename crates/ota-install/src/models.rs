use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Identity of the app being installed, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Reverse-domain bundle identifier, e.g. `com.example.app`.
    pub identifier: String,
    /// Bundle version string.
    pub version: String,
    /// Display name shown by the device while installing.
    pub name: String,
}

impl AppMetadata {
    pub fn new(
        identifier: impl Into<String>,
        version: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            version: version.into(),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.identifier.trim().is_empty() {
            return Err(SessionError::InvalidMetadata("identifier is empty".to_string()));
        }
        if self.identifier.chars().any(char::is_whitespace) {
            return Err(SessionError::InvalidMetadata(format!(
                "identifier contains whitespace: {:?}",
                self.identifier
            )));
        }
        if self.version.trim().is_empty() {
            return Err(SessionError::InvalidMetadata("version is empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(SessionError::InvalidMetadata("name is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_typical_metadata() {
        let meta = AppMetadata::new("com.example.app", "1.0", "Demo App");
        assert!(meta.validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_or_spaced_identifier() {
        assert!(AppMetadata::new("", "1.0", "Demo").validate().is_err());
        assert!(AppMetadata::new("com.example app", "1.0", "Demo").validate().is_err());
        assert!(AppMetadata::new("com.example.app", " ", "Demo").validate().is_err());
        assert!(AppMetadata::new("com.example.app", "1.0", "").validate().is_err());
    }
}
