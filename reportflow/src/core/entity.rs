//! Entity profile supplied by intake.

use crate::errors::FatalConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Groups of stakeholders the analysis should consider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stakeholders {
    /// Named competitors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub competitors: Vec<String>,
    /// Regulators and standards bodies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regulators: Vec<String>,
    /// Partners, suppliers and channels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partners: Vec<String>,
    /// Media outlets to monitor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_outlets: Vec<String>,
    /// Key customers or segments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub customers: Vec<String>,
}

impl Stakeholders {
    /// Returns true if no stakeholder group has entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.competitors.is_empty()
            && self.regulators.is_empty()
            && self.partners.is_empty()
            && self.media_outlets.is_empty()
            && self.customers.is_empty()
    }
}

/// The organization being analyzed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    /// Explicit entity key. Derived from the name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Organization name.
    #[serde(default)]
    pub name: String,
    /// Industry or sector.
    #[serde(default)]
    pub industry: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stakeholder lists.
    #[serde(default, skip_serializing_if = "Stakeholders::is_empty")]
    pub stakeholders: Stakeholders,
    /// Additional intake attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

#[allow(clippy::expect_used)]
static SLUG_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("slug pattern is valid"));

impl EntityProfile {
    /// Creates a profile with a name and industry.
    #[must_use]
    pub fn new(name: impl Into<String>, industry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            industry: industry.into(),
            ..Default::default()
        }
    }

    /// Sets an explicit entity key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the stakeholder lists.
    #[must_use]
    pub fn with_stakeholders(mut self, stakeholders: Stakeholders) -> Self {
        self.stakeholders = stakeholders;
        self
    }

    /// Adds a free-form attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Returns the key runs and persisted state are grouped under.
    ///
    /// An explicit key wins; otherwise the name is slugged, keeping letters
    /// and digits of any script. A name with neither is keyed by a digest of
    /// its trimmed text. Returns `None` only for a blank name.
    #[must_use]
    pub fn entity_key(&self) -> Option<String> {
        if let Some(key) = self.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Some(key.to_string());
        }
        let name = self.name.trim();
        if name.is_empty() {
            return None;
        }
        let lowered = name.to_lowercase();
        let slug = SLUG_SEPARATOR.replace_all(&lowered, "-");
        let slug = slug.trim_matches('-');
        if slug.is_empty() {
            let digest = hex::encode(Sha256::digest(name.as_bytes()));
            return Some(format!("entity-{}", &digest[..16]));
        }
        Some(slug.to_string())
    }

    /// Checks the mandatory fields.
    pub fn validate(&self) -> Result<(), FatalConfigError> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name".to_string());
        }
        if self.industry.trim().is_empty() {
            missing.push("industry".to_string());
        }
        if missing.is_empty() && self.entity_key().is_none() {
            missing.push("key".to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FatalConfigError::new(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_key_from_name() {
        let profile = EntityProfile::new("Acme Corp", "software");
        assert_eq!(profile.entity_key().as_deref(), Some("acme-corp"));

        let profile = EntityProfile::new("  Globex, Inc. ", "energy");
        assert_eq!(profile.entity_key().as_deref(), Some("globex-inc"));
    }

    #[test]
    fn test_explicit_key_wins() {
        let profile = EntityProfile::new("Acme Corp", "software").with_key("tenant-42");
        assert_eq!(profile.entity_key().as_deref(), Some("tenant-42"));
    }

    #[test]
    fn test_validate_missing_fields() {
        let err = EntityProfile::new("", "  ").validate().unwrap_err();
        assert_eq!(err.missing_fields, vec!["name", "industry"]);

        assert!(EntityProfile::new("Acme Corp", "software").validate().is_ok());
    }

    #[test]
    fn test_non_ascii_names_keep_their_letters() {
        let profile = EntityProfile::new("株式会社ソニー", "electronics");
        assert_eq!(profile.entity_key().as_deref(), Some("株式会社ソニー"));
        assert!(profile.validate().is_ok());

        let profile = EntityProfile::new("Müller & Söhne GmbH", "machinery");
        assert_eq!(profile.entity_key().as_deref(), Some("müller-söhne-gmbh"));
    }

    #[test]
    fn test_symbol_only_name_is_keyed_by_digest() {
        let profile = EntityProfile::new(" ??? ", "software");
        let key = profile.entity_key().unwrap();
        assert!(key.starts_with("entity-"));
        assert_eq!(key.len(), "entity-".len() + 16);
        assert_eq!(EntityProfile::new("???", "retail").entity_key(), Some(key));
        assert!(profile.validate().is_ok());

        assert_ne!(
            EntityProfile::new("!!!", "software").entity_key(),
            EntityProfile::new("???", "software").entity_key()
        );
        assert_eq!(EntityProfile::new("   ", "software").entity_key(), None);
    }

    #[test]
    fn test_profile_deserializes_with_defaults() {
        let profile: EntityProfile =
            serde_json::from_value(serde_json::json!({"name": "Acme Corp"})).unwrap();

        assert_eq!(profile.industry, "");
        assert!(profile.stakeholders.is_empty());
        assert!(profile.validate().is_err());
    }
}
