//! Cycle-wide audit policy, loaded once at cycle start and immutable for the
//! duration of a cycle. The options file keeps the two-token Yes/No boolean
//! convention of the tabular store it mirrors.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AuditError;

/// Placeholder value shipped in the options template; running with it still in
/// place is a configuration error, not a silent no-op.
pub const WEBHOOK_PLACEHOLDER: &str = "WEBHOOK_URL";

/// Two-token boolean cells: `Yes`/`No` (case-insensitive).
mod yes_no {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(if *value { "Yes" } else { "No" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
        let token = String::deserialize(de)?;
        match token.to_lowercase().as_str() {
            "yes" => Ok(true),
            "no" => Ok(false),
            other => Err(de::Error::custom(format!(
                "expected Yes or No, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditOptions {
    #[serde(with = "yes_no")]
    pub check_ad_urls: bool,
    #[serde(with = "yes_no")]
    pub check_keyword_urls: bool,
    #[serde(with = "yes_no")]
    pub check_sitelink_urls: bool,

    #[serde(with = "yes_no")]
    pub check_paused_ads: bool,
    #[serde(with = "yes_no")]
    pub check_paused_keywords: bool,
    #[serde(with = "yes_no")]
    pub check_paused_sitelinks: bool,

    /// HTTP status codes considered healthy. Everything else is an error.
    pub valid_codes: Vec<u16>,

    /// When No, only rows outside the valid-code set are persisted.
    #[serde(with = "yes_no")]
    pub save_all_urls: bool,

    #[serde(with = "yes_no")]
    pub notify_each_run: bool,
    #[serde(with = "yes_no")]
    pub notify_on_completion: bool,

    /// Minimum days between the start of one cycle and the next. Fractional
    /// values are honored.
    pub frequency_days: f64,

    /// Outbound webhook for the notification sink. Empty disables delivery.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Milliseconds to sleep after each successful probe. Zero disables.
    #[serde(default)]
    pub throttle_ms: u64,
}

impl AuditOptions {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AuditError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AuditError::ConfigInvalid(format!(
                "cannot read options file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let options: AuditOptions = serde_json::from_str(&raw)
            .map_err(|e| AuditError::ConfigInvalid(format!("malformed options file: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Reject configurations that would make the whole cycle meaningless or
    /// that still carry template placeholders.
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.valid_codes.is_empty() {
            return Err(AuditError::ConfigInvalid(
                "valid_codes must list at least one status code".into(),
            ));
        }
        if self.frequency_days < 0.0 {
            return Err(AuditError::ConfigInvalid(
                "frequency_days must be non-negative".into(),
            ));
        }
        if let Some(webhook) = &self.webhook_url {
            if webhook == WEBHOOK_PLACEHOLDER {
                return Err(AuditError::ConfigInvalid(
                    "webhook_url still holds the template placeholder".into(),
                ));
            }
            if !webhook.is_empty() && url::Url::parse(webhook).is_err() {
                return Err(AuditError::ConfigInvalid(format!(
                    "webhook_url is not a valid URL: {webhook}"
                )));
            }
        }
        Ok(())
    }

    pub fn is_valid_code(&self, code: u16) -> bool {
        self.valid_codes.contains(&code)
    }
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            check_ad_urls: true,
            check_keyword_urls: true,
            check_sitelink_urls: true,
            check_paused_ads: false,
            check_paused_keywords: false,
            check_paused_sitelinks: false,
            valid_codes: vec![200],
            save_all_urls: false,
            notify_each_run: false,
            notify_on_completion: true,
            frequency_days: 7.0,
            webhook_url: None,
            throttle_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yes_no_round_trip() {
        let json = serde_json::to_string(&AuditOptions::default()).unwrap();
        assert!(json.contains("\"check_ad_urls\":\"Yes\""));
        assert!(json.contains("\"check_paused_ads\":\"No\""));
        let back: AuditOptions = serde_json::from_str(&json).unwrap();
        assert!(back.check_ad_urls);
        assert!(!back.check_paused_ads);
    }

    #[test]
    fn test_yes_no_case_insensitive() {
        let mut value = serde_json::to_value(AuditOptions::default()).unwrap();
        value["check_ad_urls"] = serde_json::Value::String("YES".into());
        value["save_all_urls"] = serde_json::Value::String("no".into());
        let back: AuditOptions = serde_json::from_value(value).unwrap();
        assert!(back.check_ad_urls);
        assert!(!back.save_all_urls);
    }

    #[test]
    fn test_rejects_placeholder_webhook() {
        let options = AuditOptions {
            webhook_url: Some(WEBHOOK_PLACEHOLDER.into()),
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(crate::error::AuditError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_rejects_empty_valid_codes() {
        let options = AuditOptions {
            valid_codes: vec![],
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_webhook_url() {
        let options = AuditOptions {
            webhook_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
