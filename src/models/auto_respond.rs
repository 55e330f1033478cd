use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::sms::{phone_digits, same_number};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoRespondConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_max_response_length")]
    pub max_response_length: usize,
    #[serde(default)]
    pub business_hours_only: bool,
    #[serde(default)]
    pub business_hours: BusinessHours,
    #[serde(default = "default_excluded_keywords")]
    pub excluded_keywords: Vec<String>,
    #[serde(default)]
    pub excluded_phone_numbers: Vec<String>,
    /// Empty means every inbound number gets replies.
    #[serde(default)]
    pub auto_respond_phone_numbers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessHours {
    #[serde(default = "default_open")]
    pub start: String,
    #[serde(default = "default_close")]
    pub end: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start: default_open(),
            end: default_close(),
            timezone: default_timezone(),
        }
    }
}

impl BusinessHours {
    /// Unparseable bounds never close the business.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let start = NaiveTime::parse_from_str(&self.start, "%H:%M");
        let end = NaiveTime::parse_from_str(&self.end, "%H:%M");
        match (start, end) {
            (Ok(start), Ok(end)) => time >= start && time <= end,
            _ => true,
        }
    }
}

/// Partial update accepted by the admin API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutoRespondConfigPatch {
    pub enabled: Option<bool>,
    pub confidence_threshold: Option<f64>,
    pub max_response_length: Option<usize>,
    pub business_hours_only: Option<bool>,
    pub business_hours: Option<BusinessHours>,
    pub excluded_keywords: Option<Vec<String>>,
    pub excluded_phone_numbers: Option<Vec<String>>,
    pub auto_respond_phone_numbers: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_max_response_length() -> usize {
    500
}

fn default_open() -> String {
    "09:00".to_string()
}

fn default_close() -> String {
    "17:00".to_string()
}

fn default_timezone() -> String {
    "America/Chicago".to_string()
}

fn default_excluded_keywords() -> Vec<String> {
    ["urgent", "emergency", "complaint", "refund", "asap", "immediately", "911"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AutoRespondConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: default_confidence_threshold(),
            max_response_length: default_max_response_length(),
            business_hours_only: false,
            business_hours: BusinessHours::default(),
            excluded_keywords: default_excluded_keywords(),
            excluded_phone_numbers: Vec::new(),
            auto_respond_phone_numbers: Vec::new(),
        }
    }
}

impl AutoRespondConfig {
    pub fn apply(&mut self, patch: AutoRespondConfigPatch) {
        if let Some(v) = patch.enabled {
            self.enabled = v;
        }
        if let Some(v) = patch.confidence_threshold {
            self.confidence_threshold = v;
        }
        if let Some(v) = patch.max_response_length {
            self.max_response_length = v;
        }
        if let Some(v) = patch.business_hours_only {
            self.business_hours_only = v;
        }
        if let Some(v) = patch.business_hours {
            self.business_hours = v;
        }
        if let Some(v) = patch.excluded_keywords {
            self.excluded_keywords = v;
        }
        if let Some(v) = patch.excluded_phone_numbers {
            self.excluded_phone_numbers = v;
        }
        if let Some(v) = patch.auto_respond_phone_numbers {
            self.auto_respond_phone_numbers = v;
        }
    }

    pub fn contains_excluded_keyword(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.excluded_keywords
            .iter()
            .any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
    }

    pub fn is_excluded_phone(&self, phone: &str) -> bool {
        let digits = phone_digits(phone);
        self.excluded_phone_numbers
            .iter()
            .any(|p| same_number(&phone_digits(p), &digits))
    }

    pub fn is_auto_respond_number(&self, phone: &str) -> bool {
        if self.auto_respond_phone_numbers.is_empty() {
            return true;
        }
        let digits = phone_digits(phone);
        self.auto_respond_phone_numbers
            .iter()
            .any(|p| same_number(&phone_digits(p), &digits))
    }

    /// Clips a reply to `max_response_length` characters.
    pub fn clip(&self, text: &str) -> String {
        if self.max_response_length == 0 || text.chars().count() <= self.max_response_length {
            return text.to_string();
        }
        text.chars().take(self.max_response_length).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_from_empty_json() {
        let config = serde_json::from_str::<AutoRespondConfig>("{}").unwrap();
        assert!(config.enabled);
        assert_eq!(config.max_response_length, 500);
        assert_eq!(config.business_hours.start, "09:00");
        assert!(config.excluded_keywords.contains(&"emergency".to_string()));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = serde_json::from_str::<AutoRespondConfig>(r#"{"enabled":false}"#).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.confidence_threshold, 0.7);
    }

    #[test]
    fn test_phone_matching_ignores_formatting() {
        let config = AutoRespondConfig {
            excluded_phone_numbers: vec!["(918) 555-0100".to_string()],
            ..Default::default()
        };
        assert!(config.is_excluded_phone("+19185550100"));
        assert!(!config.is_excluded_phone("+19185550101"));
    }

    #[test]
    fn test_empty_auto_respond_list_accepts_all() {
        let config = AutoRespondConfig::default();
        assert!(config.is_auto_respond_number("+15550000000"));

        let config = AutoRespondConfig {
            auto_respond_phone_numbers: vec!["+15551234567".to_string()],
            ..Default::default()
        };
        assert!(config.is_auto_respond_number("5551234567"));
        assert!(!config.is_auto_respond_number("+15557654321"));
    }

    #[test]
    fn test_excluded_keyword_case_insensitive() {
        let config = AutoRespondConfig::default();
        assert!(config.contains_excluded_keyword("This is an EMERGENCY"));
        assert!(!config.contains_excluded_keyword("book a head spa"));
    }

    #[test]
    fn test_business_hours_contains() {
        let hours = BusinessHours::default();
        assert!(hours.contains(NaiveTime::from_hms_opt(9, 0, 0).unwrap()));
        assert!(hours.contains(NaiveTime::from_hms_opt(16, 59, 0).unwrap()));
        assert!(!hours.contains(NaiveTime::from_hms_opt(18, 0, 0).unwrap()));
    }

    #[test]
    fn test_clip_counts_chars() {
        let config = AutoRespondConfig {
            max_response_length: 3,
            ..Default::default()
        };
        assert_eq!(config.clip("héllo"), "hél");
        assert_eq!(config.clip("hi"), "hi");
    }
}
