use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingSms {
    pub from: String,
    pub to: String,
    pub body: String,
    pub timestamp: String,
    pub message_id: String,
}

/// Outcome of handling one inbound message. Never an error: every failure is
/// folded into `error` or `reason`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AutoRespondResult {
    pub success: bool,
    pub response_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AutoRespondResult {
    pub fn skipped(reason: &str) -> Self {
        Self {
            success: true,
            reason: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Numbers match when their digits agree, ignoring a leading US country code.
pub fn same_number(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let strip = |d: &str| -> String {
        if d.len() == 11 && d.starts_with('1') {
            d[1..].to_string()
        } else {
            d.to_string()
        }
    };
    strip(a) == strip(b)
}

/// Stable key for a sender: E.164-style `+` prefix, US numbers assumed when
/// ten digits are given.
pub fn normalize_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    if trimmed.starts_with('+') {
        return format!("+{}", phone_digits(trimmed));
    }
    let digits = phone_digits(trimmed);
    match digits.len() {
        0 => trimmed.to_string(),
        10 => format!("+1{digits}"),
        _ => format!("+{digits}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("(918) 555-0100"), "+19185550100");
        assert_eq!(normalize_phone("+1 918 555 0100"), "+19185550100");
        assert_eq!(normalize_phone("19185550100"), "+19185550100");
        assert_eq!(normalize_phone("test"), "test");
    }

    #[test]
    fn test_same_number_ignores_country_code() {
        assert!(same_number("19185550100", "9185550100"));
        assert!(!same_number("", ""));
    }
}
