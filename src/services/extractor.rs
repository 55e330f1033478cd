use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::BookingRequest;

const MONTHS: &str =
    "january|february|march|april|may|june|july|august|september|october|november|december";
const WEEKDAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";

/// Known services, most specific first. Matched against lowercased text.
static SERVICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(signature head spa)",
        r"(deluxe head spa)",
        r"(platinum head spa)",
        r"(head spa)",
        r"(massage)",
        r"(facial)",
        r"(haircut)",
        r"(styling)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid service pattern"))
    .collect()
});

/// Partial mentions checked when no full service name matched.
const SERVICE_HINTS: &[(&[&str], &str)] = &[
    (&["head spa", "headspa"], "head spa"),
    (&["signature"], "signature head spa"),
    (&["deluxe"], "deluxe head spa"),
    (&["platinum"], "platinum head spa"),
    (&["haircut", "hair cut"], "haircut"),
];

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(today|tomorrow|next week)".to_string(),
        format!(r"\b({WEEKDAYS})\b"),
        r"(\d{1,2}/\d{1,2}|\d{1,2}-\d{1,2})".to_string(),
        format!(r"(({WEEKDAYS})\s+({MONTHS})\s+\d{{1,2}}(st|nd|rd|th)?)"),
        format!(r"(({MONTHS})\s+\d{{1,2}}(st|nd|rd|th)?)"),
        format!(r"(\d{{1,2}}(st|nd|rd|th)?\s+({MONTHS}))"),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid date pattern"))
    .collect()
});

/// Strict clock-time shapes: `10:00 AM`, `10:00am`, `2pm`, `2 pm`.
static TIME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?P<h>\d{1,2}):(?P<m>\d{2})\s+(?P<p>am|pm)\b",
        r"(?i)\b(?P<h>\d{1,2}):(?P<m>\d{2})(?P<p>am|pm)\b",
        r"(?i)\b(?P<h>\d{1,2})(?P<p>am|pm)\b",
        r"(?i)\b(?P<h>\d{1,2})\s+(?P<p>am|pm)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid time pattern"))
    .collect()
});

pub const DAY_PARTS: &[&str] = &["morning", "afternoon", "evening", "night"];

static TIME_FALLBACK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)for\s*(\d{1,2}:\d{2}\s*(?:am|pm))",
        r"(?i)at\s*(\d{1,2}:\d{2}\s*(?:am|pm))",
        r"(?i)for\s*(\d{1,2}\s*(?:am|pm))",
        r"(?i)at\s*(\d{1,2}\s*(?:am|pm))",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid fallback time pattern"))
    .collect()
});

static TIME_NORMALIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{1,2}):?(\d{2})?\s*(am|pm)").expect("valid normalize pattern")
});

/// Loose clock-time detector used to decide whether a message is answering a
/// time question.
pub static TIME_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d{1,2}(:\d{2})?\s*(am|pm)").expect("valid time mention"));

const TIME_REJECTIONS: &[&str] = &[
    "none of those",
    "none of them",
    "doesn't work",
    "does not work",
    "don't work",
    "won't work",
    "can't make",
    "different time",
    "another time",
    "other time",
    "other times",
    "something else",
];

pub fn parse(text: &str, client_phone: &str) -> BookingRequest {
    BookingRequest {
        service_name: extract_service(text),
        date: extract_date(text),
        time: extract_time(text),
        client_phone: client_phone.to_string(),
        client_name: None,
        is_time_rejection: is_time_rejection(text),
    }
}

pub fn extract_service(text: &str) -> Option<String> {
    let lower = text.to_lowercase();

    for pattern in SERVICE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&lower) {
            return Some(caps[1].to_string());
        }
    }

    SERVICE_HINTS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, service)| service.to_string())
}

pub fn extract_date(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    DATE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(&lower).map(|caps| caps[1].to_string()))
}

/// Returns a canonical `H:MM am|pm`, a day-part word, or `None`. Values that
/// look like times but are out of range are dropped rather than stored.
pub fn extract_time(text: &str) -> Option<String> {
    let candidate = strict_time(text)
        .or_else(|| day_part(text))
        .or_else(|| fallback_time(text))?;

    let candidate = candidate.trim();
    if DAY_PARTS.contains(&candidate.to_lowercase().as_str()) {
        return Some(candidate.to_lowercase());
    }
    normalize_time(candidate)
}

fn strict_time(text: &str) -> Option<String> {
    TIME_PATTERNS.iter().find_map(|pattern| {
        pattern.captures(text).map(|caps| {
            let hour = &caps["h"];
            let minute = caps.name("m").map(|m| m.as_str()).unwrap_or("00");
            let period = caps["p"].to_lowercase();
            format!("{hour}:{minute} {period}")
        })
    })
}

fn day_part(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    DAY_PARTS
        .iter()
        .find(|part| lower.contains(*part))
        .map(|part| part.to_string())
}

fn fallback_time(text: &str) -> Option<String> {
    TIME_FALLBACK_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(text).map(|caps| caps[1].to_string()))
}

/// `"02:05PM"` → `"2:05 pm"`; `None` when hour is outside 1–12 or minute
/// outside 0–59.
pub fn normalize_time(raw: &str) -> Option<String> {
    let caps = TIME_NORMALIZE.captures(raw)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let period = caps[3].to_lowercase();

    if !(1..=12).contains(&hour) || minute > 59 {
        tracing::debug!(raw, "discarding out-of-range time");
        return None;
    }
    Some(format!("{hour}:{minute:02} {period}"))
}

pub fn is_time_rejection(text: &str) -> bool {
    let lower = text.to_lowercase();
    TIME_REJECTIONS.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_normalization() {
        assert_eq!(extract_time("10:00 AM").as_deref(), Some("10:00 am"));
        assert_eq!(extract_time("10:00am").as_deref(), Some("10:00 am"));
        assert_eq!(extract_time("2pm").as_deref(), Some("2:00 pm"));
        assert_eq!(extract_time("2 pm").as_deref(), Some("2:00 pm"));
        assert_eq!(extract_time("for 2:00 pm").as_deref(), Some("2:00 pm"));
        assert_eq!(extract_time("can I come at 02:30PM?").as_deref(), Some("2:30 pm"));
    }

    #[test]
    fn test_out_of_range_times_discarded() {
        assert_eq!(extract_time("13:00 pm"), None);
        assert_eq!(extract_time("10:75 am"), None);
        assert_eq!(extract_time("0am"), None);
    }

    #[test]
    fn test_day_part_words() {
        assert_eq!(extract_time("tomorrow morning please").as_deref(), Some("morning"));
        assert_eq!(extract_time("friday evening").as_deref(), Some("evening"));
        assert_eq!(extract_time("friday"), None);
    }

    #[test]
    fn test_strict_pattern_wins_over_day_part() {
        assert_eq!(extract_time("3pm in the afternoon").as_deref(), Some("3:00 pm"));
    }

    #[test]
    fn test_service_extraction_order() {
        assert_eq!(
            extract_service("I'd like the Deluxe Head Spa").as_deref(),
            Some("deluxe head spa")
        );
        assert_eq!(extract_service("a head spa please").as_deref(), Some("head spa"));
        assert_eq!(extract_service("platinum one").as_deref(), Some("platinum head spa"));
        assert_eq!(extract_service("need a hair cut").as_deref(), Some("haircut"));
        assert_eq!(extract_service("hello"), None);
    }

    #[test]
    fn test_date_extraction() {
        assert_eq!(extract_date("Tomorrow works").as_deref(), Some("tomorrow"));
        assert_eq!(extract_date("how about Friday?").as_deref(), Some("friday"));
        assert_eq!(extract_date("on 6/14").as_deref(), Some("6/14"));
        assert_eq!(extract_date("June 20th").as_deref(), Some("june 20th"));
        assert_eq!(extract_date("the 20th of nothing"), None);
        assert_eq!(extract_date("20 june").as_deref(), Some("20 june"));
    }

    #[test]
    fn test_weekday_wins_over_full_date() {
        // first match wins, no cross-validation
        assert_eq!(extract_date("friday june 20").as_deref(), Some("friday"));
    }

    #[test]
    fn test_parse_combines_fields() {
        let req = parse("Book a signature head spa tomorrow at 2pm", "+15550001111");
        assert_eq!(req.service_name.as_deref(), Some("signature head spa"));
        assert_eq!(req.date.as_deref(), Some("tomorrow"));
        assert_eq!(req.time.as_deref(), Some("2:00 pm"));
        assert_eq!(req.client_phone, "+15550001111");
        assert!(!req.is_time_rejection);
    }

    #[test]
    fn test_time_rejection() {
        assert!(is_time_rejection("None of those work for me"));
        assert!(is_time_rejection("can we do a different time"));
        assert!(!is_time_rejection("2pm works"));
    }
}
