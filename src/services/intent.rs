use crate::models::{ConversationState, ConversationStep, MessageIntent};

const RESCHEDULE_KEYWORDS: &[&str] = &[
    "reschedule",
    "change appointment",
    "move appointment",
    "change time",
    "move time",
    "change date",
    "move date",
    "reschedule appointment",
];

const CANCEL_KEYWORDS: &[&str] = &[
    "cancel",
    "cancellation",
    "cancel appointment",
    "cancel booking",
    "cancel my appointment",
    "cancel my booking",
];

const BUSINESS_KEYWORDS: &[&str] = &[
    "what services",
    "services do you offer",
    "what do you offer",
    "when are you open",
    "what are your hours",
    "hours of operation",
    "where are you",
    "what's your address",
    "location",
    "directions",
    "how much",
    "cost",
    "price",
    "pricing",
    "what does it cost",
    "do you have",
    "do you offer",
    "can you tell me",
    "what time",
    "what days",
    "are you open",
    "when do you",
    "where do you",
    "head spa cost",
    "how much is",
    "what's the price",
    "what's the cost",
    "tell me about",
    "information about",
    "details about",
    "what about",
    "do you do",
    "can you do",
    "offer any",
    "have any",
    "provide any",
];

const PRICING_KEYWORDS: &[&str] = &["how much", "cost", "price", "pricing"];

const BUSINESS_INFO_KEYWORDS: &[&str] = &[
    "what services",
    "services do you offer",
    "when are you open",
    "what are your hours",
    "where are you",
    "what's your address",
];

const BOOKING_KEYWORDS: &[&str] = &[
    "book",
    "booking",
    "appointment",
    "schedule",
    "reserve",
    "make an appointment",
    "want to book",
    "need an appointment",
    "looking to book",
    "can i book",
    "i want to book",
    "i need to book",
    "book me",
    "book a",
    "book the",
];

const AVAILABILITY_KEYWORDS: &[&str] = &[
    "available",
    "availability",
    "when can i",
    "what times",
    "open slots",
    "do you have",
    "can i get",
    "is there",
    "any openings",
    "any slots",
];

const SERVICE_KEYWORDS: &[&str] = &[
    "signature head spa",
    "deluxe head spa",
    "platinum head spa",
    "head spa",
    "massage",
    "facial",
    "haircut",
    "styling",
    "treatment",
];

/// Matched as whole words.
const TIME_KEYWORDS: &[&str] = &[
    "today",
    "tomorrow",
    "next week",
    "this week",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
    "morning",
    "afternoon",
    "evening",
    "am",
    "pm",
    "o'clock",
];

/// Only meaningful next to a service name.
const TIME_CONNECTORS: &[&str] = &["at", "for"];

const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
];

/// What the classifier knows about one message.
pub struct Signals {
    text: String,
    in_booking_flow: bool,
}

impl Signals {
    pub fn new(text: &str, state: Option<&ConversationState>) -> Self {
        Self {
            text: text.trim().to_lowercase(),
            in_booking_flow: state
                .map(|s| s.conversation_step != ConversationStep::Initial)
                .unwrap_or(false),
        }
    }

    fn contains_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.text.contains(p))
    }

    fn contains_any_word(&self, words: &[&str]) -> bool {
        words.iter().any(|w| contains_word(&self.text, w))
    }
}

type Check = fn(&Signals) -> bool;

struct IntentRule {
    intent: MessageIntent,
    matches: Check,
}

/// Evaluated top to bottom; the first match decides.
const INTENT_RULES: &[IntentRule] = &[
    IntentRule {
        intent: MessageIntent::Reschedule,
        matches: is_reschedule_request,
    },
    IntentRule {
        intent: MessageIntent::Cancel,
        matches: is_cancel_request,
    },
    IntentRule {
        intent: MessageIntent::BusinessQuestion,
        matches: is_business_question,
    },
    IntentRule {
        intent: MessageIntent::Booking,
        matches: is_booking_request,
    },
    IntentRule {
        intent: MessageIntent::General,
        matches: is_simple_greeting,
    },
];

/// Booking heuristic: each check that fires returns its verdict.
const BOOKING_RULES: &[(Check, bool)] = &[
    (mentions_pricing, false),
    (mentions_business_info, false),
    (has_booking_keyword, true),
    (asks_availability, true),
    (service_with_time, true),
    (in_booking_flow, true),
    (has_time_keyword, true),
    (is_simple_greeting, false),
];

pub fn classify(text: &str, state: Option<&ConversationState>) -> MessageIntent {
    let signals = Signals::new(text, state);
    INTENT_RULES
        .iter()
        .find(|rule| (rule.matches)(&signals))
        .map(|rule| rule.intent)
        .unwrap_or(MessageIntent::General)
}

pub fn is_booking_request(signals: &Signals) -> bool {
    BOOKING_RULES
        .iter()
        .find(|(check, _)| check(signals))
        .map(|(_, verdict)| *verdict)
        .unwrap_or(false)
}

pub fn is_reschedule_request(signals: &Signals) -> bool {
    signals.contains_any(RESCHEDULE_KEYWORDS)
}

pub fn is_cancel_request(signals: &Signals) -> bool {
    signals.contains_any(CANCEL_KEYWORDS)
}

pub fn is_business_question(signals: &Signals) -> bool {
    signals.contains_any(BUSINESS_KEYWORDS)
}

pub fn is_simple_greeting(signals: &Signals) -> bool {
    GREETINGS.contains(&signals.text.as_str())
}

fn mentions_pricing(signals: &Signals) -> bool {
    signals.contains_any(PRICING_KEYWORDS)
}

fn mentions_business_info(signals: &Signals) -> bool {
    signals.contains_any(BUSINESS_INFO_KEYWORDS)
}

fn has_booking_keyword(signals: &Signals) -> bool {
    signals.contains_any(BOOKING_KEYWORDS)
}

fn asks_availability(signals: &Signals) -> bool {
    signals.contains_any(AVAILABILITY_KEYWORDS)
}

fn service_with_time(signals: &Signals) -> bool {
    signals.contains_any(SERVICE_KEYWORDS)
        && (signals.contains_any_word(TIME_KEYWORDS) || signals.contains_any_word(TIME_CONNECTORS))
}

fn in_booking_flow(signals: &Signals) -> bool {
    signals.in_booking_flow
}

fn has_time_keyword(signals: &Signals) -> bool {
    signals.contains_any_word(TIME_KEYWORDS)
}

/// Whole-word match; digits may touch the word so `2pm` contains `pm`.
fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(idx, _)| {
        let before = text[..idx].chars().next_back();
        let after = text[idx + word.len()..].chars().next();
        !before.map(char::is_alphabetic).unwrap_or(false)
            && !after.map(char::is_alphabetic).unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn active_state() -> ConversationState {
        let now = NaiveDateTime::parse_from_str("2025-06-16 10:00", "%Y-%m-%d %H:%M").unwrap();
        let mut state = ConversationState::new("+15550001111", now);
        state.conversation_step = ConversationStep::DateRequested;
        state.selected_service = Some("signature head spa".to_string());
        state
    }

    #[test]
    fn test_cancel_beats_booking() {
        assert_eq!(
            classify("cancel my appointment and book a new one", None),
            MessageIntent::Cancel
        );
    }

    #[test]
    fn test_reschedule_beats_cancel() {
        assert_eq!(
            classify("I need to reschedule, not cancel", None),
            MessageIntent::Reschedule
        );
    }

    #[test]
    fn test_pricing_is_business_question() {
        assert_eq!(
            classify("how much is a haircut?", None),
            MessageIntent::BusinessQuestion
        );
        assert_eq!(
            classify("What are your hours?", None),
            MessageIntent::BusinessQuestion
        );
    }

    #[test]
    fn test_explicit_booking() {
        assert_eq!(
            classify("I want to book a head spa", None),
            MessageIntent::Booking
        );
        assert_eq!(classify("any openings this week?", None), MessageIntent::Booking);
    }

    #[test]
    fn test_service_with_time_is_booking() {
        assert_eq!(classify("deluxe head spa at 3pm", None), MessageIntent::Booking);
    }

    #[test]
    fn test_continuation_bias() {
        let state = active_state();
        assert_eq!(classify("the first one", Some(&state)), MessageIntent::Booking);
        assert_eq!(classify("the first one", None), MessageIntent::General);
    }

    #[test]
    fn test_greetings_are_general() {
        assert_eq!(classify("  Hello ", None), MessageIntent::General);
        assert_eq!(classify("hey", None), MessageIntent::General);
    }

    #[test]
    fn test_time_word_beats_greeting() {
        // "morning" is a time keyword, checked before the greeting list
        assert_eq!(classify("good morning", None), MessageIntent::Booking);
        assert_eq!(classify("Good Evening", None), MessageIntent::Booking);
    }

    #[test]
    fn test_bare_time_keyword_is_booking() {
        assert_eq!(classify("tomorrow?", None), MessageIntent::Booking);
        assert_eq!(classify("2pm", None), MessageIntent::Booking);
    }

    #[test]
    fn test_word_boundaries() {
        // "what" must not count as "at", "thanks for" is not a time
        assert_eq!(classify("thanks for your help", None), MessageIntent::General);
        assert!(contains_word("see you at 5", "at"));
        assert!(!contains_word("whatever", "at"));
        assert!(contains_word("2pm", "pm"));
    }
}
