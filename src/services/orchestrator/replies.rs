//! Fixed SMS texts for the deterministic paths.

use crate::config::BusinessProfile;
use crate::models::Service;

const CONFUSION: &[&str] = &["what", "huh", "confused", "don't understand", "?"];
const THANKS: &[&str] = &["thank", "thanks", "thx", "appreciate"];
const HELP: &[&str] = &["help", "menu", "options"];
const WH_WORDS: &[&str] = &["what", "when", "where", "who", "why", "how"];
const GREETINGS: &[&str] = &["hi", "hello", "hey", "good morning", "good afternoon", "good evening"];

pub fn service_bullets(services: &[Service]) -> String {
    services
        .iter()
        .map(|s| format!("• {} - ${:.0} ({} minutes)", s.name, s.price, s.duration))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn ask_for_service(services: &[Service]) -> String {
    if services.is_empty() {
        return "Great! I'd be happy to help you book an appointment. What type of service would you like? 💆‍♀️✨".to_string();
    }
    format!(
        "Great! I'd be happy to help you book an appointment. What type of service would you like?\n\nOur services include:\n{}\n\nJust let me know which service you'd like to book! 💆‍♀️✨",
        service_bullets(services)
    )
}

pub fn ask_for_date() -> String {
    "Perfect! What day would you like to come in? You can say \"tomorrow\", \"Friday\", or any day that works for you. 📅".to_string()
}

pub fn unreadable_date(service: &str) -> String {
    format!(
        "I'd love to get your {service} booked! I didn't quite catch the day though. You can say \"tomorrow\", \"Friday\", or a date like \"June 20\". 📅"
    )
}

pub fn available_times(service: &str, day: &str, times: &[String]) -> String {
    format!(
        "Perfect! I found available times for {service} on {day}: {}. Which time works best for you? ⏰",
        times.join(", ")
    )
}

pub fn time_unavailable(time: &str, service: &str, times: &[String]) -> String {
    format!(
        "I'm sorry, but {time} is not available for {service}. Here are some available times: {}. Which time works best for you? ⏰",
        times.join(", ")
    )
}

pub fn other_times(service: &str, times: &[String]) -> String {
    format!(
        "No problem! Here are some other available times for {service}:\n{}\n\nWhich works best for you? ⏰",
        times
            .iter()
            .map(|t| format!("• {t}"))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

pub fn no_slots(service: &str, day: &str) -> String {
    format!(
        "I'm sorry, but I couldn't find any available slots for {service} on {day}. Would you like to try a different date? 📅"
    )
}

pub fn no_openings(service: &str, business: &BusinessProfile) -> String {
    format!(
        "I'm sorry, I couldn't find any other openings for {service} this week. Please call us at {} and we'll find a time for you! 📞",
        business.phone
    )
}

pub fn llm_unavailable(business: &BusinessProfile) -> String {
    format!(
        "I'm sorry, I'm having trouble processing your request right now. Please call us at {} and we'll be happy to help! 📞",
        business.phone
    )
}

pub fn reschedule_call_us(business: &BusinessProfile) -> String {
    format!(
        "I'd be happy to help you reschedule your appointment. Please call us at {} and we'll get that sorted out for you right away! 📞",
        business.phone
    )
}

pub fn cancel_call_us(business: &BusinessProfile) -> String {
    format!(
        "I understand you'd like to cancel your appointment. Please call us at {} and we'll help you with that. We'd hate to see you go! 📞",
        business.phone
    )
}

pub fn cancelled() -> String {
    "Your appointment has been cancelled successfully. We hope to see you again soon! 💆‍♀️".to_string()
}

pub fn rescheduled(when: &str) -> String {
    format!("Your appointment has been rescheduled to {when}. See you then! ✨")
}

/// Keyword answers used when the model cannot answer a business question.
pub fn business_fallback(text: &str, services: &[Service], business: &BusinessProfile) -> String {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has(&["haircut", "hair cut"]) {
        return if services.iter().any(|s| s.name.to_lowercase().contains("haircut")) {
            format!("Yes, we offer haircuts! Here's our menu:\n{}", service_bullets(services))
        } else {
            format!(
                "We specialize in head spa treatments rather than haircuts. Here's what we offer:\n{}",
                service_bullets(services)
            )
        };
    }
    if has(&["service", "offer", "price", "cost", "how much", "pricing"]) && !services.is_empty() {
        return format!(
            "Here are our services:\n{}\n\nWould you like to book one? 💆‍♀️",
            service_bullets(services)
        );
    }
    if has(&["hour", "open", "close", "when"]) {
        return format!("We're open {}. Would you like to book an appointment? 📅", business.hours_text);
    }
    if has(&["where", "address", "location", "directions"]) {
        return if business.address.is_empty() {
            format!("Please call us at {} for directions to {}! 📍", business.phone, business.name)
        } else {
            format!("We're located at {}. See you soon! 📍", business.address)
        };
    }
    format!(
        "Thanks for your question! For details, please call us at {} or ask me to book an appointment. 😊",
        business.phone
    )
}

pub fn general(text: &str, name: &str, services: &[Service], business: &BusinessProfile) -> String {
    let lower = text.trim().to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if GREETINGS.contains(&lower.trim_end_matches(['!', '.']).trim()) {
        return format!("Hi {name}! 👋 How can I help you today?");
    }
    if has(THANKS) {
        return format!("You're very welcome, {name}! Let us know if there's anything else we can do for you. 😊");
    }
    if has(HELP) {
        return format!(
            "Hi {name}! Here's what I can help with:\n• Book an appointment\n• Our services and prices\n• Our hours ({})\n\nJust text me what you need!",
            business.hours_text
        );
    }
    if has(CONFUSION) && !services.is_empty() && lower.len() < 20 {
        return format!(
            "Sorry for the confusion! Here's what we offer:\n{}\n\nJust tell me which one you'd like to book. 💆‍♀️",
            service_bullets(services)
        );
    }
    if WH_WORDS.iter().any(|w| lower.starts_with(w)) {
        return format!(
            "Great question, {name}! For anything I can't answer here, call us at {}. I can also book an appointment for you. 😊",
            business.phone
        );
    }
    format!(
        "Hi {name}! 👋 Thanks for reaching out to {}. Would you like to book an appointment? 💆‍♀️",
        business.name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services() -> Vec<Service> {
        vec![Service {
            id: 1,
            name: "Signature Head Spa".to_string(),
            description: None,
            duration: 60,
            price: 99.0,
            is_active: true,
        }]
    }

    #[test]
    fn test_service_list_format() {
        assert_eq!(service_bullets(&services()), "• Signature Head Spa - $99 (60 minutes)");
        assert!(ask_for_service(&services()).contains("Our services include:\n• Signature Head Spa"));
    }

    #[test]
    fn test_business_fallbacks() {
        let business = BusinessProfile::default();
        assert!(business_fallback("how much is it?", &services(), &business).contains("$99"));
        assert!(business_fallback("when are you open", &services(), &business)
            .starts_with("We're open Wednesday-Saturday"));
        assert!(business_fallback("do you do a haircut", &services(), &business)
            .contains("rather than haircuts"));
    }

    #[test]
    fn test_general_replies() {
        let business = BusinessProfile::default();
        assert_eq!(
            general("Hello!", "Ana", &services(), &business),
            "Hi Ana! 👋 How can I help you today?"
        );
        assert!(general("thanks so much", "there", &services(), &business).starts_with("You're very welcome, there!"));
        assert!(general("huh?", "there", &services(), &business).contains("Signature Head Spa"));
    }
}
