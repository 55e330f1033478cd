use std::env;

/// Facts about the salon used in replies and prompts.
#[derive(Clone, Debug)]
pub struct BusinessProfile {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub hours_text: String,
}

impl Default for BusinessProfile {
    fn default() -> Self {
        Self {
            name: "Glo Head Spa".to_string(),
            phone: "918-932-5396".to_string(),
            address: String::new(),
            hours_text: "Wednesday-Saturday from 10 AM to 8 PM".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub business: BusinessProfile,
    /// Offer synthetic 9-to-5 slots when schedules produce none.
    pub fallback_slots: bool,
    /// Run the availability check ourselves when the model answers in text
    /// although every booking field is known.
    pub force_availability_check: bool,
    pub seed_demo_data: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "salonbook.db".to_string(),
            admin_token: "changeme".to_string(),
            llm_api_key: String::new(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_timeout_secs: 15,
            twilio_account_sid: String::new(),
            twilio_auth_token: String::new(),
            twilio_phone_number: String::new(),
            business: BusinessProfile::default(),
            fallback_slots: true,
            force_availability_check: true,
            seed_demo_data: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let business = BusinessProfile::default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or(defaults.admin_token),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            llm_base_url: env::var("LLM_BASE_URL").unwrap_or(defaults.llm_base_url),
            llm_model: env::var("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_timeout_secs: env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.llm_timeout_secs),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
            business: BusinessProfile {
                name: env::var("BUSINESS_NAME").unwrap_or(business.name),
                phone: env::var("BUSINESS_PHONE").unwrap_or(business.phone),
                address: env::var("BUSINESS_ADDRESS").unwrap_or(business.address),
                hours_text: env::var("BUSINESS_HOURS_TEXT").unwrap_or(business.hours_text),
            },
            fallback_slots: env_flag("FALLBACK_SLOTS", defaults.fallback_slots),
            force_availability_check: env_flag(
                "FORCE_AVAILABILITY_CHECK",
                defaults.force_availability_check,
            ),
            seed_demo_data: env_flag("SEED_DEMO_DATA", defaults.seed_demo_data),
        }
    }

    pub fn llm_enabled(&self) -> bool {
        !self.llm_api_key.is_empty()
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
