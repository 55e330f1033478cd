use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{OriginalUri, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::errors::AppError;
use crate::models::IncomingSms;
use crate::state::AppState;

const STOP_KEYWORDS: &[&str] = &["STOP", "STOPALL", "UNSUBSCRIBE", "END", "QUIT"];
const START_KEYWORDS: &[&str] = &["START", "UNSTOP"];

const UNSUBSCRIBED: &str = "You are unsubscribed. Reply START to re-subscribe.";
const RESUBSCRIBED: &str = "You have been re-subscribed. Reply STOP to unsubscribe.";

/// Twilio signs the full webhook URL followed by every POST parameter,
/// sorted by name, as `key` + `value`.
pub fn validate_twilio_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &HashMap<String, String>,
) -> bool {
    let mut sorted: Vec<(&String, &String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut data = url.to_string();
    for (key, value) in sorted {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = match Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data.as_bytes());
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    expected == signature
}

fn webhook_url(headers: &HeaderMap, path: &str) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{proto}://{host}{path}")
}

fn required<'a>(form: &'a HashMap<String, String>, key: &str) -> Result<&'a str, AppError> {
    form.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("missing {key}")))
}

pub async fn sms_webhook(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, AppError> {
    if !state.config.twilio_auth_token.is_empty() {
        let signature = headers
            .get("x-twilio-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if signature.is_empty() {
            tracing::warn!("missing X-Twilio-Signature header");
            return Err(AppError::Forbidden("missing signature".to_string()));
        }

        let url = webhook_url(&headers, uri.path());
        if !validate_twilio_signature(&state.config.twilio_auth_token, signature, &url, &form) {
            tracing::warn!(url = %url, "invalid Twilio signature");
            return Err(AppError::Forbidden("invalid signature".to_string()));
        }
    }

    let from = required(&form, "From")?;
    let to = required(&form, "To")?;
    let body = required(&form, "Body")?;
    let message_sid = form.get("MessageSid").cloned().unwrap_or_default();

    tracing::info!(from = %from, to = %to, sid = %message_sid, "incoming SMS");

    let keyword = body.to_ascii_uppercase();
    if STOP_KEYWORDS.contains(&keyword.as_str()) {
        state.storage.set_sms_opt_out(from, true).await?;
        tracing::info!(from = %from, "sender opted out");
        return Ok(twiml(Some(UNSUBSCRIBED)));
    }
    if START_KEYWORDS.contains(&keyword.as_str()) {
        state.storage.set_sms_opt_out(from, false).await?;
        tracing::info!(from = %from, "sender opted back in");
        return Ok(twiml(Some(RESUBSCRIBED)));
    }

    match state.storage.is_sms_opted_out(from).await {
        Ok(true) => {
            tracing::info!(from = %from, "opted-out sender, ignoring");
            return Ok(twiml(None));
        }
        Ok(false) => {}
        Err(e) => tracing::error!(error = %e, "failed to check opt-out status"),
    }

    let sms = IncomingSms {
        from: from.to_string(),
        to: to.to_string(),
        body: body.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        message_id: message_sid,
    };
    let result = state.orchestrator.process_incoming_sms(&sms).await;
    if let Some(error) = &result.error {
        tracing::error!(from = %from, error = %error, "auto-respond failed");
    }

    Ok(twiml(None))
}

pub async fn webhook_ready() -> &'static str {
    "SMS webhook endpoint is ready"
}

fn twiml(message: Option<&str>) -> Response {
    let body = match message {
        Some(text) => format!("<Response><Message>{}</Message></Response>", xml_escape(text)),
        None => "<Response></Response>".to_string(),
    };
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(token: &str, url: &str, params: &HashMap<String, String>) -> String {
        let mut sorted: Vec<_> = params.iter().collect();
        sorted.sort();
        let mut data = url.to_string();
        for (k, v) in sorted {
            data.push_str(k);
            data.push_str(v);
        }
        let mut mac = Hmac::<Sha1>::new_from_slice(token.as_bytes()).unwrap();
        mac.update(data.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_signature_round_trip() {
        let params: HashMap<String, String> = [("From", "+15550001111"), ("Body", "hi")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let url = "https://example.com/webhook/sms";
        let signature = sign("secret", url, &params);

        assert!(validate_twilio_signature("secret", &signature, url, &params));
        assert!(!validate_twilio_signature("other", &signature, url, &params));
        assert!(!validate_twilio_signature("secret", &signature, "https://example.com/x", &params));
    }

    #[test]
    fn test_twiml_escapes_message() {
        assert_eq!(xml_escape("a < b & c"), "a &lt; b &amp; c");
    }
}
