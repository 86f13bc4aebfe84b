use chrono::{DateTime, SecondsFormat, Utc};
use contact_form::ValidatedContact;
use serde::Serialize;
use tinytemplate::{error::Error, format_unescaped, TinyTemplate};

pub const SUBJECT_PREFIX: &str = "[Website Form]";

const NOTIFICATION_TEMPLATE_NAME: &str = "notification";
const NOTIFICATION_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/notification.txt"
));
const UNKNOWN: &str = "unknown";

#[derive(Serialize)]
struct Context<'a> {
    name: &'a str,
    email: &'a str,
    company: &'a str,
    kind: &'a str,
    message: &'a str,
    ip: &'a str,
    user_agent: &'a str,
    timestamp: String,
}

/// Where a submission came from, as reported by the edge gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct Origin<'a> {
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

pub fn render_subject(contact: &ValidatedContact) -> String {
    format!("{SUBJECT_PREFIX} {}", contact.name)
}

/// Renders the plaintext notification body. The mail is plaintext, so user
/// input is inserted without HTML escaping.
pub fn render_body(
    contact: &ValidatedContact,
    origin: Origin,
    sent_at: DateTime<Utc>,
) -> Result<String, Error> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&format_unescaped);
    tt.add_template(NOTIFICATION_TEMPLATE_NAME, NOTIFICATION_TEMPLATE)?;
    let context = Context {
        name: contact.name,
        email: contact.email,
        company: contact.company_or_placeholder(),
        kind: contact.kind_or_placeholder(),
        message: contact.message,
        ip: or_unknown(origin.ip),
        user_agent: or_unknown(origin.user_agent),
        timestamp: sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    tt.render(NOTIFICATION_TEMPLATE_NAME, &context)
}

fn or_unknown(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or(UNKNOWN)
}
