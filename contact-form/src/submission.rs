use serde::{Deserialize, Serialize};

/// Longest accepted message, in UTF-16 code units as a browser counts them.
pub const MAX_MESSAGE_LENGTH: usize = 5000;

/// Shown in the notification email in place of an empty optional field.
pub const PLACEHOLDER: &str = "-";

/// The fields a visitor fills in on the contact form.
///
/// Every field is optional on the wire; [`ContactFields::validate`] decides
/// which ones must be present.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ContactFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ContactFields {
    pub fn validate(&self) -> Result<ValidatedContact<'_>, ValidationError> {
        let contact = ValidatedContact {
            name: trimmed(&self.name),
            email: trimmed(&self.email),
            company: trimmed(&self.company),
            kind: trimmed(&self.kind),
            message: trimmed(&self.message),
        };
        if contact.name.is_empty() || contact.email.is_empty() || contact.message.is_empty() {
            return Err(ValidationError::MissingRequiredFields);
        }
        if contact.message.encode_utf16().count() > MAX_MESSAGE_LENGTH {
            return Err(ValidationError::MessageTooLong);
        }
        Ok(contact)
    }
}

fn trimmed(field: &Option<String>) -> &str {
    field.as_deref().map(str::trim).unwrap_or_default()
}

/// Trimmed view of [`ContactFields`] whose required fields are known to be
/// non-empty. `company` and `kind` may still be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedContact<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub company: &'a str,
    pub kind: &'a str,
    pub message: &'a str,
}

impl<'a> ValidatedContact<'a> {
    pub fn company_or_placeholder(&self) -> &'a str {
        or_placeholder(self.company)
    }

    pub fn kind_or_placeholder(&self) -> &'a str {
        or_placeholder(self.kind)
    }

    /// Owned copy of the trimmed fields, suitable for forwarding.
    pub fn to_fields(&self) -> ContactFields {
        ContactFields {
            name: Some(self.name.into()),
            email: Some(self.email.into()),
            company: Some(self.company.into()),
            kind: Some(self.kind.into()),
            message: Some(self.message.into()),
        }
    }
}

fn or_placeholder(value: &str) -> &str {
    if value.is_empty() {
        PLACEHOLDER
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required fields")]
    MissingRequiredFields,
    #[error("Message too long")]
    MessageTooLong,
}

/// Body posted by the browser to the edge gateway.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ContactFormSubmission {
    #[serde(flatten)]
    pub fields: ContactFields,
    #[serde(
        rename = "turnstileToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub turnstile_token: Option<String>,
    /// Older form builds send the token under this name.
    #[serde(
        rename = "captchaToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub captcha_token: Option<String>,
}

impl ContactFormSubmission {
    /// The trimmed captcha token. `turnstileToken` wins over `captchaToken`
    /// unless it is blank.
    pub fn turnstile_token(&self) -> &str {
        match trimmed(&self.turnstile_token) {
            "" => trimmed(&self.captcha_token),
            token => token,
        }
    }
}

/// Body posted by the edge gateway to the mail relay.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ForwardedSubmission {
    #[serde(flatten)]
    pub fields: ContactFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,
}
