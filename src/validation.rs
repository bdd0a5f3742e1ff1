//! Field-level validation for submissions and chat requests.
//!
//! Validation never corrects input: every violated constraint is reported, in field order,
//! with a message the HTTP layer returns verbatim.

use std::fmt;

use crate::models::{ChatRequest, Submission, SubmissionRequest};

/// Maximum title length in characters.
pub const TITLE_MAX_CHARS: usize = 200;
/// Maximum company length in characters.
pub const COMPANY_MAX_CHARS: usize = 100;
/// Maximum description length in characters.
pub const DESCRIPTION_MAX_CHARS: usize = 10_000;
/// Maximum location length in characters.
pub const LOCATION_MAX_CHARS: usize = 100;
/// Maximum external id length in characters.
pub const WORKDAY_ID_MAX_CHARS: usize = 50;
/// Maximum chat question length in characters.
pub const CHAT_MESSAGE_MAX_CHARS: usize = 1000;

/// Non-empty, ordered list of violated constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    /// Messages in the order the fields were checked.
    pub fn messages(&self) -> &[String] {
        &self.0
    }

    /// Consume into the underlying messages.
    pub fn into_messages(self) -> Vec<String> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Default)]
struct Collector(Vec<String>);

impl Collector {
    /// Length limits apply to the value as submitted, surrounding whitespace included.
    fn required(&mut self, value: Option<String>, max: usize, missing: &str, too_long: &str) -> String {
        match value {
            Some(raw) if !raw.trim().is_empty() => {
                self.max_len(&raw, max, too_long);
                raw.trim().to_string()
            }
            _ => {
                self.0.push(missing.to_string());
                String::new()
            }
        }
    }

    fn optional(&mut self, value: Option<String>, max: usize, too_long: &str) -> Option<String> {
        let raw = value?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.max_len(&raw, max, too_long);
        Some(trimmed.to_string())
    }

    fn max_len(&mut self, value: &str, max: usize, message: &str) {
        if value.chars().count() > max {
            self.0.push(message.to_string());
        }
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(ValidationErrors(self.0))
        }
    }
}

/// Validate a raw submission, returning the trimmed fields on success.
///
/// Blank optional fields are normalized to `None`.
pub fn validate_submission(request: SubmissionRequest) -> Result<Submission, ValidationErrors> {
    let SubmissionRequest {
        title,
        company,
        description,
        location,
        posting_date,
        workday_id,
    } = request;

    let mut errors = Collector::default();
    let title = errors.required(
        title,
        TITLE_MAX_CHARS,
        "Title is required",
        "Title cannot exceed 200 characters",
    );
    let company = errors.required(
        company,
        COMPANY_MAX_CHARS,
        "Company is required",
        "Company name cannot exceed 100 characters",
    );
    let description = errors.required(
        description,
        DESCRIPTION_MAX_CHARS,
        "Description is required",
        "Description cannot exceed 10,000 characters",
    );
    let location = errors.optional(
        location,
        LOCATION_MAX_CHARS,
        "Location cannot exceed 100 characters",
    );
    let workday_id = errors.optional(
        workday_id,
        WORKDAY_ID_MAX_CHARS,
        "WorkdayId cannot exceed 50 characters",
    );

    errors.finish(Submission {
        title,
        company,
        description,
        location,
        posting_date,
        workday_id,
    })
}

/// Validate a chat request. History is passed through untouched.
pub fn validate_chat_request(request: ChatRequest) -> Result<ChatRequest, ValidationErrors> {
    let mut errors = Collector::default();
    let message = errors.required(
        Some(request.message),
        CHAT_MESSAGE_MAX_CHARS,
        "Message is required",
        "Message cannot exceed 1000 characters",
    );
    errors.finish(ChatRequest {
        message,
        history: request.history,
    })
}
