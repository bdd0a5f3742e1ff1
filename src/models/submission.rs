use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Raw job-posting payload as received at the HTTP boundary.
///
/// Every field is optional here so that the validator can report missing values itself
/// instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    /// Job title.
    #[serde(default, alias = "Title")]
    pub title: Option<String>,
    /// Hiring company.
    #[serde(default, alias = "Company")]
    pub company: Option<String>,
    /// Full description text.
    #[serde(default, alias = "Description")]
    pub description: Option<String>,
    /// Optional location.
    #[serde(default, alias = "Location")]
    pub location: Option<String>,
    /// Optional original posting date.
    #[serde(default, alias = "PostingDate", with = "time::serde::rfc3339::option")]
    pub posting_date: Option<OffsetDateTime>,
    /// Optional identifier from the upstream HR system.
    #[serde(default, alias = "WorkdayId")]
    pub workday_id: Option<String>,
}

/// Validated job posting carried inside an [`crate::models::Envelope`].
///
/// Required text fields default to empty strings when absent on the wire; the ingestion worker
/// re-checks them rather than trusting the publisher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Job title.
    #[serde(default, alias = "Title")]
    pub title: String,
    /// Hiring company.
    #[serde(default, alias = "Company")]
    pub company: String,
    /// Full description text.
    #[serde(default, alias = "Description")]
    pub description: String,
    /// Optional location.
    #[serde(default, alias = "Location")]
    pub location: Option<String>,
    /// Optional original posting date.
    #[serde(default, alias = "PostingDate", with = "time::serde::rfc3339::option")]
    pub posting_date: Option<OffsetDateTime>,
    /// Optional identifier from the upstream HR system.
    #[serde(default, alias = "WorkdayId")]
    pub workday_id: Option<String>,
}

impl Submission {
    /// Names of required fields that are blank after trimming, in declaration order.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        [
            ("Title", &self.title),
            ("Company", &self.company),
            ("Description", &self.description),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_reported_in_order() {
        let submission = Submission {
            title: "  ".into(),
            company: "Contoso".into(),
            description: String::new(),
            ..Default::default()
        };
        assert_eq!(
            submission.missing_required_fields(),
            vec!["Title", "Description"]
        );
    }

    #[test]
    fn request_accepts_pascal_case_fields() {
        let request: SubmissionRequest = serde_json::from_str(
            r#"{"Title":"Engineer","company":"Contoso","WorkdayId":"WD-1","postingDate":"2024-03-01T00:00:00Z"}"#,
        )
        .expect("request");
        assert_eq!(request.title.as_deref(), Some("Engineer"));
        assert_eq!(request.company.as_deref(), Some("Contoso"));
        assert_eq!(request.workday_id.as_deref(), Some("WD-1"));
        assert!(request.posting_date.is_some());
        assert!(request.description.is_none());
    }
}
