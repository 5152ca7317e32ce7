//! Maps terminal (non-2xx) responses onto the error taxonomy.

use super::{ApiErrorDetail, ApiFailure, TargetProcessError};
use crate::types::Response;
use reqwest::StatusCode;
use serde::Deserialize;

const LOGIN_ATTEMPTS_MARKER: &str = "number of login attempts exceeded";

const DEFAULT_UNAUTHORIZED: &str = "Must authenticate to access this endpoint";
const DEFAULT_FORBIDDEN: &str = "Request Forbidden";
const DEFAULT_LOGIN_ATTEMPTS: &str = "Maximum number of login attempts exceeded";
const DEFAULT_RATE_LIMIT: &str = "API Rate Limit exceeded";
const DEFAULT_NOT_FOUND: &str = "Resource not found";
const DEFAULT_VALIDATION: &str = "Validation Failed";
const DEFAULT_API_ERROR: &str = "An error occurred with this API request";

/// Error payload returned by the API.
///
/// Accepts lowercase keys and the PascalCase keys TargetProcess uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    /// Error message.
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
    /// Status name, e.g. `NotFound`.
    #[serde(default, alias = "Status")]
    pub status: Option<String>,
    /// Field-level errors.
    #[serde(default, alias = "Errors")]
    pub errors: Option<Vec<ApiErrorDetail>>,
    /// Documentation link.
    #[serde(default, alias = "DocumentationUrl")]
    pub documentation_url: Option<String>,
}

impl ApiErrorBody {
    /// Parses an error body, returning `None` for anything that is not a JSON object.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Classifies a terminal response. Never fails: an unreadable body degrades
/// to the generic message for the status.
pub fn classify(response: Response) -> TargetProcessError {
    let status = response.status;
    let text = response.body_text().trim().to_string();
    let body = ApiErrorBody::parse(&text);

    let message = match &body {
        Some(parsed) => parsed
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from),
        None if !text.is_empty() => Some(text.clone()),
        None => None,
    };
    let (errors, documentation_url) = body
        .map(|b| (b.errors.unwrap_or_default(), b.documentation_url))
        .unwrap_or_default();

    let failure = |default: &str| ApiFailure {
        status: status.as_u16(),
        message: message.clone().unwrap_or_else(|| default.to_string()),
        errors: errors.clone(),
        documentation_url: documentation_url.clone(),
        response: Box::new(response.clone()),
    };

    match status {
        StatusCode::UNAUTHORIZED => TargetProcessError::Authorization(failure(DEFAULT_UNAUTHORIZED)),
        StatusCode::FORBIDDEN => {
            if let Some(rate_limit) = response
                .api_info
                .rate_limit
                .filter(|r| r.remaining == 0)
            {
                return TargetProcessError::RateLimitExceeded {
                    failure: failure(DEFAULT_RATE_LIMIT),
                    rate_limit,
                };
            }

            if text.to_ascii_lowercase().contains(LOGIN_ATTEMPTS_MARKER) {
                return TargetProcessError::LoginAttemptsExceeded(failure(DEFAULT_LOGIN_ATTEMPTS));
            }

            TargetProcessError::Forbidden(failure(DEFAULT_FORBIDDEN))
        }
        StatusCode::NOT_FOUND => TargetProcessError::NotFound(failure(DEFAULT_NOT_FOUND)),
        StatusCode::UNPROCESSABLE_ENTITY => {
            TargetProcessError::UnprocessableEntity(failure(DEFAULT_VALIDATION))
        }
        _ => TargetProcessError::Api(failure(DEFAULT_API_ERROR)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use reqwest::header::{HeaderMap, HeaderValue};
    use test_case::test_case;

    fn response(status: u16, body: &str, headers: &[(&'static str, &str)]) -> Response {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        Response::new(
            StatusCode::from_u16(status).unwrap(),
            map,
            Bytes::from(body.to_string()),
        )
    }

    fn variant(error: &TargetProcessError) -> &'static str {
        match error {
            TargetProcessError::Authorization(_) => "authorization",
            TargetProcessError::Forbidden(_) => "forbidden",
            TargetProcessError::LoginAttemptsExceeded(_) => "login_attempts",
            TargetProcessError::RateLimitExceeded { .. } => "rate_limit",
            TargetProcessError::NotFound(_) => "not_found",
            TargetProcessError::UnprocessableEntity(_) => "unprocessable",
            TargetProcessError::Api(_) => "api",
            _ => "other",
        }
    }

    #[test_case(401, r#"{"message":"Bad credentials"}"#, "authorization" ; "unauthorized")]
    #[test_case(403, r#"{"message":"Not allowed"}"#, "forbidden" ; "plain forbidden")]
    #[test_case(403, r#"{"message":"Maximum number of login attempts exceeded. Please try again later."}"#, "login_attempts" ; "login attempts")]
    #[test_case(404, r#"{"Status":"NotFound","Message":"Bug with id 7 not found"}"#, "not_found" ; "not found")]
    #[test_case(422, r#"{"message":"Validation Failed"}"#, "unprocessable" ; "validation")]
    #[test_case(409, r#"{"message":"Conflict"}"#, "api" ; "conflict")]
    #[test_case(500, "<html>oops</html>", "api" ; "server error with html body")]
    fn test_classify_by_status(status: u16, body: &str, expected: &str) {
        let error = classify(response(status, body, &[]));
        assert_eq!(variant(&error), expected);
        assert_eq!(error.status_code(), Some(status));
    }

    #[test]
    fn test_forbidden_with_exhausted_quota() {
        let error = classify(response(
            403,
            r#"{"message":"API rate limit exceeded for 10.0.0.1."}"#,
            &[
                ("x-ratelimit-limit", "60"),
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset", "1700000000"),
            ],
        ));

        match error {
            TargetProcessError::RateLimitExceeded { rate_limit, failure } => {
                assert_eq!(rate_limit.remaining, 0);
                assert_eq!(rate_limit.limit, 60);
                assert_eq!(rate_limit.reset.timestamp(), 1_700_000_000);
                assert_eq!(failure.message, "API rate limit exceeded for 10.0.0.1.");
            }
            other => panic!("expected rate limit error, got {:?}", other),
        }
    }

    #[test]
    fn test_forbidden_with_remaining_quota_is_plain_forbidden() {
        let error = classify(response(
            403,
            "",
            &[("x-ratelimit-limit", "60"), ("x-ratelimit-remaining", "12")],
        ));

        assert_eq!(variant(&error), "forbidden");
        assert_eq!(error.message(), DEFAULT_FORBIDDEN);
    }

    #[test]
    fn test_validation_errors_are_carried() {
        let error = classify(response(
            422,
            r#"{
                "message": "Validation Failed",
                "errors": [
                    {"resource": "UserStory", "field": "Name", "code": "missing_field"},
                    {"resource": "UserStory", "field": "Project", "code": "invalid"}
                ],
                "documentation_url": "https://dev.targetprocess.com/docs"
            }"#,
            &[],
        ));

        assert_eq!(variant(&error), "unprocessable");
        let fields: Vec<_> = error
            .field_errors()
            .iter()
            .filter_map(|e| e.field.as_deref())
            .collect();
        assert_eq!(fields, vec!["Name", "Project"]);
        assert_eq!(
            error.failure().unwrap().documentation_url.as_deref(),
            Some("https://dev.targetprocess.com/docs")
        );
    }

    #[test]
    fn test_default_messages_when_body_is_silent() {
        assert_eq!(classify(response(401, "", &[])).message(), DEFAULT_UNAUTHORIZED);
        assert_eq!(classify(response(404, "{}", &[])).message(), DEFAULT_NOT_FOUND);
        assert_eq!(classify(response(418, "   ", &[])).message(), DEFAULT_API_ERROR);
    }

    #[test]
    fn test_unparseable_body_falls_back_to_raw_text() {
        let error = classify(response(502, "upstream went away", &[]));

        assert_eq!(variant(&error), "api");
        assert_eq!(error.message(), "upstream went away");
        assert!(error.field_errors().is_empty());
    }

    #[test]
    fn test_raw_response_is_kept() {
        let error = classify(response(404, r#"{"message":"gone"}"#, &[("etag", "\"v1\"")]));

        let raw = error.response().unwrap();
        assert_eq!(raw.status, StatusCode::NOT_FOUND);
        assert_eq!(raw.api_info.etag.as_deref(), Some("\"v1\""));
    }
}
