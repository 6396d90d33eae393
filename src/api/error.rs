use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Failure of a call against the outreach API, normalized from the
/// transport error or the response body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid request: {0}")]
    Request(String),
    #[error("{}", http_display(*status, message.as_deref()))]
    Http {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },
    #[error("invalid response body: {0}")]
    Decode(String),
}

fn http_display(status: u16, message: Option<&str>) -> String {
    match message {
        Some(m) => m.to_string(),
        None => format!("request failed with status {}", status),
    }
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Http { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED.as_u16())
    }

    /// Daily send limit or cost ceiling reached on the server.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS.as_u16())
    }

    /// Text shown to the user: the server's own message when it sent one,
    /// otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Http {
                message: Some(m), ..
            } => m.clone(),
            ApiError::Timeout => format!("{fallback}: request timed out"),
            _ => fallback.to_string(),
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_builder() {
            ApiError::Request(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }

    /// Build an error from a non-success status and its raw body.
    ///
    /// Understands `{detail: string}`, `{detail: {code?, message}}`,
    /// `{detail: [{msg}]}` and `{message: string}`. Any other non-empty body
    /// is kept as opaque text.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let (code, message) = parse_error_body(body);
        ApiError::Http {
            status: status.as_u16(),
            code,
            message,
        }
    }
}

fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, None);
    }
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => return (None, Some(trimmed.to_string())),
    };

    match value.get("detail") {
        Some(Value::String(s)) => return (None, non_empty(s)),
        Some(Value::Object(obj)) => {
            let code = obj.get("code").and_then(scalar_string);
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .and_then(non_empty);
            return (code, message);
        }
        Some(Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|i| i.get("msg").and_then(Value::as_str))
                .collect();
            if !msgs.is_empty() {
                return (None, Some(msgs.join("; ")));
            }
        }
        _ => {}
    }
    if let Some(m) = value.get("message").and_then(Value::as_str) {
        return (None, non_empty(m));
    }
    (None, Some(trimmed.to_string()))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_string() {
        let err = ApiError::from_response(StatusCode::FORBIDDEN, r#"{"detail":"Reviewer role required"}"#);
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.to_string(), "Reviewer role required");
        assert_eq!(err.user_message("Failed to approve outreach"), "Reviewer role required");
    }

    #[test]
    fn detail_object_with_code() {
        let err = ApiError::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"detail":{"code":"DAILY_LIMIT","message":"Daily send limit reached (50/50)"}}"#,
        );
        assert!(err.is_rate_limited());
        assert_eq!(err.code(), Some("DAILY_LIMIT"));
        assert_eq!(err.to_string(), "Daily send limit reached (50/50)");
    }

    #[test]
    fn message_field() {
        let err = ApiError::from_response(StatusCode::BAD_REQUEST, r#"{"message":"bad input"}"#);
        assert_eq!(err.to_string(), "bad input");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn validation_list() {
        let err = ApiError::from_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"detail":[{"msg":"field required"},{"msg":"too long"}]}"#,
        );
        assert_eq!(err.to_string(), "field required; too long");
    }

    #[test]
    fn opaque_and_empty_bodies() {
        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, "<html>upstream down</html>");
        assert_eq!(err.to_string(), "<html>upstream down</html>");

        let err = ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, "  ");
        assert_eq!(err.to_string(), "request failed with status 500");
        assert_eq!(err.user_message("Failed to send outreach"), "Failed to send outreach");

        let err = ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"x"}"#);
        assert_eq!(err.to_string(), r#"{"error":"x"}"#);
    }

    #[test]
    fn unauthorized_flag() {
        let err = ApiError::from_response(StatusCode::UNAUTHORIZED, "");
        assert!(err.is_unauthorized());
        assert!(!ApiError::Timeout.is_unauthorized());
        assert_eq!(
            ApiError::Timeout.user_message("Failed to edit outreach"),
            "Failed to edit outreach: request timed out"
        );
    }
}
