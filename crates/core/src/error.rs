//! Canonical error payload.
//!
//! Backend failures arrive in several shapes (plain strings, nested `error`
//! objects, HTTP error bodies). They are folded into one [`ErrorPayload`] at
//! the gateway boundary, and [`ErrorPayload::message`] picks the text to show
//! in a fixed order:
//!
//! 1. plain string
//! 2. `data.error.msg`
//! 3. `data.msg`
//! 4. `error.msg`
//! 5. `statusMsg`
//! 6. `message`
//! 7. `"Error (<code>): <statusMsg>"`, synthesized from the status code
//! 8. [`UNKNOWN_ERROR_MESSAGE`]

use core::fmt;

use serde::Serialize;
use serde_json::Value;

/// Shown when nothing more specific can be extracted.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// One error value with every field the precedence chain can draw from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// The error itself was a bare string.
    pub text: Option<String>,
    /// `data.error.msg`: the body of a failed HTTP response.
    pub data_error_msg: Option<String>,
    /// `data.msg`: the body of a failed HTTP response.
    pub data_msg: Option<String>,
    /// `error.msg`: an error object carried directly by the value.
    pub error_msg: Option<String>,
    pub status_msg: Option<String>,
    pub message: Option<String>,
    /// Code used by the synthesized message.
    pub status_code: Option<u16>,
    /// Paired with `status_code` in the synthesized message.
    pub error_status_msg: Option<String>,
}

impl ErrorPayload {
    /// Read an arbitrary error value literally: `data.*`, `error.*` and the
    /// top-level fields are taken from where they are found.
    pub fn from_value(value: &Value) -> Self {
        if let Some(text) = value.as_str() {
            return Self::text(text);
        }

        let data = value.get("data");
        let error = value.get("error");
        Self {
            text: None,
            data_error_msg: data.and_then(|d| text_at(d, &["error", "msg"])),
            data_msg: data.and_then(|d| text_at(d, &["msg"])),
            error_msg: error.and_then(|e| text_at(e, &["msg"])),
            status_msg: text_at(value, &["statusMsg"]),
            message: text_at(value, &["message"]),
            status_code: error
                .and_then(status_code_of)
                .or_else(|| status_code_of(value)),
            error_status_msg: error.and_then(|e| text_at(e, &["statusMsg"])),
        }
    }

    /// A 2xx payload that marked itself as failed.
    ///
    /// The payload plays the role of `data`, so its `error.msg` and `msg`
    /// rank first.
    pub fn from_payload(payload: &Value) -> Self {
        if let Some(text) = payload.as_str() {
            return Self::text(text);
        }

        let error = payload.get("error");
        Self {
            text: None,
            data_error_msg: text_at(payload, &["error", "msg"]),
            data_msg: text_at(payload, &["msg"]),
            error_msg: None,
            status_msg: text_at(payload, &["statusMsg"]),
            message: text_at(payload, &["message"]),
            status_code: error
                .and_then(status_code_of)
                .or_else(|| status_code_of(payload)),
            error_status_msg: error.and_then(|e| text_at(e, &["statusMsg"])),
        }
    }

    /// A non-2xx HTTP response. The body plays the role of `data`; the
    /// transport status backs up a missing `error.statusCode`.
    pub fn from_response(status: u16, body: &Value) -> Self {
        let mut payload = Self::from_payload(body);
        if payload.status_code.is_none() {
            payload.status_code = Some(status);
        }
        payload
    }

    /// A failure that never reached the backend.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()).filter(|m: &String| !m.is_empty()),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()).filter(|t: &String| !t.is_empty()),
            ..Self::default()
        }
    }

    /// The human-readable message, never empty.
    pub fn message(&self) -> String {
        let direct = [
            &self.text,
            &self.data_error_msg,
            &self.data_msg,
            &self.error_msg,
            &self.status_msg,
            &self.message,
        ];
        if let Some(found) = direct.into_iter().flatten().next() {
            return found.clone();
        }

        match (self.status_code, &self.error_status_msg) {
            (Some(code), Some(status_msg)) => format!("Error ({code}): {status_msg}"),
            (Some(code), None) => format!("Error ({code})"),
            (None, _) => UNKNOWN_ERROR_MESSAGE.to_string(),
        }
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ErrorPayload {}

fn text_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn status_code_of(value: &Value) -> Option<u16> {
    let code = value.get("statusCode")?;
    code.as_u64()
        .or_else(|| code.as_str().and_then(|s| s.parse().ok()))
        .and_then(|c| u16::try_from(c).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string_wins() {
        assert_eq!(ErrorPayload::from_value(&json!("boom")).message(), "boom");
    }

    #[test]
    fn precedence_chain_over_generic_value() {
        let full = json!({
            "data": { "error": { "msg": "data.error.msg" }, "msg": "data.msg" },
            "error": { "msg": "error.msg", "statusCode": 500, "statusMsg": "Internal" },
            "statusMsg": "statusMsg",
            "message": "message",
        });
        assert_eq!(ErrorPayload::from_value(&full).message(), "data.error.msg");

        let mut v = full.clone();
        v["data"]["error"] = Value::Null;
        assert_eq!(ErrorPayload::from_value(&v).message(), "data.msg");

        v["data"] = Value::Null;
        assert_eq!(ErrorPayload::from_value(&v).message(), "error.msg");

        v["error"]["msg"] = Value::Null;
        assert_eq!(ErrorPayload::from_value(&v).message(), "statusMsg");

        v["statusMsg"] = Value::Null;
        assert_eq!(ErrorPayload::from_value(&v).message(), "message");

        v["message"] = Value::Null;
        assert_eq!(ErrorPayload::from_value(&v).message(), "Error (500): Internal");

        assert_eq!(
            ErrorPayload::from_value(&json!({})).message(),
            UNKNOWN_ERROR_MESSAGE
        );
    }

    #[test]
    fn application_failure_payload() {
        let payload = json!({
            "success": false,
            "error": { "statusCode": 409, "statusMsg": "Conflict", "msg": "Slot already booked" },
        });
        let error = ErrorPayload::from_payload(&payload);
        assert_eq!(error.message(), "Slot already booked");
        assert_eq!(error.status_code, Some(409));

        let payload = json!({ "success": false, "msg": "Patient not found" });
        assert_eq!(ErrorPayload::from_payload(&payload).message(), "Patient not found");

        let payload = json!({ "success": false, "error": { "statusCode": 422, "statusMsg": "Unprocessable" } });
        assert_eq!(
            ErrorPayload::from_payload(&payload).message(),
            "Error (422): Unprocessable"
        );
    }

    #[test]
    fn http_status_backs_up_missing_code() {
        let error = ErrorPayload::from_response(503, &Value::Null);
        assert_eq!(error.status_code, Some(503));
        assert_eq!(error.message(), "Error (503)");

        let error = ErrorPayload::from_response(400, &json!({ "message": "bad date" }));
        assert_eq!(error.message(), "bad date");
    }

    #[test]
    fn string_status_codes_are_accepted() {
        let error = ErrorPayload::from_value(&json!({ "error": { "statusCode": "404" } }));
        assert_eq!(error.message(), "Error (404)");
    }

    #[test]
    fn blank_fields_are_skipped() {
        let error = ErrorPayload::from_value(&json!({ "message": "   ", "statusMsg": "" }));
        assert_eq!(error.message(), UNKNOWN_ERROR_MESSAGE);
        assert_eq!(ErrorPayload::network("").message(), UNKNOWN_ERROR_MESSAGE);
        assert_eq!(ErrorPayload::network("connection refused").to_string(), "connection refused");
    }
}
