//! Request/response types for auth endpoints.
//!
//! Request fields are optional so presence checks stay in the flows and
//! produce the same error envelope as every other validation failure.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub csrf_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    /// The account email; the form field is historically named `login`.
    pub login: Option<String>,
    pub password: Option<String>,
    pub csrf_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
    pub csrf_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub csrf_token: Option<String>,
}

/// Issued by the GET form endpoints for embedding in the next submission.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CsrfResponse {
    pub csrf: String,
}

/// Bare success marker.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AcceptedResponse {
    pub result: u8,
}

impl AcceptedResponse {
    pub(super) fn new() -> Self {
        Self { result: 1 }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginOkResponse {
    pub result: u8,
    pub url: String,
    pub csrf: String,
}

/// Identical for existing and unknown accounts apart from the rotated token.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordResponse {
    pub result: u8,
    pub csrf: String,
}

/// Uniform error envelope; always carries a usable CSRF token so the client
/// can retry without reloading.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub csrf: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn register_request_tolerates_missing_fields() -> Result<()> {
        let request: RegisterRequest = serde_json::from_str(r#"{"email":"a@example.com"}"#)?;
        assert_eq!(request.email.as_deref(), Some("a@example.com"));
        assert_eq!(request.name, None);
        assert_eq!(request.password, None);
        assert_eq!(request.csrf_token, None);
        Ok(())
    }

    #[test]
    fn accepted_response_serializes_result_marker() -> Result<()> {
        let value = serde_json::to_value(AcceptedResponse::new())?;
        assert_eq!(value, serde_json::json!({"result": 1}));
        Ok(())
    }

    #[test]
    fn error_response_carries_token() -> Result<()> {
        let value = serde_json::to_value(ErrorResponse {
            error: "Invalid credentials".to_string(),
            csrf: "token".to_string(),
        })?;
        assert_eq!(
            value,
            serde_json::json!({"error": "Invalid credentials", "csrf": "token"})
        );
        Ok(())
    }
}
