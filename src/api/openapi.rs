//! `OpenAPI` document for the HTTP surface.

use utoipa::OpenApi;

use crate::api::handlers::auth::types::{
    AcceptedResponse, ChangePasswordRequest, CsrfResponse, ErrorResponse, ForgotPasswordRequest,
    ForgotPasswordResponse, LoginOkResponse, LoginRequest, RegisterRequest,
};
use crate::api::handlers::{auth, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::register::register_form,
        auth::register::site_register,
        auth::login::login_form,
        auth::login::auth_login,
        auth::login::logout,
        auth::forgot::forgot_password_form,
        auth::forgot::password_email,
        auth::reset::reset_password_form,
        auth::reset::password_change,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        ForgotPasswordRequest,
        ChangePasswordRequest,
        CsrfResponse,
        AcceptedResponse,
        LoginOkResponse,
        ForgotPasswordResponse,
        ErrorResponse,
    )),
    tags(
        (name = "auth", description = "Password authentication flows"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
