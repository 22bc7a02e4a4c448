mod account;
pub(crate) mod config;
mod ticket;

/// The module for unit testing, will only be available in dev env.
#[cfg(test)]
mod tests;

use account::Permission;
use account::Role;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::Serialize;
use std::ops::Deref;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    account::INSTANCE.refresh_all();
    account::bootstrap_admin();

    let addr = config::INSTANCE.server.socket_addr();
    tracing::info!("listening on {addr}");

    axum::Server::bind(&addr)
        .serve(router().into_make_service())
        .await
        .unwrap();
}

/// All the routes of this server, as `/api/{area}/{action}`.
fn router() -> Router {
    Router::new()
        .route("/api/account/create", post(account::handle::create_account))
        .route("/api/account/verify", post(account::handle::verify_account))
        .route("/api/account/login", post(account::handle::login_account))
        .route("/api/account/logout", post(account::handle::logout_account))
        .route("/api/account/view", post(account::handle::view_account))
        .route("/api/account/edit", post(account::handle::edit_account))
        .route(
            "/api/account/reset-password",
            post(account::handle::reset_password),
        )
        .route(
            "/api/account/manage/role-requests",
            post(account::handle::manage::role_requests),
        )
        .route(
            "/api/account/manage/review-role",
            post(account::handle::manage::review_role),
        )
        .route("/api/ticket/create", post(ticket::handle::create_ticket))
        .route("/api/ticket/get", post(ticket::handle::get_tickets))
        .route("/api/ticket/get-info", post(ticket::handle::get_tickets_info))
        .route("/api/ticket/edit", post(ticket::handle::edit_ticket))
        .route("/api/ticket/review", post(ticket::handle::review_ticket))
        .route("/api/ticket/advance", post(ticket::handle::advance_ticket))
        .route("/api/ticket/delete", post(ticket::handle::delete_ticket))
        .route("/api/ticket/dashboard", post(ticket::handle::dashboard))
        .route(
            "/api/ticket/upload-image",
            post(ticket::handle::upload_image),
        )
        .route("/api/ticket/get-image", post(ticket::handle::get_image))
}

/// Maps a module error to the status code of its response.
pub trait AsResCode {
    fn response_code(&self) -> StatusCode;
}

/// Renders a module error as a `{ "error": .. }` json response with
/// the status code the error maps to.
pub struct ResError<E>(pub E);

impl<E> IntoResponse for ResError<E>
where
    E: AsResCode + std::fmt::Display,
{
    fn into_response(self) -> axum::response::Response {
        #[derive(Serialize)]
        struct ErrorInfo {
            error: String,
        }

        (
            self.0.response_code(),
            axum::Json(ErrorInfo {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// A context for checking the validation of actions an account
/// performs with permission requirements.
pub struct RequirePermissionContext {
    /// The access token of this account.
    pub token: String,
    /// The only id of this account.
    pub account_id: u64,
}

impl RequirePermissionContext {
    /// Whether this context is valid and the account holds all the
    /// target permissions, returning the account's role on success.
    pub fn valid(&self, permissions: &[Permission]) -> Result<Role, account::Error> {
        account::INSTANCE.refresh(self.account_id);

        let index = match account::INSTANCE.index().get(&self.account_id) {
            Some(index) => *index.value(),
            None => return Err(account::Error::AccountNotFound(self.account_id)),
        };

        let b = account::INSTANCE.inner().read();
        let account = b
            .get(index)
            .ok_or(account::Error::AccountNotFound(self.account_id))?
            .read();

        match account.deref() {
            account::Account::Unverified(_) => Err(account::Error::UserUnverified),
            account::Account::Verified {
                tokens, profile, ..
            } => {
                if !tokens.token_usable(&self.token) {
                    return Err(account::Error::TokenIncorrect);
                }

                let role = profile.role;
                if permissions
                    .iter()
                    .all(|permission| role.has_permission(*permission))
                {
                    Ok(role)
                } else {
                    Err(account::Error::PermissionDenied)
                }
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequirePermissionContext {
    type Rejection = ResError<account::Error>;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match (parts.headers.get("Token"), parts.headers.get("AccountId")) {
            (Some(token), Some(account_id)) => Ok(Self {
                token: token
                    .to_str()
                    .map_err(|_| ResError(account::Error::NotLoggedIn))?
                    .to_string(),
                account_id: account_id
                    .to_str()
                    .ok()
                    .and_then(|value| value.parse().ok())
                    .ok_or(ResError(account::Error::NotLoggedIn))?,
            }),
            _ => Err(ResError(account::Error::NotLoggedIn)),
        }
    }
}
