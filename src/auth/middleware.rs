use crate::auth::models::{AuthenticatedUser, UserRole};
use crate::error::AppError;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's platform role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Build an `AuthenticatedUser` from the identity forwarded by the gateway.
///
/// A missing role defaults to `Student`; an unknown one is rejected.
pub fn build_authenticated_user(
    user_id: &str,
    role: Option<&str>,
) -> Result<AuthenticatedUser, AppError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Auth("Missing user id".into()));
    }

    let role = match role {
        None => UserRole::Student,
        Some(raw) => UserRole::from_str_ci(raw).ok_or_else(|| {
            AppError::Auth(format!(
                "Invalid role '{}'. Expected: student, advisor, admin",
                raw
            ))
        })?,
    };

    Ok(AuthenticatedUser::new(user_id, role))
}

#[cfg(feature = "server")]
fn header_value<'a>(
    headers: &'a axum::http::HeaderMap,
    name: &str,
) -> Result<Option<&'a str>, AppError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| AppError::Auth(format!("Header '{name}' is not valid UTF-8")))
        })
        .transpose()
}

#[cfg(feature = "server")]
impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user_id = header_value(&parts.headers, USER_ID_HEADER)?
            .ok_or_else(|| AppError::Auth("Not logged in".into()))?;
        let role = header_value(&parts.headers, USER_ROLE_HEADER)?;

        build_authenticated_user(user_id, role)
    }
}
