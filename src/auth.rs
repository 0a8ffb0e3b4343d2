use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::db;
use crate::db::schema::User;
use crate::error::AppError;
use crate::handler::AppData;

/// The user named by the trusted auth-proxy header, or `None` for anonymous requests.
pub struct CurrentUser(pub Option<User>);

impl FromRequestParts<Arc<AppData>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, data: &Arc<AppData>) -> Result<Self, Self::Rejection> {
        let username = parts.headers
            .get(&data.auth_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let username = match username {
            None => return Ok(CurrentUser(None)),
            Some(v) => v.to_owned(),
        };

        let user = db::model::get_or_create_user(data.db_client.conn(), &username).await?;

        Ok(CurrentUser(Some(user)))
    }
}
