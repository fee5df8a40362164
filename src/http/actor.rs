//! Request actor, taken from headers set by the upstream auth gateway.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::CommerceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub is_admin: bool,
}

impl Actor {
    fn from_parts(parts: &Parts) -> Result<Self, CommerceError> {
        let user_id = match parts.headers.get(USER_ID_HEADER) {
            None => None,
            Some(v) => Some(
                v.to_str().ok()
                    .and_then(|s| Uuid::parse_str(s.trim()).ok())
                    .ok_or_else(|| CommerceError::Validation(format!("invalid {USER_ID_HEADER} header")))?,
            ),
        };
        let is_admin = parts.headers.get(ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|r| r.trim().eq_ignore_ascii_case("admin"));
        Ok(Self { user_id, is_admin })
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = CommerceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Actor::from_parts(parts)
    }
}

/// An authenticated administrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdminActor(pub Uuid);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminActor {
    type Rejection = CommerceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match Actor::from_parts(parts)? {
            Actor { user_id: Some(id), is_admin: true } => Ok(AdminActor(id)),
            _ => Err(CommerceError::Forbidden),
        }
    }
}
