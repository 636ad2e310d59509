//! Demo-build user identity.
//!
//! The demo build has no auth provider: the login page drops the user's
//! email (URL-encoded) into a `demo_user` cookie and an optional display
//! name into `demo_name`. Every route requires the former.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::errors::AppError;

pub const USER_COOKIE: &str = "demo_user";
pub const NAME_COOKIE: &str = "demo_name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoUser {
    /// Stable id derived from the email.
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
}

impl DemoUser {
    pub fn from_email(email: String, display_name: Option<String>) -> Self {
        let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("mailto:{}", email).as_bytes());
        Self {
            id: id.to_string(),
            email,
            display_name,
        }
    }

    /// Prefix used when naming gateway-side objects after this user.
    pub fn short_id(&self) -> &str {
        &self.id[..8]
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let email = cookie(headers, USER_COOKIE)?;
        let name = cookie(headers, NAME_COOKIE);
        Some(Self::from_email(email, name))
    }
}

/// Value of cookie `name`, URL-decoded. Empty values count as absent.
fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| {
            urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
        .filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for DemoUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        DemoUser::from_headers(&parts.headers).ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_reads_encoded_cookies() {
        let user = DemoUser::from_headers(&headers(
            "theme=dark; demo_user=alice%40example.com; demo_name=%EA%B9%80%EC%B2%A0%EC%88%98",
        ))
        .unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.display_name.as_deref(), Some("김철수"));
        assert_eq!(user.short_id().len(), 8);
    }

    #[test]
    fn test_missing_or_empty_cookie_is_anonymous() {
        assert!(DemoUser::from_headers(&HeaderMap::new()).is_none());
        assert!(DemoUser::from_headers(&headers("demo_user=")).is_none());
        assert!(DemoUser::from_headers(&headers("demo_name=bob")).is_none());
    }

    #[test]
    fn test_id_is_stable_per_email() {
        let a = DemoUser::from_email("a@x.io".into(), None);
        let b = DemoUser::from_email("a@x.io".into(), Some("A".into()));
        let c = DemoUser::from_email("c@x.io".into(), None);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }
}
