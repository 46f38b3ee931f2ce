//! Cookie-backed sessions.
//!
//! A session is a single cookie holding a random UUID v4 token. There is no
//! server-side store: the token only marks a browser as having logged in.

use axum::http::header::{HeaderValue, COOKIE, SET_COOKIE};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::validation::is_cookie_path_safe;
use crate::error::ContextError;
use crate::http::context::Context;

const DELETED_VALUE: &str = "deleted";
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// A session cookie, as set on or read from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    pub token: String,
    /// Only known for cookies created in this request.
    pub expires: Option<DateTime<Utc>>,
    pub path: Option<String>,
}

impl Session {
    /// True when the token is a well-formed UUID.
    pub fn is_valid_token(&self) -> bool {
        Uuid::parse_str(&self.token).is_ok()
    }

    fn set_cookie_header(&self, max_age: Option<i64>) -> Result<HeaderValue, ContextError> {
        let mut cookie = format!("{}={}", self.name, self.token);
        if let Some(path) = &self.path {
            if !is_cookie_path_safe(path) {
                return Err(ContextError::InvalidHeader(format!("cookie path {path:?}")));
            }
            cookie.push_str("; Path=");
            cookie.push_str(path);
        }
        if let Some(expires) = self.expires {
            cookie.push_str("; Expires=");
            cookie.push_str(&expires.format(HTTP_DATE).to_string());
        }
        if let Some(max_age) = max_age {
            cookie.push_str(&format!("; Max-Age={max_age}"));
        }
        HeaderValue::from_str(&cookie).map_err(|_| ContextError::InvalidHeader(cookie))
    }
}

impl Context {
    /// Start a session: set cookie `name` to a fresh token.
    pub fn new_session(&self, name: &str) -> Result<Session, ContextError> {
        validate_cookie_name(name)?;
        let config = self.session_config();
        let lifetime = i64::try_from(config.lifetime_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        let expires = Utc::now()
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let session = Session {
            name: name.to_string(),
            token: Uuid::new_v4().to_string(),
            expires: Some(expires),
            path: Some(config.path.clone()),
        };
        let header = session.set_cookie_header(None)?;
        self.append_header_value(SET_COOKIE, header);

        tracing::debug!(cookie = %name, "Session created");
        Ok(session)
    }

    /// Read session cookie `name` from the request.
    pub fn get_session(&self, name: &str) -> Result<Session, ContextError> {
        self.headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(key, value)| Session {
                name: key.to_string(),
                token: value.trim_matches('"').to_string(),
                expires: None,
                path: None,
            })
            .ok_or_else(|| ContextError::SessionNotFound(name.to_string()))
    }

    /// Expire session cookie `name` on the client.
    pub fn delete_session(&self, name: &str) -> Result<(), ContextError> {
        validate_cookie_name(name)?;
        let session = Session {
            name: name.to_string(),
            token: DELETED_VALUE.to_string(),
            expires: Some(DateTime::<Utc>::UNIX_EPOCH),
            path: Some(self.session_config().path.clone()),
        };
        let header = session.set_cookie_header(Some(-1))?;
        self.append_header_value(SET_COOKIE, header);

        tracing::debug!(cookie = %name, "Session deleted");
        Ok(())
    }
}

/// Cookie names are RFC 6265 tokens.
fn validate_cookie_name(name: &str) -> Result<(), ContextError> {
    let valid = !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        });
    if valid {
        Ok(())
    } else {
        Err(ContextError::InvalidCookieName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::test_context;
    use axum::body::Body;
    use axum::http::Request;

    fn ctx_with_cookie(cookie: Option<&str>) -> Context {
        let mut builder = Request::builder().uri("/");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        test_context(builder.body(Body::empty()).unwrap())
    }

    #[test]
    fn test_new_session_sets_cookie() {
        let ctx = ctx_with_cookie(None);
        let before = Utc::now();
        let session = ctx.new_session("sid").unwrap();

        assert!(session.is_valid_token());
        let expires = session.expires.unwrap();
        let lifetime = expires - before;
        assert!(lifetime >= Duration::minutes(30) - Duration::seconds(5));
        assert!(lifetime <= Duration::minutes(30) + Duration::seconds(5));

        let response = ctx.into_response();
        let header = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(header.starts_with(&format!("sid={}; Path=/; Expires=", session.token)));
        assert!(header.ends_with(" GMT"));
    }

    #[test]
    fn test_get_session() {
        let ctx = ctx_with_cookie(Some("theme=dark; sid=abc-123"));
        let session = ctx.get_session("sid").unwrap();
        assert_eq!(session.token, "abc-123");
        assert!(!session.is_valid_token());
    }

    #[test]
    fn test_get_missing_session() {
        let ctx = ctx_with_cookie(Some("theme=dark"));
        assert!(matches!(
            ctx.get_session("sid"),
            Err(ContextError::SessionNotFound(ref n)) if n == "sid"
        ));
        assert!(ctx_with_cookie(None).get_session("sid").is_err());
    }

    #[test]
    fn test_delete_session() {
        let ctx = ctx_with_cookie(Some("sid=abc"));
        ctx.delete_session("sid").unwrap();

        let response = ctx.into_response();
        assert_eq!(
            response.headers()[SET_COOKIE],
            "sid=deleted; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=-1"
        );
    }

    #[test]
    fn test_unsafe_path_is_not_spliced_into_cookie() {
        let session = crate::config::SessionConfig {
            path: "/; Domain=evil.example".into(),
            ..Default::default()
        };
        let (parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();
        let ctx = Context::new(parts, bytes::Bytes::new(), std::sync::Arc::new(session));

        assert!(matches!(
            ctx.new_session("sid"),
            Err(ContextError::InvalidHeader(_))
        ));
        assert!(ctx.into_response().headers().get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_invalid_cookie_name() {
        let ctx = ctx_with_cookie(None);
        assert!(matches!(
            ctx.new_session("bad name"),
            Err(ContextError::InvalidCookieName(_))
        ));
        assert!(ctx.delete_session("").is_err());
    }
}
