//! Double-submit CSRF check (§6): a browser-originated mutating request
//! carries a `csrf_token` cookie alongside an `X-CSRF-Token` header; the two
//! must match. Bearer-only callers (CLI, service-to-service) never set the
//! cookie, so this never applies to them.

use axum::extract::Request;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::Error;

const COOKIE_NAME: &str = "csrf_token";
const HEADER_NAME: &str = "x-csrf-token";

pub async fn csrf_middleware(request: Request, next: Next) -> Result<Response, Error> {
    if is_mutating(request.method()) {
        if let Some(cookie_value) = cookie_value(&request, COOKIE_NAME) {
            let header_value = request
                .headers()
                .get(HEADER_NAME)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if header_value.is_empty() || header_value != cookie_value {
                return Err(Error::forbidden(
                    "CSRF token missing or does not match session cookie",
                ));
            }
        }
    }
    Ok(next.run(request).await)
}

fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

fn cookie_value(request: &Request, name: &str) -> Option<String> {
    let header = request
        .headers()
        .get(axum::http::header::COOKIE)?
        .to_str()
        .ok()?;
    header.split(';').find_map(|kv| {
        let mut parts = kv.trim().splitn(2, '=');
        let key = parts.next()?;
        let value = parts.next()?;
        (key == name).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_named_cookie_among_several() {
        let mut request = Request::builder().body(axum::body::Body::empty()).unwrap();
        request.headers_mut().insert(
            axum::http::header::COOKIE,
            "other=1; csrf_token=abc123; foo=bar".parse().unwrap(),
        );
        assert_eq!(cookie_value(&request, COOKIE_NAME), Some("abc123".to_string()));
    }

    #[test]
    fn missing_cookie_yields_none() {
        let request = Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(cookie_value(&request, COOKIE_NAME), None);
    }

    #[test]
    fn get_is_not_mutating() {
        assert!(!is_mutating(&Method::GET));
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::DELETE));
    }
}
