//! Caller identity and admin checks.
//!
//! Authentication happens upstream: a trusted proxy puts the caller's email
//! in a header, the middleware here lifts it into a [`RequestContext`], and
//! the [`Admin`] extractor gates the admin routes on an [`AdminPolicy`].

use std::collections::HashSet;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use super::error::ApiError;
use super::routes::AppState;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Lowercased, trimmed email.
    pub email: String,
}

impl Identity {
    pub fn new(email: &str) -> Option<Self> {
        let email = email.trim().to_lowercase();
        (!email.is_empty()).then_some(Self { email })
    }
}

/// Per-request context attached as a request extension.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: Option<Identity>,
}

/// Decides who may use the admin routes.
pub trait AdminPolicy: Send + Sync {
    fn is_admin(&self, identity: &Identity) -> bool;
}

/// Admin iff the email is on a fixed allow-list (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    emails: HashSet<String>,
}

impl AdminAllowList {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }
}

impl AdminPolicy for AdminAllowList {
    fn is_admin(&self, identity: &Identity) -> bool {
        self.emails.contains(&identity.email)
    }
}

/// Middleware: read the identity header and attach a [`RequestContext`].
pub async fn attach_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = request
        .headers()
        .get(&state.identity_header)
        .and_then(|v| v.to_str().ok())
        .and_then(Identity::new);

    request.extensions_mut().insert(RequestContext { identity });
    next.run(request).await
}

/// Extractor that only succeeds for admin callers.
#[derive(Debug, Clone)]
pub struct Admin(pub Identity);

impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.identity.clone())
            .ok_or_else(|| ApiError::Unauthorized("authentication required".into()))?;

        if !state.admin_policy.is_admin(&identity) {
            tracing::warn!(email = %identity.email, "Non-admin caller rejected");
            return Err(ApiError::Unauthorized("admin access required".into()));
        }
        Ok(Admin(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_normalized() {
        assert_eq!(
            Identity::new("  Admin@Example.COM "),
            Some(Identity {
                email: "admin@example.com".into()
            })
        );
        assert_eq!(Identity::new("   "), None);
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let policy = AdminAllowList::new(["Ops@Example.com", " "]);
        let ops = Identity::new("ops@example.com").unwrap();
        let other = Identity::new("someone@example.com").unwrap();
        assert!(policy.is_admin(&ops));
        assert!(!policy.is_admin(&other));
        assert!(!AdminAllowList::default().is_admin(&ops));
    }
}
