// =============================================================================
// AUTHORIZATION MODULE
// =============================================================================
// Identity is asserted upstream: the fronting auth proxy sets `x-user-id` for
// signed-in guests. Staff and admins additionally present a bearer token.
//
// Authorization is a plain function of (subject, required roles). Handlers
// ask for a decision and map a denial to 403.
// =============================================================================

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use constant_time_eq::constant_time_eq;

use crate::config::Config;
use crate::error::AppError;
use crate::AppState;

/// Header set by the auth proxy with the signed-in user's id
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Guest,
    Staff,
    Admin,
}

/// The caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Absent for staff tools calling without a guest identity
    pub user_id: Option<String>,
    pub roles: Vec<Role>,
}

impl Subject {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// The user id, or 401 when the request carried none.
    pub fn require_user(&self) -> Result<&str, AppError> {
        self.user_id
            .as_deref()
            .ok_or_else(|| AppError::Unauthorized(format!("{} header is required", USER_ID_HEADER)))
    }
}

/// Result of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Granted,
    Denied { required: Vec<Role> },
}

impl Capability {
    pub fn is_granted(&self) -> bool {
        matches!(self, Capability::Granted)
    }

    /// Turn a denial into a 403.
    pub fn require(self) -> Result<(), AppError> {
        match self {
            Capability::Granted => Ok(()),
            Capability::Denied { required } => Err(AppError::Forbidden(format!(
                "requires one of {:?}",
                required
            ))),
        }
    }
}

/// Granted when `subject` holds any of `required`.
pub fn authorize(subject: &Subject, required: &[Role]) -> Capability {
    if required.iter().any(|role| subject.has_role(*role)) {
        Capability::Granted
    } else {
        Capability::Denied {
            required: required.to_vec(),
        }
    }
}

/// Build the subject for a request from its user header and bearer token.
pub fn resolve_subject(config: &Config, user_id: Option<&str>, bearer: Option<&str>) -> Subject {
    let user_id = user_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let mut roles = Vec::new();
    if user_id.is_some() {
        roles.push(Role::Guest);
    }

    if let Some(token) = bearer {
        if constant_time_eq(token.as_bytes(), config.admin_token.as_bytes()) {
            roles.extend([Role::Staff, Role::Admin]);
        } else if config
            .staff_token
            .as_deref()
            .is_some_and(|staff| constant_time_eq(token.as_bytes(), staff.as_bytes()))
        {
            roles.push(Role::Staff);
        }
    }

    Subject { user_id, roles }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Subject {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok());
        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        Ok(resolve_subject(&state.config, user_id, bearer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            port: 0,
            database_url: None,
            redis_url: None,
            paystack_secret_key: "sk_test".to_string(),
            paystack_base_url: "http://localhost".to_string(),
            admin_token: "admin-secret".to_string(),
            staff_token: Some("staff-secret".to_string()),
            currency: "NGN".to_string(),
        }
    }

    #[test]
    fn guest_from_user_header() {
        let subject = resolve_subject(&config(), Some("user-1"), None);
        assert_eq!(subject.user_id.as_deref(), Some("user-1"));
        assert_eq!(subject.roles, vec![Role::Guest]);
        assert!(authorize(&subject, &[Role::Guest]).is_granted());
        assert!(!authorize(&subject, &[Role::Staff, Role::Admin]).is_granted());
    }

    #[test]
    fn tokens_grant_staff_and_admin() {
        let staff = resolve_subject(&config(), None, Some("staff-secret"));
        assert!(authorize(&staff, &[Role::Staff]).is_granted());
        assert!(!authorize(&staff, &[Role::Admin]).is_granted());

        let admin = resolve_subject(&config(), Some("ops"), Some("admin-secret"));
        assert!(authorize(&admin, &[Role::Staff]).is_granted());
        assert!(authorize(&admin, &[Role::Admin]).is_granted());
        assert!(admin.has_role(Role::Guest));
    }

    #[test]
    fn wrong_token_grants_nothing() {
        let subject = resolve_subject(&config(), None, Some("admin-secreT"));
        assert!(subject.roles.is_empty());
        assert_eq!(
            authorize(&subject, &[Role::Admin]),
            Capability::Denied {
                required: vec![Role::Admin]
            }
        );
    }

    #[test]
    fn blank_user_header_is_anonymous() {
        let subject = resolve_subject(&config(), Some("   "), None);
        assert!(subject.user_id.is_none());
        assert!(subject.require_user().is_err());
    }

    #[test]
    fn denial_maps_to_forbidden() {
        let subject = resolve_subject(&config(), Some("user-1"), None);
        assert!(matches!(
            authorize(&subject, &[Role::Admin]).require(),
            Err(AppError::Forbidden(_))
        ));
    }
}
