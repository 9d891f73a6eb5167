use crate::error::AppError;

/// Admin-facing resources the capability check knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Incidents,
    Tickets,
    Pipeline,
}

/// Whoever is behind the bearer token.
#[derive(Debug, Clone)]
pub struct Actor {
    pub name: String,
    pub role: String,
}

/// Capability check injected into the admin-facing surface.
///
/// Identity comparisons never happen at call sites; every gate goes through
/// `can_manage`.
pub trait Authorizer: Send + Sync {
    fn can_manage(&self, actor: &Actor, resource: Resource) -> bool;
}

/// Role-based authorizer: admins manage everything, operators manage the
/// pipeline surfaces but not tickets.
pub struct RoleAuthorizer;

impl Authorizer for RoleAuthorizer {
    fn can_manage(&self, actor: &Actor, resource: Resource) -> bool {
        match actor.role.as_str() {
            "admin" => true,
            "operator" => matches!(resource, Resource::Incidents | Resource::Pipeline),
            _ => false,
        }
    }
}

/// Gate helper for handlers.
pub fn require_manage(
    authorizer: &dyn Authorizer,
    actor: &Actor,
    resource: Resource,
) -> Result<(), AppError> {
    if authorizer.can_manage(actor, resource) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: &str) -> Actor {
        Actor {
            name: "pat".into(),
            role: role.into(),
        }
    }

    #[test]
    fn admin_manages_everything() {
        let auth = RoleAuthorizer;
        for resource in [Resource::Incidents, Resource::Tickets, Resource::Pipeline] {
            assert!(auth.can_manage(&actor("admin"), resource));
        }
    }

    #[test]
    fn operator_cannot_touch_tickets() {
        let auth = RoleAuthorizer;
        assert!(auth.can_manage(&actor("operator"), Resource::Incidents));
        assert!(auth.can_manage(&actor("operator"), Resource::Pipeline));
        assert!(!auth.can_manage(&actor("operator"), Resource::Tickets));
    }

    #[test]
    fn unknown_role_manages_nothing() {
        let auth = RoleAuthorizer;
        assert!(!auth.can_manage(&actor("viewer"), Resource::Incidents));
    }
}
