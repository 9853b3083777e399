/// Role-based authorization and hierarchy access checks
///
/// Two questions are answered here for every request:
///
/// 1. **May this role do this?** Each role grants a fixed set of
///    `Permission`s (see `UserRole::grants`).
/// 2. **May this user touch this node?** Admins reach every node of their
///    organization. Everyone else reaches a project when assigned to it or to
///    one of its modules, and a module (with its suites, cases and
///    executions) when assigned to it or to its project.
///
/// Nodes in another organization are reported as not found, never as
/// forbidden, so IDs from other tenants can't be probed.
///
/// # Example
///
/// ```no_run
/// use tcm_shared::auth::authorization::{require_permission, require_suite_access, Permission};
/// use tcm_shared::auth::middleware::AuthContext;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// async fn can_author(pool: &PgPool, auth: &AuthContext, suite_id: Uuid) -> bool {
///     require_permission(auth, Permission::AuthorTestCases).is_ok()
///         && require_suite_access(pool, auth, suite_id).await.is_ok()
/// }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::execution::TestExecution;
use crate::models::project::Project;
use crate::models::test_case::TestCase;
use crate::models::test_module::{ModuleScope, TestModule};
use crate::models::test_suite::TestSuite;
use crate::models::user::UserRole;

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// None of the caller's roles grants the permission
    #[error("Insufficient permissions: {} required", .0.as_str())]
    MissingPermission(Permission),

    /// The caller isn't assigned to the project or module
    #[error("Not assigned to this {0}")]
    NotAssigned(&'static str),

    /// The node doesn't exist or belongs to another organization
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Some user IDs don't belong to the caller's organization
    #[error("Unknown users: {0:?}")]
    UnknownUsers(Vec<Uuid>),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Actions gated by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Users, roles, invitations and organization settings
    ManageOrganization,

    /// Project and module CRUD, user assignment
    ManageProjects,

    /// Suites, test cases, steps and imports
    AuthorTestCases,

    /// Creating, updating and assigning executions
    ExecuteTests,

    /// Analytics and exports
    ViewReports,

    /// Browsing the hierarchy
    Read,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageOrganization => "manage_organization",
            Permission::ManageProjects => "manage_projects",
            Permission::AuthorTestCases => "author_test_cases",
            Permission::ExecuteTests => "execute_tests",
            Permission::ViewReports => "view_reports",
            Permission::Read => "read",
        }
    }
}

impl UserRole {
    /// Whether this role grants `permission`
    pub fn grants(&self, permission: Permission) -> bool {
        use Permission::*;

        match self {
            UserRole::Admin => true,
            UserRole::Qa => matches!(permission, AuthorTestCases | ExecuteTests | ViewReports | Read),
            UserRole::Ba => matches!(permission, AuthorTestCases | ViewReports | Read),
            UserRole::Tester => matches!(permission, ExecuteTests | Read),
        }
    }
}

/// Checks that one of the caller's roles grants `permission`
pub fn require_permission(auth: &AuthContext, permission: Permission) -> Result<(), AuthzError> {
    if auth.roles.iter().any(|role| role.grants(permission)) {
        Ok(())
    } else {
        Err(AuthzError::MissingPermission(permission))
    }
}

/// Loads a project of the caller's organization and checks visibility
pub async fn require_project_access(
    pool: &PgPool,
    auth: &AuthContext,
    project_id: Uuid,
) -> Result<Project, AuthzError> {
    let project = Project::find_by_id_and_org(pool, project_id, auth.organization_id)
        .await?
        .ok_or(AuthzError::NotFound("Project"))?;

    if !auth.is_admin() && !Project::is_visible_to(pool, project.id, auth.user_id).await? {
        return Err(AuthzError::NotAssigned("project"));
    }

    Ok(project)
}

/// Checks that a resolved module scope is reachable by the caller
async fn require_scope_access(
    pool: &PgPool,
    auth: &AuthContext,
    scope: Option<ModuleScope>,
    kind: &'static str,
) -> Result<ModuleScope, AuthzError> {
    let scope = scope
        .filter(|scope| scope.organization_id == auth.organization_id)
        .ok_or(AuthzError::NotFound(kind))?;

    if !auth.is_admin() && !TestModule::is_visible_to(pool, scope.module_id, auth.user_id).await? {
        return Err(AuthzError::NotAssigned("module"));
    }

    Ok(scope)
}

pub async fn require_module_access(
    pool: &PgPool,
    auth: &AuthContext,
    module_id: Uuid,
) -> Result<ModuleScope, AuthzError> {
    let scope = TestModule::scope(pool, module_id).await?;
    require_scope_access(pool, auth, scope, "Module").await
}

pub async fn require_suite_access(
    pool: &PgPool,
    auth: &AuthContext,
    suite_id: Uuid,
) -> Result<ModuleScope, AuthzError> {
    let scope = TestSuite::scope(pool, suite_id).await?;
    require_scope_access(pool, auth, scope, "Suite").await
}

pub async fn require_test_case_access(
    pool: &PgPool,
    auth: &AuthContext,
    test_case_id: Uuid,
) -> Result<ModuleScope, AuthzError> {
    let scope = TestCase::scope(pool, test_case_id).await?;
    require_scope_access(pool, auth, scope, "Test case").await
}

pub async fn require_execution_access(
    pool: &PgPool,
    auth: &AuthContext,
    execution_id: Uuid,
) -> Result<ModuleScope, AuthzError> {
    let scope = TestExecution::scope(pool, execution_id).await?;
    require_scope_access(pool, auth, scope, "Execution").await
}

/// Checks that every user ID belongs to the organization
pub async fn require_organization_members(
    pool: &PgPool,
    organization_id: Uuid,
    user_ids: &[Uuid],
) -> Result<(), AuthzError> {
    let known: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM users WHERE organization_id = $1 AND id = ANY($2)",
    )
    .bind(organization_id)
    .bind(user_ids)
    .fetch_all(pool)
    .await?;

    let unknown: Vec<Uuid> = user_ids
        .iter()
        .filter(|id| !known.contains(id))
        .copied()
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(AuthzError::UnknownUsers(unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::middleware::AuthMethod;

    fn context(roles: Vec<UserRole>) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            email_verified: true,
            roles,
            method: AuthMethod::Cookie,
        }
    }

    #[test]
    fn test_role_permission_matrix() {
        use Permission::*;

        let all = [ManageOrganization, ManageProjects, AuthorTestCases, ExecuteTests, ViewReports, Read];
        for permission in all {
            assert!(UserRole::Admin.grants(permission));
        }

        let expected = [
            (UserRole::Qa, vec![AuthorTestCases, ExecuteTests, ViewReports, Read]),
            (UserRole::Ba, vec![AuthorTestCases, ViewReports, Read]),
            (UserRole::Tester, vec![ExecuteTests, Read]),
        ];

        for (role, granted) in expected {
            for permission in all {
                assert_eq!(
                    role.grants(permission),
                    granted.contains(&permission),
                    "{:?} / {:?}",
                    role,
                    permission
                );
            }
        }
    }

    #[test]
    fn test_require_permission_uses_any_role() {
        let tester = context(vec![UserRole::Tester]);
        assert!(require_permission(&tester, Permission::ExecuteTests).is_ok());
        assert!(matches!(
            require_permission(&tester, Permission::AuthorTestCases),
            Err(AuthzError::MissingPermission(Permission::AuthorTestCases))
        ));

        let both = context(vec![UserRole::Ba, UserRole::Tester]);
        assert!(require_permission(&both, Permission::AuthorTestCases).is_ok());
        assert!(require_permission(&both, Permission::ExecuteTests).is_ok());
        assert!(require_permission(&both, Permission::ManageProjects).is_err());
    }

    #[test]
    fn test_no_roles_grants_nothing() {
        let nobody = context(vec![]);
        assert!(require_permission(&nobody, Permission::Read).is_err());
    }

    #[test]
    fn test_authz_error_display() {
        let err = AuthzError::MissingPermission(Permission::ManageProjects);
        assert!(err.to_string().contains("manage_projects"));

        assert_eq!(AuthzError::NotFound("Suite").to_string(), "Suite not found");
        assert_eq!(AuthzError::NotAssigned("module").to_string(), "Not assigned to this module");
    }
}
