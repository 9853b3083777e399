/// Database models for TCM
///
/// Each model owns its table(s) and exposes the queries the API needs. Access
/// control is not enforced here: callers resolve a node's `ModuleScope` (or
/// the project's organization) and check it with `auth::authorization` first.
///
/// # Models
///
/// - `organization`: tenants
/// - `user`: user accounts and their roles
/// - `project`: top of the test hierarchy, with user assignments
/// - `test_module`: modules inside a project, with user assignments
/// - `test_suite`: suites (submodules) inside a module
/// - `test_case`: test cases and their ordered steps
/// - `execution`: test executions and per-step results
/// - `invitation`: pending invitations into an organization
/// - `email_verification`: email verification tokens
/// - `cascade`: transactional subtree deletion
///
/// # Example
///
/// ```no_run
/// use tcm_shared::models::project::{CreateProject, Project};
/// use tcm_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example(organization_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::new(std::env::var("DATABASE_URL")?)).await?;
///
/// let project = Project::create(&pool, CreateProject {
///     organization_id,
///     name: "Checkout".to_string(),
///     description: None,
/// }).await?;
/// # Ok(())
/// # }
/// ```

pub mod cascade;
pub mod email_verification;
pub mod execution;
pub mod invitation;
pub mod organization;
pub mod project;
pub mod test_case;
pub mod test_module;
pub mod test_suite;
pub mod user;
