/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Signup, login, token refresh, logout and email verification
/// - `me`: The caller's own profile
/// - `organization`, `users`, `invitations`: Organization administration
/// - `projects`, `modules`, `suites`, `test_cases`: The test hierarchy
/// - `executions`: Test runs and their step results
/// - `analytics`: Pass-rate reports
/// - `transfer`: Spreadsheet import and export

pub mod analytics;
pub mod auth;
pub mod executions;
pub mod health;
pub mod invitations;
pub mod me;
pub mod modules;
pub mod organization;
pub mod projects;
pub mod suites;
pub mod test_cases;
pub mod transfer;
pub mod users;
