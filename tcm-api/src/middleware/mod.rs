/// Middleware modules for the API server
///
/// Session authentication lives in `app::jwt_auth_layer` because it needs
/// the application state; this module holds the stateless layers.
///
/// - Security headers

pub mod security;
