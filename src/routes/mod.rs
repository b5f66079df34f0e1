/// Router Module Index
///
/// Routes are split by the access they require. Authentication is applied as a layer on
/// the `authenticated` and `admin` routers; capability checks happen inside each handler.

/// Routes reachable without a session.
pub mod public;

/// Routes behind the `AuthUser` extractor middleware.
pub mod authenticated;

/// Account administration, nested under `/admin`. Handlers require `manage_users`.
pub mod admin;
