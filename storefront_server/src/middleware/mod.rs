mod acl;
mod auth;

pub use acl::{AclMiddlewareFactory, AclMiddlewareService};
pub use auth::{JwtAuthMiddlewareFactory, JwtAuthMiddlewareService};
