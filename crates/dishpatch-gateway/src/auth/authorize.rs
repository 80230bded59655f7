//! Role-based authorization.

use dishpatch_core::Role;

use super::AuthError;
use super::messages::FORBIDDEN;

/// Roles allowed to administer the platform.
pub const ADMINISTRATORS: &[Role] = &[Role::Admin, Role::SuperAdmin];

/// Permit `role` only if it is one of `required`.
///
/// Roles are a closed enum, so a near-miss spelling never reaches this point:
/// it fails when the token is decoded.
///
/// # Errors
///
/// Returns `AuthError::Authorization` if `role` is not in `required`.
pub fn authorize(role: Role, required: &[Role]) -> Result<(), AuthError> {
    if required.contains(&role) {
        Ok(())
    } else {
        Err(AuthError::Authorization(FORBIDDEN))
    }
}
