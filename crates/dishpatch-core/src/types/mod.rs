//! Core types used throughout Dishpatch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A string that did not name any known tag.
///
/// Tags are matched exactly: no trimming, no case folding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: {value:?}")]
pub struct UnknownTag {
    /// What was being parsed ("role" or "principal type").
    pub what: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Identity of a principal. Assigned at creation and never changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    /// Create a new identifier (UUIDv7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Borrow the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for PrincipalId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A principal collection.
///
/// Identifier uniqueness is enforced per collection, never globally: the same
/// email may exist once as a customer and once as a courier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrincipalKind {
    /// People ordering food.
    Customer,
    /// Platform administrators (both `admin` and `super-admin` roles).
    Admin,
    /// Restaurant owners and managers. Subject to approval.
    RestaurantOperator,
    /// Couriers.
    DeliveryPersonnel,
}

impl PrincipalKind {
    /// Every collection, in a stable order.
    pub const ALL: [Self; 4] = [
        Self::Customer,
        Self::Admin,
        Self::RestaurantOperator,
        Self::DeliveryPersonnel,
    ];

    /// The wire tag (also the `{principalType}` path segment).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
            Self::RestaurantOperator => "restaurant-operator",
            Self::DeliveryPersonnel => "delivery-personnel",
        }
    }

    /// Role assigned to principals created through registration.
    #[must_use]
    pub const fn default_role(self) -> Role {
        match self {
            Self::Customer => Role::Customer,
            Self::Admin => Role::Admin,
            Self::RestaurantOperator => Role::RestaurantOperator,
            Self::DeliveryPersonnel => Role::DeliveryPersonnel,
        }
    }

    /// Suffix used for per-kind environment variables, e.g. `TOKEN_TTL_CUSTOMER`.
    #[must_use]
    pub const fn env_suffix(self) -> &'static str {
        match self {
            Self::Customer => "CUSTOMER",
            Self::Admin => "ADMIN",
            Self::RestaurantOperator => "RESTAURANT_OPERATOR",
            Self::DeliveryPersonnel => "DELIVERY_PERSONNEL",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalKind {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownTag {
                what: "principal type",
                value: s.to_string(),
            })
    }
}

/// The role carried in every claims token.
///
/// A closed set: authorization decisions match on this enum, so an
/// unrecognized role cannot be represented at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Customer.
    Customer,
    /// Administrator.
    Admin,
    /// Administrator created out-of-band by an operator.
    SuperAdmin,
    /// Restaurant operator.
    RestaurantOperator,
    /// Delivery personnel.
    DeliveryPersonnel,
}

impl Role {
    /// Every role, in a stable order.
    pub const ALL: [Self; 5] = [
        Self::Customer,
        Self::Admin,
        Self::SuperAdmin,
        Self::RestaurantOperator,
        Self::DeliveryPersonnel,
    ];

    /// The wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
            Self::SuperAdmin => "super-admin",
            Self::RestaurantOperator => "restaurant-operator",
            Self::DeliveryPersonnel => "delivery-personnel",
        }
    }

    /// The collection principals with this role live in.
    #[must_use]
    pub const fn kind(self) -> PrincipalKind {
        match self {
            Self::Customer => PrincipalKind::Customer,
            Self::Admin | Self::SuperAdmin => PrincipalKind::Admin,
            Self::RestaurantOperator => PrincipalKind::RestaurantOperator,
            Self::DeliveryPersonnel => PrincipalKind::DeliveryPersonnel,
        }
    }

    /// Check if this role has administrative privileges.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownTag {
                what: "role",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_role_tags_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            assert_eq!(
                serde_json::to_string(&role).unwrap(),
                format!("\"{}\"", role.as_str())
            );
        }
    }

    #[test]
    fn test_role_parsing_is_case_sensitive() {
        assert!("Admin".parse::<Role>().is_err());
        assert!("ADMIN".parse::<Role>().is_err());
        assert!(" admin".parse::<Role>().is_err());
        assert!("super_admin".parse::<Role>().is_err());
        assert!(serde_json::from_str::<Role>("\"Customer\"").is_err());
    }

    #[test]
    fn test_admin_roles_share_collection() {
        assert_eq!(Role::Admin.kind(), PrincipalKind::Admin);
        assert_eq!(Role::SuperAdmin.kind(), PrincipalKind::Admin);
        assert!(Role::SuperAdmin.is_admin());
        assert!(!Role::RestaurantOperator.is_admin());
    }

    #[test]
    fn test_principal_kind_parsing() {
        assert_eq!(
            "restaurant-operator".parse::<PrincipalKind>().unwrap(),
            PrincipalKind::RestaurantOperator
        );
        let err = "super-admin".parse::<PrincipalKind>().unwrap_err();
        assert_eq!(err.what, "principal type");
        assert!("Customer".parse::<PrincipalKind>().is_err());
    }

    #[test]
    fn test_default_roles() {
        for kind in PrincipalKind::ALL {
            assert_eq!(kind.default_role().kind(), kind);
        }
    }

    #[test]
    fn test_principal_id_parse() {
        let id = PrincipalId::new();
        let parsed: PrincipalId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<PrincipalId>().is_err());
    }
}
