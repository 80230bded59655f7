//! Principal records and the request forms that create them.

use chrono::{DateTime, Utc};
use dishpatch_core::validation::{
    RequiredFields, check_length, limits, normalize_identifier, optional_text, validate_identifier,
};
use dishpatch_core::{Password, PrincipalId, PrincipalKind, Role, ValidationError};
use serde::{Deserialize, Serialize};

use super::approval::Approval;

/// A geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

/// Attributes that only one collection carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Profile {
    /// Customer profile.
    Customer {
        /// Default delivery address.
        address: Option<String>,
    },
    /// Administrator profile.
    Admin {},
    /// Restaurant operator profile.
    RestaurantOperator {
        /// Restaurant display name.
        restaurant_name: String,
        /// Business license number. Unique across operators.
        business_license: String,
        /// Approval state.
        approval: Approval,
    },
    /// Courier profile.
    DeliveryPersonnel {
        /// Bicycle, scooter, car...
        vehicle_type: String,
        /// Plate or registration number.
        vehicle_number: Option<String>,
        /// Last reported position.
        location: Option<GeoPoint>,
        /// Whether the courier accepts new deliveries.
        available: bool,
    },
}

impl Profile {
    /// The collection this profile belongs to.
    #[must_use]
    pub const fn kind(&self) -> PrincipalKind {
        match self {
            Self::Customer { .. } => PrincipalKind::Customer,
            Self::Admin {} => PrincipalKind::Admin,
            Self::RestaurantOperator { .. } => PrincipalKind::RestaurantOperator,
            Self::DeliveryPersonnel { .. } => PrincipalKind::DeliveryPersonnel,
        }
    }
}

/// A stored principal.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalRecord {
    /// Identity. Never changes.
    pub id: PrincipalId,
    /// Normalized email, unique within the collection.
    pub identifier: String,
    /// Salted one-way digest. Never leaves the service.
    pub credential_digest: String,
    /// Role, fixed at creation.
    pub role: Role,
    /// Display name.
    pub name: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Collection-specific attributes.
    pub profile: Profile,
}

impl PrincipalRecord {
    /// Create a record with a fresh identifier.
    #[must_use]
    pub fn new(
        identifier: String,
        credential_digest: String,
        role: Role,
        name: Option<String>,
        phone: Option<String>,
        profile: Profile,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PrincipalId::new(),
            identifier,
            credential_digest,
            role,
            name,
            phone,
            created_at: now,
            updated_at: now,
            profile,
        }
    }

    /// The collection this record lives in.
    #[must_use]
    pub const fn kind(&self) -> PrincipalKind {
        self.role.kind()
    }

    /// Approval record, for restaurant operators.
    #[must_use]
    pub const fn approval(&self) -> Option<&Approval> {
        match &self.profile {
            Profile::RestaurantOperator { approval, .. } => Some(approval),
            _ => None,
        }
    }

    /// Business license, for restaurant operators.
    #[must_use]
    pub fn business_license(&self) -> Option<&str> {
        match &self.profile {
            Profile::RestaurantOperator {
                business_license, ..
            } => Some(business_license),
            _ => None,
        }
    }

    /// Sanitized projection for responses.
    #[must_use]
    pub fn to_public(&self) -> PublicPrincipal {
        PublicPrincipal {
            id: self.id,
            email: self.identifier.clone(),
            role: self.role,
            name: self.name.clone(),
            phone: self.phone.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            profile: self.profile.clone(),
        }
    }
}

impl std::fmt::Debug for PrincipalRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrincipalRecord")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("credential_digest", &"[REDACTED]")
            .field("role", &self.role)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

/// A principal as returned to callers. Has no digest field at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPrincipal {
    /// Identity.
    pub id: PrincipalId,
    /// Normalized email.
    pub email: String,
    /// Role.
    pub role: Role,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Contact phone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Collection-specific attributes.
    pub profile: Profile,
}

/// Registration request body. Which fields are required depends on the kind.
///
/// Unknown fields, including any attempt to supply a `role`, are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    /// Contact email (also accepted as `identifier`).
    #[serde(alias = "identifier")]
    pub email: Option<String>,
    /// Plaintext password.
    pub password: Option<Password>,
    /// Display name.
    pub name: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Customer delivery address.
    pub address: Option<String>,
    /// Operator restaurant name.
    pub restaurant_name: Option<String>,
    /// Operator business license.
    pub business_license: Option<String>,
    /// Courier vehicle type.
    pub vehicle_type: Option<String>,
    /// Courier vehicle number.
    pub vehicle_number: Option<String>,
    /// Courier position.
    pub location: Option<GeoPoint>,
}

/// A validated registration, ready to be hashed and stored.
#[derive(Debug)]
pub struct Registration {
    /// Normalized email.
    pub identifier: String,
    /// Plaintext password.
    pub password: Password,
    /// Display name.
    pub name: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Collection-specific attributes.
    pub profile: Profile,
}

impl RegistrationForm {
    /// Validate the form for `kind`.
    ///
    /// Every missing required field is reported at once. Customers need only
    /// `email` and `password`; the other kinds also need a `name`, plus
    /// `restaurantName` and `businessLicense` for operators and `vehicleType`
    /// for couriers.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for missing, malformed, or oversized fields.
    pub fn validate(self, kind: PrincipalKind) -> Result<Registration, ValidationError> {
        let mut required = RequiredFields::new();
        let email = required.text("email", self.email);
        let password = required.secret("password", self.password);

        let name = match kind {
            PrincipalKind::Customer => optional_text(self.name),
            _ => Some(required.text("name", self.name)),
        };

        let profile = match kind {
            PrincipalKind::Customer => Profile::Customer {
                address: optional_text(self.address),
            },
            PrincipalKind::Admin => Profile::Admin {},
            PrincipalKind::RestaurantOperator => Profile::RestaurantOperator {
                restaurant_name: required.text("restaurantName", self.restaurant_name),
                business_license: required.text("businessLicense", self.business_license),
                approval: Approval::pending(),
            },
            PrincipalKind::DeliveryPersonnel => Profile::DeliveryPersonnel {
                vehicle_type: required.text("vehicleType", self.vehicle_type),
                vehicle_number: optional_text(self.vehicle_number),
                location: self.location,
                available: false,
            },
        };

        required.finish()?;

        let identifier = normalize_identifier(&email);
        validate_identifier(&identifier)?;
        check_length("password", password.expose(), limits::MAX_PASSWORD_LENGTH)?;

        let phone = optional_text(self.phone);
        for (field, value) in [("name", name.as_deref()), ("phone", phone.as_deref())] {
            check_length(field, value.unwrap_or_default(), limits::MAX_TEXT_LENGTH)?;
        }
        check_profile_lengths(&profile)?;

        Ok(Registration {
            identifier,
            password,
            name,
            phone,
            profile,
        })
    }
}

fn check_profile_lengths(profile: &Profile) -> Result<(), ValidationError> {
    let fields: Vec<(&'static str, &str)> = match profile {
        Profile::Customer { address } => vec![("address", address.as_deref().unwrap_or_default())],
        Profile::Admin {} => Vec::new(),
        Profile::RestaurantOperator {
            restaurant_name,
            business_license,
            ..
        } => vec![
            ("restaurantName", restaurant_name.as_str()),
            ("businessLicense", business_license.as_str()),
        ],
        Profile::DeliveryPersonnel {
            vehicle_type,
            vehicle_number,
            ..
        } => vec![
            ("vehicleType", vehicle_type.as_str()),
            ("vehicleNumber", vehicle_number.as_deref().unwrap_or_default()),
        ],
    };

    fields
        .into_iter()
        .try_for_each(|(field, value)| check_length(field, value, limits::MAX_TEXT_LENGTH))
}

impl Registration {
    /// Turn a validated registration into a record carrying `digest`.
    #[must_use]
    pub fn into_record(self, role: Role, digest: String, now: DateTime<Utc>) -> PrincipalRecord {
        PrincipalRecord::new(
            self.identifier,
            digest,
            role,
            self.name,
            self.phone,
            self.profile,
            now,
        )
    }

    /// Business license, for operator registrations.
    #[must_use]
    pub fn business_license(&self) -> Option<&str> {
        match &self.profile {
            Profile::RestaurantOperator {
                business_license, ..
            } => Some(business_license),
            _ => None,
        }
    }
}

/// Login request body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginForm {
    /// Contact email (also accepted as `identifier`).
    #[serde(alias = "identifier")]
    pub email: Option<String>,
    /// Plaintext password.
    pub password: Option<Password>,
    /// Collection to log into. Optional when the service hosts only one.
    pub principal_type: Option<String>,
}

/// Password change request body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeForm {
    /// The password in use.
    pub current_password: Option<Password>,
    /// Its replacement.
    pub new_password: Option<Password>,
}
