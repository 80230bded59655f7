//! Registration, login, and account orchestration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dishpatch_core::validation::{check_length, limits, optional_text};
use dishpatch_core::{
    AuthSettings, PrincipalId, PrincipalKind, RequiredFields, Role, SharedSecret,
    normalize_identifier,
};
use serde::Serialize;
use tracing::{debug, info};

use super::AuthError;
use super::approval::{ApprovalCommand, ApprovalDecision, ApprovalState};
use super::authorize::{ADMINISTRATORS, authorize};
use super::messages::INVALID_CREDENTIALS;
use super::password::PasswordHasher;
use super::principal::{
    LoginForm, PasswordChangeForm, PrincipalRecord, PublicPrincipal, RegistrationForm,
};
use super::store::{CredentialStore, StoreError, UniqueField};
use super::token::{AuthContext, TokenIssuer, TokenVerifier};

/// Successful registration or login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOutcome {
    /// Signed claims token.
    pub token: String,
    /// When the token stops verifying.
    pub expires_at: DateTime<Utc>,
    /// The principal, without its digest.
    pub principal: PublicPrincipal,
}

/// Composes store, hasher, issuer, and verifier.
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    issuer: TokenIssuer,
    verifier: TokenVerifier,
}

impl AuthService {
    /// Create a service. Issuer and verifier share `secret`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        secret: &SharedSecret,
        settings: &AuthSettings,
    ) -> Self {
        Self {
            issuer: TokenIssuer::new(secret, settings),
            verifier: TokenVerifier::new(secret, Arc::clone(&store)),
            store,
            hasher,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// The token verifier.
    #[must_use]
    pub const fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Register a principal of `kind` with that kind's role.
    ///
    /// The token is issued immediately, even for restaurant operators still
    /// awaiting approval.
    ///
    /// # Errors
    ///
    /// - `Validation` for missing or malformed fields (nothing is read or written)
    /// - `Conflict` for a taken email, or a taken business license
    /// - `Internal` for hashing or store faults
    pub async fn register(
        &self,
        kind: PrincipalKind,
        form: RegistrationForm,
    ) -> Result<AuthOutcome, AuthError> {
        self.enroll(kind, kind.default_role(), form).await
    }

    /// Create an administrator out of band, optionally as `super-admin`.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::register`].
    pub async fn bootstrap_admin(
        &self,
        form: RegistrationForm,
        super_admin: bool,
    ) -> Result<AuthOutcome, AuthError> {
        let role = if super_admin {
            Role::SuperAdmin
        } else {
            Role::Admin
        };
        self.enroll(PrincipalKind::Admin, role, form).await
    }

    async fn enroll(
        &self,
        kind: PrincipalKind,
        role: Role,
        form: RegistrationForm,
    ) -> Result<AuthOutcome, AuthError> {
        let registration = form.validate(kind)?;

        if self
            .store
            .find_by_identifier(kind, &registration.identifier)
            .await?
            .is_some()
        {
            return Err(StoreError::Duplicate(UniqueField::Identifier).into());
        }
        if let Some(license) = registration.business_license() {
            if self.store.find_by_license(license).await?.is_some() {
                return Err(StoreError::Duplicate(UniqueField::BusinessLicense).into());
            }
        }

        let digest = self.hasher.hash(&registration.password).await?;
        let record = registration.into_record(role, digest, Utc::now());

        // The store's own constraint decides races the lookups above missed.
        self.store.create(&record).await?;

        info!(principal = %record.id, kind = %kind, role = %role, "Registered principal");
        self.outcome(&record)
    }

    /// Log in to the `kind` collection.
    ///
    /// A restaurant operator who is not approved is refused before the
    /// password is looked at.
    ///
    /// # Errors
    ///
    /// - `Validation` if email or password is missing
    /// - `Authentication("invalid credentials")` for an unknown email or wrong password
    /// - `Authorization` for an operator who is pending or rejected
    /// - `Internal` for hashing or store faults
    pub async fn login(
        &self,
        kind: PrincipalKind,
        form: LoginForm,
    ) -> Result<AuthOutcome, AuthError> {
        self.login_among(&[kind], form).await
    }

    /// Log in to the first of `kinds` whose collection holds the email.
    ///
    /// Collections are searched in the order given and the search stops at
    /// the first match, so an email registered in two collections always
    /// resolves to the earlier one.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::login`]. A miss in every collection is
    /// `Authentication("invalid credentials")`.
    pub async fn login_among(
        &self,
        kinds: &[PrincipalKind],
        form: LoginForm,
    ) -> Result<AuthOutcome, AuthError> {
        let mut required = RequiredFields::new();
        let email = required.text("email", form.email);
        let password = required.secret("password", form.password);
        required.finish()?;

        let identifier = normalize_identifier(&email);
        let mut found = None;
        for &kind in kinds {
            if let Some(record) = self.store.find_by_identifier(kind, &identifier).await? {
                found = Some(record);
                break;
            }
        }
        let Some(record) = found else {
            debug!(kinds = ?kinds, "Login for unknown identifier");
            return Err(AuthError::Authentication(INVALID_CREDENTIALS));
        };

        if let Some(reason) = record.approval().and_then(|a| a.login_block()) {
            debug!(principal = %record.id, reason, "Login blocked by approval state");
            return Err(AuthError::Authorization(reason));
        }

        if !self
            .hasher
            .verify(Some(&password), &record.credential_digest)
            .await?
        {
            debug!(principal = %record.id, "Login with wrong password");
            return Err(AuthError::Authentication(INVALID_CREDENTIALS));
        }

        info!(principal = %record.id, role = %record.role, "Logged in");
        self.outcome(&record)
    }

    /// Authenticate an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Authentication` on any verification failure.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<AuthContext, AuthError> {
        self.verifier.authenticate(header).await
    }

    /// Approve a pending restaurant operator.
    ///
    /// # Errors
    ///
    /// - `Authorization` unless `actor` is an administrator
    /// - `NotFound` for an unknown operator
    /// - `Conflict` if the operator was already decided
    pub async fn approve_operator(
        &self,
        actor: &AuthContext,
        operator: PrincipalId,
    ) -> Result<PublicPrincipal, AuthError> {
        self.decide(actor, operator, ApprovalDecision::Approve).await
    }

    /// Reject a pending restaurant operator.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::approve_operator`], plus `Validation` for an
    /// oversized reason.
    pub async fn reject_operator(
        &self,
        actor: &AuthContext,
        operator: PrincipalId,
        reason: Option<String>,
    ) -> Result<PublicPrincipal, AuthError> {
        let reason = optional_text(reason);
        if let Some(reason) = &reason {
            check_length("reason", reason, limits::MAX_TEXT_LENGTH)?;
        }
        self.decide(actor, operator, ApprovalDecision::Reject { reason })
            .await
    }

    async fn decide(
        &self,
        actor: &AuthContext,
        operator: PrincipalId,
        decision: ApprovalDecision,
    ) -> Result<PublicPrincipal, AuthError> {
        authorize(actor.role, ADMINISTRATORS)?;

        let command = ApprovalCommand {
            decision,
            actor: actor.clone(),
            at: Utc::now(),
        };

        let record = self
            .store
            .update_approval(operator, &command)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => {
                    AuthError::NotFound(format!("restaurant operator {operator} not found"))
                }
                other => other.into(),
            })?;

        info!(
            operator = %operator,
            actor = %actor.principal_id,
            decision = ?command.decision,
            "Decided restaurant operator approval"
        );
        Ok(record.to_public())
    }

    /// Restaurant operators awaiting a decision.
    ///
    /// # Errors
    ///
    /// Returns `Authorization` unless `actor` is an administrator.
    pub async fn pending_operators(
        &self,
        actor: &AuthContext,
    ) -> Result<Vec<PublicPrincipal>, AuthError> {
        self.operators(actor, Some(ApprovalState::Pending)).await
    }

    /// Restaurant operators, optionally filtered by approval state, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `Authorization` unless `actor` is an administrator.
    pub async fn operators(
        &self,
        actor: &AuthContext,
        state: Option<ApprovalState>,
    ) -> Result<Vec<PublicPrincipal>, AuthError> {
        authorize(actor.role, ADMINISTRATORS)?;

        let mut records = self.store.list(PrincipalKind::RestaurantOperator).await?;
        records.retain(|r| state.is_none_or(|s| r.approval().is_some_and(|a| a.state == s)));
        records.sort_by_key(|r| r.created_at);

        Ok(records.iter().map(PrincipalRecord::to_public).collect())
    }

    /// The caller's own record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the principal disappeared after authentication.
    pub async fn profile(&self, actor: &AuthContext) -> Result<PublicPrincipal, AuthError> {
        self.find_actor(actor).await.map(|r| r.to_public())
    }

    /// Change the caller's password.
    ///
    /// Only the digest is rewritten. Tokens issued earlier stay valid until
    /// they expire.
    ///
    /// # Errors
    ///
    /// - `Validation` if either password is missing or the new one is oversized
    /// - `Authentication("invalid credentials")` if the current password is wrong
    /// - `Internal` for hashing or store faults
    pub async fn change_credential(
        &self,
        actor: &AuthContext,
        form: PasswordChangeForm,
    ) -> Result<(), AuthError> {
        let mut required = RequiredFields::new();
        let current = required.secret("currentPassword", form.current_password);
        let new = required.secret("newPassword", form.new_password);
        required.finish()?;
        check_length("newPassword", new.expose(), limits::MAX_PASSWORD_LENGTH)?;

        let record = self.find_actor(actor).await?;
        if !self
            .hasher
            .verify(Some(&current), &record.credential_digest)
            .await?
        {
            return Err(AuthError::Authentication(INVALID_CREDENTIALS));
        }

        let digest = self.hasher.hash(&new).await?;
        self.store
            .set_credential_digest(record.kind(), record.id, &digest)
            .await?;

        info!(principal = %record.id, "Changed password");
        Ok(())
    }

    async fn find_actor(&self, actor: &AuthContext) -> Result<PrincipalRecord, AuthError> {
        self.store
            .find_by_id(actor.role.kind(), actor.principal_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("principal not found".to_string()))
    }

    fn outcome(&self, record: &PrincipalRecord) -> Result<AuthOutcome, AuthError> {
        let issued = self.issuer.issue(record.id, record.role)?;
        Ok(AuthOutcome {
            token: issued.token,
            expires_at: issued.expires_at,
            principal: record.to_public(),
        })
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::auth::messages::{APPROVAL_REJECTED, FORBIDDEN, PENDING_APPROVAL};
    use crate::auth::password::{Argon2Hasher, HashError};
    use crate::auth::principal::Profile;
    use crate::auth::store::SledCredentialStore;
    use async_trait::async_trait;
    use dishpatch_core::{Password, ValidationError};
    use tempfile::TempDir;

    const SECRET: &str = "service-test-secret-0123456789abcdef";

    /// Counts verifications so tests can prove the hasher was never asked.
    struct CountingHasher {
        inner: Argon2Hasher,
        verifications: AtomicUsize,
    }

    #[async_trait]
    impl PasswordHasher for CountingHasher {
        async fn hash(&self, plaintext: &Password) -> Result<String, HashError> {
            self.inner.hash(plaintext).await
        }

        async fn verify(
            &self,
            candidate: Option<&Password>,
            digest: &str,
        ) -> Result<bool, HashError> {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(candidate, digest).await
        }
    }

    struct Fixture {
        _dir: TempDir,
        hasher: Arc<CountingHasher>,
        service: AuthService,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SledCredentialStore::open(dir.path()).unwrap());
        let hasher = Arc::new(CountingHasher {
            inner: Argon2Hasher::new(1).unwrap(),
            verifications: AtomicUsize::new(0),
        });
        let settings = AuthSettings::builder().shared_secret(SECRET).build();
        let service = AuthService::new(
            store,
            Arc::clone(&hasher) as Arc<dyn PasswordHasher>,
            &SharedSecret::from(SECRET),
            &settings,
        );
        Fixture {
            _dir: dir,
            hasher,
            service,
        }
    }

    fn form(json: serde_json::Value) -> RegistrationForm {
        serde_json::from_value(json).unwrap()
    }

    fn login_form(email: &str, password: &str) -> LoginForm {
        LoginForm {
            email: Some(email.to_string()),
            password: Some(Password::from(password)),
            principal_type: None,
        }
    }

    fn operator_form(email: &str, license: &str) -> RegistrationForm {
        form(serde_json::json!({
            "email": email,
            "password": "op-pass",
            "name": "Olu",
            "restaurantName": "Jollof House",
            "businessLicense": license,
        }))
    }

    async fn admin(service: &AuthService) -> AuthContext {
        let outcome = service
            .register(
                PrincipalKind::Admin,
                form(serde_json::json!({ "email": "root@x.com", "password": "root", "name": "Root" })),
            )
            .await
            .unwrap();
        AuthContext {
            principal_id: outcome.principal.id,
            role: outcome.principal.role,
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let f = fixture();
        let registered = f
            .service
            .register(
                PrincipalKind::Customer,
                form(serde_json::json!({ "identifier": "A@X.com", "password": "p1" })),
            )
            .await
            .unwrap();
        assert_eq!(registered.principal.email, "a@x.com");
        assert_eq!(registered.principal.role, Role::Customer);

        let outcome = f
            .service
            .login(PrincipalKind::Customer, login_form(" a@x.COM", "p1"))
            .await
            .unwrap();
        assert_eq!(outcome.principal.id, registered.principal.id);

        let header = format!("Bearer {}", outcome.token);
        let context = f.service.authenticate(Some(&header)).await.unwrap();
        assert_eq!(context.principal_id, registered.principal.id);
        assert_eq!(context.role, Role::Customer);
    }

    #[tokio::test]
    async fn test_duplicate_identifier_regardless_of_case() {
        let f = fixture();
        f.service
            .register(
                PrincipalKind::Customer,
                form(serde_json::json!({ "email": "a@x.com", "password": "p1" })),
            )
            .await
            .unwrap();

        let err = f
            .service
            .register(
                PrincipalKind::Customer,
                form(serde_json::json!({ "email": "A@X.COM", "password": "p2" })),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(ref m) if m == "email already registered"));
    }

    #[tokio::test]
    async fn test_duplicate_license() {
        let f = fixture();
        f.service
            .register(PrincipalKind::RestaurantOperator, operator_form("a@x.com", "LIC-1"))
            .await
            .unwrap();

        let err = f
            .service
            .register(PrincipalKind::RestaurantOperator, operator_form("b@x.com", "LIC-1"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, AuthError::Conflict(ref m) if m == "business license already registered")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations() {
        let f = fixture();
        let service = Arc::new(f.service);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .register(
                            PrincipalKind::Customer,
                            form(serde_json::json!({ "email": "race@x.com", "password": "p1" })),
                        )
                        .await
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AuthError::Conflict(_)))));
    }

    #[tokio::test]
    async fn test_missing_fields_touch_nothing() {
        let f = fixture();
        let err = f
            .service
            .register(
                PrincipalKind::Customer,
                form(serde_json::json!({ "email": "a@x.com", "password": "" })),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Validation(ValidationError::Missing(ref fields)) if fields == &["password"]
        ));
        assert!(f
            .service
            .store()
            .list(PrincipalKind::Customer)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_identifier_look_alike() {
        let f = fixture();
        f.service
            .register(
                PrincipalKind::Customer,
                form(serde_json::json!({ "email": "a@x.com", "password": "p1" })),
            )
            .await
            .unwrap();

        let wrong = f
            .service
            .login(PrincipalKind::Customer, login_form("a@x.com", "wrong"))
            .await
            .unwrap_err();
        let unknown = f
            .service
            .login(PrincipalKind::Customer, login_form("b@x.com", "p1"))
            .await
            .unwrap_err();

        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.code(), unknown.code());
        assert!(matches!(wrong, AuthError::Authentication(INVALID_CREDENTIALS)));
    }

    #[tokio::test]
    async fn test_login_is_per_collection() {
        let f = fixture();
        f.service
            .register(
                PrincipalKind::Customer,
                form(serde_json::json!({ "email": "a@x.com", "password": "p1" })),
            )
            .await
            .unwrap();

        let err = f
            .service
            .login(PrincipalKind::DeliveryPersonnel, login_form("a@x.com", "p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authentication(INVALID_CREDENTIALS)));
    }

    #[tokio::test]
    async fn test_login_requires_both_fields() {
        let f = fixture();
        let err = f
            .service
            .login(PrincipalKind::Customer, LoginForm::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Validation(ValidationError::Missing(ref fields))
                if fields == &["email", "password"]
        ));
    }

    #[tokio::test]
    async fn test_pending_operator_never_reaches_hasher() {
        let f = fixture();
        let registered = f
            .service
            .register(PrincipalKind::RestaurantOperator, operator_form("op@x.com", "LIC-1"))
            .await
            .unwrap();
        assert!(!registered.token.is_empty());

        let before = f.hasher.verifications.load(Ordering::SeqCst);
        let err = f
            .service
            .login(PrincipalKind::RestaurantOperator, login_form("op@x.com", "op-pass"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Authorization(PENDING_APPROVAL)));
        assert_eq!(f.hasher.verifications.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_approval_unlocks_login() {
        let f = fixture();
        let admin = admin(&f.service).await;
        let operator = f
            .service
            .register(PrincipalKind::RestaurantOperator, operator_form("op@x.com", "LIC-1"))
            .await
            .unwrap()
            .principal;

        assert_eq!(f.service.pending_operators(&admin).await.unwrap().len(), 1);

        let approved = f.service.approve_operator(&admin, operator.id).await.unwrap();
        let Profile::RestaurantOperator { approval, .. } = approved.profile else {
            panic!("expected operator profile");
        };
        assert_eq!(approval.state, ApprovalState::Approved);
        assert_eq!(approval.approved_by, Some(admin.principal_id));

        let outcome = f
            .service
            .login(PrincipalKind::RestaurantOperator, login_form("op@x.com", "op-pass"))
            .await
            .unwrap();
        let claims = f.service.verifier().decode(&outcome.token).unwrap();
        assert_eq!(claims.role, Role::RestaurantOperator);

        assert!(f.service.pending_operators(&admin).await.unwrap().is_empty());

        let err = f
            .service
            .approve_operator(&admin, operator.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rejection_blocks_login() {
        let f = fixture();
        let admin = admin(&f.service).await;
        let operator = f
            .service
            .register(PrincipalKind::RestaurantOperator, operator_form("op@x.com", "LIC-1"))
            .await
            .unwrap()
            .principal;

        f.service
            .reject_operator(&admin, operator.id, Some(" expired license ".to_string()))
            .await
            .unwrap();

        let err = f
            .service
            .login(PrincipalKind::RestaurantOperator, login_form("op@x.com", "op-pass"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authorization(APPROVAL_REJECTED)));

        let rejected = f
            .service
            .operators(&admin, Some(ApprovalState::Rejected))
            .await
            .unwrap();
        assert_eq!(rejected.len(), 1);
    }

    #[tokio::test]
    async fn test_only_administrators_decide() {
        let f = fixture();
        let operator = f
            .service
            .register(PrincipalKind::RestaurantOperator, operator_form("op@x.com", "LIC-1"))
            .await
            .unwrap()
            .principal;
        let actor = AuthContext {
            principal_id: operator.id,
            role: Role::RestaurantOperator,
        };

        let err = f
            .service
            .approve_operator(&actor, operator.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authorization(FORBIDDEN)));
        assert!(f.service.pending_operators(&actor).await.is_err());
    }

    #[tokio::test]
    async fn test_approve_unknown_operator() {
        let f = fixture();
        let admin = admin(&f.service).await;
        let err = f
            .service
            .approve_operator(&admin, PrincipalId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_bootstrap_super_admin() {
        let f = fixture();
        let outcome = f
            .service
            .bootstrap_admin(
                form(serde_json::json!({ "email": "boss@x.com", "password": "pw", "name": "Boss" })),
                true,
            )
            .await
            .unwrap();
        assert_eq!(outcome.principal.role, Role::SuperAdmin);

        let login = f
            .service
            .login(PrincipalKind::Admin, login_form("boss@x.com", "pw"))
            .await
            .unwrap();
        assert_eq!(login.principal.role, Role::SuperAdmin);
    }

    #[tokio::test]
    async fn test_change_credential() {
        let f = fixture();
        let outcome = f
            .service
            .register(
                PrincipalKind::Customer,
                form(serde_json::json!({ "email": "a@x.com", "password": "old" })),
            )
            .await
            .unwrap();
        let actor = AuthContext {
            principal_id: outcome.principal.id,
            role: Role::Customer,
        };

        let err = f
            .service
            .change_credential(
                &actor,
                PasswordChangeForm {
                    current_password: Some(Password::from("nope")),
                    new_password: Some(Password::from("new")),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authentication(INVALID_CREDENTIALS)));

        f.service
            .change_credential(
                &actor,
                PasswordChangeForm {
                    current_password: Some(Password::from("old")),
                    new_password: Some(Password::from("new")),
                },
            )
            .await
            .unwrap();

        assert!(f
            .service
            .login(PrincipalKind::Customer, login_form("a@x.com", "old"))
            .await
            .is_err());
        f.service
            .login(PrincipalKind::Customer, login_form("a@x.com", "new"))
            .await
            .unwrap();

        // Tokens issued before the change keep working.
        let header = format!("Bearer {}", outcome.token);
        assert!(f.service.authenticate(Some(&header)).await.is_ok());
    }

    #[tokio::test]
    async fn test_profile() {
        let f = fixture();
        let admin = admin(&f.service).await;
        let profile = f.service.profile(&admin).await.unwrap();
        assert_eq!(profile.email, "root@x.com");
        assert_eq!(profile.name.as_deref(), Some("Root"));

        let ghost = AuthContext {
            principal_id: PrincipalId::new(),
            role: Role::Customer,
        };
        assert!(matches!(
            f.service.profile(&ghost).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_login_among_searches_in_order() {
        let f = fixture();
        f.service
            .register(
                PrincipalKind::Customer,
                form(serde_json::json!({ "email": "a@x.com", "password": "as-customer" })),
            )
            .await
            .unwrap();
        f.service
            .register(
                PrincipalKind::DeliveryPersonnel,
                form(serde_json::json!({
                    "email": "a@x.com",
                    "password": "as-courier",
                    "name": "Ade",
                    "vehicleType": "bike",
                })),
            )
            .await
            .unwrap();

        let outcome = f
            .service
            .login_among(&PrincipalKind::ALL, login_form("a@x.com", "as-customer"))
            .await
            .unwrap();
        assert_eq!(outcome.principal.role, Role::Customer);

        // The first match decides; the courier password is not tried.
        let err = f
            .service
            .login_among(&PrincipalKind::ALL, login_form("a@x.com", "as-courier"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authentication(INVALID_CREDENTIALS)));

        let outcome = f
            .service
            .login_among(
                &[PrincipalKind::DeliveryPersonnel, PrincipalKind::Customer],
                login_form("a@x.com", "as-courier"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.principal.role, Role::DeliveryPersonnel);
    }

    #[tokio::test]
    async fn test_login_among_miss_everywhere() {
        let f = fixture();
        let err = f
            .service
            .login_among(&PrincipalKind::ALL, login_form("nobody@x.com", "p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authentication(INVALID_CREDENTIALS)));
    }
}
