//! Credential storage.
//!
//! Each principal collection is its own sled tree. Records are JSON values
//! keyed by principal id; unique fields are enforced through `idx:` keys
//! written in the same transaction as the record.

use std::path::Path;

use async_trait::async_trait;
use dishpatch_core::{PrincipalId, PrincipalKind};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use thiserror::Error;

use super::approval::{ApprovalCommand, ApprovalError};
use super::principal::{PrincipalRecord, Profile};

const IDENTIFIER_INDEX: &str = "idx:identifier:";
const LICENSE_INDEX: &str = "idx:license:";
const INDEX_PREFIX: &[u8] = b"idx:";

type TxResult<T> = ConflictableTransactionResult<T, StoreError>;

/// A field that must be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    /// Email, unique within one collection.
    Identifier,
    /// Business license, unique across restaurant operators.
    BusinessLicense,
}

impl UniqueField {
    /// Conflict message shown to callers.
    #[must_use]
    pub const fn conflict_message(self) -> &'static str {
        match self {
            Self::Identifier => "email already registered",
            Self::BusinessLicense => "business license already registered",
        }
    }
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Identifier => "identifier",
            Self::BusinessLicense => "business license",
        })
    }
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique field is already taken. Nothing was written.
    #[error("duplicate {0}")]
    Duplicate(UniqueField),

    /// No such principal.
    #[error("principal not found")]
    NotFound,

    /// The approval transition was refused. Nothing was written.
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    /// The backing database failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

/// Persistence for principals, one collection per kind.
///
/// Implementations own uniqueness: `create` must reject a duplicate even when
/// a caller's earlier lookup found nothing.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up by normalized identifier within one collection.
    async fn find_by_identifier(
        &self,
        kind: PrincipalKind,
        identifier: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError>;

    /// Look up by id within one collection.
    async fn find_by_id(
        &self,
        kind: PrincipalKind,
        id: PrincipalId,
    ) -> Result<Option<PrincipalRecord>, StoreError>;

    /// Look up a restaurant operator by business license.
    async fn find_by_license(&self, license: &str) -> Result<Option<PrincipalRecord>, StoreError>;

    /// Insert a new record into the collection of its role.
    ///
    /// Fails with `StoreError::Duplicate` if the identifier, or the business
    /// license of an operator, is taken.
    async fn create(&self, record: &PrincipalRecord) -> Result<(), StoreError>;

    /// Apply an approval decision to a restaurant operator atomically and
    /// return the updated record.
    async fn update_approval(
        &self,
        operator: PrincipalId,
        command: &ApprovalCommand,
    ) -> Result<PrincipalRecord, StoreError>;

    /// Replace a principal's credential digest, touching nothing else but
    /// `updated_at`.
    async fn set_credential_digest(
        &self,
        kind: PrincipalKind,
        id: PrincipalId,
        digest: &str,
    ) -> Result<(), StoreError>;

    /// Every record in a collection.
    async fn list(&self, kind: PrincipalKind) -> Result<Vec<PrincipalRecord>, StoreError>;
}

/// Sled-backed credential store.
#[derive(Debug, Clone)]
pub struct SledCredentialStore {
    db: sled::Db,
    customers: sled::Tree,
    admins: sled::Tree,
    restaurant_operators: sled::Tree,
    delivery_personnel: sled::Tree,
}

impl SledCredentialStore {
    /// Open or create a store under `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path.join("credentials"))?;
        Self::with_db(db)
    }

    /// Open a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be created.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db)
    }

    /// Create a store on an existing database.
    ///
    /// # Errors
    ///
    /// Returns error if the trees cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            customers: db.open_tree("customers")?,
            admins: db.open_tree("admins")?,
            restaurant_operators: db.open_tree("restaurant_operators")?,
            delivery_personnel: db.open_tree("delivery_personnel")?,
            db,
        })
    }

    const fn tree(&self, kind: PrincipalKind) -> &sled::Tree {
        match kind {
            PrincipalKind::Customer => &self.customers,
            PrincipalKind::Admin => &self.admins,
            PrincipalKind::RestaurantOperator => &self.restaurant_operators,
            PrincipalKind::DeliveryPersonnel => &self.delivery_personnel,
        }
    }

    /// Number of records in a collection.
    #[must_use]
    pub fn count(&self, kind: PrincipalKind) -> usize {
        self.tree(kind)
            .iter()
            .keys()
            .filter_map(Result::ok)
            .filter(|k| !k.starts_with(INDEX_PREFIX))
            .count()
    }

    fn get_by_key(tree: &sled::Tree, key: &[u8]) -> Result<Option<PrincipalRecord>, StoreError> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_by_index(
        tree: &sled::Tree,
        index_key: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError> {
        match tree.get(index_key.as_bytes())? {
            Some(id) => Self::get_by_key(tree, &id),
            None => Ok(None),
        }
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

fn abort(err: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err)
}

fn settle<T>(result: Result<T, TransactionError<StoreError>>) -> Result<T, StoreError> {
    result.map_err(|e| match e {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => StoreError::Backend(err.to_string()),
    })
}

fn read_record(
    tx: &TransactionalTree,
    key: &[u8],
) -> TxResult<PrincipalRecord> {
    let Some(bytes) = tx.get(key)? else {
        return Err(abort(StoreError::NotFound));
    };
    serde_json::from_slice(&bytes).map_err(|e| abort(e.into()))
}

fn write_record(
    tx: &TransactionalTree,
    key: &[u8],
    record: &PrincipalRecord,
) -> TxResult<()> {
    let value = serde_json::to_vec(record).map_err(|e| abort(e.into()))?;
    tx.insert(key, value)?;
    Ok(())
}

#[async_trait]
impl CredentialStore for SledCredentialStore {
    async fn find_by_identifier(
        &self,
        kind: PrincipalKind,
        identifier: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError> {
        Self::get_by_index(self.tree(kind), &format!("{IDENTIFIER_INDEX}{identifier}"))
    }

    async fn find_by_id(
        &self,
        kind: PrincipalKind,
        id: PrincipalId,
    ) -> Result<Option<PrincipalRecord>, StoreError> {
        Self::get_by_key(self.tree(kind), id.to_string().as_bytes())
    }

    async fn find_by_license(&self, license: &str) -> Result<Option<PrincipalRecord>, StoreError> {
        Self::get_by_index(&self.restaurant_operators, &format!("{LICENSE_INDEX}{license}"))
    }

    async fn create(&self, record: &PrincipalRecord) -> Result<(), StoreError> {
        let tree = self.tree(record.kind());
        let id_key = record.id.to_string();
        let identifier_key = format!("{IDENTIFIER_INDEX}{}", record.identifier);
        let license_key = record
            .business_license()
            .map(|license| format!("{LICENSE_INDEX}{license}"));

        let insert = |tx: &TransactionalTree| -> TxResult<()> {
            if tx.get(identifier_key.as_bytes())?.is_some() {
                return Err(abort(StoreError::Duplicate(UniqueField::Identifier)));
            }
            if let Some(key) = &license_key {
                if tx.get(key.as_bytes())?.is_some() {
                    return Err(abort(StoreError::Duplicate(UniqueField::BusinessLicense)));
                }
                tx.insert(key.as_bytes(), id_key.as_bytes())?;
            }

            write_record(tx, id_key.as_bytes(), record)?;
            tx.insert(identifier_key.as_bytes(), id_key.as_bytes())?;
            Ok(())
        };
        settle(tree.transaction(insert))?;

        self.flush().await?;
        tracing::debug!(principal = %record.id, kind = %record.kind(), "Created principal");
        Ok(())
    }

    async fn update_approval(
        &self,
        operator: PrincipalId,
        command: &ApprovalCommand,
    ) -> Result<PrincipalRecord, StoreError> {
        let key = operator.to_string();

        let decide = |tx: &TransactionalTree| -> TxResult<PrincipalRecord> {
            let mut record = read_record(tx, key.as_bytes())?;
            let Profile::RestaurantOperator { approval, .. } = &mut record.profile else {
                return Err(abort(StoreError::NotFound));
            };

            approval
                .decide(command)
                .map_err(|e| abort(StoreError::Approval(e)))?;
            record.updated_at = command.at;

            write_record(tx, key.as_bytes(), &record)?;
            Ok(record)
        };
        let record = settle(self.restaurant_operators.transaction(decide))?;

        self.flush().await?;
        Ok(record)
    }

    async fn set_credential_digest(
        &self,
        kind: PrincipalKind,
        id: PrincipalId,
        digest: &str,
    ) -> Result<(), StoreError> {
        let key = id.to_string();
        let now = chrono::Utc::now();

        let replace = |tx: &TransactionalTree| -> TxResult<()> {
            let mut record = read_record(tx, key.as_bytes())?;
            digest.clone_into(&mut record.credential_digest);
            record.updated_at = now;
            write_record(tx, key.as_bytes(), &record)
        };
        settle(self.tree(kind).transaction(replace))?;

        self.flush().await
    }

    async fn list(&self, kind: PrincipalKind) -> Result<Vec<PrincipalRecord>, StoreError> {
        let mut records = Vec::new();
        for entry in self.tree(kind).iter() {
            let (key, value) = entry?;
            if key.starts_with(INDEX_PREFIX) {
                continue;
            }
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}
