// crates/tenant-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Tenant Directory
// Description: Durable TenantDirectory backed by SQLite.
// Purpose: Serve tenant lookups from a local database with strict decoding.
// Dependencies: tenant-gate-core, rusqlite, serde, thiserror, tokio
// ============================================================================

//! ## Overview
//! This module implements [`TenantDirectory`] on top of `SQLite`. Tenants live
//! in a `tenants` table keyed by id with unique slug and domain columns;
//! settings live in `tenant_settings`. Every lookup runs on the blocking pool
//! so the async resolver never stalls a runtime worker.
//! Security posture: database contents are untrusted; rows that violate
//! identifier rules surface as [`DirectoryError::Corrupt`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use tenant_gate_core::DirectoryError;
use tenant_gate_core::TenantDirectory;
use tenant_gate_core::TenantId;
use tenant_gate_core::TenantRecord;
use tenant_gate_core::TenantSettings;
use tenant_gate_core::TenantSlug;
use tenant_gate_core::normalize_host;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the directory.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum stored feature blob size in bytes.
pub const MAX_FEATURE_BLOB_BYTES: usize = 64 * 1024;
/// Maximum setting value size in bytes.
pub const MAX_SETTING_VALUE_BYTES: usize = 16 * 1024;

/// Column list shared by record lookups.
const RECORD_COLUMNS: &str = "id, slug, domain, active";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` tenant directory.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteDirectoryConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteDirectoryConfig {
    /// Returns a config for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` directory errors.
///
/// # Invariants
/// - Error messages avoid embedding raw setting values or feature blobs.
#[derive(Debug, Error, Clone)]
pub enum SqliteDirectoryError {
    /// Store I/O error.
    #[error("sqlite directory io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite directory db error: {0}")]
    Db(String),
    /// Stored row violates directory invariants.
    #[error("sqlite directory corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite directory version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid provisioning input or configuration.
    #[error("sqlite directory invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteDirectoryError> for DirectoryError {
    fn from(error: SqliteDirectoryError) -> Self {
        match error {
            SqliteDirectoryError::Io(message) | SqliteDirectoryError::Db(message) => {
                Self::Unavailable(message)
            }
            SqliteDirectoryError::Corrupt(message)
            | SqliteDirectoryError::VersionMismatch(message)
            | SqliteDirectoryError::Invalid(message) => Self::Corrupt(message),
        }
    }
}

/// Maps an engine error into a directory error.
fn db_error(err: &rusqlite::Error) -> SqliteDirectoryError {
    SqliteDirectoryError::Db(err.to_string())
}

// ============================================================================
// SECTION: Directory
// ============================================================================

/// `SQLite`-backed tenant directory.
///
/// # Invariants
/// - Stored domains are normalized on insert.
/// - `SQLite` connection access is serialized through a mutex.
/// - Lookups run on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct SqliteTenantDirectory {
    /// Shared connection.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteTenantDirectory {
    /// Opens (and initializes if needed) an `SQLite` tenant directory.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteDirectoryError`] when the database cannot be opened,
    /// initialized, or carries an unsupported schema version.
    pub fn open(config: &SqliteDirectoryConfig) -> Result<Self, SqliteDirectoryError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        debug!(path = %config.path.display(), "sqlite tenant directory opened");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Inserts or replaces a tenant record. The stored feature blob and
    /// settings are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteDirectoryError::Invalid`] when the slug or domain is
    /// already bound to another tenant.
    pub fn upsert_tenant(&self, record: &TenantRecord) -> Result<(), SqliteDirectoryError> {
        let id = id_to_sql(record.id)?;
        let domain = record.domain.as_deref().and_then(normalize_host);
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO tenants (id, slug, domain, active) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     slug = excluded.slug,
                     domain = excluded.domain,
                     active = excluded.active",
                params![id, record.slug.as_str(), domain, i64::from(record.active)],
            )
            .map_err(|err| {
                constraint_or_db(&err, "tenant slug or domain already bound to another tenant")
            })?;
        Ok(())
    }

    /// Marks a tenant active or inactive.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteDirectoryError::Invalid`] when the tenant does not exist.
    pub fn set_active(
        &self,
        tenant_id: TenantId,
        active: bool,
    ) -> Result<(), SqliteDirectoryError> {
        let id = id_to_sql(tenant_id)?;
        let guard = self.lock()?;
        let updated = guard
            .execute(
                "UPDATE tenants SET active = ?2 WHERE id = ?1",
                params![id, i64::from(active)],
            )
            .map_err(|err| db_error(&err))?;
        require_updated(updated, tenant_id)
    }

    /// Stores a single setting for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteDirectoryError::Invalid`] when the tenant does not exist
    /// or the value exceeds [`MAX_SETTING_VALUE_BYTES`].
    pub fn put_setting(
        &self,
        tenant_id: TenantId,
        key: &str,
        value: &str,
    ) -> Result<(), SqliteDirectoryError> {
        if key.is_empty() {
            return Err(SqliteDirectoryError::Invalid("setting key must be non-empty".to_string()));
        }
        if value.len() > MAX_SETTING_VALUE_BYTES {
            return Err(SqliteDirectoryError::Invalid(format!(
                "setting value exceeds size limit ({MAX_SETTING_VALUE_BYTES} bytes)"
            )));
        }
        let id = id_to_sql(tenant_id)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO tenant_settings (tenant_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(tenant_id, key) DO UPDATE SET value = excluded.value",
                params![id, key, value],
            )
            .map_err(|err| constraint_or_db(&err, "unknown tenant"))?;
        Ok(())
    }

    /// Stores or clears the raw feature blob for a tenant. The blob is kept
    /// verbatim; parsing happens on read.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteDirectoryError::Invalid`] when the tenant does not exist
    /// or the blob exceeds [`MAX_FEATURE_BLOB_BYTES`].
    pub fn put_feature_blob(
        &self,
        tenant_id: TenantId,
        blob: Option<&str>,
    ) -> Result<(), SqliteDirectoryError> {
        if blob.is_some_and(|blob| blob.len() > MAX_FEATURE_BLOB_BYTES) {
            return Err(SqliteDirectoryError::Invalid(format!(
                "feature blob exceeds size limit ({MAX_FEATURE_BLOB_BYTES} bytes)"
            )));
        }
        let id = id_to_sql(tenant_id)?;
        let guard = self.lock()?;
        let updated = guard
            .execute("UPDATE tenants SET features_json = ?2 WHERE id = ?1", params![id, blob])
            .map_err(|err| db_error(&err))?;
        require_updated(updated, tenant_id)
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteDirectoryError> {
        self.connection
            .lock()
            .map_err(|_| SqliteDirectoryError::Io("sqlite mutex poisoned".to_string()))
    }

    /// Runs a read on the blocking pool and maps failures to directory errors.
    async fn read<T, F>(&self, operation: &'static str, read: F) -> Result<T, DirectoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, SqliteDirectoryError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let joined = tokio::task::spawn_blocking(move || {
            let guard = connection
                .lock()
                .map_err(|_| SqliteDirectoryError::Io("sqlite mutex poisoned".to_string()))?;
            read(&guard)
        })
        .await;
        let result = joined.map_err(|err| {
            DirectoryError::Unavailable(format!("sqlite lookup task failed: {err}"))
        })?;
        result.map_err(|err| {
            warn!(operation, error = %err, "sqlite tenant directory lookup failed");
            DirectoryError::from(err)
        })
    }
}

#[async_trait]
impl TenantDirectory for SqliteTenantDirectory {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>, DirectoryError> {
        let Some(domain) = normalize_host(domain) else {
            return Ok(None);
        };
        self.read("find_by_domain", move |connection| {
            find_record(
                connection,
                &format!("SELECT {RECORD_COLUMNS} FROM tenants WHERE domain = ?1"),
                &domain,
            )
        })
        .await
    }

    async fn find_by_slug(
        &self,
        slug: &TenantSlug,
    ) -> Result<Option<TenantRecord>, DirectoryError> {
        let slug = slug.as_str().to_string();
        self.read("find_by_slug", move |connection| {
            find_record(
                connection,
                &format!("SELECT {RECORD_COLUMNS} FROM tenants WHERE slug = ?1"),
                &slug,
            )
        })
        .await
    }

    async fn exists_and_active(&self, tenant_id: TenantId) -> Result<bool, DirectoryError> {
        let id = id_to_sql(tenant_id)?;
        self.read("exists_and_active", move |connection| {
            let active: Option<i64> = connection
                .query_row("SELECT active FROM tenants WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|err| db_error(&err))?;
            Ok(active.is_some_and(|active| active != 0))
        })
        .await
    }

    async fn get_settings(&self, tenant_id: TenantId) -> Result<TenantSettings, DirectoryError> {
        let id = id_to_sql(tenant_id)?;
        self.read("get_settings", move |connection| {
            let mut statement = connection
                .prepare("SELECT key, value FROM tenant_settings WHERE tenant_id = ?1")
                .map_err(|err| db_error(&err))?;
            let rows = statement
                .query_map(params![id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(|err| db_error(&err))?;
            let mut values = BTreeMap::new();
            for row in rows {
                let (key, value) = row.map_err(|err| db_error(&err))?;
                values.insert(key, value);
            }
            Ok(TenantSettings::new(values))
        })
        .await
    }

    async fn get_feature_blob(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<String>, DirectoryError> {
        let id = id_to_sql(tenant_id)?;
        self.read("get_feature_blob", move |connection| {
            let blob: Option<Option<String>> = connection
                .query_row("SELECT features_json FROM tenants WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|err| db_error(&err))?;
            Ok(blob.flatten())
        })
        .await
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Raw `tenants` row before identifier validation.
struct TenantRow {
    /// Stored id.
    id: i64,
    /// Stored slug.
    slug: String,
    /// Stored domain.
    domain: Option<String>,
    /// Stored active flag.
    active: i64,
}

impl TenantRow {
    /// Validates the row into a tenant record.
    fn into_record(self) -> Result<TenantRecord, SqliteDirectoryError> {
        let id = u64::try_from(self.id)
            .ok()
            .and_then(TenantId::from_raw)
            .ok_or_else(|| SqliteDirectoryError::Corrupt(format!("invalid tenant id {}", self.id)))?;
        let slug = TenantSlug::parse(&self.slug).map_err(|err| {
            SqliteDirectoryError::Corrupt(format!("tenant {id} has invalid slug: {err}"))
        })?;
        Ok(TenantRecord {
            id,
            slug,
            domain: self.domain,
            active: self.active != 0,
        })
    }
}

/// Runs a single-row record lookup.
fn find_record(
    connection: &Connection,
    sql: &str,
    key: &str,
) -> Result<Option<TenantRecord>, SqliteDirectoryError> {
    let row = connection
        .query_row(sql, params![key], |row| {
            Ok(TenantRow {
                id: row.get(0)?,
                slug: row.get(1)?,
                domain: row.get(2)?,
                active: row.get(3)?,
            })
        })
        .optional()
        .map_err(|err| db_error(&err))?;
    row.map(TenantRow::into_record).transpose()
}

/// Converts a tenant id into its `SQLite` integer form.
fn id_to_sql(tenant_id: TenantId) -> Result<i64, SqliteDirectoryError> {
    i64::try_from(tenant_id.get()).map_err(|_| {
        SqliteDirectoryError::Invalid(format!("tenant id {tenant_id} exceeds sqlite range"))
    })
}

/// Fails when an update matched no tenant row.
fn require_updated(updated: usize, tenant_id: TenantId) -> Result<(), SqliteDirectoryError> {
    if updated == 0 {
        return Err(SqliteDirectoryError::Invalid(format!("unknown tenant {tenant_id}")));
    }
    Ok(())
}

/// Maps constraint violations to [`SqliteDirectoryError::Invalid`].
fn constraint_or_db(err: &rusqlite::Error, message: &str) -> SqliteDirectoryError {
    if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
        SqliteDirectoryError::Invalid(message.to_string())
    } else {
        db_error(err)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteDirectoryError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteDirectoryError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteDirectoryError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteDirectoryError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteDirectoryError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteDirectoryError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteDirectoryError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteDirectoryError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteDirectoryConfig) -> Result<Connection, SqliteDirectoryError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteDirectoryConfig,
) -> Result<(), SqliteDirectoryError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteDirectoryError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS tenants (
                    id INTEGER PRIMARY KEY CHECK (id > 0),
                    slug TEXT NOT NULL UNIQUE,
                    domain TEXT UNIQUE,
                    active INTEGER NOT NULL,
                    features_json TEXT
                );
                CREATE TABLE IF NOT EXISTS tenant_settings (
                    tenant_id INTEGER NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (tenant_id, key),
                    FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE
                );",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteDirectoryError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}
