//! Fluent construction of a [`Database`].
//!
//! ```rust,ignore
//! use relmodel::prelude::*;
//!
//! let db = DatabaseBuilder::new()
//!     .register::<User>()?
//!     .register::<Address>()?
//!     .before_create::<User, _>(|u| {
//!         u.id = uuid();
//!         Ok(())
//!     })
//!     .max_open(4)
//!     .open_sqlite("app.db")?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use relmodel_core::{Connection, Entity, Result};
use relmodel_pool::PoolConfig;
use relmodel_query::Dialect;
use relmodel_schema::Registry;
use relmodel_session::{Database, DatabaseConfig};

/// Builder collecting entities, hooks and configuration for a [`Database`].
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    registry: Registry,
    config: DatabaseConfig,
}

impl DatabaseBuilder {
    /// Builder with an empty registry and the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type.
    pub fn register<E: Entity>(mut self) -> Result<Self> {
        self.registry.register::<E>()?;
        Ok(self)
    }

    /// Replace the registry wholesale.
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Register a before-create hook.
    #[must_use]
    pub fn before_create<E, F>(mut self, f: F) -> Self
    where
        E: Entity,
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        self.registry.before_create::<E, F>(f);
        self
    }

    /// Register a before-update hook.
    #[must_use]
    pub fn before_update<E, F>(mut self, f: F) -> Self
    where
        E: Entity,
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        self.registry.before_update::<E, F>(f);
        self
    }

    /// Register an after-create hook.
    #[must_use]
    pub fn after_create<E, F>(mut self, f: F) -> Self
    where
        E: Entity,
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        self.registry.after_create::<E, F>(f);
        self
    }

    /// Use a whole configuration, e.g. one loaded with
    /// [`DatabaseConfig::from_json_file`].
    #[must_use]
    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    /// SQL dialect.
    #[must_use]
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.config = self.config.dialect(dialect);
        self
    }

    /// Pool configuration.
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config = self.config.pool(pool);
        self
    }

    /// Maximum number of open connections.
    #[must_use]
    pub fn max_open(mut self, n: usize) -> Self {
        let pool = self.config.pool.clone().max_open(n);
        self.config = self.config.pool(pool);
        self
    }

    /// How long an acquire waits on an exhausted pool.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        let pool = self.config.pool.clone().acquire_timeout(timeout);
        self.config = self.config.pool(pool);
        self
    }

    /// Run writes without the implicit transaction.
    #[must_use]
    pub fn skip_default_transaction(mut self) -> Self {
        self.config = self.config.skip_default_transaction(true);
        self
    }

    /// Record every issued statement in the tracker.
    #[must_use]
    pub fn track_statements(mut self) -> Self {
        self.config = self.config.track_statements(true);
        self
    }

    /// Statements at or above `threshold` are logged as slow.
    #[must_use]
    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.config = self.config.slow_threshold(threshold);
        self
    }

    /// Build the database over connections made by `factory`.
    pub fn build_with<C, F>(self, factory: F) -> Result<Database<C>>
    where
        C: Connection,
        F: Fn() -> Result<C> + Send + Sync + 'static,
    {
        Database::connect(self.config, Arc::new(self.registry), factory)
    }

    /// Build a SQLite database stored at `path`.
    #[cfg(feature = "sqlite")]
    pub fn open_sqlite(
        self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<Database<relmodel_sqlite::SqliteConnection>> {
        let path = path.as_ref().to_path_buf();
        tracing::debug!(path = %path.display(), "Building SQLite database");
        self.build_with(move || relmodel_sqlite::SqliteConnection::open(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmodel_core::{EntityDef, FieldInfo, Error, FromRecord, Record};

    #[derive(Debug, Default)]
    struct Note {
        id: i64,
    }

    impl FromRecord for Note {
        fn from_record(record: &Record) -> Result<Self> {
            Ok(Self {
                id: record.get_or_default("id")?,
            })
        }
    }

    impl Entity for Note {
        const NAME: &'static str = "Note";

        fn definition() -> EntityDef {
            EntityDef::new("Note", "notes")
                .field(FieldInfo::new("id", "id").primary_key(true).auto_increment(true))
        }

        fn to_record(&self) -> Record {
            let mut record = Record::new();
            record.set("id", self.id);
            record
        }

        fn apply_record(&mut self, record: &Record) -> Result<()> {
            self.id = record.get_or_default("id")?;
            Ok(())
        }
    }

    #[test]
    fn test_builder_collects_configuration() {
        let builder = DatabaseBuilder::new()
            .max_open(3)
            .acquire_timeout(Duration::from_millis(50))
            .skip_default_transaction()
            .track_statements();
        assert_eq!(builder.config.pool.max_open, 3);
        assert_eq!(builder.config.pool.acquire_timeout, Duration::from_millis(50));
        assert!(builder.config.skip_default_transaction);
        assert!(builder.config.track_statements);
    }

    #[test]
    fn test_register_twice_fails() {
        let err = DatabaseBuilder::new()
            .register::<Note>()
            .unwrap()
            .register::<Note>()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEntity(ref name) if name == "Note"));
    }

    #[test]
    fn test_open_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseBuilder::new()
            .register::<Note>()
            .unwrap()
            .open_sqlite(dir.path().join("builder.db"))
            .unwrap();
        db.ping().unwrap();
        assert_eq!(db.registry().entity_names(), &["Note"]);
    }
}
