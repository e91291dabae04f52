//! Lifecycle hooks.
//!
//! Hooks are registered per entity type with a typed callback. The execution
//! engine works on records, so each callback is stored behind a wrapper that
//! materialises the entity from the record, runs the callback and writes the
//! entity's column values back.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use relmodel_core::{Entity, Error, Record, Result};

/// Lifecycle points a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Before an INSERT (including inserts made by `save`).
    BeforeCreate,
    /// Before the UPDATE branch of `save`.
    BeforeUpdate,
    /// After a successful INSERT.
    AfterCreate,
}

type RecordHook = Arc<dyn Fn(&mut Record) -> Result<()> + Send + Sync>;

/// Registered callbacks keyed by entity name and lifecycle point.
#[derive(Default, Clone)]
pub struct Hooks {
    callbacks: HashMap<(&'static str, HookKind), Vec<RecordHook>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self
            .callbacks
            .iter()
            .map(|((entity, kind), list)| format!("{entity}:{kind:?}x{}", list.len()))
            .collect();
        keys.sort();
        f.debug_struct("Hooks").field("callbacks", &keys).finish()
    }
}

impl Hooks {
    pub(crate) fn add<E, F>(&mut self, kind: HookKind, f: F)
    where
        E: Entity,
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        let wrapped: RecordHook = Arc::new(move |record: &mut Record| {
            let mut entity = E::from_record(record)?;
            f(&mut entity)?;
            record.merge_values(entity.to_record().values);
            Ok(())
        });
        self.callbacks
            .entry((E::NAME, kind))
            .or_default()
            .push(wrapped);
    }

    /// Whether any callback is registered for `entity` at `kind`.
    pub fn has(&self, entity: &str, kind: HookKind) -> bool {
        self.callbacks
            .iter()
            .any(|((name, k), list)| *name == entity && *k == kind && !list.is_empty())
    }

    /// Run the callbacks for `entity` at `kind` in registration order.
    ///
    /// The first failure stops the chain and is reported as `Error::Hook`.
    pub fn run(&self, entity: &str, kind: HookKind, record: &mut Record) -> Result<()> {
        let Some(list) = self
            .callbacks
            .iter()
            .find(|((name, k), _)| *name == entity && *k == kind)
            .map(|(_, list)| list)
        else {
            return Ok(());
        };
        for hook in list {
            tracing::trace!(entity, ?kind, "Running hook");
            hook(record).map_err(|e| match e {
                Error::Hook(_) => e,
                other => Error::Hook(format!("{entity} {kind:?}: {other}")),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmodel_core::{EntityDef, FieldInfo, FromRecord};

    #[derive(Debug, Default)]
    struct Log {
        id: String,
        action: String,
    }

    impl FromRecord for Log {
        fn from_record(record: &Record) -> Result<Self> {
            Ok(Self {
                id: record.get_or_default("id")?,
                action: record.get_or_default("action")?,
            })
        }
    }

    impl Entity for Log {
        const NAME: &'static str = "Log";

        fn definition() -> EntityDef {
            EntityDef::new("Log", "logs")
                .field(FieldInfo::new("id", "id").primary_key(true))
                .field(FieldInfo::new("action", "action"))
        }

        fn to_record(&self) -> Record {
            let mut record = Record::new();
            record.set("id", self.id.clone());
            record.set("action", self.action.clone());
            record
        }

        fn apply_record(&mut self, record: &Record) -> Result<()> {
            *self = Self::from_record(record)?;
            Ok(())
        }
    }

    #[test]
    fn test_hook_writes_back_into_record() {
        let mut hooks = Hooks::default();
        hooks.add::<Log, _>(HookKind::BeforeCreate, |log| {
            if log.id.is_empty() {
                log.id = "generated".to_string();
            }
            Ok(())
        });

        let mut record = Log::default().to_record();
        hooks.run("Log", HookKind::BeforeCreate, &mut record).unwrap();
        assert_eq!(record.get_named::<String>("id").unwrap(), "generated");
        assert!(hooks.has("Log", HookKind::BeforeCreate));
        assert!(!hooks.has("Log", HookKind::AfterCreate));
    }

    #[test]
    fn test_hook_failure_is_hook_error() {
        let mut hooks = Hooks::default();
        hooks.add::<Log, _>(HookKind::BeforeUpdate, |_| {
            Err(Error::Custom("nope".to_string()))
        });
        let mut record = Log::default().to_record();
        let err = hooks
            .run("Log", HookKind::BeforeUpdate, &mut record)
            .unwrap_err();
        assert!(matches!(err, Error::Hook(msg) if msg.contains("nope")));
    }
}
