//! The schema registry.
//!
//! Entity definitions are registered once at startup, validated, and then
//! shared immutably (behind an `Arc`) by every query and session. Relationship
//! keys left implicit in a declaration are resolved here by convention.

use std::collections::HashMap;
use std::sync::Arc;

use relmodel_core::{
    Entity, EntityDef, Error, RelationshipInfo, RelationshipKind, Result, to_snake_case,
};

use crate::hooks::{HookKind, Hooks};

/// Join table columns of a resolved many-to-many relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    /// Join table name.
    pub table: String,
    /// Join column matching the source key.
    pub source_column: String,
    /// Join column matching the target key.
    pub target_column: String,
}

/// A relationship with every key resolved.
///
/// Rows of `source` and `target` are related when
/// `source.source_key == target.target_key`; for many-to-many the match goes
/// through the join table (`source.source_key == join.source_column` and
/// `join.target_column == target.target_key`).
#[derive(Debug, Clone)]
pub struct ResolvedRelation {
    /// Relationship (field) name.
    pub name: &'static str,
    /// Relationship kind.
    pub kind: RelationshipKind,
    /// Declaring entity.
    pub source: Arc<EntityDef>,
    /// Related entity.
    pub target: Arc<EntityDef>,
    /// Matching column on the source.
    pub source_key: String,
    /// Matching column on the target.
    pub target_key: String,
    /// Join table, for many-to-many.
    pub join: Option<JoinSpec>,
}

impl ResolvedRelation {
    /// Whether the relationship yields at most one target per source.
    pub fn is_single(&self) -> bool {
        self.kind.is_single()
    }
}

/// Registered entity definitions plus lifecycle hooks.
#[derive(Default)]
pub struct Registry {
    entities: HashMap<&'static str, Arc<EntityDef>>,
    order: Vec<&'static str>,
    hooks: Hooks,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entities", &self.order)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed entity.
    pub fn register<E: Entity>(&mut self) -> Result<&mut Self> {
        self.register_definition(E::definition())
    }

    /// Register a definition.
    ///
    /// Fails with `DuplicateEntity` if the name is taken and with `Schema` if
    /// the definition is malformed.
    pub fn register_definition(&mut self, def: EntityDef) -> Result<&mut Self> {
        if self.entities.contains_key(def.name) {
            return Err(Error::DuplicateEntity(def.name.to_string()));
        }
        check_definition(&def)?;
        tracing::debug!(
            entity = def.name,
            table = def.table,
            columns = def.fields.len(),
            relationships = def.relationships.len(),
            "Registered entity"
        );
        self.order.push(def.name);
        self.entities.insert(def.name, Arc::new(def));
        Ok(self)
    }

    /// Definition by entity name.
    pub fn lookup(&self, name: &str) -> Result<Arc<EntityDef>> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Definition of a typed entity.
    pub fn lookup_type<E: Entity>(&self) -> Result<Arc<EntityDef>> {
        self.lookup(E::NAME)
    }

    /// Definition owning `table`, if one is registered.
    pub fn lookup_table(&self, table: &str) -> Option<Arc<EntityDef>> {
        self.entities.values().find(|d| d.table == table).cloned()
    }

    /// Registered entity names in registration order.
    pub fn entity_names(&self) -> &[&'static str] {
        &self.order
    }

    /// Resolve a relationship of `entity` with conventional key defaults.
    pub fn relation(&self, entity: &str, name: &str) -> Result<ResolvedRelation> {
        let source = self.lookup(entity)?;
        let info = source
            .find_relationship(name)
            .copied()
            .ok_or_else(|| Error::UnknownRelation {
                entity: entity.to_string(),
                relation: name.to_string(),
            })?;
        let target = self.lookup(info.target)?;
        resolve(source, target, &info)
    }

    /// Resolve every declared relationship so misconfiguration surfaces at
    /// startup rather than at first use.
    pub fn validate(&self) -> Result<()> {
        for name in &self.order {
            let def = self.lookup(name)?;
            for rel in &def.relationships {
                self.relation(name, rel.name)?;
            }
        }
        Ok(())
    }

    /// Hook table.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Register a callback run before an entity is inserted.
    pub fn before_create<E, F>(&mut self, f: F) -> &mut Self
    where
        E: Entity,
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.add::<E, F>(HookKind::BeforeCreate, f);
        self
    }

    /// Register a callback run before an entity is updated through `save`.
    pub fn before_update<E, F>(&mut self, f: F) -> &mut Self
    where
        E: Entity,
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.add::<E, F>(HookKind::BeforeUpdate, f);
        self
    }

    /// Register a callback run after an entity was inserted.
    pub fn after_create<E, F>(&mut self, f: F) -> &mut Self
    where
        E: Entity,
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.add::<E, F>(HookKind::AfterCreate, f);
        self
    }
}

fn check_definition(def: &EntityDef) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for field in &def.fields {
        if let Some(previous) = seen.insert(field.column_name, field.name) {
            return Err(Error::Schema(format!(
                "entity `{}` maps column `{}` twice (fields `{}` and `{}`)",
                def.name, field.column_name, previous, field.name
            )));
        }
    }
    if def.primary_key().is_empty() {
        return Err(Error::Schema(format!(
            "entity `{}` declares no primary key",
            def.name
        )));
    }
    let markers: Vec<_> = def.fields.iter().filter(|f| f.soft_delete).collect();
    if markers.len() > 1 {
        return Err(Error::Schema(format!(
            "entity `{}` declares more than one soft-delete marker",
            def.name
        )));
    }
    if let Some(marker) = markers.first() {
        if !marker.nullable {
            return Err(Error::Schema(format!(
                "soft-delete marker `{}.{}` must be nullable",
                def.name, marker.column_name
            )));
        }
    }
    let mut rel_names: Vec<&str> = Vec::new();
    for rel in &def.relationships {
        if rel_names.contains(&rel.name) || seen.values().any(|f| *f == rel.name) {
            return Err(Error::Schema(format!(
                "entity `{}` declares `{}` twice",
                def.name, rel.name
            )));
        }
        rel_names.push(rel.name);
        if rel.kind == RelationshipKind::ManyToMany && rel.link_table.is_none() {
            return Err(Error::Schema(format!(
                "many-to-many relationship `{}.{}` needs a join table",
                def.name, rel.name
            )));
        }
        if rel.kind == RelationshipKind::BelongsTo {
            if let Some(fk) = rel.foreign_key {
                if !def.has_column(fk) {
                    return Err(Error::Schema(format!(
                        "belongs-to `{}.{}` names foreign key `{}` which is not a column",
                        def.name, rel.name, fk
                    )));
                }
            }
        }
    }
    Ok(())
}

fn single_key(def: &EntityDef, what: &str) -> Result<String> {
    match def.primary_key_columns().as_slice() {
        [one] => Ok((*one).to_string()),
        _ => Err(Error::Schema(format!(
            "{} of `{}` needs an explicit key: the primary key is composite",
            what, def.name
        ))),
    }
}

fn resolve(
    source: Arc<EntityDef>,
    target: Arc<EntityDef>,
    info: &RelationshipInfo,
) -> Result<ResolvedRelation> {
    let source_snake = to_snake_case(source.name);
    let (source_key, target_key, join) = match info.kind {
        RelationshipKind::BelongsTo => {
            let fk = info
                .foreign_key
                .map_or_else(|| format!("{}_id", info.name), str::to_string);
            let references = match info.references {
                Some(r) => r.to_string(),
                None => single_key(&target, "belongs-to target")?,
            };
            (fk, references, None)
        }
        RelationshipKind::HasOne | RelationshipKind::HasMany => {
            let references = match info.references {
                Some(r) => r.to_string(),
                None => single_key(&source, "has-one/has-many owner")?,
            };
            let fk = info
                .foreign_key
                .map_or_else(|| format!("{}_id", source_snake), str::to_string);
            (references, fk, None)
        }
        RelationshipKind::ManyToMany => {
            let link = info.link_table.ok_or_else(|| {
                Error::Schema(format!(
                    "many-to-many relationship `{}.{}` needs a join table",
                    source.name, info.name
                ))
            })?;
            let source_key = match info.foreign_key {
                Some(k) => k.to_string(),
                None => single_key(&source, "many-to-many owner")?,
            };
            let target_key = match info.references {
                Some(k) => k.to_string(),
                None => single_key(&target, "many-to-many target")?,
            };
            let join = JoinSpec {
                table: link.table_name.to_string(),
                source_column: link
                    .join_foreign_key
                    .map_or_else(|| format!("{}_id", source_snake), str::to_string),
                target_column: link
                    .join_references
                    .map_or_else(|| format!("{}_id", to_snake_case(target.name)), str::to_string),
            };
            (source_key, target_key, Some(join))
        }
    };

    if !source.has_column(&source_key) {
        return Err(Error::Schema(format!(
            "relationship `{}.{}`: `{}` is not a column of `{}`",
            source.name, info.name, source_key, source.name
        )));
    }
    if !target.has_column(&target_key) {
        return Err(Error::Schema(format!(
            "relationship `{}.{}`: `{}` is not a column of `{}`",
            source.name, info.name, target_key, target.name
        )));
    }

    Ok(ResolvedRelation {
        name: info.name,
        kind: info.kind,
        source,
        target,
        source_key,
        target_key,
        join,
    })
}
