//! Relationship metadata.
//!
//! Relationships are declared at compile time (via the derive macro) and
//! represented as metadata on each entity definition. Keys omitted in the
//! declaration are resolved by naming convention when the schema registry
//! resolves the relationship, so the metadata here stays exactly what the
//! user wrote.

/// The type of relationship between two entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationshipKind {
    /// `Wallet` belongs to one `User`; the foreign key lives on the source.
    #[default]
    BelongsTo,
    /// `User` has one `Wallet`; the foreign key lives on the target.
    HasOne,
    /// `User` has many `Address`es; the foreign key lives on the target.
    HasMany,
    /// `User`s like many `Product`s via a join table.
    ManyToMany,
}

impl RelationshipKind {
    /// Whether at most one related instance exists per source row.
    pub const fn is_single(self) -> bool {
        matches!(self, RelationshipKind::BelongsTo | RelationshipKind::HasOne)
    }

    /// Attribute spelling used by the derive macro.
    pub const fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::BelongsTo => "belongs_to",
            RelationshipKind::HasOne => "has_one",
            RelationshipKind::HasMany => "has_many",
            RelationshipKind::ManyToMany => "many_to_many",
        }
    }
}

/// Information about a join table for many-to-many relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTableInfo {
    /// The join table name (e.g., `"user_like_product"`).
    pub table_name: &'static str,

    /// Column in the join table pointing to the source entity.
    pub join_foreign_key: Option<&'static str>,

    /// Column in the join table pointing to the target entity.
    pub join_references: Option<&'static str>,
}

impl LinkTableInfo {
    /// Create a join-table definition with conventional join keys.
    #[must_use]
    pub const fn new(table_name: &'static str) -> Self {
        Self {
            table_name,
            join_foreign_key: None,
            join_references: None,
        }
    }

    /// Set the join column pointing to the source.
    #[must_use]
    pub const fn join_foreign_key(mut self, column: &'static str) -> Self {
        self.join_foreign_key = Some(column);
        self
    }

    /// Set the join column pointing to the target.
    #[must_use]
    pub const fn join_references(mut self, column: &'static str) -> Self {
        self.join_references = Some(column);
        self
    }
}

/// Metadata about a relationship between entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipInfo {
    /// Name of the relationship field.
    pub name: &'static str,

    /// The related entity's name.
    pub target: &'static str,

    /// Kind of relationship.
    pub kind: RelationshipKind,

    /// Foreign key column: on the source for belongs-to, on the target for
    /// has-one/has-many, the source-side key column for many-to-many.
    pub foreign_key: Option<&'static str>,

    /// Referenced column: the target key for belongs-to and many-to-many, the
    /// source key for has-one/has-many.
    pub references: Option<&'static str>,

    /// Join table for many-to-many relationships.
    pub link_table: Option<LinkTableInfo>,
}

impl RelationshipInfo {
    /// Create a new relationship with required fields.
    #[must_use]
    pub const fn new(name: &'static str, target: &'static str, kind: RelationshipKind) -> Self {
        Self {
            name,
            target,
            kind,
            foreign_key: None,
            references: None,
            link_table: None,
        }
    }

    /// Set the foreign key column.
    #[must_use]
    pub const fn foreign_key(mut self, column: &'static str) -> Self {
        self.foreign_key = Some(column);
        self
    }

    /// Set the referenced key column.
    #[must_use]
    pub const fn references(mut self, column: &'static str) -> Self {
        self.references = Some(column);
        self
    }

    /// Set the join table metadata (many-to-many).
    #[must_use]
    pub const fn link_table(mut self, info: LinkTableInfo) -> Self {
        self.link_table = Some(info);
        self
    }
}

impl Default for RelationshipInfo {
    fn default() -> Self {
        Self::new("", "", RelationshipKind::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_kind_default() {
        assert_eq!(RelationshipKind::default(), RelationshipKind::BelongsTo);
        assert!(RelationshipKind::HasOne.is_single());
        assert!(!RelationshipKind::HasMany.is_single());
    }

    #[test]
    fn test_relationship_info_builder_chain() {
        let info = RelationshipInfo::new("user", "User", RelationshipKind::BelongsTo)
            .foreign_key("user_id")
            .references("id");

        assert_eq!(info.name, "user");
        assert_eq!(info.target, "User");
        assert_eq!(info.foreign_key, Some("user_id"));
        assert_eq!(info.references, Some("id"));
        assert_eq!(info.link_table, None);
    }

    #[test]
    fn test_link_table_info() {
        let link = LinkTableInfo::new("user_like_product")
            .join_foreign_key("product_id")
            .join_references("user_id");
        assert_eq!(link.table_name, "user_like_product");
        assert_eq!(link.join_foreign_key, Some("product_id"));
        assert_eq!(link.join_references, Some("user_id"));
    }
}
