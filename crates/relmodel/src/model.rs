//! Reusable key, timestamp and soft-delete columns.

use chrono::{DateTime, Utc};
use relmodel_macros::Entity;

/// `id`, `created_at`, `updated_at` and `deleted_at`, for embedding.
///
/// ```rust,ignore
/// #[derive(Entity, Debug, Default)]
/// #[relmodel(table = "todos")]
/// struct Todo {
///     #[relmodel(embedded)]
///     model: BaseModel,
///     title: String,
/// }
/// ```
///
/// The embedding entity gets an auto-increment primary key, managed
/// timestamps and soft deletes without declaring them itself.
#[derive(Entity, Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseModel {
    #[relmodel(primary_key, auto_increment)]
    pub id: i64,
    #[relmodel(auto_create_time)]
    pub created_at: DateTime<Utc>,
    #[relmodel(auto_update_time)]
    pub updated_at: DateTime<Utc>,
    #[relmodel(soft_delete)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmodel_core::{Entity, Record};

    #[derive(Entity, Debug, Default)]
    #[relmodel(table = "todos")]
    struct Todo {
        #[relmodel(embedded)]
        model: BaseModel,
        title: String,
    }

    #[test]
    fn test_embedding_brings_key_timestamps_and_marker() {
        let def = Todo::definition();
        assert_eq!(def.primary_key_columns(), vec!["id"]);
        assert_eq!(def.auto_increment_field().map(|f| f.column_name), Some("id"));
        assert_eq!(def.soft_delete_field().map(|f| f.column_name), Some("deleted_at"));
        assert_eq!(
            def.column_names(),
            vec!["id", "created_at", "updated_at", "deleted_at", "title"]
        );
        assert_eq!(def.embedded[0].type_name, "BaseModel");
    }

    #[test]
    fn test_apply_record_reaches_embedded_columns() {
        let mut todo = Todo::default();
        let mut record = Record::new();
        record.set("id", 7_i64);
        todo.apply_record(&record).unwrap();
        assert_eq!(todo.model.id, 7);
        assert!(todo.model.deleted_at.is_none());
    }
}
