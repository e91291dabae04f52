//! Procedural macros for relmodel.
//!
//! - `#[derive(Entity)]` maps a struct onto a table: columns, embedded
//!   sub-structures, ignored fields and relationships.
//! - `#[derive(FromRecord)]` builds plain result shapes (aggregations,
//!   projections) from query records.
//!
//! # Attributes
//!
//! Container: `#[relmodel(table = "...")]` overrides the default snake_case
//! plural table name.
//!
//! Field:
//!
//! | attribute | effect |
//! |---|---|
//! | `primary_key` | part of the primary key |
//! | `column = "..."` | column name (defaults to the field name) |
//! | `auto_increment` | database-assigned key, omitted from INSERT when zero |
//! | `create_only` / `update_only` | INSERT-only / UPDATE-only column |
//! | `auto_create_time[ = "milli" \| "unix"]` | creation time on insert |
//! | `auto_update_time[ = "milli" \| "unix"]` | update time on insert and update |
//! | `soft_delete` | soft-delete marker column |
//! | `ignore` | not mapped |
//! | `embedded` | flatten the field's own `Entity` columns |
//! | `belongs_to`, `has_one`, `has_many`, `many_to_many = "join_table"` | relationship kind |
//! | `foreign_key`, `references`, `join_foreign_key`, `join_references` | relationship keys |
//!
//! # Example
//!
//! ```ignore
//! #[derive(Entity, Debug, Default)]
//! #[relmodel(table = "products")]
//! struct Product {
//!     #[relmodel(primary_key)]
//!     id: String,
//!     name: String,
//!     price: i64,
//!     #[relmodel(
//!         many_to_many = "user_like_product",
//!         join_foreign_key = "product_id",
//!         join_references = "user_id"
//!     )]
//!     liked_by_users: Vec<User>,
//! }
//! ```

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod entity_derive;
mod parse;

/// Derive `relmodel_core::Entity` (and `FromRecord`).
#[proc_macro_derive(Entity, attributes(relmodel))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match parse::parse_entity(&input) {
        Ok(def) => entity_derive::generate_entity_impl(&def).into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derive `relmodel_core::FromRecord` for a result shape.
#[proc_macro_derive(FromRecord, attributes(relmodel))]
pub fn derive_from_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match parse::parse_entity(&input) {
        Ok(def) => entity_derive::generate_from_record_impl(&def).into(),
        Err(err) => err.to_compile_error().into(),
    }
}
