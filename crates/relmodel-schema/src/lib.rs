//! Entity registry for relmodel.
//!
//! `relmodel-schema` owns the **metadata side** of the mapper:
//!
//! - [`Registry`] holds one immutable [`EntityDef`](relmodel_core::EntityDef) per
//!   entity, validates definitions on registration and resolves relationship
//!   keys by convention ([`ResolvedRelation`]).
//! - [`Hooks`] stores lifecycle callbacks (before-create, before-update,
//!   after-create) that the execution engine invokes.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::new();
//! registry.register::<User>()?.register::<Wallet>()?;
//! registry.before_create::<User, _>(|user| {
//!     if user.id.is_empty() {
//!         user.id = uuid::Uuid::new_v4().to_string();
//!     }
//!     Ok(())
//! });
//! registry.validate()?;
//! ```

pub mod hooks;
pub mod registry;

pub use hooks::{HookKind, Hooks};
pub use registry::{JoinSpec, Registry, ResolvedRelation};
