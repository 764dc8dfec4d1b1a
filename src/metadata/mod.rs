//! Module model: types, members, method bodies and symbol queries.
//!
//! # Key Components
//!
//! - [`Module`] - A loaded module, the unit of patching and write-back
//! - [`TypeDef`], [`MethodDef`], [`FieldDef`] - Definitions, addressed by handles
//! - [`MethodBody`] - Identity-addressed instruction stream of a method
//! - [`TypeRef`], [`FieldRef`], [`MethodRef`] - Name-addressed references used by operands
//! - [`query`] - The symbol resolver: composable, labelled predicate queries
//! - [`image`] - JSON module images
//!
//! # Examples
//!
//! ```rust
//! use cilhook::metadata::{Module, TypeDef, MethodDef};
//!
//! let mut module = Module::new("Assembly-CSharp");
//! let ty = module.add_type(TypeDef::new("Game", "World"));
//! module.add_method(ty, MethodDef::new("Tick"));
//!
//! let tick = module.query_methods().name("Tick").require()?;
//! assert_eq!(module.method_name(tick), "Game.World::Tick");
//! # Ok::<(), cilhook::Error>(())
//! ```

mod body;
pub mod image;
mod module;
pub mod query;
mod token;

pub use body::MethodBody;
pub use module::{
    FieldDef, FieldHandle, MethodDef, MethodFlags, MethodHandle, Module, Parameter, TypeDef,
    TypeFlags, TypeHandle,
};
pub use query::{FieldQuery, MethodQuery, MethodSelector, Scope, TypeQuery};
pub use token::{FieldRef, MethodRef, TypeRef};
