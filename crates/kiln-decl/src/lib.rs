//! Canonical declarations shared across a workspace.
//!
//! Every package, type, member and derived type (array, parameterized type,
//! type variable) is represented by exactly one [`Declaration`] per
//! [`DeclTable`]. Identity comparison (`Arc::ptr_eq`) is therefore valid
//! equality within one table.

mod decl;
mod scope;
mod table;

pub use decl::{Decl, DeclKind, Declaration, Modifiers, TypeArg};
pub use scope::TypeScope;
pub use table::{DeclSource, DeclTable};
