//! # cilhook Prelude
//!
//! The types a patch run touches most often. Import this module to load a project, apply a
//! profile or script and inspect the result without spelling out module paths.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilhook operations
pub use crate::Error;

/// The result type used throughout cilhook
pub use crate::Result;

// ================================================================================================
// Instructions and Bodies
// ================================================================================================

/// Opcodes and instructions
pub use crate::assembly::{InstrId, Instruction, OpCode, Operand, OperandKind};

/// Modules and their members
pub use crate::metadata::{MethodBody, MethodDef, MethodHandle, Module, TypeDef, TypeHandle};

/// References used by operands
pub use crate::metadata::{FieldRef, MethodRef, TypeRef};

/// Symbol resolution
pub use crate::metadata::{MethodQuery, MethodSelector, Scope, TypeQuery};

// ================================================================================================
// Patch Engine
// ================================================================================================

/// Finding and verifying code shapes
pub use crate::patch::{MatchSpec, OpClass, Occurrences, OpcodePattern};

/// Templates and hooks
pub use crate::patch::{
    Dispatcher, HookBuilder, InstructionTemplate, OperandTemplate, ParameterFragments,
    PatchContext, TemplateCompiler,
};

/// Splicing
pub use crate::patch::{insert_at, insert_before, insert_before_return, retarget};

// ================================================================================================
// Scripts, Patchers and Projects
// ================================================================================================

/// Patch scripts
pub use crate::script::{PatchScript, ScriptPatcher, ScriptReport, Stage};

/// Built-in patchers
pub use crate::patchers::{apply_profile, PatchProfile, Patcher, ProfileReport};

/// Project loading and write-back
pub use crate::project::{PatchProject, ProjectLoader, RunReport};
