//! The bytecode patch engine.
//!
//! Patching a method is a fixed sequence of steps, each covered by one submodule:
//!
//! 1. [`pattern`] - find the insertion point by opcode shape ([`OpcodePattern`])
//! 2. [`matcher`] - confirm the body still looks the way the patch expects ([`MatchSpec`])
//! 3. [`template`] - compile declarative instruction templates ([`TemplateCompiler`])
//! 4. [`hook`] - synthesize the dispatcher call around the fragments ([`HookBuilder`])
//! 5. [`splice`] - insert the hook and repoint branches ([`insert_at`], [`retarget`])
//!
//! Instructions are addressed by [`crate::assembly::InstrId`] throughout, so steps 4 and 5
//! may happen in any order relative to other edits of the same body.
//!
//! # Examples
//!
//! ```rust
//! use cilhook::{
//!     assembly::{Instruction, OpCode},
//!     metadata::MethodBody,
//!     patch::{insert_at, Dispatcher, HookBuilder},
//! };
//!
//! let mut body = MethodBody::new();
//! body.push(Instruction::op(OpCode::Ret));
//!
//! let dispatcher = Dispatcher::default();
//! let hook = HookBuilder::new(&dispatcher).compose(&mut body, "OnTick", false, Vec::new())?;
//! insert_at(&mut body, 0, &hook)?;
//!
//! assert_eq!(body.opcodes().first(), Some(&OpCode::Ldstr));
//! assert_eq!(body.opcodes().last(), Some(&OpCode::Ret));
//! # Ok::<(), cilhook::Error>(())
//! ```

mod context;
pub mod hook;
pub mod matcher;
pub mod pattern;
pub mod splice;
pub mod template;

pub use context::PatchContext;
pub use hook::{Dispatcher, HookBuilder, ParameterFragments};
pub use matcher::{matches, ExpectedOperand, MatchEntry, MatchIndex, MatchSpec, Mismatch};
pub use pattern::{find, OpClass, Occurrences, OpcodePattern};
pub use splice::{insert_at, insert_before, insert_before_return, retarget, retarget_case};
pub use template::{InstructionTemplate, OperandTemplate, TemplateCompiler};
