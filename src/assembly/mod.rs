//! CIL instruction set and instruction representation.
//!
//! # Key Components
//!
//! - [`OpCode`] - Every ECMA-335 opcode with mnemonic, operand kind and flow type
//! - [`Instruction`] - An opcode with a validated [`Operand`]
//! - [`InstrId`] - Identity handle of an instruction inside a method body
//!
//! # Examples
//!
//! ```rust
//! use cilhook::assembly::{Instruction, OpCode};
//!
//! let opcode: OpCode = "Ldc_I4_S".parse()?;
//! assert_eq!(opcode, OpCode::LdcI4S);
//!
//! let push = Instruction::ldc_i4(42);
//! assert_eq!(push.to_string(), "ldc.i4.s 42");
//! # Ok::<(), cilhook::Error>(())
//! ```

mod instruction;
mod opcodes;

pub use instruction::{Immediate, InstrId, Instruction, Operand};
pub use opcodes::{FlowType, OpCode, OperandKind};
