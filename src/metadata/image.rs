//! JSON module images.
//!
//! Modules travel between tools as JSON documents. Method bodies are stored as an
//! ordered list of instructions in which branch targets are stream positions; decoding
//! maps positions back to fresh [`InstrId`] handles, encoding maps handles to the
//! position of their instruction. Instructions that are not part of the stream are not
//! written.
//!
//! ```json
//! {
//!   "name": "Assembly-CSharp",
//!   "types": [{
//!     "name": "ChunkCluster",
//!     "methods": [{
//!       "name": "Init",
//!       "flags": "SPECIAL_NAME",
//!       "body": { "instructions": [
//!         { "op": "ldarg.0" },
//!         { "op": "brfalse", "operand": { "target": 2 } },
//!         { "op": "ret" }
//!       ]}
//!     }]
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    assembly::{Immediate, InstrId, Instruction, OpCode, Operand},
    metadata::{FieldRef, MethodBody, MethodRef, Module, TypeRef},
    Error, Result,
};

/// Serialized operand, targets are stream positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandImage {
    /// `int8` immediate
    Int8(i8),
    /// `uint8` immediate
    UInt8(u8),
    /// `int32` immediate
    Int32(i32),
    /// `int64` immediate
    Int64(i64),
    /// `float32` immediate
    Float32(f32),
    /// `float64` immediate
    Float64(f64),
    /// String literal
    String(String),
    /// Type reference
    Type(TypeRef),
    /// Field reference
    Field(FieldRef),
    /// Method reference
    Method(MethodRef),
    /// Branch target position
    Target(usize),
    /// Switch target positions
    Switch(Vec<usize>),
    /// Argument index
    Argument(u16),
    /// Local index
    Local(u16),
}

/// Serialized instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionImage {
    /// Mnemonic
    pub op: String,
    /// Operand, absent for opcodes without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<OperandImage>,
}

/// Serialized method body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyImage {
    /// Maximum stack depth
    #[serde(default = "default_max_stack")]
    pub max_stack: u16,
    /// Local variable types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locals: Vec<TypeRef>,
    /// Instruction stream
    #[serde(default)]
    pub instructions: Vec<InstructionImage>,
}

fn default_max_stack() -> u16 {
    8
}

fn invalid(message: String) -> Error {
    Error::InvalidModule {
        name: String::new(),
        message,
    }
}

impl From<MethodBody> for BodyImage {
    fn from(body: MethodBody) -> Self {
        let positions = |id: &InstrId| body.position_of(*id).unwrap_or(usize::MAX);

        let instructions = body
            .instructions()
            .map(|instr| {
                let operand = match &instr.operand {
                    Operand::None => None,
                    Operand::Immediate(Immediate::Int8(v)) => Some(OperandImage::Int8(*v)),
                    Operand::Immediate(Immediate::UInt8(v)) => Some(OperandImage::UInt8(*v)),
                    Operand::Immediate(Immediate::Int32(v)) => Some(OperandImage::Int32(*v)),
                    Operand::Immediate(Immediate::Int64(v)) => Some(OperandImage::Int64(*v)),
                    Operand::Immediate(Immediate::Float32(v)) => Some(OperandImage::Float32(*v)),
                    Operand::Immediate(Immediate::Float64(v)) => Some(OperandImage::Float64(*v)),
                    Operand::String(s) => Some(OperandImage::String(s.clone())),
                    Operand::Type(ty) => Some(OperandImage::Type(ty.clone())),
                    Operand::Field(field) => Some(OperandImage::Field(field.clone())),
                    Operand::Method(method) => Some(OperandImage::Method(method.clone())),
                    Operand::Target(target) => Some(OperandImage::Target(positions(target))),
                    Operand::Switch(targets) => {
                        Some(OperandImage::Switch(targets.iter().map(positions).collect()))
                    }
                    Operand::Argument(index) => Some(OperandImage::Argument(*index)),
                    Operand::Local(index) => Some(OperandImage::Local(*index)),
                };
                InstructionImage {
                    op: instr.opcode.mnemonic().to_string(),
                    operand,
                }
            })
            .collect();

        BodyImage {
            max_stack: body.max_stack,
            locals: body.locals.clone(),
            instructions,
        }
    }
}

impl TryFrom<BodyImage> for MethodBody {
    type Error = Error;

    fn try_from(image: BodyImage) -> Result<Self> {
        let mut body = MethodBody::new();
        body.max_stack = image.max_stack;
        body.locals = image.locals;

        // Handles are allocated in stream order, so position `p` maps to handle `p`.
        let count = image.instructions.len();
        let target = |position: usize| -> Result<InstrId> {
            if position < count {
                Ok(InstrId(position as u32))
            } else {
                Err(invalid(format!(
                    "branch target {position} is out of range for {count} instructions"
                )))
            }
        };

        for (position, entry) in image.instructions.into_iter().enumerate() {
            let opcode = OpCode::from_name(&entry.op)
                .ok_or_else(|| invalid(format!("unknown opcode '{}' at {position}", entry.op)))?;

            let operand = match entry.operand {
                None => Operand::None,
                Some(OperandImage::Int8(v)) => Operand::Immediate(Immediate::Int8(v)),
                Some(OperandImage::UInt8(v)) => Operand::Immediate(Immediate::UInt8(v)),
                Some(OperandImage::Int32(v)) => Operand::Immediate(Immediate::Int32(v)),
                Some(OperandImage::Int64(v)) => Operand::Immediate(Immediate::Int64(v)),
                Some(OperandImage::Float32(v)) => Operand::Immediate(Immediate::Float32(v)),
                Some(OperandImage::Float64(v)) => Operand::Immediate(Immediate::Float64(v)),
                Some(OperandImage::String(s)) => Operand::String(s),
                Some(OperandImage::Type(ty)) => Operand::Type(ty),
                Some(OperandImage::Field(field)) => Operand::Field(field),
                Some(OperandImage::Method(method)) => Operand::Method(method),
                Some(OperandImage::Target(pos)) => Operand::Target(target(pos)?),
                Some(OperandImage::Switch(positions)) => Operand::Switch(
                    positions
                        .into_iter()
                        .map(&target)
                        .collect::<Result<Vec<_>>>()?,
                ),
                Some(OperandImage::Argument(index)) => Operand::Argument(index),
                Some(OperandImage::Local(index)) => Operand::Local(index),
            };

            let instruction = Instruction::new(opcode, operand)
                .map_err(|error| invalid(format!("instruction {position}: {error}")))?;
            body.push(instruction);
        }

        Ok(body)
    }
}

impl Module {
    /// Decodes a module image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModule`] if the data is not a valid module image.
    pub fn from_json(name: &str, data: &[u8]) -> Result<Module> {
        serde_json::from_slice(data).map_err(|error| Error::InvalidModule {
            name: name.to_string(),
            message: error.to_string(),
        })
    }

    /// Encodes this module as a pretty-printed image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}
