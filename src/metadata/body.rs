//! Method bodies as identity-addressed instruction streams.
//!
//! A [`MethodBody`] owns an arena of [`Instruction`]s and an ordered list of
//! [`InstrId`] handles which forms the logical instruction stream. Instructions are
//! created in the arena first ([`MethodBody::create`]) and become part of the stream
//! once inserted (see [`crate::patch::splice`]). Branch operands refer to handles, so
//! the stream can be edited without touching any branch.
//!
//! Instructions that are created but never inserted stay in the arena; they are not
//! part of [`MethodBody::iter`] and are dropped when the body is written out.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::assembly::{InstrId, Instruction, OpCode};
use crate::metadata::{image::BodyImage, TypeRef};

/// The body of a method.
///
/// Serialized through [`BodyImage`], which stores branch targets as stream positions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "BodyImage", try_from = "BodyImage")]
pub struct MethodBody {
    arena: Vec<Instruction>,
    order: Vec<InstrId>,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Local variable types
    pub locals: Vec<TypeRef>,
}

impl MethodBody {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        MethodBody {
            arena: Vec::new(),
            order: Vec::new(),
            max_stack: 8,
            locals: Vec::new(),
        }
    }

    /// Adds `instruction` to the arena without placing it in the stream.
    pub fn create(&mut self, instruction: Instruction) -> InstrId {
        let id = InstrId(self.arena.len() as u32);
        self.arena.push(instruction);
        id
    }

    /// Adds `instruction` to the arena and appends it to the stream.
    pub fn push(&mut self, instruction: Instruction) -> InstrId {
        let id = self.create(instruction);
        self.order.push(id);
        id
    }

    /// Number of instructions in the stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the stream is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The stream as handles, in execution order.
    #[must_use]
    pub fn ids(&self) -> &[InstrId] {
        &self.order
    }

    pub(crate) fn order_mut(&mut self) -> &mut Vec<InstrId> {
        &mut self.order
    }

    /// Handle of the instruction at `position`.
    #[must_use]
    pub fn id_at(&self, position: usize) -> Option<InstrId> {
        self.order.get(position).copied()
    }

    /// Instruction at `position` of the stream.
    #[must_use]
    pub fn at(&self, position: usize) -> Option<&Instruction> {
        self.id_at(position).and_then(|id| self.get(id))
    }

    /// Instruction behind a handle, whether or not it is part of the stream.
    #[must_use]
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.arena.get(id.index())
    }

    /// Mutable instruction behind a handle.
    pub fn get_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        self.arena.get_mut(id.index())
    }

    /// Returns `true` if `id` was created by this body.
    #[must_use]
    pub fn owns(&self, id: InstrId) -> bool {
        id.index() < self.arena.len()
    }

    /// Position of `id` in the stream, `None` if it is detached.
    #[must_use]
    pub fn position_of(&self, id: InstrId) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == id)
    }

    /// Iterates the stream as `(handle, instruction)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (InstrId, &Instruction)> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.arena.get(id.index()).map(|instr| (*id, instr)))
    }

    /// Iterates the instructions of the stream.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.iter().map(|(_, instr)| instr)
    }

    /// The opcodes of the stream.
    #[must_use]
    pub fn opcodes(&self) -> Vec<OpCode> {
        self.instructions().map(|instr| instr.opcode).collect()
    }

    /// Stream instructions whose branch operand points at `target`.
    #[must_use]
    pub fn branches_to(&self, target: InstrId) -> Vec<InstrId> {
        self.iter()
            .filter(|(_, instr)| instr.targets().contains(&target))
            .map(|(id, _)| id)
            .collect()
    }

    /// Human readable listing with stream positions in place of handles.
    ///
    /// ```text
    /// IL_0000: ldarg.0
    /// IL_0001: brfalse IL_0003
    /// IL_0002: ret
    /// IL_0003: ret
    /// ```
    #[must_use]
    pub fn listing(&self) -> String {
        Listing(self).to_string()
    }
}

struct Listing<'a>(&'a MethodBody);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.0;
        for (position, (_, instr)) in body.iter().enumerate() {
            write!(f, "IL_{position:04X}: {}", instr.opcode)?;
            if instr.is_branch() {
                let labels: Vec<String> = instr
                    .targets()
                    .iter()
                    .map(|target| match body.position_of(*target) {
                        Some(pos) => format!("IL_{pos:04X}"),
                        None => format!("<detached {target}>"),
                    })
                    .collect();
                write!(f, " {}", labels.join(", "))?;
            } else if instr.operand.is_some() {
                write!(f, " {}", instr.operand)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
