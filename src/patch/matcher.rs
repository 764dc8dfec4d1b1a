//! Structural Matcher: checking that a method body still has an expected shape.
//!
//! A [`MatchSpec`] lists instructions expected at given indices. Each entry names an
//! opcode and, optionally, an operand. Operands are only compared when both the expected
//! and the actual instruction carry one, so a spec can pin an opcode without caring about
//! its operand. Entries are checked in order and the first mismatch decides.

use std::fmt;

use crate::{
    assembly::{Immediate, InstrId, Instruction, OpCode, Operand},
    metadata::MethodBody,
    Error, Result,
};

/// Where an entry is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchIndex {
    /// At this index, relative to the base the spec is checked from
    Absolute(usize),
    /// `k` instructions before the end of the body (`FromEnd(1)` is the last instruction)
    FromEnd(usize),
    /// Right after the previous entry, or at the base for the first entry
    Next,
}

impl MatchIndex {
    /// Converts a script index: negative values count from the end, `None` means [`MatchIndex::Next`].
    #[must_use]
    pub fn from_signed(index: Option<isize>) -> Self {
        match index {
            None => MatchIndex::Next,
            Some(i) if i < 0 => MatchIndex::FromEnd(i.unsigned_abs()),
            Some(i) => MatchIndex::Absolute(i.unsigned_abs()),
        }
    }
}

/// The operand an entry expects.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedOperand {
    /// No operand given, any operand is accepted
    Any,
    /// This operand value
    Value(Operand),
    /// A branch to the instruction at this body position
    Position(usize),
}

/// A single expected instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEntry {
    /// Where the instruction is expected
    pub index: MatchIndex,
    /// The expected opcode
    pub opcode: OpCode,
    /// The expected operand
    pub operand: ExpectedOperand,
}

impl MatchEntry {
    /// An entry that only checks the opcode.
    #[must_use]
    pub fn opcode(index: MatchIndex, opcode: OpCode) -> Self {
        MatchEntry {
            index,
            opcode,
            operand: ExpectedOperand::Any,
        }
    }

    /// An entry that checks opcode and operand of `instruction`.
    #[must_use]
    pub fn instruction(index: MatchIndex, instruction: Instruction) -> Self {
        let operand = if instruction.operand.is_some() {
            ExpectedOperand::Value(instruction.operand)
        } else {
            ExpectedOperand::Any
        };
        MatchEntry {
            index,
            opcode: instruction.opcode,
            operand,
        }
    }
}

/// The first difference between a body and a [`MatchSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Resolved instruction index, or the requested one if it is out of range
    pub index: isize,
    /// Description of the difference
    pub reason: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: {}", self.index, self.reason)
    }
}

/// An ordered list of expected instructions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSpec {
    entries: Vec<MatchEntry>,
}

impl MatchSpec {
    /// Creates an empty spec, which matches every body.
    #[must_use]
    pub fn new() -> Self {
        MatchSpec::default()
    }

    /// Appends an entry.
    #[must_use]
    pub fn entry(mut self, entry: MatchEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Appends an opcode-only entry.
    #[must_use]
    pub fn expect(self, index: MatchIndex, opcode: OpCode) -> Self {
        self.entry(MatchEntry::opcode(index, opcode))
    }

    /// Appends an opcode-only entry right after the previous one.
    #[must_use]
    pub fn then(self, opcode: OpCode) -> Self {
        self.expect(MatchIndex::Next, opcode)
    }

    /// The entries, in check order.
    #[must_use]
    pub fn entries(&self) -> &[MatchEntry] {
        &self.entries
    }

    /// Returns `true` if the spec has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `body` has the expected shape.
    #[must_use]
    pub fn matches(&self, body: &MethodBody) -> bool {
        self.check_from(body, 0).is_ok()
    }

    /// Checks the spec against `body`, returning the first mismatch.
    ///
    /// # Errors
    ///
    /// Returns the first [`Mismatch`].
    pub fn check(&self, body: &MethodBody) -> std::result::Result<(), Mismatch> {
        self.check_from(body, 0)
    }

    /// Checks the spec with absolute and relative indices offset by `base`.
    ///
    /// # Errors
    ///
    /// Returns the first [`Mismatch`].
    pub fn check_from(&self, body: &MethodBody, base: usize) -> std::result::Result<(), Mismatch> {
        let mut next = base;
        for entry in &self.entries {
            let index = match entry.index {
                MatchIndex::Absolute(i) => Some(base + i),
                MatchIndex::FromEnd(k) => body.len().checked_sub(k),
                MatchIndex::Next => Some(next),
            };

            let Some(index) = index.filter(|i| *i < body.len()) else {
                let requested = match entry.index {
                    MatchIndex::Absolute(i) => (base + i) as isize,
                    MatchIndex::FromEnd(k) => -(k as isize),
                    MatchIndex::Next => next as isize,
                };
                return Err(Mismatch {
                    index: requested,
                    reason: format!(
                        "expected {} but the body has only {} instructions",
                        entry.opcode,
                        body.len()
                    ),
                });
            };
            next = index + 1;

            let Some(actual) = body.at(index) else {
                return Err(Mismatch {
                    index: index as isize,
                    reason: "instruction is missing".to_string(),
                });
            };
            if actual.opcode != entry.opcode {
                return Err(Mismatch {
                    index: index as isize,
                    reason: format!("expected {}, found {}", entry.opcode, actual.opcode),
                });
            }
            if !operand_matches(body, base, &entry.operand, &actual.operand) {
                return Err(Mismatch {
                    index: index as isize,
                    reason: format!(
                        "operand of {} differs: found {}",
                        entry.opcode,
                        describe(body, &actual.operand)
                    ),
                });
            }
        }
        Ok(())
    }

    /// Like [`MatchSpec::check_from`], converting a mismatch into an error naming `context`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] on the first mismatch.
    pub fn verify(&self, body: &MethodBody, base: usize, context: &str) -> Result<()> {
        self.check_from(body, base).map_err(|mismatch| Error::ShapeMismatch {
            context: context.to_string(),
            index: mismatch.index,
            reason: mismatch.reason,
        })
    }
}

/// Renders branch targets as positions.
fn describe(body: &MethodBody, operand: &Operand) -> String {
    let position = |id: &InstrId| {
        body.position_of(*id)
            .map_or_else(|| id.to_string(), |p| p.to_string())
    };
    match operand {
        Operand::Target(id) => format!("branch to {}", position(id)),
        Operand::Switch(ids) => format!(
            "switch to ({})",
            ids.iter().map(position).collect::<Vec<_>>().join(", ")
        ),
        Operand::None => "no operand".to_string(),
        other => other.to_string(),
    }
}

fn operand_matches(body: &MethodBody, base: usize, expected: &ExpectedOperand, actual: &Operand) -> bool {
    let expected = match expected {
        ExpectedOperand::Any => return true,
        ExpectedOperand::Position(position) => {
            return match (body.id_at(base + position), actual) {
                (Some(id), Operand::Target(target)) => id == *target,
                (_, Operand::None) => true,
                _ => false,
            };
        }
        ExpectedOperand::Value(value) => value,
    };

    match (expected, actual) {
        (Operand::None, _) | (_, Operand::None) => true,
        (Operand::Immediate(a), Operand::Immediate(b)) => immediates_equal(*a, *b),
        (Operand::String(a), Operand::String(b)) => a.as_bytes() == b.as_bytes(),
        (Operand::Type(a), Operand::Type(b)) => a.full_name() == b.full_name(),
        (Operand::Field(a), Operand::Field(b)) => a.full_name() == b.full_name(),
        (Operand::Method(a), Operand::Method(b)) => a.full_name() == b.full_name(),
        (Operand::Target(a), Operand::Target(b)) => a == b,
        (Operand::Switch(a), Operand::Switch(b)) => a == b,
        (Operand::Argument(a), Operand::Argument(b)) | (Operand::Local(a), Operand::Local(b)) => {
            a == b
        }
        _ => false,
    }
}

fn immediates_equal(a: Immediate, b: Immediate) -> bool {
    match (a, b) {
        (Immediate::Float32(x), Immediate::Float32(y)) => x.to_bits() == y.to_bits(),
        (Immediate::Float64(x), Immediate::Float64(y)) => x.to_bits() == y.to_bits(),
        (Immediate::Float32(x), Immediate::Float64(y)) | (Immediate::Float64(y), Immediate::Float32(x)) => {
            f64::from(x).to_bits() == y.to_bits()
        }
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

/// Returns `true` if `body` has the shape described by `spec`.
#[must_use]
pub fn matches(body: &MethodBody, spec: &MatchSpec) -> bool {
    spec.matches(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MethodRef, TypeRef};
    use crate::test::factories::body_of;

    #[test]
    fn opcode_entries() {
        let body = body_of(&[OpCode::Ldarg0, OpCode::Ldnull, OpCode::Stfld, OpCode::Ret]);

        let spec = MatchSpec::new()
            .expect(MatchIndex::Absolute(0), OpCode::Ldarg0)
            .then(OpCode::Ldnull)
            .expect(MatchIndex::FromEnd(1), OpCode::Ret);
        assert!(spec.matches(&body));

        let wrong = MatchSpec::new().expect(MatchIndex::Absolute(1), OpCode::Ldarg0);
        let mismatch = wrong.check(&body).unwrap_err();
        assert_eq!(mismatch.index, 1);
        assert!(mismatch.reason.contains("found ldnull"));

        let past_end = MatchSpec::new().expect(MatchIndex::Absolute(4), OpCode::Ret);
        assert!(!past_end.matches(&body));
        let before_start = MatchSpec::new().expect(MatchIndex::FromEnd(5), OpCode::Ldarg0);
        assert_eq!(before_start.check(&body).unwrap_err().index, -5);

        assert!(MatchSpec::new().matches(&body));
    }

    #[test]
    fn next_follows_from_end() {
        let body = body_of(&[OpCode::Nop, OpCode::Ldarg0, OpCode::Ret]);
        let spec = MatchSpec::new()
            .expect(MatchIndex::FromEnd(2), OpCode::Ldarg0)
            .then(OpCode::Ret);
        assert!(spec.matches(&body));
    }

    #[test]
    fn base_offsets_relative_entries() {
        let body = body_of(&[OpCode::Nop, OpCode::Nop, OpCode::Ldarg0, OpCode::Ldnull, OpCode::Stfld]);
        let shape = MatchSpec::new()
            .then(OpCode::Ldarg0)
            .then(OpCode::Ldnull)
            .expect(MatchIndex::Absolute(2), OpCode::Stfld);
        assert!(shape.check_from(&body, 2).is_ok());
        assert!(shape.check_from(&body, 0).is_err());

        let error = shape.verify(&body, 1, "ChunkCluster::Init").unwrap_err();
        assert!(error.is_shape_drift());
        assert!(error.to_string().contains("outdated"));
    }

    #[test]
    fn operand_policy() {
        let mut body = MethodBody::new();
        body.push(Instruction::ldstr("Hello"));
        body.push(Instruction::ldc_i4(5));
        body.push(Instruction::op(OpCode::Ret));

        let exact = MatchSpec::new().entry(MatchEntry::instruction(MatchIndex::Next, Instruction::ldstr("Hello")));
        assert!(exact.matches(&body));

        let case = MatchSpec::new().entry(MatchEntry::instruction(MatchIndex::Next, Instruction::ldstr("hello")));
        assert!(!case.matches(&body));

        let wildcard = MatchSpec::new().expect(MatchIndex::Absolute(0), OpCode::Ldstr);
        assert!(wildcard.matches(&body));

        // ldc.i4.s 5 compared against an int32 5 compares by value
        let widened = MatchSpec::new().entry(MatchEntry {
            index: MatchIndex::Absolute(1),
            opcode: OpCode::LdcI4S,
            operand: ExpectedOperand::Value(Operand::Immediate(Immediate::Int32(5))),
        });
        assert!(widened.matches(&body));

        let kind = MatchSpec::new().entry(MatchEntry {
            index: MatchIndex::Absolute(0),
            opcode: OpCode::Ldstr,
            operand: ExpectedOperand::Value(Operand::Type(TypeRef::string())),
        });
        assert!(!kind.matches(&body));
    }

    #[test]
    fn reference_and_branch_operands() {
        let concat = MethodRef::new(
            TypeRef::string(),
            "Concat",
            vec![TypeRef::string(), TypeRef::string()],
            TypeRef::string(),
        );

        let mut body = MethodBody::new();
        let ret = body.create(Instruction::op(OpCode::Ret));
        body.push(Instruction::call(concat.clone()));
        body.push(Instruction::branch(OpCode::Br, ret));
        body.order_mut().push(ret);

        let call = MatchSpec::new().entry(MatchEntry::instruction(MatchIndex::Next, Instruction::call(concat)));
        assert!(call.matches(&body));

        let to_ret = MatchSpec::new().entry(MatchEntry {
            index: MatchIndex::Absolute(1),
            opcode: OpCode::Br,
            operand: ExpectedOperand::Position(2),
        });
        assert!(to_ret.matches(&body));

        let elsewhere = MatchSpec::new().entry(MatchEntry {
            index: MatchIndex::Absolute(1),
            opcode: OpCode::Br,
            operand: ExpectedOperand::Position(0),
        });
        assert!(!matches(&body, &elsewhere));
    }
}
