//! CIL instructions and their operands.
//!
//! An [`Instruction`] is an [`OpCode`] plus an [`Operand`]. Branch operands do not hold
//! byte offsets or positions; they hold [`InstrId`] handles that identify another
//! instruction of the same [`crate::metadata::MethodBody`]. Inserting or removing
//! instructions elsewhere in the body therefore never invalidates a branch.
//!
//! [`Instruction::new`] validates the operand against the opcode's [`OperandKind`] and
//! widens or narrows integer immediates where the value fits, so script authors can
//! write `starg.s` with an `int32` operand.

use std::fmt;

use crate::{
    assembly::{OpCode, OperandKind},
    metadata::{FieldRef, MethodRef, TypeRef},
    Error, Result,
};

/// Identity of an instruction inside one method body.
///
/// Handles are stable for the lifetime of the body; they are only meaningful
/// for the body that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub(crate) u32);

impl InstrId {
    /// The raw arena index behind this handle.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immediate numeric operands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit
    Int8(i8),
    /// Unsigned 8-bit
    UInt8(u8),
    /// Signed 32-bit
    Int32(i32),
    /// Signed 64-bit
    Int64(i64),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
}

impl Immediate {
    /// The value as a 64-bit integer, if it is integral.
    #[must_use]
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Immediate::Int8(v) => Some(i64::from(v)),
            Immediate::UInt8(v) => Some(i64::from(v)),
            Immediate::Int32(v) => Some(i64::from(v)),
            Immediate::Int64(v) => Some(v),
            Immediate::Float32(_) | Immediate::Float64(_) => None,
        }
    }

    fn kind_name(self) -> &'static str {
        match self {
            Immediate::Int8(_) => "int8",
            Immediate::UInt8(_) => "uint8",
            Immediate::Int32(_) => "int32",
            Immediate::Int64(_) => "int64",
            Immediate::Float32(_) => "float32",
            Immediate::Float64(_) => "float64",
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(v) => write!(f, "{v}"),
            Immediate::UInt8(v) => write!(f, "{v}"),
            Immediate::Int32(v) => write!(f, "{v}"),
            Immediate::Int64(v) => write!(f, "{v}"),
            Immediate::Float32(v) => write!(f, "{v}"),
            Immediate::Float64(v) => write!(f, "{v}"),
        }
    }
}

/// Operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Numeric literal
    Immediate(Immediate),
    /// String literal
    String(String),
    /// Type reference
    Type(TypeRef),
    /// Field reference
    Field(FieldRef),
    /// Method reference
    Method(MethodRef),
    /// Single branch target
    Target(InstrId),
    /// Switch table
    Switch(Vec<InstrId>),
    /// Argument index
    Argument(u16),
    /// Local variable index
    Local(u16),
}

impl Operand {
    /// Short description of the operand kind, used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Operand::None => "none",
            Operand::Immediate(imm) => imm.kind_name(),
            Operand::String(_) => "string",
            Operand::Type(_) => "type reference",
            Operand::Field(_) => "field reference",
            Operand::Method(_) => "method reference",
            Operand::Target(_) => "branch target",
            Operand::Switch(_) => "switch table",
            Operand::Argument(_) => "argument index",
            Operand::Local(_) => "local index",
        }
    }

    /// Returns `true` unless this is [`Operand::None`].
    #[must_use]
    pub fn is_some(&self) -> bool {
        !matches!(self, Operand::None)
    }

    /// Converts the operand to the representation `kind` expects, or `None` if it does not fit.
    fn coerce(self, kind: OperandKind, short_form: bool) -> Option<Operand> {
        let index_limit = if short_form {
            i64::from(u8::MAX)
        } else {
            i64::from(u16::MAX)
        };

        let coerced = match (kind, self) {
            (OperandKind::None, Operand::None) => Operand::None,

            (OperandKind::Int8, Operand::Immediate(imm)) => {
                let value = i8::try_from(imm.as_i64()?).ok()?;
                Operand::Immediate(Immediate::Int8(value))
            }
            (OperandKind::UInt8, Operand::Immediate(imm)) => {
                let value = u8::try_from(imm.as_i64()?).ok()?;
                Operand::Immediate(Immediate::UInt8(value))
            }
            (OperandKind::Int32, Operand::Immediate(imm)) => {
                let value = i32::try_from(imm.as_i64()?).ok()?;
                Operand::Immediate(Immediate::Int32(value))
            }
            (OperandKind::Int64, Operand::Immediate(imm)) => {
                Operand::Immediate(Immediate::Int64(imm.as_i64()?))
            }
            (OperandKind::Float32, Operand::Immediate(Immediate::Float32(v))) => {
                Operand::Immediate(Immediate::Float32(v))
            }
            (OperandKind::Float64, Operand::Immediate(Immediate::Float64(v))) => {
                Operand::Immediate(Immediate::Float64(v))
            }
            (OperandKind::Float64, Operand::Immediate(Immediate::Float32(v))) => {
                Operand::Immediate(Immediate::Float64(f64::from(v)))
            }

            (OperandKind::Argument, Operand::Argument(index))
            | (OperandKind::Local, Operand::Local(index)) => {
                if i64::from(index) > index_limit {
                    return None;
                }
                if kind == OperandKind::Argument {
                    Operand::Argument(index)
                } else {
                    Operand::Local(index)
                }
            }
            (OperandKind::Argument | OperandKind::Local, Operand::Immediate(imm)) => {
                let value = imm.as_i64()?;
                if !(0..=index_limit).contains(&value) {
                    return None;
                }
                let index = u16::try_from(value).ok()?;
                if kind == OperandKind::Argument {
                    Operand::Argument(index)
                } else {
                    Operand::Local(index)
                }
            }

            (OperandKind::String, operand @ Operand::String(_))
            | (OperandKind::Type, operand @ Operand::Type(_))
            | (OperandKind::Field, operand @ Operand::Field(_))
            | (OperandKind::Method | OperandKind::Signature, operand @ Operand::Method(_))
            | (
                OperandKind::Token,
                operand @ (Operand::Type(_) | Operand::Field(_) | Operand::Method(_)),
            )
            | (OperandKind::Target, operand @ Operand::Target(_))
            | (OperandKind::Switch, operand @ Operand::Switch(_)) => operand,

            _ => return None,
        };
        Some(coerced)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, "{imm}"),
            Operand::String(s) => write!(f, "{s:?}"),
            Operand::Type(ty) => write!(f, "{ty}"),
            Operand::Field(field) => write!(f, "{field}"),
            Operand::Method(method) => write!(f, "{method}"),
            Operand::Target(target) => write!(f, "{target}"),
            Operand::Switch(targets) => {
                f.write_str("(")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{target}")?;
                }
                f.write_str(")")
            }
            Operand::Argument(index) | Operand::Local(index) => write!(f, "{index}"),
        }
    }
}

/// A single CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand, matching `opcode.operand_kind()`
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction, validating the operand against the opcode.
    ///
    /// Integer immediates are converted to the width the opcode takes when the value
    /// fits, and integers are accepted for argument and local indices.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if the operand cannot be used with `opcode`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cilhook::assembly::{Immediate, Instruction, OpCode, Operand};
    ///
    /// let starg = Instruction::new(OpCode::StargS, Operand::Immediate(Immediate::Int32(1)))?;
    /// assert_eq!(starg.operand, Operand::Argument(1));
    ///
    /// assert!(Instruction::new(OpCode::Ldstr, Operand::None).is_err());
    /// # Ok::<(), cilhook::Error>(())
    /// ```
    pub fn new(opcode: OpCode, operand: Operand) -> Result<Self> {
        let actual = operand.kind_name();
        let described = operand.to_string();
        match operand.coerce(opcode.operand_kind(), opcode.is_short_form()) {
            Some(operand) => Ok(Instruction { opcode, operand }),
            None => Err(Error::OperandMismatch {
                opcode: opcode.mnemonic(),
                expected: opcode.operand_kind().name(),
                actual: if described.is_empty() {
                    actual.to_string()
                } else {
                    format!("{actual} {described}")
                },
            }),
        }
    }

    /// An instruction without operand.
    ///
    /// Must only be used with opcodes whose operand kind is [`OperandKind::None`].
    #[must_use]
    pub fn op(opcode: OpCode) -> Self {
        debug_assert_eq!(opcode.operand_kind(), OperandKind::None, "{opcode} takes an operand");
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// Pushes an `int32` constant using the shortest encoding.
    #[must_use]
    pub fn ldc_i4(value: i32) -> Self {
        if let Some(opcode) = OpCode::ldc_i4_shorthand(value) {
            return Instruction::op(opcode);
        }
        match i8::try_from(value) {
            Ok(small) => Instruction {
                opcode: OpCode::LdcI4S,
                operand: Operand::Immediate(Immediate::Int8(small)),
            },
            Err(_) => Instruction {
                opcode: OpCode::LdcI4,
                operand: Operand::Immediate(Immediate::Int32(value)),
            },
        }
    }

    /// `ldstr value`
    pub fn ldstr(value: impl Into<String>) -> Self {
        Instruction {
            opcode: OpCode::Ldstr,
            operand: Operand::String(value.into()),
        }
    }

    /// Loads an argument using the shortest encoding.
    #[must_use]
    pub fn ldarg(index: u16) -> Self {
        match index {
            0 => Instruction::op(OpCode::Ldarg0),
            1 => Instruction::op(OpCode::Ldarg1),
            2 => Instruction::op(OpCode::Ldarg2),
            3 => Instruction::op(OpCode::Ldarg3),
            i if i <= u16::from(u8::MAX) => Instruction {
                opcode: OpCode::LdargS,
                operand: Operand::Argument(i),
            },
            i => Instruction {
                opcode: OpCode::Ldarg,
                operand: Operand::Argument(i),
            },
        }
    }

    /// Stores into an argument using the shortest encoding.
    #[must_use]
    pub fn starg(index: u16) -> Self {
        let opcode = if index <= u16::from(u8::MAX) {
            OpCode::StargS
        } else {
            OpCode::Starg
        };
        Instruction {
            opcode,
            operand: Operand::Argument(index),
        }
    }

    /// `call method`
    #[must_use]
    pub fn call(method: MethodRef) -> Self {
        Instruction {
            opcode: OpCode::Call,
            operand: Operand::Method(method),
        }
    }

    /// `box ty`
    #[must_use]
    pub fn box_value(ty: TypeRef) -> Self {
        Instruction::with_type(OpCode::Box, ty)
    }

    /// `unbox.any ty`
    #[must_use]
    pub fn unbox_any(ty: TypeRef) -> Self {
        Instruction::with_type(OpCode::UnboxAny, ty)
    }

    /// `castclass ty`
    #[must_use]
    pub fn castclass(ty: TypeRef) -> Self {
        Instruction::with_type(OpCode::Castclass, ty)
    }

    /// `newarr ty`
    #[must_use]
    pub fn newarr(ty: TypeRef) -> Self {
        Instruction::with_type(OpCode::Newarr, ty)
    }

    fn with_type(opcode: OpCode, ty: TypeRef) -> Self {
        Instruction {
            opcode,
            operand: Operand::Type(ty),
        }
    }

    /// A branch to `target`.
    ///
    /// Must only be used with opcodes whose operand kind is [`OperandKind::Target`].
    #[must_use]
    pub fn branch(opcode: OpCode, target: InstrId) -> Self {
        debug_assert!(opcode.is_branch(), "{opcode} is not a branch");
        Instruction {
            opcode,
            operand: Operand::Target(target),
        }
    }

    /// Returns `true` if this instruction has one or more branch targets.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self.operand, Operand::Target(_) | Operand::Switch(_))
    }

    /// The branch targets of this instruction, empty if it does not branch.
    #[must_use]
    pub fn targets(&self) -> &[InstrId] {
        match &self.operand {
            Operand::Target(target) => std::slice::from_ref(target),
            Operand::Switch(targets) => targets,
            _ => &[],
        }
    }

    /// Mutable access to the branch targets.
    pub fn targets_mut(&mut self) -> &mut [InstrId] {
        match &mut self.operand {
            Operand::Target(target) => std::slice::from_mut(target),
            Operand::Switch(targets) => targets,
            _ => &mut [],
        }
    }

    /// The constant pushed by an `ldc.i4` family instruction.
    #[must_use]
    pub fn int_constant(&self) -> Option<i32> {
        if let Some(value) = self.opcode.shorthand_constant() {
            return Some(value);
        }
        match (self.opcode, &self.operand) {
            (OpCode::LdcI4S | OpCode::LdcI4, Operand::Immediate(imm)) => {
                imm.as_i64().and_then(|v| i32::try_from(v).ok())
            }
            _ => None,
        }
    }

    /// The argument index read or written by this instruction.
    #[must_use]
    pub fn argument_index(&self) -> Option<u16> {
        if let Some(index) = self.opcode.shorthand_argument() {
            return Some(index);
        }
        match self.operand {
            Operand::Argument(index) => Some(index),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        if self.operand.is_some() {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        assert!(Instruction::new(OpCode::Nop, Operand::None).is_ok());
        assert!(Instruction::new(OpCode::Nop, Operand::Argument(1)).is_err());
        assert!(Instruction::new(OpCode::Ldstr, Operand::String("x".into())).is_ok());
        assert!(Instruction::new(OpCode::Ldstr, Operand::Type(TypeRef::object())).is_err());
        assert!(Instruction::new(OpCode::Br, Operand::Target(InstrId(0))).is_ok());
        assert!(Instruction::new(OpCode::Br, Operand::Immediate(Immediate::Int32(4))).is_err());
        assert!(Instruction::new(OpCode::Ldtoken, Operand::Type(TypeRef::object())).is_ok());

        let error = Instruction::new(OpCode::Call, Operand::String("x".into())).unwrap_err();
        assert!(matches!(
            error,
            Error::OperandMismatch { opcode: "call", expected: "method reference", .. }
        ));
    }

    #[test]
    fn immediate_coercion() {
        let ldc = Instruction::new(OpCode::LdcI4S, Operand::Immediate(Immediate::Int32(-5))).unwrap();
        assert_eq!(ldc.operand, Operand::Immediate(Immediate::Int8(-5)));
        assert!(Instruction::new(OpCode::LdcI4S, Operand::Immediate(Immediate::Int32(300))).is_err());

        let wide = Instruction::new(OpCode::LdcI8, Operand::Immediate(Immediate::Int32(7))).unwrap();
        assert_eq!(wide.operand, Operand::Immediate(Immediate::Int64(7)));

        let starg = Instruction::new(OpCode::StargS, Operand::Immediate(Immediate::UInt8(2))).unwrap();
        assert_eq!(starg.operand, Operand::Argument(2));
        assert!(Instruction::new(OpCode::StargS, Operand::Argument(256)).is_err());
        assert!(Instruction::new(OpCode::Starg, Operand::Argument(256)).is_ok());
        assert!(Instruction::new(OpCode::LdlocS, Operand::Immediate(Immediate::Int32(-1))).is_err());
    }

    #[test]
    fn shortest_encodings() {
        assert_eq!(Instruction::ldc_i4(3).opcode, OpCode::LdcI43);
        assert_eq!(Instruction::ldc_i4(-1).opcode, OpCode::LdcI4M1);
        assert_eq!(Instruction::ldc_i4(100).opcode, OpCode::LdcI4S);
        assert_eq!(Instruction::ldc_i4(1000).opcode, OpCode::LdcI4);
        for value in [-1, 0, 7, 100, -100, 1000, i32::MIN] {
            assert_eq!(Instruction::ldc_i4(value).int_constant(), Some(value));
        }

        assert_eq!(Instruction::ldarg(2).opcode, OpCode::Ldarg2);
        assert_eq!(Instruction::ldarg(9).opcode, OpCode::LdargS);
        assert_eq!(Instruction::ldarg(300).opcode, OpCode::Ldarg);
        assert_eq!(Instruction::ldarg(9).argument_index(), Some(9));
        assert_eq!(Instruction::starg(1).argument_index(), Some(1));
    }

    #[test]
    fn targets() {
        let mut br = Instruction::branch(OpCode::Br, InstrId(4));
        assert_eq!(br.targets(), &[InstrId(4)]);
        br.targets_mut()[0] = InstrId(9);
        assert_eq!(br.operand, Operand::Target(InstrId(9)));

        let switch = Instruction {
            opcode: OpCode::Switch,
            operand: Operand::Switch(vec![InstrId(1), InstrId(2)]),
        };
        assert!(switch.is_branch());
        assert_eq!(switch.targets().len(), 2);
        assert!(Instruction::op(OpCode::Ret).targets().is_empty());
        assert_eq!(switch.to_string(), "switch (#1, #2)");
    }
}
