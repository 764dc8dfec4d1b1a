//! The CIL instruction set (ECMA-335, Partition III).
//!
//! [`OpCode`] enumerates every opcode together with its encoding, its mnemonic, the
//! [`OperandKind`] of its operand and its [`FlowType`]. The enumeration is fixed and
//! known ahead of time, so name lookup is served from a process-wide table that is
//! built once on first use (see [`OpCode::from_name`]).
//!
//! Names are matched case-insensitively and accept both the ECMA mnemonic
//! (`ldc.i4.s`) and the field-style spelling used by most patch scripts (`Ldc_I4_S`).

use std::{collections::HashMap, fmt, str::FromStr, sync::OnceLock};

use strum::{EnumCount, IntoEnumIterator};

use crate::{Error, Result};

/// Types of operands for CIL instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// No operand present
    None,
    /// Signed 8-bit integer (`ldc.i4.s`)
    Int8,
    /// Unsigned 8-bit integer (`unaligned.`, `no.`)
    UInt8,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// User string literal
    String,
    /// Type reference
    Type,
    /// Field reference
    Field,
    /// Method reference
    Method,
    /// Type, field or method reference (`ldtoken`)
    Token,
    /// Stand-alone call site signature (`calli`)
    Signature,
    /// Single branch target
    Target,
    /// Switch table
    Switch,
    /// Argument index
    Argument,
    /// Local variable index
    Local,
}

impl OperandKind {
    /// Human readable name, used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OperandKind::None => "none",
            OperandKind::Int8 => "int8",
            OperandKind::UInt8 => "uint8",
            OperandKind::Int32 => "int32",
            OperandKind::Int64 => "int64",
            OperandKind::Float32 => "float32",
            OperandKind::Float64 => "float64",
            OperandKind::String => "string",
            OperandKind::Type => "type reference",
            OperandKind::Field => "field reference",
            OperandKind::Method => "method reference",
            OperandKind::Token => "metadata token",
            OperandKind::Signature => "call site signature",
            OperandKind::Target => "branch target",
            OperandKind::Switch => "switch table",
            OperandKind::Argument => "argument index",
            OperandKind::Local => "local index",
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
    /// Prefix modifying the next instruction
    Prefix,
}

macro_rules! define_opcodes {
    ($( $variant:ident = ($prefix:literal, $code:literal, $mnemonic:literal, $kind:ident, $flow:ident) ),* $(,)?) => {
        /// A CIL opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter, strum::EnumCount)]
        pub enum OpCode {
            $(
                #[doc = concat!("`", $mnemonic, "`")]
                $variant,
            )*
        }

        impl OpCode {
            /// The ECMA-335 mnemonic, e.g. `ldc.i4.s`.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( OpCode::$variant => $mnemonic, )*
                }
            }

            /// The kind of operand this opcode takes.
            #[must_use]
            pub const fn operand_kind(self) -> OperandKind {
                match self {
                    $( OpCode::$variant => OperandKind::$kind, )*
                }
            }

            /// How this opcode affects control flow.
            #[must_use]
            pub const fn flow(self) -> FlowType {
                match self {
                    $( OpCode::$variant => FlowType::$flow, )*
                }
            }

            /// The encoding as `(prefix, code)`; the prefix is `0xFE` for two-byte opcodes and `0` otherwise.
            #[must_use]
            pub const fn encoding(self) -> (u8, u8) {
                match self {
                    $( OpCode::$variant => ($prefix, $code), )*
                }
            }
        }
    };
}

define_opcodes! {
    Nop = (0x00, 0x00, "nop", None, Sequential),
    Break = (0x00, 0x01, "break", None, Sequential),
    Ldarg0 = (0x00, 0x02, "ldarg.0", None, Sequential),
    Ldarg1 = (0x00, 0x03, "ldarg.1", None, Sequential),
    Ldarg2 = (0x00, 0x04, "ldarg.2", None, Sequential),
    Ldarg3 = (0x00, 0x05, "ldarg.3", None, Sequential),
    Ldloc0 = (0x00, 0x06, "ldloc.0", None, Sequential),
    Ldloc1 = (0x00, 0x07, "ldloc.1", None, Sequential),
    Ldloc2 = (0x00, 0x08, "ldloc.2", None, Sequential),
    Ldloc3 = (0x00, 0x09, "ldloc.3", None, Sequential),
    Stloc0 = (0x00, 0x0A, "stloc.0", None, Sequential),
    Stloc1 = (0x00, 0x0B, "stloc.1", None, Sequential),
    Stloc2 = (0x00, 0x0C, "stloc.2", None, Sequential),
    Stloc3 = (0x00, 0x0D, "stloc.3", None, Sequential),
    LdargS = (0x00, 0x0E, "ldarg.s", Argument, Sequential),
    LdargaS = (0x00, 0x0F, "ldarga.s", Argument, Sequential),
    StargS = (0x00, 0x10, "starg.s", Argument, Sequential),
    LdlocS = (0x00, 0x11, "ldloc.s", Local, Sequential),
    LdlocaS = (0x00, 0x12, "ldloca.s", Local, Sequential),
    StlocS = (0x00, 0x13, "stloc.s", Local, Sequential),
    Ldnull = (0x00, 0x14, "ldnull", None, Sequential),
    LdcI4M1 = (0x00, 0x15, "ldc.i4.m1", None, Sequential),
    LdcI40 = (0x00, 0x16, "ldc.i4.0", None, Sequential),
    LdcI41 = (0x00, 0x17, "ldc.i4.1", None, Sequential),
    LdcI42 = (0x00, 0x18, "ldc.i4.2", None, Sequential),
    LdcI43 = (0x00, 0x19, "ldc.i4.3", None, Sequential),
    LdcI44 = (0x00, 0x1A, "ldc.i4.4", None, Sequential),
    LdcI45 = (0x00, 0x1B, "ldc.i4.5", None, Sequential),
    LdcI46 = (0x00, 0x1C, "ldc.i4.6", None, Sequential),
    LdcI47 = (0x00, 0x1D, "ldc.i4.7", None, Sequential),
    LdcI48 = (0x00, 0x1E, "ldc.i4.8", None, Sequential),
    LdcI4S = (0x00, 0x1F, "ldc.i4.s", Int8, Sequential),
    LdcI4 = (0x00, 0x20, "ldc.i4", Int32, Sequential),
    LdcI8 = (0x00, 0x21, "ldc.i8", Int64, Sequential),
    LdcR4 = (0x00, 0x22, "ldc.r4", Float32, Sequential),
    LdcR8 = (0x00, 0x23, "ldc.r8", Float64, Sequential),
    Dup = (0x00, 0x25, "dup", None, Sequential),
    Pop = (0x00, 0x26, "pop", None, Sequential),
    Jmp = (0x00, 0x27, "jmp", Method, Call),
    Call = (0x00, 0x28, "call", Method, Call),
    Calli = (0x00, 0x29, "calli", Signature, Call),
    Ret = (0x00, 0x2A, "ret", None, Return),
    BrS = (0x00, 0x2B, "br.s", Target, UnconditionalBranch),
    BrfalseS = (0x00, 0x2C, "brfalse.s", Target, ConditionalBranch),
    BrtrueS = (0x00, 0x2D, "brtrue.s", Target, ConditionalBranch),
    BeqS = (0x00, 0x2E, "beq.s", Target, ConditionalBranch),
    BgeS = (0x00, 0x2F, "bge.s", Target, ConditionalBranch),
    BgtS = (0x00, 0x30, "bgt.s", Target, ConditionalBranch),
    BleS = (0x00, 0x31, "ble.s", Target, ConditionalBranch),
    BltS = (0x00, 0x32, "blt.s", Target, ConditionalBranch),
    BneUnS = (0x00, 0x33, "bne.un.s", Target, ConditionalBranch),
    BgeUnS = (0x00, 0x34, "bge.un.s", Target, ConditionalBranch),
    BgtUnS = (0x00, 0x35, "bgt.un.s", Target, ConditionalBranch),
    BleUnS = (0x00, 0x36, "ble.un.s", Target, ConditionalBranch),
    BltUnS = (0x00, 0x37, "blt.un.s", Target, ConditionalBranch),
    Br = (0x00, 0x38, "br", Target, UnconditionalBranch),
    Brfalse = (0x00, 0x39, "brfalse", Target, ConditionalBranch),
    Brtrue = (0x00, 0x3A, "brtrue", Target, ConditionalBranch),
    Beq = (0x00, 0x3B, "beq", Target, ConditionalBranch),
    Bge = (0x00, 0x3C, "bge", Target, ConditionalBranch),
    Bgt = (0x00, 0x3D, "bgt", Target, ConditionalBranch),
    Ble = (0x00, 0x3E, "ble", Target, ConditionalBranch),
    Blt = (0x00, 0x3F, "blt", Target, ConditionalBranch),
    BneUn = (0x00, 0x40, "bne.un", Target, ConditionalBranch),
    BgeUn = (0x00, 0x41, "bge.un", Target, ConditionalBranch),
    BgtUn = (0x00, 0x42, "bgt.un", Target, ConditionalBranch),
    BleUn = (0x00, 0x43, "ble.un", Target, ConditionalBranch),
    BltUn = (0x00, 0x44, "blt.un", Target, ConditionalBranch),
    Switch = (0x00, 0x45, "switch", Switch, Switch),
    LdindI1 = (0x00, 0x46, "ldind.i1", None, Sequential),
    LdindU1 = (0x00, 0x47, "ldind.u1", None, Sequential),
    LdindI2 = (0x00, 0x48, "ldind.i2", None, Sequential),
    LdindU2 = (0x00, 0x49, "ldind.u2", None, Sequential),
    LdindI4 = (0x00, 0x4A, "ldind.i4", None, Sequential),
    LdindU4 = (0x00, 0x4B, "ldind.u4", None, Sequential),
    LdindI8 = (0x00, 0x4C, "ldind.i8", None, Sequential),
    LdindI = (0x00, 0x4D, "ldind.i", None, Sequential),
    LdindR4 = (0x00, 0x4E, "ldind.r4", None, Sequential),
    LdindR8 = (0x00, 0x4F, "ldind.r8", None, Sequential),
    LdindRef = (0x00, 0x50, "ldind.ref", None, Sequential),
    StindRef = (0x00, 0x51, "stind.ref", None, Sequential),
    StindI1 = (0x00, 0x52, "stind.i1", None, Sequential),
    StindI2 = (0x00, 0x53, "stind.i2", None, Sequential),
    StindI4 = (0x00, 0x54, "stind.i4", None, Sequential),
    StindI8 = (0x00, 0x55, "stind.i8", None, Sequential),
    StindR4 = (0x00, 0x56, "stind.r4", None, Sequential),
    StindR8 = (0x00, 0x57, "stind.r8", None, Sequential),
    Add = (0x00, 0x58, "add", None, Sequential),
    Sub = (0x00, 0x59, "sub", None, Sequential),
    Mul = (0x00, 0x5A, "mul", None, Sequential),
    Div = (0x00, 0x5B, "div", None, Sequential),
    DivUn = (0x00, 0x5C, "div.un", None, Sequential),
    Rem = (0x00, 0x5D, "rem", None, Sequential),
    RemUn = (0x00, 0x5E, "rem.un", None, Sequential),
    And = (0x00, 0x5F, "and", None, Sequential),
    Or = (0x00, 0x60, "or", None, Sequential),
    Xor = (0x00, 0x61, "xor", None, Sequential),
    Shl = (0x00, 0x62, "shl", None, Sequential),
    Shr = (0x00, 0x63, "shr", None, Sequential),
    ShrUn = (0x00, 0x64, "shr.un", None, Sequential),
    Neg = (0x00, 0x65, "neg", None, Sequential),
    Not = (0x00, 0x66, "not", None, Sequential),
    ConvI1 = (0x00, 0x67, "conv.i1", None, Sequential),
    ConvI2 = (0x00, 0x68, "conv.i2", None, Sequential),
    ConvI4 = (0x00, 0x69, "conv.i4", None, Sequential),
    ConvI8 = (0x00, 0x6A, "conv.i8", None, Sequential),
    ConvR4 = (0x00, 0x6B, "conv.r4", None, Sequential),
    ConvR8 = (0x00, 0x6C, "conv.r8", None, Sequential),
    ConvU4 = (0x00, 0x6D, "conv.u4", None, Sequential),
    ConvU8 = (0x00, 0x6E, "conv.u8", None, Sequential),
    Callvirt = (0x00, 0x6F, "callvirt", Method, Call),
    Cpobj = (0x00, 0x70, "cpobj", Type, Sequential),
    Ldobj = (0x00, 0x71, "ldobj", Type, Sequential),
    Ldstr = (0x00, 0x72, "ldstr", String, Sequential),
    Newobj = (0x00, 0x73, "newobj", Method, Call),
    Castclass = (0x00, 0x74, "castclass", Type, Sequential),
    Isinst = (0x00, 0x75, "isinst", Type, Sequential),
    ConvRUn = (0x00, 0x76, "conv.r.un", None, Sequential),
    Unbox = (0x00, 0x79, "unbox", Type, Sequential),
    Throw = (0x00, 0x7A, "throw", None, Throw),
    Ldfld = (0x00, 0x7B, "ldfld", Field, Sequential),
    Ldflda = (0x00, 0x7C, "ldflda", Field, Sequential),
    Stfld = (0x00, 0x7D, "stfld", Field, Sequential),
    Ldsfld = (0x00, 0x7E, "ldsfld", Field, Sequential),
    Ldsflda = (0x00, 0x7F, "ldsflda", Field, Sequential),
    Stsfld = (0x00, 0x80, "stsfld", Field, Sequential),
    Stobj = (0x00, 0x81, "stobj", Type, Sequential),
    ConvOvfI1Un = (0x00, 0x82, "conv.ovf.i1.un", None, Sequential),
    ConvOvfI2Un = (0x00, 0x83, "conv.ovf.i2.un", None, Sequential),
    ConvOvfI4Un = (0x00, 0x84, "conv.ovf.i4.un", None, Sequential),
    ConvOvfI8Un = (0x00, 0x85, "conv.ovf.i8.un", None, Sequential),
    ConvOvfU1Un = (0x00, 0x86, "conv.ovf.u1.un", None, Sequential),
    ConvOvfU2Un = (0x00, 0x87, "conv.ovf.u2.un", None, Sequential),
    ConvOvfU4Un = (0x00, 0x88, "conv.ovf.u4.un", None, Sequential),
    ConvOvfU8Un = (0x00, 0x89, "conv.ovf.u8.un", None, Sequential),
    ConvOvfIUn = (0x00, 0x8A, "conv.ovf.i.un", None, Sequential),
    ConvOvfUUn = (0x00, 0x8B, "conv.ovf.u.un", None, Sequential),
    Box = (0x00, 0x8C, "box", Type, Sequential),
    Newarr = (0x00, 0x8D, "newarr", Type, Sequential),
    Ldlen = (0x00, 0x8E, "ldlen", None, Sequential),
    Ldelema = (0x00, 0x8F, "ldelema", Type, Sequential),
    LdelemI1 = (0x00, 0x90, "ldelem.i1", None, Sequential),
    LdelemU1 = (0x00, 0x91, "ldelem.u1", None, Sequential),
    LdelemI2 = (0x00, 0x92, "ldelem.i2", None, Sequential),
    LdelemU2 = (0x00, 0x93, "ldelem.u2", None, Sequential),
    LdelemI4 = (0x00, 0x94, "ldelem.i4", None, Sequential),
    LdelemU4 = (0x00, 0x95, "ldelem.u4", None, Sequential),
    LdelemI8 = (0x00, 0x96, "ldelem.i8", None, Sequential),
    LdelemI = (0x00, 0x97, "ldelem.i", None, Sequential),
    LdelemR4 = (0x00, 0x98, "ldelem.r4", None, Sequential),
    LdelemR8 = (0x00, 0x99, "ldelem.r8", None, Sequential),
    LdelemRef = (0x00, 0x9A, "ldelem.ref", None, Sequential),
    StelemI = (0x00, 0x9B, "stelem.i", None, Sequential),
    StelemI1 = (0x00, 0x9C, "stelem.i1", None, Sequential),
    StelemI2 = (0x00, 0x9D, "stelem.i2", None, Sequential),
    StelemI4 = (0x00, 0x9E, "stelem.i4", None, Sequential),
    StelemI8 = (0x00, 0x9F, "stelem.i8", None, Sequential),
    StelemR4 = (0x00, 0xA0, "stelem.r4", None, Sequential),
    StelemR8 = (0x00, 0xA1, "stelem.r8", None, Sequential),
    StelemRef = (0x00, 0xA2, "stelem.ref", None, Sequential),
    Ldelem = (0x00, 0xA3, "ldelem", Type, Sequential),
    Stelem = (0x00, 0xA4, "stelem", Type, Sequential),
    UnboxAny = (0x00, 0xA5, "unbox.any", Type, Sequential),
    ConvOvfI1 = (0x00, 0xB3, "conv.ovf.i1", None, Sequential),
    ConvOvfU1 = (0x00, 0xB4, "conv.ovf.u1", None, Sequential),
    ConvOvfI2 = (0x00, 0xB5, "conv.ovf.i2", None, Sequential),
    ConvOvfU2 = (0x00, 0xB6, "conv.ovf.u2", None, Sequential),
    ConvOvfI4 = (0x00, 0xB7, "conv.ovf.i4", None, Sequential),
    ConvOvfU4 = (0x00, 0xB8, "conv.ovf.u4", None, Sequential),
    ConvOvfI8 = (0x00, 0xB9, "conv.ovf.i8", None, Sequential),
    ConvOvfU8 = (0x00, 0xBA, "conv.ovf.u8", None, Sequential),
    Refanyval = (0x00, 0xC2, "refanyval", Type, Sequential),
    Ckfinite = (0x00, 0xC3, "ckfinite", None, Sequential),
    Mkrefany = (0x00, 0xC6, "mkrefany", Type, Sequential),
    Ldtoken = (0x00, 0xD0, "ldtoken", Token, Sequential),
    ConvU2 = (0x00, 0xD1, "conv.u2", None, Sequential),
    ConvU1 = (0x00, 0xD2, "conv.u1", None, Sequential),
    ConvI = (0x00, 0xD3, "conv.i", None, Sequential),
    ConvOvfI = (0x00, 0xD4, "conv.ovf.i", None, Sequential),
    ConvOvfU = (0x00, 0xD5, "conv.ovf.u", None, Sequential),
    AddOvf = (0x00, 0xD6, "add.ovf", None, Sequential),
    AddOvfUn = (0x00, 0xD7, "add.ovf.un", None, Sequential),
    MulOvf = (0x00, 0xD8, "mul.ovf", None, Sequential),
    MulOvfUn = (0x00, 0xD9, "mul.ovf.un", None, Sequential),
    SubOvf = (0x00, 0xDA, "sub.ovf", None, Sequential),
    SubOvfUn = (0x00, 0xDB, "sub.ovf.un", None, Sequential),
    Endfinally = (0x00, 0xDC, "endfinally", None, EndFinally),
    Leave = (0x00, 0xDD, "leave", Target, Leave),
    LeaveS = (0x00, 0xDE, "leave.s", Target, Leave),
    StindI = (0x00, 0xDF, "stind.i", None, Sequential),
    ConvU = (0x00, 0xE0, "conv.u", None, Sequential),
    Arglist = (0xFE, 0x00, "arglist", None, Sequential),
    Ceq = (0xFE, 0x01, "ceq", None, Sequential),
    Cgt = (0xFE, 0x02, "cgt", None, Sequential),
    CgtUn = (0xFE, 0x03, "cgt.un", None, Sequential),
    Clt = (0xFE, 0x04, "clt", None, Sequential),
    CltUn = (0xFE, 0x05, "clt.un", None, Sequential),
    Ldftn = (0xFE, 0x06, "ldftn", Method, Sequential),
    Ldvirtftn = (0xFE, 0x07, "ldvirtftn", Method, Sequential),
    Ldarg = (0xFE, 0x09, "ldarg", Argument, Sequential),
    Ldarga = (0xFE, 0x0A, "ldarga", Argument, Sequential),
    Starg = (0xFE, 0x0B, "starg", Argument, Sequential),
    Ldloc = (0xFE, 0x0C, "ldloc", Local, Sequential),
    Ldloca = (0xFE, 0x0D, "ldloca", Local, Sequential),
    Stloc = (0xFE, 0x0E, "stloc", Local, Sequential),
    Localloc = (0xFE, 0x0F, "localloc", None, Sequential),
    Endfilter = (0xFE, 0x11, "endfilter", None, EndFinally),
    Unaligned = (0xFE, 0x12, "unaligned.", UInt8, Prefix),
    Volatile = (0xFE, 0x13, "volatile.", None, Prefix),
    Tail = (0xFE, 0x14, "tail.", None, Prefix),
    Initobj = (0xFE, 0x15, "initobj", Type, Sequential),
    Constrained = (0xFE, 0x16, "constrained.", Type, Prefix),
    Cpblk = (0xFE, 0x17, "cpblk", None, Sequential),
    Initblk = (0xFE, 0x18, "initblk", None, Sequential),
    No = (0xFE, 0x19, "no.", UInt8, Prefix),
    Rethrow = (0xFE, 0x1A, "rethrow", None, Throw),
    Sizeof = (0xFE, 0x1C, "sizeof", Type, Sequential),
    Refanytype = (0xFE, 0x1D, "refanytype", None, Sequential),
    Readonly = (0xFE, 0x1E, "readonly.", None, Prefix),
}

static NAME_TO_OPCODE: OnceLock<HashMap<String, OpCode>> = OnceLock::new();

/// Canonical lookup key: lowercase, `_` treated as `.`, trailing `.` of prefixes dropped.
fn normalize(name: &str) -> String {
    let lowered = name.trim().to_ascii_lowercase().replace('_', ".");
    lowered.trim_end_matches('.').to_string()
}

fn name_lookup() -> &'static HashMap<String, OpCode> {
    NAME_TO_OPCODE.get_or_init(|| {
        let mut map = HashMap::with_capacity(OpCode::COUNT);
        for opcode in OpCode::iter() {
            map.insert(normalize(opcode.mnemonic()), opcode);
        }
        map
    })
}

impl OpCode {
    /// Looks up an opcode by name.
    ///
    /// The lookup is case-insensitive and treats `_` like `.`, so `Ldc_I4_S`,
    /// `ldc.i4.s` and `LDC_I4_S` all resolve to [`OpCode::LdcI4S`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cilhook::assembly::OpCode;
    ///
    /// assert_eq!(OpCode::from_name("Unbox_Any"), Some(OpCode::UnboxAny));
    /// assert_eq!(OpCode::from_name("tail."), Some(OpCode::Tail));
    /// assert_eq!(OpCode::from_name("frobnicate"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<OpCode> {
        name_lookup().get(&normalize(name)).copied()
    }

    /// Returns `true` if this opcode branches to a single target.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(self.operand_kind(), OperandKind::Target)
    }

    /// Returns `true` if execution never falls through to the next instruction.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self.flow(),
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        )
    }

    /// Returns `true` for the single byte operand short forms (`ldarg.s`, `br.s`, ...).
    #[must_use]
    pub fn is_short_form(self) -> bool {
        self.mnemonic().ends_with(".s")
    }

    /// The `ldc.i4.N` shorthand for small constants, if one exists.
    #[must_use]
    pub const fn ldc_i4_shorthand(value: i32) -> Option<OpCode> {
        Some(match value {
            -1 => OpCode::LdcI4M1,
            0 => OpCode::LdcI40,
            1 => OpCode::LdcI41,
            2 => OpCode::LdcI42,
            3 => OpCode::LdcI43,
            4 => OpCode::LdcI44,
            5 => OpCode::LdcI45,
            6 => OpCode::LdcI46,
            7 => OpCode::LdcI47,
            8 => OpCode::LdcI48,
            _ => return None,
        })
    }

    /// The constant pushed by an `ldc.i4.N` shorthand.
    #[must_use]
    pub const fn shorthand_constant(self) -> Option<i32> {
        Some(match self {
            OpCode::LdcI4M1 => -1,
            OpCode::LdcI40 => 0,
            OpCode::LdcI41 => 1,
            OpCode::LdcI42 => 2,
            OpCode::LdcI43 => 3,
            OpCode::LdcI44 => 4,
            OpCode::LdcI45 => 5,
            OpCode::LdcI46 => 6,
            OpCode::LdcI47 => 7,
            OpCode::LdcI48 => 8,
            _ => return None,
        })
    }

    /// The argument index encoded into `ldarg.N`.
    #[must_use]
    pub const fn shorthand_argument(self) -> Option<u16> {
        Some(match self {
            OpCode::Ldarg0 => 0,
            OpCode::Ldarg1 => 1,
            OpCode::Ldarg2 => 2,
            OpCode::Ldarg3 => 3,
            _ => return None,
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for OpCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OpCode::from_name(s).ok_or_else(|| Error::UnknownOpcode(s.to_string()))
    }
}

impl From<OpCode> for String {
    fn from(opcode: OpCode) -> Self {
        opcode.mnemonic().to_string()
    }
}

impl TryFrom<String> for OpCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}
