//! Instruction templates and their two-pass compilation.
//!
//! Patch scripts and profiles describe instructions textually: an opcode name, an operand
//! type tag and an operand string (`name="call" opType="mref" op="Foo;Bar;System.Int32"`).
//! An [`InstructionTemplate`] is the parsed form; the [`TemplateCompiler`] turns a list of
//! templates into concrete instructions inside a method body, resolving references
//! through a [`Scope`].
//!
//! Branch operands (`instref`) name the position of another instruction of the same
//! fragment. References to positions that are not built yet are compiled in a second
//! pass: the first pass allocates a placeholder `nop` and records it, the second pass
//! overwrites the placeholder in place once every position has an identity. Because
//! the placeholder's identity is kept, earlier references to it stay valid.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    assembly::{Immediate, InstrId, Instruction, OpCode, Operand},
    metadata::{MethodBody, Scope},
    patch::{ExpectedOperand, MatchEntry, MatchIndex, MatchSpec},
    Result,
};

/// The operand of an [`InstructionTemplate`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperandTemplate {
    /// No operand
    None,
    /// `sbyte`
    Int8(i8),
    /// `byte`
    UInt8(u8),
    /// `int32` / `int`
    Int32(i32),
    /// `int64` / `long`
    Int64(i64),
    /// `single` / `float`
    Float32(f32),
    /// `double`
    Float64(f64),
    /// `string`
    String(String),
    /// `tref`: qualified type name
    TypeRef(String),
    /// `fref`: `Type;field`
    FieldRef {
        /// Qualified declaring type
        type_name: String,
        /// Field name
        member: String,
    },
    /// `mref`: `Type;method[;param;param...]`
    MethodRef {
        /// Qualified declaring type
        type_name: String,
        /// Method name
        member: String,
        /// Parameter type names used to pick an overload
        parameters: Option<Vec<String>>,
    },
    /// `instref`: position of another instruction of the same fragment
    InstrRef(usize),
}

impl OperandTemplate {
    /// Parses an operand from its type tag and text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Script`] for unknown type tags, unparsable numbers and
    /// malformed reference strings.
    pub fn parse(op_type: &str, op: &str) -> Result<Self> {
        fn number<T: std::str::FromStr>(op: &str, what: &str) -> Result<T> {
            op.trim()
                .parse()
                .map_err(|_| script_error!("'{}' is not a valid {} operand", op, what))
        }

        let parts = || -> Vec<String> {
            op.split(';')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        };

        Ok(match op_type.trim().to_ascii_lowercase().as_str() {
            "" | "none" => OperandTemplate::None,
            "sbyte" => OperandTemplate::Int8(number(op, "sbyte")?),
            "byte" => OperandTemplate::UInt8(number(op, "byte")?),
            "int32" | "int" => OperandTemplate::Int32(number(op, "int32")?),
            "int64" | "long" => OperandTemplate::Int64(number(op, "int64")?),
            "single" | "float" => OperandTemplate::Float32(number(op, "single")?),
            "double" => OperandTemplate::Float64(number(op, "double")?),
            "string" => OperandTemplate::String(op.to_string()),
            "tref" => {
                if op.trim().is_empty() {
                    return Err(script_error!("A tref operand needs a type name"));
                }
                OperandTemplate::TypeRef(op.trim().to_string())
            }
            "fref" => {
                let parts = parts();
                let [type_name, member] = parts.as_slice() else {
                    return Err(script_error!(
                        "A fref operand needs exactly 'Type;field', got '{}'",
                        op
                    ));
                };
                OperandTemplate::FieldRef {
                    type_name: type_name.clone(),
                    member: member.clone(),
                }
            }
            "mref" => {
                let mut parts = parts();
                if parts.len() < 2 {
                    return Err(script_error!(
                        "A mref operand needs at least 'Type;method', got '{}'",
                        op
                    ));
                }
                let parameters = parts.split_off(2);
                let member = parts.pop().unwrap_or_default();
                let type_name = parts.pop().unwrap_or_default();
                OperandTemplate::MethodRef {
                    type_name,
                    member,
                    parameters: (!parameters.is_empty()).then_some(parameters),
                }
            }
            "instref" => OperandTemplate::InstrRef(number(op, "instref")?),
            other => return Err(script_error!("Unknown operand type '{}'", other)),
        })
    }

    /// The type tag and text this operand is written as.
    #[must_use]
    pub fn to_parts(&self) -> (&'static str, String) {
        match self {
            OperandTemplate::None => ("none", String::new()),
            OperandTemplate::Int8(v) => ("sbyte", v.to_string()),
            OperandTemplate::UInt8(v) => ("byte", v.to_string()),
            OperandTemplate::Int32(v) => ("int32", v.to_string()),
            OperandTemplate::Int64(v) => ("int64", v.to_string()),
            OperandTemplate::Float32(v) => ("single", v.to_string()),
            OperandTemplate::Float64(v) => ("double", v.to_string()),
            OperandTemplate::String(s) => ("string", s.clone()),
            OperandTemplate::TypeRef(name) => ("tref", name.clone()),
            OperandTemplate::FieldRef { type_name, member } => {
                ("fref", format!("{type_name};{member}"))
            }
            OperandTemplate::MethodRef {
                type_name,
                member,
                parameters,
            } => {
                let mut text = format!("{type_name};{member}");
                for param in parameters.iter().flatten() {
                    text.push(';');
                    text.push_str(param);
                }
                ("mref", text)
            }
            OperandTemplate::InstrRef(position) => ("instref", position.to_string()),
        }
    }
}

/// A textual instruction description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TemplateText", into = "TemplateText")]
pub struct InstructionTemplate {
    /// Index used by match blocks; negative values count from the end
    pub index: Option<isize>,
    /// The opcode
    pub opcode: OpCode,
    /// The operand
    pub operand: OperandTemplate,
}

impl InstructionTemplate {
    /// A template without operand.
    #[must_use]
    pub fn op(opcode: OpCode) -> Self {
        InstructionTemplate {
            index: None,
            opcode,
            operand: OperandTemplate::None,
        }
    }

    /// A template with an operand.
    #[must_use]
    pub fn with(opcode: OpCode, operand: OperandTemplate) -> Self {
        InstructionTemplate {
            index: None,
            opcode,
            operand,
        }
    }

    /// Parses the textual form used by scripts and profiles.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownOpcode`] for unknown opcode names and
    /// [`crate::Error::Script`] for malformed operands.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cilhook::{assembly::OpCode, patch::{InstructionTemplate, OperandTemplate}};
    ///
    /// let starg = InstructionTemplate::parse("Starg_S", "byte", "1")?;
    /// assert_eq!(starg.opcode, OpCode::StargS);
    /// assert_eq!(starg.operand, OperandTemplate::UInt8(1));
    /// # Ok::<(), cilhook::Error>(())
    /// ```
    pub fn parse(name: &str, op_type: &str, op: &str) -> Result<Self> {
        Ok(InstructionTemplate {
            index: None,
            opcode: name.parse()?,
            operand: OperandTemplate::parse(op_type, op)?,
        })
    }
}

impl fmt::Display for InstructionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        let (op_type, op) = self.operand.to_parts();
        if op_type != "none" {
            write!(f, " {op_type}:{op}")?;
        }
        Ok(())
    }
}

/// Serialized form of an [`InstructionTemplate`], mirroring the `<opcode>` element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<isize>,
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    op_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    op: String,
}

impl TryFrom<TemplateText> for InstructionTemplate {
    type Error = crate::Error;

    fn try_from(text: TemplateText) -> Result<Self> {
        let mut template = InstructionTemplate::parse(&text.name, &text.op_type, &text.op)?;
        template.index = text.index;
        Ok(template)
    }
}

impl From<InstructionTemplate> for TemplateText {
    fn from(template: InstructionTemplate) -> Self {
        let (op_type, op) = template.operand.to_parts();
        TemplateText {
            index: template.index,
            name: template.opcode.mnemonic().to_string(),
            op_type: if op_type == "none" { String::new() } else { op_type.to_string() },
            op,
        }
    }
}

/// Compilation state of one template position.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Resolved(InstrId),
    Pending { placeholder: InstrId, target: usize },
}

impl Slot {
    fn id(self) -> InstrId {
        match self {
            Slot::Resolved(id) | Slot::Pending { placeholder: id, .. } => id,
        }
    }
}

/// Compiles templates against a scope.
pub struct TemplateCompiler<'s> {
    scope: &'s Scope<'s>,
}

impl<'s> TemplateCompiler<'s> {
    /// Creates a compiler resolving references in `scope`.
    #[must_use]
    pub fn new(scope: &'s Scope<'s>) -> Self {
        TemplateCompiler { scope }
    }

    /// Resolves the operand of `template`; `position` maps `instref` positions to identities.
    fn operand(
        &self,
        template: &InstructionTemplate,
        position: impl Fn(usize) -> Option<InstrId>,
    ) -> Result<Option<Operand>> {
        Ok(Some(match &template.operand {
            OperandTemplate::None => Operand::None,
            OperandTemplate::Int8(v) => Operand::Immediate(Immediate::Int8(*v)),
            OperandTemplate::UInt8(v) => Operand::Immediate(Immediate::UInt8(*v)),
            OperandTemplate::Int32(v) => Operand::Immediate(Immediate::Int32(*v)),
            OperandTemplate::Int64(v) => Operand::Immediate(Immediate::Int64(*v)),
            OperandTemplate::Float32(v) => Operand::Immediate(Immediate::Float32(*v)),
            OperandTemplate::Float64(v) => Operand::Immediate(Immediate::Float64(*v)),
            OperandTemplate::String(s) => Operand::String(s.clone()),
            OperandTemplate::TypeRef(name) => Operand::Type(self.scope.type_ref(name)?),
            OperandTemplate::FieldRef { type_name, member } => {
                Operand::Field(self.scope.field_ref(type_name, member)?)
            }
            OperandTemplate::MethodRef {
                type_name,
                member,
                parameters,
            } => Operand::Method(self.scope.method_ref(type_name, member, parameters.as_deref())?),
            OperandTemplate::InstrRef(target) => match position(*target) {
                Some(id) => Operand::Target(id),
                None => return Ok(None),
            },
        }))
    }

    /// Compiles a fragment into `body`'s arena and returns the identities in order.
    ///
    /// The instructions are not inserted into the stream; see [`crate::patch::splice`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SymbolNotFound`] if a reference does not resolve,
    /// [`crate::Error::OperandMismatch`] if an operand does not fit its opcode and
    /// [`crate::Error::Script`] if an `instref` points past the end of the fragment.
    pub fn compile(
        &self,
        body: &mut MethodBody,
        templates: &[InstructionTemplate],
    ) -> Result<Vec<InstrId>> {
        let mut slots: Vec<Slot> = Vec::with_capacity(templates.len());

        for (position, template) in templates.iter().enumerate() {
            let built: Vec<InstrId> = slots.iter().map(|slot| slot.id()).collect();
            let slot = match self.operand(template, |target| built.get(target).copied())? {
                Some(operand) => Slot::Resolved(body.create(Instruction::new(template.opcode, operand)?)),
                None => {
                    let OperandTemplate::InstrRef(target) = template.operand else {
                        return Err(script_error!("Unresolved operand at position {}", position));
                    };
                    Slot::Pending {
                        placeholder: body.create(Instruction::op(OpCode::Nop)),
                        target,
                    }
                }
            };
            slots.push(slot);
        }

        let ids: Vec<InstrId> = slots.iter().map(|slot| slot.id()).collect();
        for (position, slot) in slots.iter().enumerate() {
            let Slot::Pending { placeholder, target } = *slot else {
                continue;
            };
            let Some(resolved) = ids.get(target).copied() else {
                return Err(script_error!(
                    "Instruction reference out of range: position {} refers to {} in a fragment of {} instructions",
                    position,
                    target,
                    ids.len()
                ));
            };
            let instruction = Instruction::new(templates[position].opcode, Operand::Target(resolved))?;
            if let Some(existing) = body.get_mut(placeholder) {
                *existing = instruction;
            }
        }

        Ok(ids)
    }

    /// Compiles a match block into a [`MatchSpec`].
    ///
    /// `instref` operands name absolute positions of the checked body.
    ///
    /// # Errors
    ///
    /// Same as [`TemplateCompiler::compile`], except that `instref` never fails.
    pub fn compile_match(&self, templates: &[InstructionTemplate]) -> Result<MatchSpec> {
        let mut spec = MatchSpec::new();
        for template in templates {
            let operand = match &template.operand {
                OperandTemplate::None => ExpectedOperand::Any,
                OperandTemplate::InstrRef(position) => ExpectedOperand::Position(*position),
                _ => match self.operand(template, |_| None)? {
                    Some(operand) => {
                        ExpectedOperand::Value(Instruction::new(template.opcode, operand)?.operand)
                    }
                    None => ExpectedOperand::Any,
                },
            };
            spec = spec.entry(MatchEntry {
                index: MatchIndex::from_signed(template.index),
                opcode: template.opcode,
                operand,
            });
        }
        Ok(spec)
    }
}
