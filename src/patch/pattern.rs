//! Pattern Finder: locating opcode subsequences inside a method body.
//!
//! A pattern is an ordered list of [`OpClass`]es. A match is a position `i` such that the
//! instruction at `i + k` satisfies class `k` for every `k`. Operands are ignored; the
//! Structural Matcher ([`crate::patch::MatchSpec`]) is the tool for operand checks.
//!
//! # Examples
//!
//! ```rust
//! use cilhook::{assembly::{Instruction, OpCode}, metadata::MethodBody, patch::OpcodePattern};
//!
//! let mut body = MethodBody::new();
//! for op in [OpCode::Ldarg0, OpCode::Dup, OpCode::Pop, OpCode::Dup, OpCode::Pop, OpCode::Ret] {
//!     body.push(Instruction::op(op));
//! }
//!
//! let pattern = OpcodePattern::new(&[OpCode::Dup, OpCode::Pop]);
//! assert_eq!(pattern.find(&body), vec![1, 3]);
//! assert!(OpcodePattern::exactly_once(&[OpCode::Dup, OpCode::Pop]).locate(&body).is_err());
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    assembly::OpCode,
    metadata::MethodBody,
    Error, Result,
};

/// A set of opcodes a single pattern element accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum OpClass {
    /// Exactly this opcode
    Exact(OpCode),
    /// Any of these opcodes
    AnyOf(Vec<OpCode>),
    /// Any instruction with a single branch target
    AnyBranch,
    /// Any instruction
    Any,
}

impl OpClass {
    /// Returns `true` if `opcode` belongs to this class.
    #[must_use]
    pub fn accepts(&self, opcode: OpCode) -> bool {
        match self {
            OpClass::Exact(expected) => *expected == opcode,
            OpClass::AnyOf(set) => set.contains(&opcode),
            OpClass::AnyBranch => opcode.is_branch(),
            OpClass::Any => true,
        }
    }
}

impl From<OpCode> for OpClass {
    fn from(opcode: OpCode) -> Self {
        OpClass::Exact(opcode)
    }
}

impl fmt::Display for OpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpClass::Exact(opcode) => write!(f, "{opcode}"),
            OpClass::AnyOf(set) => {
                let names: Vec<&str> = set.iter().map(|op| op.mnemonic()).collect();
                f.write_str(&names.join("|"))
            }
            OpClass::AnyBranch => f.write_str("<branch>"),
            OpClass::Any => f.write_str("*"),
        }
    }
}

/// Parses `*`, `<branch>`, `ldarg.0` or `brtrue|brtrue.s`.
impl FromStr for OpClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "*" => Ok(OpClass::Any),
            "<branch>" | "branch" => Ok(OpClass::AnyBranch),
            alternatives if alternatives.contains('|') => {
                let set = alternatives
                    .split('|')
                    .map(str::parse)
                    .collect::<Result<Vec<OpCode>>>()?;
                Ok(OpClass::AnyOf(set))
            }
            single => Ok(OpClass::Exact(single.parse()?)),
        }
    }
}

impl From<OpClass> for String {
    fn from(class: OpClass) -> Self {
        class.to_string()
    }
}

impl TryFrom<String> for OpClass {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// How many times a pattern is expected to occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Occurrences {
    /// Exactly `n` matches
    Exactly(usize),
    /// At least `n` matches
    AtLeast(usize),
    /// Any number of matches, including none
    #[default]
    Any,
}

impl Occurrences {
    fn admits(self, found: usize) -> bool {
        match self {
            Occurrences::Exactly(n) => found == n,
            Occurrences::AtLeast(n) => found >= n,
            Occurrences::Any => true,
        }
    }
}

impl fmt::Display for Occurrences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occurrences::Exactly(n) => write!(f, "exactly {n}"),
            Occurrences::AtLeast(n) => write!(f, "at least {n}"),
            Occurrences::Any => f.write_str("any number"),
        }
    }
}

/// An opcode subsequence plus the number of times it is expected to occur.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpcodePattern {
    /// The elements, in order
    pub classes: Vec<OpClass>,
    /// The expected occurrence count, checked by [`OpcodePattern::locate`]
    #[serde(default)]
    pub expected: Occurrences,
}

impl OpcodePattern {
    /// A pattern of exact opcodes with no count expectation.
    #[must_use]
    pub fn new(opcodes: &[OpCode]) -> Self {
        OpcodePattern {
            classes: opcodes.iter().copied().map(OpClass::Exact).collect(),
            expected: Occurrences::Any,
        }
    }

    /// A pattern of arbitrary classes with no count expectation.
    #[must_use]
    pub fn from_classes(classes: Vec<OpClass>) -> Self {
        OpcodePattern {
            classes,
            expected: Occurrences::Any,
        }
    }

    /// A pattern of exact opcodes that must occur exactly once.
    #[must_use]
    pub fn exactly_once(opcodes: &[OpCode]) -> Self {
        OpcodePattern::new(opcodes).expect(Occurrences::Exactly(1))
    }

    /// Sets the expected occurrence count.
    #[must_use]
    pub fn expect(mut self, expected: Occurrences) -> Self {
        self.expected = expected;
        self
    }

    /// Number of instructions a match spans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` for a pattern without elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Returns every start position, ascending; overlapping matches are included.
    ///
    /// An empty pattern matches nowhere.
    #[must_use]
    pub fn find(&self, body: &MethodBody) -> Vec<usize> {
        find(body, self)
    }

    /// Like [`OpcodePattern::locate_in`], describing the searched body generically.
    ///
    /// # Errors
    ///
    /// See [`OpcodePattern::locate_in`].
    pub fn locate(&self, body: &MethodBody) -> Result<usize> {
        self.locate_in(body, "method body")
    }

    /// Returns the first match after checking the expected occurrence count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeNotFound`] if nothing matches and [`Error::AmbiguousShape`] if
    /// the number of matches differs from the expectation.
    pub fn locate_in(&self, body: &MethodBody, context: &str) -> Result<usize> {
        self.locate_all_in(body, context)?
            .first()
            .copied()
            .ok_or_else(|| Error::ShapeNotFound {
                context: context.to_string(),
                pattern: self.to_string(),
            })
    }

    /// Returns every match after checking the expected occurrence count.
    ///
    /// # Errors
    ///
    /// See [`OpcodePattern::locate_in`].
    pub fn locate_all_in(&self, body: &MethodBody, context: &str) -> Result<Vec<usize>> {
        let found = self.find(body);
        if found.is_empty() && self.expected != Occurrences::Any {
            return Err(Error::ShapeNotFound {
                context: context.to_string(),
                pattern: self.to_string(),
            });
        }
        if !self.expected.admits(found.len()) {
            return Err(Error::AmbiguousShape {
                context: context.to_string(),
                pattern: self.to_string(),
                expected: self.expected.to_string(),
                found: found.len(),
            });
        }
        Ok(found)
    }
}

impl fmt::Display for OpcodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, class) in self.classes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{class}")?;
        }
        f.write_str("]")
    }
}

/// Scans `body` once, left to right, for every start position of `pattern`.
#[must_use]
pub fn find(body: &MethodBody, pattern: &OpcodePattern) -> Vec<usize> {
    if pattern.is_empty() {
        return Vec::new();
    }

    let opcodes = body.opcodes();
    opcodes
        .windows(pattern.len())
        .enumerate()
        .filter(|(_, window)| {
            window
                .iter()
                .zip(&pattern.classes)
                .all(|(opcode, class)| class.accepts(*opcode))
        })
        .map(|(start, _)| start)
        .collect()
}
