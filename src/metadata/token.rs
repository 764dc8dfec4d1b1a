//! Name-addressed references to types, fields and methods.
//!
//! Inside a module image every operand that points at metadata is stored by name rather
//! than by table row, so references survive patching and can point into other modules
//! (the runtime library, the dispatcher module). Equality of references is equality of
//! their names and signatures.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const VALUE_TYPE_PREFIX: &str = "valuetype ";

/// A reference to a type by its qualified name.
///
/// Nested types use `/` as separator (`Outer/Inner`), namespaces use `.`.
/// In module images a type reference is a single string; value types carry a
/// `valuetype ` prefix (`"valuetype System.Int32"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TypeRef {
    /// The namespace, empty for the global namespace and nested types
    pub namespace: String,
    /// The type name, including enclosing types for nested types
    pub name: String,
    /// Whether the type is a value type (needs boxing to travel as `System.Object`)
    pub is_value_type: bool,
}

impl TypeRef {
    /// Creates a reference to a reference type.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeRef {
            namespace: namespace.into(),
            name: name.into(),
            is_value_type: false,
        }
    }

    /// Creates a reference to a value type.
    pub fn value_type(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeRef {
            namespace: namespace.into(),
            name: name.into(),
            is_value_type: true,
        }
    }

    /// Splits a qualified name (`System.Collections.Generic.List`) at the last `.`
    /// that is not part of a nested type path.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cilhook::metadata::TypeRef;
    ///
    /// let ty = TypeRef::parse("SurvivalKit.Events.EventManager");
    /// assert_eq!(ty.namespace, "SurvivalKit.Events");
    /// assert_eq!(ty.name, "EventManager");
    ///
    /// let nested = TypeRef::parse("Outer/Inner");
    /// assert_eq!(nested.namespace, "");
    /// assert_eq!(nested.full_name(), "Outer/Inner");
    /// ```
    #[must_use]
    pub fn parse(qualified: &str) -> Self {
        let qualified = qualified.trim();
        let outer = qualified.split('/').next().unwrap_or(qualified);
        match outer.rfind('.') {
            Some(split) => TypeRef::new(&qualified[..split], &qualified[split + 1..]),
            None => TypeRef::new("", qualified),
        }
    }

    /// The qualified name, `Namespace.Name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// The innermost name, without namespace or enclosing types.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Returns `true` if `name` is either the qualified or the simple name of this type.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        let name = name.trim();
        self.simple_name() == name || self.full_name() == name
    }

    /// `System.Object`
    #[must_use]
    pub fn object() -> Self {
        TypeRef::new("System", "Object")
    }

    /// `System.String`
    #[must_use]
    pub fn string() -> Self {
        TypeRef::new("System", "String")
    }

    /// `System.Boolean`
    #[must_use]
    pub fn boolean() -> Self {
        TypeRef::value_type("System", "Boolean")
    }

    /// `System.Int32`
    #[must_use]
    pub fn int32() -> Self {
        TypeRef::value_type("System", "Int32")
    }

    /// `System.Void`
    #[must_use]
    pub fn void() -> Self {
        TypeRef::value_type("System", "Void")
    }

    /// Returns `true` for `System.Void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.namespace == "System" && self.name == "Void"
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.namespace.is_empty() {
            write!(f, "{}.", self.namespace)?;
        }
        f.write_str(&self.name)
    }
}

impl From<TypeRef> for String {
    fn from(ty: TypeRef) -> Self {
        if ty.is_value_type {
            format!("{VALUE_TYPE_PREFIX}{}", ty.full_name())
        } else {
            ty.full_name()
        }
    }
}

impl TryFrom<String> for TypeRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        let (is_value_type, name) = match value.strip_prefix(VALUE_TYPE_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, value.as_str()),
        };
        if name.trim().is_empty() {
            return Err(Error::InvalidModule {
                name: String::new(),
                message: "empty type reference".to_string(),
            });
        }

        let mut ty = TypeRef::parse(name);
        ty.is_value_type = is_value_type;
        Ok(ty)
    }
}

/// A reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// The type declaring the field
    pub declaring: TypeRef,
    /// The field name
    pub name: String,
    /// The type of the field
    pub field_type: TypeRef,
}

impl FieldRef {
    /// Creates a new field reference.
    pub fn new(declaring: TypeRef, name: impl Into<String>, field_type: TypeRef) -> Self {
        FieldRef {
            declaring,
            name: name.into(),
            field_type,
        }
    }

    /// The signature string, `FieldType Declaring::name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}::{}", self.field_type, self.declaring, self.name)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.field_type, self.declaring, self.name)
    }
}

/// A reference to a method, including its signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    /// The type declaring the method
    pub declaring: TypeRef,
    /// The method name
    pub name: String,
    /// Parameter types in declaration order, without the implicit `this`
    #[serde(default)]
    pub parameters: Vec<TypeRef>,
    /// The return type
    pub return_type: TypeRef,
    /// Whether the method takes an implicit `this`
    #[serde(default)]
    pub has_this: bool,
}

impl MethodRef {
    /// Creates a reference to a static method.
    pub fn new(
        declaring: TypeRef,
        name: impl Into<String>,
        parameters: Vec<TypeRef>,
        return_type: TypeRef,
    ) -> Self {
        MethodRef {
            declaring,
            name: name.into(),
            parameters,
            return_type,
            has_this: false,
        }
    }

    /// Marks the referenced method as an instance method.
    #[must_use]
    pub fn with_this(mut self) -> Self {
        self.has_this = true;
        self
    }

    /// The signature string, `Return Declaring::Name(P1,P2)`.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.to_string()
    }

    /// Number of values this method pops from the evaluation stack when called.
    #[must_use]
    pub fn stack_inputs(&self) -> usize {
        self.parameters.len() + usize::from(self.has_this)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}(", self.return_type, self.declaring, self.name)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        let ty = TypeRef::parse("System.Int32");
        assert!(ty.matches_name("Int32"));
        assert!(ty.matches_name("System.Int32"));
        assert!(!ty.matches_name("Int64"));

        let global = TypeRef::parse("ChunkCluster");
        assert_eq!(global.namespace, "");
        assert_eq!(global.full_name(), "ChunkCluster");

        let nested = TypeRef::parse("Game.World/Chunk");
        assert_eq!(nested.namespace, "Game");
        assert_eq!(nested.name, "World/Chunk");
        assert_eq!(nested.simple_name(), "Chunk");
    }

    #[test]
    fn type_string_form() {
        let json = serde_json::to_string(&TypeRef::boolean()).unwrap();
        assert_eq!(json, "\"valuetype System.Boolean\"");

        let back: TypeRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TypeRef::boolean());

        let object: TypeRef = serde_json::from_str("\"System.Object\"").unwrap();
        assert!(!object.is_value_type);

        assert!(serde_json::from_str::<TypeRef>("\"\"").is_err());
    }

    #[test]
    fn signatures() {
        let fire = MethodRef::new(
            TypeRef::parse("SurvivalKit.Events.EventManager"),
            "FireEvent",
            vec![
                TypeRef::string(),
                TypeRef::new("System", "Object[]"),
            ],
            TypeRef::void(),
        );
        assert_eq!(
            fire.full_name(),
            "System.Void SurvivalKit.Events.EventManager::FireEvent(System.String,System.Object[])"
        );
        assert_eq!(fire.stack_inputs(), 2);
        assert_eq!(fire.clone().with_this().stack_inputs(), 3);

        let field = FieldRef::new(TypeRef::parse("ChunkCluster"), "provider", TypeRef::object());
        assert_eq!(field.full_name(), "System.Object ChunkCluster::provider");
    }
}
