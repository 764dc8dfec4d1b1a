//! Modules, type definitions and their members.
//!
//! A [`Module`] is the unit that gets loaded, patched and written back. It is an ordered
//! list of [`TypeDef`]s, each owning its [`MethodDef`]s and [`FieldDef`]s. Members are
//! addressed through small copyable handles ([`TypeHandle`], [`MethodHandle`],
//! [`FieldHandle`]) so that a query can hand out results without holding a borrow of the
//! module that is about to be mutated.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    metadata::{FieldRef, MethodBody, MethodRef, TypeRef},
    Error, Result,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    /// Type attributes relevant for patching
    pub struct TypeFlags: u32 {
        /// The type is a value type (struct or enum)
        const VALUE_TYPE = 0x0001;
        /// The type is an interface
        const INTERFACE = 0x0002;
        /// The type is abstract
        const ABSTRACT = 0x0004;
        /// The type is sealed
        const SEALED = 0x0008;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    /// Method attributes relevant for patching
    pub struct MethodFlags: u32 {
        /// Static method, no implicit `this`
        const STATIC = 0x0001;
        /// Virtual method
        const VIRTUAL = 0x0002;
        /// Abstract method, has no body
        const ABSTRACT = 0x0004;
        /// Implemented outside of CIL (P/Invoke, internal call), has no body
        const EXTERNAL = 0x0008;
        /// Special name (constructors, property accessors)
        const SPECIAL_NAME = 0x0010;
    }
}

/// Handle of a type inside a [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHandle(pub usize);

/// Handle of a method inside a [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodHandle {
    /// The declaring type
    pub ty: TypeHandle,
    /// Index into [`TypeDef::methods`]
    pub index: usize,
}

/// Handle of a field inside a [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldHandle {
    /// The declaring type
    pub ty: TypeHandle,
    /// Index into [`TypeDef::fields`]
    pub index: usize,
}

/// A named, typed method parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter type
    #[serde(rename = "type")]
    pub param_type: TypeRef,
}

impl Parameter {
    /// Creates a new parameter.
    pub fn new(name: impl Into<String>, param_type: TypeRef) -> Self {
        Parameter {
            name: name.into(),
            param_type,
        }
    }
}

/// A field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    #[serde(rename = "type")]
    pub field_type: TypeRef,
    /// Whether the field is static
    #[serde(default)]
    pub is_static: bool,
}

/// A method definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Parameters in declaration order, without the implicit `this`
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Return type
    #[serde(default = "TypeRef::void", rename = "return")]
    pub return_type: TypeRef,
    /// Method flags
    #[serde(default)]
    pub flags: MethodFlags,
    /// Names of the custom attributes applied to the method
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    /// The body, `None` for abstract and external methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Creates a static `void` method without parameters and with an empty body.
    pub fn new(name: impl Into<String>) -> Self {
        MethodDef {
            name: name.into(),
            parameters: Vec::new(),
            return_type: TypeRef::void(),
            flags: MethodFlags::STATIC,
            attributes: Vec::new(),
            body: Some(MethodBody::new()),
        }
    }

    /// Returns `true` if the method takes no implicit `this`.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Returns `true` if the method is abstract.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodFlags::ABSTRACT)
    }

    /// The evaluation-stack argument index of parameter `param`, accounting for `this`.
    #[must_use]
    pub fn argument_index(&self, param: usize) -> usize {
        if self.is_static() {
            param
        } else {
            param + 1
        }
    }

    /// Returns `true` if a custom attribute with the given name is applied.
    ///
    /// The comparison accepts the qualified or simple name, with or without the
    /// `Attribute` suffix.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|applied| attribute_matches(applied, name))
    }

    /// The parameter types, in order.
    pub fn parameter_types(&self) -> impl Iterator<Item = &TypeRef> + '_ {
        self.parameters.iter().map(|param| &param.param_type)
    }
}

/// A type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    /// Namespace, empty for the global namespace and for nested types
    #[serde(default)]
    pub namespace: String,
    /// Type name
    pub name: String,
    /// Full name of the enclosing type for nested types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing: Option<String>,
    /// Type flags
    #[serde(default)]
    pub flags: TypeFlags,
    /// Base type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<TypeRef>,
    /// Names of the custom attributes applied to the type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    /// Fields, in declaration order
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Methods, in declaration order
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Creates an empty class.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeDef {
            namespace: namespace.into(),
            name: name.into(),
            enclosing: None,
            flags: TypeFlags::empty(),
            base: None,
            attributes: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// The qualified name, `Namespace.Name` or `Enclosing/Name` for nested types.
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.enclosing {
            Some(enclosing) => format!("{enclosing}/{}", self.name),
            None if self.namespace.is_empty() => self.name.clone(),
            None => format!("{}.{}", self.namespace, self.name),
        }
    }

    /// A reference to this type.
    #[must_use]
    pub fn type_ref(&self) -> TypeRef {
        let mut ty = TypeRef::parse(&self.full_name());
        ty.is_value_type = self.flags.contains(TypeFlags::VALUE_TYPE);
        ty
    }

    /// Returns `true` for value types.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.flags.contains(TypeFlags::VALUE_TYPE)
    }

    /// Returns `true` if a custom attribute with the given name is applied.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|applied| attribute_matches(applied, name))
    }
}

fn attribute_matches(applied: &str, wanted: &str) -> bool {
    let simple = |name: &str| -> String {
        let last = name.rsplit('.').next().unwrap_or(name);
        last.strip_suffix("Attribute").unwrap_or(last).to_string()
    };
    applied == wanted || simple(applied) == simple(wanted)
}

/// A loaded module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// Module name, e.g. `Assembly-CSharp`
    pub name: String,
    /// Types, in declaration order
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

impl Module {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            types: Vec::new(),
        }
    }

    /// Appends a type and returns its handle.
    pub fn add_type(&mut self, ty: TypeDef) -> TypeHandle {
        self.types.push(ty);
        TypeHandle(self.types.len() - 1)
    }

    /// Appends a method to a type.
    pub fn add_method(&mut self, ty: TypeHandle, method: MethodDef) -> Option<MethodHandle> {
        let def = self.types.get_mut(ty.0)?;
        def.methods.push(method);
        Some(MethodHandle {
            ty,
            index: def.methods.len() - 1,
        })
    }

    /// Looks up a type by qualified name.
    #[must_use]
    pub fn find_type(&self, qualified: &str) -> Option<TypeHandle> {
        let qualified = qualified.trim();
        self.types
            .iter()
            .position(|ty| ty.full_name() == qualified)
            .map(TypeHandle)
    }

    /// Returns `true` if the module defines a type with the given qualified name.
    #[must_use]
    pub fn contains_type(&self, qualified: &str) -> bool {
        self.find_type(qualified).is_some()
    }

    /// All type handles, in declaration order.
    pub fn type_handles(&self) -> impl Iterator<Item = TypeHandle> + '_ {
        (0..self.types.len()).map(TypeHandle)
    }

    /// All method handles of a type.
    pub fn method_handles(&self, ty: TypeHandle) -> impl Iterator<Item = MethodHandle> + '_ {
        let count = self.types.get(ty.0).map_or(0, |def| def.methods.len());
        (0..count).map(move |index| MethodHandle { ty, index })
    }

    /// The type behind a handle.
    #[must_use]
    pub fn type_def(&self, ty: TypeHandle) -> Option<&TypeDef> {
        self.types.get(ty.0)
    }

    /// Mutable access to the type behind a handle.
    pub fn type_def_mut(&mut self, ty: TypeHandle) -> Option<&mut TypeDef> {
        self.types.get_mut(ty.0)
    }

    /// The method behind a handle.
    #[must_use]
    pub fn method(&self, method: MethodHandle) -> Option<&MethodDef> {
        self.types.get(method.ty.0)?.methods.get(method.index)
    }

    /// Mutable access to the method behind a handle.
    pub fn method_mut(&mut self, method: MethodHandle) -> Option<&mut MethodDef> {
        self.types.get_mut(method.ty.0)?.methods.get_mut(method.index)
    }

    /// The field behind a handle.
    #[must_use]
    pub fn field(&self, field: FieldHandle) -> Option<&FieldDef> {
        self.types.get(field.ty.0)?.fields.get(field.index)
    }

    /// A reference to the method behind a handle.
    #[must_use]
    pub fn method_ref(&self, method: MethodHandle) -> Option<MethodRef> {
        let ty = self.type_def(method.ty)?;
        let def = ty.methods.get(method.index)?;
        let reference = MethodRef::new(
            ty.type_ref(),
            def.name.clone(),
            def.parameter_types().cloned().collect(),
            def.return_type.clone(),
        );
        Some(if def.is_static() {
            reference
        } else {
            reference.with_this()
        })
    }

    /// A reference to the field behind a handle.
    #[must_use]
    pub fn field_ref(&self, field: FieldHandle) -> Option<FieldRef> {
        let ty = self.type_def(field.ty)?;
        let def = ty.fields.get(field.index)?;
        Some(FieldRef::new(
            ty.type_ref(),
            def.name.clone(),
            def.field_type.clone(),
        ))
    }

    /// `Type::Method`, for diagnostics.
    #[must_use]
    pub fn method_name(&self, method: MethodHandle) -> String {
        match (self.type_def(method.ty), self.method(method)) {
            (Some(ty), Some(def)) => format!("{}::{}", ty.full_name(), def.name),
            _ => format!("<invalid method {}:{}>", method.ty.0, method.index),
        }
    }

    /// Runs `f` with mutable access to a method body while the rest of the module stays readable.
    ///
    /// The body is detached from the module for the duration of the call and put back
    /// afterwards, regardless of the outcome of `f`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoBody`] if the method is abstract or external, and whatever `f` returns.
    pub fn with_body<R>(
        &mut self,
        method: MethodHandle,
        f: impl FnOnce(&Module, &mut MethodBody) -> Result<R>,
    ) -> Result<R> {
        let name = self.method_name(method);
        let mut body = self
            .method_mut(method)
            .and_then(|def| def.body.take())
            .ok_or(Error::NoBody(name))?;

        let result = f(self, &mut body);
        if let Some(def) = self.method_mut(method) {
            def.body = Some(body);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{Instruction, OpCode};

    fn sample() -> (Module, MethodHandle) {
        let mut module = Module::new("Assembly-CSharp");
        let world = module.add_type(TypeDef::new("Game", "World"));
        let mut chunk = TypeDef::new("", "Chunk");
        chunk.enclosing = Some("Game.World".to_string());
        module.add_type(chunk);

        let mut tick = MethodDef::new("Tick");
        tick.flags = MethodFlags::empty();
        tick.parameters.push(Parameter::new("delta", TypeRef::parse("System.Single")));
        let tick = module.add_method(world, tick).unwrap();
        (module, tick)
    }

    #[test]
    fn lookup() {
        let (module, tick) = sample();
        assert_eq!(module.find_type("Game.World"), Some(TypeHandle(0)));
        assert_eq!(module.find_type("Game.World/Chunk"), Some(TypeHandle(1)));
        assert!(module.find_type("World").is_none());
        assert_eq!(module.method_name(tick), "Game.World::Tick");
        assert_eq!(module.method_handles(TypeHandle(0)).count(), 1);

        let reference = module.method_ref(tick).unwrap();
        assert!(reference.has_this);
        assert_eq!(reference.to_string(), "System.Void Game.World::Tick(System.Single)");
        assert_eq!(module.method(tick).unwrap().argument_index(0), 1);
    }

    #[test]
    fn body_access() {
        let (mut module, tick) = sample();
        let len = module
            .with_body(tick, |module, body| {
                assert!(module.contains_type("Game.World"));
                body.push(Instruction::op(OpCode::Ret));
                Ok(body.len())
            })
            .unwrap();
        assert_eq!(len, 1);
        assert_eq!(module.method(tick).and_then(|m| m.body.as_ref()).map(MethodBody::len), Some(1));

        let failed: Result<()> = module.with_body(tick, |_, body| {
            body.push(Instruction::op(OpCode::Nop));
            Err(Error::NotABranch("nop".into()))
        });
        assert!(failed.is_err());
        assert!(module.method(tick).unwrap().body.is_some());

        module.method_mut(tick).unwrap().body = None;
        assert!(matches!(module.with_body(tick, |_, _| Ok(())), Err(Error::NoBody(_))));
    }

    #[test]
    fn attributes() {
        let mut method = MethodDef::new("Sync");
        method.attributes.push("UnityEngine.RPC".to_string());
        assert!(method.has_attribute("UnityEngine.RPC"));
        assert!(method.has_attribute("RPC"));
        assert!(method.has_attribute("RPCAttribute"));
        assert!(!method.has_attribute("Serializable"));
    }
}
