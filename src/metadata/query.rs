//! Composable symbol queries over modules.
//!
//! Patch targets are never addressed by table index or offset. Instead a query names the
//! properties the wanted type, method or field must have, and the properties are ANDed:
//!
//! ```rust
//! use cilhook::metadata::{Module, TypeDef, MethodDef, Parameter, TypeRef};
//!
//! let mut module = Module::new("Assembly-CSharp");
//! let cluster = module.add_type(TypeDef::new("", "ChunkCluster"));
//! let mut init = MethodDef::new("Init");
//! init.parameters.push(Parameter::new("id", TypeRef::value_type("", "EnumChunkProviderId")));
//! module.add_method(cluster, init);
//!
//! let init = module
//!     .query_types()
//!     .name("ChunkCluster")
//!     .methods()
//!     .name("Init")
//!     .parameters(&["EnumChunkProviderId"])
//!     .require()?;
//! assert_eq!(module.method_name(init), "ChunkCluster::Init");
//! # Ok::<(), cilhook::Error>(())
//! ```
//!
//! Every predicate carries a label. When a query comes back empty the label of the
//! predicate that removed the last remaining candidate is logged, which is usually enough
//! to tell what changed in a new build of the target. [`TypeQuery::quiet`] and friends
//! suppress that warning for lookups that are allowed to miss.

use serde::{Deserialize, Serialize};

use crate::{
    metadata::{
        FieldDef, FieldHandle, FieldRef, MethodDef, MethodHandle, MethodRef, Module, TypeDef,
        TypeFlags, TypeHandle, TypeRef,
    },
    Error, Result,
};

/// A predicate together with the label used in diagnostics.
struct Labelled<F: ?Sized> {
    label: String,
    test: Box<F>,
}

type TypeFilter<'a> = Labelled<dyn Fn(&TypeDef) -> bool + 'a>;
type MethodFilter<'a> = Labelled<dyn Fn(&TypeDef, &MethodDef) -> bool + 'a>;
type FieldFilter<'a> = Labelled<dyn Fn(&TypeDef, &FieldDef) -> bool + 'a>;

/// Applies the predicates one after the other and returns the survivors, plus the index of the
/// predicate that eliminated the last candidate if nothing survived.
fn narrow<C>(
    mut candidates: Vec<C>,
    filter_count: usize,
    test: impl Fn(&C, usize) -> bool,
) -> (Vec<C>, Option<usize>) {
    for index in 0..filter_count {
        if candidates.is_empty() {
            return (candidates, None);
        }
        candidates.retain(|candidate| test(candidate, index));
        if candidates.is_empty() {
            return (candidates, Some(index));
        }
    }
    (candidates, None)
}

fn labels<F: ?Sized>(filters: &[Labelled<F>]) -> String {
    filters
        .iter()
        .map(|filter| filter.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn report_miss<F: ?Sized>(what: &str, filters: &[Labelled<F>], eliminated_by: Option<usize>) {
    match eliminated_by.and_then(|index| filters.get(index)) {
        Some(filter) => log::warn!(
            "No {what} matches [{}] - '{}' eliminated the remaining candidates",
            labels(filters),
            filter.label
        ),
        None => log::warn!("No {what} matches [{}] - there were no candidates", labels(filters)),
    }
}

/// Compares a written type name against a reference, by qualified or simple name.
fn type_name_matches(ty: &TypeRef, name: &str) -> bool {
    ty.matches_name(name)
}

/// Declarative description of a method, usable from profiles and scripts.
///
/// Every field that is set must match; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MethodSelector {
    /// Method name
    pub name: Option<String>,
    /// Parameter type names, qualified or simple
    pub parameters: Option<Vec<String>>,
    /// Parameter names
    pub parameter_names: Option<Vec<String>>,
    /// Return type name, qualified or simple
    pub returns: Option<String>,
    /// Required static-ness
    pub is_static: Option<bool>,
    /// Required abstract-ness
    pub is_abstract: Option<bool>,
    /// Name of a custom attribute the method must carry
    pub attribute: Option<String>,
}

impl MethodSelector {
    /// A selector matching methods with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        MethodSelector {
            name: Some(name.into()),
            ..MethodSelector::default()
        }
    }

    /// Returns `true` if `method` satisfies every set property.
    #[must_use]
    pub fn matches(&self, method: &MethodDef) -> bool {
        if let Some(name) = &self.name {
            if method.name != *name {
                return false;
            }
        }
        if let Some(types) = &self.parameters {
            if !parameters_match(method, types) {
                return false;
            }
        }
        if let Some(names) = &self.parameter_names {
            if method.parameters.len() != names.len()
                || !method.parameters.iter().zip(names).all(|(p, n)| p.name == *n)
            {
                return false;
            }
        }
        if let Some(returns) = &self.returns {
            if !type_name_matches(&method.return_type, returns) {
                return false;
            }
        }
        if let Some(is_static) = self.is_static {
            if method.is_static() != is_static {
                return false;
            }
        }
        if let Some(is_abstract) = self.is_abstract {
            if method.is_abstract() != is_abstract {
                return false;
            }
        }
        if let Some(attribute) = &self.attribute {
            if !method.has_attribute(attribute) {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Display for MethodSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(name) = &self.name {
            parts.push(format!("name = {name}"));
        }
        if let Some(types) = &self.parameters {
            parts.push(format!("parameters = ({})", types.join(",")));
        }
        if let Some(names) = &self.parameter_names {
            parts.push(format!("parameter names = ({})", names.join(",")));
        }
        if let Some(returns) = &self.returns {
            parts.push(format!("returns {returns}"));
        }
        if let Some(is_static) = self.is_static {
            parts.push(if is_static { "static" } else { "instance" }.to_string());
        }
        if let Some(is_abstract) = self.is_abstract {
            parts.push(if is_abstract { "abstract" } else { "not abstract" }.to_string());
        }
        if let Some(attribute) = &self.attribute {
            parts.push(format!("[{attribute}]"));
        }
        if parts.is_empty() {
            f.write_str("any method")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

fn parameters_match<S: AsRef<str>>(method: &MethodDef, types: &[S]) -> bool {
    method.parameters.len() == types.len()
        && method
            .parameter_types()
            .zip(types)
            .all(|(ty, name)| type_name_matches(ty, name.as_ref()))
}

/// A composable query over the types of a module.
pub struct TypeQuery<'a> {
    module: &'a Module,
    filters: Vec<TypeFilter<'a>>,
    quiet: bool,
}

impl<'a> TypeQuery<'a> {
    /// Creates a query over every type of `module`.
    pub fn new(module: &'a Module) -> Self {
        TypeQuery {
            module,
            filters: Vec::new(),
            quiet: false,
        }
    }

    fn push(mut self, label: String, test: impl Fn(&TypeDef) -> bool + 'a) -> Self {
        self.filters.push(Labelled {
            label,
            test: Box::new(test),
        });
        self
    }

    /// Types whose qualified or simple name is `name`.
    #[must_use]
    pub fn name(self, name: &'a str) -> Self {
        self.push(format!("name = {name}"), move |t| {
            t.name == name || t.full_name() == name
        })
    }

    /// Types in the given namespace.
    #[must_use]
    pub fn namespace(self, namespace: &'a str) -> Self {
        self.push(format!("namespace = {namespace}"), move |t| t.namespace == namespace)
    }

    /// Value types.
    #[must_use]
    pub fn value_types(self) -> Self {
        self.push("value type".to_string(), TypeDef::is_value_type)
    }

    /// Interfaces.
    #[must_use]
    pub fn interfaces(self) -> Self {
        self.push("interface".to_string(), |t| t.flags.contains(TypeFlags::INTERFACE))
    }

    /// Types that are not abstract.
    #[must_use]
    pub fn not_abstract(self) -> Self {
        self.push("not abstract".to_string(), |t| !t.flags.contains(TypeFlags::ABSTRACT))
    }

    /// Types carrying a custom attribute.
    #[must_use]
    pub fn has_attribute(self, attribute: &'a str) -> Self {
        self.push(format!("[{attribute}]"), move |t| t.has_attribute(attribute))
    }

    /// Types whose direct base type is `base`.
    #[must_use]
    pub fn derives_from(self, base: &'a str) -> Self {
        self.push(format!("derives from {base}"), move |t| {
            t.base.as_ref().is_some_and(|b| type_name_matches(b, base))
        })
    }

    /// Types declaring at least one method matching `selector`.
    #[must_use]
    pub fn declares(self, selector: &'a MethodSelector) -> Self {
        self.push(format!("declares ({selector})"), move |t| {
            t.methods.iter().any(|m| selector.matches(m))
        })
    }

    /// Applies a custom, labelled predicate.
    #[must_use]
    pub fn filter(self, label: &str, f: impl Fn(&TypeDef) -> bool + 'a) -> Self {
        self.push(label.to_string(), f)
    }

    /// Suppresses the diagnostic on an empty result.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Returns all matching types, in declaration order.
    #[must_use]
    pub fn find_all(&self) -> Vec<TypeHandle> {
        let candidates: Vec<TypeHandle> = self.module.type_handles().collect();
        let (found, eliminated_by) = narrow(candidates, self.filters.len(), |handle, index| {
            self.module
                .type_def(*handle)
                .is_some_and(|ty| (self.filters[index].test)(ty))
        });
        if found.is_empty() && !self.quiet {
            report_miss("type", &self.filters, eliminated_by);
        }
        found
    }

    /// Returns the first matching type.
    #[must_use]
    pub fn find_first(&self) -> Option<TypeHandle> {
        self.find_all().into_iter().next()
    }

    /// Returns the number of matching types.
    #[must_use]
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if any type matches.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.iter().next().is_some()
    }

    /// Lazily iterates the matching types without diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = TypeHandle> + '_ {
        self.module.type_handles().filter(move |handle| {
            self.module
                .type_def(*handle)
                .is_some_and(|ty| self.filters.iter().all(|f| (f.test)(ty)))
        })
    }

    /// Returns the first matching type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] naming the predicates if nothing matches.
    pub fn require(&self) -> Result<TypeHandle> {
        self.find_first().ok_or_else(|| Error::SymbolNotFound {
            what: format!("type in {}", self.module.name),
            predicates: labels(&self.filters),
        })
    }

    /// Pivots to a [`MethodQuery`] over the methods of every matching type.
    #[must_use]
    pub fn methods(self) -> MethodQuery<'a> {
        let types = self.find_all();
        let scope = match (types.as_slice(), self.module) {
            ([single], module) => module
                .type_def(*single)
                .map_or_else(|| module.name.clone(), TypeDef::full_name),
            (_, module) => module.name.clone(),
        };
        MethodQuery {
            module: self.module,
            types,
            scope,
            filters: Vec::new(),
            quiet: self.quiet,
        }
    }
}

/// A composable query over methods.
pub struct MethodQuery<'a> {
    module: &'a Module,
    types: Vec<TypeHandle>,
    scope: String,
    filters: Vec<MethodFilter<'a>>,
    quiet: bool,
}

impl<'a> MethodQuery<'a> {
    /// Creates a query over every method of `module`.
    pub fn new(module: &'a Module) -> Self {
        MethodQuery {
            module,
            types: module.type_handles().collect(),
            scope: module.name.clone(),
            filters: Vec::new(),
            quiet: false,
        }
    }

    /// Creates a query over the methods of a single type.
    pub fn in_type(module: &'a Module, ty: TypeHandle) -> Self {
        MethodQuery {
            module,
            types: vec![ty],
            scope: module
                .type_def(ty)
                .map_or_else(|| module.name.clone(), TypeDef::full_name),
            filters: Vec::new(),
            quiet: false,
        }
    }

    fn push(mut self, label: String, test: impl Fn(&TypeDef, &MethodDef) -> bool + 'a) -> Self {
        self.filters.push(Labelled {
            label,
            test: Box::new(test),
        });
        self
    }

    /// Methods with the given name.
    #[must_use]
    pub fn name(self, name: &'a str) -> Self {
        self.push(format!("name = {name}"), move |_, m| m.name == name)
    }

    /// Methods whose parameter types are exactly `types` (qualified or simple names).
    #[must_use]
    pub fn parameters<S: AsRef<str>>(self, types: &'a [S]) -> Self {
        let label = format!(
            "parameters = ({})",
            types.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",")
        );
        self.push(label, move |_, m| parameters_match(m, types))
    }

    /// Methods whose parameter names are exactly `names`.
    #[must_use]
    pub fn parameter_names(self, names: &'a [&'a str]) -> Self {
        self.push(format!("parameter names = ({})", names.join(",")), move |_, m| {
            m.parameters.len() == names.len()
                && m.parameters.iter().zip(names).all(|(p, n)| p.name == *n)
        })
    }

    /// Methods returning `ty` (qualified or simple name).
    #[must_use]
    pub fn returns(self, ty: &'a str) -> Self {
        self.push(format!("returns {ty}"), move |_, m| type_name_matches(&m.return_type, ty))
    }

    /// Static methods.
    #[must_use]
    pub fn static_methods(self) -> Self {
        self.push("static".to_string(), |_, m| m.is_static())
    }

    /// Instance methods.
    #[must_use]
    pub fn instance(self) -> Self {
        self.push("instance".to_string(), |_, m| !m.is_static())
    }

    /// Methods that are not abstract.
    #[must_use]
    pub fn not_abstract(self) -> Self {
        self.push("not abstract".to_string(), |_, m| !m.is_abstract())
    }

    /// Methods with a body.
    #[must_use]
    pub fn has_body(self) -> Self {
        self.push("has body".to_string(), |_, m| m.body.is_some())
    }

    /// Methods carrying a custom attribute.
    #[must_use]
    pub fn has_attribute(self, attribute: &'a str) -> Self {
        self.push(format!("[{attribute}]"), move |_, m| m.has_attribute(attribute))
    }

    /// Methods declared by the type with the given qualified or simple name.
    #[must_use]
    pub fn declaring_type(self, type_name: &'a str) -> Self {
        self.push(format!("declared by {type_name}"), move |t, _| {
            t.name == type_name || t.full_name() == type_name
        })
    }

    /// Methods matching a [`MethodSelector`].
    #[must_use]
    pub fn selector(self, selector: &'a MethodSelector) -> Self {
        self.push(selector.to_string(), move |_, m| selector.matches(m))
    }

    /// Applies a custom, labelled predicate.
    #[must_use]
    pub fn filter(self, label: &str, f: impl Fn(&MethodDef) -> bool + 'a) -> Self {
        self.push(label.to_string(), move |_, m| f(m))
    }

    /// Suppresses the diagnostic on an empty result.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    fn candidates(&self) -> Vec<MethodHandle> {
        self.types
            .iter()
            .flat_map(|ty| self.module.method_handles(*ty))
            .collect()
    }

    fn test(&self, handle: MethodHandle, index: usize) -> bool {
        match (self.module.type_def(handle.ty), self.module.method(handle)) {
            (Some(ty), Some(method)) => (self.filters[index].test)(ty, method),
            _ => false,
        }
    }

    /// Returns all matching methods, in declaration order.
    #[must_use]
    pub fn find_all(&self) -> Vec<MethodHandle> {
        let (found, eliminated_by) =
            narrow(self.candidates(), self.filters.len(), |handle, index| self.test(*handle, index));
        if found.is_empty() && !self.quiet {
            report_miss(&format!("method in {}", self.scope), &self.filters, eliminated_by);
        }
        found
    }

    /// Returns the first matching method.
    #[must_use]
    pub fn find_first(&self) -> Option<MethodHandle> {
        self.find_all().into_iter().next()
    }

    /// Returns the number of matching methods.
    #[must_use]
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if any method matches.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.iter().next().is_some()
    }

    /// Lazily iterates the matching methods without diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = MethodHandle> + '_ {
        self.candidates()
            .into_iter()
            .filter(move |handle| (0..self.filters.len()).all(|index| self.test(*handle, index)))
    }

    /// Returns the first matching method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] naming the predicates if nothing matches.
    pub fn require(&self) -> Result<MethodHandle> {
        self.find_first().ok_or_else(|| Error::SymbolNotFound {
            what: format!("method in {}", self.scope),
            predicates: labels(&self.filters),
        })
    }
}

/// A composable query over fields.
pub struct FieldQuery<'a> {
    module: &'a Module,
    types: Vec<TypeHandle>,
    filters: Vec<FieldFilter<'a>>,
    quiet: bool,
}

impl<'a> FieldQuery<'a> {
    /// Creates a query over the fields of a single type.
    pub fn in_type(module: &'a Module, ty: TypeHandle) -> Self {
        FieldQuery {
            module,
            types: vec![ty],
            filters: Vec::new(),
            quiet: false,
        }
    }

    fn push(mut self, label: String, test: impl Fn(&TypeDef, &FieldDef) -> bool + 'a) -> Self {
        self.filters.push(Labelled {
            label,
            test: Box::new(test),
        });
        self
    }

    /// Fields with the given name.
    #[must_use]
    pub fn name(self, name: &'a str) -> Self {
        self.push(format!("name = {name}"), move |_, f| f.name == name)
    }

    /// Fields of the given type (qualified or simple name).
    #[must_use]
    pub fn field_type(self, ty: &'a str) -> Self {
        self.push(format!("type = {ty}"), move |_, f| type_name_matches(&f.field_type, ty))
    }

    /// Static fields.
    #[must_use]
    pub fn static_fields(self) -> Self {
        self.push("static".to_string(), |_, f| f.is_static)
    }

    /// Suppresses the diagnostic on an empty result.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Returns all matching fields, in declaration order.
    #[must_use]
    pub fn find_all(&self) -> Vec<FieldHandle> {
        let candidates: Vec<FieldHandle> = self
            .types
            .iter()
            .flat_map(|ty| {
                let count = self.module.type_def(*ty).map_or(0, |def| def.fields.len());
                (0..count).map(move |index| FieldHandle { ty: *ty, index })
            })
            .collect();

        let (found, eliminated_by) = narrow(candidates, self.filters.len(), |handle, index| {
            match (self.module.type_def(handle.ty), self.module.field(*handle)) {
                (Some(ty), Some(field)) => (self.filters[index].test)(ty, field),
                _ => false,
            }
        });
        if found.is_empty() && !self.quiet {
            report_miss("field", &self.filters, eliminated_by);
        }
        found
    }

    /// Returns the first matching field.
    #[must_use]
    pub fn find_first(&self) -> Option<FieldHandle> {
        self.find_all().into_iter().next()
    }

    /// Returns the first matching field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] naming the predicates if nothing matches.
    pub fn require(&self) -> Result<FieldHandle> {
        self.find_first().ok_or_else(|| Error::SymbolNotFound {
            what: "field".to_string(),
            predicates: labels(&self.filters),
        })
    }
}

impl Module {
    /// Starts a query over the types of this module.
    #[must_use]
    pub fn query_types(&self) -> TypeQuery<'_> {
        TypeQuery::new(self)
    }

    /// Starts a query over all methods of this module.
    #[must_use]
    pub fn query_methods(&self) -> MethodQuery<'_> {
        MethodQuery::new(self)
    }
}

/// Finds a type by qualified name across several modules, first module first.
#[must_use]
pub fn find_type<'a>(modules: &[&'a Module], qualified: &str) -> Option<(&'a Module, TypeHandle)> {
    modules
        .iter()
        .find_map(|module| module.find_type(qualified).map(|handle| (*module, handle)))
}

/// The set of modules references can be resolved against.
///
/// The first module is the one being patched; the others are the runtime library,
/// engine modules and the dispatcher module.
#[derive(Clone)]
pub struct Scope<'a> {
    modules: Vec<&'a Module>,
}

impl<'a> Scope<'a> {
    /// Creates a scope containing only `primary`.
    #[must_use]
    pub fn new(primary: &'a Module) -> Self {
        Scope {
            modules: vec![primary],
        }
    }

    /// Adds more modules to search, after the ones already present.
    #[must_use]
    pub fn with<I: IntoIterator<Item = &'a Module>>(mut self, modules: I) -> Self {
        self.modules.extend(modules);
        self
    }

    /// The modules in search order.
    #[must_use]
    pub fn modules(&self) -> &[&'a Module] {
        &self.modules
    }

    /// Finds a type definition by qualified name.
    #[must_use]
    pub fn find_type(&self, qualified: &str) -> Option<(&'a Module, TypeHandle)> {
        find_type(&self.modules, qualified)
    }

    /// Resolves a type reference by qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] if no module defines the type.
    pub fn type_ref(&self, qualified: &str) -> Result<TypeRef> {
        self.find_type(qualified)
            .and_then(|(module, handle)| module.type_def(handle))
            .map(TypeDef::type_ref)
            .ok_or_else(|| self.missing_type(qualified))
    }

    /// Resolves a field reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] if the type or the field do not exist.
    pub fn field_ref(&self, type_name: &str, field: &str) -> Result<FieldRef> {
        let (module, ty) = self
            .find_type(type_name)
            .ok_or_else(|| self.missing_type(type_name))?;
        let handle = FieldQuery::in_type(module, ty).name(field).quiet().require()?;
        module.field_ref(handle).ok_or_else(|| Error::SymbolNotFound {
            what: format!("field in {type_name}"),
            predicates: format!("name = {field}"),
        })
    }

    /// Resolves a method reference, optionally disambiguated by parameter type names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] if the type or a matching method do not exist.
    pub fn method_ref(
        &self,
        type_name: &str,
        method: &str,
        parameters: Option<&[String]>,
    ) -> Result<MethodRef> {
        let (module, ty) = self
            .find_type(type_name)
            .ok_or_else(|| self.missing_type(type_name))?;
        let query = MethodQuery::in_type(module, ty).name(method).quiet();
        let handle = match parameters {
            Some(types) => query.parameters(types).require()?,
            None => query.require()?,
        };
        module.method_ref(handle).ok_or_else(|| Error::SymbolNotFound {
            what: format!("method in {type_name}"),
            predicates: format!("name = {method}"),
        })
    }

    fn missing_type(&self, qualified: &str) -> Error {
        Error::SymbolNotFound {
            what: format!(
                "type in [{}]",
                self.modules
                    .iter()
                    .map(|m| m.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            predicates: format!("name = {qualified}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MethodFlags;
    use crate::test::factories::{game_module, runtime_module};

    #[test]
    fn type_queries() {
        let module = game_module();
        assert!(module.query_types().name("ChunkCluster").exists());
        assert!(module.query_types().name("Game.Player").exists());
        assert!(module.query_types().name("Player").exists());
        assert_eq!(module.query_types().namespace("Game").count(), 1);
        assert!(module.query_types().name("Missing").quiet().find_first().is_none());

        let err = module.query_types().name("Missing").quiet().require().unwrap_err();
        assert!(matches!(err, Error::SymbolNotFound { ref predicates, .. } if predicates == "name = Missing"));
    }

    #[test]
    fn method_queries() {
        let module = game_module();
        let init = module
            .query_types()
            .name("ChunkCluster")
            .methods()
            .name("Init")
            .parameters(&["EnumChunkProviderId"])
            .require()
            .unwrap();
        assert_eq!(module.method_name(init), "ChunkCluster::Init");

        let by_full_name = module
            .query_methods()
            .name("Init")
            .parameters(&["EnumChunkProviderId"])
            .returns("System.Void")
            .find_all();
        assert_eq!(by_full_name, vec![init]);

        assert_eq!(module.query_methods().name("Init").parameters(&["Int32"]).quiet().count(), 0);
        assert!(module.query_methods().has_attribute("RPC").exists());
        assert!(module.query_methods().static_methods().declaring_type("Game.Player").exists());
    }

    #[test]
    fn declares_selector() {
        let mut module = game_module();
        let ty = module.add_type(TypeDef::new("", "Component"));
        let mut abstract_method = MethodDef::new("GetKind");
        abstract_method.flags = MethodFlags::ABSTRACT;
        abstract_method.body = None;
        abstract_method.return_type = TypeRef::value_type("", "Kind");
        module.add_method(ty, abstract_method);

        let selector = MethodSelector {
            name: Some("GetKind".to_string()),
            returns: Some("Kind".to_string()),
            is_abstract: Some(false),
            ..MethodSelector::default()
        };
        assert!(!module.query_types().declares(&selector).quiet().exists());

        let concrete = module.add_type(TypeDef::new("", "Light"));
        let mut implementation = MethodDef::new("GetKind");
        implementation.flags = MethodFlags::VIRTUAL;
        implementation.return_type = TypeRef::value_type("", "Kind");
        module.add_method(concrete, implementation);
        assert_eq!(module.query_types().declares(&selector).find_all(), vec![concrete]);
    }

    #[test]
    fn narrowing_reports_eliminating_filter() {
        let (survivors, eliminated) = narrow(vec![1, 2, 3], 3, |value, index| match index {
            0 => *value > 1,
            1 => *value > 5,
            _ => true,
        });
        assert!(survivors.is_empty());
        assert_eq!(eliminated, Some(1));

        let (survivors, eliminated) = narrow(vec![1, 2, 3], 1, |value, _| *value == 2);
        assert_eq!(survivors, vec![2]);
        assert_eq!(eliminated, None);
    }

    #[test]
    fn scope_resolution() {
        let game = game_module();
        let runtime = runtime_module();
        let scope = Scope::new(&game).with([&runtime]);

        let boolean = scope.type_ref("System.Boolean").unwrap();
        assert!(boolean.is_value_type);
        assert!(!scope.type_ref("System.Object").unwrap().is_value_type);
        assert!(scope.type_ref("System.Nope").is_err());

        let concat = scope
            .method_ref("System.String", "Concat", Some(&["System.String".to_string(), "System.String".to_string()]))
            .unwrap();
        assert_eq!(concat.parameters.len(), 2);
        assert!(scope.method_ref("System.String", "Concat", Some(&[])).is_err());

        let provider = scope.field_ref("ChunkCluster", "provider").unwrap();
        assert_eq!(provider.declaring.full_name(), "ChunkCluster");

        assert!(find_type(&[&game, &runtime], "System.Int32").is_some());
    }
}
