use crate::{
    metadata::{MethodBody, MethodHandle, Module, Scope},
    patch::Dispatcher,
    Result,
};

/// Everything a patcher needs: the module being rewritten, the modules references may
/// point into, and the dispatcher hooks call.
///
/// The target is borrowed mutably for the lifetime of the context, so patchers run one
/// after the other and each sees the edits of the previous ones.
pub struct PatchContext<'a> {
    /// The module being patched
    pub target: &'a mut Module,
    /// Modules searched after the target when resolving references, in order
    pub references: Vec<&'a Module>,
    /// The dispatcher called by synthesized hooks
    pub dispatcher: &'a Dispatcher,
}

impl<'a> PatchContext<'a> {
    /// Creates a context without reference modules.
    pub fn new(target: &'a mut Module, dispatcher: &'a Dispatcher) -> Self {
        PatchContext {
            target,
            references: Vec::new(),
            dispatcher,
        }
    }

    /// Adds reference modules, searched in the given order after the target.
    #[must_use]
    pub fn with_references<I: IntoIterator<Item = &'a Module>>(mut self, modules: I) -> Self {
        self.references.extend(modules);
        self
    }

    /// A resolution scope over the target and the reference modules.
    #[must_use]
    pub fn scope(&self) -> Scope<'_> {
        Scope::new(&*self.target).with(self.references.iter().copied())
    }

    /// Runs `f` on the body of `method` with a scope over the (read-only) rest of the target.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoBody`] if the method has no body, and whatever `f` returns.
    pub fn edit_body<R>(
        &mut self,
        method: MethodHandle,
        f: impl FnOnce(&Scope<'_>, &mut MethodBody) -> Result<R>,
    ) -> Result<R> {
        let references = &self.references;
        self.target.with_body(method, |module, body| {
            let scope = Scope::new(module).with(references.iter().copied());
            f(&scope, body)
        })
    }
}
