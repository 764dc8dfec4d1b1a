use log::debug;

use crate::{
    metadata::{MethodHandle, MethodQuery, Module, TypeHandle},
    patch::{insert_at, insert_before_return, HookBuilder, PatchContext},
    patchers::{fragments, EventHook, HookPosition, Patcher, Signature},
    Result,
};

/// Fires an event from one method of every type a [`TargetTypes`](crate::patchers::TargetTypes)
/// predicate selects.
///
/// With a predicate over declared methods, types that lack the hooked method are skipped;
/// with a single named type, a missing method is an error.
pub struct EventHookPatcher<'p> {
    hook: &'p EventHook,
}

impl<'p> EventHookPatcher<'p> {
    /// Creates the patcher for one profile entry.
    #[must_use]
    pub fn new(hook: &'p EventHook) -> Self {
        EventHookPatcher { hook }
    }

    fn types(&self, module: &Module) -> Result<Vec<TypeHandle>> {
        let targets = &self.hook.types;
        if targets.type_name.is_none() && targets.declares.is_none() {
            return Err(script_error!("Event hook {} selects no types", self.hook.event));
        }

        let mut query = module.query_types();
        if let Some(name) = &targets.type_name {
            query = query.name(name);
        }
        if let Some(selector) = &targets.declares {
            query = query.declares(selector);
        }
        let types: Vec<TypeHandle> = query.iter().collect();
        if types.is_empty() {
            query.require()?;
        }
        Ok(types)
    }

    fn methods(&self, module: &Module) -> Result<Vec<MethodHandle>> {
        let mut methods = Vec::new();
        for ty in self.types(module)? {
            let query = MethodQuery::in_type(module, ty)
                .selector(&self.hook.method)
                .has_body()
                .quiet();
            match query.find_first() {
                Some(method) => methods.push(method),
                None if self.hook.types.type_name.is_some() => {
                    query.require()?;
                }
                None => debug!(
                    "{} does not declare ({}), skipping {}",
                    module.type_def(ty).map(|t| t.full_name()).unwrap_or_default(),
                    self.hook.method,
                    self.hook.event
                ),
            }
        }
        Ok(methods)
    }
}

impl Patcher for EventHookPatcher<'_> {
    fn name(&self) -> String {
        format!("event {}", self.hook.event)
    }

    fn apply(&self, context: &mut PatchContext<'_>) -> Result<usize> {
        let methods = self.methods(context.target)?;
        let dispatcher = context.dispatcher;

        for method in &methods {
            let signature = Signature::of(context.target, *method)?;
            context.edit_body(*method, |scope, body| {
                let parameters = fragments(scope, &signature, body, &self.hook.loaders)?;
                let hook = HookBuilder::new(dispatcher).compose(
                    body,
                    &self.hook.event,
                    self.hook.cancellable,
                    parameters,
                )?;
                match self.hook.position {
                    HookPosition::Start => insert_at(body, 0, &hook),
                    HookPosition::End => {
                        let end = body.len();
                        insert_at(body, end, &hook)
                    }
                    HookPosition::BeforeReturn => insert_before_return(body, &hook).map(|_| ()),
                }
            })?;
        }
        Ok(methods.len())
    }
}
