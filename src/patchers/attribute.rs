use log::{debug, warn};

use crate::{
    metadata::{MethodQuery, Parameter},
    patch::{insert_at, HookBuilder, PatchContext},
    patchers::{fragments, AttributeHook, Patcher, Signature, ValueSource},
    Error, Result,
};

/// Fires a cancellable event from every attributed method of a type.
///
/// Slot 0 is the cancel flag, slot 1 the method name and slot `i + 2` parameter `i`.
/// Every parameter is written back with `starg` before the cancel check.
pub struct AttributeHookPatcher<'p> {
    hook: &'p AttributeHook,
}

impl<'p> AttributeHookPatcher<'p> {
    /// Creates the patcher for one profile entry.
    #[must_use]
    pub fn new(hook: &'p AttributeHook) -> Self {
        AttributeHookPatcher { hook }
    }
}

impl Patcher for AttributeHookPatcher<'_> {
    fn name(&self) -> String {
        format!("[{}] methods of {}", self.hook.attribute, self.hook.type_name)
    }

    fn apply(&self, context: &mut PatchContext<'_>) -> Result<usize> {
        let module = &*context.target;
        let ty = module.query_types().name(&self.hook.type_name).require()?;
        let methods = MethodQuery::in_type(module, ty)
            .has_attribute(&self.hook.attribute)
            .has_body()
            .quiet()
            .find_all();
        if methods.is_empty() {
            warn!("{} has no [{}] methods", self.hook.type_name, self.hook.attribute);
            return Ok(0);
        }

        let trailing = match &self.hook.trailing_parameter {
            Some(parameter) => Some(Parameter::new(
                parameter.name.as_str(),
                context.scope().type_ref(&parameter.type_name)?,
            )),
            None => None,
        };
        let dispatcher = context.dispatcher;

        for method in &methods {
            let def = context
                .target
                .method_mut(*method)
                .ok_or_else(|| Error::NoBody(format!("{method:?}")))?;
            if let Some(trailing) = &trailing {
                let present = def
                    .parameters
                    .last()
                    .is_some_and(|last| last.param_type.full_name() == trailing.param_type.full_name());
                if !present {
                    debug!("Appending {} to {}", trailing.name, def.name);
                    def.parameters.push(trailing.clone());
                }
            }

            let mut sources = vec![ValueSource::String {
                value: def.name.clone(),
            }];
            for param in 0..def.parameters.len() {
                let index = u16::try_from(def.argument_index(param))
                    .map_err(|_| script_error!("{} has too many parameters", def.name))?;
                sources.push(ValueSource::Argument {
                    index,
                    write_back: true,
                });
            }

            let signature = Signature::of(context.target, *method)?;
            context.edit_body(*method, |scope, body| {
                let parameters = fragments(scope, &signature, body, &sources)?;
                let hook = HookBuilder::new(dispatcher).compose(body, &self.hook.event, true, parameters)?;
                insert_at(body, 0, &hook)
            })?;
        }
        Ok(methods.len())
    }
}
