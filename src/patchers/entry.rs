use crate::{
    assembly::Instruction,
    metadata::MethodQuery,
    patch::{insert_at, PatchContext},
    patchers::{EntryCall, Patcher},
    Result,
};

/// Calls a static method at the very start of a target method.
pub struct EntryCallPatcher<'p> {
    call: &'p EntryCall,
}

impl<'p> EntryCallPatcher<'p> {
    /// Creates the patcher for one profile entry.
    #[must_use]
    pub fn new(call: &'p EntryCall) -> Self {
        EntryCallPatcher { call }
    }
}

impl Patcher for EntryCallPatcher<'_> {
    fn name(&self) -> String {
        format!(
            "{}::{} -> {}::{}",
            self.call.type_name,
            self.call.method.name.as_deref().unwrap_or("*"),
            self.call.call_type,
            self.call.call_method
        )
    }

    fn apply(&self, context: &mut PatchContext<'_>) -> Result<usize> {
        let module = &*context.target;
        let ty = module.query_types().name(&self.call.type_name).require()?;
        let method = MethodQuery::in_type(module, ty)
            .selector(&self.call.method)
            .has_body()
            .require()?;
        let callee = context
            .scope()
            .method_ref(&self.call.call_type, &self.call.call_method, None)?;

        context.edit_body(method, |_, body| {
            let mut call = Vec::with_capacity(2);
            if self.call.pass_this {
                call.push(body.create(Instruction::ldarg(0)));
            }
            call.push(body.create(Instruction::call(callee)));
            insert_at(body, 0, &call)?;
            Ok(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{MethodSelector, Module},
        patch::Dispatcher,
        test::{
            factories::{dispatcher_module, game_module},
            vm::{Value, Vm},
        },
        Error,
    };

    fn call(ty: &str, method: &str, callee: &str, pass_this: bool) -> EntryCall {
        EntryCall {
            type_name: ty.to_string(),
            method: MethodSelector::named(method),
            call_type: "SurvivalKit.SKMain".to_string(),
            call_method: callee.to_string(),
            pass_this,
        }
    }

    fn patch(module: &mut Module, entry: &EntryCall) -> Result<usize> {
        let kit = dispatcher_module();
        let dispatcher = Dispatcher::resolve_default(&kit)?;
        let mut context = PatchContext::new(module, &dispatcher).with_references([&kit]);
        EntryCallPatcher::new(entry).apply(&mut context)
    }

    fn run(module: &Module, ty: &str, method: &str, args: Vec<Value>) -> Vec<String> {
        let ty = module.find_type(ty).unwrap();
        let handle = MethodQuery::in_type(module, ty).name(method).require().unwrap();
        let body = module.method(handle).unwrap().body.as_ref().unwrap();
        let outcome = Vm::new(args).run(body, |_, _| {}).unwrap();
        assert!(outcome.stack_empty);
        outcome.calls
    }

    #[test]
    fn static_initializer_call() {
        let mut module = game_module();
        let entry = call("ConnectionManager", ".cctor", "onGameInit", false);
        assert_eq!(patch(&mut module, &entry).unwrap(), 1);
        assert_eq!(
            run(&module, "ConnectionManager", ".cctor", Vec::new()),
            ["SurvivalKit.SKMain::onGameInit"]
        );
    }

    #[test]
    fn passes_this() {
        let mut module = game_module();
        let entry = call("GameManager", "Cleanup", "onGameDisable", true);
        patch(&mut module, &entry).unwrap();

        let ty = module.find_type("GameManager").unwrap();
        let handle = MethodQuery::in_type(&module, ty).name("Cleanup").require().unwrap();
        let body = module.method(handle).unwrap().body.as_ref().unwrap();
        assert_eq!(body.at(0).unwrap().to_string(), "ldarg.0");
        assert_eq!(
            run(&module, "GameManager", "Cleanup", vec![Value::object()]),
            ["SurvivalKit.SKMain::onGameDisable"]
        );
    }

    #[test]
    fn missing_symbols() {
        let mut module = game_module();
        let before = module.clone();
        for entry in [
            call("Nowhere", "Awake", "onGameEnable", true),
            call("GameManager", "Sleep", "onGameEnable", true),
            call("GameManager", "Awake", "onGameSleep", true),
        ] {
            assert!(matches!(
                patch(&mut module, &entry),
                Err(Error::SymbolNotFound { .. })
            ));
        }
        assert_eq!(
            run(&module, "GameManager", "Awake", vec![Value::object()]),
            run(&before, "GameManager", "Awake", vec![Value::object()])
        );
    }
}
