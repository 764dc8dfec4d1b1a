use log::debug;

use crate::{
    assembly::{InstrId, Instruction, OpCode},
    metadata::{MethodBody, MethodQuery, TypeRef},
    patch::{hook::slot_index, insert_at, retarget, HookBuilder, PatchContext, TemplateCompiler},
    patchers::{fragments, Patcher, Signature, SwitchDefault},
    Error, Result,
};

/// Redirects the jump to a switch's default case into a hook that may supply the value
/// the default case would otherwise assign.
///
/// The hook leaves the argument array on the stack after the dispatcher call and then
/// branches on the handled flag:
///
/// ```text
///   <prefix>
///   <argument array> call dispatcher
///   dup; ldc.i4 handled; ldelem.ref; unbox.any bool; brtrue L
///   pop; br default+unhandledResume
/// L: ldc.i4 result; ldelem.ref; br default+handledResume
/// ```
pub struct SwitchDefaultPatcher<'p> {
    switch: &'p SwitchDefault,
}

impl<'p> SwitchDefaultPatcher<'p> {
    /// Creates the patcher for one profile entry.
    #[must_use]
    pub fn new(switch: &'p SwitchDefault) -> Self {
        SwitchDefaultPatcher { switch }
    }

    fn resume(body: &MethodBody, default_at: usize, offset: usize) -> Result<InstrId> {
        body.id_at(default_at + offset).ok_or(Error::IndexOutOfRange {
            index: default_at + offset,
            len: body.len(),
        })
    }

    fn tail(&self, body: &mut MethodBody, unhandled: InstrId, handled: InstrId) -> Result<Vec<InstrId>> {
        let take = body.create(Instruction::ldc_i4(slot_index(self.switch.result_slot)?));
        Ok(vec![
            body.create(Instruction::op(OpCode::Dup)),
            body.create(Instruction::ldc_i4(slot_index(self.switch.handled_slot)?)),
            body.create(Instruction::op(OpCode::LdelemRef)),
            body.create(Instruction::unbox_any(TypeRef::boolean())),
            body.create(Instruction::branch(OpCode::Brtrue, take)),
            body.create(Instruction::op(OpCode::Pop)),
            body.create(Instruction::branch(OpCode::Br, unhandled)),
            take,
            body.create(Instruction::op(OpCode::LdelemRef)),
            body.create(Instruction::branch(OpCode::Br, handled)),
        ])
    }
}

impl Patcher for SwitchDefaultPatcher<'_> {
    fn name(&self) -> String {
        format!("{} default case of {}", self.switch.event, self.switch.type_name)
    }

    fn apply(&self, context: &mut PatchContext<'_>) -> Result<usize> {
        let switch = self.switch;
        if switch.pattern.is_empty() {
            return Err(script_error!("{} has an empty pattern", switch.event));
        }

        let module = &*context.target;
        let ty = module.query_types().name(&switch.type_name).require()?;
        let method = MethodQuery::in_type(module, ty)
            .selector(&switch.method)
            .has_body()
            .require()?;
        let name = module.method_name(method);
        let signature = Signature::of(module, method)?;
        let dispatcher = context.dispatcher;

        context.edit_body(method, |scope, body| {
            let found = switch.pattern.locate_in(body, &name)?;
            let jump_at = found + switch.pattern.len() - 1;
            let jump = body.id_at(jump_at).ok_or(Error::IndexOutOfRange {
                index: jump_at,
                len: body.len(),
            })?;
            let default = body
                .get(jump)
                .and_then(|jump| jump.targets().first().copied())
                .ok_or_else(|| Error::NotABranch(jump.to_string()))?;
            let default_at = body
                .position_of(default)
                .ok_or_else(|| Error::ForeignInstruction(default.to_string()))?;

            let compiler = TemplateCompiler::new(scope);
            compiler
                .compile_match(&switch.default_shape)?
                .verify(body, default_at, &format!("{name} default case"))?;
            let unhandled = Self::resume(body, default_at, switch.unhandled_resume)?;
            let handled = Self::resume(body, default_at, switch.handled_resume)?;

            let mut hook = compiler.compile(body, &switch.prefix)?;
            let mut loaders = Vec::with_capacity(switch.loaders.len());
            for parameter in fragments(scope, &signature, body, &switch.loaders)? {
                loaders.push(HookBuilder::boxed(body, parameter.load, &parameter.ty));
            }
            hook.extend(HookBuilder::new(dispatcher).build(body, &switch.event, &loaders)?);
            hook.extend(self.tail(body, unhandled, handled)?);

            insert_at(body, default_at, &hook)?;
            let hook_start = hook.first().copied().ok_or_else(|| script_error!("Empty hook"))?;
            retarget(body, jump, hook_start)?;
            debug!("{name}: default case at {default_at} redirected through {} instructions", hook.len());
            Ok(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::Module,
        patch::{Dispatcher, InstructionTemplate, OpcodePattern},
        patchers::PatchProfile,
        test::{
            factories::{dispatcher_module, game_module, runtime_module},
            vm::{Value, Vm},
        },
    };

    fn chunk_provider() -> SwitchDefault {
        PatchProfile::survival_kit().switch_defaults.remove(0)
    }

    fn patch(module: &mut Module, switch: &SwitchDefault) -> Result<usize> {
        let runtime = runtime_module();
        let kit = dispatcher_module();
        let dispatcher = Dispatcher::resolve_default(&kit)?;
        let mut context = PatchContext::new(module, &dispatcher).with_references([&runtime, &kit]);
        SwitchDefaultPatcher::new(switch).apply(&mut context)
    }

    fn init(module: &Module) -> &MethodBody {
        let ty = module.find_type("ChunkCluster").unwrap();
        let handle = MethodQuery::in_type(module, ty).name("Init").require().unwrap();
        module.method(handle).unwrap().body.as_ref().unwrap()
    }

    fn provider(module: &Module, id: i32, answer: Option<&str>) -> (Option<Value>, Vec<String>) {
        let this = Value::object();
        let outcome = Vm::new(vec![this.clone(), Value::Int(id)])
            .run(init(module), |event, args| {
                assert_eq!(event, "UnknownChunkProviderEvent");
                assert_eq!(args[0], this);
                assert_eq!(args[2], Value::boxed(Value::Int(id)));
                if let Some(answer) = answer {
                    args[1] = Value::boxed(Value::Bool(true));
                    args[3] = Value::Str(answer.to_string());
                }
            })
            .unwrap();
        assert!(outcome.stack_empty);
        (this.field("provider"), outcome.events)
    }

    #[test]
    fn handlers_supply_unknown_providers() {
        let mut module = game_module();
        assert_eq!(patch(&mut module, &chunk_provider()).unwrap(), 1);

        let (value, events) = provider(&module, 9, Some("custom"));
        assert_eq!(value, Some(Value::Str("custom".into())));
        assert_eq!(events.len(), 1);

        let (value, events) = provider(&module, 9, None);
        assert_eq!(value, Some(Value::Null));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn known_cases_bypass_the_hook() {
        let mut module = game_module();
        patch(&mut module, &chunk_provider()).unwrap();

        let (value, events) = provider(&module, 1, Some("custom"));
        assert_eq!(value, Some(Value::Str("cave".into())));
        assert!(events.is_empty());
    }

    #[test]
    fn outdated_default_case_is_rejected() {
        let mut module = game_module();
        let before = init(&module).len();
        let switch = SwitchDefault {
            default_shape: vec![InstructionTemplate {
                index: Some(1),
                ..InstructionTemplate::op(OpCode::LdcI40)
            }],
            ..chunk_provider()
        };
        assert!(matches!(
            patch(&mut module, &switch),
            Err(Error::ShapeMismatch { .. })
        ));
        assert_eq!(init(&module).len(), before);
    }

    #[test]
    fn missing_switch() {
        let mut module = game_module();
        let switch = SwitchDefault {
            pattern: OpcodePattern::exactly_once(&[OpCode::Switch, OpCode::BrS]),
            ..chunk_provider()
        };
        assert!(matches!(
            patch(&mut module, &switch),
            Err(Error::ShapeNotFound { .. })
        ));
    }
}
