//! Hook Synthesizer: the instruction sequences that call the event dispatcher.
//!
//! A hook packs values into an `object[]`, passes it to the dispatcher together with the
//! event name and leaves the array on the stack, so that values modified by event
//! handlers can be written back:
//!
//! ```text
//! ldstr   "EventName"
//! ldc.i4  n
//! newarr  System.Object
//! dup; ldc.i4 0; <loader 0>; stelem.ref
//! ...
//! dup; ldc.i4 n-1; <loader n-1>; stelem.ref
//! call    FireEvent(string, object[])
//! ```
//!
//! By convention slot 0 of a cancellable hook is the boxed `cancelled` flag.
//! [`HookBuilder::compose`] assembles the full protocol: loaders, dispatcher call,
//! cancellation check, write-back of modified values, and the final `pop` of the array.

use crate::{
    assembly::{InstrId, Instruction, OpCode},
    metadata::{MethodBody, MethodQuery, MethodRef, Module, TypeRef},
    Error, Result,
};

/// The external function hooks call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatcher {
    /// The dispatcher method, `static object[] (string, object[])` returning its argument array
    pub method: MethodRef,
}

impl Dispatcher {
    /// Type declaring the stock dispatcher.
    pub const DEFAULT_TYPE: &'static str = "SurvivalKit.Events.EventManager";
    /// Name of the stock dispatcher method.
    pub const DEFAULT_METHOD: &'static str = "FireEvent";
    /// Parameter names of the stock dispatcher method.
    pub const DEFAULT_PARAMETER_NAMES: [&'static str; 2] = ["name", "pars"];

    /// Wraps an already known method reference.
    #[must_use]
    pub fn new(method: MethodRef) -> Self {
        Dispatcher { method }
    }

    /// Resolves the dispatcher in `module` by type, method name and parameter names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] if no such method exists.
    pub fn resolve(
        module: &Module,
        type_name: &str,
        method_name: &str,
        parameter_names: &[&str],
    ) -> Result<Self> {
        let ty = module.find_type(type_name).ok_or_else(|| Error::SymbolNotFound {
            what: format!("dispatcher type in {}", module.name),
            predicates: format!("name = {type_name}"),
        })?;
        let handle = MethodQuery::in_type(module, ty)
            .name(method_name)
            .parameter_names(parameter_names)
            .static_methods()
            .require()?;
        let method = module.method_ref(handle).ok_or_else(|| Error::SymbolNotFound {
            what: format!("dispatcher in {type_name}"),
            predicates: format!("name = {method_name}"),
        })?;
        Ok(Dispatcher { method })
    }

    /// Resolves the stock dispatcher in `module`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] if the module does not contain it.
    pub fn resolve_default(module: &Module) -> Result<Self> {
        Dispatcher::resolve(
            module,
            Self::DEFAULT_TYPE,
            Self::DEFAULT_METHOD,
            &Self::DEFAULT_PARAMETER_NAMES,
        )
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher {
            method: MethodRef::new(
                TypeRef::parse(Self::DEFAULT_TYPE),
                Self::DEFAULT_METHOD,
                vec![TypeRef::string(), TypeRef::new("System", "Object[]")],
                TypeRef::new("System", "Object[]"),
            ),
        }
    }
}

/// Compiled fragments of one hook parameter.
#[derive(Debug, Clone)]
pub struct ParameterFragments {
    /// The parameter type, decides boxing and unboxing
    pub ty: TypeRef,
    /// Custom writers receive the array themselves instead of the unpacked value
    pub custom: bool,
    /// Pushes the value to pass
    pub load: Vec<InstrId>,
    /// Stores the value returned by the handlers
    pub write: Option<Vec<InstrId>>,
}

/// Builds hook sequences inside the arena of a method body.
///
/// Every builder method creates instructions with [`MethodBody::create`] and returns
/// their identities; nothing is inserted into the stream.
pub struct HookBuilder<'d> {
    dispatcher: &'d Dispatcher,
}

impl<'d> HookBuilder<'d> {
    /// Creates a builder calling `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: &'d Dispatcher) -> Self {
        HookBuilder { dispatcher }
    }

    /// Packs the values pushed by `loaders` into an `object[]` and calls the dispatcher.
    ///
    /// Each loader must push exactly one object reference; boxing value types is the
    /// caller's job (see [`HookBuilder::boxed`]). The dispatcher hands the argument array
    /// back, so it stays on the stack for the unpacking tail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if the number of loaders does not fit an `ldc.i4`.
    pub fn build(&self, body: &mut MethodBody, event: &str, loaders: &[Vec<InstrId>]) -> Result<Vec<InstrId>> {
        let mut hook = vec![
            body.create(Instruction::ldstr(event)),
            body.create(Instruction::ldc_i4(slot_index(loaders.len())?)),
            body.create(Instruction::newarr(TypeRef::object())),
        ];
        for (slot, loader) in loaders.iter().enumerate() {
            hook.push(body.create(Instruction::op(OpCode::Dup)));
            hook.push(body.create(Instruction::ldc_i4(slot_index(slot)?)));
            hook.extend_from_slice(loader);
            hook.push(body.create(Instruction::op(OpCode::StelemRef)));
        }
        hook.push(body.create(Instruction::call(self.dispatcher.method.clone())));
        Ok(hook)
    }

    /// Reads the boolean in `slot` and returns from the method if it is set.
    ///
    /// Execution continues at `continue_at`; without one, a trailing `nop` is emitted
    /// as continuation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if `slot` does not fit an `ldc.i4`.
    pub fn cancel_check(body: &mut MethodBody, slot: usize, continue_at: Option<InstrId>) -> Result<Vec<InstrId>> {
        let index = slot_index(slot)?;
        let mut check = Vec::with_capacity(8);
        check.push(body.create(Instruction::op(OpCode::Dup)));
        check.push(body.create(Instruction::ldc_i4(index)));
        check.push(body.create(Instruction::op(OpCode::LdelemRef)));
        check.push(body.create(Instruction::unbox_any(TypeRef::boolean())));

        let (target, trailing) = match continue_at {
            Some(target) => (target, None),
            None => {
                let nop = body.create(Instruction::op(OpCode::Nop));
                (nop, Some(nop))
            }
        };
        check.push(body.create(Instruction::branch(OpCode::Brfalse, target)));
        check.push(body.create(Instruction::op(OpCode::Pop)));
        check.push(body.create(Instruction::op(OpCode::Ret)));
        check.extend(trailing);
        Ok(check)
    }

    /// Unpacks `slot` as `ty` and appends `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if `slot` does not fit an `ldc.i4`.
    pub fn writer(body: &mut MethodBody, slot: usize, ty: &TypeRef, store: &[InstrId]) -> Result<Vec<InstrId>> {
        let index = slot_index(slot)?;
        let mut writer = vec![
            body.create(Instruction::op(OpCode::Dup)),
            body.create(Instruction::ldc_i4(index)),
            body.create(Instruction::op(OpCode::LdelemRef)),
            body.create(if ty.is_value_type {
                Instruction::unbox_any(ty.clone())
            } else {
                Instruction::castclass(ty.clone())
            }),
        ];
        writer.extend_from_slice(store);
        Ok(writer)
    }

    /// Loads a boxed boolean constant.
    pub fn bool_loader(body: &mut MethodBody, value: bool) -> Vec<InstrId> {
        vec![
            body.create(Instruction::ldc_i4(i32::from(value))),
            body.create(Instruction::box_value(TypeRef::boolean())),
        ]
    }

    /// Appends `box ty` to `load` if `ty` is a value type.
    pub fn boxed(body: &mut MethodBody, mut load: Vec<InstrId>, ty: &TypeRef) -> Vec<InstrId> {
        if ty.is_value_type {
            load.push(body.create(Instruction::box_value(ty.clone())));
        }
        load
    }

    /// Assembles a complete hook.
    ///
    /// Cancellable hooks get a `false` flag in slot 0 and the cancellation check right
    /// after the call; parameters occupy the following slots in order. Writers of
    /// parameters that are not custom are prefixed with the unpacking of their slot.
    /// The sequence ends with a `pop` of the argument array, leaving the stack as it was.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if a slot index does not fit an `ldc.i4`.
    pub fn compose(
        &self,
        body: &mut MethodBody,
        event: &str,
        cancellable: bool,
        parameters: Vec<ParameterFragments>,
    ) -> Result<Vec<InstrId>> {
        let first_slot = usize::from(cancellable);
        let mut loaders = Vec::with_capacity(parameters.len() + first_slot);
        let mut writers = Vec::new();

        if cancellable {
            loaders.push(Self::bool_loader(body, false));
            writers.push(Self::cancel_check(body, 0, None)?);
        }
        for (i, parameter) in parameters.into_iter().enumerate() {
            let slot = first_slot + i;
            loaders.push(Self::boxed(body, parameter.load, &parameter.ty));
            if let Some(store) = parameter.write {
                writers.push(if parameter.custom {
                    store
                } else {
                    Self::writer(body, slot, &parameter.ty, &store)?
                });
            }
        }

        let mut hook = self.build(body, event, &loaders)?;
        hook.extend(writers.into_iter().flatten());
        hook.push(body.create(Instruction::op(OpCode::Pop)));
        Ok(hook)
    }
}

/// Converts an argument array slot into an `ldc.i4` operand.
pub(crate) fn slot_index(slot: usize) -> Result<i32> {
    i32::try_from(slot).map_err(|_| script_error!("Slot {} is out of range", slot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{
        factories::dispatcher_module,
        vm::{Value, Vm},
    };

    #[test]
    fn build_layout() {
        let dispatcher = Dispatcher::default();
        let mut body = MethodBody::new();
        let loaders = vec![
            vec![body.create(Instruction::op(OpCode::Ldarg0))],
            vec![body.create(Instruction::ldstr("x"))],
        ];
        let hook = HookBuilder::new(&dispatcher).build(&mut body, "Tick", &loaders).unwrap();

        let opcodes: Vec<OpCode> = hook.iter().map(|id| body.get(*id).unwrap().opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                OpCode::Ldstr,
                OpCode::LdcI42,
                OpCode::Newarr,
                OpCode::Dup,
                OpCode::LdcI40,
                OpCode::Ldarg0,
                OpCode::StelemRef,
                OpCode::Dup,
                OpCode::LdcI41,
                OpCode::Ldstr,
                OpCode::StelemRef,
                OpCode::Call,
            ]
        );
    }

    #[test]
    fn resolves_dispatcher_by_parameter_names() {
        let module = dispatcher_module();
        let dispatcher = Dispatcher::resolve_default(&module).unwrap();
        assert_eq!(dispatcher, Dispatcher::default());

        assert!(Dispatcher::resolve(&module, Dispatcher::DEFAULT_TYPE, "FireEvent", &["a", "b"]).is_err());
        assert!(Dispatcher::resolve(&module, "Missing.Type", "FireEvent", &["name", "pars"]).is_err());
    }

    #[test]
    fn cancel_check_branches_over_return() {
        let mut body = MethodBody::new();
        let check = HookBuilder::cancel_check(&mut body, 0, None).unwrap();
        assert_eq!(check.len(), 8);
        let branch = body.get(check[4]).unwrap();
        assert_eq!(branch.targets(), &[check[7]]);

        let resume = body.create(Instruction::op(OpCode::Ret));
        let explicit = HookBuilder::cancel_check(&mut body, 3, Some(resume)).unwrap();
        assert_eq!(explicit.len(), 7);
        assert_eq!(body.get(explicit[1]).unwrap().int_constant(), Some(3));
        assert_eq!(body.get(explicit[4]).unwrap().targets(), &[resume]);
    }

    #[test]
    fn writer_unpacks_by_kind() {
        let mut body = MethodBody::new();
        let store = vec![body.create(Instruction::starg(1))];
        let value = HookBuilder::writer(&mut body, 1, &TypeRef::int32(), &store).unwrap();
        assert_eq!(body.get(value[3]).unwrap().opcode, OpCode::UnboxAny);
        assert_eq!(value[4], store[0]);

        let reference = HookBuilder::writer(&mut body, 1, &TypeRef::string(), &store).unwrap();
        assert_eq!(body.get(reference[3]).unwrap().opcode, OpCode::Castclass);
    }

    #[test]
    fn composed_hook_round_trips_arguments() {
        let dispatcher = Dispatcher::default();
        let mut body = MethodBody::new();
        let parameters = vec![
            ParameterFragments {
                ty: TypeRef::int32(),
                custom: false,
                load: vec![body.create(Instruction::ldarg(1))],
                write: Some(vec![body.create(Instruction::starg(1))]),
            },
            ParameterFragments {
                ty: TypeRef::string(),
                custom: false,
                load: vec![body.create(Instruction::ldarg(2))],
                write: Some(vec![body.create(Instruction::starg(2))]),
            },
        ];
        let hook = HookBuilder::new(&dispatcher)
            .compose(&mut body, "Changed", false, parameters)
            .unwrap();
        body.order_mut().extend(hook);
        body.push(Instruction::op(OpCode::Ret));

        let mut vm = Vm::new(vec![Value::Null, Value::Int(7), Value::Str("a".into())]);
        let outcome = vm
            .run(&body, |event, args| {
                assert_eq!(event, "Changed");
                assert_eq!(args[0].unboxed(), Some(&Value::Int(7)));
                assert_eq!(args[1], Value::Str("a".into()));
                args[0] = Value::boxed(Value::Int(8));
                args[1] = Value::Str("b".into());
            })
            .unwrap();

        assert_eq!(outcome.events, vec!["Changed".to_string()]);
        assert_eq!(vm.args()[1], Value::Int(8));
        assert_eq!(vm.args()[2], Value::Str("b".into()));
        assert!(outcome.stack_empty);
    }

    #[test]
    fn cancellation_short_circuits() {
        let dispatcher = Dispatcher::default();
        let mut body = MethodBody::new();
        let hook = HookBuilder::new(&dispatcher)
            .compose(&mut body, "Spawn", true, Vec::new())
            .unwrap();
        body.order_mut().extend(hook);
        body.push(Instruction::ldc_i4(1));
        body.push(Instruction::starg(0));
        body.push(Instruction::op(OpCode::Ret));

        let mut vm = Vm::new(vec![Value::Int(0)]);
        let cancelled = vm
            .run(&body, |_, args| {
                assert_eq!(args[0].unboxed(), Some(&Value::Bool(false)));
                args[0] = Value::boxed(Value::Bool(true));
            })
            .unwrap();
        assert!(cancelled.stack_empty);
        assert_eq!(vm.args()[0], Value::Int(0));

        let mut vm = Vm::new(vec![Value::Int(0)]);
        vm.run(&body, |_, _| {}).unwrap();
        assert_eq!(vm.args()[0], Value::Int(1));
    }

    #[test]
    fn literal_loaders_reach_the_handlers() {
        let dispatcher = Dispatcher::default();
        let mut body = MethodBody::new();
        let flag = HookBuilder::bool_loader(&mut body, true);
        let seven = vec![body.create(Instruction::ldc_i4(7))];
        let number = HookBuilder::boxed(&mut body, seven, &TypeRef::int32());
        let hook = HookBuilder::new(&dispatcher).build(&mut body, "E", &[flag, number]).unwrap();
        body.order_mut().extend(hook);
        body.push(Instruction::op(OpCode::Pop));
        body.push(Instruction::op(OpCode::Ret));

        let mut received = Vec::new();
        let outcome = Vm::new(Vec::new())
            .run(&body, |event, args| {
                assert_eq!(event, "E");
                received = args.to_vec();
            })
            .unwrap();

        assert_eq!(received.len(), 2);
        assert_eq!(
            received,
            vec![Value::boxed(Value::Bool(true)), Value::boxed(Value::Int(7))]
        );
        assert!(outcome.stack_empty);
    }

    #[test]
    fn oversized_slot_is_an_error() {
        let mut body = MethodBody::new();
        let slot = usize::try_from(i64::from(i32::MAX) + 1).unwrap();
        assert!(matches!(slot_index(slot), Err(Error::Script { .. })));
        assert!(matches!(
            HookBuilder::cancel_check(&mut body, slot, None),
            Err(Error::Script { .. })
        ));
        assert!(matches!(
            HookBuilder::writer(&mut body, slot, &TypeRef::int32(), &[]),
            Err(Error::Script { .. })
        ));
        assert_eq!(slot_index(3).unwrap(), 3);
    }
}
