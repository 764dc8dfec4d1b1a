//! Built-in patchers driven by a [`PatchProfile`].
//!
//! Each patcher covers one family of hooks that cannot be expressed as a single script
//! entry: hooks repeated over every type matching a predicate, hooks over every method
//! carrying an attribute, or hooks that redirect existing control flow. What they look
//! for comes entirely from the profile.
//!
//! Patchers run one after the other against the same [`PatchContext`]. A failing patcher
//! is logged and skipped; see [`apply_profile`].

use log::{error, info};

use crate::{
    assembly::{InstrId, Instruction, OpCode},
    metadata::{MethodBody, MethodHandle, Module, Scope, TypeRef},
    patch::{ParameterFragments, PatchContext},
    Error, Result,
};

mod attribute;
mod entry;
mod event;
mod profile;
mod switch;

pub use attribute::AttributeHookPatcher;
pub use entry::EntryCallPatcher;
pub use event::EventHookPatcher;
pub use profile::{
    AttributeHook, EntryCall, EventHook, HookPosition, PatchProfile, SwitchDefault, TargetTypes,
    TrailingParameter, ValueSource,
};
pub use switch::SwitchDefaultPatcher;

/// A rewrite of the target module.
pub trait Patcher {
    /// Name for logging and reports.
    fn name(&self) -> String;

    /// Applies the rewrite and returns the number of hooks inserted.
    ///
    /// # Errors
    ///
    /// Returns the resolution, shape or splice error that stopped the patcher. Hooks
    /// inserted before the failure stay in place.
    fn apply(&self, context: &mut PatchContext<'_>) -> Result<usize>;
}

/// Outcome of one patcher.
#[derive(Debug)]
pub struct PatcherOutcome {
    /// [`Patcher::name`]
    pub name: String,
    /// Hooks inserted, or the error that stopped the patcher
    pub result: Result<usize>,
}

/// Outcomes of every patcher of a profile, in order.
#[derive(Debug, Default)]
pub struct ProfileReport {
    /// Per-patcher outcomes
    pub outcomes: Vec<PatcherOutcome>,
}

impl ProfileReport {
    /// Total number of hooks inserted.
    #[must_use]
    pub fn hooks(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .sum()
    }

    /// Number of patchers that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.result.is_err()).count()
    }
}

/// Instantiates the patchers of `profile` in application order.
#[must_use]
pub fn patchers(profile: &PatchProfile) -> Vec<Box<dyn Patcher + '_>> {
    let mut all: Vec<Box<dyn Patcher + '_>> = Vec::new();
    all.extend(
        profile
            .entry_calls
            .iter()
            .map(|call| Box::new(EntryCallPatcher::new(call)) as Box<dyn Patcher + '_>),
    );
    all.extend(
        profile
            .event_hooks
            .iter()
            .map(|hook| Box::new(EventHookPatcher::new(hook)) as Box<dyn Patcher + '_>),
    );
    all.extend(
        profile
            .attribute_hooks
            .iter()
            .map(|hook| Box::new(AttributeHookPatcher::new(hook)) as Box<dyn Patcher + '_>),
    );
    all.extend(
        profile
            .switch_defaults
            .iter()
            .map(|switch| Box::new(SwitchDefaultPatcher::new(switch)) as Box<dyn Patcher + '_>),
    );
    all
}

/// Runs every patcher of `profile`, continuing past failures.
pub fn apply_profile(profile: &PatchProfile, context: &mut PatchContext<'_>) -> ProfileReport {
    let mut report = ProfileReport::default();
    for patcher in patchers(profile) {
        let name = patcher.name();
        let result = patcher.apply(context);
        match &result {
            Ok(hooks) => info!("{name}: {hooks} hook(s) inserted"),
            Err(e) => error!("{name} failed: {e}"),
        }
        report.outcomes.push(PatcherOutcome { name, result });
    }
    report
}

/// The argument types of a method as seen by `ldarg`.
pub(crate) struct Signature {
    declaring: TypeRef,
    is_static: bool,
    parameters: Vec<TypeRef>,
}

impl Signature {
    pub(crate) fn of(module: &Module, method: MethodHandle) -> Result<Self> {
        let (Some(ty), Some(def)) = (module.type_def(method.ty), module.method(method)) else {
            return Err(Error::SymbolNotFound {
                what: format!("method in {}", module.name),
                predicates: format!("handle = {method:?}"),
            });
        };
        Ok(Signature {
            declaring: ty.type_ref(),
            is_static: def.is_static(),
            parameters: def.parameter_types().cloned().collect(),
        })
    }

    /// Type of the argument at evaluation-stack index `index`.
    fn argument(&self, index: u16) -> Result<TypeRef> {
        let index = usize::from(index);
        let parameter = match (self.is_static, index) {
            (false, 0) => return Ok(self.declaring.clone()),
            (false, i) => i - 1,
            (true, i) => i,
        };
        self.parameters.get(parameter).cloned().ok_or_else(|| {
            script_error!(
                "{} has no argument {} ({} parameters)",
                self.declaring,
                index,
                self.parameters.len()
            )
        })
    }
}

/// Compiles value sources into hook parameters for a method with `signature`.
pub(crate) fn fragments(
    scope: &Scope<'_>,
    signature: &Signature,
    body: &mut MethodBody,
    sources: &[ValueSource],
) -> Result<Vec<ParameterFragments>> {
    let mut all = Vec::with_capacity(sources.len());
    for source in sources {
        let single = |body: &mut MethodBody, instruction: Instruction| vec![body.create(instruction)];
        let (ty, load, write): (TypeRef, Vec<InstrId>, Option<Vec<InstrId>>) = match source {
            ValueSource::This => {
                if signature.is_static {
                    return Err(script_error!("{} has no this in a static method", signature.declaring));
                }
                (TypeRef::object(), single(body, Instruction::ldarg(0)), None)
            }
            ValueSource::Argument { index, write_back } => (
                signature.argument(*index)?,
                single(body, Instruction::ldarg(*index)),
                write_back.then(|| single(body, Instruction::starg(*index))),
            ),
            ValueSource::Bool { value } => (
                TypeRef::boolean(),
                single(body, Instruction::ldc_i4(i32::from(*value))),
                None,
            ),
            ValueSource::String { value } => {
                (TypeRef::string(), single(body, Instruction::ldstr(value.as_str())), None)
            }
            ValueSource::Null => (TypeRef::object(), single(body, Instruction::op(OpCode::Ldnull)), None),
            ValueSource::Property { getter } => {
                if signature.is_static {
                    return Err(script_error!(
                        "Property {} needs an instance of {}",
                        getter,
                        signature.declaring
                    ));
                }
                let getter = scope.method_ref(&signature.declaring.full_name(), getter, None)?;
                let ty = getter.return_type.clone();
                let load = vec![
                    body.create(Instruction::ldarg(0)),
                    body.create(Instruction::call(getter)),
                ];
                (ty, load, None)
            }
        };
        all.push(ParameterFragments {
            ty,
            custom: false,
            load,
            write,
        });
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        patch::Dispatcher,
        test::factories::{dispatcher_module, game_module, runtime_module, unity_module},
    };

    #[test]
    fn survival_kit_profile_applies_cleanly() {
        let mut module = game_module();
        let runtime = runtime_module();
        let unity = unity_module();
        let kit = dispatcher_module();
        let dispatcher = Dispatcher::resolve_default(&kit).unwrap();
        let mut context =
            PatchContext::new(&mut module, &dispatcher).with_references([&unity, &runtime, &kit]);

        let report = apply_profile(&PatchProfile::survival_kit(), &mut context);
        for outcome in &report.outcomes {
            assert!(outcome.result.is_ok(), "{}: {:?}", outcome.name, outcome.result);
        }
        // 3 entry calls, Process/Read/Write of ChatPackage, SetBlocks, 2 RPC methods, switch
        assert_eq!(report.hooks(), 10);
        assert_eq!(report.failed(), 0);
    }

    #[test]
    fn failures_do_not_stop_later_patchers() {
        let mut module = game_module();
        let kit = dispatcher_module();
        let dispatcher = Dispatcher::resolve_default(&kit).unwrap();
        let mut context = PatchContext::new(&mut module, &dispatcher).with_references([&kit]);

        let mut profile = PatchProfile::survival_kit();
        profile.entry_calls[0].call_method = "missing".to_string();
        profile.event_hooks.clear();
        profile.attribute_hooks.clear();
        profile.switch_defaults.clear();

        let report = apply_profile(&profile, &mut context);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.hooks(), 2);
        assert!(matches!(
            report.outcomes[0].result,
            Err(Error::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn signature_arguments() {
        let module = game_module();
        let ty = module.find_type("GameManager").unwrap();
        let handle = module
            .query_methods()
            .declaring_type("GameManager")
            .name("SetBlocksRPC")
            .require()
            .unwrap();
        assert_eq!(handle.ty, ty);

        let signature = Signature::of(&module, handle).unwrap();
        assert_eq!(signature.argument(0).unwrap().full_name(), "GameManager");
        assert_eq!(signature.argument(1).unwrap(), TypeRef::object());
        assert!(signature.argument(2).is_err());
    }
}
