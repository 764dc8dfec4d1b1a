//! Applies a parsed [`PatchScript`] to the target module.
//!
//! Every `<hook>` entry runs through the same stages in order: resolve the target
//! method, verify the match block, compile the templates, synthesize the hook and
//! splice it in. A failing entry stops at the [`Stage`] it reached and is recorded in
//! the [`ScriptReport`] with the instruction stream of its method left as it was, and
//! the remaining entries still run.

use log::{debug, error, info};

use crate::{
    metadata::{MethodHandle, MethodQuery},
    patch::{insert_at, HookBuilder, MatchSpec, ParameterFragments, PatchContext, TemplateCompiler},
    script::entry::{HookEntry, InsertAt, PatchScript},
    Error, Result,
};

/// The step at which an entry failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Reading the `<hook>` element
    Parse,
    /// Finding the target type and method
    ResolveTarget,
    /// Checking the match block against the candidates
    VerifyShape,
    /// Compiling load and write fragments
    BuildTemplates,
    /// Assembling the hook sequence
    Synthesize,
    /// Inserting the hook into the body
    Splice,
}

/// Outcome of a single entry.
#[derive(Debug)]
pub enum EntryStatus {
    /// The hook was inserted
    Applied {
        /// `Type::Method` that received the hook
        method: String,
        /// Index of the first hook instruction
        position: usize,
        /// Number of inserted instructions
        length: usize,
    },
    /// The entry was skipped
    Failed {
        /// Where it failed
        stage: Stage,
        /// Why
        error: Error,
    },
}

/// Outcome of an entry, labelled for reporting.
#[derive(Debug)]
pub struct EntryReport {
    /// Event name or position of the entry
    pub label: String,
    /// What happened
    pub status: EntryStatus,
}

impl EntryReport {
    /// Returns `true` if the hook was inserted.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self.status, EntryStatus::Applied { .. })
    }
}

/// Outcome of a whole script, one report per entry in declaration order.
#[derive(Debug, Default)]
pub struct ScriptReport {
    /// Per-entry reports
    pub entries: Vec<EntryReport>,
}

impl ScriptReport {
    /// Number of applied entries.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_applied()).count()
    }

    /// Number of skipped entries.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.entries.len() - self.applied()
    }

    /// Iterates the failed entries with their stage and error.
    pub fn failures(&self) -> impl Iterator<Item = (&str, Stage, &Error)> + '_ {
        self.entries.iter().filter_map(|entry| match &entry.status {
            EntryStatus::Failed { stage, error } => Some((entry.label.as_str(), *stage, error)),
            EntryStatus::Applied { .. } => None,
        })
    }
}

struct Applied {
    method: String,
    position: usize,
    length: usize,
}

/// Applies a [`PatchScript`] to the target of a [`PatchContext`].
///
/// Entries run one after the other; a failing entry is logged, recorded in the
/// [`ScriptReport`] and skipped, and the next one still runs against the module as the
/// previous entries left it.
pub struct ScriptPatcher {
    script: PatchScript,
}

impl ScriptPatcher {
    /// Creates a patcher for `script`.
    #[must_use]
    pub fn new(script: PatchScript) -> Self {
        ScriptPatcher { script }
    }

    /// Applies every entry to `context.target`.
    pub fn apply(self, context: &mut PatchContext<'_>) -> ScriptReport {
        let mut report = ScriptReport::default();
        for entry in self.script.entries {
            let status = match entry.hook {
                Err(error) => Err((Stage::Parse, error)),
                Ok(hook) => apply_hook(context, &hook),
            };
            let status = match status {
                Ok(applied) => {
                    info!(
                        "Hooked {} into {} at {} ({} instructions)",
                        entry.label, applied.method, applied.position, applied.length
                    );
                    EntryStatus::Applied {
                        method: applied.method,
                        position: applied.position,
                        length: applied.length,
                    }
                }
                Err((stage, error)) => {
                    error!("Skipping {} - {} failed: {}", entry.label, stage, error);
                    EntryStatus::Failed { stage, error }
                }
            };
            report.entries.push(EntryReport {
                label: entry.label,
                status,
            });
        }
        report
    }
}

fn at(stage: Stage) -> impl FnOnce(Error) -> (Stage, Error) {
    move |error| (stage, error)
}

fn resolve_target(
    context: &PatchContext<'_>,
    hook: &HookEntry,
) -> std::result::Result<MethodHandle, (Stage, Error)> {
    let module = &*context.target;
    let ty = module.find_type(&hook.type_name).ok_or_else(|| {
        (
            Stage::ResolveTarget,
            Error::SymbolNotFound {
                what: format!("type in {}", module.name),
                predicates: format!("name = {}", hook.type_name),
            },
        )
    })?;
    let candidates = MethodQuery::in_type(module, ty)
        .selector(&hook.method.selector)
        .has_body();
    let first = candidates.require().map_err(at(Stage::ResolveTarget))?;
    if hook.method.shape.is_empty() {
        return Ok(first);
    }

    let scope = context.scope();
    let spec: MatchSpec = TemplateCompiler::new(&scope)
        .compile_match(&hook.method.shape)
        .map_err(at(Stage::VerifyShape))?;

    let mut first_mismatch = None;
    for handle in candidates.iter() {
        let Some(body) = module.method(handle).and_then(|m| m.body.as_ref()) else {
            continue;
        };
        match spec.verify(body, 0, &module.method_name(handle)) {
            Ok(()) => return Ok(handle),
            Err(mismatch) => {
                debug!("{mismatch}");
                first_mismatch.get_or_insert(mismatch);
            }
        }
    }
    Err((
        Stage::VerifyShape,
        first_mismatch.unwrap_or_else(|| script_error!("No candidate body to verify")),
    ))
}

fn apply_hook(
    context: &mut PatchContext<'_>,
    hook: &HookEntry,
) -> std::result::Result<Applied, (Stage, Error)> {
    let method = resolve_target(context, hook)?;
    let name = context.target.method_name(method);
    let dispatcher = context.dispatcher;

    let mut failed_stage = Stage::BuildTemplates;
    let outcome = context.edit_body(method, |scope, body| {
        let position = match &hook.insert_at {
            InsertAt::Index(index) => *index,
            InsertAt::End => body.len(),
            InsertAt::Pattern { pattern, offset } => {
                failed_stage = Stage::VerifyShape;
                let found = pattern.locate_in(body, &name)?;
                found.checked_add_signed(*offset).ok_or_else(|| {
                    script_error!(
                        "Pattern offset {} moves before the start of {}",
                        offset,
                        name
                    )
                })?
            }
        };

        failed_stage = Stage::BuildTemplates;
        let compiler = TemplateCompiler::new(scope);
        let mut parameters = Vec::with_capacity(hook.parameters.len());
        for (slot, parameter) in hook.parameters.iter().enumerate() {
            let load = parameter.load.as_deref().ok_or_else(|| {
                script_error!("Parameter {} of {} has no <load> fragment", slot, hook.event)
            })?;
            parameters.push(ParameterFragments {
                ty: scope.type_ref(&parameter.type_name)?,
                custom: parameter.custom,
                load: compiler.compile(body, load)?,
                write: parameter
                    .write
                    .as_deref()
                    .map(|write| compiler.compile(body, write))
                    .transpose()?,
            });
        }

        failed_stage = Stage::Synthesize;
        let sequence =
            HookBuilder::new(dispatcher).compose(body, &hook.event, hook.cancellable, parameters)?;

        failed_stage = Stage::Splice;
        insert_at(body, position, &sequence)?;
        Ok((position, sequence.len()))
    });

    match outcome {
        Ok((position, length)) => Ok(Applied {
            method: name,
            position,
            length,
        }),
        Err(error) => Err((failed_stage, error)),
    }
}
