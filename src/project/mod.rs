//! Loading a patch run's modules and writing the result back.
//!
//! A run always involves several modules: the target being patched, the runtime and engine
//! modules its references resolve into, and the module declaring the dispatcher. A
//! [`PatchProject`] owns all of them for the duration of the run and hands out the
//! [`PatchContext`] the patchers and the script interpreter work against.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilhook::{patchers::PatchProfile, project::{PatchProject, ProjectLoader}};
//! use std::path::Path;
//!
//! let input = Path::new("Managed/Assembly-CSharp.json");
//! let mut project = ProjectLoader::new()
//!     .target(input)
//!     .dependency("Managed/mscorlib.json")
//!     .dependency("SurvivalKit.json")
//!     .version_marker("Deobfuscated")
//!     .build()?;
//!
//! let profile = PatchProfile::survival_kit();
//! let report = project.run(Some(&profile), None)?;
//! println!("{} hooks, {} failures", report.hooks(), report.failures());
//! project.write_to(PatchProject::output_path(input))?;
//! # Ok::<(), cilhook::Error>(())
//! ```

mod loader;
mod mapped;

use log::info;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    metadata::Module,
    patch::{Dispatcher, PatchContext},
    patchers::{apply_profile, PatchProfile, ProfileReport},
    script::{PatchScript, ScriptPatcher, ScriptReport},
    Error, Result,
};

pub use loader::ProjectLoader;

/// The modules of one patch run.
#[derive(Debug)]
pub struct PatchProject {
    target: Module,
    target_path: PathBuf,
    references: Vec<Module>,
}

/// Combined outcome of [`PatchProject::run`].
#[derive(Debug, Default)]
pub struct RunReport {
    /// Outcome of the built-in patchers, if a profile was applied
    pub profile: Option<ProfileReport>,
    /// Outcome of the patch script, if one was applied
    pub script: Option<ScriptReport>,
}

impl RunReport {
    /// Hooks inserted by patchers plus script entries applied.
    #[must_use]
    pub fn hooks(&self) -> usize {
        self.profile.as_ref().map_or(0, ProfileReport::hooks)
            + self.script.as_ref().map_or(0, ScriptReport::applied)
    }

    /// Failed patchers plus failed script entries.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.profile.as_ref().map_or(0, ProfileReport::failed)
            + self.script.as_ref().map_or(0, ScriptReport::failed)
    }
}

impl PatchProject {
    /// Wraps already loaded modules.
    #[must_use]
    pub fn new(target: Module, target_path: impl Into<PathBuf>, references: Vec<Module>) -> Self {
        PatchProject {
            target,
            target_path: target_path.into(),
            references,
        }
    }

    /// The module being patched.
    #[must_use]
    pub fn target(&self) -> &Module {
        &self.target
    }

    /// Where the target was loaded from.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Reference modules, in resolution order.
    #[must_use]
    pub fn references(&self) -> &[Module] {
        &self.references
    }

    /// Resolves the stock dispatcher in the first reference module declaring it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] if no reference module declares it.
    pub fn dispatcher(&self) -> Result<Dispatcher> {
        self.references
            .iter()
            .find(|module| module.contains_type(Dispatcher::DEFAULT_TYPE))
            .map_or_else(
                || {
                    Err(Error::SymbolNotFound {
                        what: "dispatcher type in reference modules".to_string(),
                        predicates: format!("name = {}", Dispatcher::DEFAULT_TYPE),
                    })
                },
                Dispatcher::resolve_default,
            )
    }

    /// A patch context over the target, resolving into every reference module.
    pub fn context<'a>(&'a mut self, dispatcher: &'a Dispatcher) -> PatchContext<'a> {
        PatchContext::new(&mut self.target, dispatcher).with_references(self.references.iter())
    }

    /// Applies the built-in patchers of `profile`, then `script`.
    ///
    /// Individual patcher and entry failures are collected in the report; only a missing
    /// dispatcher stops the run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolNotFound`] if no reference module declares the dispatcher.
    pub fn run(
        &mut self,
        profile: Option<&PatchProfile>,
        script: Option<PatchScript>,
    ) -> Result<RunReport> {
        let dispatcher = self.dispatcher()?;
        let mut context = self.context(&dispatcher);

        let mut report = RunReport::default();
        if let Some(profile) = profile {
            report.profile = Some(apply_profile(profile, &mut context));
        }
        if let Some(script) = script {
            report.script = Some(ScriptPatcher::new(script).apply(&mut context));
        }
        Ok(report)
    }

    /// Writes the (patched) target image to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the target cannot be encoded and
    /// [`Error::FileError`] if the file cannot be written.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.target.to_json()?)?;
        info!("Wrote {} to {}", self.target.name, path.display());
        Ok(())
    }

    /// The path patched output for `input` is written to: `<stem>.hooked.<ext>` in the same
    /// directory.
    #[must_use]
    pub fn output_path(input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match input.extension() {
            Some(ext) => format!("{stem}.hooked.{}", ext.to_string_lossy()),
            None => format!("{stem}.hooked"),
        };
        input.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::{dispatcher_module, game_module, runtime_module, unity_module};

    fn project() -> PatchProject {
        PatchProject::new(
            game_module(),
            "Managed/Assembly-CSharp.json",
            vec![unity_module(), runtime_module(), dispatcher_module()],
        )
    }

    #[test]
    fn output_path() {
        assert_eq!(
            PatchProject::output_path(Path::new("Managed/Assembly-CSharp.json")),
            Path::new("Managed/Assembly-CSharp.hooked.json")
        );
        assert_eq!(
            PatchProject::output_path(Path::new("target")),
            Path::new("target.hooked")
        );
    }

    #[test]
    fn dispatcher_needs_a_reference() {
        let project = PatchProject::new(game_module(), "a.json", vec![runtime_module()]);
        assert!(matches!(project.dispatcher(), Err(Error::SymbolNotFound { .. })));
        assert_eq!(
            self::project().dispatcher().unwrap(),
            Dispatcher::resolve_default(&dispatcher_module()).unwrap()
        );
    }

    #[test]
    fn run_and_write_back() {
        let mut project = project();
        let report = project.run(Some(&PatchProfile::survival_kit()), None).unwrap();
        assert_eq!(report.failures(), 0);
        assert_eq!(report.hooks(), 10);
        assert!(report.script.is_none());

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Assembly-CSharp.hooked.json");
        project.write_to(&output).unwrap();
        let written = Module::from_json("output", &fs::read(&output).unwrap()).unwrap();
        assert_eq!(written.types.len(), project.target().types.len());
    }
}
