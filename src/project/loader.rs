//! Builder for [`PatchProject`].

use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::{
    project::{mapped::MappedImage, PatchProject},
    Error, Result,
};

/// Builder that loads a target module together with the modules its references resolve
/// into.
///
/// Nothing touches the filesystem until [`ProjectLoader::build`]. Dependencies are searched
/// in the order they were added, after the target itself.
///
/// # Examples
///
/// ```rust,no_run
/// use cilhook::project::ProjectLoader;
///
/// let project = ProjectLoader::new()
///     .target("Managed/Assembly-CSharp.json")
///     .dependency("Managed/UnityEngine.json")
///     .dependency("Managed/mscorlib.json")
///     .dependency("SurvivalKit.json")
///     .version_marker("Deobfuscated")
///     .build()?;
/// println!("{} references", project.references().len());
/// # Ok::<(), cilhook::Error>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct ProjectLoader {
    target: Option<PathBuf>,
    dependencies: Vec<PathBuf>,
    version_marker: Option<String>,
}

impl ProjectLoader {
    /// Create a new, empty loader.
    #[must_use]
    pub fn new() -> Self {
        ProjectLoader::default()
    }

    /// Sets the module to patch.
    #[must_use]
    pub fn target(mut self, path: impl AsRef<Path>) -> Self {
        self.target = Some(path.as_ref().to_path_buf());
        self
    }

    /// Adds a module references may resolve into.
    #[must_use]
    pub fn dependency(mut self, path: impl AsRef<Path>) -> Self {
        self.dependencies.push(path.as_ref().to_path_buf());
        self
    }

    /// Requires the target to define a type with this qualified name.
    ///
    /// The marker is left behind by the tool that prepares the target; its absence means
    /// the target is still in its shipped form.
    #[must_use]
    pub fn version_marker(mut self, marker: impl Into<String>) -> Self {
        self.version_marker = Some(marker.into());
        self
    }

    /// Loads every module.
    ///
    /// All paths are checked before any image is decoded, so a missing dependency is
    /// reported without paying for decoding the target first.
    ///
    /// # Errors
    ///
    /// - [`Error::Script`] if no target was set
    /// - [`Error::MissingModule`] if any image does not exist
    /// - [`Error::InvalidModule`] if any image cannot be decoded
    /// - [`Error::VersionMarkerMissing`] if the target lacks the version marker
    pub fn build(self) -> Result<PatchProject> {
        let Some(target_path) = self.target else {
            return Err(script_error!("No target module given"));
        };

        let target_image = MappedImage::open("target", &target_path)?;
        let dependency_images = self
            .dependencies
            .iter()
            .map(|path| MappedImage::open(&role_of(path), path))
            .collect::<Result<Vec<_>>>()?;

        let target = target_image.decode()?;
        debug!(
            "Decoded {} ({} bytes, {} types)",
            target.name,
            target_image.len(),
            target.types.len()
        );
        drop(target_image);

        if let Some(marker) = &self.version_marker {
            if !target.contains_type(marker) {
                return Err(Error::VersionMarkerMissing {
                    module: target.name.clone(),
                    marker: marker.clone(),
                });
            }
        }

        let mut references = Vec::with_capacity(dependency_images.len());
        for image in dependency_images {
            let module = image.decode()?;
            debug!("Decoded dependency {} ({} bytes)", module.name, image.len());
            references.push(module);
        }

        info!(
            "Loaded {} with {} reference module(s)",
            target.name,
            references.len()
        );
        Ok(PatchProject {
            target,
            target_path,
            references,
        })
    }
}

fn role_of(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "dependency".to_string(), |stem| stem.to_string_lossy().into_owned())
}
