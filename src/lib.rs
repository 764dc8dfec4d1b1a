// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'project/mapped.rs' uses mmap to map module images into memory

//! # cilhook
//!
//! Structural patching of compiled CIL method bodies. `cilhook` locates code shapes inside
//! the methods of an already compiled module and splices calls to an external event
//! dispatcher into them, so that a plugin framework can observe, modify and cancel what the
//! original code does without access to its sources.
//!
//! ## Features
//!
//! - **🔍 Symbol resolution** - Find types, methods and fields by composable, labelled predicates
//! - **🧩 Shape matching** - Locate opcode patterns and verify that a body still looks as expected
//! - **🪝 Hook synthesis** - Pack arguments, call the dispatcher, write back what handlers changed
//! - **✂️ Identity-preserving splicing** - Insert code without breaking branch targets
//! - **📜 Patch scripts** - Declarative XML patches with forward references inside fragments
//! - **🛡️ Best effort** - A patch that no longer fits is reported and skipped, never half-applied
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilhook::prelude::*;
//!
//! let mut project = ProjectLoader::new()
//!     .target("Managed/Assembly-CSharp.json")
//!     .dependency("Managed/mscorlib.json")
//!     .dependency("SurvivalKit.json")
//!     .version_marker("Deobfuscated")
//!     .build()?;
//!
//! let script = PatchScript::parse(&std::fs::read_to_string("hooks.xml")?)?;
//! let report = project.run(Some(&PatchProfile::survival_kit()), Some(script))?;
//! println!("{} hooks inserted, {} failures", report.hooks(), report.failures());
//!
//! let output = PatchProject::output_path(project.target_path());
//! project.write_to(output)?;
//! # Ok::<(), cilhook::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - The CIL instruction set and instructions
//! - [`metadata`] - Modules, types, members, method bodies and the symbol resolver
//! - [`patch`] - Pattern finder, structural matcher, template compiler, hook synthesizer, splicer
//! - [`script`] - The XML patch-script interpreter
//! - [`patchers`] - Built-in patchers driven by a [`patchers::PatchProfile`]
//! - [`project`] - Loading module images and writing the result back
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! Errors are classified by how far they reach. Startup errors abort the run; everything
//! else skips only the patch entry it occurred in:
//!
//! ```rust,no_run
//! use cilhook::{project::ProjectLoader, Error};
//!
//! match ProjectLoader::new().target("Assembly-CSharp.json").build() {
//!     Ok(project) => println!("Loaded {}", project.target().name),
//!     Err(Error::MissingModule { role, path }) => println!("no {role} module at {}", path.display()),
//!     Err(e) if e.is_fatal() => println!("Startup failed: {e}"),
//!     Err(e) => println!("Other error: {e}"),
//! }
//! ```
//!
//! ## Development and Testing
//!
//! ```bash
//! cargo test
//! cargo bench --bench patching
//! cargo +nightly fuzz run script --release
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cilhook::prelude::*;
///
/// let pattern = OpcodePattern::exactly_once(&[OpCode::Switch, OpCode::Br]);
/// assert!(matches!(pattern.locate(&MethodBody::new()), Err(Error::ShapeNotFound { .. })));
/// ```
pub mod prelude;

/// The CIL instruction set.
///
/// Opcodes carry their mnemonic, operand kind and flow type; names are looked up case
/// insensitively with either `.` or `_` as separator.
pub mod assembly;

/// Modules, types, members, method bodies and the symbol resolver.
pub mod metadata;

/// The patch engine: finding, verifying, compiling, synthesizing and splicing.
pub mod patch;

/// Built-in, profile-driven patchers.
pub mod patchers;

/// Loading the modules of a patch run and writing the result back.
pub mod project;

/// Declarative XML patch scripts.
pub mod script;

/// `cilhook` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilhook` Error type
///
/// See [`error::Error`](Error) for how the variants are classified.
pub use error::Error;
