//! Declarative hooks read from XML patch scripts.
//!
//! A script is a `<patches>` element holding `<hook>` entries. Each entry names a target
//! type and method, optionally a match block the method body must satisfy, an insertion
//! point, and the values passed to the dispatcher together with the instructions that
//! write modified values back:
//!
//! ```xml
//! <patches>
//!   <hook type="ChunkCluster" name="UnknownChunkProvider" insertAt="0" cancellable="true">
//!     <method name="Init" parameters="EnumChunkProviderId">
//!       <opcode index="0" name="ldarg.1"/>
//!       <opcode index="-1" name="ret"/>
//!     </method>
//!     <parameters>
//!       <parameter type="System.Int32">
//!         <load><opcode name="ldarg.1"/></load>
//!         <write><opcode name="starg.s" opType="byte" op="1"/></write>
//!       </parameter>
//!     </parameters>
//!   </hook>
//! </patches>
//! ```
//!
//! Parsing ([`PatchScript::parse`]) only rejects the whole document when it is not
//! well-formed XML. Everything else is reported per entry by [`ScriptPatcher::apply`],
//! which keeps going after a failed entry.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilhook::{
//!     metadata::Module,
//!     patch::{Dispatcher, PatchContext},
//!     script::{PatchScript, ScriptPatcher},
//! };
//!
//! # fn load(_: &str) -> Module { unimplemented!() }
//! let mut target = load("Assembly-CSharp.json");
//! let kit = load("SurvivalKit.json");
//! let dispatcher = Dispatcher::resolve_default(&kit)?;
//!
//! let script = PatchScript::parse(&std::fs::read_to_string("hooks.xml")?)?;
//! let mut context = PatchContext::new(&mut target, &dispatcher).with_references([&kit]);
//! let report = ScriptPatcher::new(script).apply(&mut context);
//! println!("{} applied, {} skipped", report.applied(), report.failed());
//! # Ok::<(), cilhook::Error>(())
//! ```

mod entry;
mod interpreter;
mod xml;

pub use entry::{HookEntry, InsertAt, MethodPredicate, ParameterSpec, PatchScript, ScriptEntry};
pub use interpreter::{EntryReport, EntryStatus, ScriptPatcher, ScriptReport, Stage};
pub use xml::{parse_document, Element};
