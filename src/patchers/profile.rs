//! Policy for the built-in patchers.
//!
//! Every name the patchers look for, every event they fire and every shape they check
//! lives here, so a new game version usually needs a new profile rather than new code.
//! Profiles are plain JSON:
//!
//! ```json
//! {
//!   "entryCalls": [
//!     { "type": "GameManager", "method": { "name": "Awake" },
//!       "callType": "SurvivalKit.SKMain", "callMethod": "onGameEnable", "passThis": true }
//!   ],
//!   "eventHooks": [
//!     { "event": "SetBlocks", "types": { "typeName": "GameManager" },
//!       "method": { "name": "SetBlocksRPC" }, "cancellable": true,
//!       "loaders": [ { "argument": { "index": 1, "writeBack": true } },
//!                    { "property": { "getter": "get_World" } } ] }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    assembly::OpCode,
    metadata::MethodSelector,
    patch::{InstructionTemplate, OpcodePattern},
    Result,
};

/// Insert `[ldarg.0] call <method>` at the start of a method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryCall {
    /// Type declaring the patched method
    #[serde(rename = "type")]
    pub type_name: String,
    /// The patched method
    pub method: MethodSelector,
    /// Type declaring the called method
    pub call_type: String,
    /// Name of the called method
    pub call_method: String,
    /// Whether `this` is passed to the called method
    #[serde(default)]
    pub pass_this: bool,
}

/// Which types an [`EventHook`] applies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetTypes {
    /// A single type by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Every type declaring a method like this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declares: Option<MethodSelector>,
}

/// Where an event hook goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookPosition {
    /// Before the first instruction
    #[default]
    Start,
    /// Before the last `ret`, with branches to it redirected into the hook
    BeforeReturn,
    /// After the last instruction
    End,
}

/// A value loaded into the dispatcher argument array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueSource {
    /// `ldarg.0`
    This,
    /// An argument by evaluation-stack index (`this` is 0 for instance methods)
    #[serde(rename_all = "camelCase")]
    Argument {
        /// The argument index
        index: u16,
        /// Store the value returned by the handlers back into the argument
        #[serde(default)]
        write_back: bool,
    },
    /// A boolean constant
    Bool {
        /// The constant
        value: bool,
    },
    /// A string constant
    String {
        /// The constant
        value: String,
    },
    /// `ldnull`
    Null,
    /// `ldarg.0; call <getter>` on the declaring type
    Property {
        /// Name of the getter method
        getter: String,
    },
}

/// Fire an event from one method of every matching type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHook {
    /// Event name passed to the dispatcher
    pub event: String,
    /// Types to patch
    pub types: TargetTypes,
    /// The patched method, looked up in each type
    pub method: MethodSelector,
    /// Where the hook goes
    #[serde(default)]
    pub position: HookPosition,
    /// Prepend the cancel flag and return early when a handler sets it
    #[serde(default)]
    pub cancellable: bool,
    /// Values passed after the cancel flag
    #[serde(default)]
    pub loaders: Vec<ValueSource>,
}

/// A parameter appended to methods that lack it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailingParameter {
    /// Parameter name
    pub name: String,
    /// Qualified type name
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Fire a cancellable event from every method of a type carrying an attribute.
///
/// The argument array holds the cancel flag, the method name and every parameter; each
/// parameter is written back after the handlers ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeHook {
    /// Event name passed to the dispatcher
    pub event: String,
    /// Type whose methods are patched
    #[serde(rename = "type")]
    pub type_name: String,
    /// Custom attribute selecting the methods
    pub attribute: String,
    /// Appended when the last parameter is not of this type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_parameter: Option<TrailingParameter>,
}

/// Let handlers supply the value assigned by the default case of a switch.
///
/// The jump to the default case is redirected into a hook. If the handlers set
/// `handledSlot`, the value in `resultSlot` continues to the instruction at
/// `handledResume` (relative to the default case); otherwise execution resumes at
/// `unhandledResume`. `prefix` runs before the hook and typically pushes what both
/// continuations expect to find on the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchDefault {
    /// Event name passed to the dispatcher
    pub event: String,
    /// Type declaring the patched method
    #[serde(rename = "type")]
    pub type_name: String,
    /// The patched method
    pub method: MethodSelector,
    /// Locates the jump to the default case; the last element must be the jump
    pub pattern: OpcodePattern,
    /// Expected shape of the default case, indices relative to its first instruction
    pub default_shape: Vec<InstructionTemplate>,
    /// Instructions before the hook
    #[serde(default)]
    pub prefix: Vec<InstructionTemplate>,
    /// Values in the argument array
    pub loaders: Vec<ValueSource>,
    /// Slot of the boolean telling whether a handler supplied a value
    pub handled_slot: usize,
    /// Slot of the supplied value
    pub result_slot: usize,
    /// Resume offset when no handler supplied a value
    pub unhandled_resume: usize,
    /// Resume offset for the supplied value
    pub handled_resume: usize,
}

/// Policy for every built-in patcher, applied in field order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchProfile {
    /// Calls inserted at method entry
    #[serde(default)]
    pub entry_calls: Vec<EntryCall>,
    /// Event hooks on methods of matching types
    #[serde(default)]
    pub event_hooks: Vec<EventHook>,
    /// Event hooks on attributed methods
    #[serde(default)]
    pub attribute_hooks: Vec<AttributeHook>,
    /// Hooks on switch default cases
    #[serde(default)]
    pub switch_defaults: Vec<SwitchDefault>,
}

fn method(name: &str, parameters: &[&str]) -> MethodSelector {
    MethodSelector {
        parameters: Some(parameters.iter().map(|p| (*p).to_string()).collect()),
        returns: Some("System.Void".to_string()),
        ..MethodSelector::named(name)
    }
}

fn entry_call(ty: &str, target: &str, call: &str, pass_this: bool) -> EntryCall {
    EntryCall {
        type_name: ty.to_string(),
        method: MethodSelector::named(target),
        call_type: "SurvivalKit.SKMain".to_string(),
        call_method: call.to_string(),
        pass_this,
    }
}

impl PatchProfile {
    /// The hooks SurvivalKit plugins rely on.
    #[must_use]
    pub fn survival_kit() -> Self {
        let packages = TargetTypes {
            type_name: None,
            declares: Some(MethodSelector {
                returns: Some("PackageType".to_string()),
                is_abstract: Some(false),
                ..MethodSelector::named("GetPackageType")
            }),
        };
        let argument = |index| ValueSource::Argument {
            index,
            write_back: false,
        };

        PatchProfile {
            entry_calls: vec![
                entry_call("ConnectionManager", ".cctor", "onGameInit", false),
                entry_call("GameManager", "Awake", "onGameEnable", true),
                entry_call("GameManager", "Cleanup", "onGameDisable", true),
            ],
            event_hooks: vec![
                EventHook {
                    event: "ProcessPacket".to_string(),
                    types: packages.clone(),
                    method: method("Process", &["World", "INetConnectionCallbacks"]),
                    position: HookPosition::Start,
                    cancellable: true,
                    loaders: vec![argument(1), argument(2)],
                },
                EventHook {
                    event: "ReadPacketFromBuf".to_string(),
                    types: packages.clone(),
                    method: method("Read", &["System.IO.BinaryReader"]),
                    position: HookPosition::BeforeReturn,
                    cancellable: false,
                    loaders: Vec::new(),
                },
                EventHook {
                    event: "WritePacketToBuf".to_string(),
                    types: packages,
                    method: method("Write", &["System.IO.BinaryWriter"]),
                    position: HookPosition::Start,
                    cancellable: true,
                    loaders: Vec::new(),
                },
                EventHook {
                    event: "SetBlocks".to_string(),
                    types: TargetTypes {
                        type_name: Some("GameManager".to_string()),
                        declares: None,
                    },
                    method: MethodSelector::named("SetBlocksRPC"),
                    position: HookPosition::Start,
                    cancellable: true,
                    loaders: vec![
                        ValueSource::Argument {
                            index: 1,
                            write_back: true,
                        },
                        ValueSource::Property {
                            getter: "get_World".to_string(),
                        },
                    ],
                },
            ],
            attribute_hooks: vec![AttributeHook {
                event: "RPC".to_string(),
                type_name: "ConnectionManager".to_string(),
                attribute: "UnityEngine.RPC".to_string(),
                trailing_parameter: Some(TrailingParameter {
                    name: "_messageInfo".to_string(),
                    type_name: "UnityEngine.NetworkMessageInfo".to_string(),
                }),
            }],
            switch_defaults: vec![SwitchDefault {
                event: "UnknownChunkProviderEvent".to_string(),
                type_name: "ChunkCluster".to_string(),
                method: MethodSelector {
                    parameters: Some(vec!["EnumChunkProviderId".to_string()]),
                    ..MethodSelector::named("Init")
                },
                pattern: OpcodePattern::exactly_once(&[OpCode::Switch, OpCode::Br]),
                default_shape: vec![
                    InstructionTemplate {
                        index: Some(0),
                        ..InstructionTemplate::op(OpCode::Ldarg0)
                    },
                    InstructionTemplate {
                        index: Some(1),
                        ..InstructionTemplate::op(OpCode::Ldnull)
                    },
                    InstructionTemplate {
                        index: Some(2),
                        ..InstructionTemplate::op(OpCode::Stfld)
                    },
                ],
                prefix: vec![InstructionTemplate::op(OpCode::Ldarg0)],
                loaders: vec![
                    ValueSource::This,
                    ValueSource::Bool { value: false },
                    argument(1),
                    ValueSource::Null,
                ],
                handled_slot: 1,
                result_slot: 3,
                unhandled_resume: 1,
                handled_resume: 2,
            }],
        }
    }

    /// Parses a profile from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serialization`] for malformed JSON, unknown opcodes or
    /// malformed operands included.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a profile from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be read, and the errors of
    /// [`PatchProfile::from_json`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Serializes the profile as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serialization`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns `true` if no patcher has anything to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry_calls.is_empty()
            && self.event_hooks.is_empty()
            && self.attribute_hooks.is_empty()
            && self.switch_defaults.is_empty()
    }
}
