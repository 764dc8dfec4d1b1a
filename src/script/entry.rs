use std::fmt;

use crate::{
    metadata::MethodSelector,
    patch::{InstructionTemplate, OpClass, OpcodePattern, Occurrences},
    script::xml::Element,
    Result,
};

/// Where a hook is inserted into the target body.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertAt {
    /// Before the instruction at this index
    Index(usize),
    /// After the last instruction
    End,
    /// At the single match of `pattern`, shifted by `offset`
    Pattern {
        /// Must occur exactly once
        pattern: OpcodePattern,
        /// Added to the match position
        offset: isize,
    },
}

impl fmt::Display for InsertAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertAt::Index(index) => write!(f, "index {index}"),
            InsertAt::End => f.write_str("end"),
            InsertAt::Pattern { pattern, offset } => write!(f, "{pattern} {offset:+}"),
        }
    }
}

/// The method a hook targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodPredicate {
    /// Name, parameter types and return type
    pub selector: MethodSelector,
    /// Instructions the body must contain (the match block)
    pub shape: Vec<InstructionTemplate>,
}

/// One value passed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// Qualified type name of the value
    pub type_name: String,
    /// Whether the writer handles unpacking itself
    pub custom: bool,
    /// Pushes the value
    pub load: Option<Vec<InstructionTemplate>>,
    /// Stores the value modified by the handlers
    pub write: Option<Vec<InstructionTemplate>>,
}

/// A parsed `<hook>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct HookEntry {
    /// Event name passed to the dispatcher
    pub event: String,
    /// Qualified name of the type declaring the target method
    pub type_name: String,
    /// Target method
    pub method: MethodPredicate,
    /// Insertion point
    pub insert_at: InsertAt,
    /// Whether handlers can cancel the rest of the method
    pub cancellable: bool,
    /// Values passed to the dispatcher, in slot order
    pub parameters: Vec<ParameterSpec>,
}

/// An entry of a script, parsed or not.
#[derive(Debug)]
pub struct ScriptEntry {
    /// Name used in reports: the event name, or the position of the entry
    pub label: String,
    /// The parsed hook, or the reason it could not be parsed
    pub hook: Result<HookEntry>,
}

/// A parsed patch script.
#[derive(Debug)]
pub struct PatchScript {
    /// Entries in declaration order
    pub entries: Vec<ScriptEntry>,
}

impl PatchScript {
    /// Parses a script document.
    ///
    /// A malformed document fails as a whole. A malformed `<hook>` is kept as an entry
    /// holding its error, so the other hooks can still be applied.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Xml`] for malformed XML and [`crate::Error::Script`] if the
    /// root element is not `<patches>`.
    pub fn parse(text: &str) -> Result<Self> {
        let root = crate::script::xml::parse_document(text)?;
        if !root.is("patches") {
            return Err(script_error!(
                "Expected a <patches> root element, found <{}>",
                root.name
            ));
        }

        let entries = root
            .children_named("hook")
            .enumerate()
            .map(|(position, element)| ScriptEntry {
                label: element
                    .attribute("name")
                    .map_or_else(|| format!("hook #{}", position + 1), str::to_string),
                hook: parse_hook(element),
            })
            .collect();
        Ok(PatchScript { entries })
    }

    /// Number of entries, parsed or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the script declares no hooks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_bool(element: &Element, name: &str) -> Result<bool> {
    match element.attribute(name).map(str::trim) {
        None | Some("") => Ok(false),
        Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        Some(value) => Err(script_error!(
            "<{}> attribute {} must be true or false, got '{}'",
            element.name,
            name,
            value
        )),
    }
}

fn required<'e>(element: &'e Element, name: &str) -> Result<&'e str> {
    element
        .attribute(name)
        .ok_or_else(|| script_error!("<{}> has no {} attribute", element.name, name))
}

fn template(element: &Element) -> Result<InstructionTemplate> {
    if !element.is("opcode") {
        return Err(script_error!("Expected <opcode>, found <{}>", element.name));
    }
    let mut template = InstructionTemplate::parse(
        required(element, "name")?,
        element.attribute("opType").unwrap_or_default(),
        element.attribute("op").unwrap_or_default(),
    )?;
    if let Some(index) = element.attribute("index") {
        template.index = Some(
            index
                .trim()
                .parse()
                .map_err(|_| script_error!("'{}' is not a valid opcode index", index))?,
        );
    }
    Ok(template)
}

fn templates(element: &Element) -> Result<Vec<InstructionTemplate>> {
    element.children.iter().map(template).collect()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_method(element: &Element) -> Result<MethodPredicate> {
    let selector = MethodSelector {
        name: element.attribute("name").map(str::to_string),
        parameters: element.attribute("parameters").map(split_list),
        returns: element.attribute("return").map(str::to_string),
        ..MethodSelector::default()
    };
    Ok(MethodPredicate {
        selector,
        shape: templates(element)?,
    })
}

fn parse_pattern(element: &Element) -> Result<InsertAt> {
    let classes = element
        .children
        .iter()
        .map(|opcode| {
            if !opcode.is("opcode") {
                return Err(script_error!("Expected <opcode>, found <{}>", opcode.name));
            }
            required(opcode, "name")?.parse::<OpClass>()
        })
        .collect::<Result<Vec<_>>>()?;
    if classes.is_empty() {
        return Err(script_error!("<pattern> needs at least one <opcode>"));
    }
    let offset = match element.attribute("offset") {
        Some(offset) => offset
            .trim()
            .parse()
            .map_err(|_| script_error!("'{}' is not a valid pattern offset", offset))?,
        None => 0,
    };
    Ok(InsertAt::Pattern {
        pattern: OpcodePattern::from_classes(classes).expect(Occurrences::Exactly(1)),
        offset,
    })
}

fn parse_insert_at(hook: &Element) -> Result<InsertAt> {
    match (hook.attribute("insertAt").map(str::trim), hook.child("pattern")) {
        (Some(_), Some(_)) => Err(script_error!(
            "<hook> has both an insertAt attribute and a <pattern>"
        )),
        (Some(end), None) if end.eq_ignore_ascii_case("end") => Ok(InsertAt::End),
        (Some(index), None) => index
            .parse()
            .map(InsertAt::Index)
            .map_err(|_| script_error!("'{}' is not a valid insertAt value", index)),
        (None, Some(pattern)) => parse_pattern(pattern),
        (None, None) => Err(script_error!(
            "<hook> needs an insertAt attribute or a <pattern>"
        )),
    }
}

fn parse_parameter(element: &Element) -> Result<ParameterSpec> {
    Ok(ParameterSpec {
        type_name: element
            .attribute("type")
            .map_or_else(|| "System.Object".to_string(), |ty| ty.trim().to_string()),
        custom: parse_bool(element, "isCustom")?,
        load: element.child("load").map(templates).transpose()?,
        write: element.child("write").map(templates).transpose()?,
    })
}

fn parse_hook(hook: &Element) -> Result<HookEntry> {
    let event = required(hook, "name")?.to_string();
    let declared = required(hook, "type")?;
    let type_name = if declared.eq_ignore_ascii_case("event") {
        hook.child("type")
            .and_then(|ty| ty.attribute("name"))
            .ok_or_else(|| script_error!("<hook type=\"event\"> needs a <type name=\"...\"> child"))?
    } else {
        declared
    };

    let method = hook
        .child("method")
        .ok_or_else(|| script_error!("<hook name=\"{}\"> has no <method>", event))?;
    let parameters = match hook.child("parameters") {
        Some(list) => list
            .children_named("parameter")
            .map(parse_parameter)
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(HookEntry {
        type_name: type_name.trim().to_string(),
        method: parse_method(method)?,
        insert_at: parse_insert_at(hook)?,
        cancellable: parse_bool(hook, "cancellable")?,
        parameters,
        event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::OpCode, patch::OperandTemplate, Error};

    const SCRIPT: &str = r#"
        <patches>
          <hook type="ChunkCluster" name="UnknownChunkProvider" insertAt="0" cancellable="True">
            <method name="Init" parameters="EnumChunkProviderId" return="System.Void">
              <opcode index="0" name="ldarg.1"/>
              <!-- the last instruction -->
              <opcode index="-1" name="Ret"/>
            </method>
            <parameters>
              <parameter type="System.Int32">
                <load><opcode name="ldarg.1"/></load>
                <write><opcode name="starg.s" opType="byte" op="1"/></write>
              </parameter>
              <parameter>
                <load><opcode name="ldnull"/></load>
              </parameter>
            </parameters>
          </hook>
          <hook type="event" name="Legacy" insertAt="end">
            <type name="GameManager"/>
            <method name="Awake"/>
          </hook>
          <hook type="GameManager" insertAt="zero">
            <method name="Awake"/>
          </hook>
          <hook type="ChatPackage" name="ByPattern">
            <method name="Read"/>
            <pattern offset="1"><opcode name="ldarg.1"/><opcode name="&lt;branch&gt;"/></pattern>
          </hook>
        </patches>"#;

    #[test]
    fn parses_entries() {
        let script = PatchScript::parse(SCRIPT).unwrap();
        assert_eq!(script.len(), 4);

        let first = script.entries[0].hook.as_ref().unwrap();
        assert_eq!(first.event, "UnknownChunkProvider");
        assert_eq!(first.type_name, "ChunkCluster");
        assert!(first.cancellable);
        assert_eq!(first.insert_at, InsertAt::Index(0));
        assert_eq!(first.method.selector.name.as_deref(), Some("Init"));
        assert_eq!(
            first.method.selector.parameters,
            Some(vec!["EnumChunkProviderId".to_string()])
        );
        assert_eq!(first.method.shape.len(), 2);
        assert_eq!(first.method.shape[1].index, Some(-1));
        assert_eq!(first.method.shape[1].opcode, OpCode::Ret);

        let value = &first.parameters[0];
        assert_eq!(value.type_name, "System.Int32");
        assert!(!value.custom);
        assert_eq!(value.write.as_ref().unwrap()[0].operand, OperandTemplate::UInt8(1));
        assert_eq!(first.parameters[1].type_name, "System.Object");
        assert!(first.parameters[1].write.is_none());

        let legacy = script.entries[1].hook.as_ref().unwrap();
        assert_eq!(legacy.type_name, "GameManager");
        assert_eq!(legacy.insert_at, InsertAt::End);
        assert!(legacy.parameters.is_empty());

        assert_eq!(script.entries[2].label, "hook #3");
        assert!(matches!(script.entries[2].hook, Err(Error::Script { .. })));

        let pattern = script.entries[3].hook.as_ref().unwrap();
        assert!(matches!(
            &pattern.insert_at,
            InsertAt::Pattern { pattern, offset: 1 } if pattern.len() == 2
        ));
    }

    #[test]
    fn entry_errors_stay_local() {
        let script = PatchScript::parse(
            r#"<patches>
                 <hook type="A" name="bad-opcode" insertAt="0">
                   <method><opcode name="frobnicate"/></method>
                 </hook>
                 <hook type="A" name="bad-flag" insertAt="0" cancellable="maybe"><method/></hook>
                 <hook type="A" name="no-method" insertAt="0"/>
                 <hook type="A" name="ok" insertAt="2"><method/></hook>
               </patches>"#,
        )
        .unwrap();

        assert!(matches!(script.entries[0].hook, Err(Error::UnknownOpcode(_))));
        assert!(script.entries[1].hook.is_err());
        assert!(script.entries[2].hook.is_err());
        assert!(script.entries[3].hook.is_ok());
    }

    #[test]
    fn document_errors_are_fatal() {
        assert!(matches!(PatchScript::parse("<patches>"), Err(Error::Xml(_))));
        assert!(matches!(PatchScript::parse("<hooks/>"), Err(Error::Script { .. })));
        assert!(PatchScript::parse("<patches/>").unwrap().is_empty());
    }
}
