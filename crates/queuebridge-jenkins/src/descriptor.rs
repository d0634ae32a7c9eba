//! Job descriptor (`config.xml`) parsing and parameter reconciliation.
//!
//! Before queueing a parameterized build we have to make sure the job
//! actually declares every parameter the request carries; Jenkins silently
//! drops parameters a job does not declare. Missing ones are added as string
//! parameter definitions and the rewritten descriptor is pushed back.

use std::sync::OnceLock;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;

use queuebridge_core::{BuildProperty, Error, Result};

use crate::xml::{element_name, path_matches};

const PROPERTIES_TAG: &str = "properties";
const PARAMS_PROPERTY_TAG: &str = "hudson.model.ParametersDefinitionProperty";
const PARAM_DEFINITIONS_TAG: &str = "parameterDefinitions";
const STRING_PARAM_TAG: &str = "hudson.model.StringParameterDefinition";

const AUTH_TOKEN_PATH: &[&str] = &["*", "authToken"];
const PARAM_NAMES_PATH: &[&str] = &[
    "*",
    PROPERTIES_TAG,
    PARAMS_PROPERTY_TAG,
    PARAM_DEFINITIONS_TAG,
    "*",
    "name",
];

/// A job's XML descriptor, held in XML 1.0 form for parsing and mutation.
///
/// Some Jenkins instances declare `config.xml` as XML 1.1. The declared
/// version is downgraded to 1.0 before any parsing or mutation and restored
/// in [`JobDescriptor::payload`], but only when a downgrade actually
/// happened; a 1.0 document is never rewritten.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    xml: String,
    downgraded_from: Option<String>,
}

impl JobDescriptor {
    pub fn parse(raw: &str) -> Result<Self> {
        let (xml, downgraded_from) = downgrade_declared_version(raw);
        validate(&xml)?;
        Ok(Self {
            xml,
            downgraded_from,
        })
    }

    /// The job's configured build-trigger auth token, if any.
    pub fn auth_token(&self) -> Option<String> {
        crate::xml::find_text(&self.xml, AUTH_TOKEN_PATH).filter(|token| !token.is_empty())
    }

    /// Parameter names the job currently declares, in document order.
    pub fn parameter_names(&self) -> Vec<String> {
        crate::xml::collect_texts(&self.xml, PARAM_NAMES_PATH)
    }

    /// Requested parameter names the job does not declare yet, in the order
    /// they were requested.
    pub fn missing_parameters(&self, requested: &[BuildProperty]) -> Vec<String> {
        let declared = self.parameter_names();
        requested
            .iter()
            .filter(|property| !declared.contains(&property.name))
            .map(|property| property.name.clone())
            .collect()
    }

    /// Adds string parameter definitions for `names`, creating the
    /// `properties/.../parameterDefinitions` chain as far as needed.
    pub fn add_parameters(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let target = insertion_target(&self.xml)?;
        self.xml = rewrite_with_parameters(&self.xml, names, target)?;
        Ok(())
    }

    /// The descriptor as it should be sent back to the server, with the
    /// original declared XML version restored if it had been downgraded.
    pub fn payload(&self) -> String {
        match &self.downgraded_from {
            Some(version) => replace_declared_version(&self.xml, version),
            None => self.xml.clone(),
        }
    }
}

fn declaration_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*<\?xml\s[^>]*?version="([^"]+)""#).expect("static regex")
    })
}

/// Rewrites a declared XML version above 1.0 down to 1.0. Returns the fixed
/// document and the original version when a downgrade happened.
fn downgrade_declared_version(xml: &str) -> (String, Option<String>) {
    let Some(captures) = declaration_version_re().captures(xml) else {
        return (xml.to_string(), None);
    };
    let version = &captures[1];
    if version == "1.0" {
        return (xml.to_string(), None);
    }
    let original = version.to_string();
    (replace_declared_version(xml, "1.0"), Some(original))
}

fn replace_declared_version(xml: &str, version: &str) -> String {
    let Some(captures) = declaration_version_re().captures(xml) else {
        return xml.to_string();
    };
    let range = captures
        .get(1)
        .map(|m| m.range())
        .unwrap_or(0..0);
    format!("{}{}{}", &xml[..range.start], version, &xml[range.end..])
}

fn validate(xml: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = true;
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(error) => return Err(Error::InvalidDescriptor(error.to_string())),
        }
    }
}

/// Deepest element of the `properties/ParametersDefinitionProperty/
/// parameterDefinitions` chain already present in the document; new
/// definitions are injected at the end of that element, and the missing
/// tail of the chain is created around them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertionTarget {
    Definitions,
    ParametersProperty,
    Properties,
    Root,
}

fn insertion_target(xml: &str) -> Result<InsertionTarget> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut deepest = InsertionTarget::Root;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(element_name(&start));
                note_container(&stack, &mut deepest);
            }
            Ok(Event::Empty(start)) => {
                stack.push(element_name(&start));
                note_container(&stack, &mut deepest);
                stack.pop();
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Eof) => return Ok(deepest),
            Ok(_) => {}
            Err(error) => return Err(Error::InvalidDescriptor(error.to_string())),
        }
    }
}

fn note_container(stack: &[String], deepest: &mut InsertionTarget) {
    let candidate = if path_matches(
        stack,
        &["*", PROPERTIES_TAG, PARAMS_PROPERTY_TAG, PARAM_DEFINITIONS_TAG],
    ) {
        InsertionTarget::Definitions
    } else if path_matches(stack, &["*", PROPERTIES_TAG, PARAMS_PROPERTY_TAG]) {
        InsertionTarget::ParametersProperty
    } else if path_matches(stack, &["*", PROPERTIES_TAG]) {
        InsertionTarget::Properties
    } else {
        return;
    };
    if rank(candidate) > rank(*deepest) {
        *deepest = candidate;
    }
}

fn rank(target: InsertionTarget) -> u8 {
    match target {
        InsertionTarget::Root => 0,
        InsertionTarget::Properties => 1,
        InsertionTarget::ParametersProperty => 2,
        InsertionTarget::Definitions => 3,
    }
}

fn is_target_container(stack: &[String], target: InsertionTarget) -> bool {
    match target {
        InsertionTarget::Definitions => path_matches(
            stack,
            &["*", PROPERTIES_TAG, PARAMS_PROPERTY_TAG, PARAM_DEFINITIONS_TAG],
        ),
        InsertionTarget::ParametersProperty => {
            path_matches(stack, &["*", PROPERTIES_TAG, PARAMS_PROPERTY_TAG])
        }
        InsertionTarget::Properties => path_matches(stack, &["*", PROPERTIES_TAG]),
        InsertionTarget::Root => stack.len() == 1,
    }
}

fn rewrite_with_parameters(
    xml: &str,
    names: &[String],
    target: InsertionTarget,
) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut stack: Vec<String> = Vec::new();
    let mut injected = false;

    loop {
        match reader
            .read_event()
            .map_err(|error| Error::InvalidDescriptor(error.to_string()))?
        {
            Event::Eof => break,
            Event::Start(start) => {
                stack.push(element_name(&start));
                writer.write_event(Event::Start(start))?;
            }
            Event::Empty(start) => {
                let name = element_name(&start);
                stack.push(name.clone());
                if !injected && is_target_container(&stack, target) {
                    // Expand the self-closing element so the chain fits inside.
                    writer.write_event(Event::Start(start))?;
                    write_injection(&mut writer, target, names)?;
                    writer.write_event(Event::End(BytesEnd::new(name.clone())))?;
                    injected = true;
                } else {
                    writer.write_event(Event::Empty(start))?;
                }
                stack.pop();
            }
            Event::End(end) => {
                if !injected && is_target_container(&stack, target) {
                    write_injection(&mut writer, target, names)?;
                    injected = true;
                }
                stack.pop();
                writer.write_event(Event::End(end))?;
            }
            event => writer.write_event(event)?,
        }
    }

    String::from_utf8(writer.into_inner())
        .map_err(|error| Error::InvalidDescriptor(error.to_string()))
}

fn write_injection(
    writer: &mut Writer<Vec<u8>>,
    target: InsertionTarget,
    names: &[String],
) -> Result<()> {
    match target {
        InsertionTarget::Definitions => write_definitions(writer, names)?,
        InsertionTarget::ParametersProperty => {
            writer.write_event(Event::Start(BytesStart::new(PARAM_DEFINITIONS_TAG)))?;
            write_definitions(writer, names)?;
            writer.write_event(Event::End(BytesEnd::new(PARAM_DEFINITIONS_TAG)))?;
        }
        InsertionTarget::Properties => {
            writer.write_event(Event::Start(BytesStart::new(PARAMS_PROPERTY_TAG)))?;
            writer.write_event(Event::Start(BytesStart::new(PARAM_DEFINITIONS_TAG)))?;
            write_definitions(writer, names)?;
            writer.write_event(Event::End(BytesEnd::new(PARAM_DEFINITIONS_TAG)))?;
            writer.write_event(Event::End(BytesEnd::new(PARAMS_PROPERTY_TAG)))?;
        }
        InsertionTarget::Root => {
            writer.write_event(Event::Start(BytesStart::new(PROPERTIES_TAG)))?;
            writer.write_event(Event::Start(BytesStart::new(PARAMS_PROPERTY_TAG)))?;
            writer.write_event(Event::Start(BytesStart::new(PARAM_DEFINITIONS_TAG)))?;
            write_definitions(writer, names)?;
            writer.write_event(Event::End(BytesEnd::new(PARAM_DEFINITIONS_TAG)))?;
            writer.write_event(Event::End(BytesEnd::new(PARAMS_PROPERTY_TAG)))?;
            writer.write_event(Event::End(BytesEnd::new(PROPERTIES_TAG)))?;
        }
    }
    Ok(())
}

fn write_definitions(writer: &mut Writer<Vec<u8>>, names: &[String]) -> Result<()> {
    for name in names {
        writer.write_event(Event::Start(BytesStart::new(STRING_PARAM_TAG)))?;
        writer.write_event(Event::Start(BytesStart::new("name")))?;
        writer.write_event(Event::Text(BytesText::new(name)))?;
        writer.write_event(Event::End(BytesEnd::new("name")))?;
        writer.write_event(Event::Empty(BytesStart::new("description")))?;
        writer.write_event(Event::Empty(BytesStart::new("defaultValue")))?;
        writer.write_event(Event::Start(BytesStart::new("trim")))?;
        writer.write_event(Event::Text(BytesText::new("false")))?;
        writer.write_event(Event::End(BytesEnd::new("trim")))?;
        writer.write_event(Event::End(BytesEnd::new(STRING_PARAM_TAG)))?;
    }
    Ok(())
}
