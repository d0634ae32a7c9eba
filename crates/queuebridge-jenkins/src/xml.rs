//! Path-style lookups over XML response bodies.
//!
//! Jenkins answers its `api/xml` endpoints with small documents that we only
//! ever read a couple of leaf values from (`/defaultCrumbIssuer/crumb`,
//! `/leftItem/executable/url`, `/*/building`, ...). A full DOM is overkill;
//! these helpers stream the document once and match element paths from the
//! root, where `"*"` matches any element name.

use quick_xml::Reader;
use quick_xml::events::Event;

/// Returns the trimmed text of the first node matching `path`.
///
/// Missing nodes and malformed documents yield `None`; response bodies are
/// server-controlled and never worth failing loudly over.
pub fn find_text(xml: &str, path: &[&str]) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(element_name(&start)),
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(text)) if path_matches(&stack, path) => {
                return text.unescape().ok().map(|t| t.trim().to_string());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Returns the trimmed texts of every node matching `path`, in document order.
pub fn collect_texts(xml: &str, path: &[&str]) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut texts = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(element_name(&start)),
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(text)) if path_matches(&stack, path) => {
                if let Ok(value) = text.unescape() {
                    texts.push(value.trim().to_string());
                }
            }
            Ok(Event::Eof) | Err(_) => return texts,
            _ => {}
        }
    }
}

pub(crate) fn path_matches(stack: &[String], path: &[&str]) -> bool {
    stack.len() == path.len()
        && stack
            .iter()
            .zip(path)
            .all(|(name, segment)| *segment == "*" || name == segment)
}

pub(crate) fn element_name(start: &quick_xml::events::BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}
