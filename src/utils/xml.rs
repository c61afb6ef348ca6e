//! Span-tracking XML view used for in-place manifest edits.
//!
//! Elements are matched on their local name, so `<pom:version>` and
//! `<version>` are the same element. Edits replace only the byte ranges of
//! attribute values or element text; everything else in the source is
//! written back untouched.

use crate::error::{DepError, Result};
use quick_xml::Reader;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][-A-Za-z0-9_.:]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is valid")
});

#[derive(Debug, Clone)]
struct XmlAttribute {
    local_name: String,
    value: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct XmlElement {
    pub local_name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    attributes: Vec<XmlAttribute>,
    text: Option<Range<usize>>,
}

#[derive(Debug, Clone)]
pub struct XmlDocument {
    source: String,
    elements: Vec<XmlElement>,
    edits: Vec<(Range<usize>, String)>,
}

impl XmlDocument {
    pub fn parse(path: &Path, source: String) -> Result<Self> {
        let elements = index_elements(&source).map_err(|message| DepError::manifest_parse(path, message))?;
        if elements.is_empty() {
            return Err(DepError::manifest_parse(path, "document has no root element"));
        }

        Ok(Self {
            source,
            elements,
            edits: Vec::new(),
        })
    }

    pub fn element(&self, idx: usize) -> &XmlElement {
        &self.elements[idx]
    }

    /// Indices of every element named `local_name`, in document order.
    pub fn elements_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.elements
            .iter()
            .enumerate()
            .filter(move |(_, el)| el.local_name == local_name)
            .map(|(idx, _)| idx)
    }

    /// First direct child of `idx` named `local_name`.
    pub fn child(&self, idx: usize, local_name: &str) -> Option<usize> {
        self.elements[idx]
            .children
            .iter()
            .copied()
            .find(|child| self.elements[*child].local_name == local_name)
    }

    /// Trimmed, unescaped text of a leaf element. Empty text reads as `None`.
    pub fn text(&self, idx: usize) -> Option<String> {
        let span = self.elements[idx].text.clone()?;
        let raw = &self.source[span];
        let value = unescape(raw).map(|v| v.into_owned()).unwrap_or_else(|_| raw.to_string());
        Some(value).filter(|v| !v.is_empty())
    }

    pub fn child_text(&self, idx: usize, local_name: &str) -> Option<String> {
        self.child(idx, local_name).and_then(|child| self.text(child))
    }

    pub fn attribute(&self, idx: usize, local_name: &str) -> Option<String> {
        let attr = self.elements[idx]
            .attributes
            .iter()
            .find(|attr| attr.local_name == local_name)?;
        let raw = &self.source[attr.value.clone()];
        Some(unescape(raw).map(|v| v.into_owned()).unwrap_or_else(|_| raw.to_string()))
    }

    /// Replaces the text of a leaf element. Returns false when the element
    /// has no editable text.
    pub fn set_text(&mut self, idx: usize, value: &str) -> bool {
        match self.elements[idx].text.clone() {
            Some(span) => {
                self.record_edit(span, escape(value).into_owned());
                true
            }
            None => false,
        }
    }

    pub fn set_attribute(&mut self, idx: usize, local_name: &str, value: &str) -> bool {
        let span = self.elements[idx]
            .attributes
            .iter()
            .find(|attr| attr.local_name == local_name)
            .map(|attr| attr.value.clone());

        match span {
            Some(span) => {
                self.record_edit(span, escape(value).into_owned());
                true
            }
            None => false,
        }
    }

    pub fn is_modified(&self) -> bool {
        !self.edits.is_empty()
    }

    fn record_edit(&mut self, span: Range<usize>, replacement: String) {
        self.edits.retain(|(existing, _)| *existing != span);
        self.edits.push((span, replacement));
    }

    /// Source text with every recorded edit applied.
    pub fn render(&self) -> String {
        let mut edits: Vec<&(Range<usize>, String)> = self.edits.iter().collect();
        edits.sort_by_key(|(span, _)| span.start);

        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for (span, replacement) in edits {
            out.push_str(&self.source[cursor..span.start]);
            out.push_str(replacement);
            cursor = span.end;
        }
        out.push_str(&self.source[cursor..]);
        out
    }
}

fn index_elements(source: &str) -> std::result::Result<Vec<XmlElement>, String> {
    let mut reader = Reader::from_str(source);
    let mut elements: Vec<XmlElement> = Vec::new();
    // (element index, byte offset where its content starts)
    let mut open: Vec<(usize, usize)> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("{e} at byte {}", reader.error_position()))?;
        let end = reader.buffer_position() as usize;

        match event {
            Event::Start(tag) => {
                let idx = push_element(source, &mut elements, &open, &tag, end);
                open.push((idx, end));
            }
            Event::Empty(tag) => {
                push_element(source, &mut elements, &open, &tag, end);
            }
            Event::End(_) => {
                let (idx, content_start) = open.pop().ok_or("unexpected closing tag")?;
                let content_end = tag_start(source, end);
                if elements[idx].children.is_empty() && content_start <= content_end {
                    elements[idx].text = text_span(source, content_start..content_end);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !open.is_empty() {
        return Err("unclosed element at end of document".to_string());
    }
    Ok(elements)
}

fn push_element(
    source: &str,
    elements: &mut Vec<XmlElement>,
    open: &[(usize, usize)],
    tag: &BytesStart<'_>,
    end: usize,
) -> usize {
    let start = tag_start(source, end);
    let local_name = String::from_utf8_lossy(tag.local_name().as_ref()).into_owned();
    let parent = open.last().map(|(idx, _)| *idx);
    let attributes = attribute_spans(source, start + 1 + tag.name().as_ref().len(), end);

    let idx = elements.len();
    elements.push(XmlElement {
        local_name,
        parent,
        children: Vec::new(),
        attributes,
        text: None,
    });
    if let Some(parent) = parent {
        elements[parent].children.push(idx);
    }
    idx
}

/// Offset of the `<` opening the tag that ends at `end`.
fn tag_start(source: &str, end: usize) -> usize {
    source[..end].rfind('<').unwrap_or(0)
}

fn attribute_spans(source: &str, from: usize, to: usize) -> Vec<XmlAttribute> {
    let raw = &source[from.min(to)..to];
    ATTRIBUTE
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2).or_else(|| caps.get(3))?;
            let local_name = name.rsplit(':').next().unwrap_or(name).to_string();
            Some(XmlAttribute {
                local_name,
                value: from + value.start()..from + value.end(),
            })
        })
        .collect()
}

/// Trimmed text range, or `None` when the content holds markup.
fn text_span(source: &str, content: Range<usize>) -> Option<Range<usize>> {
    let raw = &source[content.clone()];
    if raw.contains('<') {
        return None;
    }
    let leading = raw.len() - raw.trim_start().len();
    let trimmed_len = raw.trim().len();
    let start = content.start + leading;
    Some(start..start + trimmed_len)
}
