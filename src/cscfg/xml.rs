use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::Error;

/// Node of a parsed XML document. Everything the reader reports is kept so the
/// tree serializes back to an equivalent document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written, including any prefix.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Name for a new child living in the same namespace prefix as `self`.
    pub fn sibling_name(&self, local: &str) -> String {
        match self.name.split_once(':') {
            Some((prefix, _)) => format!("{prefix}:{local}"),
            None => local.to_string(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Child elements whose local name is `local`.
    pub fn elements_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.local_name() == local)
    }

    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|e| e.local_name() == local)
    }

    /// Returns the child named `local`, creating it right after the last
    /// existing child whose local name appears in `after` (or at the end).
    pub fn child_or_insert(
        &mut self,
        local: &str,
        after: &[&str],
    ) -> Result<&mut XmlElement, Error> {
        let existing = self.children.iter().position(
            |node| matches!(node, XmlNode::Element(e) if e.local_name() == local),
        );
        let index = match existing {
            Some(index) => index,
            None => {
                let position = self
                    .children
                    .iter()
                    .rposition(|node| {
                        matches!(node, XmlNode::Element(e) if after.contains(&e.local_name()))
                    })
                    .map(|p| p + 1)
                    .unwrap_or(self.children.len());
                let element = XmlElement::new(self.sibling_name(local));
                self.children.insert(position, XmlNode::Element(element));
                position
            }
        };
        match self.children.get_mut(index) {
            Some(XmlNode::Element(element)) => Ok(element),
            _ => Err(Error::InvalidConfiguration(format!(
                "<{local}> could not be placed under <{}>",
                self.name
            ))),
        }
    }

    pub fn push_element(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    /// Concatenated text content of direct text and CDATA children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(text) | XmlNode::CData(text) => out.push_str(text),
                _ => {}
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// A whole document: optional declaration, nodes around the root, and the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub declaration: Option<XmlDeclaration>,
    pub prolog: Vec<XmlNode>,
    pub root: XmlElement,
    pub epilog: Vec<XmlNode>,
}

impl XmlDocument {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let mut reader = Reader::from_str(input);
        let mut declaration = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut stack: Vec<XmlElement> = Vec::new();

        loop {
            let node = match reader.read_event()? {
                Event::Decl(decl) => {
                    declaration = Some(read_declaration(&decl)?);
                    continue;
                }
                Event::Start(start) => {
                    stack.push(read_element(&start)?);
                    continue;
                }
                Event::Empty(start) => XmlNode::Element(read_element(&start)?),
                Event::End(_) => match stack.pop() {
                    Some(element) => XmlNode::Element(element),
                    None => return Err(malformed("unexpected closing tag")),
                },
                Event::Text(text) => XmlNode::Text(text.unescape()?.into_owned()),
                Event::CData(data) => XmlNode::CData(String::from_utf8_lossy(&data).into_owned()),
                Event::Comment(comment) => {
                    XmlNode::Comment(String::from_utf8_lossy(&comment).into_owned())
                }
                Event::PI(pi) => {
                    XmlNode::ProcessingInstruction(String::from_utf8_lossy(&pi).into_owned())
                }
                Event::DocType(_) => continue,
                Event::Eof => break,
            };

            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
                continue;
            }
            match node {
                XmlNode::Element(element) => {
                    if root.is_some() {
                        return Err(malformed("more than one root element"));
                    }
                    root = Some(element);
                }
                XmlNode::Text(text) if text.trim().is_empty() => {}
                XmlNode::Text(_) | XmlNode::CData(_) => {
                    return Err(malformed("text outside the root element"))
                }
                other => {
                    if root.is_some() {
                        epilog.push(other);
                    } else {
                        prolog.push(other);
                    }
                }
            }
        }

        if !stack.is_empty() {
            return Err(malformed("unclosed element"));
        }
        let root = root.ok_or_else(|| malformed("document has no root element"))?;
        Ok(Self {
            declaration,
            prolog,
            root,
            epilog,
        })
    }

    pub fn to_xml_string(&self) -> Result<String, Error> {
        let mut writer = Writer::new(Vec::new());
        if let Some(decl) = &self.declaration {
            writer.write_event(Event::Decl(BytesDecl::new(
                &decl.version,
                decl.encoding.as_deref(),
                decl.standalone.as_deref(),
            )))?;
            writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
        }
        for node in &self.prolog {
            write_node(&mut writer, node)?;
            writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
        }
        write_element(&mut writer, &self.root)?;
        for node in &self.epilog {
            writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
            write_node(&mut writer, node)?;
        }
        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::InvalidConfiguration(format!("serialized xml is not utf-8: {e}")))
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

fn malformed(reason: &str) -> Error {
    Error::InvalidConfiguration(format!("malformed xml: {reason}"))
}

fn read_declaration(decl: &BytesDecl<'_>) -> Result<XmlDeclaration, Error> {
    let version = String::from_utf8_lossy(&decl.version()?).into_owned();
    let encoding = match decl.encoding() {
        Some(encoding) => Some(String::from_utf8_lossy(&encoding?).into_owned()),
        None => None,
    };
    let standalone = match decl.standalone() {
        Some(standalone) => Some(String::from_utf8_lossy(&standalone?).into_owned()),
        None => None,
    };
    Ok(XmlDeclaration {
        version,
        encoding,
        standalone,
    })
}

fn read_element(start: &BytesStart<'_>) -> Result<XmlElement, Error> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), Error> {
    match node {
        XmlNode::Element(element) => write_element(writer, element)?,
        XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        XmlNode::CData(data) => writer.write_event(Event::CData(BytesCData::new(data.as_str())))?,
        XmlNode::Comment(comment) => {
            writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))?
        }
        XmlNode::ProcessingInstruction(pi) => {
            writer.write_event(Event::PI(BytesText::from_escaped(pi.as_str())))?
        }
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<(), Error> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
