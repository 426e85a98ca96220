//! Minimal element tree serialized through quick-xml.

use crate::CoreError;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: Option<String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    pub fn text_element(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut e = Self::new(name);
        e.text = Some(text.into());
        e
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.push((key.into(), value.into()));
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Stable sort of the children by qualified name.
    pub fn sort_children(&mut self) {
        self.children.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), CoreError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.children.is_empty() && self.text.is_none() {
            return write_event(writer, Event::Empty(start));
        }

        write_event(writer, Event::Start(start))?;
        if let Some(text) = &self.text {
            write_event(
                writer,
                Event::Text(BytesText::from_escaped(partial_escape(text))),
            )?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        write_event(writer, Event::End(BytesEnd::new(self.name.as_str())))
    }
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), CoreError> {
    writer
        .write_event(event)
        .map_err(|e| CoreError::Render(e.to_string()))
}

/// Serialize `root` as a UTF-8 document with a prolog and two-space indent.
pub fn write_document(root: &Element) -> Result<String, CoreError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_event(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    root.write_to(&mut writer)?;

    let mut out =
        String::from_utf8(writer.into_inner()).map_err(|e| CoreError::Render(e.to_string()))?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_prolog_and_indents() {
        let root = Element::new("Envelope")
            .with_attr("xmlns", "urn:test")
            .with_child(Element::text_element("Info", "hello"))
            .with_child(Element::new("Empty").with_attr("ovf:id", "x"));
        let xml = write_document(&root).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <Envelope xmlns=\"urn:test\">\n  \
             <Info>hello</Info>\n  \
             <Empty ovf:id=\"x\"/>\n\
             </Envelope>\n"
        );
    }

    #[test]
    fn escapes_text_and_attributes() {
        let root = Element::new("A")
            .with_attr("v", "a<b")
            .with_child(Element::text_element("T", "x & y"));
        let xml = write_document(&root).unwrap();
        assert!(xml.contains("v=\"a&lt;b\""));
        assert!(xml.contains("<T>x &amp; y</T>"));
    }

    #[test]
    fn sort_children_is_stable() {
        let mut item = Element::new("Item")
            .with_child(Element::new("vmw:Config").with_attr("vmw:key", "b"))
            .with_child(Element::new("rasd:ResourceType"))
            .with_child(Element::new("vmw:Config").with_attr("vmw:key", "a"))
            .with_child(Element::new("rasd:InstanceID"));
        item.sort_children();
        let names: Vec<&str> = item.children().iter().map(Element::name).collect();
        assert_eq!(
            names,
            vec!["rasd:InstanceID", "rasd:ResourceType", "vmw:Config", "vmw:Config"]
        );
        assert_eq!(item.children()[2].attr("vmw:key"), Some("b"));
    }
}
