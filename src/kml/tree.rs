//! Minimal XML tree that re-serializes untouched nodes byte-for-byte.
//!
//! Every element keeps the raw text of its start tag and every non-element
//! node keeps its raw source, so only the subtrees that get edited change
//! when the document is written back.

use quick_xml::Reader;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;

use crate::error::{Error, Result};

/// Prefix -> namespace URI bindings; the default namespace uses `""`.
pub type Scope = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Character data exactly as written, entities still escaped.
    Text(String),
    /// Comment, CDATA, declaration, processing instruction or doctype.
    Raw(String),
}

impl Node {
    fn is_blank(&self) -> bool {
        matches!(self, Node::Text(t) if t.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Qualified name as written, e.g. `wpml:index`.
    pub name: String,
    /// Start tag content between `<` and `>` (or `/>`).
    start: String,
    self_closing: bool,
    /// Namespace bindings in scope, own declarations last.
    scope: Scope,
    pub children: Vec<Node>,
}

/// Strategies for finding a child element, tried in order.
///
/// Templates come from several schema versions, so a lookup first trusts
/// the namespace, then a literal unprefixed tag, then the bare local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Namespace URI and local name both match.
    Namespaced,
    /// Tag written exactly as the local name, without prefix.
    Unqualified,
    /// Local name matches, prefix and namespace ignored.
    LocalName,
}

pub const LOOKUP_ORDER: [Lookup; 3] = [Lookup::Namespaced, Lookup::Unqualified, Lookup::LocalName];

impl Lookup {
    pub fn matches(self, element: &Element, namespace: &str, local: &str) -> bool {
        match self {
            Lookup::Namespaced => {
                element.local_name() == local && element.namespace() == Some(namespace)
            }
            Lookup::Unqualified => element.name == local,
            Lookup::LocalName => element.local_name() == local,
        }
    }
}

fn declared_namespaces(start: &quick_xml::events::BytesStart) -> Scope {
    start
        .attributes()
        .flatten()
        .filter_map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            if key == "xmlns" {
                Some((String::new(), value))
            } else {
                key.strip_prefix("xmlns:").map(|p| (p.to_string(), value))
            }
        })
        .collect()
}

impl Element {
    fn from_start(start: &quick_xml::events::BytesStart, parent_scope: &Scope, empty: bool) -> Element {
        let mut scope = parent_scope.clone();
        scope.extend(declared_namespaces(start));
        Element {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            start: String::from_utf8_lossy(start).into_owned(),
            self_closing: empty,
            scope,
            children: Vec::new(),
        }
    }

    /// New empty element sharing this element's namespace scope.
    pub fn new_child(&self, name: &str) -> Element {
        Element {
            name: name.to_string(),
            start: name.to_string(),
            self_closing: false,
            scope: self.scope.clone(),
            children: Vec::new(),
        }
    }

    /// New element holding `text`, sharing this element's namespace scope.
    pub fn new_leaf(&self, name: &str, text: &str) -> Element {
        let mut leaf = self.new_child(name);
        leaf.set_text(text);
        leaf
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(p, _)| p)
    }

    pub fn local_name(&self) -> &str {
        self.name.split_once(':').map_or(self.name.as_str(), |(_, l)| l)
    }

    pub fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        self.scope
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Prefix bound to the first in-scope namespace that satisfies `pred`.
    pub fn prefix_for(&self, pred: impl Fn(&str) -> bool) -> Option<(&str, &str)> {
        self.scope
            .iter()
            .rev()
            .find(|(_, uri)| pred(uri))
            .map(|(p, uri)| (p.as_str(), uri.as_str()))
    }

    pub fn namespace(&self) -> Option<&str> {
        self.resolve_prefix(self.prefix().unwrap_or(""))
    }

    /// Unescaped concatenation of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(unescape(t).map_or_else(|_| t.clone(), |c| c.into_owned())),
                _ => None,
            })
            .collect()
    }

    pub fn set_text(&mut self, text: &str) {
        self.children = vec![Node::Text(escape(text).into_owned())];
    }

    fn elements(&self) -> impl Iterator<Item = (usize, &Element)> {
        self.children.iter().enumerate().filter_map(|(i, n)| match n {
            Node::Element(e) => Some((i, e)),
            _ => None,
        })
    }

    /// Child index of the first element found by the lookup strategies.
    pub fn position(&self, namespace: &str, local: &str) -> Option<usize> {
        LOOKUP_ORDER.iter().find_map(|strategy| {
            self.elements()
                .find(|(_, e)| strategy.matches(e, namespace, local))
                .map(|(i, _)| i)
        })
    }

    /// Child indices of every element any lookup strategy accepts.
    pub fn positions(&self, namespace: &str, local: &str) -> Vec<usize> {
        self.elements()
            .filter(|(_, e)| LOOKUP_ORDER.iter().any(|s| s.matches(e, namespace, local)))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn find(&self, namespace: &str, local: &str) -> Option<&Element> {
        match self.children.get(self.position(namespace, local)?) {
            Some(Node::Element(e)) => Some(e),
            _ => None,
        }
    }

    pub fn find_mut(&mut self, namespace: &str, local: &str) -> Option<&mut Element> {
        let idx = self.position(namespace, local)?;
        match self.children.get_mut(idx) {
            Some(Node::Element(e)) => Some(e),
            _ => None,
        }
    }

    /// Depth-first search by local name.
    pub fn find_descendant_mut(&mut self, local: &str) -> Option<&mut Element> {
        for node in self.children.iter_mut() {
            if let Node::Element(e) = node {
                if e.local_name() == local {
                    return Some(e);
                }
                if let Some(found) = e.find_descendant_mut(local) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Sets the text of the first matching child, creating `qualified` when
    /// no child matches.
    pub fn set_child_text(&mut self, namespace: &str, local: &str, qualified: &str, text: &str) {
        match self.find_mut(namespace, local) {
            Some(child) => child.set_text(text),
            None => {
                let leaf = self.new_leaf(qualified, text);
                self.append_element(leaf);
            }
        }
    }

    /// Whitespace that precedes the first element child, used as the
    /// separator when inserting new children.
    pub fn child_separator(&self) -> Option<String> {
        let (first, _) = self.elements().next()?;
        match first.checked_sub(1).map(|i| &self.children[i]) {
            Some(Node::Text(t)) if t.trim().is_empty() => Some(t.clone()),
            _ => None,
        }
    }

    /// Removes the child at `idx` together with the blank text right before
    /// it. Returns how many nodes were removed.
    pub fn remove_child(&mut self, idx: usize) -> usize {
        self.children.remove(idx);
        if idx > 0 && self.children[idx - 1].is_blank() {
            self.children.remove(idx - 1);
            2
        } else {
            1
        }
    }

    /// Removes every child the lookup accepts and returns the index where
    /// the first one used to start.
    pub fn remove_all(&mut self, namespace: &str, local: &str) -> Option<usize> {
        let positions = self.positions(namespace, local);
        let first = *positions.first()?;
        let mut start = first;
        for &idx in positions.iter().rev() {
            let removed = self.remove_child(idx);
            if idx == first {
                start = first + 1 - removed;
            }
        }
        Some(start)
    }

    /// Inserts `child` at node index `at`, preceded by the separator.
    /// Returns the node index right after the inserted element.
    pub fn insert_element(&mut self, at: usize, child: Element, separator: Option<&str>) -> usize {
        let mut at = at;
        if let Some(sep) = separator {
            self.children.insert(at, Node::Text(sep.to_string()));
            at += 1;
        }
        self.children.insert(at, Node::Element(child));
        at + 1
    }

    /// Appends `child` after the last element, keeping the closing-tag
    /// indentation at the end.
    pub fn append_element(&mut self, child: Element) {
        let sep = self.child_separator();
        let at = match self.children.last() {
            Some(node) if node.is_blank() && sep.is_some() => self.children.len() - 1,
            _ => self.children.len(),
        };
        self.insert_element(at, child, sep.as_deref());
    }

    /// Like [`Element::append_element`], but lays out a first child on its
    /// own line when the element has no children yet. `indent` is the
    /// indentation of this element itself.
    pub fn append_indented(&mut self, child: Element, indent: &str) {
        if self.children.iter().any(|n| matches!(n, Node::Element(_))) {
            self.append_element(child);
            return;
        }
        self.children = vec![
            Node::Text(format!("\n{indent}  ")),
            Node::Element(child),
            Node::Text(format!("\n{indent}")),
        ];
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.start);
        if self.self_closing && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl Node {
    fn write_to(&self, out: &mut String) {
        match self {
            Node::Element(e) => e.write_to(out),
            Node::Text(t) | Node::Raw(t) => out.push_str(t),
        }
    }
}

/// Parsed document: top-level nodes with exactly one root element.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Document> {
        let mut reader = Reader::from_str(xml);
        let mut top: Vec<Node> = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let empty_scope = Scope::new();

        loop {
            let node = match reader.read_event()? {
                Event::Start(e) => {
                    let scope = stack.last().map_or(&empty_scope, |p| &p.scope);
                    let element = Element::from_start(&e, scope, false);
                    stack.push(element);
                    continue;
                }
                Event::End(_) => match stack.pop() {
                    Some(element) => Node::Element(element),
                    None => return Err(Error::MissingElement("start tag".to_string())),
                },
                Event::Empty(e) => {
                    let scope = stack.last().map_or(&empty_scope, |p| &p.scope);
                    Node::Element(Element::from_start(&e, scope, true))
                }
                Event::Text(t) => Node::Text(String::from_utf8_lossy(&t).into_owned()),
                Event::CData(t) => Node::Raw(format!("<![CDATA[{}]]>", String::from_utf8_lossy(&t))),
                Event::Comment(t) => Node::Raw(format!("<!--{}-->", String::from_utf8_lossy(&t))),
                Event::Decl(d) => Node::Raw(format!("<?{}?>", String::from_utf8_lossy(&d))),
                Event::PI(p) => Node::Raw(format!("<?{}?>", String::from_utf8_lossy(&p))),
                Event::DocType(t) => {
                    Node::Raw(format!("<!DOCTYPE {}>", String::from_utf8_lossy(&t)))
                }
                Event::Eof => break,
            };
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => top.push(node),
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::MissingElement(format!("/{}", open.name)));
        }
        if !top.iter().any(|n| matches!(n, Node::Element(_))) {
            return Err(Error::MissingElement("root".to_string()));
        }
        Ok(Document { nodes: top })
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn has_declaration(&self) -> bool {
        matches!(self.nodes.first(), Some(Node::Raw(r)) if r.starts_with("<?xml"))
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write_to(&mut out);
        }
        out
    }
}
