//! Detached document tree helpers.
//!
//! The engine never touches the live, user-visible tree. Markup is parsed
//! into an owned `scraper::Html`, inspected or mutated through its
//! `ego_tree` arena, and serialized back to a string.

use ego_tree::{NodeId, NodeRef};
use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Text};
use scraper::{ElementRef, Html, Node};

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Child-index path from the fragment's content root to a node.
///
/// Host environments (the browser DOM) describe selection endpoints this way
/// so they can be resolved against a parsed copy of the same markup.
pub type NodePath = Vec<usize>;

/// Parse a markup fragment into a detached tree.
pub fn parse_fragment(markup: &str) -> Html {
    Html::parse_fragment(markup)
}

/// The element that holds the fragment's content.
///
/// `Html::root_element` panics on a tree without an element child; this
/// returns `None` instead.
pub fn content_root(html: &Html) -> Option<NodeId> {
    html.tree
        .root()
        .children()
        .find(|child| child.value().is_element())
        .map(|child| child.id())
}

/// Serialize the content root's children back to markup.
pub fn serialize(html: &Html) -> String {
    content_root(html)
        .and_then(|id| html.tree.get(id))
        .and_then(ElementRef::wrap)
        .map(|el| el.inner_html())
        .unwrap_or_default()
}

/// Text of a text node, or `None` for any other node kind.
pub fn text_of(html: &Html, id: NodeId) -> Option<&str> {
    html.tree
        .get(id)
        .and_then(|node| node.value().as_text())
        .map(|text| &*text.text)
}

/// Lower-case tag name of an element node.
pub fn tag_of<'a>(node: &NodeRef<'a, Node>) -> Option<&'a str> {
    node.value().as_element().map(|el| el.name())
}

/// Attribute value of an element node.
pub fn attr_of<'a>(node: &NodeRef<'a, Node>, name: &str) -> Option<&'a str> {
    node.value().as_element().and_then(|el| el.attr(name))
}

/// Resolve a child-index path relative to the content root.
pub fn node_at_path(html: &Html, path: &[usize]) -> Option<NodeId> {
    let mut node = html.tree.get(content_root(html)?)?;
    for &index in path {
        node = node.children().nth(index)?;
    }
    Some(node.id())
}

/// Child-index path of `id` relative to the content root.
pub fn path_of(html: &Html, id: NodeId) -> Option<NodePath> {
    let root = content_root(html)?;
    let mut path = Vec::new();
    let mut node = html.tree.get(id)?;
    while node.id() != root {
        path.push(node.prev_siblings().count());
        node = node.parent()?;
    }
    path.reverse();
    Some(path)
}

/// First text node at or beneath `id`, in document order.
pub fn first_text_descendant(html: &Html, id: NodeId) -> Option<NodeId> {
    html.tree
        .get(id)?
        .descendants()
        .find(|n| n.value().is_text())
        .map(|n| n.id())
}

/// Last text node at or beneath `id`, in document order.
pub fn last_text_descendant(html: &Html, id: NodeId) -> Option<NodeId> {
    html.tree
        .get(id)?
        .descendants()
        .filter(|n| n.value().is_text())
        .last()
        .map(|n| n.id())
}

/// Build a detached HTML element node.
pub(crate) fn element(tag: &str, attrs: &[(&str, &str)]) -> Node {
    let name = QualName::new(None, Namespace::from(HTML_NS), LocalName::from(tag));
    let attrs = attrs
        .iter()
        .map(|(key, value)| Attribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from(*key)),
            value: StrTendril::from_slice(value),
        })
        .collect();
    Node::Element(Element::new(name, attrs))
}

/// Replace the contents of a text node. Returns false for non-text nodes.
pub(crate) fn set_text(html: &mut Html, id: NodeId, content: &str) -> bool {
    let Some(mut node) = html.tree.get_mut(id) else {
        return false;
    };
    match node.value() {
        Node::Text(text) => {
            text.text = StrTendril::from_slice(content);
            true
        }
        _ => false,
    }
}

/// Build a detached text node.
pub(crate) fn text(content: &str) -> Node {
    Node::Text(Text {
        text: StrTendril::from_slice(content),
    })
}
