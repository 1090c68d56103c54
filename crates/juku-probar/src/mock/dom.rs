//! Arena document backing [`super::MockSurface`].

use super::selector::SelectorList;
use crate::extract::trimmed;
use crate::result::ProbeResult;

/// Index of a node in the arena
pub type NodeId = usize;

/// Declarative element tree used to seed a mock document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockElement {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<MockElement>,
    hidden: bool,
    checked: bool,
    value: String,
}

impl MockElement {
    /// Element with the given tag
    #[must_use]
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// `<input type=checkbox>` wrapped in a `<label>` carrying `label`
    #[must_use]
    pub fn labeled_checkbox(name: &str, label: &str, checked: bool) -> Self {
        let input = Self::new("input")
            .attr("type", "checkbox")
            .attr("name", name);
        Self::new("label")
            .child(if checked { input.checked() } else { input })
            .child(Self::new("span").text(label))
    }

    /// `<input type=radio>` wrapped in a `<label>` carrying `label`
    #[must_use]
    pub fn labeled_radio(name: &str, label: &str, checked: bool) -> Self {
        let input = Self::new("input").attr("type", "radio").attr("name", name);
        Self::new("label")
            .child(if checked { input.checked() } else { input })
            .child(Self::new("span").text(label))
    }

    /// Append a class token
    #[must_use]
    pub fn class(mut self, class: &str) -> Self {
        match self.attrs.iter_mut().find(|(n, _)| n == "class") {
            Some((_, v)) if !v.is_empty() => {
                v.push(' ');
                v.push_str(class);
            }
            Some((_, v)) => v.push_str(class),
            None => self.attrs.push(("class".to_string(), class.to_string())),
        }
        self
    }

    /// Set the `id` attribute
    #[must_use]
    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name.to_string(), value)),
        }
        self
    }

    /// Leading text of the element
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Append a child
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Append children
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children.extend(children);
        self
    }

    /// Not rendered
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Checked checkbox or radio
    #[must_use]
    pub const fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    /// Initial value of a text input
    #[must_use]
    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    hidden: bool,
    checked: bool,
    value: String,
}

/// Mutable mock document, handed to click reactions
#[derive(Debug, Clone, Default)]
pub struct MockDom {
    nodes: Vec<Node>,
    visibility_rules: Vec<(String, String)>,
    reload_requested: bool,
}

impl MockDom {
    /// Build a document rooted at `root`
    #[must_use]
    pub fn build(root: &MockElement, visibility_rules: Vec<(String, String)>) -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            visibility_rules,
            reload_requested: false,
        };
        dom.insert(root, None);
        dom
    }

    fn insert(&mut self, el: &MockElement, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            tag: el.tag.clone(),
            attrs: el.attrs.clone(),
            text: el.text.clone(),
            children: Vec::new(),
            parent,
            hidden: el.hidden,
            checked: el.checked,
            value: el.value.clone(),
        });
        for child in &el.children {
            let child_id = self.insert(child, Some(id));
            self.nodes[id].children.push(child_id);
        }
        id
    }

    pub(crate) fn visibility_rules(&self) -> Vec<(String, String)> {
        self.visibility_rules.clone()
    }

    pub(crate) fn add_visibility_rule(&mut self, selector: &str, class: &str) {
        self.visibility_rules
            .push((selector.to_string(), class.to_string()));
    }

    pub(crate) fn take_reload_request(&mut self) -> bool {
        std::mem::take(&mut self.reload_requested)
    }

    /// Whether `node` exists
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        node < self.nodes.len()
    }

    /// Every node in document order
    pub fn all(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants_or_self(0)
    }

    fn descendants_or_self(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = if self.contains(node) {
            vec![node]
        } else {
            Vec::new()
        };
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(self.nodes[next].children.iter().rev());
            Some(next)
        })
    }

    /// Strict descendants of `node` in document order
    pub fn descendants(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants_or_self(node).skip(1)
    }

    /// Lower-case tag name
    #[must_use]
    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node].tag
    }

    /// Attribute value
    #[must_use]
    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node]
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        let attrs = &mut self.nodes[node].attrs;
        match attrs.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        }
    }

    /// Whether the class attribute carries `class`
    #[must_use]
    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|v| v.split_whitespace().any(|c| c == class))
    }

    /// Add a class token
    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let value = match self.attr(node, "class") {
            Some(v) if !v.trim().is_empty() => format!("{v} {class}"),
            _ => class.to_string(),
        };
        self.set_attr(node, "class", &value);
    }

    /// Remove a class token
    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if let Some(v) = self.attr(node, "class") {
            let value = v
                .split_whitespace()
                .filter(|c| *c != class)
                .collect::<Vec<_>>()
                .join(" ");
            self.set_attr(node, "class", &value);
        }
    }

    /// Parent node
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    /// Child nodes in order
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node].children
    }

    /// Next element sibling
    #[must_use]
    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let siblings = self.children(self.parent(node)?);
        let pos = siblings.iter().position(|n| *n == node)?;
        siblings.get(pos + 1).copied()
    }

    /// Previous element sibling
    #[must_use]
    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        let siblings = self.children(self.parent(node)?);
        let pos = siblings.iter().position(|n| *n == node)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    #[must_use]
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Own text followed by the text of every descendant
    #[must_use]
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants_or_self(node)
            .map(|n| self.nodes[n].text.as_str())
            .collect()
    }

    /// Replace the element's own text and drop its children
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.nodes[node].text = text.to_string();
        self.nodes[node].children.clear();
    }

    /// Checked state
    #[must_use]
    pub fn is_checked(&self, node: NodeId) -> bool {
        self.nodes[node].checked
    }

    /// Set checked state; checking a radio unchecks its group
    pub fn set_checked(&mut self, node: NodeId, checked: bool) {
        if checked && self.input_type(node) == Some("radio") {
            let group = self.attr(node, "name").map(ToString::to_string);
            let peers: Vec<NodeId> = self
                .all()
                .filter(|n| {
                    *n != node
                        && self.input_type(*n) == Some("radio")
                        && self.attr(*n, "name").map(ToString::to_string) == group
                })
                .collect();
            for peer in peers {
                self.nodes[peer].checked = false;
            }
        }
        self.nodes[node].checked = checked;
    }

    /// Value of a text input
    #[must_use]
    pub fn value(&self, node: NodeId) -> &str {
        &self.nodes[node].value
    }

    /// Set the value of a text input
    pub fn set_value(&mut self, node: NodeId, value: &str) {
        self.nodes[node].value = value.to_string();
    }

    /// Ask the surface to treat the current document as reloading
    pub fn begin_reload(&mut self) {
        self.reload_requested = true;
    }

    /// `type` of an `<input>`, `text` when unset
    #[must_use]
    pub fn input_type(&self, node: NodeId) -> Option<&str> {
        (self.tag(node) == "input").then(|| self.attr(node, "type").unwrap_or("text"))
    }

    /// Whether the node is a text-entry control
    #[must_use]
    pub fn is_text_control(&self, node: NodeId) -> bool {
        self.tag(node) == "textarea"
            || self
                .input_type(node)
                .is_some_and(|t| !matches!(t, "checkbox" | "radio" | "button" | "submit"))
    }

    /// Rendered: neither the node nor an ancestor is hidden, and every
    /// visibility rule matching the node or an ancestor is satisfied
    pub fn is_visible(&self, node: NodeId) -> ProbeResult<bool> {
        let rules = self
            .visibility_rules
            .iter()
            .map(|(sel, class)| Ok((SelectorList::parse(sel)?, class.as_str())))
            .collect::<ProbeResult<Vec<_>>>()?;

        let mut cur = Some(node);
        while let Some(n) = cur {
            if self.nodes[n].hidden || self.attr(n, "hidden").is_some() {
                return Ok(false);
            }
            for (selector, class) in &rules {
                if selector.matches(self, n) && !self.has_class(n, class) {
                    return Ok(false);
                }
            }
            cur = self.parent(n);
        }
        Ok(true)
    }

    /// Explicit or implicit ARIA role
    #[must_use]
    pub fn role(&self, node: NodeId) -> Option<String> {
        if let Some(role) = self.attr(node, "role") {
            return Some(role.to_string());
        }
        let implicit = match self.tag(node) {
            "a" if self.attr(node, "href").is_some() => "link",
            "button" => "button",
            "input" => match self.input_type(node).unwrap_or("text") {
                "checkbox" => "checkbox",
                "radio" => "radio",
                "button" | "submit" | "reset" => "button",
                _ => "textbox",
            },
            "textarea" => "textbox",
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
            "li" => "listitem",
            "ul" | "ol" => "list",
            "dialog" => "dialog",
            _ => return None,
        };
        Some(implicit.to_string())
    }

    /// Accessible name: `aria-label`, then an associated `<label>`, then text
    #[must_use]
    pub fn accessible_name(&self, node: NodeId) -> String {
        if let Some(label) = self.attr(node, "aria-label") {
            return trimmed(label);
        }
        if self.tag(node) == "input" || self.tag(node) == "textarea" {
            if let Some(id) = self.attr(node, "id") {
                let by_for = self
                    .all()
                    .find(|n| self.tag(*n) == "label" && self.attr(*n, "for") == Some(id));
                if let Some(label) = by_for {
                    return trimmed(&self.text_content(label));
                }
            }
            let mut cur = self.parent(node);
            while let Some(n) = cur {
                if self.tag(n) == "label" {
                    return trimmed(&self.text_content(n));
                }
                cur = self.parent(n);
            }
            return self.attr(node, "value").map(trimmed).unwrap_or_default();
        }
        trimmed(&self.text_content(node))
    }

    /// Control activated by clicking `label`
    #[must_use]
    pub fn labeled_control(&self, label: NodeId) -> Option<NodeId> {
        if let Some(target) = self.attr(label, "for") {
            return self
                .all()
                .find(|n| self.attr(*n, "id") == Some(target));
        }
        self.descendants(label).find(|n| self.tag(*n) == "input")
    }

    /// Nodes matching a CSS selector, in document order
    pub fn select(&self, selector: &str) -> ProbeResult<Vec<NodeId>> {
        let selector = SelectorList::parse(selector)?;
        Ok(self.all().filter(|n| selector.matches(self, *n)).collect())
    }

    /// Descendants of `scope` matching a CSS selector, in document order
    pub fn select_within(&self, scope: NodeId, selector: &str) -> ProbeResult<Vec<NodeId>> {
        let selector = SelectorList::parse(selector)?;
        Ok(self
            .descendants(scope)
            .filter(|n| selector.matches(self, *n))
            .collect())
    }
}
