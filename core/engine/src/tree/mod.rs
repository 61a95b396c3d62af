//! The structured-data tree exchanged with guest code.
//!
//! A [`Tree`] node holds either scalar text (a leaf) or an ordered list of
//! keyed children. The empty key marks an array element; array elements keep
//! their insertion order, while the order of named children carries no
//! meaning. The [`marshal`] submodule converts trees to and from guest tables.

pub mod marshal;


use serde_json::{Map, Number, Value as JsonValue};

pub use marshal::{
    GuestValue, MAX_DEPTH, SCALAR_PROBES, Scalar, guest_to_tree, guest_to_tree_with_warnings,
    tree_to_guest,
};

/// Key of array-element children.
const ELEMENT: &str = "";

/// An ordered, keyed structured-data node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    data: String,
    children: Vec<(String, Tree)>,
}

impl Tree {
    /// An empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// A leaf holding `data`.
    pub fn leaf(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            children: Vec::new(),
        }
    }

    /// Scalar text of a leaf. Empty for inner nodes.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Every child with its key, in insertion order.
    pub fn children(&self) -> &[(String, Tree)] {
        &self.children
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Appends a child under `key`, keeping any existing child with that key.
    pub fn push(&mut self, key: impl Into<String>, child: Tree) {
        self.children.push((key.into(), child));
    }

    /// Appends an array element.
    pub fn push_element(&mut self, child: Tree) {
        self.push(ELEMENT, child);
    }

    /// Sets the named child `key`, replacing the first existing one.
    pub fn put(&mut self, key: impl Into<String>, child: Tree) {
        let key = key.into();
        match self.children.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = child,
            None => self.children.push((key, child)),
        }
    }

    /// First named child under `key`.
    pub fn get(&self, key: &str) -> Option<&Tree> {
        if key == ELEMENT {
            return None;
        }
        self.children
            .iter()
            .find_map(|(existing, child)| (existing == key).then_some(child))
    }

    /// Array elements, in order.
    pub fn elements(&self) -> impl Iterator<Item = &Tree> {
        self.children
            .iter()
            .filter_map(|(key, child)| (key == ELEMENT).then_some(child))
    }

    /// A copy with every child list stable-sorted by key, recursively.
    ///
    /// Array elements sort first and keep their relative order, so two trees
    /// differing only in the order of named children compare equal.
    #[must_use]
    pub fn canonical(&self) -> Self {
        let mut children: Vec<_> = self
            .children
            .iter()
            .map(|(key, child)| (key.clone(), child.canonical()))
            .collect();
        children.sort_by(|(a, _), (b, _)| a.cmp(b));
        Self {
            data: self.data.clone(),
            children,
        }
    }

    /// Builds a tree from a JSON document.
    ///
    /// Objects become named children, arrays become elements, scalars become
    /// leaf text and `null` becomes an empty leaf.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::new(),
            JsonValue::Bool(flag) => Self::leaf(flag.to_string()),
            JsonValue::Number(number) => Self::leaf(number.to_string()),
            JsonValue::String(text) => Self::leaf(text.as_str()),
            JsonValue::Array(items) => {
                let mut tree = Self::new();
                for item in items {
                    tree.push_element(Self::from_json(item));
                }
                tree
            }
            JsonValue::Object(entries) => {
                let mut tree = Self::new();
                for (key, item) in entries {
                    tree.push(key.as_str(), Self::from_json(item));
                }
                tree
            }
        }
    }

    /// Renders the tree as JSON.
    ///
    /// Leaves go through the same probes as guest conversion. A node mixing
    /// named children and elements renders as an object holding the elements
    /// as an array under the empty key.
    pub fn to_json(&self) -> JsonValue {
        if self.is_leaf() {
            return match Scalar::parse(&self.data) {
                Scalar::Boolean(flag) => JsonValue::Bool(flag),
                Scalar::Integer(number) => JsonValue::from(number),
                Scalar::Number(number) => Number::from_f64(number)
                    .map_or_else(|| JsonValue::String(self.data.clone()), JsonValue::Number),
                Scalar::String(text) => JsonValue::String(text),
            };
        }

        let elements: Vec<JsonValue> = self.elements().map(Self::to_json).collect();
        if elements.len() == self.children.len() {
            return JsonValue::Array(elements);
        }

        let mut object = Map::new();
        for (key, child) in &self.children {
            if key != ELEMENT {
                object.insert(key.clone(), child.to_json());
            }
        }
        if !elements.is_empty() {
            object.insert(ELEMENT.to_owned(), JsonValue::Array(elements));
        }
        JsonValue::Object(object)
    }
}
