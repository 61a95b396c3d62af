//! Conversion between [`Tree`]s and guest tables.

use log::{trace, warn};
use mlua::{Lua, Table, Value};

use super::Tree;
use crate::error::MarshalWarning;

/// Deepest table nesting followed when converting guest tables.
///
/// Self-referencing tables stop here instead of recursing forever.
pub const MAX_DEPTH: usize = 64;

/// A scalar recovered from leaf text.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// `true` or `false`, any case.
    Boolean(bool),
    /// Text that parses as a guest integer.
    Integer(i64),
    /// Text that parses as a finite float.
    Number(f64),
    /// Anything else, kept verbatim.
    String(String),
}

/// One typed parse attempt on leaf text.
pub type ScalarProbe = fn(&str) -> Option<Scalar>;

/// Parse attempts, in the order they are tried. The first match wins.
pub const SCALAR_PROBES: &[(&str, ScalarProbe)] = &[
    ("boolean", probe_boolean),
    ("integer", probe_integer),
    ("number", probe_number),
];

fn probe_boolean(text: &str) -> Option<Scalar> {
    if text.eq_ignore_ascii_case("true") {
        Some(Scalar::Boolean(true))
    } else if text.eq_ignore_ascii_case("false") {
        Some(Scalar::Boolean(false))
    } else {
        None
    }
}

fn probe_integer(text: &str) -> Option<Scalar> {
    text.trim().parse().ok().map(Scalar::Integer)
}

fn probe_number(text: &str) -> Option<Scalar> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .map(Scalar::Number)
}

impl Scalar {
    /// Classifies leaf text by running [`SCALAR_PROBES`], falling back to a string.
    pub fn parse(text: &str) -> Self {
        SCALAR_PROBES
            .iter()
            .find_map(|(name, probe)| {
                let scalar = probe(text)?;
                trace!("leaf `{text}` parsed as {name}");
                Some(scalar)
            })
            .unwrap_or_else(|| Self::String(text.to_owned()))
    }

    fn into_guest(self, lua: &Lua) -> mlua::Result<Value> {
        Ok(match self {
            Self::Boolean(flag) => Value::Boolean(flag),
            Self::Integer(number) => Value::Integer(number),
            Self::Number(number) => Value::Number(number),
            Self::String(text) => Value::String(lua.create_string(&text)?),
        })
    }
}

/// The guest values a tree can be built from.
#[derive(Debug, Clone)]
pub enum GuestValue {
    /// A boolean.
    Boolean(bool),
    /// An integer.
    Integer(i64),
    /// A float.
    Number(f64),
    /// A string, decoded lossily.
    String(String),
    /// A nested table.
    Table(Table),
    /// Any other guest type, by name.
    Unsupported(&'static str),
}

impl GuestValue {
    /// Classifies a guest value.
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Boolean(flag) => Self::Boolean(flag),
            Value::Integer(number) => Self::Integer(number),
            Value::Number(number) => Self::Number(number),
            Value::String(text) => Self::String(text.to_string_lossy().to_string()),
            Value::Table(table) => Self::Table(table),
            other => Self::Unsupported(other.type_name()),
        }
    }
}

/// Text of a float leaf. Integral floats keep a fractional part so they read
/// back as floats.
fn float_text(number: f64) -> String {
    let text = number.to_string();
    if number.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

/// Builds a guest table from `tree`.
///
/// Elements fill the sequence part in order and named children become string
/// keys. Leaves turn into booleans, numbers or strings through [`SCALAR_PROBES`].
pub fn tree_to_guest(lua: &Lua, tree: &Tree) -> mlua::Result<Table> {
    let elements = tree.elements().count();
    let named = tree.children().len() - elements;
    let table = lua.create_table_with_capacity(elements, named)?;

    let mut index: i64 = 0;
    for (key, child) in tree.children() {
        let value = node_to_guest(lua, child)?;
        if key.is_empty() {
            index += 1;
            table.raw_set(index, value)?;
        } else {
            table.raw_set(key.as_str(), value)?;
        }
    }
    Ok(table)
}

fn node_to_guest(lua: &Lua, node: &Tree) -> mlua::Result<Value> {
    if node.is_leaf() {
        Scalar::parse(node.data()).into_guest(lua)
    } else {
        tree_to_guest(lua, node).map(Value::Table)
    }
}

/// Builds a tree from a guest table, logging and skipping unsupported values.
pub fn guest_to_tree(table: &Table) -> mlua::Result<Tree> {
    guest_to_tree_with_warnings(table).map(|(tree, _)| tree)
}

/// Like [`guest_to_tree`], also returning every warning that was logged.
///
/// Named children are sorted by key and come first, followed by the sequence
/// `1..=len` as elements.
pub fn guest_to_tree_with_warnings(table: &Table) -> mlua::Result<(Tree, Vec<MarshalWarning>)> {
    let mut converter = Converter::default();
    let tree = converter.table(table, 0)?;
    Ok((tree, converter.warnings))
}

#[derive(Default)]
struct Converter {
    warnings: Vec<MarshalWarning>,
}

impl Converter {
    fn warn(&mut self, warning: MarshalWarning) {
        warn!("TreeMarshaler: {warning}");
        self.warnings.push(warning);
    }

    fn table(&mut self, table: &Table, depth: usize) -> mlua::Result<Tree> {
        let len = table.raw_len();
        let mut tree = Tree::new();

        let mut named = Vec::new();
        for pair in table.clone().pairs::<Value, Value>() {
            let (key, value) = pair?;
            match key {
                Value::String(key) => {
                    let key = key.to_string_lossy().to_string();
                    if let Some(child) = self.value(value, &key, depth)? {
                        named.push((key, child));
                    }
                }
                Value::Integer(index) => {
                    let in_sequence = usize::try_from(index).is_ok_and(|i| (1..=len).contains(&i));
                    if !in_sequence {
                        self.warn(MarshalWarning::OutOfSequence { index, len });
                    }
                }
                other => self.warn(MarshalWarning::UnsupportedKey {
                    type_name: other.type_name(),
                }),
            }
        }
        named.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (key, child) in named {
            tree.push(key, child);
        }

        for index in 1..=len {
            let value = table.raw_get::<Value>(index)?;
            if let Some(child) = self.value(value, &format!("[{index}]"), depth)? {
                tree.push_element(child);
            }
        }
        Ok(tree)
    }

    fn value(&mut self, value: Value, key: &str, depth: usize) -> mlua::Result<Option<Tree>> {
        let node = match GuestValue::classify(value) {
            GuestValue::Boolean(flag) => Tree::leaf(flag.to_string()),
            GuestValue::Integer(number) => Tree::leaf(number.to_string()),
            GuestValue::Number(number) => Tree::leaf(float_text(number)),
            GuestValue::String(text) => Tree::leaf(text),
            GuestValue::Table(_) if depth >= MAX_DEPTH => {
                self.warn(MarshalWarning::DepthExceeded {
                    key: key.to_owned(),
                    limit: MAX_DEPTH,
                });
                return Ok(None);
            }
            GuestValue::Table(nested) => self.table(&nested, depth + 1)?,
            GuestValue::Unsupported(type_name) => {
                self.warn(MarshalWarning::UnsupportedValue {
                    key: key.to_owned(),
                    type_name,
                });
                return Ok(None);
            }
        };
        Ok(Some(node))
    }
}
