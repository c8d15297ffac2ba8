//! Document tree: the unresolved result of parsing one config file.

use crate::lexer::Position;
use crate::value::Value;

/// Root of a parsed file: top-level entries in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub entries: Vec<Entry>,
}

/// One statement of a document or class body.
///
/// Bodies are an ordered log: a later `Property` or `Delete` with the same
/// name overrides an earlier one when the resolver replays it.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// `name = scalar;` or `name[] = {...};`
    Property { name: String, value: Value, position: Position },
    /// Class definition or forward declaration.
    Class(ClassNode),
    /// `delete name;`
    Delete { name: String, position: Position },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
    pub name: String,
    /// Base class name. Only a name here; the resolver looks it up.
    pub base: Option<String>,
    /// `None` for a forward declaration (`class X;`).
    pub body: Option<Vec<Entry>>,
    pub position: Position,
}

impl ClassNode {
    pub fn is_forward(&self) -> bool {
        self.body.is_none()
    }

    pub fn entries(&self) -> &[Entry] {
        self.body.as_deref().unwrap_or(&[])
    }

    /// Look up an entry by path relative to this class body.
    pub fn find(&self, path: &[&str]) -> Option<&Entry> {
        find_in(self.entries(), path)
    }
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Property { name, .. } | Entry::Delete { name, .. } => name,
            Entry::Class(class) => &class.name,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Entry::Property { position, .. } | Entry::Delete { position, .. } => *position,
            Entry::Class(class) => class.position,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Entry::Property { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassNode> {
        match self {
            Entry::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Entry::Delete { .. })
    }
}

impl Document {
    /// Look up an entry by path, e.g. `["Mission", "Intel", "year"]`.
    ///
    /// Each step descends into the last class definition with that name. The
    /// final step returns the last entry of any kind with that name (property,
    /// class, forward declaration or delete), matching replay order.
    pub fn find(&self, path: &[&str]) -> Option<&Entry> {
        find_in(&self.entries, path)
    }

    /// Top-level class definitions and forward declarations.
    pub fn classes(&self) -> impl Iterator<Item = &ClassNode> {
        self.entries.iter().filter_map(Entry::as_class)
    }
}

fn find_in<'a>(entries: &'a [Entry], path: &[&str]) -> Option<&'a Entry> {
    let (first, rest) = path.split_first()?;
    if rest.is_empty() {
        return entries.iter().rev().find(|e| e.name() == *first);
    }
    entries
        .iter()
        .rev()
        .filter_map(Entry::as_class)
        .find(|c| c.name == *first && !c.is_forward())
        .and_then(|c| find_in(c.entries(), rest))
}
