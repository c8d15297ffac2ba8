//! Inheritance resolution: materialize each class's effective property map.
//!
//! Bodies are replayed in source order onto an accumulator that starts as a
//! copy of the base class's resolved map. `Property` entries insert or
//! overwrite, `Delete` entries remove (a missing name is a no-op), nested
//! class definitions are resolved recursively and inserted as
//! [`Property::Class`].
//!
//! A base is looked up by name in the working map of the enclosing body
//! (earlier siblings and inherited sub-classes), then in each enclosing scope
//! outward, then in the optional external [`ClassLookup`]. Only classes that
//! are already materialized are visible, so a reference to a later sibling
//! is not found. Unfound bases never fail resolution: the class is marked
//! [`BaseState::Missing`] (or [`BaseState::Cyclic`] when it names itself or
//! an enclosing class) and keeps its own properties. A class that inherits
//! from such an incomplete class is [`BaseState::Partial`].
//! [`ResolvedTree::complete`] re-bases both kinds once the missing base
//! becomes available.

use crate::ast::{ClassNode, Document, Entry};
use crate::value::{Property, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Flattened name → property mapping, in insertion order.
pub type PropertyMap = IndexMap<String, Property>;

/// How a class's base name was (or was not) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseState {
    /// Found in the same document.
    Local,
    /// Found in the same document, but that class still waits on an
    /// unresolved base of its own.
    Partial,
    /// Supplied by the external lookup.
    External,
    /// Not found anywhere.
    Missing,
    /// Names the class itself or a class that encloses it.
    Cyclic,
}

impl BaseState {
    /// A base class was found. `Partial` counts: its map is usable, if short.
    pub fn is_resolved(self) -> bool {
        matches!(self, BaseState::Local | BaseState::External | BaseState::Partial)
    }

    /// Nothing further can change the inherited part of the map.
    pub fn is_settled(self) -> bool {
        matches!(self, BaseState::Local | BaseState::External)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaseRef {
    pub name: String,
    pub state: BaseState,
}

/// A class with inheritance and delete/override operations applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedClass {
    pub name: String,
    pub base: Option<BaseRef>,
    pub properties: PropertyMap,
    /// Names deleted in the body while the inherited map was incomplete.
    /// Applied to the base map when the base is completed; empty otherwise.
    pub pending_deletes: Vec<String>,
}

impl ResolvedClass {
    pub fn new(name: impl Into<String>) -> Self {
        ResolvedClass { name: name.into(), ..Default::default() }
    }

    pub fn base_unresolved(&self) -> bool {
        self.base.as_ref().is_some_and(|b| !b.state.is_resolved())
    }

    /// The base chain is unresolved somewhere, so [`ResolvedTree::complete`]
    /// may still add inherited properties.
    pub fn is_incomplete(&self) -> bool {
        self.base.as_ref().is_some_and(|b| !b.state.is_settled())
    }

    /// Look up a property by path relative to this class.
    pub fn get(&self, path: &[&str]) -> Option<&Property> {
        let (first, rest) = path.split_first()?;
        let prop = self.properties.get(*first)?;
        if rest.is_empty() {
            Some(prop)
        } else {
            prop.as_class()?.get(rest)
        }
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).and_then(Property::as_value)
    }

    pub fn class(&self, name: &str) -> Option<&ResolvedClass> {
        self.properties.get(name).and_then(Property::as_class)
    }

    /// Direct sub-classes in map order.
    pub fn classes(&self) -> impl Iterator<Item = &ResolvedClass> {
        self.properties.values().filter_map(Property::as_class)
    }

    /// Same flattened maps, recursively. Base metadata, pending deletes and
    /// map order are ignored.
    pub fn equivalent(&self, other: &ResolvedClass) -> bool {
        self.properties.len() == other.properties.len()
            && self.properties.iter().all(|(name, prop)| {
                match (prop, other.properties.get(name)) {
                    (Property::Value(a), Some(Property::Value(b))) => a == b,
                    (Property::Class(a), Some(Property::Class(b))) => a.equivalent(b),
                    _ => false,
                }
            })
    }

    fn collect_warnings(&self, path: &mut Vec<String>, out: &mut Vec<UnresolvedBaseWarning>) {
        if let Some(base) = self.base.as_ref().filter(|b| !b.state.is_resolved()) {
            out.push(UnresolvedBaseWarning {
                path: path.clone(),
                base: base.name.clone(),
                state: base.state,
            });
        }
        for class in self.classes() {
            path.push(class.name.clone());
            class.collect_warnings(path, out);
            path.pop();
        }
    }

    /// Re-base this class if its base can now be found, then its sub-classes.
    /// `scopes` are the enclosing maps, each visible up to the paired index.
    fn complete_in(
        &mut self,
        scopes: &[(&PropertyMap, usize)],
        lookup: &dyn ClassLookup,
    ) -> usize {
        let mut count = 0;
        let found = match &self.base {
            Some(base) if base.state == BaseState::Missing => lookup
                .lookup(&base.name)
                .map(|class| (BaseState::External, class.properties.clone())),
            Some(base) if base.state == BaseState::Partial => {
                scope_class(scopes, &base.name).map(|class| {
                    let state =
                        if class.is_incomplete() { BaseState::Partial } else { BaseState::Local };
                    (state, class.properties.clone())
                })
            }
            _ => None,
        };
        if let (Some((state, mut merged)), Some(base)) = (found, self.base.as_mut()) {
            for name in &self.pending_deletes {
                merged.shift_remove(name);
            }
            for (name, prop) in std::mem::take(&mut self.properties) {
                merged.insert(name, prop);
            }
            debug!(class = %self.name, base = %base.name, ?state, "late base applied");
            self.properties = merged;
            if state.is_settled() {
                self.pending_deletes.clear();
                count += 1;
            }
            base.state = state;
        }

        for i in 0..self.properties.len() {
            let mut child = match self.properties.get_index_mut(i) {
                Some((_, Property::Class(class))) => std::mem::take(class),
                _ => continue,
            };
            let mut inner = scopes.to_vec();
            inner.push((&self.properties, i));
            count += child.complete_in(&inner, lookup);
            if let Some((_, slot)) = self.properties.get_index_mut(i) {
                *slot = Property::Class(child);
            }
        }
        count
    }
}

/// Innermost class named `name` among the visible prefixes of `scopes`.
fn scope_class<'s>(scopes: &[(&'s PropertyMap, usize)], name: &str) -> Option<&'s ResolvedClass> {
    scopes.iter().rev().find_map(|&(map, visible)| match map.get_full(name) {
        Some((index, _, Property::Class(class))) if index < visible => Some(class),
        _ => None,
    })
}

/// Resolved form of a whole document. The root is the document scope (empty name).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedTree {
    pub root: ResolvedClass,
}

impl ResolvedTree {
    pub fn get(&self, path: &[&str]) -> Option<&Property> {
        self.root.get(path)
    }

    /// Top-level class definitions.
    pub fn classes(&self) -> impl Iterator<Item = &ResolvedClass> {
        self.root.classes()
    }

    pub fn equivalent(&self, other: &ResolvedTree) -> bool {
        self.root.equivalent(&other.root)
    }

    /// Every class whose base is unresolved, depth-first in map order.
    pub fn warnings(&self) -> Vec<UnresolvedBaseWarning> {
        let mut out = Vec::new();
        self.root.collect_warnings(&mut Vec::new(), &mut out);
        out
    }

    /// Re-base classes whose base was missing and is now supplied by `lookup`,
    /// then every class that inherited from one of them. Returns how many
    /// classes ended up with a settled base.
    ///
    /// The result matches resolving the document with `lookup` from the start.
    pub fn complete(&mut self, lookup: &dyn ClassLookup) -> usize {
        let count = self.root.complete_in(&[], lookup);
        debug!(completed = count, remaining = self.warnings().len(), "completion pass");
        count
    }
}

/// Non-fatal outcome: a class refers to a base that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedBaseWarning {
    /// Class names from the top level down to the affected class.
    pub path: Vec<String>,
    pub base: String,
    pub state: BaseState,
}

impl fmt::Display for UnresolvedBaseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.state {
            BaseState::Cyclic => "which refers back to itself",
            _ => "which was not found",
        };
        write!(f, "class `{}` inherits `{}`, {}", self.path.join("/"), self.base, what)
    }
}

/// Source of base classes that live outside the document being resolved.
pub trait ClassLookup {
    fn lookup(&self, name: &str) -> Option<&ResolvedClass>;
}

impl ClassLookup for ResolvedClass {
    fn lookup(&self, name: &str) -> Option<&ResolvedClass> {
        self.class(name)
    }
}

/// A resolved document serves its top-level classes.
impl ClassLookup for ResolvedTree {
    fn lookup(&self, name: &str) -> Option<&ResolvedClass> {
        self.root.class(name)
    }
}

impl ClassLookup for HashMap<String, ResolvedClass> {
    fn lookup(&self, name: &str) -> Option<&ResolvedClass> {
        self.get(name)
    }
}

impl ClassLookup for IndexMap<String, ResolvedClass> {
    fn lookup(&self, name: &str) -> Option<&ResolvedClass> {
        self.get(name)
    }
}

/// Searches each catalog in order.
impl<T: ClassLookup> ClassLookup for [T] {
    fn lookup(&self, name: &str) -> Option<&ResolvedClass> {
        self.iter().find_map(|catalog| catalog.lookup(name))
    }
}

/// Resolve with no external lookup.
pub fn resolve(document: &Document) -> ResolvedTree {
    Resolver::new().resolve(document)
}

/// Resolve, falling back to `lookup` for bases not found in the document.
pub fn resolve_with(document: &Document, lookup: &dyn ClassLookup) -> ResolvedTree {
    Resolver::with_lookup(lookup).resolve(document)
}

#[derive(Clone, Copy, Default)]
pub struct Resolver<'a> {
    lookup: Option<&'a dyn ClassLookup>,
}

impl<'a> Resolver<'a> {
    pub fn new() -> Self {
        Resolver { lookup: None }
    }

    pub fn with_lookup(lookup: &'a dyn ClassLookup) -> Self {
        Resolver { lookup: Some(lookup) }
    }

    pub fn resolve(&self, document: &Document) -> ResolvedTree {
        let mut path = Vec::new();
        let (properties, _) =
            self.resolve_body(&document.entries, PropertyMap::new(), &[], &mut path, false);
        ResolvedTree { root: ResolvedClass { properties, ..Default::default() } }
    }

    fn resolve_body(
        &self,
        entries: &[Entry],
        mut map: PropertyMap,
        scopes: &[&PropertyMap],
        path: &mut Vec<String>,
        track_deletes: bool,
    ) -> (PropertyMap, Vec<String>) {
        let mut pending = Vec::new();
        for entry in entries {
            match entry {
                Entry::Property { name, value, .. } => {
                    map.insert(name.clone(), Property::Value(value.clone()));
                }
                Entry::Delete { name, .. } => {
                    if map.shift_remove(name).is_none() {
                        debug!(scope = %path.join("/"), name = %name, "delete of undefined property");
                    }
                    if track_deletes && !pending.contains(name) {
                        pending.push(name.clone());
                    }
                }
                Entry::Class(node) if node.is_forward() => {}
                Entry::Class(node) => {
                    let class = {
                        let mut inner: Vec<&PropertyMap> = scopes.to_vec();
                        inner.push(&map);
                        self.resolve_class(node, &inner, path)
                    };
                    map.insert(node.name.clone(), Property::Class(class));
                }
            }
        }
        (map, pending)
    }

    fn resolve_class(
        &self,
        node: &ClassNode,
        scopes: &[&PropertyMap],
        path: &mut Vec<String>,
    ) -> ResolvedClass {
        path.push(node.name.clone());
        let (base, inherited) = match &node.base {
            Some(name) => {
                let (state, inherited) = self.find_base(name, scopes, path);
                (Some(BaseRef { name: name.clone(), state }), inherited)
            }
            None => (None, PropertyMap::new()),
        };
        let incomplete = base.as_ref().is_some_and(|b| !b.state.is_settled());
        let (properties, pending_deletes) =
            self.resolve_body(node.entries(), inherited, scopes, path, incomplete);
        path.pop();
        ResolvedClass { name: node.name.clone(), base, properties, pending_deletes }
    }

    fn find_base(
        &self,
        name: &str,
        scopes: &[&PropertyMap],
        path: &[String],
    ) -> (BaseState, PropertyMap) {
        for scope in scopes.iter().rev() {
            if let Some(Property::Class(base)) = scope.get(name) {
                let state = if base.is_incomplete() { BaseState::Partial } else { BaseState::Local };
                return (state, base.properties.clone());
            }
        }
        if let Some(base) = self.lookup.and_then(|l| l.lookup(name)) {
            debug!(class = %path.join("/"), base = %name, "base supplied by external lookup");
            return (BaseState::External, base.properties.clone());
        }
        let state = if path.iter().any(|p| p == name) {
            BaseState::Cyclic
        } else {
            BaseState::Missing
        };
        warn!(class = %path.join("/"), base = %name, ?state, "base class unresolved");
        (state, PropertyMap::new())
    }
}
