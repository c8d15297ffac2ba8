//! Render document and resolved trees back to config text.
//!
//! Output is tab-indented, one statement per line, in source order for
//! documents and map order for resolved trees. Resolved classes are written
//! flattened: a class whose base resolved is emitted without it, since its map
//! already contains the inherited properties. A class whose base is
//! unresolved keeps the base name and its pending deletes, so resolving the
//! text again lands in the same state.
//!
//! A class copied out of its base can carry an unresolved base name that the
//! new location would find (`class A { class S : A {}; }; class B : A {};`
//! gives `B/S : A`). Writing that name would make the resolver pick up a
//! base the tree never had, so such a class is written flattened too. The
//! emitter tracks which class names are visible at each point the same way
//! the resolver does: earlier entries of every enclosing body.

use crate::ast::{ClassNode, Document, Entry};
use crate::resolve::{PropertyMap, ResolvedClass, ResolvedTree};
use crate::value::{Property, Value};

/// Anything that can be written as config text.
pub trait Emit {
    fn emit_into(&self, out: &mut Emitter);
}

/// Render `item` as config text.
pub fn emit<T: Emit + ?Sized>(item: &T) -> String {
    let mut out = Emitter::default();
    item.emit_into(&mut out);
    out.finish()
}

#[derive(Debug, Default)]
pub struct Emitter {
    out: String,
    depth: usize,
}

impl Emitter {
    pub fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push('\t');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn property(&mut self, name: &str, value: &Value) {
        let marker = if matches!(value, Value::Array(_)) { "[]" } else { "" };
        self.line(&format!("{}{}={};", name, marker, format_value(value)));
    }

    fn class_block(&mut self, header: &str, body: impl FnOnce(&mut Emitter)) {
        self.line(header);
        self.line("{");
        self.depth += 1;
        body(self);
        self.depth -= 1;
        self.line("};");
    }
}

fn class_header(name: &str, base: Option<&str>) -> String {
    match base {
        Some(base) => format!("class {} : {}", name, base),
        None => format!("class {}", name),
    }
}

/// Inline text for a value: `1`, `0.5`, `"text"`, `{1,"a",{2}}`.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Int(x) => x.to_string(),
        Value::Float(x) => format_float(*x),
        Value::String(s) => quote(s),
        Value::Array(elements) => format!(
            "{{{}}}",
            elements.iter().map(format_value).collect::<Vec<_>>().join(",")
        ),
    }
}

/// Shortest text that reads back to the same f32 and still lexes as a float.
pub fn format_float(x: f32) -> String {
    // Debug keeps a `.0` or exponent on integral values, unlike Display.
    format!("{:?}", x)
}

/// Quote a string: embedded quotes are doubled, newlines become `" \n "` joins.
pub fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\"").replace('\n', "\" \\n \""))
}

impl Emit for Document {
    fn emit_into(&self, out: &mut Emitter) {
        for entry in &self.entries {
            entry.emit_into(out);
        }
    }
}

impl Emit for Entry {
    fn emit_into(&self, out: &mut Emitter) {
        match self {
            Entry::Property { name, value, .. } => out.property(name, value),
            Entry::Class(class) => class.emit_into(out),
            Entry::Delete { name, .. } => out.line(&format!("delete {};", name)),
        }
    }
}

impl Emit for ClassNode {
    fn emit_into(&self, out: &mut Emitter) {
        let header = class_header(&self.name, self.base.as_deref());
        match &self.body {
            None => out.line(&format!("{};", header)),
            Some(entries) => out.class_block(&header, |out| {
                for entry in entries {
                    entry.emit_into(out);
                }
            }),
        }
    }
}

impl Emit for ResolvedTree {
    fn emit_into(&self, out: &mut Emitter) {
        emit_resolved_body(&self.root, false, &[], out);
    }
}

impl Emit for ResolvedClass {
    fn emit_into(&self, out: &mut Emitter) {
        emit_resolved_class(&self.name, self, &[], out);
    }
}

/// Enclosing bodies, each visible up to the paired index.
type Scopes<'a> = [(&'a PropertyMap, usize)];

fn visible(scopes: &Scopes<'_>, name: &str) -> bool {
    scopes.iter().any(|&(map, limit)| {
        matches!(map.get_full(name), Some((index, _, Property::Class(_))) if index < limit)
    })
}

fn emit_resolved_class(
    name: &str,
    class: &ResolvedClass,
    scopes: &Scopes<'_>,
    out: &mut Emitter,
) {
    let base = class
        .base
        .as_ref()
        .filter(|b| !b.state.is_resolved() && !visible(scopes, &b.name))
        .map(|b| b.name.as_str());
    out.class_block(&class_header(name, base), |out| {
        emit_resolved_body(class, base.is_some(), scopes, out)
    });
}

fn emit_resolved_body(
    class: &ResolvedClass,
    with_deletes: bool,
    scopes: &Scopes<'_>,
    out: &mut Emitter,
) {
    // Pending deletes first: they only ever target inherited names.
    if with_deletes {
        for name in &class.pending_deletes {
            out.line(&format!("delete {};", name));
        }
    }
    for (index, (name, prop)) in class.properties.iter().enumerate() {
        match prop {
            Property::Value(value) => out.property(name, value),
            Property::Class(nested) => {
                let mut inner = scopes.to_vec();
                inner.push((&class.properties, index));
                emit_resolved_class(name, nested, &inner, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_keep_a_float_shape() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.2617994), "0.2617994");
        assert!(format_float(-6.6123903e-8).contains('e'));
    }

    #[test]
    fn strings_are_requoted() {
        assert_eq!(quote("say \"hi\""), r#""say ""hi""""#);
        assert_eq!(quote("a\nb"), "\"a\" \\n \"b\"");
    }

    #[test]
    fn nested_class_written_under_its_key() {
        let mut tree = ResolvedTree::default();
        tree.root.properties.insert("Key".into(), Property::Class(ResolvedClass::new("Other")));
        assert_eq!(emit(&tree), "class Key\n{\n};\n");
    }

    #[test]
    fn base_visible_at_copy_site_is_dropped() {
        let tree = crate::resolve::resolve(
            &crate::parser::parse("class A { class S : A { delete x; }; }; class B : A {};").unwrap(),
        );
        let text = emit(&tree);
        assert!(text.contains("class A\n{\n\tclass S : A\n\t{\n\t\tdelete x;\n"));
        assert!(text.contains("class B\n{\n\tclass S\n\t{\n\t};\n"));
    }

    #[test]
    fn nested_array_inline() {
        let v = Value::Array(vec![Value::Int(1), Value::Array(vec![Value::from("x")]), Value::Float(0.5)]);
        assert_eq!(format_value(&v), r#"{1,{"x"},0.5}"#);
    }
}
