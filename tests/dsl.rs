//! Config syntax tests: lexing, parse success/failure, and document lookups.

use cfgcodec::{parse, tokenize, Entry, LexError, ParseError, TokenKind, Value};

fn value_at(src: &str, path: &[&str]) -> Value {
    let doc = parse(src).expect("parse");
    doc.find(path).and_then(Entry::as_value).cloned().expect("property")
}

// ==================== Syntax: valid documents ====================

#[test]
fn parse_empty_document() {
    let doc = parse("").expect("empty document parses");
    assert!(doc.entries.is_empty());
    let doc = parse("  // only a comment\n/* and a block */\n").expect("comments only");
    assert!(doc.entries.is_empty());
}

#[test]
fn parse_scalar_properties() {
    let doc = parse("a=1; b=-2.5; c=\"text\"; d=0x1F; e=1e3;").expect("parse");
    assert_eq!(doc.entries.len(), 5);
    assert_eq!(doc.find(&["a"]).and_then(Entry::as_value), Some(&Value::Int(1)));
    assert_eq!(doc.find(&["b"]).and_then(Entry::as_value), Some(&Value::Float(-2.5)));
    assert_eq!(doc.find(&["c"]).and_then(Entry::as_value), Some(&Value::from("text")));
    assert_eq!(doc.find(&["d"]).and_then(Entry::as_value), Some(&Value::Int(31)));
    assert_eq!(doc.find(&["e"]).and_then(Entry::as_value), Some(&Value::Float(1000.0)));
}

#[test]
fn parse_booleans_as_ints() {
    assert_eq!(value_at("on=true;", &["on"]), Value::Int(1));
    assert_eq!(value_at("off=FALSE;", &["off"]), Value::Int(0));
}

#[test]
fn parse_arrays() {
    assert_eq!(
        value_at("pos[]={19379.848,63.36829,-1};", &["pos"]),
        Value::Array(vec![Value::Float(19379.848), Value::Float(63.36829), Value::Int(-1)])
    );
    assert_eq!(value_at("empty[]={};", &["empty"]), Value::Array(vec![]));
    assert_eq!(
        value_at("nested[] = { {1, 2}, {}, \"x\", };", &["nested"]),
        Value::Array(vec![
            Value::Array(vec![Value::Int(1), Value::Int(2)]),
            Value::Array(vec![]),
            Value::from("x"),
        ])
    );
}

#[test]
fn parse_array_marker_with_space() {
    assert_eq!(value_at("a [ ] = {1};", &["a"]), Value::Array(vec![Value::Int(1)]));
}

#[test]
fn parse_multiline_array() {
    let src = "addons[]=\n{\n\t\"gm_characters_ge_characters\"\n};";
    assert_eq!(value_at(src, &["addons"]), Value::Array(vec![Value::from("gm_characters_ge_characters")]));
}

#[test]
fn parse_class_forms() {
    let src = r#"
class Fwd;
class FwdWithBase : Fwd;
class Empty {};
class Child : Empty
{
    x = 1;
    delete y;
    class Inner { z = 2; };
};
"#;
    let doc = parse(src).expect("parse");
    let classes: Vec<_> = doc.classes().collect();
    assert_eq!(classes.len(), 4);

    assert!(classes[0].is_forward());
    assert_eq!(classes[0].base, None);
    assert!(classes[1].is_forward());
    assert_eq!(classes[1].base.as_deref(), Some("Fwd"));
    assert!(!classes[2].is_forward());
    assert!(classes[2].entries().is_empty());

    let child = classes[3];
    assert_eq!(child.base.as_deref(), Some("Empty"));
    assert_eq!(child.entries().len(), 3);
    assert!(child.entries()[1].is_delete());
    assert_eq!(child.entries()[1].name(), "y");
    assert_eq!(
        doc.find(&["Child", "Inner", "z"]).and_then(Entry::as_value),
        Some(&Value::Int(2))
    );
}

#[test]
fn keywords_are_case_insensitive_names_are_not() {
    let doc = parse("CLASS A { Delete b; };").expect("parse");
    assert!(doc.find(&["A", "b"]).is_some_and(Entry::is_delete));
    assert!(doc.find(&["a"]).is_none());
}

#[test]
fn find_descends_into_last_definition() {
    let doc = parse("class A { x = 1; }; class A; class A { x = 2; }; x = 3; x = 4;").expect("parse");
    assert_eq!(doc.find(&["A", "x"]).and_then(Entry::as_value), Some(&Value::Int(2)));
    assert_eq!(doc.find(&["x"]).and_then(Entry::as_value), Some(&Value::Int(4)));
    assert!(doc.find(&["A"]).and_then(Entry::as_class).is_some_and(|c| !c.is_forward()));
    assert!(doc.find(&[]).is_none());
}

#[test]
fn positions_are_recorded() {
    let doc = parse("a = 1;\n  class B\n{\n};").expect("parse");
    let b = doc.find(&["B"]).expect("B");
    assert_eq!((b.position().line, b.position().column), (2, 3));
}

#[test]
fn strings_with_quotes_and_newlines() {
    assert_eq!(value_at(r#"s="a ""quoted"" word";"#, &["s"]), Value::from("a \"quoted\" word"));
    assert_eq!(value_at("s=\"line1\" \\n \"line2\";", &["s"]), Value::from("line1\nline2"));
    assert_eq!(value_at("s=\"\";", &["s"]), Value::from(""));
}

#[test]
fn tokens_end_with_eof() {
    let tokens = tokenize("class X;").expect("lex");
    let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
    assert_eq!(
        kinds,
        vec![TokenKind::Class, TokenKind::Ident("X".into()), TokenKind::Symbol(';'), TokenKind::Eof]
    );
    assert_eq!(tokens[1].position.offset, 6);
}

#[test]
fn parse_tokens_matches_parse() {
    let src = "class A : B { x[] = {1, 2.5}; };";
    let tokens = tokenize(src).expect("lex");
    assert_eq!(cfgcodec::parser::parse_tokens(tokens).expect("parse"), parse(src).expect("parse"));
}

// ==================== Syntax: invalid documents ====================

fn parse_err(src: &str) -> ParseError {
    parse(src).expect_err("should fail")
}

#[test]
fn missing_semicolon_after_property() {
    let err = parse_err("a = 1\nb = 2;");
    assert!(matches!(err, ParseError::Unexpected { ref expected, .. } if expected == "`;`"));
    assert_eq!(err.position().line, 2);
}

#[test]
fn missing_semicolon_after_class() {
    let err = parse_err("class A {}\nclass B {};");
    assert!(matches!(err, ParseError::Unexpected { ref found, .. } if found.contains("class")));
}

#[test]
fn unclosed_class_body() {
    let err = parse_err("class A { x = 1;");
    assert!(matches!(err, ParseError::Unexpected { ref expected, .. } if expected == "`}`"));
}

#[test]
fn array_without_marker_is_rejected() {
    parse_err("a = {1, 2};");
}

#[test]
fn scalar_into_array_property_is_rejected() {
    parse_err("a[] = 1;");
}

#[test]
fn missing_comma_between_elements() {
    let err = parse_err("a[] = {1 2};");
    assert!(matches!(err, ParseError::Unexpected { ref expected, .. } if expected == "`,` or `}`"));
}

#[test]
fn delete_requires_name() {
    parse_err("delete ;");
    parse_err("delete 5;");
}

#[test]
fn keyword_cannot_be_property_name() {
    parse_err("class = 1;");
}

#[test]
fn stray_closing_brace() {
    parse_err("};");
}

#[test]
fn lex_errors_surface_through_parse() {
    let err = parse_err("a = \"open;");
    assert!(matches!(err, ParseError::Lex(LexError { .. })));
    assert_eq!(err.position().column, 5);

    let err = parse_err("a = 1;\nb = $;");
    assert!(matches!(err, ParseError::Lex(_)));
    assert_eq!((err.position().line, err.position().column), (2, 5));
}

#[test]
fn unterminated_block_comment() {
    let err = parse_err("a = 1; /* never closed");
    assert!(matches!(err, ParseError::Lex(_)));
}

#[test]
fn nesting_limit() {
    let depth = cfgcodec::codec::MAX_DEPTH + 1;
    let mut src = String::new();
    for _ in 0..depth {
        src.push_str("class A {");
    }
    for _ in 0..depth {
        src.push_str("};");
    }
    assert!(matches!(parse_err(&src), ParseError::TooDeep { .. }));

    let arrays = format!("a[]={}{};", "{".repeat(depth), "}".repeat(depth));
    assert!(matches!(parse_err(&arrays), ParseError::TooDeep { .. }));
}

#[test]
fn nesting_at_limit_is_accepted() {
    let depth = cfgcodec::codec::MAX_DEPTH;
    let src = format!("{}{}", "class A {".repeat(depth), "};".repeat(depth));
    parse(&src).expect("deepest accepted nesting");
}
