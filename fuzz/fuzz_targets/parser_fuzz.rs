//! Parser fuzz target: arbitrary text through parse, resolve and emit.
//! Nothing may panic, and the emitted text must parse and resolve to the
//! same flattened maps.
//! Build with: cargo fuzz run parser_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    let Ok(doc) = cfgcodec::parse(s) else {
        return;
    };
    let tree = cfgcodec::resolve(&doc);
    let text = cfgcodec::emit(&tree);
    let again = match cfgcodec::parse(&text) {
        Ok(doc) => doc,
        // Copied sub-classes can nest deeper than the source did.
        Err(cfgcodec::ParseError::TooDeep { .. }) => return,
        Err(e) => panic!("emitted text does not parse: {e}\n{text}"),
    };
    assert!(cfgcodec::resolve(&again).equivalent(&tree), "round trip changed maps:\n{text}");
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parser_fuzz");
}
