//! Decoder fuzz target: arbitrary bytes must be rejected with an error, not a panic.
//! Whatever decodes must encode again.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let _ = cfgcodec::class_extent(data, &["a", "b"]);
    if let Ok(tree) = cfgcodec::decode(data) {
        let big_endian = data.get(4) == Some(&1);
        let codec = cfgcodec::Codec::new(if big_endian {
            cfgcodec::Endianness::Big
        } else {
            cfgcodec::Endianness::Little
        });
        assert!(codec.encode(&tree).is_ok());
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
