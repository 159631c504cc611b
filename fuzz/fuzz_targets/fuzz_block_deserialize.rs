#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(block) = lattica_blocks::Block::deserialize_with_type(data) {
        // A decoded block must re-serialize to the same bytes.
        let mut out = Vec::new();
        block.serialize_with_type(&mut out);
        assert_eq!(out, data);
    }
});
