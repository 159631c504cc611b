#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = lattica_protocol::deserialize_message(data, *b"RX");
    let _ = lattica_protocol::deserialize_message(data, *b"RA");
});
