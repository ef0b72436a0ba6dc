#![no_main]
use heatlink::adapter::luxtronik::{decode_frame, slice_values};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Whole response frames, including truncated and oversized ones
    if let Ok(values) = decode_frame(data) {
        let _ = slice_values(&values, 15, 2);
        let _ = slice_values(&values, u16::MAX, u16::MAX);
    }
});
