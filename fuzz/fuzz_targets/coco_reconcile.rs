//! Fuzz target for COCO category reconciliation of arbitrary documents.

#![no_main]

use libfuzzer_sys::fuzz_target;
use labelprep::reconcile::coco::fuzz_reconcile_coco;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };

    fuzz_reconcile_coco(json);
});
