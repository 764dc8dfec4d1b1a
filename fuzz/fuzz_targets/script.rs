#![no_main]

use cilhook::script::PatchScript;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = PatchScript::parse(text);
    }
});
