#![no_main]

use cilhook::metadata::Module;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = Module::from_json("fuzz", data);
});
