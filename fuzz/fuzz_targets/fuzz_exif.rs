#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // eXIf payloads are parsed without any PNG framing
    if let Some(value) = chara_io::parse_exif(data) {
        assert!(chara_io::is_character_card(&value));
    }
});
