#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic, only yield None
    let first = chara_io::extract_character_card(data);

    // Same input, same answer
    assert_eq!(first, chara_io::extract_character_card(data));

    // Whatever comes out has passed the validator
    if let Some(card) = first {
        let value = card.to_value().expect("card serializes");
        assert!(chara_io::is_character_card(&value));
    }

    // The chunk walk on its own
    if let Ok(chunks) = chara_io::read_chunks(data) {
        let _ = chara_io::decode_all_text_chunks(&chunks);
    }
});
