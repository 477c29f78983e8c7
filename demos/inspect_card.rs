//! Print the character card embedded in a PNG
//!
//! Run with: cargo run --example inspect_card -- <file.png>
//! Set RUST_LOG=chara_io=debug to see why a file was rejected.

use chara_io::{CardExtractor, ExtractOptions, SourceBytes, MAX_SOURCE_SIZE};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: inspect_card <file.png>");
        std::process::exit(2);
    };

    let bytes: SourceBytes = chara_io::read_path(&path, MAX_SOURCE_SIZE)?;
    println!("{path}: {} bytes", bytes.len());

    let extractor = CardExtractor::new(ExtractOptions::default());
    println!("Strategies: {:?}", extractor.strategies());

    match extractor.extract_detailed(&bytes) {
        Ok(extraction) => {
            let card = &extraction.card;
            println!("Found {} card via {}", card.spec(), extraction.strategy);
            println!("  name:         {}", card.name());
            println!("  spec_version: {}", card.spec_version());
            if let Some(creator) = &card.data().creator {
                println!("  creator:      {creator}");
            }
            if !card.data().tags.is_empty() {
                println!("  tags:         {}", card.data().tags.join(", "));
            }
            println!("{}", serde_json::to_string_pretty(card)?);
        }
        Err(e) => {
            println!("File does not contain valid character data ({e})");
        }
    }

    Ok(())
}
