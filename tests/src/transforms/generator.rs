use rand::rngs::StdRng;
use rand::SeedableRng;
use shroud_transform::generator::{GeneratorConfig, NameGenerator, Strategy};
use std::collections::HashSet;
use std::io::Write;

const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";

#[test]
fn fixed_length_names_stay_in_the_alphabet() {
    assert_eq!(ALPHABET.chars().count(), 37);
    let config = GeneratorConfig {
        strategy: Strategy::Dictionary,
        alphabet: ALPHABET.to_string(),
        min_length: 10,
        max_length: 10,
        wordlist_path: None,
    };
    let mut generator = NameGenerator::new(config, StdRng::seed_from_u64(37)).unwrap();
    let mut seen = HashSet::new();
    for _ in 0..2000 {
        let name = generator.identifier().unwrap();
        assert_eq!(name.chars().count(), 10);
        assert!(name.chars().all(|c| ALPHABET.contains(c)), "{name}");
        assert!(!name.starts_with(|c: char| c.is_ascii_digit()), "{name}");
        assert!(seen.insert(name));
    }
}

#[test]
fn wordlist_names_fall_back_when_words_run_out() {
    let mut corpus = tempfile::NamedTempFile::new().unwrap();
    writeln!(corpus, "amber\nbasil\ncedar").unwrap();
    let config = GeneratorConfig {
        strategy: Strategy::Wordlist,
        wordlist_path: Some(corpus.path().to_path_buf()),
        ..GeneratorConfig::default()
    };
    let mut generator = NameGenerator::new(config, StdRng::seed_from_u64(2)).unwrap();

    let first = generator.identifier().unwrap();
    assert!(["amber", "basil", "cedar"].iter().any(|w| first.contains(w)), "{first}");
    let mut seen = HashSet::from([first]);
    for _ in 0..20 {
        assert!(seen.insert(generator.identifier().unwrap()));
    }
}
