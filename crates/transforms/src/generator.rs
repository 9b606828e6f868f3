//! Collision-free identifier and string generation.
//!
//! One [`NameGenerator`] lives for a whole run. Every identifier it hands out
//! is remembered, so no two calls ever return the same name, and names that
//! already occur in the program can be reserved up front.

use indexmap::IndexSet;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shroud_core::lexer::{is_ident_continue, is_ident_start, is_identifier, utf16_len};
use shroud_utils::errors::GeneratorError;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Candidates tried before falling back to the dictionary strategy.
const MAX_ATTEMPTS: usize = 100;

/// How candidate strings are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Uniform characters from a fixed alphabet.
    #[default]
    Dictionary,
    /// Two or three words drawn from a line-delimited corpus.
    Wordlist,
}

impl Strategy {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Dictionary => "dictionary",
            Self::Wordlist => "wordlist",
        }
    }
}

impl FromStr for Strategy {
    type Err = GeneratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dictionary" | "fixed-dictionary" => Ok(Self::Dictionary),
            "wordlist" => Ok(Self::Wordlist),
            other => Err(GeneratorError::UnsupportedStrategy(other.to_string())),
        }
    }
}

/// Generator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub strategy: Strategy,
    /// Characters used by the dictionary strategy
    pub alphabet: String,
    /// Inclusive lower bound on generated length
    pub min_length: usize,
    /// Exclusive upper bound; equal to `min_length` means a fixed length
    pub max_length: usize,
    /// Corpus read by the wordlist strategy
    pub wordlist_path: Option<PathBuf>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Dictionary,
            alphabet: DEFAULT_ALPHABET.to_string(),
            min_length: 10,
            max_length: 10,
            wordlist_path: None,
        }
    }
}

/// Run-scoped generator state: the rng, every name returned so far, and the
/// wordlist corpus once it has been read.
#[derive(Debug)]
pub struct NameGenerator {
    config: GeneratorConfig,
    alphabet: Vec<char>,
    rng: StdRng,
    used: HashSet<String>,
    words: Option<IndexSet<String>>,
}

impl NameGenerator {
    pub fn new(config: GeneratorConfig, rng: StdRng) -> Result<Self, GeneratorError> {
        let alphabet: Vec<char> = config.alphabet.chars().collect();
        if !alphabet.iter().copied().any(is_ident_start) {
            return Err(GeneratorError::EmptyAlphabet);
        }
        if config.strategy == Strategy::Wordlist && config.wordlist_path.is_none() {
            return Err(GeneratorError::MissingWordlist);
        }
        Ok(Self {
            config,
            alphabet,
            rng,
            used: HashSet::new(),
            words: None,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Marks names as taken so they are never generated.
    pub fn reserve<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.used.extend(names.into_iter().map(Into::into));
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// Returns a valid identifier never returned before.
    ///
    /// Each call registers its result, so repeated calls always differ.
    pub fn identifier(&mut self) -> Result<String, GeneratorError> {
        for _ in 0..MAX_ATTEMPTS {
            let candidate = self.candidate()?;
            if is_identifier(&candidate) && !self.used.contains(&candidate) {
                self.used.insert(candidate.clone());
                return Ok(candidate);
            }
        }
        let name = self.dictionary_identifier();
        tracing::debug!("generator fell back to dictionary after {MAX_ATTEMPTS} attempts: {name}");
        self.used.insert(name.clone());
        Ok(name)
    }

    /// Returns a string built by the configured strategy with no validity or
    /// uniqueness requirement.
    pub fn random_string(&mut self) -> Result<String, GeneratorError> {
        self.candidate()
    }

    fn candidate(&mut self) -> Result<String, GeneratorError> {
        match self.config.strategy {
            Strategy::Dictionary => Ok(self.dictionary_candidate()),
            Strategy::Wordlist => self.wordlist_candidate(),
        }
    }

    fn length(&mut self) -> usize {
        let (min, max) = (self.config.min_length, self.config.max_length);
        if max > min {
            self.rng.random_range(min..max)
        } else {
            min
        }
    }

    fn dictionary_candidate(&mut self) -> String {
        let len = self.length();
        (0..len)
            .map(|_| self.alphabet[self.rng.random_range(0..self.alphabet.len())])
            .collect()
    }

    /// Dictionary strategy restricted to identifier characters, grown one
    /// character at a time until the result is free.
    fn dictionary_identifier(&mut self) -> String {
        let starts: Vec<char> = self.alphabet.iter().copied().filter(|c| is_ident_start(*c)).collect();
        let rest: Vec<char> = self
            .alphabet
            .iter()
            .copied()
            .filter(|c| is_ident_continue(*c))
            .collect();
        let target = self.length().max(1);

        let mut name = String::new();
        name.push(starts[self.rng.random_range(0..starts.len())]);
        while name.chars().count() < target {
            name.push(rest[self.rng.random_range(0..rest.len())]);
        }
        while !is_identifier(&name) || self.used.contains(&name) {
            name.push(rest[self.rng.random_range(0..rest.len())]);
        }
        name
    }

    fn wordlist_candidate(&mut self) -> Result<String, GeneratorError> {
        self.load_words()?;
        let Some(words) = self.words.as_ref() else {
            return Ok(self.dictionary_candidate());
        };
        let available: Vec<&String> = words.iter().filter(|w| !self.used.contains(*w)).collect();
        if available.len() < 2 {
            return Ok(self.dictionary_candidate());
        }

        let three = self.rng.random_range(0..3) == 0;
        let wanted = if three { 3 } else { 2 };
        let picked = rand::seq::index::sample(&mut self.rng, available.len(), wanted.min(available.len()));
        let parts: Vec<&str> = picked.iter().map(|i| available[i].as_str()).collect();
        Ok(parts.join(if three { "_" } else { "" }))
    }

    fn load_words(&mut self) -> Result<(), GeneratorError> {
        if self.words.is_some() {
            return Ok(());
        }
        let path = self
            .config
            .wordlist_path
            .as_ref()
            .ok_or(GeneratorError::MissingWordlist)?;
        let text = fs::read_to_string(path).map_err(|source| GeneratorError::WordlistRead {
            path: path.display().to_string(),
            source,
        })?;
        let words = corpus(&text, self.config.min_length, self.config.max_length);
        tracing::debug!("loaded {} words from {}", words.len(), path.display());
        self.words = Some(words);
        Ok(())
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Deduplicated corpus: every line made only of word characters, plus the
/// scrubbed form of every line whose length is in `[min, max)`.
fn corpus(text: &str, min: usize, max: usize) -> IndexSet<String> {
    let mut words = IndexSet::new();
    for line in text.lines() {
        if !line.is_empty() && line.chars().all(is_word_char) {
            words.insert(line.to_string());
        }
        let len = utf16_len(line);
        if len >= min && len < max {
            let scrubbed: String = line.chars().filter(|c| is_word_char(*c)).collect();
            if !scrubbed.is_empty() {
                words.insert(scrubbed);
            }
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn generator(config: GeneratorConfig, seed: u64) -> NameGenerator {
        NameGenerator::new(config, StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn fixed_length_names_stay_in_alphabet() {
        let alphabet = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";
        let mut gen = generator(
            GeneratorConfig {
                alphabet: alphabet.to_string(),
                min_length: 10,
                max_length: 10,
                ..Default::default()
            },
            7,
        );
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let name = gen.identifier().unwrap();
            assert_eq!(name.len(), 10);
            assert!(name.chars().all(|c| alphabet.contains(c)));
            assert!(is_identifier(&name));
            assert!(seen.insert(name));
        }
    }

    #[test]
    fn length_is_drawn_from_half_open_range() {
        let mut gen = generator(
            GeneratorConfig {
                min_length: 4,
                max_length: 8,
                ..Default::default()
            },
            1,
        );
        for _ in 0..200 {
            let len = gen.identifier().unwrap().len();
            assert!((4..8).contains(&len), "length {len}");
        }
    }

    #[test]
    fn reserved_names_are_never_returned() {
        let mut gen = generator(
            GeneratorConfig {
                alphabet: "AB".to_string(),
                min_length: 1,
                max_length: 1,
                ..Default::default()
            },
            3,
        );
        gen.reserve(["A"]);
        assert_eq!(gen.identifier().unwrap(), "B");
        let next = gen.identifier().unwrap();
        let last = gen.identifier().unwrap();
        assert!(next.len() >= 2 && last.len() >= 2);
        assert_ne!(next, last);
    }

    #[test]
    fn same_seed_same_names() {
        let mut a = generator(GeneratorConfig::default(), 42);
        let mut b = generator(GeneratorConfig::default(), 42);
        for _ in 0..20 {
            assert_eq!(a.identifier().unwrap(), b.identifier().unwrap());
        }
    }

    #[test]
    fn random_strings_are_not_registered() {
        let mut gen = generator(GeneratorConfig::default(), 9);
        let key = gen.random_string().unwrap();
        assert_eq!(key.len(), 10);
        assert_eq!(gen.used_count(), 0);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(matches!(
            "markov".parse::<Strategy>(),
            Err(GeneratorError::UnsupportedStrategy(name)) if name == "markov"
        ));
        assert_eq!("Wordlist".parse::<Strategy>().unwrap(), Strategy::Wordlist);
    }

    #[test]
    fn alphabet_without_identifier_start_is_rejected() {
        let config = GeneratorConfig {
            alphabet: "0123".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            NameGenerator::new(config, StdRng::seed_from_u64(0)),
            Err(GeneratorError::EmptyAlphabet)
        ));
    }

    #[test]
    fn corpus_keeps_clean_lines_and_scrubs_short_ones() {
        let words = corpus("apple\nbanana split\nkiwi!\napple\n\ncherry\r\n", 5, 7);
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        // "kiwi!" is five characters, so its scrubbed form is kept.
        assert_eq!(words, vec!["apple", "kiwi", "cherry"]);
    }

    #[test]
    fn wordlist_joins_two_or_three_words() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.txt");
        fs::write(&path, "alpha\nbravo\ncharlie\ndelta\necho\nfoxtrot\n").unwrap();
        let mut gen = generator(
            GeneratorConfig {
                strategy: Strategy::Wordlist,
                wordlist_path: Some(path),
                ..Default::default()
            },
            5,
        );
        let corpus = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"];
        let mut saw_underscore = false;
        for _ in 0..40 {
            let name = gen.identifier().unwrap();
            if name.contains('_') {
                saw_underscore = true;
                let parts: Vec<&str> = name.split('_').collect();
                assert_eq!(parts.len(), 3);
                assert!(parts.iter().all(|p| corpus.contains(p)));
            } else {
                assert!(corpus.iter().any(|w| name.starts_with(w)));
                assert!(corpus.iter().any(|w| name.ends_with(w)));
            }
        }
        assert!(saw_underscore);
    }

    #[test]
    fn tiny_wordlist_falls_back_to_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.txt");
        fs::write(&path, "lonely\n").unwrap();
        let mut gen = generator(
            GeneratorConfig {
                strategy: Strategy::Wordlist,
                wordlist_path: Some(path),
                ..Default::default()
            },
            11,
        );
        let name = gen.identifier().unwrap();
        assert_eq!(name.len(), 10);
        assert!(name.chars().all(|c| DEFAULT_ALPHABET.contains(c)));
    }

    #[test]
    fn missing_wordlist_file_is_an_error() {
        let mut gen = generator(
            GeneratorConfig {
                strategy: Strategy::Wordlist,
                wordlist_path: Some(PathBuf::from("/nonexistent/words.txt")),
                ..Default::default()
            },
            0,
        );
        assert!(matches!(gen.identifier(), Err(GeneratorError::WordlistRead { .. })));
    }
}
