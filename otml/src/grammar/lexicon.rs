//! The learner's hypothesis about underlying representations: a multiset
//! of [`Word`]s forming a [`Lexicon`].

use std::collections::BTreeSet;

use rand::Rng;

use crate::features::{FeatureTable, Segment};
use crate::fst::{Arc, CostVector, Transducer};

/// A single underlying-representation word: an ordered sequence of
/// segments. Segmentation is one segment per character, matching the
/// corpus format's plain strings (spec.md §6).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Word {
    segments: Vec<Segment>,
}

impl Word {
    /// Builds a word from a segment sequence.
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Parses a word from its surface-style string form, one segment per
    /// character.
    pub fn from_str(s: &str) -> Self {
        Self {
            segments: s.chars().map(|c| Segment::concrete(c.to_string())).collect(),
        }
    }

    /// The word's segment sequence.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the word has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Renders the word back to its surface-style string form.
    pub fn to_key(&self) -> String {
        self.segments.iter().map(|s| s.symbol()).collect()
    }

    /// Builds the word's input transducer: one state per input position
    /// (`len() + 1` states), `NULL→JOKER` self-loops at every state
    /// allowing epenthesis, and `segment→JOKER` transitions advancing
    /// position, per spec.md §4.3.
    pub fn input_transducer(&self) -> Transducer {
        let mut t = Transducer::new(Vec::new(), 0);
        let states: Vec<_> = (0..=self.segments.len()).map(|_| t.add_state()).collect();
        t.set_initial(states[0]);
        t.add_final(*states.last().unwrap());
        for &s in &states {
            t.add_arc(Arc::new(s, Segment::null(), Segment::joker(), CostVector::empty(), s))
                .expect("width-0 arc always matches a width-0 transducer");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            t.add_arc(Arc::new(
                states[i],
                segment.clone(),
                Segment::joker(),
                CostVector::empty(),
                states[i + 1],
            ))
            .expect("width-0 arc always matches a width-0 transducer");
        }
        t
    }

    fn insert_segment(&mut self, position: usize, segment: Segment) {
        self.segments.insert(position.min(self.segments.len()), segment);
    }

    fn delete_segment(&mut self, position: usize) {
        if position < self.segments.len() {
            self.segments.remove(position);
        }
    }

    fn change_segment(&mut self, position: usize, segment: Segment) {
        if let Some(slot) = self.segments.get_mut(position) {
            *slot = segment;
        }
    }

    /// The MDL encoding length of this word's body, `Σ segment_encoding`,
    /// under `segment_bits` bits per segment (spec.md §4.4's
    /// `word_encoding = Σ segment_encoding + 1`; the `+1` stop symbol is
    /// added by the caller).
    fn body_encoding_length(&self, segment_bits: usize) -> usize {
        self.segments.len() * segment_bits
    }
}

/// The learner's current hypothesis about underlying representations: a
/// multiset of [`Word`]s (duplicates are meaningful and preserved).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Lexicon {
    words: Vec<Word>,
}

impl Lexicon {
    /// Builds a lexicon from an initial word list.
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }

    /// The lexicon's words, in insertion order.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// The number of words, counting duplicates.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the lexicon holds no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The number of distinct words (by surface-string key), used as `L`
    /// in the data-length scorer (spec.md §4.4).
    pub fn get_number_of_distinct_words(&self) -> usize {
        self.words.iter().map(Word::to_key).collect::<BTreeSet<_>>().len()
    }

    /// The set of distinct segments appearing anywhere in the lexicon,
    /// used as `A'` in the `restriction_on_alphabet` encoding branch.
    pub fn get_distinct_segments(&self) -> BTreeSet<Segment> {
        self.words.iter().flat_map(|w| w.segments().iter().cloned()).collect()
    }

    /// The lexicon's MDL encoding length (spec.md §4.4).
    ///
    /// Under `restriction_on_alphabet`, the grammar additionally encodes
    /// *which* segments of the full alphabet the lexicon restricts itself
    /// to: `ceil(log2(A+1))·(A'+1) + ceil(log2(A'+1))·(Σ(|word|+1) + 1)`
    /// where `A` is the full alphabet size and `A'` the distinct-segments
    /// count. Otherwise each word is encoded independently against the
    /// full alphabet: `2·(Σ(word_encoding) + 1)` with
    /// `word_encoding = Σ segment_encoding + 1`.
    pub fn encoding_length(&self, table: &FeatureTable, restriction_on_alphabet: bool) -> usize {
        let full_alphabet_size = table.alphabet().len();
        if restriction_on_alphabet {
            let distinct = self.get_distinct_segments().len();
            let bits_a = log2_ceil(full_alphabet_size + 1);
            let bits_a_prime = log2_ceil(distinct + 1);
            let total_positions: usize = self.words.iter().map(|w| w.len() + 1).sum();
            bits_a * (distinct + 1) + bits_a_prime * (total_positions + 1)
        } else {
            let segment_bits = log2_ceil(full_alphabet_size + 1);
            let words_length: usize = self
                .words
                .iter()
                .map(|w| w.body_encoding_length(segment_bits) + 1)
                .sum();
            2 * (words_length + 1)
        }
    }

    /// Delegated mutation interface (spec.md §4.3). Each mutation is
    /// weighted-random at the `Grammar` level; these methods perform one
    /// concrete attempt and report success.

    /// Inserts a random alphabet segment at a random position in a random
    /// word, or starts a new monosegmental word with probability
    /// `1/(n+1)` where `n` is the current word count.
    pub fn insert_segment(&mut self, rng: &mut impl Rng, table: &FeatureTable) -> bool {
        let alphabet = table.alphabet();
        if alphabet.is_empty() {
            return false;
        }
        let n = self.words.len();
        let segment = Segment::concrete(alphabet[rng.gen_range(0..alphabet.len())]);
        if rng.gen_range(0..=n) == 0 {
            self.words.push(Word::new(vec![segment]));
            return true;
        }
        let word_idx = rng.gen_range(0..n);
        let word = &mut self.words[word_idx];
        let position = rng.gen_range(0..=word.len());
        word.insert_segment(position, segment);
        true
    }

    /// Drops a random segment from a random non-empty word; removes the
    /// word entirely if doing so empties it.
    pub fn delete_segment(&mut self, rng: &mut impl Rng) -> bool {
        let candidates: Vec<usize> = (0..self.words.len()).filter(|&i| !self.words[i].is_empty()).collect();
        if candidates.is_empty() {
            return false;
        }
        let word_idx = candidates[rng.gen_range(0..candidates.len())];
        let position = rng.gen_range(0..self.words[word_idx].len());
        self.words[word_idx].delete_segment(position);
        if self.words[word_idx].is_empty() {
            self.words.remove(word_idx);
        }
        true
    }

    /// Replaces a random segment of a random non-empty word with a
    /// different alphabet segment.
    pub fn change_segment(&mut self, rng: &mut impl Rng, table: &FeatureTable) -> bool {
        let alphabet = table.alphabet();
        if alphabet.len() < 2 {
            return false;
        }
        let candidates: Vec<usize> = (0..self.words.len()).filter(|&i| !self.words[i].is_empty()).collect();
        if candidates.is_empty() {
            return false;
        }
        let word_idx = candidates[rng.gen_range(0..candidates.len())];
        let position = rng.gen_range(0..self.words[word_idx].len());
        let current = self.words[word_idx].segments()[position].clone();
        let mut replacement = Segment::concrete(alphabet[rng.gen_range(0..alphabet.len())]);
        let mut attempts = 0;
        while replacement == current && attempts < alphabet.len() * 2 {
            replacement = Segment::concrete(alphabet[rng.gen_range(0..alphabet.len())]);
            attempts += 1;
        }
        if replacement == current {
            return false;
        }
        self.words[word_idx].change_segment(position, replacement);
        true
    }
}

fn log2_ceil(n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    (usize::BITS - (n - 1).leading_zeros()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_transducer_accepts_the_word_with_no_epenthesis() {
        let w = Word::from_str("ab");
        let t = w.input_transducer();
        assert_eq!(t.num_states(), 3);
        assert_eq!(t.initial(), Some(0));
    }

    #[test]
    fn empty_word_deletes_itself_from_the_lexicon() {
        let mut lex = Lexicon::new(vec![Word::from_str("a")]);
        let mut rng = rand::thread_rng();
        // Force the single segment to be deleted repeatedly until gone;
        // with one word of length 1 the first call always empties it.
        assert!(lex.delete_segment(&mut rng));
        assert!(lex.is_empty());
    }

    #[test]
    fn distinct_words_counts_unique_surface_keys() {
        let lex = Lexicon::new(vec![Word::from_str("ab"), Word::from_str("ab"), Word::from_str("a")]);
        assert_eq!(lex.get_number_of_distinct_words(), 2);
    }

    #[test]
    fn log2_ceil_matches_expected_bit_widths() {
        assert_eq!(log2_ceil(1), 0);
        assert_eq!(log2_ceil(2), 1);
        assert_eq!(log2_ceil(3), 2);
        assert_eq!(log2_ceil(4), 2);
        assert_eq!(log2_ceil(5), 3);
    }
}
