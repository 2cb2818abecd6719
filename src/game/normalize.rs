//! Answer comparison. Two answers match when their normalized forms are equal.

use std::ops::RangeInclusive;

// Fathatan..Sukun
const HARAKAT: RangeInclusive<char> = '\u{064B}'..='\u{0652}';
const SUPERSCRIPT_ALEF: char = '\u{0670}';
const TATWEEL: char = '\u{0640}';

/// Trim, lowercase, collapse internal whitespace.
pub fn normalize(text: &str) -> String {
  text
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

/// `normalize` plus Arabic folding: harakat and tatweel are dropped,
/// hamza-carrying alefs become a bare alef, taa marbuta becomes haa and
/// alef maqsura becomes yaa.
pub fn normalize_arabic(text: &str) -> String {
  let folded: String = text
    .chars()
    .filter_map(|c| match c {
      'أ' | 'إ' | 'آ' | 'ٱ' => Some('ا'),
      'ة' => Some('ه'),
      'ى' => Some('ي'),
      TATWEEL | SUPERSCRIPT_ALEF => None,
      c if HARAKAT.contains(&c) => None,
      c => Some(c),
    })
    .collect();
  normalize(&folded)
}

pub fn answers_match(given: &str, expected: &str, arabic: bool) -> bool {
  let fold = if arabic { normalize_arabic } else { normalize };
  let expected = fold(expected);
  !expected.is_empty() && fold(given) == expected
}

/// First character of the folded text.
pub fn first_letter(text: &str) -> Option<char> {
  normalize_arabic(text).chars().next()
}

/// Folded form of a single board letter, so `'أ'` and `'ا'` compare equal.
pub fn fold_letter(letter: char) -> char {
  first_letter(&letter.to_string()).unwrap_or(letter)
}
