//! Natural ("human") sort ordering.
//!
//! Numeric runs inside strings compare as integers, so `sub-2` sorts before
//! `sub-10`. Every list-returning query projection goes through this.

use std::cmp::Ordering;

/// One token of a natural sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// A run of ASCII digits, compared numerically.
    Num(u128),
    /// Everything else, compared case-insensitively.
    Text(String),
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Token::Num(a), Token::Num(b)) => a.cmp(b),
            (Token::Text(a), Token::Text(b)) => a.cmp(b),
            // Numbers sort before text within the same position.
            (Token::Num(_), Token::Text(_)) => Ordering::Less,
            (Token::Text(_), Token::Num(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Split a string into alternating text and numeric tokens.
fn key(s: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut digits = String::new();

    let flush_text = |text: &mut String, tokens: &mut Vec<Token>| {
        if !text.is_empty() {
            tokens.push(Token::Text(text.to_lowercase()));
            text.clear();
        }
    };
    let flush_digits = |digits: &mut String, tokens: &mut Vec<Token>| {
        if !digits.is_empty() {
            // Runs longer than u128 fall back to text comparison.
            match digits.parse::<u128>() {
                Ok(n) => tokens.push(Token::Num(n)),
                Err(_) => tokens.push(Token::Text(digits.clone())),
            }
            digits.clear();
        }
    };

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            flush_text(&mut text, &mut tokens);
            digits.push(ch);
        } else {
            flush_digits(&mut digits, &mut tokens);
            text.push(ch);
        }
    }
    flush_text(&mut text, &mut tokens);
    flush_digits(&mut digits, &mut tokens);
    tokens
}

/// Compare two strings in natural order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    key(a).cmp(&key(b))
}

/// Sort a vector of strings in natural order.
pub fn natural_sort(items: &mut [String]) {
    items.sort_by(|a, b| natural_cmp(a, b));
}

/// Sort arbitrary items by a string key in natural order.
pub fn natural_sort_by_key<T, F>(items: &mut [T], mut f: F)
where
    F: FnMut(&T) -> &str,
{
    items.sort_by(|a, b| natural_cmp(f(a), f(b)));
}
