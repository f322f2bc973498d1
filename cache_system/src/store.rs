//! Key-value store contract
//!
//! The cache manager only needs a handful of commands from its backing
//! store. Values are strings that the manager has already serialized;
//! keys arrive fully qualified (`{prefix}:{key}`).

use crate::errors::CacheError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Backing store for the cache manager
#[async_trait]
pub trait KeyValueStore: Send + Sync + Debug {
    /// `GET key`; expired keys read as absent
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// `SETEX key ttl value`
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError>;

    /// `DEL key [key ...]`, returns how many keys were removed
    async fn del(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// `KEYS pattern` using redis glob syntax
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// `EXISTS key`
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// `PING`
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Escape redis glob metacharacters so `raw` matches only itself
pub fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Match `candidate` against a redis-style glob pattern.
///
/// Supports `*`, `?`, `[abc]`, `[a-z]`, `[^a]` and `\` escapes.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    match_from(&pattern, &candidate)
}

fn match_from(pattern: &[char], candidate: &[char]) -> bool {
    let (mut p, mut c) = (0, 0);
    // Backtrack point for the most recent `*`
    let mut star: Option<(usize, usize)> = None;

    while c < candidate.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    star = Some((p, c));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    c += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(pattern, p, candidate[c]) {
                        if matched {
                            p = next;
                            c += 1;
                            continue;
                        }
                    } else if candidate[c] == '[' {
                        // Unterminated class is a literal bracket
                        p += 1;
                        c += 1;
                        continue;
                    }
                }
                '\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == candidate[c] {
                        p += 2;
                        c += 1;
                        continue;
                    }
                }
                literal => {
                    if literal == candidate[c] {
                        p += 1;
                        c += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((star_p, star_c)) => {
                p = star_p + 1;
                c = star_c + 1;
                star = Some((star_p, star_c + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&ch| ch == '*')
}

/// Evaluate a `[...]` class starting at `start`; returns (matched, index after `]`)
fn match_class(pattern: &[char], start: usize, ch: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        let mut current = pattern[i];
        if current == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;

        if current == '\\' && i + 1 < pattern.len() {
            i += 1;
            current = pattern[i];
        }

        if pattern.get(i + 1) == Some(&'-') && i + 2 < pattern.len() && pattern[i + 2] != ']' {
            let (lo, hi) = ordered(current, pattern[i + 2]);
            if (lo..=hi).contains(&ch) {
                matched = true;
            }
            i += 3;
        } else {
            if current == ch {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

fn ordered(a: char, b: char) -> (char, char) {
    if a <= b { (a, b) } else { (b, a) }
}
