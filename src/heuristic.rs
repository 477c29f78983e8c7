//! Last-resort search for card JSON anywhere in the file
//!
//! This is a heuristic, not a parser. It finds a known fragment with a
//! regex, walks back to the enclosing `{`, then brace-matches forward and
//! hopes the slice is the whole card. It works because card JSON sitting in
//! plain bytes is rare and rarely nested oddly; it will miss cards whose
//! string values contain unbalanced braces ahead of the match.
//!
//! Work is bounded: a forward pass settles every brace it crosses, so later
//! starts inside an already scanned region are answered from memory, and all
//! scanning and parsing draws from a budget proportional to the input size.

use crate::validate::validate;
use regex::bytes::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Bytes of scanning and parsing allowed per input byte
const SCAN_BUDGET_FACTOR: usize = 4;

/// Allowance for small inputs
const MIN_SCAN_BUDGET: usize = 1 << 20;

// Byte-oriented (?-u) so `[^}]` also crosses non-UTF-8 bytes
const PATTERNS: [&str; 3] = [
    r#"(?-u)"spec"\s*:\s*"chara_card_v[23]""#,
    r#"(?-u)"data"\s*:\s*\{[^}]*"name"\s*:\s*"[^"]+""#,
    r#"(?-u)\{"spec":"chara_card_v[23]""#,
];

static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();

fn regexes() -> &'static [Regex] {
    REGEXES.get_or_init(|| {
        PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("card fragment pattern is valid"))
            .collect()
    })
}

/// Search raw file bytes for an embedded card
///
/// Returns JSON that has passed validation, or `None`.
pub fn search_patterns(data: &[u8]) -> Option<Value> {
    let mut scan = BraceScan::new(data);
    let mut tried = HashSet::new();

    for re in regexes() {
        for m in re.find_iter(data) {
            let Some(start) = scan.enclosing_brace(m.start()) else {
                if scan.exhausted() {
                    tracing::debug!(len = data.len(), "pattern search budget exhausted");
                    return None;
                }
                continue;
            };
            if !tried.insert(start) {
                continue;
            }

            let Some(end) = scan.matching_brace(start) else {
                if scan.exhausted() {
                    tracing::debug!(len = data.len(), "pattern search budget exhausted");
                    return None;
                }
                tracing::trace!(start, "unbalanced braces after card fragment");
                continue;
            };

            if !scan.spend(end - start + 1) {
                tracing::debug!(len = data.len(), "pattern search budget exhausted");
                return None;
            }
            let value: Value = match serde_json::from_slice(&data[start..=end]) {
                Ok(value) => value,
                Err(e) => {
                    tracing::trace!(start, end, error = %e, "fragment is not valid JSON");
                    continue;
                }
            };
            match validate(&value) {
                Ok(version) => {
                    tracing::debug!(start, %version, "card found by pattern search");
                    return Some(value);
                }
                Err(e) => tracing::trace!(start, error = %e, "fragment is not a card"),
            }
        }
    }
    None
}

/// Brace matching over one input with a shared work budget
struct BraceScan<'a> {
    data: &'a [u8],
    budget: usize,
    /// Closing brace for every `{` a forward pass has settled, `None` when
    /// it never closes
    closes: HashMap<usize, Option<usize>>,
}

impl<'a> BraceScan<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self::with_budget(
            data,
            data.len().saturating_mul(SCAN_BUDGET_FACTOR).max(MIN_SCAN_BUDGET),
        )
    }

    fn with_budget(data: &'a [u8], budget: usize) -> Self {
        Self {
            data,
            budget,
            closes: HashMap::new(),
        }
    }

    fn exhausted(&self) -> bool {
        self.budget == 0
    }

    fn spend(&mut self, n: usize) -> bool {
        if n > self.budget {
            self.budget = 0;
            return false;
        }
        self.budget -= n;
        true
    }

    /// Find the `{` that opens the object containing `pos`
    ///
    /// Balanced `{...}` pairs between the brace and `pos` are skipped.
    fn enclosing_brace(&mut self, pos: usize) -> Option<usize> {
        let data = self.data;
        if data.get(pos) == Some(&b'{') {
            return Some(pos);
        }
        let mut depth = 0usize;
        for i in (0..pos.min(data.len())).rev() {
            if !self.spend(1) {
                return None;
            }
            match data[i] {
                b'}' => depth += 1,
                b'{' if depth == 0 => return Some(i),
                b'{' => depth -= 1,
                _ => {}
            }
        }
        None
    }

    /// Find the `}` closing the object that opens at `start`
    ///
    /// Braces inside string literals are ignored. Every brace opened along
    /// the way is settled too: a nested `{` starts outside any string with
    /// the same bytes ahead of it, so its own scan would end the same way.
    fn matching_brace(&mut self, start: usize) -> Option<usize> {
        if let Some(&end) = self.closes.get(&start) {
            return end;
        }
        let data = self.data;
        let mut open = Vec::new();
        let mut in_string = false;
        let mut escaped = false;

        for (i, &b) in data.iter().enumerate().skip(start) {
            if !self.spend(1) {
                return None;
            }
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => open.push(i),
                b'}' => {
                    let brace = open.pop()?;
                    self.closes.insert(brace, Some(i));
                    if open.is_empty() {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        for brace in open {
            self.closes.insert(brace, None);
        }
        None
    }
}
