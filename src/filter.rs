//! Fuzzy filtering and ranking of list names against a typed query.
//!
//! Scores are on a 0–100 scale. The scorer is tuned for a quick-launcher
//! query box: users type partial or abbreviated text, so exact and prefix
//! matches rank highest, word-initial ("initials") matches rank high, and a
//! scattered subsequence match still qualifies at a moderate score. Plain
//! edit distance is deliberately not used; a query like `gro` must hit
//! `Groceries` and nothing that merely looks similar.

/// Default minimum score below which a candidate is dropped entirely.
pub const DEFAULT_MIN_SCORE: f64 = 30.0;

/// Rank `items` against `query`, dropping candidates scoring below
/// `min_score`.
///
/// Results are ordered by descending score; ties keep the input order, which
/// carries the data source's account-then-name ordering through unchanged.
/// An empty query is a pass-through: all items, original order, no scoring.
pub fn filter<T, F>(query: &str, items: Vec<T>, key_fn: F, min_score: f64) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    if query.is_empty() {
        return items;
    }

    let mut scored: Vec<(usize, f64, T)> = items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let s = score(query, key_fn(&item));
            (s >= min_score).then_some((idx, s, item))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    scored.into_iter().map(|(_, _, item)| item).collect()
}

/// Score `candidate` against `query`, case-insensitively.
///
/// Tiers, highest first: exact match (100), prefix (80–100), word-initials
/// (85/95), prefix of a later word (70–80), contiguous substring (60–70),
/// scattered subsequence (30–60), no subsequence at all (0). Within the
/// prefix/substring tiers, longer queries covering more of the candidate
/// score higher, so extending a matching query never drops the candidate.
pub fn score(query: &str, candidate: &str) -> f64 {
    if query.is_empty() {
        return 100.0;
    }
    let q = query.to_lowercase();
    let c = candidate.to_lowercase();

    if c == q {
        return 100.0;
    }

    let coverage = q.chars().count() as f64 / c.chars().count().max(1) as f64;

    if c.starts_with(&q) {
        return 80.0 + 20.0 * coverage;
    }

    let initials: String = words(&c).filter_map(|w| w.chars().next()).collect();
    if !initials.is_empty() && initials.starts_with(&q) {
        return if initials == q { 95.0 } else { 85.0 };
    }

    if words(&c).any(|w| w.starts_with(&q)) {
        return 70.0 + 10.0 * coverage.min(1.0);
    }

    if c.contains(&q) {
        return 60.0 + 10.0 * coverage.min(1.0);
    }

    subsequence_score(&q, &c)
}

fn words(s: &str) -> impl Iterator<Item = &str> {
    s.split(|ch: char| !ch.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// Local-alignment style subsequence scorer.
///
/// Every query character must appear in order in the candidate or the score
/// is 0. Matched characters earn a base point plus bonuses for extending a
/// contiguous run and for landing on a word start, then the total is scaled
/// into the 30–60 band so any genuine subsequence clears the default
/// threshold but still ranks below substring and prefix matches.
fn subsequence_score(q: &str, c: &str) -> f64 {
    let chars: Vec<char> = c.chars().collect();
    let mut total = 0.0;
    let mut pos = 0usize;
    let mut prev: Option<usize> = None;

    for qc in q.chars() {
        let found = chars[pos..].iter().position(|&ch| ch == qc).map(|i| pos + i);
        let Some(at) = found else {
            return 0.0;
        };

        let mut gain = 1.0;
        if prev.is_some_and(|p| p + 1 == at) {
            gain += 1.0;
        }
        if at == 0 || !chars[at - 1].is_alphanumeric() {
            gain += 1.0;
        }
        total += gain;
        prev = Some(at);
        pos = at + 1;
    }

    let max = 3.0 * q.chars().count() as f64;
    30.0 + 30.0 * (total / max)
}
