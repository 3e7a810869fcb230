//! Near-match suggestions for lookup misses.
//!
//! Purely advisory: results only decorate `*_NOT_FOUND` errors.

/// Most candidates returned for one miss.
pub const MAX_SUGGESTIONS: usize = 3;

/// Candidates further than this many edits away are dropped.
pub const MAX_DISTANCE: usize = 3;

/// Rank `available` by case-insensitive edit distance to `requested`.
///
/// Returns at most [`MAX_SUGGESTIONS`] names within [`MAX_DISTANCE`] edits,
/// closest first, ties broken lexicographically.
pub fn suggest<I, S>(requested: &str, available: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let needle: Vec<char> = requested.to_lowercase().chars().collect();
    let mut ranked: Vec<(usize, String)> = available
        .into_iter()
        .filter_map(|name| {
            let name = name.as_ref();
            let dist = bounded_levenshtein(&name.to_lowercase(), &needle, MAX_DISTANCE);
            (dist <= MAX_DISTANCE).then(|| (dist, name.to_string()))
        })
        .collect();

    ranked.sort();
    ranked.dedup_by(|a, b| a.1 == b.1);
    ranked
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, name)| name)
        .collect()
}

/// Levenshtein distance that gives up once every cell of a row exceeds
/// `max_dist`, returning `max_dist + 1`.
fn bounded_levenshtein(value: &str, needle: &[char], max_dist: usize) -> usize {
    let n = needle.len();
    let value_len = value.chars().count();
    if value_len.abs_diff(n) > max_dist {
        return max_dist + 1;
    }
    if n == 0 {
        return value_len;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr: Vec<usize> = vec![0; n + 1];

    for (i, c) in value.chars().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];

        for j in 1..=n {
            let cost = usize::from(c != needle[j - 1]);
            let d = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            curr[j] = d;
            row_min = row_min.min(d);
        }

        if row_min > max_dist {
            return max_dist + 1;
        }

        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
