//! Glob matching of event types against rule patterns.
//!
//! `*` matches any run of characters (including none), `?` matches exactly
//! one character, everything else is literal.

/// Returns true if `event_type` matches at least one of `patterns`.
pub fn pattern_match(event_type: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| glob_match(p, event_type))
}

/// Match a single glob pattern against `text`.
///
/// Iterative two-pointer scan with backtracking to the most recent `*`,
/// so it runs in O(len(pattern) * len(text)) worst case and never recurses.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    // Position of the last `*` seen, and the text index it is currently
    // assumed to cover up to.
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            // Let the last `*` swallow one more character and rescan.
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    // Only trailing stars may remain unconsumed.
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
