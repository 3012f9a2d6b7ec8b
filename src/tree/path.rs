// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Path parsing, glob matching over a single segment, and the
//! "next common character" helper an interactive frontend can use for
//! tab completion. None of this depends on [`super::container::Container`]
//! directly, so it is unit-testable on its own.

/// Split a path into its segments, dropping empty segments so `/a//b/`
/// behaves the same as `/a/b`.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Match `text` against a single-segment glob pattern: `*` matches any
/// run of characters (including none), `?` matches exactly one
/// character. Matching is case-sensitive, consistent with container and
/// parameter names being case-sensitive.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_rec(&p, &t)
}

fn glob_match_rec(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => {
            glob_match_rec(&p[1..], t) || (!t.is_empty() && glob_match_rec(p, &t[1..]))
        }
        Some('?') => !t.is_empty() && glob_match_rec(&p[1..], &t[1..]),
        Some(c) => t.first() == Some(c) && glob_match_rec(&p[1..], &t[1..]),
    }
}

/// Given a partially typed segment and the full set of sibling names
/// visible at this point in the tree, return the longest string that is
/// both an extension of `partial` and a prefix of every candidate that
/// itself starts with `partial`. Returns `partial` unchanged if no
/// candidate matches or candidates disagree on the very next character.
pub fn common_prefix_extension(candidates: &[String], partial: &str) -> String {
    let matches: Vec<&str> = candidates
        .iter()
        .map(|s| s.as_str())
        .filter(|s| s.starts_with(partial))
        .collect();
    if matches.is_empty() {
        return partial.to_string();
    }
    let mut extension = matches[0].to_string();
    for m in &matches[1..] {
        let mut common = 0;
        for (a, b) in extension.chars().zip(m.chars()) {
            if a != b {
                break;
            }
            common += 1;
        }
        extension.truncate(extension.char_indices().nth(common).map_or(extension.len(), |(i, _)| i));
    }
    extension
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_drops_empty_segments() {
        assert_eq!(segments("/a//b/c/"), vec!["a", "b", "c"]);
        assert_eq!(segments(""), Vec::<&str>::new());
    }

    #[test]
    fn glob_star_matches_any_run() {
        assert!(glob_match("a*c", "abbbc"));
        assert!(glob_match("a*c", "ac"));
        assert!(!glob_match("a*c", "ab"));
    }

    #[test]
    fn glob_question_matches_single_char() {
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(!glob_match("a?c", "abbc"));
    }

    #[test]
    fn common_prefix_extension_stops_at_disagreement() {
        let candidates = vec!["motor1".to_string(), "motor2".to_string(), "mode".to_string()];
        assert_eq!(common_prefix_extension(&candidates, "mo"), "mo");
        assert_eq!(common_prefix_extension(&candidates, "mot"), "motor");
    }

    #[test]
    fn common_prefix_extension_full_match_when_unique() {
        let candidates = vec!["velocity".to_string(), "mode".to_string()];
        assert_eq!(common_prefix_extension(&candidates, "vel"), "velocity");
    }

    #[test]
    fn common_prefix_extension_returns_partial_when_no_candidate_matches() {
        let candidates = vec!["mode".to_string()];
        assert_eq!(common_prefix_extension(&candidates, "zz"), "zz");
    }
}
