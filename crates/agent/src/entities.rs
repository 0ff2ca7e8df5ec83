//! Subject (member name) matching
//!
//! Exact substring matches come first, in order of appearance. Remaining
//! places are filled by token overlap: a name scores one point per token of
//! three or more characters present in the question. Tokens claimed by a
//! chosen name are not reused, so two members sharing a first name do not
//! both match on it.

use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

/// Maximum number of subjects a question can name
pub const MAX_SUBJECTS: usize = 2;

const MIN_TOKEN_CHARS: usize = 3;

fn tokens(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

/// Byte offset of `needle` in `haystack` where it is not part of a longer word
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    haystack.match_indices(needle).map(|(pos, _)| pos).find(|&pos| {
        let before = haystack[..pos].chars().next_back();
        let after = haystack[pos + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Matches question text against the known subject set
#[derive(Debug, Clone, Default)]
pub struct SubjectMatcher {
    known: Vec<String>,
}

impl SubjectMatcher {
    pub fn new(known: Vec<String>) -> Self {
        Self { known }
    }

    pub fn known(&self) -> &[String] {
        &self.known
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Up to `limit` subjects named in `question`
    pub fn find(&self, question: &str, limit: usize) -> Vec<String> {
        if limit == 0 || self.known.is_empty() {
            return Vec::new();
        }

        let lowered = question.to_lowercase();
        let mut picks: Vec<String> = Vec::new();
        let mut claimed: HashSet<String> = HashSet::new();

        let mut exact: Vec<(usize, &String)> = self
            .known
            .iter()
            .filter(|name| !name.trim().is_empty())
            .filter_map(|name| find_word(&lowered, &name.to_lowercase()).map(|pos| (pos, name)))
            .collect();
        // longer names first at the same position ("Budi Santoso" over "Budi")
        exact.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())));

        for (_, name) in exact {
            if picks.len() >= limit {
                break;
            }
            let name_tokens = tokens(name);
            if !name_tokens.is_empty() && name_tokens.iter().all(|t| claimed.contains(t)) {
                continue;
            }
            claimed.extend(name_tokens);
            picks.push(name.clone());
        }

        let question_tokens: HashSet<String> = tokens(question).into_iter().collect();

        while picks.len() < limit {
            let best = self
                .known
                .iter()
                .filter(|name| !picks.contains(name))
                .map(|name| {
                    let score = tokens(name)
                        .iter()
                        .filter(|t| question_tokens.contains(*t) && !claimed.contains(*t))
                        .count();
                    (name, score)
                })
                .filter(|(_, score)| *score > 0)
                // max_by_key keeps the last maximum; reverse to keep the first seen
                .rev()
                .max_by_key(|(_, score)| *score);

            match best {
                Some((name, _)) => {
                    claimed.extend(tokens(name));
                    picks.push(name.clone());
                },
                None => break,
            }
        }

        picks
    }

    /// Remove whole-word occurrences of the subjects' tokens from `text`
    pub fn mask(text: &str, subjects: &[String]) -> String {
        let masked: HashSet<String> = subjects.iter().flat_map(|s| tokens(s)).collect();
        if masked.is_empty() {
            return text.to_string();
        }
        text.split_word_bounds()
            .filter(|w| !masked.contains(&w.to_lowercase()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> SubjectMatcher {
        SubjectMatcher::new(vec![
            "Budi Santoso".to_string(),
            "Budi Hartono".to_string(),
            "Sari Dewi".to_string(),
            "Agus".to_string(),
        ])
    }

    #[test]
    fn test_exact_match() {
        let found = matcher().find("total jarak Sari Dewi bulan ini", MAX_SUBJECTS);
        assert_eq!(found, vec!["Sari Dewi".to_string()]);
    }

    #[test]
    fn test_exact_matches_in_question_order() {
        let found = matcher().find("bandingkan sari dewi vs budi hartono", MAX_SUBJECTS);
        assert_eq!(found, vec!["Sari Dewi".to_string(), "Budi Hartono".to_string()]);
    }

    #[test]
    fn test_token_overlap_prefers_higher_score() {
        let found = matcher().find("berapa km hartono?", 1);
        assert_eq!(found, vec!["Budi Hartono".to_string()]);
    }

    #[test]
    fn test_token_overlap_tie_keeps_first_seen() {
        let found = matcher().find("budi lari berapa km?", 1);
        assert_eq!(found, vec!["Budi Santoso".to_string()]);
    }

    #[test]
    fn test_shared_token_not_reused() {
        let found = matcher().find("bandingkan budi dan sari", MAX_SUBJECTS);
        assert_eq!(found, vec!["Budi Santoso".to_string(), "Sari Dewi".to_string()]);
    }

    #[test]
    fn test_exact_match_respects_word_boundaries() {
        let found = matcher().find("total bulan agustus", MAX_SUBJECTS);
        assert!(found.is_empty());
        assert_eq!(matcher().find("agus lari 5k?", 1), vec!["Agus".to_string()]);
    }

    #[test]
    fn test_no_match() {
        assert!(matcher().find("siapa lari 10 km?", MAX_SUBJECTS).is_empty());
        assert!(SubjectMatcher::default().find("budi", 2).is_empty());
    }

    #[test]
    fn test_mask_removes_subject_tokens() {
        let masked = SubjectMatcher::mask("total Agus bulan 8", &["Agus".to_string()]);
        assert_eq!(masked, "total  bulan 8");
    }
}
