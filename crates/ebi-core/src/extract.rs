use std::collections::HashSet;

use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The pattern matched, but has no capture group at the configured index.
    /// Continuing would silently mis-extract every key, so this is fatal.
    #[error(
        "unexpected result while parsing issues from {text:?}: pattern {pattern:?} has {groups} \
         capturing group(s) but the issue key group index is {index}. \
         Make sure the regular expression includes a capturing group for the issue key"
    )]
    GroupOutOfRange {
        pattern: String,
        text: String,
        groups: usize,
        index: usize,
    },
}

/// Pulls issue keys out of free text with a pattern and a capture group index.
#[derive(Debug, Clone)]
pub struct IssueKeyExtractor {
    pattern: Regex,
    group: usize,
}

impl IssueKeyExtractor {
    pub fn new(pattern: Regex, group: usize) -> Self {
        Self { pattern, group }
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn group(&self) -> usize {
        self.group
    }

    /// All keys in `text`, in match order.
    pub fn extract(&self, text: &str) -> Result<Vec<String>, ExtractError> {
        let mut found = Vec::new();
        for caps in self.pattern.captures_iter(text) {
            if caps.len() <= self.group {
                return Err(ExtractError::GroupOutOfRange {
                    pattern: self.pattern.as_str().to_string(),
                    text: text.to_string(),
                    groups: caps.len() - 1,
                    index: self.group,
                });
            }
            // An optional group that did not take part in this match carries no key.
            if let Some(m) = caps.get(self.group) {
                found.push(m.as_str().to_string());
            }
        }
        Ok(found)
    }

    /// Keys across several lines, lines in order.
    pub fn extract_lines<S: AsRef<str>>(&self, lines: &[S]) -> Result<Vec<String>, ExtractError> {
        let mut found = Vec::new();
        for line in lines {
            found.extend(self.extract(line.as_ref())?);
        }
        Ok(found)
    }
}

/// Remove repeated keys, keeping the first occurrence of each.
pub fn dedup_keys(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter()
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_KEY_PATTERN;

    fn extractor(pattern: &str, group: usize) -> IssueKeyExtractor {
        IssueKeyExtractor::new(Regex::new(pattern).unwrap(), group)
    }

    #[test]
    fn extracts_key_from_matching_line_only() {
        let ex = extractor(DEFAULT_KEY_PATTERN, 1);
        let keys = ex
            .extract_lines(&["Fixed ABC-123", "unrelated line"])
            .unwrap();
        assert_eq!(keys, vec!["ABC-123"]);
    }

    #[test]
    fn default_pattern_handles_lowercase_and_digits() {
        let ex = extractor(DEFAULT_KEY_PATTERN, 1);
        assert_eq!(ex.extract("feature/proj2-17-login").unwrap(), vec!["proj2-17"]);
        assert_eq!(
            ex.extract("(HEAD -> main) PROJ-1 and PROJ-22 done").unwrap(),
            vec!["PROJ-1", "PROJ-22"]
        );
    }

    #[test]
    fn custom_group_index() {
        let ex = extractor(r"\[(\w+)\] (\w+-\d+)", 2);
        assert_eq!(ex.extract("[fix] OPS-9 restart").unwrap(), vec!["OPS-9"]);
    }

    #[test]
    fn group_out_of_range_is_fatal() {
        let ex = extractor(r"[A-Z]+-\d+", 1);
        let err = ex.extract_lines(&["nothing here", "Fixed ABC-1"]).unwrap_err();
        let ExtractError::GroupOutOfRange { groups, index, .. } = err;
        assert_eq!(groups, 0);
        assert_eq!(index, 1);
    }

    #[test]
    fn group_out_of_range_only_on_actual_match() {
        let ex = extractor(r"[A-Z]+-\d+", 3);
        assert!(ex.extract("no keys in this text").unwrap().is_empty());
    }

    #[test]
    fn non_participating_group_skipped() {
        let ex = extractor(r"([A-Z]+-\d+)|(#\d+)", 1);
        assert_eq!(ex.extract("see #12 and KEY-4").unwrap(), vec!["KEY-4"]);
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let keys = vec![
            "B-2".to_string(),
            "A-1".to_string(),
            "B-2".to_string(),
            "a-1".to_string(),
        ];
        assert_eq!(dedup_keys(keys), vec!["B-2", "A-1", "a-1"]);
    }
}
