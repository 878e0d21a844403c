//! Deterministic user-agent to device-id matching
//!
//! Three tiers, cheapest first:
//!
//! 1. exact match on the normalized user agent;
//! 2. longest device pattern occurring as a substring of the user agent
//!    (one Aho-Corasick pass over all patterns at once);
//! 3. longest-common-prefix scan, only under the high-accuracy engine
//!    target.
//!
//! Ties on match length always break toward the lexicographically
//! smallest device id, so identical input yields identical output for a
//! given hierarchy. Unmatched user agents fall back to the default
//! device.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use devc_common::{DetectError, DetectResult, DeviceRecord};
use std::collections::HashMap;

/// Prefix matches shorter than this carry no signal.
const MIN_PREFIX_MATCH: usize = 8;

#[derive(Debug)]
struct Pattern {
    device_id: String,
    /// Normalized (trimmed, ASCII-lowercased) pattern text
    text: String,
}

/// Compiled matcher over every non-empty user-agent pattern.
pub struct UserAgentMatcher {
    patterns: Vec<Pattern>,
    exact: HashMap<String, usize>,
    automaton: Option<AhoCorasick>,
    default_id: String,
    prefix_scan: bool,
}

impl UserAgentMatcher {
    /// Compile the matcher. `prefix_scan` enables the high-accuracy tier.
    pub fn build<'a>(
        records: impl Iterator<Item = &'a DeviceRecord>,
        default_id: String,
        prefix_scan: bool,
    ) -> DetectResult<Self> {
        let mut patterns: Vec<Pattern> = records
            .filter(|rec| !rec.user_agent.trim().is_empty())
            .map(|rec| Pattern {
                device_id: rec.id.clone(),
                text: rec.user_agent.trim().to_ascii_lowercase(),
            })
            .collect();
        patterns.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        let mut exact = HashMap::with_capacity(patterns.len());
        for (index, pattern) in patterns.iter().enumerate() {
            exact.entry(pattern.text.clone()).or_insert(index);
        }

        let automaton = if patterns.is_empty() {
            None
        } else {
            let built = AhoCorasickBuilder::new()
                .build(patterns.iter().map(|pattern| pattern.text.as_str()))
                .map_err(|err| DetectError::Unknown(err.to_string()))?;
            Some(built)
        };

        Ok(Self {
            patterns,
            exact,
            automaton,
            default_id,
            prefix_scan,
        })
    }

    /// Resolve the closest device id for a user agent.
    pub fn match_user_agent(&self, user_agent: &str) -> DetectResult<&str> {
        let ua = user_agent.trim().to_ascii_lowercase();

        if let Some(&index) = self.exact.get(ua.as_str()) {
            return Ok(&self.patterns[index].device_id);
        }

        if let Some(automaton) = &self.automaton {
            let mut best: Option<&Pattern> = None;
            for m in automaton.find_overlapping_iter(&ua) {
                let candidate = &self.patterns[m.pattern().as_usize()];
                let better = match best {
                    None => true,
                    Some(current) => {
                        candidate.text.len() > current.text.len()
                            || (candidate.text.len() == current.text.len()
                                && candidate.device_id < current.device_id)
                    }
                };
                if better {
                    best = Some(candidate);
                }
            }
            if let Some(pattern) = best {
                return Ok(&pattern.device_id);
            }
        }

        if self.prefix_scan {
            if let Some(pattern) = self.longest_prefix(&ua) {
                return Ok(&pattern.device_id);
            }
        }

        if self.default_id.is_empty() {
            return Err(DetectError::DeviceNotFound(user_agent.to_string()));
        }
        Ok(&self.default_id)
    }

    fn longest_prefix(&self, ua: &str) -> Option<&Pattern> {
        let mut best: Option<(usize, &Pattern)> = None;
        for pattern in &self.patterns {
            let lcp = common_prefix_len(ua, &pattern.text);
            if lcp < MIN_PREFIX_MATCH {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_len, current)) => {
                    lcp > best_len || (lcp == best_len && pattern.device_id < current.device_id)
                }
            };
            if better {
                best = Some((lcp, pattern));
            }
        }
        best.map(|(_, pattern)| pattern)
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, ua: &str) -> DeviceRecord {
        let mut rec = DeviceRecord::new(id);
        rec.user_agent = ua.to_string();
        rec
    }

    fn matcher(records: &[DeviceRecord], prefix_scan: bool) -> UserAgentMatcher {
        UserAgentMatcher::build(records.iter(), "generic".to_string(), prefix_scan).unwrap()
    }

    #[test]
    fn test_exact_match() {
        let records = vec![record("a", "AcmePhone/1.0"), record("b", "AcmePhone/2.0")];
        let m = matcher(&records, false);
        assert_eq!(m.match_user_agent("AcmePhone/1.0").unwrap(), "a");
        // Case and surrounding whitespace do not matter.
        assert_eq!(m.match_user_agent("  acmephone/2.0 ").unwrap(), "b");
    }

    #[test]
    fn test_longest_substring_wins() {
        let records = vec![
            record("android_generic", "Android"),
            record("acme_a1", "Android; Acme A1"),
        ];
        let m = matcher(&records, false);
        let ua = "Mozilla/5.0 (Linux; Android; Acme A1 Build/X) AppleWebKit";
        assert_eq!(m.match_user_agent(ua).unwrap(), "acme_a1");
    }

    #[test]
    fn test_tie_breaks_lexicographically() {
        // Two patterns of equal length, both substrings of the input.
        let records = vec![record("zzz", "Foo/111"), record("aaa", "Bar/222")];
        let m = matcher(&records, false);
        assert_eq!(m.match_user_agent("x Foo/111 Bar/222 y").unwrap(), "aaa");
    }

    #[test]
    fn test_fallback_to_default() {
        let records = vec![record("a", "AcmePhone/1.0")];
        let m = matcher(&records, false);
        assert_eq!(m.match_user_agent("UnrelatedBot/9.9").unwrap(), "generic");
    }

    #[test]
    fn test_prefix_scan_only_when_enabled() {
        let records = vec![record("a", "AcmePhone/1.0 (Series X)")];
        let ua = "AcmePhone/1.1 (Series Y)";

        let fast = matcher(&records, false);
        assert_eq!(fast.match_user_agent(ua).unwrap(), "generic");

        let accurate = matcher(&records, true);
        assert_eq!(accurate.match_user_agent(ua).unwrap(), "a");
    }

    #[test]
    fn test_deterministic() {
        let records = vec![
            record("a", "Android"),
            record("b", "Android; X"),
            record("c", "X"),
        ];
        let m = matcher(&records, false);
        let first = m.match_user_agent("Android; X").unwrap().to_string();
        for _ in 0..10 {
            assert_eq!(m.match_user_agent("Android; X").unwrap(), first);
        }
    }

    #[test]
    fn test_no_patterns() {
        let m = matcher(&[], false);
        assert_eq!(m.match_user_agent("anything").unwrap(), "generic");
    }
}
