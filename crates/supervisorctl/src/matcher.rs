//! Agent name pattern matching (§4.6, §8 S6).

use regex::Regex;

/// A compiled name-matching pattern. Built once per command invocation and
/// matched against the agent list obtained from `/status`.
pub enum NamePattern {
    /// Bare name with no prefix: matches literally.
    Literal(String),
    /// `exact:X`
    Exact(String),
    /// `prefix:X`
    Prefix(String),
    /// `suffix:X`
    Suffix(String),
    /// `contains:X`
    Contains(String),
    /// `regex:X`, or a bare name containing `*`/`?` translated to one.
    Regex(Regex),
}

impl NamePattern {
    /// Parse a single CLI argument into a pattern.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        if let Some(rest) = raw.strip_prefix("exact:") {
            return Ok(Self::Exact(rest.to_string()));
        }
        if let Some(rest) = raw.strip_prefix("prefix:") {
            return Ok(Self::Prefix(rest.to_string()));
        }
        if let Some(rest) = raw.strip_prefix("suffix:") {
            return Ok(Self::Suffix(rest.to_string()));
        }
        if let Some(rest) = raw.strip_prefix("contains:") {
            return Ok(Self::Contains(rest.to_string()));
        }
        if let Some(rest) = raw.strip_prefix("regex:") {
            let re = Regex::new(rest).map_err(|e| anyhow::anyhow!("invalid regex '{rest}': {e}"))?;
            return Ok(Self::Regex(re));
        }
        if raw.contains('*') || raw.contains('?') {
            let re = Regex::new(&format!("^{}$", wildcard_to_regex(raw)))
                .map_err(|e| anyhow::anyhow!("invalid wildcard '{raw}': {e}"))?;
            return Ok(Self::Regex(re));
        }
        Ok(Self::Literal(raw.to_string()))
    }

    /// Whether `name` matches this pattern.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Literal(s) | Self::Exact(s) => name == s,
            Self::Prefix(s) => name.starts_with(s.as_str()),
            Self::Suffix(s) => name.ends_with(s.as_str()),
            Self::Contains(s) => name.contains(s.as_str()),
            Self::Regex(re) => re.is_match(name),
        }
    }
}

/// Translate shell-style `*`/`?` wildcards into an (unanchored) regex body;
/// the caller anchors it with `^...$`.
fn wildcard_to_regex(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c if r"\.+()|[]{}^$".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matches_exact_name_only() {
        let p = NamePattern::parse("web-1").unwrap();
        assert!(p.matches("web-1"));
        assert!(!p.matches("web-2"));
    }

    #[test]
    fn exact_prefix_suffix_contains() {
        assert!(NamePattern::parse("exact:db-1").unwrap().matches("db-1"));
        assert!(NamePattern::parse("prefix:web-").unwrap().matches("web-1"));
        assert!(!NamePattern::parse("prefix:web-").unwrap().matches("db-1"));
        assert!(NamePattern::parse("suffix:-1").unwrap().matches("web-1"));
        assert!(NamePattern::parse("contains:eb-").unwrap().matches("web-1"));
    }

    #[test]
    fn explicit_regex_pattern() {
        let p = NamePattern::parse("regex:^db.*").unwrap();
        assert!(p.matches("db-1"));
        assert!(!p.matches("web-1"));
    }

    #[test]
    fn wildcard_star_matches_prefix_family() {
        let p = NamePattern::parse("web-*").unwrap();
        assert!(p.matches("web-1"));
        assert!(p.matches("web-2"));
        assert!(!p.matches("db-1"));
    }

    #[test]
    fn wildcard_question_mark_matches_single_char() {
        let p = NamePattern::parse("web-?").unwrap();
        assert!(p.matches("web-1"));
        assert!(!p.matches("web-10"));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        assert!(NamePattern::parse("regex:(unclosed").is_err());
    }
}
