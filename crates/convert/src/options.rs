use std::time::Duration;

/// How notes are handed to the converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOptions {
    /// Source format, including extensions (`markdown+wikilinks_title_after_pipe`).
    pub from: String,
    /// Target format (`org`).
    pub to: String,
    pub extra_args: Vec<String>,
    pub timeout: Duration,
    /// Retry once on transient failures (missing binary, broken pipe).
    pub retry: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            from: "markdown+wikilinks_title_after_pipe".to_string(),
            to: "org".to_string(),
            extra_args: vec!["--wrap=none".to_string()],
            timeout: Duration::from_secs(30),
            retry: true,
        }
    }
}

impl ConversionOptions {
    /// Identifies everything that can change the converter's output. Timeout
    /// and retry policy can't, so they're left out.
    pub fn cache_key(&self) -> String {
        let mut key = format!("{}>{}", self.from, self.to);
        for arg in &self.extra_args {
            key.push(' ');
            key.push_str(arg);
        }
        key
    }

    /// Format name without extension flags (`markdown+foo-bar` → `markdown`).
    pub fn base_format(format: &str) -> &str {
        format.split(['+', '-']).next().unwrap_or(format)
    }

    pub fn attempts(&self) -> usize {
        if self.retry { 2 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_cache_key_ignores_runtime_policy() {
        let options = ConversionOptions::default();
        let relaxed = ConversionOptions {
            timeout: Duration::from_secs(300),
            retry: false,
            ..options.clone()
        };
        assert_eq!(options.cache_key(), "markdown+wikilinks_title_after_pipe>org --wrap=none");
        assert_eq!(options.cache_key(), relaxed.cache_key());
        let wrapped = ConversionOptions {
            extra_args: vec![],
            ..options.clone()
        };
        assert_ne!(options.cache_key(), wrapped.cache_key());
    }

    #[rstest]
    #[case("markdown+wikilinks_title_after_pipe", "markdown")]
    #[case("gfm-smart+footnotes", "gfm")]
    #[case("org", "org")]
    fn test_base_format(#[case] format: &str, #[case] expected: &str) {
        assert_eq!(ConversionOptions::base_format(format), expected);
    }
}
