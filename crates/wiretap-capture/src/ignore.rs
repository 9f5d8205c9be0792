use regex::Regex;
use wiretap_schema::{ConfigError, HttpInteraction};

#[derive(Debug, Clone)]
struct IgnoreRule {
    method: String,
    path: Regex,
}

/// Request filters of the form `"<METHOD> <path regex>"`. The regex must match
/// the whole path.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new<S: AsRef<str>>(rules: &[S]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|raw| parse_rule(raw.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn should_ignore(&self, interaction: &HttpInteraction) -> bool {
        let method = interaction.request.method.as_str();
        let path = interaction.request.path.as_str();
        self.rules
            .iter()
            .any(|rule| rule.method.eq_ignore_ascii_case(method) && rule.path.is_match(path))
    }
}

fn parse_rule(raw: &str) -> Result<IgnoreRule, ConfigError> {
    let raw = raw.trim();
    let (method, pattern) = raw
        .split_once(char::is_whitespace)
        .ok_or_else(|| ConfigError::Invalid(format!("ignore rule {raw:?} needs a method and a path")))?;
    let path = Regex::new(&format!("^(?:{})$", pattern.trim()))
        .map_err(|e| ConfigError::Invalid(format!("ignore rule {raw:?}: {e}")))?;
    Ok(IgnoreRule {
        method: method.to_ascii_uppercase(),
        path,
    })
}
