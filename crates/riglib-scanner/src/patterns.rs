use regex::{Regex, RegexBuilder};
use riglib_db::DEFAULT_BLOCKED_PATTERNS;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid blocked pattern '{pattern}': {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Glob rules (`*`, `?`, `[...]`) matched against directory names before the
/// walker descends into them.
#[derive(Debug, Clone)]
pub struct BlockedPatterns {
    rules: Vec<(String, Regex)>,
}

impl BlockedPatterns {
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            let regex = RegexBuilder::new(&glob_to_regex(pattern))
                .case_insensitive(true)
                .build()
                .map_err(|source| PatternError::Invalid {
                    pattern: pattern.to_owned(),
                    source,
                })?;
            rules.push((pattern.to_owned(), regex));
        }
        Ok(Self { rules })
    }

    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn is_blocked(&self, dir_name: &str) -> bool {
        self.rules.iter().any(|(_, regex)| regex.is_match(dir_name))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(pattern, _)| pattern.as_str())
    }
}

impl Default for BlockedPatterns {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKED_PATTERNS).unwrap_or_else(|err| {
            log::error!("default blocked patterns failed to compile: {err}");
            Self::none()
        })
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() * 2 + 2);
    regex.push('^');
    let chars: Vec<char> = glob.chars().collect();
    let mut index = 0;
    while index < chars.len() {
        match chars[index] {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '[' => match chars[index + 1..].iter().position(|c| *c == ']') {
                Some(offset) if offset > 0 => {
                    let class = &chars[index + 1..index + 1 + offset];
                    regex.push('[');
                    for (position, c) in class.iter().enumerate() {
                        match c {
                            '!' if position == 0 => regex.push('^'),
                            '\\' | '[' | '^' => {
                                regex.push('\\');
                                regex.push(*c);
                            }
                            _ => regex.push(*c),
                        }
                    }
                    regex.push(']');
                    index += offset + 1;
                }
                _ => regex.push_str(r"\["),
            },
            c => regex.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
        index += 1;
    }
    regex.push('$');
    regex
}
