//! File pattern associations.
//!
//! A pattern is a simple glob: `*` matches any run of characters, separators
//! included, and everything else is literal. The compiled expression is
//! anchored at the end only, so `*.ci.yml` and `docker-compose.yml` both match
//! full paths or URIs ending that way.

use regex::Regex;

/// One filename pattern and the schemas it selects.
#[derive(Debug, Clone)]
pub struct FilePatternAssociation {
    pattern: String,
    /// `None` when the pattern failed to compile; such an association never matches.
    regex: Option<Regex>,
    schemas: Vec<String>,
}

impl FilePatternAssociation {
    /// Compile `pattern` and associate it with `schemas` in the given order.
    ///
    /// A pattern that fails to compile is kept but never matches.
    pub fn new<I, S>(pattern: &str, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_compiled(pattern, compile_pattern(pattern), schemas)
    }

    fn from_compiled<I, S>(pattern: &str, compiled: Result<Regex, regex::Error>, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let regex = match compiled {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "ignoring file pattern that does not compile");
                None
            }
        };

        Self {
            pattern: pattern.to_string(),
            regex,
            schemas: schemas.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a schema id. Duplicates are the caller's concern.
    pub fn add_schema(&mut self, id: impl Into<String>) {
        self.schemas.push(id.into());
    }

    pub fn matches_pattern(&self, path: &str) -> bool {
        self.regex.as_ref().is_some_and(|regex| regex.is_match(path))
    }

    pub fn schemas(&self) -> &[String] {
        &self.schemas
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True if the pattern did not compile.
    pub fn is_inert(&self) -> bool {
        self.regex.is_none()
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    for (index, literal) in pattern.split('*').enumerate() {
        if index > 0 {
            expr.push_str(".*");
        }
        expr.push_str(&regex::escape(literal));
    }
    expr.push('$');
    Regex::new(&expr)
}
