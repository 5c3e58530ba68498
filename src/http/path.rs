//! Request target parsing.

use thiserror::Error;

/// Errors produced while splitting a request target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty request target")]
    Empty,

    #[error("request target must start with '/': {0}")]
    NotOriginForm(String),

    #[error("request target contains invalid character {character:?} at offset {offset}")]
    InvalidCharacter { character: char, offset: usize },
}

/// An HTTP request target split into its path, query and fragment parts.
///
/// Only origin-form targets (`/path?query#fragment`) and the asterisk form
/// (`*`) are accepted, which is what a proxy forwards in `:path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathQueryFragment<'a> {
    path: &'a str,
    query: &'a str,
    fragment: &'a str,
}

impl<'a> PathQueryFragment<'a> {
    /// Split a request target.
    pub fn parse(target: &'a str) -> Result<Self, PathError> {
        if target.is_empty() {
            return Err(PathError::Empty);
        }

        if let Some((offset, character)) = target
            .char_indices()
            .find(|(_, c)| c.is_ascii_control() || c.is_whitespace())
        {
            return Err(PathError::InvalidCharacter { character, offset });
        }

        if target != "*" && !target.starts_with('/') {
            return Err(PathError::NotOriginForm(target.to_string()));
        }

        // The fragment delimiter wins over '?': anything after '#' is fragment.
        let (rest, fragment) = match target.split_once('#') {
            Some((rest, fragment)) => (rest, fragment),
            None => (target, ""),
        };

        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, query),
            None => (rest, ""),
        };

        Ok(Self {
            path,
            query,
            fragment,
        })
    }

    /// The path component, without query or fragment.
    pub fn path(&self) -> &'a str {
        self.path
    }

    /// The query string without the leading `?` (empty if absent).
    pub fn query(&self) -> &'a str {
        self.query
    }

    /// The fragment without the leading `#` (empty if absent).
    pub fn fragment(&self) -> &'a str {
        self.fragment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_only() {
        let pqf = PathQueryFragment::parse("/secure/data").unwrap();
        assert_eq!(pqf.path(), "/secure/data");
        assert_eq!(pqf.query(), "");
        assert_eq!(pqf.fragment(), "");
    }

    #[test]
    fn test_path_query_fragment() {
        let pqf = PathQueryFragment::parse("/callback?code=abc&state=xyz#top").unwrap();
        assert_eq!(pqf.path(), "/callback");
        assert_eq!(pqf.query(), "code=abc&state=xyz");
        assert_eq!(pqf.fragment(), "top");
    }

    #[test]
    fn test_question_mark_inside_fragment() {
        let pqf = PathQueryFragment::parse("/page#section?not-a-query").unwrap();
        assert_eq!(pqf.path(), "/page");
        assert_eq!(pqf.query(), "");
        assert_eq!(pqf.fragment(), "section?not-a-query");
    }

    #[test]
    fn test_empty_query_delimiter() {
        let pqf = PathQueryFragment::parse("/search?").unwrap();
        assert_eq!(pqf.path(), "/search");
        assert_eq!(pqf.query(), "");
    }

    #[test]
    fn test_asterisk_form() {
        let pqf = PathQueryFragment::parse("*").unwrap();
        assert_eq!(pqf.path(), "*");
    }

    #[test]
    fn test_malformed_targets() {
        assert_eq!(PathQueryFragment::parse(""), Err(PathError::Empty));
        assert!(matches!(
            PathQueryFragment::parse("secure/data"),
            Err(PathError::NotOriginForm(_))
        ));
        assert!(matches!(
            PathQueryFragment::parse("http://example.com/"),
            Err(PathError::NotOriginForm(_))
        ));
        assert_eq!(
            PathQueryFragment::parse("/a b"),
            Err(PathError::InvalidCharacter {
                character: ' ',
                offset: 2
            })
        );
        assert!(matches!(
            PathQueryFragment::parse("/a\r\nb"),
            Err(PathError::InvalidCharacter { .. })
        ));
    }
}
