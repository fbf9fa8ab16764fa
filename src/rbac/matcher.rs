//! Resource-pattern matching for policies.
//!
//! Patterns are plain strings: `*` matches any run of characters (slashes
//! included), `:name` or `{name}` matches exactly one non-empty path segment,
//! and everything else must match literally. The whole request path must be
//! consumed.

/// Signature of a resource matching function: `(request_path, pattern)`.
pub type MatchFn = fn(&str, &str) -> bool;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Lit(&'a str),
    Segment,
    Star,
}

fn tokenize(pattern: &str) -> Vec<Token<'_>> {
    let bytes = pattern.as_bytes();
    let mut out = Vec::new();
    let mut lit_start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        let at_segment_start = i == 0 || bytes[i - 1] == b'/';
        let tok_end = match bytes[i] {
            b'*' => Some((Token::Star, i + 1)),
            b':' if at_segment_start => {
                let end = pattern[i..].find('/').map(|o| i + o).unwrap_or(bytes.len());
                Some((Token::Segment, end))
            }
            b'{' if at_segment_start => pattern[i..].find('}').map(|o| (Token::Segment, i + o + 1)),
            _ => None,
        };
        match tok_end {
            Some((tok, end)) => {
                if lit_start < i { out.push(Token::Lit(&pattern[lit_start..i])); }
                // Collapse `**` into one star.
                if !(tok == Token::Star && out.last() == Some(&Token::Star)) { out.push(tok); }
                i = end;
                lit_start = end;
            }
            None => i += 1,
        }
    }
    if lit_start < bytes.len() { out.push(Token::Lit(&pattern[lit_start..])); }
    out
}

fn match_tokens(tokens: &[Token<'_>], s: &str) -> bool {
    let Some((first, rest)) = tokens.split_first() else { return s.is_empty(); };
    match first {
        Token::Lit(l) => s.strip_prefix(*l).map_or(false, |r| match_tokens(rest, r)),
        Token::Segment => {
            let seg_end = s.find('/').unwrap_or(s.len());
            (1..=seg_end).filter(|i| s.is_char_boundary(*i)).any(|i| match_tokens(rest, &s[i..]))
        }
        Token::Star => {
            if rest.is_empty() { return true; }
            (0..=s.len()).filter(|i| s.is_char_boundary(*i)).any(|i| match_tokens(rest, &s[i..]))
        }
    }
}

/// Does the request path `path` fall under `pattern`?
pub fn key_match(path: &str, pattern: &str) -> bool {
    if pattern == "*" { return true; }
    match_tokens(&tokenize(pattern), path)
}

/// Exact comparison, for deployments that do not want wildcard resources.
pub fn exact_match(path: &str, pattern: &str) -> bool { path == pattern }
