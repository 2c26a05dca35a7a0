//! Character stream → ordered token sequence.
//!
//! Tokenization proceeds line by line. At each position the ordered pattern
//! list below is tried in turn and the first match wins — order encodes
//! precedence among lexically-ambiguous prefixes (e.g. a bare `-` immediately
//! adjacent to a digit is swallowed by `Constant` before `Operator` ever gets
//! a chance at it, matching a negative numeric literal rather than `Sub`).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TokenizeError;
use crate::position::Position;
use crate::token::{Token, TokenKind};

struct Pattern {
    kind: TokenKind,
    regex: Regex,
}

static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    let spec: &[(TokenKind, &str)] = &[
        (TokenKind::Section, r"^\[[A-Za-z0-9_/]+\]"),
        (TokenKind::Label, r"^\.[A-Za-z][A-Za-z0-9_\[\]-]*"),
        (TokenKind::Constant, r"^(?:true|false|-?[0-9]*\.?[0-9]+)"),
        (TokenKind::Annotation, r"^@[A-Za-z][A-Za-z0-9_=]*"),
        (
            TokenKind::Operator,
            r"^(?:==|!=|<=|>=|->|=|!|\band\b|\bor\b|\bnot\b|\+|-|\*|/|<|>)",
        ),
        (TokenKind::Keyword, r"^(?:if|else)\b"),
        (TokenKind::Identifier, r"^[A-Za-z][A-Za-z0-9_]*"),
        (TokenKind::Colon, r"^:"),
        (TokenKind::LParen, r"^\("),
        (TokenKind::RParen, r"^\)"),
        (TokenKind::LBrace, r"^\{"),
        (TokenKind::RBrace, r"^\}"),
        (TokenKind::Comma, r"^,"),
    ];
    spec.iter()
        .map(|(kind, pattern)| Pattern {
            kind: *kind,
            regex: Regex::new(pattern).expect("static tokenizer pattern is valid"),
        })
        .collect()
});

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#.*").unwrap());

/// Tokenize a complete configuration source.
pub fn tokenize(source: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut tokens = Vec::new();

    let has_trailing_newline = source.ends_with('\n');
    let mut lines: Vec<&str> = source.split('\n').collect();
    if has_trailing_newline {
        lines.pop();
    }
    let last_index = lines.len().saturating_sub(1);

    for (i, line) in lines.iter().enumerate() {
        let line_num = i + 1;
        tokenize_line(line, line_num, &mut tokens)?;

        if i != last_index || has_trailing_newline {
            tokens.push(Token::new(TokenKind::Newline, "(newline)", Position::new(line_num, line.len() + 1)));
        }
    }

    log::trace!("tokenized {} line(s) into {} token(s)", lines.len(), tokens.len());
    Ok(tokens)
}

fn tokenize_line(line: &str, line_num: usize, tokens: &mut Vec<Token>) -> Result<(), TokenizeError> {
    let bytes = line.as_bytes();
    let mut idx = 0usize;

    loop {
        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        if idx >= bytes.len() {
            break;
        }

        let rest = &line[idx..];

        if let Some(m) = COMMENT.find(rest) {
            debug_assert_eq!(m.start(), 0);
            idx += m.end();
            continue;
        }

        let matched = PATTERNS.iter().find_map(|p| p.regex.find(rest).map(|m| (p.kind, m)));

        match matched {
            Some((kind, m)) => {
                let lexeme = &rest[..m.end()];
                let position = Position::new(line_num, idx + 1);
                log::trace!("token {:?} {:?} at {}", kind, lexeme, position);
                tokens.push(Token::new(kind, lexeme, position));
                idx += m.end();
            }
            None => {
                let diag = crate::error::Diagnostic::new(
                    "invalid token",
                    format!("no token pattern matches at column {}", idx + 1),
                    Position::new(line_num, idx + 1),
                )
                .with_source_line(line.to_string());
                return Err(TokenizeError::InvalidToken(diag));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(toks: &[Token]) -> Vec<TokenKind> {
        toks.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_section_header() {
        let toks = tokenize("[Foo]\n").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Section);
        assert_eq!(toks[0].lexeme, "[Foo]");
        assert_eq!(toks[1].kind, TokenKind::Newline);
    }

    #[test]
    fn no_newline_token_on_unterminated_final_line() {
        let toks = tokenize("I32 foo").unwrap();
        assert_eq!(kinds(&toks), vec![TokenKind::Identifier, TokenKind::Identifier]);
    }

    #[test]
    fn negative_constant_adjacent_to_digit_is_one_token() {
        let toks = tokenize("x = -1").unwrap();
        assert_eq!(toks[2].kind, TokenKind::Constant);
        assert_eq!(toks[2].lexeme, "-1");
    }

    #[test]
    fn minus_with_space_is_sub_operator() {
        let toks = tokenize("a - 1").unwrap();
        assert_eq!(toks[1].kind, TokenKind::Operator);
        assert_eq!(toks[1].lexeme, "-");
    }

    #[test]
    fn keyword_if_is_distinct_from_identifier() {
        let toks = tokenize("if x").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Keyword);
        assert_eq!(toks[1].kind, TokenKind::Identifier);
    }

    #[test]
    fn logical_keyword_operators_do_not_swallow_identifier_prefixes() {
        let toks = tokenize("android or bar").unwrap();
        assert_eq!(kinds(&toks), vec![TokenKind::Identifier, TokenKind::Operator, TokenKind::Identifier]);
        assert_eq!(toks[0].lexeme, "android");
    }

    #[test]
    fn comment_is_dropped() {
        let toks = tokenize("x = 1 # trailing comment\n").unwrap();
        assert!(toks.iter().all(|t| t.lexeme != "# trailing comment"));
    }

    #[test]
    fn invalid_character_reports_column() {
        let err = tokenize("x = $").unwrap_err();
        match err {
            TokenizeError::InvalidToken(diag) => assert_eq!(diag.position, Position::new(1, 5)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn alias_annotation_allows_equals_sign() {
        let toks = tokenize("@ALIAS=FOO").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Annotation);
        assert_eq!(toks[0].lexeme, "@ALIAS=FOO");
    }
}
