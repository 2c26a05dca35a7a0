//! State-vector config parsing: token sequence → region/element parse tree.

use std::collections::HashSet;

use crate::cursor::TokenCursor;
use crate::error::{Diagnostic, SvParseError};
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone)]
pub struct ElementParse {
    pub type_token: Token,
    pub name_token: Token,
    pub read_only: bool,
    pub alias: Option<Token>,
}

#[derive(Debug, Clone)]
pub struct RegionParse {
    pub name_token: Token,
    pub plain_name: String,
    pub elements: Vec<ElementParse>,
}

#[derive(Debug, Clone, Default)]
pub struct SvParse {
    pub lock: bool,
    pub regions: Vec<RegionParse>,
}

fn section_name(tok: &Token) -> &str {
    tok.lexeme.trim_start_matches('[').trim_end_matches(']')
}

/// Parse a complete state-vector config. `whitelist` restricts output to the
/// named regions (their bodies are still scanned, just not recorded) — empty
/// means every region is kept.
pub fn parse(tokens: &[Token], whitelist: &[String]) -> Result<SvParse, SvParseError> {
    let mut cur = TokenCursor::new(tokens);
    let mut parse = SvParse::default();
    cur.eat();

    while !cur.eof() {
        let tok = cur.tok();
        match tok.kind {
            TokenKind::Section => {
                let name = section_name(tok).to_string();
                let tok = tok.clone();
                cur.take();

                if name == "options" {
                    parse_options(&mut cur, &mut parse)?;
                } else {
                    if !whitelist.is_empty() && !whitelist.contains(&name) {
                        skip_section_body(&mut cur);
                        continue;
                    }

                    let mut region = RegionParse {
                        name_token: tok,
                        plain_name: name,
                        elements: Vec::new(),
                    };
                    parse_region(&mut cur, &mut region)?;
                    parse.regions.push(region);
                }
            }
            TokenKind::Newline => {
                cur.take();
            }
            _ => {
                return Err(SvParseError::UnexpectedToken(Diagnostic::new(
                    "unexpected token",
                    "expected a section header",
                    tok.position,
                )));
            }
        }
    }

    for name in whitelist {
        if !parse.regions.iter().any(|r| &r.plain_name == name) {
            return Err(SvParseError::UnknownRegion(Diagnostic::new(
                "unknown region",
                format!("no region by the name `{name}`"),
                crate::position::Position::new(0, 0),
            )));
        }
    }

    Ok(parse)
}

fn skip_section_body(cur: &mut TokenCursor) {
    while !cur.eof() && cur.kind() != Some(TokenKind::Section) {
        cur.take();
    }
}

fn parse_options(cur: &mut TokenCursor, parse: &mut SvParse) -> Result<(), SvParseError> {
    while !cur.eof() && cur.kind() != Some(TokenKind::Section) {
        let tok = cur.tok().clone();
        match tok.kind {
            TokenKind::Identifier if tok.lexeme == "lock" => {
                parse.lock = true;
                cur.take();
            }
            TokenKind::Identifier => {
                return Err(SvParseError::UnknownOption(Diagnostic::new(
                    "unknown option",
                    format!("`{}` is not a recognized option", tok.lexeme),
                    tok.position,
                )));
            }
            _ => {
                return Err(SvParseError::UnexpectedToken(Diagnostic::new(
                    "unexpected token",
                    "expected an option name",
                    tok.position,
                )));
            }
        }
    }
    Ok(())
}

fn parse_region(cur: &mut TokenCursor, region: &mut RegionParse) -> Result<(), SvParseError> {
    while !cur.eof() && cur.kind() != Some(TokenKind::Section) {
        let elem = parse_element(cur)?;
        region.elements.push(elem);
    }
    Ok(())
}

fn parse_element(cur: &mut TokenCursor) -> Result<ElementParse, SvParseError> {
    let type_token = cur.tok().clone();
    if type_token.kind != TokenKind::Identifier {
        return Err(SvParseError::ExpectedElementType(Diagnostic::new(
            "expected element type",
            format!("expected an element type, got `{}`", type_token.lexeme),
            type_token.position,
        )));
    }
    cur.take();

    let name_token = cur.tok().clone();
    if name_token.kind != TokenKind::Identifier {
        return Err(SvParseError::ExpectedElementName(Diagnostic::new(
            "expected element name",
            format!("expected element name after type `{}`", type_token.lexeme),
            name_token.position,
        )));
    }

    cur.take();

    let mut read_only = false;
    let mut alias: Option<Token> = None;
    let mut seen_kinds: HashSet<&'static str> = HashSet::new();

    while cur.kind() == Some(TokenKind::Annotation) {
        let ann = cur.tok().clone();
        let body = ann.lexeme.trim_start_matches('@');
        if body == "read_only" {
            if !seen_kinds.insert("read_only") {
                return Err(SvParseError::RedundantAnnotation(Diagnostic::new(
                    "redundant annotation",
                    "`@read_only` repeated on the same element",
                    ann.position,
                )));
            }
            read_only = true;
            cur.take();
        } else if body == "alias" {
            cur.take();
            let name_tok = cur.tok().clone();
            if name_tok.kind != TokenKind::Identifier {
                return Err(SvParseError::BadAlias(Diagnostic::new(
                    "bad alias",
                    "`@alias` must be followed by an identifier",
                    name_tok.position,
                )));
            }
            if alias.is_some() {
                return Err(SvParseError::MultipleAliases(Diagnostic::new(
                    "multiple aliases",
                    "an element may have at most one alias",
                    ann.position,
                )));
            }
            alias = Some(name_tok);
            cur.take();
        } else {
            return Err(SvParseError::UnknownAnnotation(Diagnostic::new(
                "unknown annotation",
                format!("`@{body}` is not recognized here"),
                ann.position,
            )));
        }
    }

    Ok(ElementParse {
        type_token,
        name_token,
        read_only,
        alias,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse_str(src: &str) -> SvParse {
        let toks = tokenize(src).unwrap();
        parse(&toks, &[]).unwrap()
    }

    #[test]
    fn parses_single_region_with_elements() {
        let p = parse_str("[Sensors]\nF32 temp\nI32 count\n");
        assert_eq!(p.regions.len(), 1);
        assert_eq!(p.regions[0].plain_name, "Sensors");
        assert_eq!(p.regions[0].elements.len(), 2);
    }

    #[test]
    fn options_section_sets_lock() {
        let p = parse_str("[options]\nlock\n[Sensors]\nF32 temp\n");
        assert!(p.lock);
    }

    #[test]
    fn read_only_annotation_is_recorded() {
        let p = parse_str("[Sensors]\nF32 temp @read_only\n");
        assert!(p.regions[0].elements[0].read_only);
    }

    #[test]
    fn alias_annotation_is_recorded() {
        let p = parse_str("[Sensors]\nF32 temp @alias degreesC\n");
        assert_eq!(p.regions[0].elements[0].alias.as_ref().unwrap().lexeme, "degreesC");
    }

    #[test]
    fn duplicate_region_or_element_names_parse_fine_and_are_left_to_the_compiler() {
        let p = parse_str("[Sensors]\nF32 temp\nI32 temp\n");
        assert_eq!(p.regions[0].elements.len(), 2);
        let p = parse_str("[Sensors]\nF32 temp\n[Sensors]\nI32 count\n");
        assert_eq!(p.regions.len(), 2);
    }

    #[test]
    fn whitelist_skips_unlisted_regions() {
        let toks = tokenize("[A]\nF32 x\n[B]\nF32 y\n").unwrap();
        let p = parse(&toks, &["A".to_string()]).unwrap();
        assert_eq!(p.regions.len(), 1);
        assert_eq!(p.regions[0].plain_name, "A");
    }

    #[test]
    fn whitelisted_region_missing_is_an_error() {
        let toks = tokenize("[A]\nF32 x\n").unwrap();
        let err = parse(&toks, &["B".to_string()]).unwrap_err();
        assert!(matches!(err, SvParseError::UnknownRegion(_)));
    }
}
