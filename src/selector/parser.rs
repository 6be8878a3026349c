//! Recursive-descent selector parser
//!
//! Hand-rolled over a char buffer so errors carry exact positions.
//! Parsing is the only place a selector can fail; everything the
//! evaluator consumes is validated here, except relationship labels,
//! which stay forward compatible: an unknown label parses but matches
//! nothing.

use crate::neighbor::RelationshipType;
use crate::prelude;
use crate::shape::ShapeType;
use crate::shape_id::ShapeId;

use super::{
    AttributePath, AttributeSelector, AttributeTerm, Comparator, Comparison, PathRoot,
    PathSegment, Selector, SelectorSyntaxError, Step, TypeFilter,
};

pub(super) fn parse(text: &str) -> Result<Selector, SelectorSyntaxError> {
    let mut parser = Parser::new(text);
    let steps = parser.parse_steps(&[])?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    if steps.is_empty() {
        return Err(parser.error("empty selector"));
    }
    Ok(Selector::from_parts(text.to_string(), steps))
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), SelectorSyntaxError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected `{expected}`, found `{c}`"))),
            None => Err(self.error(format!("expected `{expected}`, found end of input"))),
        }
    }

    fn error(&self, message: impl Into<String>) -> SelectorSyntaxError {
        SelectorSyntaxError {
            position: self.pos,
            message: message.into(),
        }
    }

    fn parse_identifier(&mut self) -> Result<String, SelectorSyntaxError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected an identifier"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    /// Steps until end of input or one of `stop`
    fn parse_steps(&mut self, stop: &[char]) -> Result<Vec<Step>, SelectorSyntaxError> {
        let mut steps = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(c) if stop.contains(&c) => break,
                Some('*') => {
                    self.pos += 1;
                    steps.push(Step::Types(TypeFilter::Any));
                }
                Some('[') => steps.push(Step::Attribute(self.parse_attribute()?)),
                Some('>') => {
                    self.pos += 1;
                    steps.push(Step::Forward(None));
                }
                Some('<') => {
                    self.pos += 1;
                    if self.peek() == Some('-') && self.peek_at(1) == Some('[') {
                        self.pos += 1;
                        let relationships = self.parse_relationship_list()?;
                        self.expect('-')?;
                        steps.push(Step::Reverse(Some(relationships)));
                    } else {
                        steps.push(Step::Reverse(None));
                    }
                }
                Some('~') => {
                    self.pos += 1;
                    self.expect('>')?;
                    steps.push(Step::Recursive);
                }
                Some('-') => {
                    self.pos += 1;
                    let relationships = self.parse_relationship_list()?;
                    self.expect('-')?;
                    self.expect('>')?;
                    steps.push(Step::Forward(Some(relationships)));
                }
                Some(':') => {
                    self.pos += 1;
                    steps.push(self.parse_function()?);
                }
                Some('$') => {
                    self.pos += 1;
                    let name = self.parse_identifier()?;
                    self.expect('(')?;
                    let inner = self.parse_steps(&[')'])?;
                    self.expect(')')?;
                    steps.push(Step::Variable {
                        name,
                        selector: Selector::from_parts(String::new(), inner),
                    });
                }
                Some(c) if c.is_ascii_alphabetic() => {
                    steps.push(Step::Types(self.parse_type_filter()?));
                }
                Some(c) => return Err(self.error(format!("unexpected character `{c}`"))),
            }
        }
        Ok(steps)
    }

    fn parse_type_filter(&mut self) -> Result<TypeFilter, SelectorSyntaxError> {
        let start = self.pos;
        let token = self.parse_identifier()?;
        match token.as_str() {
            "number" => Ok(TypeFilter::Number),
            "simpleType" => Ok(TypeFilter::Simple),
            "collection" => Ok(TypeFilter::Collection),
            _ => token.parse::<ShapeType>().map(TypeFilter::Exact).map_err(|_| {
                SelectorSyntaxError {
                    position: start,
                    message: format!("unknown shape type `{token}`"),
                }
            }),
        }
    }

    /// `[label, label, ...]` after the opening `[` of an edge constraint
    fn parse_relationship_list(&mut self) -> Result<Vec<RelationshipType>, SelectorSyntaxError> {
        self.expect('[')?;
        let mut relationships = Vec::new();
        loop {
            self.skip_ws();
            let label = self.parse_identifier()?;
            let matched = RelationshipType::from_selector_label(&label);
            if matched.is_empty() {
                // Unknown labels match nothing rather than failing, so
                // selectors written against newer relationship sets
                // still parse.
                tracing::warn!("unknown relationship label `{label}` in selector");
            }
            relationships.extend(matched);
            self.skip_ws();
            if self.peek() == Some(',') {
                self.pos += 1;
                continue;
            }
            break;
        }
        self.expect(']')?;
        Ok(relationships)
    }

    fn parse_function(&mut self) -> Result<Step, SelectorSyntaxError> {
        let start = self.pos;
        let name = self.parse_identifier()?;
        self.expect('(')?;
        let mut selectors = Vec::new();
        loop {
            let steps = self.parse_steps(&[',', ')'])?;
            if steps.is_empty() {
                return Err(self.error("expected a selector argument"));
            }
            selectors.push(Selector::from_parts(String::new(), steps));
            if self.peek() == Some(',') {
                self.pos += 1;
                continue;
            }
            break;
        }
        self.expect(')')?;
        match name.as_str() {
            "is" => Ok(Step::Is(selectors)),
            "not" => Ok(Step::Not(selectors)),
            "test" => Ok(Step::Test(selectors)),
            _ => Err(SelectorSyntaxError {
                position: start,
                message: format!("unknown selector function `:{name}`"),
            }),
        }
    }

    fn parse_attribute(&mut self) -> Result<AttributeSelector, SelectorSyntaxError> {
        self.expect('[')?;
        self.skip_ws();
        let negated = if self.peek() == Some('!') {
            self.pos += 1;
            true
        } else {
            false
        };

        let mut terms = Vec::new();
        loop {
            self.skip_ws();
            let path = self.parse_attribute_path()?;
            self.skip_ws();
            let comparison = self.parse_comparison()?;
            terms.push(AttributeTerm { path, comparison });
            self.skip_ws();
            if self.peek() == Some('&') {
                self.expect('&')?;
                self.expect('&')?;
                continue;
            }
            break;
        }

        // Trailing `i` directly before `]` flags case-insensitive
        // comparison.
        let mut case_insensitive = false;
        if self.peek() == Some('i') && self.peek_at(1) == Some(']') {
            self.pos += 1;
            case_insensitive = true;
        }
        self.skip_ws();
        self.expect(']')?;
        Ok(AttributeSelector {
            negated,
            terms,
            case_insensitive,
        })
    }

    fn parse_attribute_path(&mut self) -> Result<AttributePath, SelectorSyntaxError> {
        let start = self.pos;
        let first = self.parse_identifier()?;
        let root = match first.as_str() {
            "id" => PathRoot::Id,
            "service" => PathRoot::Service,
            "trait" => {
                self.expect('|')?;
                let text = self.parse_shape_id_token()?;
                let id = if text.contains('#') {
                    ShapeId::parse(&text)
                } else {
                    ShapeId::parse(&format!("{}#{}", prelude::PRELUDE_NAMESPACE, text))
                };
                PathRoot::Trait(id.map_err(|e| SelectorSyntaxError {
                    position: start,
                    message: e.to_string(),
                })?)
            }
            "var" => {
                self.expect('|')?;
                PathRoot::Var(self.parse_identifier()?)
            }
            other => {
                return Err(SelectorSyntaxError {
                    position: start,
                    message: format!("unknown attribute `{other}`"),
                })
            }
        };

        let mut segments = Vec::new();
        while self.peek() == Some('|') {
            self.pos += 1;
            if self.peek() == Some('(') {
                let keyword_start = self.pos;
                self.pos += 1;
                let keyword = self.parse_identifier()?;
                self.expect(')')?;
                if keyword != "length" {
                    return Err(SelectorSyntaxError {
                        position: keyword_start,
                        message: format!("unknown path function `({keyword})`"),
                    });
                }
                segments.push(PathSegment::Length);
            } else {
                segments.push(PathSegment::Key(self.parse_path_key()?));
            }
        }
        Ok(AttributePath { root, segments })
    }

    /// A path key: identifier, array index, or quoted string
    fn parse_path_key(&mut self) -> Result<String, SelectorSyntaxError> {
        match self.peek() {
            Some('\'') | Some('"') => self.parse_quoted(),
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
            _ => self.parse_identifier(),
        }
    }

    /// Shape id text for a `trait|` segment: identifier chars plus
    /// `.`, `#`, `$`
    fn parse_shape_id_token(&mut self) -> Result<String, SelectorSyntaxError> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '#' | '$')
        ) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a trait shape id"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_comparison(&mut self) -> Result<Option<Comparison>, SelectorSyntaxError> {
        let comparator = match (self.peek(), self.peek_at(1)) {
            (Some('='), _) => {
                self.pos += 1;
                Comparator::Equals
            }
            (Some('!'), Some('=')) => {
                self.pos += 2;
                Comparator::NotEquals
            }
            (Some('^'), Some('=')) => {
                self.pos += 2;
                Comparator::StartsWith
            }
            (Some('$'), Some('=')) => {
                self.pos += 2;
                Comparator::EndsWith
            }
            (Some('*'), Some('=')) => {
                self.pos += 2;
                Comparator::Contains
            }
            (Some('?'), Some('=')) => {
                self.pos += 2;
                Comparator::Exists
            }
            (Some('<'), Some('=')) => {
                self.pos += 2;
                Comparator::LessThanOrEqual
            }
            (Some('<'), _) => {
                self.pos += 1;
                Comparator::LessThan
            }
            (Some('>'), Some('=')) => {
                self.pos += 2;
                Comparator::GreaterThanOrEqual
            }
            (Some('>'), _) => {
                self.pos += 1;
                Comparator::GreaterThan
            }
            _ => return Ok(None),
        };

        let mut values = Vec::new();
        loop {
            self.skip_ws();
            values.push(self.parse_value()?);
            self.skip_ws();
            if self.peek() == Some(',') {
                self.pos += 1;
                continue;
            }
            break;
        }
        Ok(Some(Comparison { comparator, values }))
    }

    fn parse_value(&mut self) -> Result<String, SelectorSyntaxError> {
        match self.peek() {
            Some('\'') | Some('"') => self.parse_quoted(),
            _ => {
                let start = self.pos;
                while matches!(
                    self.peek(),
                    Some(c) if c.is_ascii_alphanumeric()
                        || matches!(c, '_' | '.' | '#' | '$' | '-' | '+')
                ) {
                    self.pos += 1;
                }
                if self.pos == start {
                    return Err(self.error("expected a comparison value"));
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
        }
    }

    fn parse_quoted(&mut self) -> Result<String, SelectorSyntaxError> {
        let quote = self.bump().expect("caller checked quote");
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let value: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                return Ok(value);
            }
            self.pos += 1;
        }
        Err(self.error("unterminated string"))
    }
}
