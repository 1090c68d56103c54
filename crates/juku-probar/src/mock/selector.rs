//! CSS selector subset for the mock document.
//!
//! Supported: type and `*`, `#id`, `.class`, `[attr]`, `[attr=v]`,
//! `[attr*=v]`, `[attr^=v]`, `[attr$=v]`, `[attr~=v]`, `:not(...)`,
//! descendant, `>`, `+` and `~` combinators, and comma lists.

use super::dom::{MockDom, NodeId};
use crate::result::{ProbeError, ProbeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
    Prefix(String),
    Suffix(String),
    Word(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
    negations: Vec<Compound>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    Adjacent,
    Sibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`
    combinators: Vec<Combinator>,
}

/// A parsed selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(Vec<Complex>);

impl SelectorList {
    /// Parse a selector list
    pub fn parse(source: &str) -> ProbeResult<Self> {
        let fail = |message: &str| ProbeError::InvalidPattern {
            pattern: source.to_string(),
            message: message.to_string(),
        };
        let mut parser = Parser {
            chars: source.chars().collect(),
            pos: 0,
        };
        let mut list = Vec::new();
        loop {
            list.push(parser.complex().map_err(fail)?);
            parser.skip_ws();
            match parser.bump() {
                None => break,
                Some(',') => continue,
                Some(_) => return Err(fail("unexpected character")),
            }
        }
        Ok(Self(list))
    }

    /// Whether `node` matches any selector of the list
    #[must_use]
    pub fn matches(&self, dom: &MockDom, node: NodeId) -> bool {
        self.0
            .iter()
            .any(|c| c.matches_at(dom, node, c.compounds.len() - 1))
    }
}

impl Complex {
    fn matches_at(&self, dom: &MockDom, node: NodeId, index: usize) -> bool {
        if !self.compounds[index].matches(dom, node) {
            return false;
        }
        if index == 0 {
            return true;
        }
        let prev = index - 1;
        match self.combinators[prev] {
            Combinator::Child => dom
                .parent(node)
                .is_some_and(|p| self.matches_at(dom, p, prev)),
            Combinator::Descendant => {
                let mut cur = dom.parent(node);
                while let Some(p) = cur {
                    if self.matches_at(dom, p, prev) {
                        return true;
                    }
                    cur = dom.parent(p);
                }
                false
            }
            Combinator::Adjacent => dom
                .prev_sibling(node)
                .is_some_and(|s| self.matches_at(dom, s, prev)),
            Combinator::Sibling => {
                let mut cur = dom.prev_sibling(node);
                while let Some(s) = cur {
                    if self.matches_at(dom, s, prev) {
                        return true;
                    }
                    cur = dom.prev_sibling(s);
                }
                false
            }
        }
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.negations.is_empty()
    }

    fn matches(&self, dom: &MockDom, node: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && !dom.tag(node).eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        self.ids
            .iter()
            .all(|id| dom.attr(node, "id") == Some(id.as_str()))
            && self.classes.iter().all(|c| dom.has_class(node, c))
            && self.attrs.iter().all(|a| a.matches(dom, node))
            && !self.negations.iter().any(|n| n.matches(dom, node))
    }
}

impl AttrSelector {
    fn matches(&self, dom: &MockDom, node: NodeId) -> bool {
        let Some(value) = dom.attr(node, &self.name) else {
            return false;
        };
        match &self.op {
            AttrOp::Exists => true,
            AttrOp::Equals(v) => value == v,
            AttrOp::Contains(v) => value.contains(v.as_str()),
            AttrOp::Prefix(v) => value.starts_with(v.as_str()),
            AttrOp::Suffix(v) => value.ends_with(v.as_str()),
            AttrOp::Word(v) => value.split_whitespace().any(|w| w == v),
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn expect(&mut self, c: char) -> Result<(), &'static str> {
        if self.bump() == Some(c) {
            Ok(())
        } else {
            Err("unbalanced brackets")
        }
    }

    fn ident(&mut self) -> Result<String, &'static str> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err("expected identifier");
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn complex(&mut self) -> Result<Complex, &'static str> {
        self.skip_ws();
        let mut compounds = vec![self.compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                None | Some(',' | ')') => break,
                Some('>') => Combinator::Child,
                Some('+') => Combinator::Adjacent,
                Some('~') => Combinator::Sibling,
                Some(_) if had_ws => Combinator::Descendant,
                Some(_) => return Err("unexpected character"),
            };
            if combinator != Combinator::Descendant {
                self.pos += 1;
                self.skip_ws();
            }
            combinators.push(combinator);
            compounds.push(self.compound()?);
        }
        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn compound(&mut self) -> Result<Compound, &'static str> {
        let mut compound = Compound::default();
        if self.peek() == Some('*') {
            self.pos += 1;
            compound.tag = Some("*".to_string());
        } else if self.peek().is_some_and(char::is_alphabetic) {
            compound.tag = Some(self.ident()?.to_ascii_lowercase());
        }
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    if self.ident()? != "not" {
                        return Err("unsupported pseudo-class");
                    }
                    self.expect('(')?;
                    loop {
                        self.skip_ws();
                        compound.negations.push(self.compound()?);
                        self.skip_ws();
                        match self.bump() {
                            Some(',') => continue,
                            Some(')') => break,
                            _ => return Err("unbalanced brackets"),
                        }
                    }
                }
                _ => break,
            }
        }
        if compound.is_empty() {
            return Err("empty compound selector");
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<AttrSelector, &'static str> {
        self.skip_ws();
        let name = self.ident()?;
        self.skip_ws();
        if self.peek() == Some(']') {
            self.pos += 1;
            return Ok(AttrSelector {
                name,
                op: AttrOp::Exists,
            });
        }
        let op: fn(String) -> AttrOp = match self.bump() {
            Some('=') => AttrOp::Equals,
            Some(prefix @ ('*' | '^' | '$' | '~')) => {
                self.expect('=')?;
                match prefix {
                    '*' => AttrOp::Contains,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    _ => AttrOp::Word,
                }
            }
            _ => return Err("bad attribute operator"),
        };
        self.skip_ws();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.expect(quote)?;
                value
            }
            _ => self.ident()?,
        };
        self.skip_ws();
        self.expect(']')?;
        Ok(AttrSelector {
            name,
            op: op(value),
        })
    }
}
