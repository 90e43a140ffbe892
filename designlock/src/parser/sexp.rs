//! Minimal S-expression reader for KiCad board files.
//!
//! Only structure is recovered: lists and atoms. Quoted strings become atoms
//! with escapes resolved. Errors carry the 1-based line they were found on.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SExpError {
    #[error("unexpected end of input (list opened on line {0} never closed)")]
    UnexpectedEof(usize),
    #[error("unbalanced ')' on line {0}")]
    UnbalancedClose(usize),
    #[error("unterminated string starting on line {0}")]
    UnterminatedString(usize),
    #[error("empty input")]
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SExp {
    Atom(String),
    List(Vec<SExp>),
}

impl SExp {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExp::Atom(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            SExp::List(items) => Some(items),
            _ => None,
        }
    }

    /// Leading atom of a list: `gr_rect` for `(gr_rect ...)`.
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_atom()
    }

    pub fn is(&self, head: &str) -> bool {
        self.head() == Some(head)
    }

    /// First direct child list whose head is `key`.
    pub fn find(&self, key: &str) -> Option<&SExp> {
        self.as_list()?.iter().find(|child| child.is(key))
    }

    /// Every direct child list whose head is `key`.
    pub fn find_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a SExp> + 'a {
        self.as_list()
            .unwrap_or(&[])
            .iter()
            .filter(move |child| child.is(key))
    }

    /// Atom at `index` of this list (index 0 is the head).
    pub fn atom(&self, index: usize) -> Option<&str> {
        self.as_list()?.get(index)?.as_atom()
    }

    pub fn number(&self, index: usize) -> Option<f64> {
        self.atom(index)?.parse().ok()
    }

    /// Depth-first visit of this node and every descendant.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a SExp)) {
        visit(self);
        if let SExp::List(items) = self {
            for item in items {
                item.walk(visit);
            }
        }
    }
}

pub struct SExpParser<'a> {
    input: &'a [u8],
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> SExpParser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            text: input,
            pos: 0,
            line: 1,
        }
    }

    /// Parse the first expression in the input. Anything after it is ignored.
    pub fn parse(&mut self) -> Result<SExp, SExpError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(SExpError::Empty),
            Some(b')') => Err(SExpError::UnbalancedClose(self.line)),
            Some(_) => self.parse_expr(),
        }
    }

    fn parse_expr(&mut self) -> Result<SExp, SExpError> {
        match self.peek() {
            Some(b'(') => self.parse_list(),
            Some(b'"') => self.parse_string(),
            _ => Ok(self.parse_symbol()),
        }
    }

    fn parse_list(&mut self) -> Result<SExp, SExpError> {
        let opened_on = self.line;
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(SExpError::UnexpectedEof(opened_on)),
                Some(b')') => {
                    self.pos += 1;
                    return Ok(SExp::List(items));
                }
                Some(_) => items.push(self.parse_expr()?),
            }
        }
    }

    fn parse_string(&mut self) -> Result<SExp, SExpError> {
        let started_on = self.line;
        self.pos += 1;
        let mut bytes = Vec::new();
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'"' => return Ok(SExp::Atom(String::from_utf8_lossy(&bytes).into_owned())),
                b'\\' => {
                    let Some(escaped) = self.peek() else {
                        break;
                    };
                    self.pos += 1;
                    bytes.push(match escaped {
                        b'n' => b'\n',
                        b't' => b'\t',
                        other => other,
                    });
                }
                b'\n' => {
                    self.line += 1;
                    bytes.push(b);
                }
                _ => bytes.push(b),
            }
        }
        Err(SExpError::UnterminatedString(started_on))
    }

    fn parse_symbol(&mut self) -> SExp {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || b == b'(' || b == b')' || b == b'"' {
                break;
            }
            self.pos += 1;
        }
        SExp::Atom(self.text[start..self.pos].to_string())
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if !b.is_ascii_whitespace() {
                break;
            }
            if b == b'\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<SExp, SExpError> {
        SExpParser::new(text).parse()
    }

    #[test]
    fn test_nested_lists_and_strings() {
        let sexp = parse("(kicad_pcb (version 20221018)\n  (gr_rect (start 0 0) (end 80 50) (layer \"Edge.Cuts\")))").unwrap();
        assert!(sexp.is("kicad_pcb"));
        assert_eq!(sexp.find("version").and_then(|v| v.number(1)), Some(20221018.0));

        let rect = sexp.find("gr_rect").unwrap();
        assert_eq!(rect.find("end").and_then(|e| e.number(1)), Some(80.0));
        assert_eq!(rect.find("layer").and_then(|l| l.atom(1)), Some("Edge.Cuts"));
    }

    #[test]
    fn test_find_all_and_walk() {
        let sexp = parse("(root (pad 1) (pad 2) (other (pad 3)))").unwrap();
        assert_eq!(sexp.find_all("pad").count(), 2);

        let mut pads = 0;
        sexp.walk(&mut |node| {
            if node.is("pad") {
                pads += 1;
            }
        });
        assert_eq!(pads, 3);
    }

    #[test]
    fn test_string_escapes_and_utf8() {
        let sexp = parse(r#"(property "Value" "say \"10 kΩ\"")"#).unwrap();
        assert_eq!(sexp.atom(2), Some("say \"10 kΩ\""));
    }

    #[test]
    fn test_errors_carry_line() {
        assert_eq!(parse("(a\n(b c)\n"), Err(SExpError::UnexpectedEof(1)));
        assert_eq!(parse("(a \"open\n"), Err(SExpError::UnterminatedString(1)));
        assert_eq!(parse("\n\n)"), Err(SExpError::UnbalancedClose(3)));
        assert_eq!(parse("   "), Err(SExpError::Empty));
    }
}
