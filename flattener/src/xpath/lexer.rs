//! Tokenizer for selection expressions.
//!
//! Follows the XPath 1.0 lexical disambiguation rules: after a token that
//! can end an operand, `*` is multiplication and `and`/`or`/`div`/`mod` are
//! operators; a name followed by `(` is a function or node type, and a name
//! followed by `::` is an axis.

use crate::error::{XPathError, XPathResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Slash,
    DoubleSlash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    DotDot,
    At,
    Comma,
    ColonColon,
    Pipe,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Multiply,
    And,
    Or,
    Div,
    Mod,
    /// `*` as a name test.
    Wildcard,
    /// `prefix:*`
    PrefixWildcard(String),
    Name(String),
    FunctionName(String),
    NodeType(String),
    AxisName(String),
    Literal(String),
    Number(f64),
    Variable(String),
}

impl Token {
    /// Tokens after which `*` and operator names keep their name meaning.
    fn expects_operand(prev: Option<&Token>) -> bool {
        match prev {
            None => true,
            Some(t) => matches!(
                t,
                Token::At
                    | Token::ColonColon
                    | Token::LParen
                    | Token::LBracket
                    | Token::Comma
                    | Token::Slash
                    | Token::DoubleSlash
                    | Token::Pipe
                    | Token::Plus
                    | Token::Minus
                    | Token::Eq
                    | Token::Neq
                    | Token::Lt
                    | Token::Le
                    | Token::Gt
                    | Token::Ge
                    | Token::Multiply
                    | Token::And
                    | Token::Or
                    | Token::Div
                    | Token::Mod
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub(crate) fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || !c.is_ascii()
}

pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '-' || c == '.'
}

const NODE_TYPES: &[&str] = &["text", "node", "comment", "processing-instruction"];

struct Lexer<'a> {
    chars: Vec<(usize, char)>,
    idx: usize,
    src: &'a str,
    out: Vec<Spanned>,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).map(|&(_, c)| c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).map(|&(_, c)| c)
    }

    fn pos(&self) -> usize {
        self.chars.get(self.idx).map(|&(p, _)| p).unwrap_or(self.src.len())
    }

    fn push(&mut self, token: Token, position: usize) {
        self.out.push(Spanned { token, position });
    }

    fn prev(&self) -> Option<&Token> {
        self.out.last().map(|s| &s.token)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.idx += 1;
        }
    }

    fn read_ncname(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if is_name_char(c) {
                s.push(c);
                self.idx += 1;
            } else {
                break;
            }
        }
        s
    }

    /// Next non-whitespace character without consuming.
    fn lookahead_non_ws(&self) -> (Option<char>, Option<char>) {
        let mut i = self.idx;
        while let Some(&(_, c)) = self.chars.get(i) {
            if !c.is_whitespace() {
                break;
            }
            i += 1;
        }
        (
            self.chars.get(i).map(|&(_, c)| c),
            self.chars.get(i + 1).map(|&(_, c)| c),
        )
    }

    fn read_number(&mut self, start: usize) -> XPathResult<()> {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                s.push(c);
                self.idx += 1;
            } else {
                break;
            }
        }
        let value: f64 = s
            .parse()
            .map_err(|_| XPathError::syntax(start, format!("invalid number '{}'", s)))?;
        self.push(Token::Number(value), start);
        Ok(())
    }

    fn read_name(&mut self, start: usize) -> XPathResult<()> {
        let operand_expected = Token::expects_operand(self.prev());
        let first = self.read_ncname();

        if !operand_expected {
            let op = match first.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "div" => Token::Div,
                "mod" => Token::Mod,
                _ => {
                    return Err(XPathError::syntax(
                        start,
                        format!("expected an operator, found '{}'", first),
                    ))
                }
            };
            self.push(op, start);
            return Ok(());
        }

        // prefix:local or prefix:*
        let mut name = first;
        if self.peek() == Some(':') && self.peek_at(1) != Some(':') {
            match self.peek_at(1) {
                Some('*') => {
                    self.idx += 2;
                    self.push(Token::PrefixWildcard(name), start);
                    return Ok(());
                }
                Some(c) if is_name_start(c) => {
                    self.idx += 1;
                    let local = self.read_ncname();
                    name = format!("{}:{}", name, local);
                }
                _ => return Err(XPathError::syntax(self.pos(), "dangling ':' in name")),
            }
        }

        let token = match self.lookahead_non_ws() {
            (Some('('), _) if NODE_TYPES.contains(&name.as_str()) => Token::NodeType(name),
            (Some('('), _) => Token::FunctionName(name),
            (Some(':'), Some(':')) => Token::AxisName(name),
            _ => Token::Name(name),
        };
        self.push(token, start);
        Ok(())
    }

    fn run(mut self) -> XPathResult<Vec<Spanned>> {
        loop {
            self.skip_ws();
            let start = self.pos();
            let c = match self.peek() {
                Some(c) => c,
                None => break,
            };

            match c {
                '/' => {
                    if self.peek_at(1) == Some('/') {
                        self.idx += 2;
                        self.push(Token::DoubleSlash, start);
                    } else {
                        self.idx += 1;
                        self.push(Token::Slash, start);
                    }
                }
                '(' => {
                    self.idx += 1;
                    self.push(Token::LParen, start);
                }
                ')' => {
                    self.idx += 1;
                    self.push(Token::RParen, start);
                }
                '[' => {
                    self.idx += 1;
                    self.push(Token::LBracket, start);
                }
                ']' => {
                    self.idx += 1;
                    self.push(Token::RBracket, start);
                }
                '.' => match self.peek_at(1) {
                    Some('.') => {
                        self.idx += 2;
                        self.push(Token::DotDot, start);
                    }
                    Some(d) if d.is_ascii_digit() => self.read_number(start)?,
                    _ => {
                        self.idx += 1;
                        self.push(Token::Dot, start);
                    }
                },
                '@' => {
                    self.idx += 1;
                    self.push(Token::At, start);
                }
                ',' => {
                    self.idx += 1;
                    self.push(Token::Comma, start);
                }
                ':' if self.peek_at(1) == Some(':') => {
                    self.idx += 2;
                    self.push(Token::ColonColon, start);
                }
                '|' => {
                    self.idx += 1;
                    self.push(Token::Pipe, start);
                }
                '+' => {
                    self.idx += 1;
                    self.push(Token::Plus, start);
                }
                '-' => {
                    self.idx += 1;
                    self.push(Token::Minus, start);
                }
                '=' => {
                    self.idx += 1;
                    self.push(Token::Eq, start);
                }
                '!' if self.peek_at(1) == Some('=') => {
                    self.idx += 2;
                    self.push(Token::Neq, start);
                }
                '<' => {
                    if self.peek_at(1) == Some('=') {
                        self.idx += 2;
                        self.push(Token::Le, start);
                    } else {
                        self.idx += 1;
                        self.push(Token::Lt, start);
                    }
                }
                '>' => {
                    if self.peek_at(1) == Some('=') {
                        self.idx += 2;
                        self.push(Token::Ge, start);
                    } else {
                        self.idx += 1;
                        self.push(Token::Gt, start);
                    }
                }
                '*' => {
                    self.idx += 1;
                    if Token::expects_operand(self.prev()) {
                        self.push(Token::Wildcard, start);
                    } else {
                        self.push(Token::Multiply, start);
                    }
                }
                '"' | '\'' => {
                    self.idx += 1;
                    let mut s = String::new();
                    loop {
                        match self.peek() {
                            Some(q) if q == c => {
                                self.idx += 1;
                                break;
                            }
                            Some(other) => {
                                s.push(other);
                                self.idx += 1;
                            }
                            None => {
                                return Err(XPathError::syntax(start, "unterminated string literal"))
                            }
                        }
                    }
                    self.push(Token::Literal(s), start);
                }
                '$' => {
                    self.idx += 1;
                    let name = self.read_ncname();
                    if name.is_empty() {
                        return Err(XPathError::syntax(start, "expected a variable name after '$'"));
                    }
                    self.push(Token::Variable(name), start);
                }
                d if d.is_ascii_digit() => self.read_number(start)?,
                n if is_name_start(n) => self.read_name(start)?,
                other => {
                    return Err(XPathError::syntax(
                        start,
                        format!("unexpected character '{}'", other),
                    ))
                }
            }
        }
        Ok(self.out)
    }
}

/// Split an expression into tokens.
pub fn tokenize(src: &str) -> XPathResult<Vec<Spanned>> {
    Lexer {
        chars: src.char_indices().collect(),
        idx: 0,
        src,
        out: Vec::new(),
    }
    .run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_path_tokens() {
        assert_eq!(
            kinds("root/item[@id='x']"),
            vec![
                Token::Name("root".into()),
                Token::Slash,
                Token::Name("item".into()),
                Token::LBracket,
                Token::At,
                Token::Name("id".into()),
                Token::Eq,
                Token::Literal("x".into()),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_star_disambiguation() {
        assert_eq!(kinds("*")[0], Token::Wildcard);
        assert_eq!(
            kinds("2 * 3"),
            vec![Token::Number(2.0), Token::Multiply, Token::Number(3.0)]
        );
        assert_eq!(kinds("a/*")[2], Token::Wildcard);
    }

    #[test]
    fn test_operator_names() {
        assert_eq!(
            kinds("div div div"),
            vec![
                Token::Name("div".into()),
                Token::Div,
                Token::Name("div".into())
            ]
        );
    }

    #[test]
    fn test_functions_axes_and_node_types() {
        assert_eq!(
            kinds("count(child::a/text())"),
            vec![
                Token::FunctionName("count".into()),
                Token::LParen,
                Token::AxisName("child".into()),
                Token::ColonColon,
                Token::Name("a".into()),
                Token::Slash,
                Token::NodeType("text".into()),
                Token::LParen,
                Token::RParen,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_hyphenated_and_prefixed_names() {
        assert_eq!(
            kinds("element-3/ns:sub-1"),
            vec![
                Token::Name("element-3".into()),
                Token::Slash,
                Token::Name("ns:sub-1".into()),
            ]
        );
        assert_eq!(kinds("ns:*"), vec![Token::PrefixWildcard("ns".into())]);
    }

    #[test]
    fn test_unterminated_literal() {
        assert!(matches!(
            tokenize("'abc"),
            Err(XPathError::Syntax { position: 0, .. })
        ));
    }
}
