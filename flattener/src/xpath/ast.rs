//! Expression tree and recursive-descent parser.

use super::functions;
use super::lexer::{tokenize, Spanned, Token};
use crate::error::{XPathError, XPathResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Attribute,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "attribute" => Axis::Attribute,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            _ => return None,
        })
    }

    /// Reverse axes number their nodes nearest-first.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling | Axis::Preceding
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// Qualified name, matched against the full node name.
    Name(String),
    Wildcard,
    PrefixWildcard(String),
    Text,
    Comment,
    Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// The operator with its operands swapped.
    pub fn flipped(self) -> CompareOp {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The empty expression: the context node itself.
    Empty,
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Variable(String),
    Function(String, Vec<Expr>),
    /// Location path; `absolute` paths start at the document node.
    Path { absolute: bool, steps: Vec<Step> },
    /// Primary expression with predicates, optionally continued by steps.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

struct Parser {
    tokens: Vec<Spanned>,
    idx: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.idx).map(|s| &s.token)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.idx).map(|s| s.position).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.idx).map(|s| s.token.clone());
        if t.is_some() {
            self.idx += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> XPathResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(XPathError::syntax(self.pos(), format!("expected {}", what)))
        }
    }

    fn parse_expr(&mut self) -> XPathResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::And) {
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::Neq) => CompareOp::Neq,
                _ => break,
            };
            self.idx += 1;
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                _ => break,
            };
            self.idx += 1;
            let right = self.parse_additive()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.idx += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Multiply) => ArithOp::Mul,
                Some(Token::Div) => ArithOp::Div,
                Some(Token::Mod) => ArithOp::Mod,
                _ => break,
            };
            self.idx += 1;
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> XPathResult<Expr> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_path()?;
        while self.eat(&Token::Pipe) {
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Name(_)
                    | Token::Wildcard
                    | Token::PrefixWildcard(_)
                    | Token::At
                    | Token::Dot
                    | Token::DotDot
                    | Token::AxisName(_)
                    | Token::NodeType(_)
            )
        )
    }

    fn parse_path(&mut self) -> XPathResult<Expr> {
        match self.peek() {
            Some(Token::Slash) => {
                self.idx += 1;
                let steps = if self.starts_step() {
                    self.parse_relative_steps()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.idx += 1;
                let mut steps = vec![Step::descendant_or_self()];
                steps.extend(self.parse_relative_steps()?);
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            _ if self.starts_step() => Ok(Expr::Path {
                absolute: false,
                steps: self.parse_relative_steps()?,
            }),
            _ => self.parse_filter(),
        }
    }

    fn parse_filter(&mut self) -> XPathResult<Expr> {
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        let steps = match self.peek() {
            Some(Token::Slash) => {
                self.idx += 1;
                self.parse_relative_steps()?
            }
            Some(Token::DoubleSlash) => {
                self.idx += 1;
                let mut steps = vec![Step::descendant_or_self()];
                steps.extend(self.parse_relative_steps()?);
                steps
            }
            _ => Vec::new(),
        };
        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn parse_primary(&mut self) -> XPathResult<Expr> {
        let position = self.pos();
        match self.advance() {
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Variable(v)) => Ok(Expr::Variable(v)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::FunctionName(name)) => {
                self.expect(&Token::LParen, "'('")?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(&Token::RParen, "',' or ')'")?;
                        break;
                    }
                }
                functions::check_arity(&name, args.len())
                    .map_err(|msg| XPathError::syntax(position, msg))?;
                Ok(Expr::Function(name, args))
            }
            Some(other) => Err(XPathError::syntax(
                position,
                format!("unexpected token {:?}", other),
            )),
            None => Err(XPathError::syntax(position, "unexpected end of expression")),
        }
    }

    fn parse_predicates(&mut self) -> XPathResult<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_expr()?);
            self.expect(&Token::RBracket, "']'")?;
        }
        Ok(predicates)
    }

    fn parse_relative_steps(&mut self) -> XPathResult<Vec<Step>> {
        let mut steps = vec![self.parse_step()?];
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.idx += 1;
                    steps.push(self.parse_step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.idx += 1;
                    steps.push(Step::descendant_or_self());
                    steps.push(self.parse_step()?);
                }
                _ => break,
            }
        }
        Ok(steps)
    }

    fn parse_step(&mut self) -> XPathResult<Step> {
        let position = self.pos();
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let Some(Token::AxisName(name)) = self.peek().cloned() {
            self.idx += 1;
            self.expect(&Token::ColonColon, "'::'")?;
            Axis::from_name(&name)
                .ok_or_else(|| XPathError::syntax(position, format!("unknown axis '{}'", name)))?
        } else {
            Axis::Child
        };

        let test_pos = self.pos();
        let test = match self.advance() {
            Some(Token::Name(n)) => NodeTest::Name(n),
            Some(Token::Wildcard) => NodeTest::Wildcard,
            Some(Token::PrefixWildcard(p)) => NodeTest::PrefixWildcard(p),
            Some(Token::NodeType(t)) => {
                self.expect(&Token::LParen, "'('")?;
                self.expect(&Token::RParen, "')'")?;
                match t.as_str() {
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    "node" => NodeTest::Node,
                    other => {
                        return Err(XPathError::syntax(
                            test_pos,
                            format!("node type '{}()' is not supported", other),
                        ))
                    }
                }
            }
            _ => return Err(XPathError::syntax(test_pos, "expected a node test")),
        };

        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }
}

/// Parse an expression. Blank input yields [`Expr::Empty`].
pub fn parse(src: &str) -> XPathResult<Expr> {
    if src.trim().is_empty() {
        return Ok(Expr::Empty);
    }
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        end: src.len(),
    };
    let expr = parser.parse_expr()?;
    if parser.idx < parser.tokens.len() {
        return Err(XPathError::syntax(
            parser.pos(),
            format!("unexpected trailing {:?}", parser.tokens[parser.idx].token),
        ));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path() {
        let expr = parse("a/b").unwrap();
        match expr {
            Expr::Path { absolute, steps } => {
                assert!(!absolute);
                assert_eq!(steps.len(), 2);
                assert_eq!(steps[1].test, NodeTest::Name("b".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_double_slash_expands() {
        let expr = parse("//item").unwrap();
        match expr {
            Expr::Path { absolute, steps } => {
                assert!(absolute);
                assert_eq!(steps[0].axis, Axis::DescendantOrSelf);
                assert_eq!(steps[1].test, NodeTest::Name("item".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_attribute_and_predicate() {
        let expr = parse("item[@id = 'x'][2]/@name").unwrap();
        match expr {
            Expr::Path { steps, .. } => {
                assert_eq!(steps[0].predicates.len(), 2);
                assert_eq!(steps[1].axis, Axis::Attribute);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_function_with_path_argument() {
        let expr = parse("concat(a, '-', count(b))").unwrap();
        assert!(matches!(expr, Expr::Function(ref n, ref args) if n == "concat" && args.len() == 3));
    }

    #[test]
    fn test_operator_precedence() {
        let expr = parse("1 + 2 * 3 = 7 and true()").unwrap();
        assert!(matches!(expr, Expr::And(_, _)));
    }

    #[test]
    fn test_empty_expression() {
        assert_eq!(parse("  ").unwrap(), Expr::Empty);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("a[").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("unknown-fn(1)").is_err());
        assert!(parse("bogus::a").is_err());
        assert!(parse("a/").is_err());
    }
}
