//! Tokenizing and parsing of XPath expressions.
//!
//! The lexer applies the disambiguation rules of XPath 1.0 section 3.7: a
//! `*` or an operator name is an operator only after a token that can end
//! an operand, a name before `(` is a function name or node type, and a
//! name before `::` is an axis name.

use std::fmt;

use super::{XPathError, XmlXPathError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XmlXPathAxisVal {
    AxisAncestor = 1,
    AxisAncestorOrSelf = 2,
    AxisAttribute = 3,
    AxisChild = 4,
    AxisDescendant = 5,
    AxisDescendantOrSelf = 6,
    AxisFollowing = 7,
    AxisFollowingSibling = 8,
    AxisNamespace = 9,
    AxisParent = 10,
    AxisPreceding = 11,
    AxisPrecedingSibling = 12,
    AxisSelf = 13,
}

impl XmlXPathAxisVal {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ancestor" => Self::AxisAncestor,
            "ancestor-or-self" => Self::AxisAncestorOrSelf,
            "attribute" => Self::AxisAttribute,
            "child" => Self::AxisChild,
            "descendant" => Self::AxisDescendant,
            "descendant-or-self" => Self::AxisDescendantOrSelf,
            "following" => Self::AxisFollowing,
            "following-sibling" => Self::AxisFollowingSibling,
            "namespace" => Self::AxisNamespace,
            "parent" => Self::AxisParent,
            "preceding" => Self::AxisPreceding,
            "preceding-sibling" => Self::AxisPrecedingSibling,
            "self" => Self::AxisSelf,
            _ => return None,
        })
    }

    /// Whether the axis walks in reverse document order.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Self::AxisAncestor
                | Self::AxisAncestorOrSelf
                | Self::AxisPreceding
                | Self::AxisPrecedingSibling
        )
    }
}

/// Node type tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlXPathTypeVal {
    NodeTypeNode,
    NodeTypeComment,
    NodeTypeText,
    NodeTypePI,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlXPathNodeTest {
    /// `*` or `prefix:*`.
    All { prefix: Option<String> },
    /// `name` or `prefix:name`.
    Name { prefix: Option<String>, local: String },
    /// `node()`, `text()`, `comment()` or `processing-instruction()`.
    Type(XmlXPathTypeVal),
    /// `processing-instruction('target')`.
    PI(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlXPathStep {
    pub axis: XmlXPathAxisVal,
    pub test: XmlXPathNodeTest,
    pub predicates: Vec<XmlXPathExpr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlXPathBinaryOp {
    Or,
    And,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Where a location path starts.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlXPathPathStart {
    /// `/...`: the root of the context node's tree.
    Root,
    /// A relative path.
    Context,
    /// `expr/...`: the nodes selected by a filter expression.
    Filter(Box<XmlXPathExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlXPathExpr {
    Number(f64),
    Literal(String),
    Variable(String),
    Binary {
        op: XmlXPathBinaryOp,
        left: Box<XmlXPathExpr>,
        right: Box<XmlXPathExpr>,
    },
    Negate(Box<XmlXPathExpr>),
    Union(Box<XmlXPathExpr>, Box<XmlXPathExpr>),
    Function {
        name: String,
        args: Vec<XmlXPathExpr>,
    },
    Path {
        start: XmlXPathPathStart,
        steps: Vec<XmlXPathStep>,
    },
    Filter {
        expr: Box<XmlXPathExpr>,
        predicates: Vec<XmlXPathExpr>,
    },
}

/// A compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlXPathCompExpr {
    pub(crate) source: String,
    pub(crate) expr: XmlXPathExpr,
}

impl XmlXPathCompExpr {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &XmlXPathExpr {
        &self.expr
    }
}

const NODE_TYPE_NAMES: &[&str] = &["comment", "text", "processing-instruction", "node"];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Dot,
    DotDot,
    At,
    Comma,
    ColonColon,
    Slash,
    DoubleSlash,
    Pipe,
    Plus,
    Minus,
    Star,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    And,
    Or,
    Mod,
    Div,
    Number(f64),
    Literal(String),
    /// A name test: `name`, `prefix:name`, `*` or `prefix:*`.
    Name(String),
    Variable(String),
    FunctionName(String),
    NodeType(String),
    AxisName(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeftParen => write!(f, "("),
            Self::RightParen => write!(f, ")"),
            Self::LeftBracket => write!(f, "["),
            Self::RightBracket => write!(f, "]"),
            Self::Dot => write!(f, "."),
            Self::DotDot => write!(f, ".."),
            Self::At => write!(f, "@"),
            Self::Comma => write!(f, ","),
            Self::ColonColon => write!(f, "::"),
            Self::Slash => write!(f, "/"),
            Self::DoubleSlash => write!(f, "//"),
            Self::Pipe => write!(f, "|"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Star => write!(f, "*"),
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanEqual => write!(f, "<="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanEqual => write!(f, ">="),
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
            Self::Mod => write!(f, "mod"),
            Self::Div => write!(f, "div"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Literal(s) => write!(f, "\"{s}\""),
            Self::Variable(name) => write!(f, "${name}"),
            Self::Name(name)
            | Self::FunctionName(name)
            | Self::NodeType(name)
            | Self::AxisName(name) => write!(f, "{name}"),
        }
    }
}

fn is_name_start_char(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c) || c.is_numeric() || matches!(c, '-' | '.' | '\u{B7}')
}

/// Whether `token` can end an operand, which makes a following `*` or
/// operator name an operator.
fn is_operand_ending(token: &Token) -> bool {
    matches!(
        token,
        Token::RightParen
            | Token::RightBracket
            | Token::Dot
            | Token::DotDot
            | Token::Number(_)
            | Token::Literal(_)
            | Token::Name(_)
            | Token::Variable(_)
    )
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    tokens: Vec<(Token, usize)>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            tokens: vec![],
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let input = self.input;
        let start = self.pos;
        while self.peek().is_some_and(&f) {
            self.bump();
        }
        &input[start..self.pos]
    }

    fn preceded_by_operand(&self) -> bool {
        self.tokens.last().is_some_and(|(t, _)| is_operand_ending(t))
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>, XPathError> {
        loop {
            self.eat_while(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
            let start = self.pos;
            let Some(c) = self.peek() else {
                break;
            };
            let token = match c {
                '(' => self.single(Token::LeftParen),
                ')' => self.single(Token::RightParen),
                '[' => self.single(Token::LeftBracket),
                ']' => self.single(Token::RightBracket),
                '@' => self.single(Token::At),
                ',' => self.single(Token::Comma),
                '|' => self.single(Token::Pipe),
                '+' => self.single(Token::Plus),
                '-' => self.single(Token::Minus),
                '=' => self.single(Token::Equal),
                '*' => {
                    self.bump();
                    if self.preceded_by_operand() {
                        Token::Star
                    } else {
                        Token::Name("*".to_owned())
                    }
                }
                ':' if self.peek_at(1) == Some(':') => {
                    self.bump();
                    self.bump();
                    Token::ColonColon
                }
                '/' => {
                    self.bump();
                    if self.peek() == Some('/') {
                        self.bump();
                        Token::DoubleSlash
                    } else {
                        Token::Slash
                    }
                }
                '!' if self.peek_at(1) == Some('=') => {
                    self.bump();
                    self.bump();
                    Token::NotEqual
                }
                '<' | '>' => {
                    self.bump();
                    let eq = self.peek() == Some('=');
                    if eq {
                        self.bump();
                    }
                    match (c, eq) {
                        ('<', false) => Token::LessThan,
                        ('<', true) => Token::LessThanEqual,
                        (_, false) => Token::GreaterThan,
                        (_, true) => Token::GreaterThanEqual,
                    }
                }
                '.' if self.peek_at(1) == Some('.') => {
                    self.bump();
                    self.bump();
                    Token::DotDot
                }
                '.' if !self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.single(Token::Dot)
                }
                '.' | '0'..='9' => self.number(start)?,
                '"' | '\'' => {
                    self.bump();
                    let literal = self.eat_while(|d| d != c);
                    if self.peek().is_none() {
                        return Err(XPathError::from_code(
                            XmlXPathError::XPathUnfinishedLiteralError,
                        )
                        .at(start));
                    }
                    self.bump();
                    Token::Literal(literal.to_owned())
                }
                '$' => {
                    self.bump();
                    if !self.peek().is_some_and(is_name_start_char) {
                        return Err(XPathError::from_code(XmlXPathError::XPathVariableRefError)
                            .at(start));
                    }
                    Token::Variable(self.qname().to_owned())
                }
                c if is_name_start_char(c) => self.name_token(),
                _ => {
                    return Err(XPathError::new(
                        XmlXPathError::XPathInvalidCharError,
                        format!("Unexpected character '{c}'"),
                    )
                    .at(start));
                }
            };
            self.tokens.push((token, start));
        }
        Ok(self.tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.bump();
        token
    }

    fn number(&mut self, start: usize) -> Result<Token, XPathError> {
        self.eat_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit());
        }
        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| XPathError::from_code(XmlXPathError::XPathNumberError).at(start))
    }

    /// An NCName optionally followed by `:` and another NCName.
    fn qname(&mut self) -> &'a str {
        let input = self.input;
        let start = self.pos;
        self.eat_while(is_name_char);
        if self.peek() == Some(':') && self.peek_at(1).is_some_and(is_name_start_char) {
            self.bump();
            self.eat_while(is_name_char);
        }
        &input[start..self.pos]
    }

    fn name_token(&mut self) -> Token {
        let start = self.pos;
        let name = self.qname();
        // prefix:*
        if !name.contains(':') && self.peek() == Some(':') && self.peek_at(1) == Some('*') {
            self.bump();
            self.bump();
            return Token::Name(self.input[start..self.pos].to_owned());
        }
        if self.preceded_by_operand() {
            match name {
                "and" => return Token::And,
                "or" => return Token::Or,
                "mod" => return Token::Mod,
                "div" => return Token::Div,
                _ => {}
            }
        }
        let rest = self.input[self.pos..].trim_start();
        if rest.starts_with('(') {
            if NODE_TYPE_NAMES.contains(&name) {
                Token::NodeType(name.to_owned())
            } else {
                Token::FunctionName(name.to_owned())
            }
        } else if rest.starts_with("::") {
            Token::AxisName(name.to_owned())
        } else {
            Token::Name(name.to_owned())
        }
    }
}

/// Maximum nesting accepted while compiling. Every nested expression,
/// operator or negation costs 10.
const XPATH_MAX_RECURSION_DEPTH: usize = 5000;
const NESTING_COST: usize = 10;

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |&(_, p)| p)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, code: XmlXPathError) -> XPathError {
        let message = match self.peek() {
            Some(token) => format!("{} near '{token}'", code.default_message()),
            None => format!("{} at end of expression", code.default_message()),
        };
        XPathError::new(code, message).at(self.offset())
    }

    fn expect(&mut self, token: &Token, code: XmlXPathError) -> Result<(), XPathError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(code))
        }
    }

    /// Enter `levels` more levels of nesting.
    fn descend(&mut self, levels: usize) -> Result<(), XPathError> {
        let depth = self.depth + levels * NESTING_COST;
        if depth > XPATH_MAX_RECURSION_DEPTH {
            return Err(self.error(XmlXPathError::XPathRecursionLimitExceeded));
        }
        self.depth = depth;
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth -= levels * NESTING_COST;
    }

    fn binary(
        &mut self,
        next: fn(&mut Self) -> Result<XmlXPathExpr, XPathError>,
        ops: &[(Token, XmlXPathBinaryOp)],
    ) -> Result<XmlXPathExpr, XPathError> {
        let mut left = next(self)?;
        // each operator nests the expression on its left one level deeper
        let mut folds = 0;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    self.descend(1)?;
                    folds += 1;
                    let right = next(self)?;
                    left = XmlXPathExpr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            self.ascend(folds);
            return Ok(left);
        }
    }

    #[doc(alias = "xmlXPathCompileExpr")]
    fn expr(&mut self) -> Result<XmlXPathExpr, XPathError> {
        self.descend(1)?;
        let expr = self.binary(Self::and_expr, &[(Token::Or, XmlXPathBinaryOp::Or)])?;
        self.ascend(1);
        Ok(expr)
    }

    fn and_expr(&mut self) -> Result<XmlXPathExpr, XPathError> {
        self.binary(Self::equality_expr, &[(Token::And, XmlXPathBinaryOp::And)])
    }

    fn equality_expr(&mut self) -> Result<XmlXPathExpr, XPathError> {
        self.binary(
            Self::relational_expr,
            &[
                (Token::Equal, XmlXPathBinaryOp::Eq),
                (Token::NotEqual, XmlXPathBinaryOp::Neq),
            ],
        )
    }

    fn relational_expr(&mut self) -> Result<XmlXPathExpr, XPathError> {
        self.binary(
            Self::additive_expr,
            &[
                (Token::LessThan, XmlXPathBinaryOp::Lt),
                (Token::LessThanEqual, XmlXPathBinaryOp::Lte),
                (Token::GreaterThan, XmlXPathBinaryOp::Gt),
                (Token::GreaterThanEqual, XmlXPathBinaryOp::Gte),
            ],
        )
    }

    fn additive_expr(&mut self) -> Result<XmlXPathExpr, XPathError> {
        self.binary(
            Self::multiplicative_expr,
            &[
                (Token::Plus, XmlXPathBinaryOp::Add),
                (Token::Minus, XmlXPathBinaryOp::Sub),
            ],
        )
    }

    fn multiplicative_expr(&mut self) -> Result<XmlXPathExpr, XPathError> {
        self.binary(
            Self::unary_expr,
            &[
                (Token::Star, XmlXPathBinaryOp::Mul),
                (Token::Div, XmlXPathBinaryOp::Div),
                (Token::Mod, XmlXPathBinaryOp::Mod),
            ],
        )
    }

    fn unary_expr(&mut self) -> Result<XmlXPathExpr, XPathError> {
        if self.eat(&Token::Minus) {
            self.descend(1)?;
            let operand = self.unary_expr()?;
            self.ascend(1);
            return Ok(XmlXPathExpr::Negate(Box::new(operand)));
        }
        self.union_expr()
    }

    fn union_expr(&mut self) -> Result<XmlXPathExpr, XPathError> {
        let mut left = self.path_expr()?;
        let mut folds = 0;
        while self.eat(&Token::Pipe) {
            self.descend(1)?;
            folds += 1;
            let right = self.path_expr()?;
            left = XmlXPathExpr::Union(Box::new(left), Box::new(right));
        }
        self.ascend(folds);
        Ok(left)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Name(_)
                    | Token::NodeType(_)
                    | Token::AxisName(_)
                    | Token::At
                    | Token::Dot
                    | Token::DotDot
            )
        )
    }

    fn path_expr(&mut self) -> Result<XmlXPathExpr, XPathError> {
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                let steps = if self.starts_step() {
                    self.relative_path()?
                } else {
                    vec![]
                };
                Ok(XmlXPathExpr::Path {
                    start: XmlXPathPathStart::Root,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                let mut steps = vec![descendant_or_self()];
                steps.extend(self.relative_path()?);
                Ok(XmlXPathExpr::Path {
                    start: XmlXPathPathStart::Root,
                    steps,
                })
            }
            _ if self.starts_step() => Ok(XmlXPathExpr::Path {
                start: XmlXPathPathStart::Context,
                steps: self.relative_path()?,
            }),
            _ => {
                let filter = self.filter_expr()?;
                let mut steps = vec![];
                match self.peek() {
                    Some(Token::Slash) => {
                        self.pos += 1;
                        steps.extend(self.relative_path()?);
                    }
                    Some(Token::DoubleSlash) => {
                        self.pos += 1;
                        steps.push(descendant_or_self());
                        steps.extend(self.relative_path()?);
                    }
                    _ => return Ok(filter),
                }
                Ok(XmlXPathExpr::Path {
                    start: XmlXPathPathStart::Filter(Box::new(filter)),
                    steps,
                })
            }
        }
    }

    fn filter_expr(&mut self) -> Result<XmlXPathExpr, XPathError> {
        let primary = self.primary_expr()?;
        let predicates = self.predicates()?;
        if predicates.is_empty() {
            Ok(primary)
        } else {
            Ok(XmlXPathExpr::Filter {
                expr: Box::new(primary),
                predicates,
            })
        }
    }

    fn primary_expr(&mut self) -> Result<XmlXPathExpr, XPathError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(XmlXPathExpr::Number(n)),
            Some(Token::Literal(s)) => Ok(XmlXPathExpr::Literal(s)),
            Some(Token::Variable(name)) => Ok(XmlXPathExpr::Variable(name)),
            Some(Token::LeftParen) => {
                let expr = self.expr()?;
                self.expect(&Token::RightParen, XmlXPathError::XPathExprError)?;
                Ok(expr)
            }
            Some(Token::FunctionName(name)) => {
                self.expect(&Token::LeftParen, XmlXPathError::XPathExprError)?;
                let mut args = vec![];
                if !self.eat(&Token::RightParen) {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(&Token::RightParen) {
                            break;
                        }
                        self.expect(&Token::Comma, XmlXPathError::XPathExprError)?;
                    }
                }
                Ok(XmlXPathExpr::Function { name, args })
            }
            other => {
                if other.is_some() {
                    self.pos -= 1;
                }
                Err(self.error(XmlXPathError::XPathExprError))
            }
        }
    }

    fn predicates(&mut self) -> Result<Vec<XmlXPathExpr>, XPathError> {
        let mut predicates = vec![];
        while self.eat(&Token::LeftBracket) {
            if self.peek() == Some(&Token::RightBracket) {
                return Err(self.error(XmlXPathError::XPathInvalidPredicateError));
            }
            predicates.push(self.expr()?);
            self.expect(&Token::RightBracket, XmlXPathError::XPathInvalidPredicateError)?;
        }
        Ok(predicates)
    }

    fn relative_path(&mut self) -> Result<Vec<XmlXPathStep>, XPathError> {
        let mut steps = vec![self.step()?];
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                    steps.push(self.step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(descendant_or_self());
                    steps.push(self.step()?);
                }
                _ => return Ok(steps),
            }
        }
    }

    #[doc(alias = "xmlXPathCompStep")]
    fn step(&mut self) -> Result<XmlXPathStep, XPathError> {
        if self.eat(&Token::Dot) {
            return Ok(XmlXPathStep {
                axis: XmlXPathAxisVal::AxisSelf,
                test: XmlXPathNodeTest::Type(XmlXPathTypeVal::NodeTypeNode),
                predicates: vec![],
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(XmlXPathStep {
                axis: XmlXPathAxisVal::AxisParent,
                test: XmlXPathNodeTest::Type(XmlXPathTypeVal::NodeTypeNode),
                predicates: vec![],
            });
        }
        let axis = match self.peek() {
            Some(Token::At) => {
                self.pos += 1;
                XmlXPathAxisVal::AxisAttribute
            }
            Some(Token::AxisName(name)) => {
                let Some(axis) = XmlXPathAxisVal::from_name(name) else {
                    return Err(self.error(XmlXPathError::XPathExprError));
                };
                self.pos += 1;
                self.expect(&Token::ColonColon, XmlXPathError::XPathExprError)?;
                axis
            }
            _ => XmlXPathAxisVal::AxisChild,
        };
        let test = self.node_test()?;
        let predicates = self.predicates()?;
        Ok(XmlXPathStep {
            axis,
            test,
            predicates,
        })
    }

    #[doc(alias = "xmlXPathCompNodeTest")]
    fn node_test(&mut self) -> Result<XmlXPathNodeTest, XPathError> {
        match self.next() {
            Some(Token::Name(name)) => {
                if name == "*" {
                    return Ok(XmlXPathNodeTest::All { prefix: None });
                }
                match name.split_once(':') {
                    Some((prefix, "*")) => Ok(XmlXPathNodeTest::All {
                        prefix: Some(prefix.to_owned()),
                    }),
                    Some((prefix, local)) => Ok(XmlXPathNodeTest::Name {
                        prefix: Some(prefix.to_owned()),
                        local: local.to_owned(),
                    }),
                    None => Ok(XmlXPathNodeTest::Name {
                        prefix: None,
                        local: name,
                    }),
                }
            }
            Some(Token::NodeType(name)) => {
                self.expect(&Token::LeftParen, XmlXPathError::XPathExprError)?;
                let test = match name.as_str() {
                    "node" => XmlXPathNodeTest::Type(XmlXPathTypeVal::NodeTypeNode),
                    "text" => XmlXPathNodeTest::Type(XmlXPathTypeVal::NodeTypeText),
                    "comment" => XmlXPathNodeTest::Type(XmlXPathTypeVal::NodeTypeComment),
                    _ => match self.peek() {
                        Some(Token::Literal(target)) => {
                            let target = target.clone();
                            self.pos += 1;
                            XmlXPathNodeTest::PI(target)
                        }
                        _ => XmlXPathNodeTest::Type(XmlXPathTypeVal::NodeTypePI),
                    },
                };
                self.expect(&Token::RightParen, XmlXPathError::XPathExprError)?;
                Ok(test)
            }
            other => {
                if other.is_some() {
                    self.pos -= 1;
                }
                Err(self.error(XmlXPathError::XPathExprError))
            }
        }
    }
}

fn descendant_or_self() -> XmlXPathStep {
    XmlXPathStep {
        axis: XmlXPathAxisVal::AxisDescendantOrSelf,
        test: XmlXPathNodeTest::Type(XmlXPathTypeVal::NodeTypeNode),
        predicates: vec![],
    }
}

/// Compile an XPath expression.
#[doc(alias = "xmlXPathCompile")]
pub fn xml_xpath_compile(source: &str) -> Result<XmlXPathCompExpr, XPathError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
        depth: 0,
    };
    if parser.peek().is_none() {
        return Err(parser.error(XmlXPathError::XPathExprError));
    }
    let expr = parser.expr()?;
    if parser.peek().is_some() {
        return Err(parser.error(XmlXPathError::XPathExprError));
    }
    Ok(XmlXPathCompExpr {
        source: source.to_owned(),
        expr,
    })
}
