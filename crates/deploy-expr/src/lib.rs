#![deny(warnings)]

//! Sandboxed arithmetic expressions in a single time variable.
//!
//! Demand equations and producer preferences are configuration strings such as
//! `1000*t` or `10*(1+1.5)**(t/12)`. They are parsed into a small AST and
//! evaluated in Rust; nothing outside this grammar is accepted:
//!
//! ```text
//! expr  := term (("+" | "-") term)*
//! term  := unary (("*" | "/") unary)*
//! unary := ("-" | "+") unary | power
//! power := atom ("**" unary)?
//! atom  := number | "t" | "(" expr ")"
//! ```

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, digit0, digit1, multispace0, one_of};
use nom::combinator::{all_consuming, map, map_res, opt, recognize, value};
use nom::multi::fold_many0;
use nom::sequence::{delimited, pair, preceded};
use nom::{IResult, Parser};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum parenthesis nesting accepted by the parser.
pub const MAX_DEPTH: usize = 32;

/// Maximum source length in bytes.
pub const MAX_LEN: usize = 1024;

/// Errors produced while parsing or evaluating an equation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EquationError {
    /// Blank input.
    #[error("equation is empty")]
    Empty,
    /// Input longer than [`MAX_LEN`].
    #[error("equation `{equation}` exceeds {max} bytes")]
    TooLong { equation: String, max: usize },
    /// Parentheses nested deeper than [`MAX_DEPTH`].
    #[error("equation `{equation}` nests parentheses deeper than {max}")]
    TooDeep { equation: String, max: usize },
    /// Input outside the grammar.
    #[error("cannot parse equation `{equation}` near `{near}`")]
    Parse { equation: String, near: String },
    /// Evaluation produced NaN or an infinity (e.g. division by zero).
    #[error("equation `{equation}` is not finite at t={t}")]
    NonFinite { equation: String, t: f64 },
}

/// Binary operators supported by the grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Time,
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Evaluate with `t` bound to `time`. Non-finite intermediates propagate.
    pub fn eval(&self, time: f64) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Time => time,
            Expr::Neg(inner) => -inner.eval(time),
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(time);
                let b = rhs.eval(time);
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
        }
    }

    /// True when the tree does not reference `t`.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Number(_) => true,
            Expr::Time => false,
            Expr::Neg(inner) => inner.is_constant(),
            Expr::Binary(_, lhs, rhs) => lhs.is_constant() && rhs.is_constant(),
        }
    }
}

type Res<'a, O> = IResult<&'a str, O>;

fn ws<'a, F, O>(inner: F) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn number(i: &str) -> Res<'_, Expr> {
    map_res(
        recognize((
            alt((
                recognize((digit1, opt((char('.'), digit0)))),
                recognize((char('.'), digit1)),
            )),
            opt((one_of("eE"), opt(one_of("+-")), digit1)),
        )),
        |s: &str| s.parse::<f64>().map(Expr::Number),
    )
    .parse(i)
}

fn atom(i: &str) -> Res<'_, Expr> {
    ws(alt((
        number,
        value(Expr::Time, char('t')),
        delimited(char('('), expr, char(')')),
    )))
    .parse(i)
}

fn power(i: &str) -> Res<'_, Expr> {
    let (i, base) = atom(i)?;
    let (i, exponent) = opt(preceded(ws(tag("**")), unary)).parse(i)?;
    let out = match exponent {
        Some(e) => Expr::binary(BinOp::Pow, base, e),
        None => base,
    };
    Ok((i, out))
}

fn unary(i: &str) -> Res<'_, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |e| Expr::Neg(Box::new(e))),
        preceded(ws(char('+')), unary),
        power,
    ))
    .parse(i)
}

fn term(i: &str) -> Res<'_, Expr> {
    let (i, first) = unary(i)?;
    fold_many0(
        pair(
            ws(alt((value(BinOp::Mul, char('*')), value(BinOp::Div, char('/'))))),
            unary,
        ),
        move || first.clone(),
        |acc, (op, rhs)| Expr::binary(op, acc, rhs),
    )
    .parse(i)
}

fn expr(i: &str) -> Res<'_, Expr> {
    let (i, first) = term(i)?;
    fold_many0(
        pair(
            ws(alt((value(BinOp::Add, char('+')), value(BinOp::Sub, char('-'))))),
            term,
        ),
        move || first.clone(),
        |acc, (op, rhs)| Expr::binary(op, acc, rhs),
    )
    .parse(i)
}

fn max_depth(src: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    for c in src.chars() {
        match c {
            '(' => {
                depth += 1;
                max = max.max(depth);
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

/// A parsed equation together with its source text.
#[derive(Clone, Debug, PartialEq)]
pub struct Equation {
    source: String,
    expr: Expr,
}

impl Equation {
    /// Parse `src` against the grammar in the crate docs.
    pub fn parse(src: &str) -> Result<Self, EquationError> {
        let trimmed = src.trim();
        if trimmed.is_empty() {
            return Err(EquationError::Empty);
        }
        if trimmed.len() > MAX_LEN {
            return Err(EquationError::TooLong {
                equation: trimmed.to_string(),
                max: MAX_LEN,
            });
        }
        if max_depth(trimmed) > MAX_DEPTH {
            return Err(EquationError::TooDeep {
                equation: trimmed.to_string(),
                max: MAX_DEPTH,
            });
        }
        match all_consuming(expr).parse(trimmed) {
            Ok((_, expr)) => Ok(Self {
                source: trimmed.to_string(),
                expr,
            }),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(EquationError::Parse {
                equation: trimmed.to_string(),
                near: e.input.to_string(),
            }),
            Err(nom::Err::Incomplete(_)) => Err(EquationError::Parse {
                equation: trimmed.to_string(),
                near: String::new(),
            }),
        }
    }

    /// Constant equation, e.g. a default preference.
    pub fn constant(v: f64) -> Self {
        Self {
            source: v.to_string(),
            expr: Expr::Number(v),
        }
    }

    /// Evaluate at time step `t`.
    pub fn eval(&self, t: f64) -> Result<f64, EquationError> {
        let v = self.expr.eval(t);
        if !v.is_finite() {
            return Err(EquationError::NonFinite {
                equation: self.source.clone(),
                t,
            });
        }
        Ok(v)
    }

    /// Evaluate at an integer tick.
    pub fn eval_at(&self, tick: u64) -> Result<f64, EquationError> {
        self.eval(tick as f64)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn is_constant(&self) -> bool {
        self.expr.is_constant()
    }
}

impl FromStr for Equation {
    type Err = EquationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Equation::parse(s)
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eval(src: &str, t: f64) -> f64 {
        Equation::parse(src).unwrap().eval(t).unwrap()
    }

    #[test]
    fn linear_demand() {
        assert_eq!(eval("1000*t", 5.0), 5000.0);
        assert_eq!(Equation::parse("1000*t").unwrap().eval_at(0).unwrap(), 0.0);
    }

    #[test]
    fn precedence_and_grouping() {
        assert_eq!(eval("1 + 2 * 3", 0.0), 7.0);
        assert_eq!(eval("(1 + 2) * 3", 0.0), 9.0);
        assert_eq!(eval("10 - 4 - 3", 0.0), 3.0);
        assert_eq!(eval("8 / 4 / 2", 0.0), 1.0);
        assert_eq!(eval("2 * t - t / 2", 4.0), 6.0);
    }

    #[test]
    fn exponent_rules() {
        assert_eq!(eval("2**3**2", 0.0), 512.0);
        assert_eq!(eval("-2**2", 0.0), -4.0);
        assert_eq!(eval("2**-1", 0.0), 0.5);
        let growth = eval("10*(1+1.5)**(t/12)", 12.0);
        assert!((growth - 25.0).abs() < 1e-9);
    }

    #[test]
    fn literals() {
        assert_eq!(eval("1e3", 0.0), 1000.0);
        assert_eq!(eval("2.5E-1", 0.0), 0.25);
        assert_eq!(eval(".5 + 1.", 0.0), 1.5);
        assert_eq!(eval("  +t  ", 3.0), 3.0);
    }

    #[test]
    fn rejects_anything_outside_grammar() {
        for bad in [
            "__import__('os').system('ls')",
            "sin(t)",
            "x + 1",
            "t; 1",
            "1 +",
            "2t",
            "1e",
            "time",
            "(1 + 2",
            "1 + 2)",
            "t ^ 2",
        ] {
            assert!(
                matches!(Equation::parse(bad), Err(EquationError::Parse { .. })),
                "accepted {bad}"
            );
        }
        assert_eq!(Equation::parse("   "), Err(EquationError::Empty));
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}t{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(matches!(
            Equation::parse(&deep),
            Err(EquationError::TooDeep { .. })
        ));
        let ok = format!("{}t{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(Equation::parse(&ok).unwrap().eval(2.0).unwrap(), 2.0);
    }

    #[test]
    fn division_by_zero_is_reported() {
        let eq = Equation::parse("1/t").unwrap();
        assert!(matches!(eq.eval(0.0), Err(EquationError::NonFinite { .. })));
        assert_eq!(eq.eval(4.0).unwrap(), 0.25);
    }

    #[test]
    fn constant_detection() {
        assert!(Equation::parse("3 * (2 + 1)").unwrap().is_constant());
        assert!(!Equation::parse("0.01*t").unwrap().is_constant());
        assert_eq!(Equation::constant(2.0).eval(99.0).unwrap(), 2.0);
    }

    proptest! {
        #[test]
        fn affine_equations_match(a in -1000i32..1000, b in -1000i32..1000, t in 0u32..1000) {
            let src = format!("{a}*t + ({b})");
            let got = Equation::parse(&src).unwrap().eval(t as f64).unwrap();
            prop_assert_eq!(got, (a as f64) * (t as f64) + b as f64);
        }
    }
}
