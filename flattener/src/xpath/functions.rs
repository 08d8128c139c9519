//! Core function library.

use super::ast::Expr;
use super::eval::{sort_unique, EvalContext, Focus, Value};
use crate::document::local_name;
use crate::error::{XPathError, XPathResult};

/// Accepted argument counts; `None` as maximum means variadic.
const FUNCTIONS: &[(&str, usize, Option<usize>)] = &[
    ("last", 0, Some(0)),
    ("position", 0, Some(0)),
    ("count", 1, Some(1)),
    ("local-name", 0, Some(1)),
    ("name", 0, Some(1)),
    ("namespace-uri", 0, Some(1)),
    ("string", 0, Some(1)),
    ("concat", 2, None),
    ("starts-with", 2, Some(2)),
    ("ends-with", 2, Some(2)),
    ("contains", 2, Some(2)),
    ("substring-before", 2, Some(2)),
    ("substring-after", 2, Some(2)),
    ("substring", 2, Some(3)),
    ("string-length", 0, Some(1)),
    ("normalize-space", 0, Some(1)),
    ("translate", 3, Some(3)),
    ("upper-case", 1, Some(1)),
    ("lower-case", 1, Some(1)),
    ("boolean", 1, Some(1)),
    ("not", 1, Some(1)),
    ("true", 0, Some(0)),
    ("false", 0, Some(0)),
    ("number", 0, Some(1)),
    ("sum", 1, Some(1)),
    ("floor", 1, Some(1)),
    ("ceiling", 1, Some(1)),
    ("round", 1, Some(1)),
];

/// Check a call against the library at compile time.
pub fn check_arity(name: &str, given: usize) -> Result<(), String> {
    let (_, min, max) = FUNCTIONS
        .iter()
        .find(|(n, _, _)| *n == name)
        .ok_or_else(|| format!("unknown function '{}()'", name))?;
    if given < *min || max.map(|m| given > m).unwrap_or(false) {
        let expected = match max {
            Some(m) if m == min => format!("{}", min),
            Some(m) => format!("{} to {}", min, m),
            None => format!("at least {}", min),
        };
        return Err(format!(
            "{}() takes {} argument(s), {} given",
            name, expected, given
        ));
    }
    Ok(())
}

struct Args<'c, 'a> {
    ctx: &'c EvalContext<'a>,
    focus: &'c Focus,
    exprs: &'c [Expr],
}

impl Args<'_, '_> {
    fn value(&self, i: usize) -> XPathResult<Value> {
        self.ctx.eval(&self.exprs[i], self.focus)
    }

    fn string(&self, i: usize) -> XPathResult<String> {
        Ok(self.ctx.string(&self.value(i)?))
    }

    /// The i-th argument as a string, or the context node's string-value.
    fn string_or_context(&self, i: usize) -> XPathResult<String> {
        if i < self.exprs.len() {
            self.string(i)
        } else {
            Ok(self.ctx.node_string(self.focus.node))
        }
    }

    fn number(&self, i: usize) -> XPathResult<f64> {
        Ok(self.ctx.number(&self.value(i)?))
    }

    fn nodes(&self, i: usize, function: &str) -> XPathResult<Vec<super::eval::XNode>> {
        self.ctx.node_set(self.value(i)?, function)
    }

    /// First node (document order) of the i-th argument, or the context node.
    fn first_node_or_context(&self, i: usize, function: &str) -> XPathResult<Option<super::eval::XNode>> {
        if i < self.exprs.len() {
            let mut nodes = self.nodes(i, function)?;
            sort_unique(&mut nodes);
            Ok(nodes.first().copied())
        } else {
            Ok(Some(self.focus.node))
        }
    }
}

pub(super) fn call(
    ctx: &EvalContext<'_>,
    focus: &Focus,
    name: &str,
    exprs: &[Expr],
) -> XPathResult<Value> {
    let args = Args { ctx, focus, exprs };
    let value = match name {
        "last" => Value::Num(focus.size as f64),
        "position" => Value::Num(focus.position as f64),
        "count" => Value::Num(args.nodes(0, "count()")?.len() as f64),
        "local-name" => {
            let node = args.first_node_or_context(0, "local-name()")?;
            Value::Str(
                node.map(|n| local_name(ctx.node_name(n)).to_string())
                    .unwrap_or_default(),
            )
        }
        "name" => {
            let node = args.first_node_or_context(0, "name()")?;
            Value::Str(node.map(|n| ctx.node_name(n).to_string()).unwrap_or_default())
        }
        // Documents are parsed without namespace processing
        "namespace-uri" => {
            args.first_node_or_context(0, "namespace-uri()")?;
            Value::Str(String::new())
        }
        "string" => Value::Str(args.string_or_context(0)?),
        "concat" => {
            let mut out = String::new();
            for i in 0..exprs.len() {
                out.push_str(&args.string(i)?);
            }
            Value::Str(out)
        }
        "starts-with" => Value::Bool(args.string(0)?.starts_with(&args.string(1)?)),
        "ends-with" => Value::Bool(args.string(0)?.ends_with(&args.string(1)?)),
        "contains" => Value::Bool(args.string(0)?.contains(&args.string(1)?)),
        "substring-before" => {
            let s = args.string(0)?;
            let pat = args.string(1)?;
            Value::Str(
                s.find(&pat)
                    .map(|i| s[..i].to_string())
                    .unwrap_or_default(),
            )
        }
        "substring-after" => {
            let s = args.string(0)?;
            let pat = args.string(1)?;
            Value::Str(
                s.find(&pat)
                    .map(|i| s[i + pat.len()..].to_string())
                    .unwrap_or_default(),
            )
        }
        "substring" => {
            let s = args.string(0)?;
            let start = round(args.number(1)?);
            let end = if exprs.len() > 2 {
                start + round(args.number(2)?)
            } else {
                f64::INFINITY
            };
            let out: String = s
                .chars()
                .enumerate()
                .filter(|(i, _)| {
                    let p = (*i + 1) as f64;
                    p >= start && p < end
                })
                .map(|(_, c)| c)
                .collect();
            Value::Str(out)
        }
        "string-length" => Value::Num(args.string_or_context(0)?.chars().count() as f64),
        "normalize-space" => Value::Str(
            args.string_or_context(0)?
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "translate" => {
            let s = args.string(0)?;
            let from: Vec<char> = args.string(1)?.chars().collect();
            let to: Vec<char> = args.string(2)?.chars().collect();
            let out: String = s
                .chars()
                .filter_map(|c| match from.iter().position(|&f| f == c) {
                    Some(i) => to.get(i).copied(),
                    None => Some(c),
                })
                .collect();
            Value::Str(out)
        }
        "upper-case" => Value::Str(args.string(0)?.to_uppercase()),
        "lower-case" => Value::Str(args.string(0)?.to_lowercase()),
        "boolean" => Value::Bool(ctx.boolean(&args.value(0)?)),
        "not" => Value::Bool(!ctx.boolean(&args.value(0)?)),
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "number" => {
            if exprs.is_empty() {
                Value::Num(ctx.number(&Value::Str(ctx.node_string(focus.node))))
            } else {
                Value::Num(args.number(0)?)
            }
        }
        "sum" => {
            let nodes = args.nodes(0, "sum()")?;
            Value::Num(
                nodes
                    .iter()
                    .map(|&n| super::eval::string_to_number(&ctx.node_string(n)))
                    .sum(),
            )
        }
        "floor" => Value::Num(args.number(0)?.floor()),
        "ceiling" => Value::Num(args.number(0)?.ceil()),
        "round" => Value::Num(round(args.number(0)?)),
        other => return Err(XPathError::eval(format!("unknown function '{}()'", other))),
    };
    Ok(value)
}

/// XPath rounding: halves round towards positive infinity.
fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use crate::xpath::ast::parse;
    use crate::xpath::eval::XNode;

    fn eval(expr: &str) -> String {
        let doc = parse_str(
            r#"<p:root xmlns:p="urn:p"><a n="1"> two  words </a><a n="2">x</a></p:root>"#,
        )
        .unwrap();
        let ctx = EvalContext::new(&doc, 10_000);
        let v = ctx
            .evaluate(&parse(expr).unwrap(), XNode::Node(doc.root()))
            .unwrap();
        ctx.string(&v)
    }

    #[test]
    fn test_arity_checks() {
        assert!(check_arity("concat", 5).is_ok());
        assert!(check_arity("concat", 1).is_err());
        assert!(check_arity("substring", 3).is_ok());
        assert!(check_arity("true", 1).is_err());
        assert!(check_arity("nope", 0).is_err());
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(eval("normalize-space(//a[1])"), "two words");
        assert_eq!(eval("concat(//a[2], '-', //a[2]/@n)"), "x-2");
        assert_eq!(eval("substring('12345', 2, 3)"), "234");
        assert_eq!(eval("substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(eval("substring-before('2024-01-02', '-')"), "2024");
        assert_eq!(eval("substring-after('2024-01-02', '-')"), "01-02");
        assert_eq!(eval("translate('bar', 'abc', 'ABC')"), "BAr");
        assert_eq!(eval("translate('--a--', '-', '')"), "a");
        assert_eq!(eval("string-length('héllo')"), "5");
        assert_eq!(eval("upper-case('abc')"), "ABC");
    }

    #[test]
    fn test_node_functions() {
        assert_eq!(eval("name(/*)"), "p:root");
        assert_eq!(eval("local-name(/*)"), "root");
        assert_eq!(eval("count(//a)"), "2");
        assert_eq!(eval("//a[position() = last()]/@n"), "2");
        assert_eq!(eval("name(//@n)"), "n");
    }

    #[test]
    fn test_number_and_boolean_functions() {
        assert_eq!(eval("sum(//a/@n)"), "3");
        assert_eq!(eval("round(2.5)"), "3");
        assert_eq!(eval("round(-2.5)"), "-2");
        assert_eq!(eval("floor(2.7) + ceiling(0.1)"), "3");
        assert_eq!(eval("not(//missing)"), "true");
        assert_eq!(eval("boolean('')"), "false");
        assert_eq!(eval("number('abc')"), "NaN");
    }
}
