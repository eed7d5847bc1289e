//! Built-in evaluator over the stock expression grammar
//!
//! Evaluates directly over the pest pair tree; there is no separate
//! AST. Both sides of a binary operator are always walked, even when
//! the left side already decides the result, so references and type
//! problems in unexecuted branches still surface in the editor.
//! Expressions are pure, which makes that safe.

use super::{
    EvalContext, EvalDiagnostic, EvalReference, Evaluation, Evaluator, Formatted, TemplateSegment,
};
use crate::value::Value;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "eval/expression.pest"]
struct ExpressionParser;

/// The crate's own [`Evaluator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEvaluator;

impl Evaluator for StandardEvaluator {
    fn evaluate(&self, expression: &str, context: &EvalContext) -> Evaluation {
        let mut out = Evaluation::default();

        let mut pairs = match ExpressionParser::parse(Rule::expression, expression) {
            Ok(pairs) => pairs,
            Err(err) => {
                out.diagnostics.push(syntax_diagnostic(expression, &err));
                return out;
            }
        };

        if let Some(root) = pairs.next() {
            if let Some(inner) = root.into_inner().next() {
                out.result = eval_pair(inner, context, &mut out);
            }
        }
        out
    }

    fn format(&self, template: &str, context: &EvalContext) -> Formatted {
        let mut text = String::new();
        let mut segments = Vec::new();
        let mut cursor = 0;

        while let Some(open) = template[cursor..].find('{').map(|at| cursor + at) {
            let Some(close) = template[open + 1..].find('}').map(|at| open + 1 + at) else {
                // Unmatched brace; the rest is literal text.
                break;
            };

            text.push_str(&template[cursor..open]);
            let body = &template[open + 1..close];

            let mut rendered = None;
            for (offset, content) in split_alternatives(body) {
                if rendered.is_none() {
                    if let Some(value) = self.evaluate(content, context).result {
                        rendered = Some(value.to_string());
                    }
                }
                segments.push(TemplateSegment {
                    content: content.to_string(),
                    from: open + 1 + offset,
                });
            }
            if let Some(rendered) = rendered {
                text.push_str(&rendered);
            }
            cursor = close + 1;
        }

        text.push_str(&template[cursor..]);
        Formatted { text, segments }
    }
}

/// Split a group body on `|`, ignoring pipes inside string literals.
/// Returns each alternative trimmed, with its offset within the body.
fn split_alternatives(body: &str) -> Vec<(usize, &str)> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_string = false;

    for (at, ch) in body.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '|' if !in_string => {
                parts.push(trimmed_slice(body, start, at));
                start = at + 1;
            }
            _ => {}
        }
    }
    parts.push(trimmed_slice(body, start, body.len()));
    parts
}

fn trimmed_slice(text: &str, from: usize, to: usize) -> (usize, &str) {
    let raw = &text[from..to];
    let trimmed = raw.trim();
    let lead = raw.len() - raw.trim_start().len();
    (from + lead, trimmed)
}

/* ===================== Pair Walker ===================== */

fn eval_pair(pair: Pair<Rule>, context: &EvalContext, out: &mut Evaluation) -> Option<Value> {
    match pair.as_rule() {
        Rule::logical_or_expr
        | Rule::logical_and_expr
        | Rule::equality_expr
        | Rule::comparison_expr
        | Rule::additive_expr
        | Rule::multiplicative_expr => eval_binary(pair, context, out),
        Rule::unary_expr => eval_unary(pair, context, out),
        Rule::call_expr => eval_call(pair, context, out),
        Rule::primary | Rule::literal => {
            let inner = pair.into_inner().next()?;
            eval_pair(inner, context, out)
        }
        Rule::identifier => {
            let name = pair.as_str().to_string();
            let span = pair.as_span();
            out.references.push(EvalReference {
                from: span.start(),
                to: span.end(),
                name: name.clone(),
                call: false,
            });
            context.get(&name).cloned()
        }
        Rule::number => {
            let span = pair.as_span();
            match pair.as_str().parse::<f64>() {
                Ok(n) => Some(Value::Num(n)),
                Err(_) => {
                    out.diagnostics.push(EvalDiagnostic {
                        from: span.start(),
                        to: span.end(),
                        message: format!("Invalid number '{}'", pair.as_str()),
                    });
                    None
                }
            }
        }
        Rule::boolean => Some(Value::Bool(pair.as_str() == "true")),
        Rule::string => {
            let inner = pair.into_inner().next()?;
            Some(Value::Str(inner.as_str().to_string()))
        }
        Rule::EOI => None,
        other => unreachable!("unexpected expression rule: {:?}", other),
    }
}

fn eval_binary(pair: Pair<Rule>, context: &EvalContext, out: &mut Evaluation) -> Option<Value> {
    let mut inner = pair.into_inner();
    let first = inner.next()?;
    let mut left = eval_pair(first, context, out);

    while let Some(op) = inner.next() {
        let right_pair = inner.next()?;
        let op_rule = op.as_rule();
        let op_span = op.as_span();
        let right = eval_pair(right_pair, context, out);
        left = apply_binary(op_rule, (op_span.start(), op_span.end()), left, right, out);
    }
    left
}

fn eval_unary(pair: Pair<Rule>, context: &EvalContext, out: &mut Evaluation) -> Option<Value> {
    let mut inner = pair.into_inner();
    let first = inner.next()?;

    match first.as_rule() {
        Rule::op_not => {
            let operand = eval_pair(inner.next()?, context, out);
            operand.map(|v| Value::Bool(!v.is_truthy()))
        }
        Rule::op_neg => {
            let span = first.as_span();
            let operand = eval_pair(inner.next()?, context, out)?;
            match operand {
                Value::Num(n) => Some(Value::Num(-n)),
                other => {
                    out.diagnostics.push(EvalDiagnostic {
                        from: span.start(),
                        to: span.end(),
                        message: format!("Cannot negate a {}", other.value_type()),
                    });
                    None
                }
            }
        }
        _ => eval_pair(first, context, out),
    }
}

fn eval_call(pair: Pair<Rule>, context: &EvalContext, out: &mut Evaluation) -> Option<Value> {
    let mut inner = pair.into_inner();
    let primary = inner.next()?;
    let has_suffix = inner.next().is_some();

    let before = out.references.len();
    let value = eval_pair(primary, context, out);

    // A call suffix on a bare name marks that reference as invoked, so
    // the resolver can verify the callee is actually callable.
    if has_suffix && out.references.len() == before + 1 {
        out.references[before].call = true;
    }
    value
}

fn apply_binary(
    op: Rule,
    op_span: (usize, usize),
    left: Option<Value>,
    right: Option<Value>,
    out: &mut Evaluation,
) -> Option<Value> {
    use Value::{Num, Str};

    match op {
        // `and`/`or` keep the deciding operand's value, so templates
        // can write fallbacks like `{name or "stranger"}`.
        Rule::op_and => match left {
            Some(l) if !l.is_truthy() => Some(l),
            Some(_) => right,
            None => None,
        },
        Rule::op_or => match left {
            Some(l) if l.is_truthy() => Some(l),
            Some(_) => right,
            None => None,
        },
        Rule::op_eq => Some(Value::Bool(left? == right?)),
        Rule::op_ne => Some(Value::Bool(left? != right?)),
        Rule::op_lt | Rule::op_lte | Rule::op_gt | Rule::op_gte => {
            match (left?, right?) {
                (Num(l), Num(r)) => Some(Value::Bool(match op {
                    Rule::op_lt => l < r,
                    Rule::op_lte => l <= r,
                    Rule::op_gt => l > r,
                    _ => l >= r,
                })),
                (l, r) => {
                    type_problem(out, op_span, "compare", &l, &r);
                    None
                }
            }
        }
        Rule::op_add => match (left?, right?) {
            (Num(l), Num(r)) => Some(Num(l + r)),
            // String concatenation coerces the other side to text.
            (Str(l), r) => Some(Str(format!("{}{}", l, r))),
            (l, Str(r)) => Some(Str(format!("{}{}", l, r))),
            (l, r) => {
                type_problem(out, op_span, "add", &l, &r);
                None
            }
        },
        Rule::op_sub | Rule::op_mul | Rule::op_div => match (left?, right?) {
            (Num(l), Num(r)) => match op {
                Rule::op_sub => Some(Num(l - r)),
                Rule::op_mul => Some(Num(l * r)),
                _ if r == 0.0 => {
                    out.diagnostics.push(EvalDiagnostic {
                        from: op_span.0,
                        to: op_span.1,
                        message: "Division by zero".to_string(),
                    });
                    None
                }
                _ => Some(Num(l / r)),
            },
            (l, r) => {
                let verb = match op {
                    Rule::op_sub => "subtract",
                    Rule::op_mul => "multiply",
                    _ => "divide",
                };
                type_problem(out, op_span, verb, &l, &r);
                None
            }
        },
        other => unreachable!("unexpected operator rule: {:?}", other),
    }
}

fn type_problem(
    out: &mut Evaluation,
    span: (usize, usize),
    verb: &str,
    left: &Value,
    right: &Value,
) {
    out.diagnostics.push(EvalDiagnostic {
        from: span.0,
        to: span.1,
        message: format!(
            "Cannot {} {} and {}",
            verb,
            left.value_type(),
            right.value_type()
        ),
    });
}

/// Map a pest error onto a span inside the expression text.
fn syntax_diagnostic(expression: &str, err: &pest::error::Error<Rule>) -> EvalDiagnostic {
    // Expressions are single-line, so only the column matters.
    let (from, to) = match err.line_col {
        pest::error::LineColLocation::Pos((_, col)) => {
            let at = col.saturating_sub(1).min(expression.len());
            (at, (at + 1).min(expression.len().max(1)))
        }
        pest::error::LineColLocation::Span((_, start_col), (_, end_col)) => (
            start_col.saturating_sub(1).min(expression.len()),
            end_col.saturating_sub(1).min(expression.len()),
        ),
    };
    EvalDiagnostic {
        from,
        to: to.max(from + 1),
        message: "Invalid expression".to_string(),
    }
}
