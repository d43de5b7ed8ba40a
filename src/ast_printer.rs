use crate::ast::{Expr, LiteralValue};

/// Renders an expression in parenthesised prefix form for the `parse`
/// command, e.g. `(* (- 1.0) (group 2.0))`.
pub struct AstPrinter;

impl AstPrinter {
    pub fn print(expr: &Expr) -> String {
        match expr {
            Expr::Literal(literal) => Self::literal(literal),

            Expr::Grouping(inner) => Self::parenthesize("group", &[&**inner]),

            Expr::Unary { operator, right } => Self::parenthesize(&operator.lexeme, &[&**right]),

            Expr::Binary {
                left,
                operator,
                right,
            }
            | Expr::Logical {
                left,
                operator,
                right,
            } => Self::parenthesize(&operator.lexeme, &[&**left, &**right]),

            Expr::Variable(variable) => variable.name.lexeme.clone(),

            Expr::Assign { name, value, .. } => {
                format!("(= {} {})", name.lexeme, Self::print(value))
            }

            Expr::This { .. } => "this".into(),

            Expr::Super { method, .. } => format!("(super {})", method.lexeme),

            Expr::Call {
                callee, arguments, ..
            } => {
                let mut parts: Vec<&Expr> = Vec::with_capacity(arguments.len() + 1);
                parts.push(callee);
                parts.extend(arguments.iter());
                Self::parenthesize("call", &parts)
            }

            Expr::Get { object, name } => format!("(. {} {})", Self::print(object), name.lexeme),

            Expr::Set {
                object,
                name,
                value,
            } => format!(
                "(= (. {} {}) {})",
                Self::print(object),
                name.lexeme,
                Self::print(value)
            ),
        }
    }

    fn parenthesize(name: &str, exprs: &[&Expr]) -> String {
        let mut out: String = format!("({}", name);
        for expr in exprs {
            out.push(' ');
            out.push_str(&Self::print(expr));
        }
        out.push(')');
        out
    }

    /// Numbers always show a fraction (`3.0`), strings print bare.
    fn literal(literal: &LiteralValue) -> String {
        match literal {
            LiteralValue::Number(n) if n.fract() == 0.0 => format!("{:.1}", n),
            LiteralValue::Number(n) => n.to_string(),
            LiteralValue::Str(s) => s.clone(),
            LiteralValue::True => "true".into(),
            LiteralValue::False => "false".into(),
            LiteralValue::Nil => "nil".into(),
        }
    }
}
