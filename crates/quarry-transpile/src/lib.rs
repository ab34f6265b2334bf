//! Cross-dialect SQL rewriting
//!
//! Used when a bundle built against one backend is imported into a database
//! running another: virtual dataset SQL is parsed with the source dialect,
//! rewritten for the target, and re-emitted. The rewrite is strictly
//! best-effort and fail-open: anything that cannot be parsed or mapped comes
//! back unchanged, since shipping the original SQL to the new backend is
//! strictly better than shipping nothing.

use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Ident, ObjectName, Statement, Value,
};
use sqlparser::ast::{visit_expressions_mut, visit_relations_mut};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use std::ops::ControlFlow;

fn dialect_for(engine: &str) -> Option<Box<dyn Dialect>> {
    match engine {
        "postgresql" => Some(Box::new(PostgreSqlDialect {})),
        "mysql" => Some(Box::new(MySqlDialect {})),
        "sqlite" | "gsheets" => Some(Box::new(SQLiteDialect {})),
        "presto" => Some(Box::new(GenericDialect {})),
        _ => None,
    }
}

fn quote_char_for(engine: &str) -> char {
    match engine {
        "mysql" => '`',
        _ => '"',
    }
}

/// Whether the dialect truncates to day with `DATE_TRUNC('day', x)` rather
/// than `DATE(x)`.
fn uses_date_trunc(engine: &str) -> bool {
    matches!(engine, "postgresql" | "presto")
}

fn requote(ident: &mut Ident, quote: char) {
    if ident.quote_style.is_some() {
        ident.quote_style = Some(quote);
    }
}

fn is_day_literal(arg: &FunctionArg) -> bool {
    matches!(
        arg,
        FunctionArg::Unnamed(FunctionArgExpr::Expr(Expr::Value(Value::SingleQuotedString(s))))
            if s.eq_ignore_ascii_case("day")
    )
}

fn rewrite_day_truncation(expr: &mut Expr, target: &str) {
    let Expr::Function(func) = expr else {
        return;
    };
    let name = func.name.to_string().to_lowercase();
    let FunctionArguments::List(list) = &mut func.args else {
        return;
    };
    if !uses_date_trunc(target) && name == "date_trunc" && list.args.len() == 2 {
        // DATE_TRUNC('day', x) -> DATE(x); finer grains have no portable
        // single-function form, leave them for the target to reject.
        if is_day_literal(&list.args[0]) {
            func.name = ObjectName(vec![Ident::new("DATE")]);
            list.args.remove(0);
        }
    } else if uses_date_trunc(target) && name == "date" && list.args.len() == 1 {
        func.name = ObjectName(vec![Ident::new("DATE_TRUNC")]);
        list.args.insert(
            0,
            FunctionArg::Unnamed(FunctionArgExpr::Expr(Expr::Value(
                Value::SingleQuotedString("day".to_string()),
            ))),
        );
    }
}

fn rewrite(statements: &mut Vec<Statement>, target: &str) {
    let quote = quote_char_for(target);
    let _ = visit_relations_mut(statements, |name: &mut ObjectName| {
        for ident in &mut name.0 {
            requote(ident, quote);
        }
        ControlFlow::<()>::Continue(())
    });
    let _ = visit_expressions_mut(statements, |expr: &mut Expr| {
        match expr {
            Expr::Identifier(ident) => requote(ident, quote),
            Expr::CompoundIdentifier(idents) => {
                for ident in idents {
                    requote(ident, quote);
                }
            }
            _ => rewrite_day_truncation(expr, target),
        }
        ControlFlow::<()>::Continue(())
    });
}

/// Rewrite `sql` from the source engine's dialect to the target's.
///
/// Identity when the engines match or either dialect is unknown; the
/// original text when parsing fails.
pub fn transpile(sql: &str, source_engine: &str, target_engine: &str) -> String {
    if source_engine == target_engine {
        return sql.to_string();
    }
    let (Some(dialect), Some(_)) = (dialect_for(source_engine), dialect_for(target_engine)) else {
        return sql.to_string();
    };

    let mut statements = match Parser::parse_sql(dialect.as_ref(), sql) {
        Ok(statements) => statements,
        Err(err) => {
            tracing::warn!(
                source = source_engine,
                target = target_engine,
                error = %err,
                "could not parse SQL for transpilation, keeping original"
            );
            return sql.to_string();
        }
    };

    rewrite(&mut statements, target_engine);

    statements
        .iter()
        .map(Statement::to_string)
        .collect::<Vec<_>>()
        .join(";\n")
}
