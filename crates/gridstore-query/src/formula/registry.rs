//! Formula function registry.
//!
//! Every registered name has a pure lowering from argument SQL fragments to
//! a SQL expression. The registry is open: callers may register additional
//! lowerings at construction. Unknown names pass through as
//! `NAME(args...)` in permissive mode, letting the SQL engine resolve
//! them or error at execution, and are rejected in strict mode.

use std::collections::HashMap;

use gridstore_domain::error::{Error, Result};
use gridstore_domain::ports::SqlParam;

use crate::fragment::SqlExpr;

/// Unknown-function policy, declared once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionMode {
    /// Unknown names pass through unlowered.
    #[default]
    Permissive,
    /// Unknown names are a `BadRequest`.
    Strict,
}

/// Custom lowering registered by a caller.
pub type CustomLowering = Box<dyn Fn(Vec<SqlExpr>) -> Result<SqlExpr> + Send + Sync>;

/// Dispatch table from function name to SQL lowering.
pub struct FunctionRegistry {
    mode: FunctionMode,
    custom: HashMap<String, CustomLowering>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FunctionRegistry {
    /// The standard registry in permissive mode.
    #[must_use]
    pub fn standard() -> Self {
        Self::with_mode(FunctionMode::Permissive)
    }

    /// The standard registry with an explicit unknown-name policy.
    #[must_use]
    pub fn with_mode(mode: FunctionMode) -> Self {
        Self {
            mode,
            custom: HashMap::new(),
        }
    }

    /// Register (or override) a lowering under an uppercased name.
    pub fn register(
        &mut self,
        name: &str,
        lowering: impl Fn(Vec<SqlExpr>) -> Result<SqlExpr> + Send + Sync + 'static,
    ) {
        self.custom
            .insert(name.to_ascii_uppercase(), Box::new(lowering));
    }

    /// Lower a call. Custom entries win over builtins.
    pub fn lower(&self, name: &str, args: Vec<SqlExpr>) -> Result<SqlExpr> {
        let name = name.to_ascii_uppercase();
        if let Some(custom) = self.custom.get(&name) {
            return custom(args);
        }
        if let Some(result) = lower_builtin(&name, &args) {
            return result;
        }
        match self.mode {
            FunctionMode::Permissive => Ok(SqlExpr::call(&name, args)),
            FunctionMode::Strict => Err(Error::bad_request(format!(
                "unknown formula function {name}"
            ))),
        }
    }
}

fn arity(name: &str, args: &[SqlExpr], expected: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Error::bad_request(format!(
            "{name} expects {expected} arguments, got {}",
            args.len()
        )))
    }
}

fn at_least(name: &str, args: &[SqlExpr], minimum: usize) -> Result<()> {
    if args.len() >= minimum {
        Ok(())
    } else {
        Err(Error::bad_request(format!(
            "{name} expects at least {minimum} arguments, got {}",
            args.len()
        )))
    }
}

/// Fold variadic arguments under one operator.
fn fold(args: &[SqlExpr], op: &str) -> SqlExpr {
    let mut params = Vec::new();
    let mut pieces = Vec::with_capacity(args.len());
    for arg in args {
        pieces.push(arg.sql.clone());
        params.extend(arg.params.clone());
    }
    SqlExpr::bind(format!("({})", pieces.join(&format!(" {op} "))), params)
}

/// `(arg)::text`
fn as_text(arg: &SqlExpr) -> SqlExpr {
    SqlExpr::bind(format!("({})::text", arg.sql), arg.params.clone())
}

/// `CAST(arg AS TIMESTAMPTZ)`
fn as_timestamp(arg: &SqlExpr) -> SqlExpr {
    SqlExpr::bind(format!("CAST({} AS TIMESTAMPTZ)", arg.sql), arg.params.clone())
}

fn extract_part(part: &str, args: &[SqlExpr]) -> Result<SqlExpr> {
    arity(part, args, 1)?;
    let ts = as_timestamp(&args[0]);
    Ok(SqlExpr::bind(
        format!("EXTRACT({part} FROM {})", ts.sql),
        ts.params,
    ))
}

fn date_shift(name: &str, sign: char, args: &[SqlExpr]) -> Result<SqlExpr> {
    arity(name, args, 3)?;
    let ts = as_timestamp(&args[0]);
    let count = as_text(&args[1]);
    let unit = as_text(&args[2]);
    let mut params = ts.params;
    params.extend(count.params);
    params.extend(unit.params);
    Ok(SqlExpr::bind(
        format!(
            "({} {sign} ({} || ' ' || {})::interval)",
            ts.sql, count.sql, unit.sql
        ),
        params,
    ))
}

/// Builtin lowerings; `None` means the name is not a builtin.
#[allow(clippy::too_many_lines)]
fn lower_builtin(name: &str, args: &[SqlExpr]) -> Option<Result<SqlExpr>> {
    let result = match name {
        // ── Numeric ─────────────────────────────────────────────────
        "ADD" | "SUM" => at_least(name, args, 1).map(|()| fold(args, "+")),
        "SUB" => arity(name, args, 2).map(|()| fold(args, "-")),
        "MUL" => at_least(name, args, 1).map(|()| fold(args, "*")),
        "DIV" => arity(name, args, 2).map(|()| fold(args, "/")),
        "MOD" => arity(name, args, 2).map(|()| SqlExpr::call("MOD", args.to_vec())),
        "NEG" => arity(name, args, 1).map(|()| {
            SqlExpr::bind(format!("(-1 * {})", args[0].sql), args[0].params.clone())
        }),
        "ABS" | "ROUND" | "FLOOR" => {
            at_least(name, args, 1).map(|()| SqlExpr::call(name, args.to_vec()))
        }
        "CEIL" => arity(name, args, 1).map(|()| SqlExpr::call("CEILING", args.to_vec())),
        "MIN" => at_least(name, args, 1).map(|()| SqlExpr::call("LEAST", args.to_vec())),
        "MAX" => at_least(name, args, 1).map(|()| SqlExpr::call("GREATEST", args.to_vec())),
        "AVG" => at_least(name, args, 1).map(|()| {
            let sum = fold(args, "+");
            SqlExpr::bind(format!("({} / {})", sum.sql, args.len()), sum.params)
        }),
        "COUNT" => at_least(name, args, 1).map(|()| {
            let pieces: Vec<SqlExpr> = args
                .iter()
                .map(|arg| {
                    SqlExpr::bind(
                        format!("(CASE WHEN {} IS NULL THEN 0 ELSE 1 END)", arg.sql),
                        arg.params.clone(),
                    )
                })
                .collect();
            fold(&pieces, "+")
        }),

        // ── Text ────────────────────────────────────────────────────
        "LEN" => arity(name, args, 1).map(|()| {
            let text = as_text(&args[0]);
            SqlExpr::bind(format!("LENGTH({})", text.sql), text.params)
        }),
        "LOWER" | "UPPER" | "TRIM" => {
            arity(name, args, 1).map(|()| SqlExpr::call(name, args.to_vec()))
        }
        "CONCAT" => at_least(name, args, 1).map(|()| SqlExpr::call("CONCAT", args.to_vec())),
        "REPLACE" => arity(name, args, 3).map(|()| SqlExpr::call("REPLACE", args.to_vec())),
        "SEARCH" => arity(name, args, 2).map(|()| {
            let haystack = as_text(&args[0]);
            let needle = as_text(&args[1]);
            let mut params = needle.params.clone();
            params.extend(haystack.params);
            SqlExpr::bind(
                format!("POSITION({} IN {})", needle.sql, haystack.sql),
                params,
            )
        }),
        "LEFT" | "RIGHT" => arity(name, args, 2).map(|()| SqlExpr::call(name, args.to_vec())),
        "MID" => arity(name, args, 3).map(|()| SqlExpr::call("SUBSTR", args.to_vec())),

        // ── Logic ───────────────────────────────────────────────────
        "IF" => arity(name, args, 3).map(|()| {
            let mut params = args[0].params.clone();
            params.extend(args[1].params.clone());
            params.extend(args[2].params.clone());
            SqlExpr::bind(
                format!(
                    "CASE WHEN {} THEN {} ELSE {} END",
                    args[0].sql, args[1].sql, args[2].sql
                ),
                params,
            )
        }),
        "SWITCH" => at_least(name, args, 3).map(|()| {
            let subject = &args[0];
            let mut sql = format!("CASE {}", subject.sql);
            let mut params = subject.params.clone();
            let pairs = &args[1..];
            for chunk in pairs.chunks(2) {
                if let [matched, result] = chunk {
                    sql.push_str(&format!(" WHEN {} THEN {}", matched.sql, result.sql));
                    params.extend(matched.params.clone());
                    params.extend(result.params.clone());
                } else {
                    sql.push_str(&format!(" ELSE {}", chunk[0].sql));
                    params.extend(chunk[0].params.clone());
                }
            }
            sql.push_str(" END");
            SqlExpr::bind(sql, params)
        }),
        "AND" => at_least(name, args, 1).map(|()| fold(args, "AND")),
        "OR" => at_least(name, args, 1).map(|()| fold(args, "OR")),
        "NOT" => arity(name, args, 1).map(|()| {
            SqlExpr::bind(format!("(NOT {})", args[0].sql), args[0].params.clone())
        }),
        "ISBLANK" => arity(name, args, 1).map(|()| {
            let text = as_text(&args[0]);
            let mut params = args[0].params.clone();
            params.extend(text.params);
            SqlExpr::bind(
                format!("({} IS NULL OR {} = '')", args[0].sql, text.sql),
                params,
            )
        }),
        "COALESCE" => at_least(name, args, 1).map(|()| SqlExpr::call("COALESCE", args.to_vec())),

        // ── Date/time ───────────────────────────────────────────────
        "NOW" => arity(name, args, 0).map(|()| SqlExpr::raw("NOW()")),
        "TODAY" => arity(name, args, 0).map(|()| SqlExpr::raw("CURRENT_DATE")),
        "YEAR" | "MONTH" | "DAY" | "HOUR" | "MINUTE" | "SECOND" => {
            return Some(extract_part(name, args));
        }
        "DATEADD" => return Some(date_shift(name, '+', args)),
        "DATESUB" => return Some(date_shift(name, '-', args)),
        "DATEDIFF" => {
            if args.len() != 2 && args.len() != 3 {
                return Some(Err(Error::bad_request(
                    "DATEDIFF expects 2 or 3 arguments",
                )));
            }
            let a = as_timestamp(&args[0]);
            let b = as_timestamp(&args[1]);
            let mut params = a.params.clone();
            params.extend(b.params.clone());
            let divisor = match args.get(2) {
                Some(unit) => {
                    let unit = as_text(unit);
                    params.extend(unit.params.clone());
                    format!(
                        "CASE {} WHEN 'second' THEN 1 WHEN 'minute' THEN 60 WHEN 'hour' THEN 3600 \
                         WHEN 'week' THEN 604800 ELSE 86400 END",
                        unit.sql
                    )
                }
                None => "86400".to_owned(),
            };
            Ok(SqlExpr::bind(
                format!(
                    "FLOOR(EXTRACT(EPOCH FROM ({} - {})) / ({divisor}))",
                    a.sql, b.sql
                ),
                params,
            ))
        }
        "DATESTR" => arity(name, args, 1).map(|()| {
            let ts = as_timestamp(&args[0]);
            SqlExpr::bind(format!("TO_CHAR({}, 'YYYY-MM-DD')", ts.sql), ts.params)
        }),
        "FORMAT" => arity(name, args, 2).map(|()| SqlExpr::call("TO_CHAR", args.to_vec())),

        // ── Misc ────────────────────────────────────────────────────
        "TYPE" => arity(name, args, 1).map(|()| {
            SqlExpr::bind(
                format!("pg_typeof({})::text", args[0].sql),
                args[0].params.clone(),
            )
        }),
        "REGEX_MATCH" => arity(name, args, 2).map(|()| {
            let subject = as_text(&args[0]);
            let pattern = as_text(&args[1]);
            let mut params = subject.params.clone();
            params.extend(pattern.params.clone());
            SqlExpr::bind(format!("({} ~ {})", subject.sql, pattern.sql), params)
        }),
        "REGEX_EXTRACT" => arity(name, args, 2).map(|()| {
            let subject = as_text(&args[0]);
            let pattern = as_text(&args[1]);
            let mut params = subject.params.clone();
            params.extend(pattern.params.clone());
            SqlExpr::bind(
                format!("SUBSTRING({} FROM {})", subject.sql, pattern.sql),
                params,
            )
        }),
        "REGEX_REPLACE" => arity(name, args, 3).map(|()| {
            let subject = as_text(&args[0]);
            let pattern = as_text(&args[1]);
            let replacement = as_text(&args[2]);
            let mut params = subject.params.clone();
            params.extend(pattern.params.clone());
            params.extend(replacement.params.clone());
            SqlExpr::bind(
                format!(
                    "REGEXP_REPLACE({}, {}, {}, 'g')",
                    subject.sql, pattern.sql, replacement.sql
                ),
                params,
            )
        }),

        _ => return None,
    };
    Some(result)
}

/// Bind a runtime string as a parameter expression. Exposed for custom
/// lowerings that want to inject constants safely.
#[must_use]
pub fn param_expr(value: &str) -> SqlExpr {
    SqlExpr::param(SqlParam::string(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(sql: &str) -> SqlExpr {
        SqlExpr::raw(sql)
    }

    #[test]
    fn variadic_functions_fold() {
        let registry = FunctionRegistry::standard();
        let expr = registry
            .lower("ADD", vec![lit("1"), lit("2"), lit("3")])
            .expect("lower");
        assert_eq!(expr.sql, "(1 + 2 + 3)");
    }

    #[test]
    fn if_lowers_to_case() {
        let registry = FunctionRegistry::standard();
        let expr = registry
            .lower("IF", vec![lit("x > 1"), lit("'y'"), lit("'n'")])
            .expect("lower");
        assert_eq!(expr.sql, "CASE WHEN x > 1 THEN 'y' ELSE 'n' END");
    }

    #[test]
    fn switch_supports_default_arm() {
        let registry = FunctionRegistry::standard();
        let expr = registry
            .lower(
                "SWITCH",
                vec![lit("s"), lit("'a'"), lit("1"), lit("'b'"), lit("2"), lit("0")],
            )
            .expect("lower");
        assert_eq!(
            expr.sql,
            "CASE s WHEN 'a' THEN 1 WHEN 'b' THEN 2 ELSE 0 END"
        );
    }

    #[test]
    fn arity_violations_are_bad_requests() {
        let registry = FunctionRegistry::standard();
        assert!(registry.lower("MOD", vec![lit("1")]).is_err());
        assert!(registry.lower("NOW", vec![lit("1")]).is_err());
    }

    #[test]
    fn unknown_names_pass_through_in_permissive_mode() {
        let registry = FunctionRegistry::standard();
        let expr = registry
            .lower("mystery", vec![lit("1")])
            .expect("passthrough");
        assert_eq!(expr.sql, "MYSTERY(1)");
    }

    #[test]
    fn unknown_names_error_in_strict_mode() {
        let registry = FunctionRegistry::with_mode(FunctionMode::Strict);
        assert!(registry.lower("mystery", vec![lit("1")]).is_err());
    }

    #[test]
    fn custom_registrations_override_builtins() {
        let mut registry = FunctionRegistry::standard();
        registry.register("LEN", |args| {
            Ok(SqlExpr::bind(
                format!("OCTET_LENGTH({})", args[0].sql),
                args[0].params.clone(),
            ))
        });
        let expr = registry.lower("len", vec![lit("x")]).expect("lower");
        assert_eq!(expr.sql, "OCTET_LENGTH(x)");
    }

    #[test]
    fn dateadd_builds_interval_arithmetic() {
        let registry = FunctionRegistry::standard();
        let expr = registry
            .lower("DATEADD", vec![lit("d"), lit("5"), lit("'day'")])
            .expect("lower");
        assert_eq!(
            expr.sql,
            "(CAST(d AS TIMESTAMPTZ) + ((5)::text || ' ' || ('day')::text)::interval)"
        );
    }
}
