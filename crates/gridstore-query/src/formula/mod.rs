//! Formula compilation: source text → tokens → AST → SQL.
//!
//! Parsing is lenient by contract: a formula that fails to lex or parse
//! compiles to NULL with a warning instead of aborting the enclosing
//! request. Strict mode upgrades those faults to `BadRequest`.

pub mod lexer;
pub mod parser;
pub mod registry;

use gridstore_domain::error::Result;
use tracing::warn;

use crate::context::QueryContext;
use crate::fragment::SqlExpr;
use parser::FormulaNode;

/// Compile a formula to a SQL expression against the context's table.
pub fn compile(ctx: &QueryContext<'_>, source: &str) -> Result<SqlExpr> {
    let node = match lexer::tokenize(source).and_then(|tokens| parser::parse(&tokens)) {
        Ok(node) => node,
        Err(err) if !ctx.policy.strict => {
            warn!(formula = source, error = %err, "formula parse fault, compiling to NULL");
            return Ok(SqlExpr::null());
        }
        Err(err) => return Err(err),
    };
    lower(ctx, &node)
}

/// Lower one AST node.
fn lower(ctx: &QueryContext<'_>, node: &FormulaNode) -> Result<SqlExpr> {
    match node {
        FormulaNode::NullLit => Ok(SqlExpr::null()),
        FormulaNode::BoolLit(true) => Ok(SqlExpr::raw("TRUE")),
        FormulaNode::BoolLit(false) => Ok(SqlExpr::raw("FALSE")),
        FormulaNode::NumberLit(text) => Ok(SqlExpr::raw(text.clone())),
        FormulaNode::StringLit(text) => Ok(SqlExpr::string_literal(text)),
        FormulaNode::ColumnRef(key) => {
            let column = ctx.column(key)?;
            // Deepen even for stored columns referenced from a formula:
            // a formula column referencing another formula column recurses
            // here, and the depth guard is what breaks reference cycles.
            let child = ctx.descend(ctx.table, ctx.alias.clone())?;
            child.column_expr_cast(column)
        }
        FormulaNode::Call { name, args } => {
            let lowered = args
                .iter()
                .map(|arg| lower(ctx, arg))
                .collect::<Result<Vec<_>>>()?;
            ctx.registry.lower(name, lowered)
        }
        FormulaNode::Binary { op, left, right } => {
            let left = lower(ctx, left)?;
            let right = lower(ctx, right)?;
            Ok(SqlExpr::binary(left, &op.to_string(), right))
        }
    }
}
