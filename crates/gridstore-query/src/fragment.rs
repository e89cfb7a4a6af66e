//! Parameterized SQL fragments.
//!
//! A [`SqlExpr`] pairs a SQL snippet containing `?` placeholders with the
//! parameters bound to them, in order. Fragments compose by concatenation;
//! parameters travel with their text so placeholder order stays correct no
//! matter how deeply fragments nest.

use gridstore_domain::ports::SqlParam;

/// A SQL snippet plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlExpr {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Parameters, in placeholder order.
    pub params: Vec<SqlParam>,
}

impl SqlExpr {
    /// A fragment with no parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// The SQL NULL literal.
    #[must_use]
    pub fn null() -> Self {
        Self::raw("NULL")
    }

    /// A single bound parameter.
    #[must_use]
    pub fn param(param: SqlParam) -> Self {
        Self {
            sql: "?".to_owned(),
            params: vec![param],
        }
    }

    /// A fragment with explicit parameters; the caller keeps text and
    /// placeholder count in agreement.
    pub fn bind(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// `( left op right )`
    #[must_use]
    pub fn binary(left: Self, op: &str, right: Self) -> Self {
        let mut params = left.params;
        params.extend(right.params);
        Self {
            sql: format!("({} {op} {})", left.sql, right.sql),
            params,
        }
    }

    /// `NAME(arg, arg, ...)`
    #[must_use]
    pub fn call(name: &str, args: Vec<Self>) -> Self {
        let mut params = Vec::new();
        let mut pieces = Vec::with_capacity(args.len());
        for arg in args {
            pieces.push(arg.sql);
            params.extend(arg.params);
        }
        Self {
            sql: format!("{name}({})", pieces.join(", ")),
            params,
        }
    }

    /// Join fragments with a separator, keeping parameter order.
    #[must_use]
    pub fn join(parts: Vec<Self>, separator: &str) -> Self {
        let mut params = Vec::new();
        let mut pieces = Vec::with_capacity(parts.len());
        for part in parts {
            pieces.push(part.sql);
            params.extend(part.params);
        }
        Self {
            sql: pieces.join(separator),
            params,
        }
    }

    /// Wrap in parentheses.
    #[must_use]
    pub fn grouped(self) -> Self {
        Self {
            sql: format!("({})", self.sql),
            params: self.params,
        }
    }

    /// Append another fragment's text and parameters.
    pub fn push(&mut self, other: Self) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }

    /// Append plain text.
    pub fn push_sql(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Quote a string literal for direct embedding, doubling single quotes.
    /// Used only for literals originating in formula source text.
    #[must_use]
    pub fn string_literal(value: &str) -> Self {
        Self::raw(format!("'{}'", value.replace('\'', "''")))
    }
}
