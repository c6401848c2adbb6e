//! Query specifications for the document store.
//!
//! A [`QuerySpec`] is plain data: it is validated while it is built and
//! compiled into an engine query only when a search runs.

use crate::error::{CoreError, CoreResult};
use crate::table::results::{ReturnShape, Select};
use kabinet_engine::{ConditionOp, OrderType, QueryCondition};
use regex::bytes::Regex as BytesRegex;
use regex::Regex;

/// The right-hand side of a condition.
///
/// Every expression reaches the engine as text; numbers use their decimal
/// form and lists are joined with spaces.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Raw text.
    Text(Vec<u8>),
    /// An integer.
    Integer(i64),
    /// A float.
    Float(f64),
    /// Several values, for token, between and any-number operators.
    List(Vec<Expression>),
}

impl Expression {
    /// Builds a list expression.
    pub fn list<T: Into<Self>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Returns true for integers and floats.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(value) => value.to_string().into_bytes(),
            Self::Float(value) => value.to_string().into_bytes(),
            Self::List(items) => items
                .iter()
                .map(Self::to_bytes)
                .collect::<Vec<_>>()
                .join(&b' '),
        }
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Self::Text(value.as_bytes().to_vec())
    }
}

impl From<String> for Expression {
    fn from(value: String) -> Self {
        Self::Text(value.into_bytes())
    }
}

impl From<&[u8]> for Expression {
    fn from(value: &[u8]) -> Self {
        Self::Text(value.to_vec())
    }
}

impl From<Vec<u8>> for Expression {
    fn from(value: Vec<u8>) -> Self {
        Self::Text(value)
    }
}

impl From<i32> for Expression {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&Regex> for Expression {
    fn from(value: &Regex) -> Self {
        Self::Text(value.as_str().as_bytes().to_vec())
    }
}

/// One filter of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    column: Vec<u8>,
    op: ConditionOp,
    negate: bool,
    no_index: bool,
    expr: Vec<u8>,
}

impl Condition {
    /// Compiles `column operator expression`.
    ///
    /// Operators are named the way they read: `==`, `starts_with`,
    /// `includes_any_token`, `>=`, `between`, `phrase_search` and so on.
    /// A `!`, `!_` or `not_` prefix negates any of them. The columns `""`,
    /// `pk` and `primary_key` address the primary key.
    ///
    /// # Errors
    ///
    /// Fails with `Query` for an unknown operator or a regex that does not
    /// compile.
    pub fn new(
        column: impl AsRef<[u8]>,
        operator: &str,
        expression: impl Into<Expression>,
    ) -> CoreResult<Self> {
        let expression = expression.into();
        let (negate, name) = strip_negation(operator);
        let op = parse_operator(name, &expression)?;
        let condition = Self {
            column: column_name(column.as_ref()),
            op,
            negate,
            no_index: false,
            expr: expression.to_bytes(),
        };
        condition.validate()?;
        Ok(condition)
    }

    /// Builds a condition from an engine operator directly.
    ///
    /// # Errors
    ///
    /// Fails with `Query` for a regex that does not compile.
    pub fn with_op(
        column: impl AsRef<[u8]>,
        op: ConditionOp,
        expression: impl Into<Expression>,
    ) -> CoreResult<Self> {
        let condition = Self {
            column: column_name(column.as_ref()),
            op,
            negate: false,
            no_index: false,
            expr: expression.into().to_bytes(),
        };
        condition.validate()?;
        Ok(condition)
    }

    /// Compiles `[column, operator, expression]` or
    /// `[column, operator, expression, no_index]` from text.
    ///
    /// # Errors
    ///
    /// Fails with `Query` for any other number of parts, and for what
    /// [`Condition::new`] rejects.
    pub fn from_parts(parts: &[&str]) -> CoreResult<Self> {
        match *parts {
            [column, operator, expression] => Self::new(column, operator, expression),
            [column, operator, expression, no_index] => {
                let condition = Self::new(column, operator, expression)?;
                Ok(if is_truthy(no_index) {
                    condition.no_index()
                } else {
                    condition
                })
            }
            _ => Err(CoreError::query(format!(
                "a condition needs a column, an operator and an expression, got {} parts",
                parts.len()
            ))),
        }
    }

    /// Flips the condition.
    #[must_use]
    pub const fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Tells the engine not to use an index for this condition.
    #[must_use]
    pub const fn no_index(mut self) -> Self {
        self.no_index = true;
        self
    }

    /// Returns the column, empty for the primary key.
    pub fn column(&self) -> &[u8] {
        &self.column
    }

    /// Returns the compiled operator.
    pub const fn op(&self) -> ConditionOp {
        self.op
    }

    /// Returns true for negated conditions.
    pub const fn is_negated(&self) -> bool {
        self.negate
    }

    pub(crate) fn to_engine(&self) -> QueryCondition {
        QueryCondition {
            column: self.column.clone(),
            op: self.op,
            negate: self.negate,
            no_index: self.no_index,
            expr: self.expr.clone(),
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.op == ConditionOp::StrRegex {
            let pattern = String::from_utf8_lossy(&self.expr);
            BytesRegex::new(&pattern)
                .map_err(|err| CoreError::query(format!("invalid regex {pattern:?}: {err}")))?;
        }
        Ok(())
    }
}

fn column_name(column: &[u8]) -> Vec<u8> {
    match column {
        b"pk" | b"primary_key" => Vec::new(),
        other => other.to_vec(),
    }
}

fn strip_negation(operator: &str) -> (bool, &str) {
    for prefix in ["not_", "!_", "!"] {
        if let Some(rest) = operator.strip_prefix(prefix) {
            return (true, rest);
        }
    }
    (false, operator)
}

/// `eql`, `eqls`, `equal` or `equals`.
fn is_equals_word(word: &str) -> bool {
    matches!(word, "eql" | "eqls" | "equal" | "equals")
}

/// Nothing, `_token` or `_tokens`.
fn is_token_suffix(rest: &str) -> bool {
    matches!(rest, "" | "_token" | "_tokens")
}

fn parse_operator(name: &str, expression: &Expression) -> CoreResult<ConditionOp> {
    let name = name.to_ascii_lowercase();
    let word = name.strip_suffix('?').unwrap_or(&name);

    let op = match word {
        "=" | "==" => equality(expression),
        w if is_equals_word(w) => equality(expression),
        "includ" | "include" | "includs" | "includes" => ConditionOp::StrInclude,
        "start_with" | "starts_with" => ConditionOp::StrBeginsWith,
        "end_with" | "ends_with" => ConditionOp::StrEndsWith,
        "~" | "=~" | "match" | "matches" => ConditionOp::StrRegex,
        ">" => ConditionOp::NumGt,
        ">=" => ConditionOp::NumGe,
        "<" => ConditionOp::NumLt,
        "<=" => ConditionOp::NumLe,
        "between" => ConditionOp::NumBetween,
        "any_num" | "any_number" => ConditionOp::NumEqAny,
        "phrase_search" => ConditionOp::FtsPhrase,
        "all_token_search" | "all_tokens_search" => ConditionOp::FtsAllTokens,
        "any_token_search" | "any_tokens_search" => ConditionOp::FtsAnyToken,
        "expression_search" => ConditionOp::FtsExpression,
        w => prefixed_operator(w)
            .ok_or_else(|| CoreError::query(format!("unknown condition operator {name:?}")))?,
    };
    Ok(op)
}

fn equality(expression: &Expression) -> ConditionOp {
    if expression.is_numeric() {
        ConditionOp::NumEq
    } else {
        ConditionOp::StrEq
    }
}

/// Operators spelled as a qualifier plus a word: `str_eql`,
/// `includes_all_tokens`, `equals_any`, `number_equals`.
fn prefixed_operator(word: &str) -> Option<ConditionOp> {
    if let Some(rest) = word.strip_prefix("string_").or_else(|| word.strip_prefix("str_")) {
        return is_equals_word(rest).then_some(ConditionOp::StrEq);
    }
    if let Some(rest) = word.strip_prefix("number_").or_else(|| word.strip_prefix("num_")) {
        return is_equals_word(rest).then_some(ConditionOp::NumEq);
    }
    if let Some(rest) = word.strip_prefix("includes_").or_else(|| word.strip_prefix("include_")) {
        if let Some(suffix) = rest.strip_prefix("all") {
            return is_token_suffix(suffix).then_some(ConditionOp::StrAllTokens);
        }
        if let Some(suffix) = rest.strip_prefix("any") {
            return is_token_suffix(suffix).then_some(ConditionOp::StrAnyToken);
        }
        return None;
    }
    let (equals, suffix) = word.split_once("_any")?;
    (is_equals_word(equals) && is_token_suffix(suffix)).then_some(ConditionOp::StrEqAnyToken)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "no_index"
    )
}

/// Result order of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    column: Vec<u8>,
    kind: OrderType,
}

impl Order {
    /// Orders by `column` with an explicit engine order type.
    pub fn new(column: impl AsRef<[u8]>, kind: OrderType) -> Self {
        Self {
            column: column_name(column.as_ref()),
            kind,
        }
    }

    /// Orders by `column` ascending as text.
    pub fn ascending(column: impl AsRef<[u8]>) -> Self {
        Self::new(column, OrderType::StrAsc)
    }

    /// Parses a direction: `ASC`/`STR_ASC` or empty, `DESC`/`STR_DESC`,
    /// `NUM_ASC`, `NUM_DESC`, in any case.
    ///
    /// # Errors
    ///
    /// Fails with `Query` for any other direction.
    pub fn parse(column: impl AsRef<[u8]>, direction: &str) -> CoreResult<Self> {
        let kind = match direction.to_ascii_uppercase().as_str() {
            "" | "ASC" | "STR_ASC" => OrderType::StrAsc,
            "DESC" | "STR_DESC" => OrderType::StrDesc,
            "NUM_ASC" => OrderType::NumAsc,
            "NUM_DESC" => OrderType::NumDesc,
            _ => return Err(CoreError::query(format!("unknown order type {direction:?}"))),
        };
        Ok(Self::new(column, kind))
    }

    /// Parses `[column]` or `[column, direction]`.
    ///
    /// # Errors
    ///
    /// Fails with `Query` for any other number of parts or an unknown
    /// direction.
    pub fn from_parts(parts: &[&str]) -> CoreResult<Self> {
        match *parts {
            [column] => Ok(Self::ascending(column)),
            [column, direction] => Self::parse(column, direction),
            _ => Err(CoreError::query(format!(
                "an order needs a column and an optional direction, got {} parts",
                parts.len()
            ))),
        }
    }

    /// Returns the ordered column.
    pub fn column(&self) -> &[u8] {
        &self.column
    }

    /// Returns the engine order type.
    pub const fn kind(&self) -> OrderType {
        self.kind
    }
}

/// Everything a search needs: conditions, order, paging and the shape of
/// the results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub(crate) conditions: Vec<Condition>,
    pub(crate) order: Option<Order>,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: usize,
    pub(crate) select: Select,
    pub(crate) shape: Option<ReturnShape>,
}

impl QuerySpec {
    /// Creates a spec matching every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a compiled condition.
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Compiles and adds a condition.
    ///
    /// # Errors
    ///
    /// See [`Condition::new`].
    pub fn filter(
        self,
        column: impl AsRef<[u8]>,
        operator: &str,
        expression: impl Into<Expression>,
    ) -> CoreResult<Self> {
        Ok(self.condition(Condition::new(column, operator, expression)?))
    }

    /// Sets the result order.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    /// Orders by `column` ascending as text.
    #[must_use]
    pub fn order_by(self, column: impl AsRef<[u8]>) -> Self {
        self.order(Order::ascending(column))
    }

    /// Returns at most `limit` results.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Chooses what each result carries.
    #[must_use]
    pub const fn select(mut self, select: Select) -> Self {
        self.select = select;
        self
    }

    /// Chooses how results are collected.
    #[must_use]
    pub const fn shape(mut self, shape: ReturnShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// The requested shape, or `Map` for unordered and `Pairs` for ordered
    /// queries.
    pub(crate) fn effective_shape(&self) -> ReturnShape {
        self.shape.unwrap_or(if self.order.is_some() {
            ReturnShape::Pairs
        } else {
            ReturnShape::Map
        })
    }
}
