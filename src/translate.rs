use std::fmt;

use async_trait::async_trait;
use datafusion::sql::sqlparser::{
    dialect::GenericDialect,
    keywords::Keyword,
    parser::Parser,
    tokenizer::{Location, Token, Tokenizer},
};
use tracing::debug;

use crate::{
    error::TranslateError, model::CompletionModel, predicate::Predicate, schema::SchemaDescription,
};

/// Executable filter: a SQL boolean expression, i.e. the body of a `WHERE`.
///
/// Only constructed through [`FilterExpr::parse`], so every value that reaches
/// a reader has been checked by the SQL parser.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FilterExpr(String);

impl FilterExpr {
    /// Validate `text` as a single SQL expression
    pub fn parse(text: impl Into<String>) -> Result<Self, TranslateError> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(TranslateError::EmptyFilter);
        }

        let invalid = |reason: String| TranslateError::InvalidFilter {
            expr: trimmed.to_string(),
            reason,
        };
        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(trimmed)
            .map_err(|e| invalid(e.to_string()))?;
        parser.parse_expr().map_err(|e| invalid(e.to_string()))?;
        let next = parser.peek_token();
        if next.token != Token::EOF {
            return Err(invalid(format!("unexpected trailing input at `{}`", next.token)));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Conjunction of `filters` in the given order
    pub fn conjunction<'a>(filters: impl IntoIterator<Item = &'a FilterExpr>) -> Option<Self> {
        let parts: Vec<String> = filters.into_iter().map(|f| format!("({})", f.0)).collect();
        if parts.is_empty() {
            None
        } else {
            Some(Self(parts.join(" AND ")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns a predicate list into an executable filter for one schema.
///
/// Implementations are expected to be idempotent for identical inputs; the
/// expansion engine calls them once per dataset per `expand` and never caches.
#[async_trait]
pub trait QueryTranslator: Send + Sync {
    /// Translate the conjunction of `predicates` against `schema`
    async fn translate(
        &self,
        predicates: &[Predicate],
        schema: &SchemaDescription,
    ) -> Result<FilterExpr, TranslateError>;
}

#[async_trait]
impl<T: QueryTranslator + ?Sized> QueryTranslator for std::sync::Arc<T> {
    async fn translate(
        &self,
        predicates: &[Predicate],
        schema: &SchemaDescription,
    ) -> Result<FilterExpr, TranslateError> {
        (**self).translate(predicates, schema).await
    }
}

/// Translator for predicates that are already SQL expressions.
///
/// Each predicate is validated on its own and the results are AND-ed in list
/// order.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughTranslator;

#[async_trait]
impl QueryTranslator for PassthroughTranslator {
    async fn translate(
        &self,
        predicates: &[Predicate],
        _schema: &SchemaDescription,
    ) -> Result<FilterExpr, TranslateError> {
        let parsed = predicates
            .iter()
            .map(|p| FilterExpr::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        FilterExpr::conjunction(&parsed).ok_or(TranslateError::NoPredicates)
    }
}

/// Natural-language to SQL translation through a [`CompletionModel`].
pub struct LlmTranslator<M> {
    model: M,
}

impl<M: CompletionModel> LlmTranslator<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Prompt asking for one boolean expression satisfying every predicate
    pub fn prompt(predicates: &[Predicate], schema: &SchemaDescription) -> String {
        let mut conditions = String::new();
        for (idx, predicate) in predicates.iter().enumerate() {
            conditions.push_str(&format!("{}. {}\n", idx + 1, predicate));
        }
        format!(
            "You translate filter conditions into SQL.\n\
             Table definition:\n{ddl}\n\n\
             Rows must satisfy ALL of the following conditions:\n{conditions}\n\
             Answer with a single SQL boolean expression usable after WHERE that combines \
             every condition with AND. Use only the columns defined above. \
             Do not write SELECT, WHERE, comments or explanations.",
            ddl = schema.to_ddl(),
        )
    }
}

#[async_trait]
impl<M: CompletionModel> QueryTranslator for LlmTranslator<M> {
    async fn translate(
        &self,
        predicates: &[Predicate],
        schema: &SchemaDescription,
    ) -> Result<FilterExpr, TranslateError> {
        if predicates.is_empty() {
            return Err(TranslateError::NoPredicates);
        }
        let prompt = Self::prompt(predicates, schema);
        let answer = self.model.complete(&prompt).await?;
        debug!(relation = %schema.name, answer = %answer, "model answered translation prompt");
        FilterExpr::parse(clean_answer(&answer))
    }
}

/// Strip code fences, a `SELECT ... WHERE` prefix and trailing semicolons
fn clean_answer(answer: &str) -> String {
    let mut text = answer.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("sql").unwrap_or(rest);
        text = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }

    let leading = text.split_whitespace().next().unwrap_or_default();
    if leading.eq_ignore_ascii_case("SELECT") || leading.eq_ignore_ascii_case("WHERE") {
        if let Some(rest) = after_where(text) {
            text = rest;
        }
    }

    text.trim().trim_end_matches(';').trim().to_string()
}

/// Text following the first `WHERE` keyword, whatever whitespace surrounds it
fn after_where(text: &str) -> Option<&str> {
    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, text)
        .tokenize_with_location()
        .ok()?;
    let position = tokens
        .iter()
        .position(|t| matches!(&t.token, Token::Word(word) if word.keyword == Keyword::WHERE))?;
    let next = tokens[position + 1..]
        .iter()
        .find(|t| !matches!(t.token, Token::Whitespace(_)))?;
    byte_offset(text, next.span.start).map(|offset| &text[offset..])
}

/// Byte offset of a tokenizer location (1-based line and character column)
fn byte_offset(text: &str, location: Location) -> Option<usize> {
    let mut offset = 0;
    for (idx, line) in text.split('\n').enumerate() {
        if idx as u64 + 1 == location.line {
            let column = usize::try_from(location.column.saturating_sub(1)).ok()?;
            return line
                .char_indices()
                .nth(column)
                .map(|(byte, _)| offset + byte);
        }
        offset += line.len() + 1;
    }
    None
}
