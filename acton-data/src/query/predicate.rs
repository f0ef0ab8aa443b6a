//! Predicate trees and the dialect-aware matcher translation

use super::ident::Ident;
use super::matcher::{KeywordMatcher, Matcher, MatcherMode};
use super::sql::SqlWriter;
use super::value::{Param, Value};
use crate::dialect::{CaseFold, Dialect};
use crate::error::{Error, Result};
use crate::naming::camel_to_snake;

/// One node of a WHERE clause
///
/// Columns are [`Ident`]s and every value is bound as a parameter when the
/// predicate is rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `col = ?` or `col <> ?`
    Compare {
        column: Ident,
        value: Value,
        negated: bool,
    },
    /// `col IS NULL` or `col IS NOT NULL`
    IsNull { column: Ident, negated: bool },
    /// `col IN (...)` or `col NOT IN (...)`
    InList {
        column: Ident,
        values: Vec<Value>,
        negated: bool,
    },
    /// `col LIKE ?` with an optional case-folding strategy
    Like {
        column: Ident,
        pattern: String,
        fold: Option<CaseFold>,
        negated: bool,
    },
    /// The JSON array stored in `col` contains `item`
    JsonArrayContains { column: Ident, item: String },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    pub(crate) fn render(&self, w: &mut SqlWriter) -> Result<()> {
        match self {
            Predicate::Compare {
                column,
                value,
                negated,
            } => {
                w.ident(column)
                    .keyword(if *negated { " <> " } else { " = " })
                    .bind(value.to_param());
            }
            Predicate::IsNull { column, negated } => {
                w.ident(column)
                    .keyword(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Predicate::InList {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    w.keyword(if *negated { "1 = 1" } else { "1 = 0" });
                    return Ok(());
                }
                w.ident(column)
                    .keyword(if *negated { " NOT IN (" } else { " IN (" });
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        w.keyword(", ");
                    }
                    w.bind(value.to_param());
                }
                w.keyword(")");
            }
            Predicate::Like {
                column,
                pattern,
                fold,
                negated,
            } => {
                let pattern = Param::Text(pattern.clone());
                match fold {
                    Some(CaseFold::Lower) => {
                        w.keyword("LOWER(")
                            .ident(column)
                            .keyword(if *negated { ") NOT LIKE LOWER(" } else { ") LIKE LOWER(" })
                            .bind(pattern)
                            .keyword(")");
                    }
                    Some(CaseFold::ILike) => {
                        w.ident(column)
                            .keyword(if *negated { " NOT ILIKE " } else { " ILIKE " })
                            .bind(pattern);
                    }
                    Some(CaseFold::Like) | None => {
                        w.ident(column)
                            .keyword(if *negated { " NOT LIKE " } else { " LIKE " })
                            .bind(pattern);
                    }
                }
            }
            Predicate::JsonArrayContains { column, item } => {
                let item = Param::Text(item.clone());
                match w.dialect().clone() {
                    Dialect::MySql => {
                        w.keyword("JSON_CONTAINS(")
                            .ident(column)
                            .keyword(", JSON_ARRAY(")
                            .bind(item)
                            .keyword("))");
                    }
                    Dialect::Sqlite => {
                        w.keyword("EXISTS (SELECT 1 FROM json_each(")
                            .ident(column)
                            .keyword(") WHERE json_each.value = ")
                            .bind(item)
                            .keyword(")");
                    }
                    Dialect::Postgres => {
                        w.ident(column)
                            .keyword("::jsonb @> jsonb_build_array(CAST(")
                            .bind(item)
                            .keyword(" AS TEXT))");
                    }
                    other @ Dialect::Other(_) => {
                        return Err(other.unsupported("JSON array matching"));
                    }
                }
            }
            Predicate::All(children) => render_group(w, children, " AND ", "1 = 1")?,
            Predicate::Any(children) => render_group(w, children, " OR ", "1 = 0")?,
        }
        Ok(())
    }
}

fn render_group(
    w: &mut SqlWriter,
    children: &[Predicate],
    joiner: &'static str,
    identity: &'static str,
) -> Result<()> {
    match children {
        [] => {
            w.keyword(identity);
        }
        [only] => only.render(w)?,
        _ => {
            w.keyword("(");
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    w.keyword(joiner);
                }
                child.render(w)?;
            }
            w.keyword(")");
        }
    }
    Ok(())
}

/// A conjunction of predicates; empty means "every row"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Writes ` WHERE ...` when there is anything to filter on
    pub(crate) fn render_where(&self, w: &mut SqlWriter) -> Result<()> {
        if self.predicates.is_empty() {
            return Ok(());
        }
        w.keyword(" WHERE ");
        for (i, predicate) in self.predicates.iter().enumerate() {
            if i > 0 {
                w.keyword(" AND ");
            }
            predicate.render(w)?;
        }
        Ok(())
    }
}

/// Translates [`Matcher`]s into predicates for one table and dialect
///
/// Matcher names are snake-cased, then qualified with the table unless the
/// matcher targets a custom table. When a column allow-list is configured,
/// names on the main table must appear in it. A qualifier, when set, takes
/// over column naming for plain matchers entirely; its output is still
/// parsed as an [`Ident`].
pub struct PredicateBuilder<'a> {
    dialect: &'a Dialect,
    table: &'a Ident,
    columns: Option<&'a [&'static str]>,
    qualifier: Option<&'a dyn Fn(&Matcher) -> String>,
}

impl<'a> PredicateBuilder<'a> {
    pub fn new(dialect: &'a Dialect, table: &'a Ident) -> Self {
        Self {
            dialect,
            table,
            columns: None,
            qualifier: None,
        }
    }

    /// Restrict main-table matchers to these columns
    pub fn with_columns(mut self, columns: &'a [&'static str]) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Name matcher columns with `qualifier` instead of the table prefix
    pub fn with_qualifier(mut self, qualifier: &'a dyn Fn(&Matcher) -> String) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    /// Append one predicate per applicable matcher to `filter`
    ///
    /// Matchers are applied in order. A matcher with an empty name or a blank
    /// value is skipped; an `Empty` sentinel is compared as its zero value.
    pub fn apply(&self, mut filter: Filter, matchers: &[Matcher]) -> Result<Filter> {
        for matcher in matchers {
            if let Some(predicate) = self.predicate_for(matcher)? {
                filter.push(predicate);
            }
        }
        Ok(filter)
    }

    /// Append one OR-group for a keyword search
    pub fn apply_keyword(&self, mut filter: Filter, keyword: &KeywordMatcher) -> Result<Filter> {
        if let Some(predicate) =
            self.keyword_predicate(&keyword.names, &keyword.value, keyword.custom_table)?
        {
            filter.push(predicate);
        }
        Ok(filter)
    }

    fn predicate_for(&self, matcher: &Matcher) -> Result<Option<Predicate>> {
        let sentinel = matches!(matcher.value, Value::Empty(_));
        let value = matcher.value.clone().normalize();
        if matcher.name.trim().is_empty() || (!sentinel && value.is_blank()) {
            return Ok(None);
        }

        let column = || match self.qualifier {
            Some(qualify) => Ident::parse(qualify(matcher)),
            None => self.column(&matcher.name, matcher.custom_table),
        };
        let predicate = match matcher.mode {
            MatcherMode::Keyword => {
                let names: Vec<String> = matcher.name.split(',').map(str::to_string).collect();
                return self.keyword_predicate(&names, &matcher.value, matcher.custom_table);
            }
            MatcherMode::Equal | MatcherMode::NotEqual => {
                let negated = matcher.mode == MatcherMode::NotEqual;
                let column = column()?;
                if value.is_null() {
                    Predicate::IsNull { column, negated }
                } else {
                    Predicate::Compare {
                        column,
                        value,
                        negated,
                    }
                }
            }
            MatcherMode::In | MatcherMode::NotIn => Predicate::InList {
                column: column()?,
                values: value.into_items(),
                negated: matcher.mode == MatcherMode::NotIn,
            },
            MatcherMode::Contains | MatcherMode::NotContains => Predicate::Like {
                column: column()?,
                pattern: like_pattern(&value),
                fold: None,
                negated: matcher.mode == MatcherMode::NotContains,
            },
            MatcherMode::ContainsIgnoreCase | MatcherMode::NotContainsIgnoreCase => {
                Predicate::Like {
                    column: column()?,
                    pattern: like_pattern(&value),
                    fold: Some(self.dialect.case_fold()?),
                    negated: matcher.mode == MatcherMode::NotContainsIgnoreCase,
                }
            }
            MatcherMode::Tags => {
                if let Dialect::Other(_) = self.dialect {
                    return Err(self.dialect.unsupported("JSON array matching"));
                }
                let column = column()?;
                let tags: Vec<Predicate> = value
                    .to_string()
                    .split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(|tag| Predicate::JsonArrayContains {
                        column: column.clone(),
                        item: tag.to_string(),
                    })
                    .collect();
                if tags.is_empty() {
                    return Ok(None);
                }
                Predicate::All(tags)
            }
        };
        Ok(Some(predicate))
    }

    fn keyword_predicate(
        &self,
        names: &[String],
        value: &Value,
        custom_table: bool,
    ) -> Result<Option<Predicate>> {
        if matches!(value, Value::Empty(_)) || value.is_blank() {
            return Ok(None);
        }
        let fold = self.dialect.case_fold()?;
        let pattern = like_pattern(value);
        let mut alternatives = Vec::with_capacity(names.len());
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            alternatives.push(Predicate::Like {
                column: self.column(name, custom_table)?,
                pattern: pattern.clone(),
                fold: Some(fold),
                negated: false,
            });
        }
        if alternatives.is_empty() {
            return Ok(None);
        }
        Ok(Some(Predicate::Any(alternatives)))
    }

    fn column(&self, name: &str, custom_table: bool) -> Result<Ident> {
        let snake = camel_to_snake(name.trim());
        if custom_table {
            return Ident::parse(&snake);
        }
        if let Some(columns) = self.columns {
            if !columns.contains(&snake.as_str()) {
                return Err(Error::UnknownColumn {
                    table: self.table.to_string(),
                    column: snake,
                });
            }
        }
        Ident::qualified(self.table, &snake)
    }
}

fn like_pattern(value: &Value) -> String {
    format!("%{}%", value)
}

/// Apply `matchers` against `table` without a column allow-list
pub fn apply_matchers(
    filter: Filter,
    matchers: &[Matcher],
    table: &Ident,
    dialect: &Dialect,
) -> Result<Filter> {
    PredicateBuilder::new(dialect, table).apply(filter, matchers)
}

/// Apply a keyword search against `table` without a column allow-list
pub fn apply_keyword_matcher(
    filter: Filter,
    keyword: &KeywordMatcher,
    table: &Ident,
    dialect: &Dialect,
) -> Result<Filter> {
    PredicateBuilder::new(dialect, table).apply_keyword(filter, keyword)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::value::ValueKind;

    fn users() -> Ident {
        Ident::parse("users").unwrap()
    }

    fn render(dialect: &Dialect, filter: &Filter) -> (String, Vec<Param>) {
        let mut w = SqlWriter::new(dialect);
        filter.render_where(&mut w).unwrap();
        let stmt = w.finish();
        (stmt.sql().to_string(), stmt.params().to_vec())
    }

    #[test]
    fn test_equal_and_in() {
        let table = users();
        let filter = apply_matchers(
            Filter::new(),
            &[
                Matcher::equal("status", "active"),
                Matcher::is_in("roleId", vec![1, 2]),
            ],
            &table,
            &Dialect::Postgres,
        )
        .unwrap();
        let (sql, params) = render(&Dialect::Postgres, &filter);
        assert_eq!(sql, " WHERE users.status = $1 AND users.role_id IN ($2, $3)");
        assert_eq!(
            params,
            vec![Param::Text("active".into()), Param::Int(1), Param::Int(2)]
        );
    }

    #[test]
    fn test_blank_values_and_names_are_skipped() {
        let table = users();
        let filter = apply_matchers(
            Filter::new(),
            &[
                Matcher::equal("name", ""),
                Matcher::equal("", "x"),
                Matcher::is_in("id", Vec::<i64>::new()),
            ],
            &table,
            &Dialect::Sqlite,
        )
        .unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn test_empty_sentinel_compares_zero_value() {
        let table = users();
        let filter = apply_matchers(
            Filter::new(),
            &[
                Matcher::equal("nickname", Value::empty()),
                Matcher::not_equal("age", Value::Empty(ValueKind::Int)),
            ],
            &table,
            &Dialect::MySql,
        )
        .unwrap();
        let (sql, params) = render(&Dialect::MySql, &filter);
        assert_eq!(sql, " WHERE users.nickname = ? AND users.age <> ?");
        assert_eq!(params, vec![Param::Text(String::new()), Param::Int(0)]);
    }

    #[test]
    fn test_null_renders_is_null() {
        let table = users();
        let filter = apply_matchers(
            Filter::new(),
            &[
                Matcher::equal("deleted_at", Value::Null),
                Matcher::not_equal("email", Value::Null),
            ],
            &table,
            &Dialect::Sqlite,
        )
        .unwrap();
        let (sql, params) = render(&Dialect::Sqlite, &filter);
        assert_eq!(
            sql,
            " WHERE users.deleted_at IS NULL AND users.email IS NOT NULL"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_contains_ignore_case_per_dialect() {
        let table = users();
        let matchers = [
            Matcher::contains_ignore_case("name", "Ann"),
            Matcher::not_contains_ignore_case("email", "spam"),
        ];
        let cases = [
            (
                Dialect::MySql,
                " WHERE LOWER(users.name) LIKE LOWER(?) AND LOWER(users.email) NOT LIKE LOWER(?)",
            ),
            (
                Dialect::Sqlite,
                " WHERE users.name LIKE ? AND users.email NOT LIKE ?",
            ),
            (
                Dialect::Postgres,
                " WHERE users.name ILIKE $1 AND users.email NOT ILIKE $2",
            ),
        ];
        for (dialect, expected) in cases {
            let filter = apply_matchers(Filter::new(), &matchers, &table, &dialect).unwrap();
            let (sql, params) = render(&dialect, &filter);
            assert_eq!(sql, expected, "{dialect}");
            assert_eq!(
                params,
                vec![Param::Text("%Ann%".into()), Param::Text("%spam%".into())]
            );
        }
    }

    #[test]
    fn test_unknown_dialect_rejects_case_insensitive_matching() {
        let table = users();
        let err = apply_matchers(
            Filter::new(),
            &[Matcher::contains_ignore_case("name", "x")],
            &table,
            &Dialect::Other("oracle".into()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedDialect { .. }));
    }

    #[test]
    fn test_unknown_dialect_rejects_keyword_search() {
        let table = users();
        let dialect = Dialect::Other("oracle".into());
        let err = apply_matchers(
            Filter::new(),
            &[Matcher::keyword("name,email", "x")],
            &table,
            &dialect,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedDialect { ref dialect, .. } if dialect == "oracle"
        ));

        let err = apply_keyword_matcher(
            Filter::new(),
            &KeywordMatcher::new(["name", "email"], "x"),
            &table,
            &dialect,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedDialect { .. }));
    }

    #[test]
    fn test_unknown_dialect_still_supports_portable_modes() {
        let table = users();
        let dialect = Dialect::Other("oracle".into());
        let filter = apply_matchers(
            Filter::new(),
            &[Matcher::contains("name", "x"), Matcher::equal("id", 1)],
            &table,
            &dialect,
        )
        .unwrap();
        let (sql, _) = render(&dialect, &filter);
        assert_eq!(sql, " WHERE users.name LIKE ? AND users.id = ?");
    }

    #[test]
    fn test_tags_are_trimmed_and_anded() {
        let table = users();
        let filter = apply_matchers(
            Filter::new(),
            &[Matcher::tags("tags", " rust, ,sql ")],
            &table,
            &Dialect::MySql,
        )
        .unwrap();
        let (sql, params) = render(&Dialect::MySql, &filter);
        assert_eq!(
            sql,
            " WHERE (JSON_CONTAINS(users.tags, JSON_ARRAY(?)) AND JSON_CONTAINS(users.tags, JSON_ARRAY(?)))"
        );
        assert_eq!(
            params,
            vec![Param::Text("rust".into()), Param::Text("sql".into())]
        );
    }

    #[test]
    fn test_tags_per_dialect() {
        let table = users();
        let matchers = [Matcher::tags("labels", "red")];

        let filter = apply_matchers(Filter::new(), &matchers, &table, &Dialect::Sqlite).unwrap();
        assert_eq!(
            render(&Dialect::Sqlite, &filter).0,
            " WHERE EXISTS (SELECT 1 FROM json_each(users.labels) WHERE json_each.value = ?)"
        );

        let filter = apply_matchers(Filter::new(), &matchers, &table, &Dialect::Postgres).unwrap();
        assert_eq!(
            render(&Dialect::Postgres, &filter).0,
            " WHERE users.labels::jsonb @> jsonb_build_array(CAST($1 AS TEXT))"
        );

        let err = apply_matchers(
            Filter::new(),
            &matchers,
            &table,
            &Dialect::Other("db2".into()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedDialect { .. }));
    }

    #[test]
    fn test_keyword_matcher_ors_fields() {
        let table = users();
        let filter = apply_keyword_matcher(
            Filter::new(),
            &KeywordMatcher::new(["name", "emailAddress"], "ann"),
            &table,
            &Dialect::Postgres,
        )
        .unwrap();
        let (sql, params) = render(&Dialect::Postgres, &filter);
        assert_eq!(
            sql,
            " WHERE (users.name ILIKE $1 OR users.email_address ILIKE $2)"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_keyword_mode_splits_matcher_name() {
        let table = users();
        let filter = apply_matchers(
            Filter::new(),
            &[
                Matcher::equal("status", 1),
                Matcher::keyword("name, bio", "rust"),
            ],
            &table,
            &Dialect::MySql,
        )
        .unwrap();
        let (sql, _) = render(&Dialect::MySql, &filter);
        assert_eq!(
            sql,
            " WHERE users.status = ? AND (LOWER(users.name) LIKE LOWER(?) OR LOWER(users.bio) LIKE LOWER(?))"
        );
    }

    #[test]
    fn test_custom_table_is_not_prefixed() {
        let table = users();
        let filter = apply_matchers(
            Filter::new(),
            &[Matcher::equal("orders.status", "paid").with_custom_table()],
            &table,
            &Dialect::Sqlite,
        )
        .unwrap();
        assert_eq!(render(&Dialect::Sqlite, &filter).0, " WHERE orders.status = ?");
    }

    #[test]
    fn test_column_allow_list() {
        let table = users();
        let columns: &[&'static str] = &["id", "name"];
        let builder = PredicateBuilder::new(&Dialect::Sqlite, &table).with_columns(columns);

        assert!(builder
            .apply(Filter::new(), &[Matcher::equal("name", "a")])
            .is_ok());
        let err = builder
            .apply(Filter::new(), &[Matcher::equal("password_hash", "a")])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownColumn { .. }));
    }

    #[test]
    fn test_qualifier_names_columns() {
        let table = users();
        let qualify = |m: &Matcher| format!("u.{}", m.snake_name());
        let filter = PredicateBuilder::new(&Dialect::Sqlite, &table)
            .with_qualifier(&qualify)
            .apply(
                Filter::new(),
                &[Matcher::equal("firstName", "ada"), Matcher::keyword("bio", "x")],
            )
            .unwrap();
        assert_eq!(
            render(&Dialect::Sqlite, &filter).0,
            " WHERE u.first_name = ? AND users.bio LIKE ?"
        );

        let inject = |_: &Matcher| "name) OR (1".to_string();
        let err = PredicateBuilder::new(&Dialect::Sqlite, &table)
            .with_qualifier(&inject)
            .apply(Filter::new(), &[Matcher::equal("name", "a")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }

    #[test]
    fn test_injection_in_custom_table_name_is_rejected() {
        let table = users();
        let err = apply_matchers(
            Filter::new(),
            &[Matcher::equal("1=1 OR x", "a").with_custom_table()],
            &table,
            &Dialect::Sqlite,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }
}
