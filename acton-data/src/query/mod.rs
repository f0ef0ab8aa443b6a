//! Filtering, sorting and statement rendering
//!
//! Callers describe what they want with [`Matcher`]s and a [`Sort`]; the
//! [`PredicateBuilder`] turns matchers into a [`Filter`] for a table and
//! dialect, and [`SelectPlan`] renders the filter, a validated [`OrderBy`]
//! and an optional window into parameterized statements.

pub mod ident;
pub mod matcher;
pub mod predicate;
pub mod sort;
pub mod sql;
pub mod value;

pub use ident::Ident;
pub use matcher::{KeywordMatcher, Matcher, MatcherMode};
pub use predicate::{apply_keyword_matcher, apply_matchers, Filter, Predicate, PredicateBuilder};
pub use sort::{OrderBy, Sort, SortOrder};
pub use sql::{Join, JoinKind, LockMode, SelectPlan, SqlWriter, Statement};
pub use value::{Param, Value, ValueKind};
