//! Table query builder.
//!
//! Queries render to PostgREST query parameters. The builder keeps filters as
//! data so test backends can evaluate them without a real server.

use std::fmt::Display;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One filter condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    /// Column equals value.
    Eq(String),
    /// Column differs from value.
    Neq(String),
    /// Column is one of the values.
    In(Vec<String>),
    /// Column is null.
    IsNull,
    /// Column is not null.
    NotNull,
    /// Column is greater than or equal to value.
    Gte(String),
    /// Case-insensitive pattern, `*` as wildcard.
    Ilike(String),
}

/// A filter on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Column name.
    pub column: String,
    /// Condition.
    pub op: FilterOp,
}

/// Rows match if any of the columns matches the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyIlike {
    /// Columns to search.
    pub columns: Vec<String>,
    /// Case-insensitive pattern, `*` as wildcard.
    pub pattern: String,
}

/// A read, update or delete target on one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    columns: String,
    filters: Vec<Filter>,
    search: Option<AnyIlike>,
    order: Vec<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    /// Start a query selecting every column of `table`.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            search: None,
            order: Vec::new(),
            limit: None,
        }
    }

    /// Choose the columns, including embedded joins such as
    /// `*, subject:subjects(name)`.
    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    fn filter(mut self, column: impl Into<String>, op: FilterOp) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
        });
        self
    }

    /// Keep rows where `column = value`.
    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Display) -> Self {
        self.filter(column, FilterOp::Eq(value.to_string()))
    }

    /// Keep rows where `column <> value`.
    #[must_use]
    pub fn neq(self, column: impl Into<String>, value: impl Display) -> Self {
        self.filter(column, FilterOp::Neq(value.to_string()))
    }

    /// Keep rows where `column` is one of `values`.
    #[must_use]
    pub fn is_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.filter(column, FilterOp::In(values))
    }

    /// Keep rows where `column` is null.
    #[must_use]
    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.filter(column, FilterOp::IsNull)
    }

    /// Keep rows where `column` is not null.
    #[must_use]
    pub fn not_null(self, column: impl Into<String>) -> Self {
        self.filter(column, FilterOp::NotNull)
    }

    /// Keep rows where `column >= value`.
    #[must_use]
    pub fn gte(self, column: impl Into<String>, value: impl Display) -> Self {
        self.filter(column, FilterOp::Gte(value.to_string()))
    }

    /// Keep rows where `column` matches `pattern` ignoring case.
    #[must_use]
    pub fn ilike(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(column, FilterOp::Ilike(pattern.into()))
    }

    /// Keep rows where any of `columns` contains `term` ignoring case.
    #[must_use]
    pub fn search<I, C>(mut self, columns: I, term: &str) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.search = Some(AnyIlike {
            columns: columns.into_iter().map(Into::into).collect(),
            pattern: format!("*{}*", term.replace(['*', ',', '(', ')'], " ").trim()),
        });
        self
    }

    /// Sort by `column`; later calls break ties.
    #[must_use]
    pub fn order(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push((column.into(), direction));
        self
    }

    /// Newest first by `column`.
    #[must_use]
    pub fn order_desc(self, column: impl Into<String>) -> Self {
        self.order(column, Direction::Descending)
    }

    /// Return at most `n` rows.
    #[must_use]
    pub const fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Target table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Selected columns.
    #[must_use]
    pub fn columns(&self) -> &str {
        &self.columns
    }

    /// Column filters.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Multi-column search, if any.
    #[must_use]
    pub fn search_filter(&self) -> Option<&AnyIlike> {
        self.search.as_ref()
    }

    /// Sort keys.
    #[must_use]
    pub fn ordering(&self) -> &[(String, Direction)] {
        &self.order
    }

    /// Row limit.
    #[must_use]
    pub const fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Render as PostgREST query parameters for a read.
    #[must_use]
    pub fn to_read_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.to_filter_params());
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(column, direction)| match direction {
                    Direction::Ascending => format!("{column}.asc"),
                    Direction::Descending => format!("{column}.desc"),
                })
                .collect::<Vec<_>>()
                .join(",");
            params.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Render only the row filters, for updates and deletes.
    #[must_use]
    pub fn to_filter_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|f| {
                let value = match &f.op {
                    FilterOp::Eq(v) => format!("eq.{v}"),
                    FilterOp::Neq(v) => format!("neq.{v}"),
                    FilterOp::In(values) => {
                        let quoted: Vec<String> =
                            values.iter().map(|v| format!("\"{v}\"")).collect();
                        format!("in.({})", quoted.join(","))
                    }
                    FilterOp::IsNull => "is.null".to_string(),
                    FilterOp::NotNull => "not.is.null".to_string(),
                    FilterOp::Gte(v) => format!("gte.{v}"),
                    FilterOp::Ilike(p) => format!("ilike.{p}"),
                };
                (f.column.clone(), value)
            })
            .collect();
        if let Some(search) = &self.search {
            let clauses: Vec<String> = search
                .columns
                .iter()
                .map(|c| format!("{c}.ilike.{}", search.pattern))
                .collect();
            params.push(("or".to_string(), format!("({})", clauses.join(","))));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_filters_order_and_limit() {
        let query = Query::table("answers")
            .select("*, subject:subjects(name)")
            .eq("student_id", "abc")
            .is_in("status", ["assigned", "in_evaluation"])
            .order_desc("submitted_at")
            .limit(20);

        assert_eq!(
            query.to_read_params(),
            vec![
                ("select".to_string(), "*, subject:subjects(name)".to_string()),
                ("student_id".to_string(), "eq.abc".to_string()),
                (
                    "status".to_string(),
                    "in.(\"assigned\",\"in_evaluation\")".to_string()
                ),
                ("order".to_string(), "submitted_at.desc".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn search_strips_reserved_characters() {
        let query = Query::table("help_content").search(["title", "content"], "refund (policy)");
        let params = query.to_filter_params();
        assert_eq!(
            params,
            vec![(
                "or".to_string(),
                "(title.ilike.*refund  policy*,content.ilike.*refund  policy*)".to_string()
            )]
        );
    }

    #[test]
    fn null_checks() {
        let params = Query::table("answers")
            .is_null("assigned_faculty_id")
            .not_null("subject_id")
            .to_filter_params();
        assert_eq!(params[0].1, "is.null");
        assert_eq!(params[1].1, "not.is.null");
    }
}
