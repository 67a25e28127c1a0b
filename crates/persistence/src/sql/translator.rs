//! Relational translator.
//!
//! Converts a [`ListQuery`] into parameterized statements against one
//! introspected table. Every value is bound as a parameter; every identifier
//! comes from [`TableSchema::resolve`] and is quoted.
//!
//! List calls use two statements compiled from the same WHERE clause:
//!
//! ```sql
//! SELECT COUNT(*) FROM "t" WHERE "active" = ?1 AND ...
//! SELECT ... FROM "t" WHERE "active" = ?1 AND ... ORDER BY ... LIMIT ?n OFFSET ?m
//! ```

use chrono::{DateTime, Utc};

use super::fragment::{Dialect, SqlFragment, SqlParam, Statement, quote_ident};
use super::schema::{Column, TableSchema};
use crate::engine::operators::{check_kind, fold_case};
use crate::engine::pagination::{PageWindow, calculate};
use crate::engine::search::Searcher;
use crate::error::ValidationError;
use crate::types::{
    ACTIVE_FIELD, BUILTIN_FIELDS, DATE_CREATED_FIELD, DATE_MODIFIED_FIELD, DateOperator,
    FieldType, FilterKind, ID_FIELD, ListOperator, ListQuery, ListResult, NumberOperator,
    PaginationRequest, Record, RecordInput, SortField, StringOperator, TypedFilter,
    compile_pattern,
};

/// Compiled statements for one List call.
#[derive(Debug, Clone)]
pub struct ListPlan {
    dialect: Dialect,
    /// `SELECT COUNT(*)` over the shared WHERE clause.
    pub count: Statement,
    select: String,
    where_params: Vec<SqlParam>,
    order_by: String,
    window: PageWindow,
    cap: Option<u64>,
    searcher: Option<Searcher>,
    pagination: PaginationRequest,
}

impl ListPlan {
    /// Applies the search cap to the raw count.
    pub fn total(&self, count: u64) -> u64 {
        match self.cap {
            Some(cap) => count.min(cap),
            None => count,
        }
    }

    /// Returns the data statement for the page, or `None` if the page is
    /// empty given `total` rows.
    pub fn data(&self, total: u64) -> Option<Statement> {
        let rows = self.window.len(total);
        if rows == 0 {
            return None;
        }

        let mut frag = SqlFragment::new(self.dialect);
        frag.sql = self.select.clone();
        frag.params = self.where_params.clone();
        let limit = frag.add_param(SqlParam::Integer(to_i64(rows)));
        let offset = frag.add_param(SqlParam::Integer(to_i64(self.window.offset)));
        frag.push_str(&format!(" {} LIMIT {} OFFSET {}", self.order_by, limit, offset));
        Some(frag.into_statement())
    }

    /// Builds the result from the fetched page.
    pub fn finish(&self, total: u64, records: Vec<Record>) -> ListResult {
        let matches = match &self.searcher {
            Some(searcher) => records.iter().map(|r| searcher.score(r)).collect(),
            None => Vec::new(),
        };
        ListResult {
            pagination: calculate(&self.pagination, self.window, total),
            records,
            matches,
        }
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Statement generator for one table.
#[derive(Debug, Clone, Copy)]
pub struct Translator<'s> {
    dialect: Dialect,
    schema: &'s TableSchema,
}

impl<'s> Translator<'s> {
    /// Creates a translator.
    pub fn new(dialect: Dialect, schema: &'s TableSchema) -> Self {
        Self { dialect, schema }
    }

    fn table(&self) -> String {
        quote_ident(self.schema.table())
    }

    fn builtin(&self, name: &str) -> Result<&'s Column, ValidationError> {
        self.schema.resolve(name)
    }

    /// The select list, in [`TableSchema::columns`] order.
    pub fn select_list(&self) -> String {
        self.schema
            .columns()
            .iter()
            .map(|c| {
                let operand = self.dialect.operand(c);
                let ident = quote_ident(c.name());
                if operand == ident {
                    ident
                } else {
                    format!("{} AS {}", operand, ident)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Compiles the WHERE clause shared by the count and data statements:
    /// the active baseline, every filter, then the search condition.
    pub fn where_clause(
        &self,
        query: &ListQuery,
    ) -> Result<(SqlFragment, Option<Searcher>), ValidationError> {
        let mut frag = SqlFragment::new(self.dialect);
        let mut conditions = Vec::new();

        let active = self.builtin(ACTIVE_FIELD)?;
        let ph = frag.add_param(SqlParam::Bool(true));
        conditions.push(format!("{} = {}", self.dialect.operand(active), ph));

        for filter in query.filter.iter() {
            let column = self.schema.resolve(&filter.field)?;
            check_kind(filter, column.field_type())?;
            if let Some(condition) = self.condition(&mut frag, column, filter)? {
                conditions.push(condition);
            }
        }

        let searcher = match query.active_search() {
            Some(search) => {
                let mut columns = Vec::with_capacity(search.search_fields.len());
                for field in &search.search_fields {
                    let column = self.schema.resolve(field)?;
                    if column.field_type() != FieldType::String {
                        return Err(ValidationError::InvalidSearch {
                            message: format!("'{}' is not a text field", field),
                        });
                    }
                    columns.push(column);
                }
                let searcher = Searcher::new(
                    search,
                    columns.iter().map(|c| c.name().to_string()).collect(),
                )?;
                let ph = frag.add_param(SqlParam::text(searcher.needle()));
                let any = columns
                    .iter()
                    .map(|c| {
                        let lowered = self.dialect.lower(&self.dialect.operand(c));
                        self.dialect.contains(&lowered, &ph)
                    })
                    .collect::<Vec<_>>()
                    .join(" OR ");
                conditions.push(format!("({})", any));
                Some(searcher)
            }
            None => None,
        };

        frag.sql = conditions.join(" AND ");
        Ok((frag, searcher))
    }

    fn condition(
        &self,
        frag: &mut SqlFragment,
        column: &Column,
        filter: &TypedFilter,
    ) -> Result<Option<String>, ValidationError> {
        if filter.is_noop() {
            return Ok(None);
        }

        let expr = self.dialect.operand(column);
        let condition = match &filter.kind {
            FilterKind::String(f) if f.operator == StringOperator::Regex => {
                compile_pattern(&f.value, f.case_sensitive).map_err(|message| {
                    ValidationError::InvalidValue {
                        field: filter.field.clone(),
                        message,
                    }
                })?;
                let pattern = match self.dialect {
                    Dialect::Sqlite if !f.case_sensitive => format!("(?i){}", f.value),
                    _ => f.value.clone(),
                };
                let ph = frag.add_param(SqlParam::Text(pattern));
                self.dialect.regex(&expr, &ph, f.case_sensitive)
            }
            FilterKind::String(f) => {
                let (lhs, value) = if f.case_sensitive {
                    (expr, f.value.clone())
                } else {
                    (self.dialect.lower(&expr), fold_case(&f.value))
                };
                let ph = frag.add_param(SqlParam::Text(value));
                match f.operator {
                    StringOperator::Equals => format!("{} = {}", lhs, ph),
                    StringOperator::NotEquals => format!("{} <> {}", lhs, ph),
                    StringOperator::Contains => self.dialect.contains(&lhs, &ph),
                    StringOperator::StartsWith => self.dialect.starts_with(&lhs, &ph),
                    StringOperator::EndsWith => self.dialect.ends_with(&lhs, &ph),
                    StringOperator::Regex => self.dialect.regex(&lhs, &ph, f.case_sensitive),
                }
            }
            FilterKind::Number(f) => {
                let op = match f.operator {
                    NumberOperator::Equals => "=",
                    NumberOperator::NotEquals => "<>",
                    NumberOperator::Gt => ">",
                    NumberOperator::Gte => ">=",
                    NumberOperator::Lt => "<",
                    NumberOperator::Lte => "<=",
                };
                let ph = frag.add_param(SqlParam::Float(f.value));
                format!("{} {} {}", expr, op, ph)
            }
            FilterKind::Boolean(f) => {
                let ph = frag.add_param(SqlParam::Bool(f.value));
                format!("{} = {}", expr, ph)
            }
            FilterKind::List(f) => {
                let placeholders = f
                    .values
                    .iter()
                    .map(|v| frag.add_param(SqlParam::text(v.as_str())))
                    .collect::<Vec<_>>()
                    .join(", ");
                let op = match f.operator {
                    ListOperator::In => "IN",
                    ListOperator::NotIn => "NOT IN",
                };
                format!("{} {} ({})", expr, op, placeholders)
            }
            FilterKind::Range(f) => {
                let min = frag.add_param(SqlParam::Float(f.min));
                let max = frag.add_param(SqlParam::Float(f.max));
                format!(
                    "({expr} {} {min} AND {expr} {} {max})",
                    if f.include_min { ">=" } else { ">" },
                    if f.include_max { "<=" } else { "<" },
                    expr = expr,
                    min = min,
                    max = max,
                )
            }
            FilterKind::Date(f) => {
                let ph = frag.add_param(SqlParam::Timestamp(f.start()));
                match (f.operator, f.end()) {
                    (DateOperator::Equals, _) => format!("{} = {}", expr, ph),
                    (DateOperator::Before, _) => format!("{} < {}", expr, ph),
                    (DateOperator::After, _) => format!("{} > {}", expr, ph),
                    (DateOperator::Between, Some(end)) => {
                        let end = frag.add_param(SqlParam::Timestamp(end));
                        format!("({} >= {} AND {} <= {})", expr, ph, expr, end)
                    }
                    (DateOperator::Between, None) => return Ok(None),
                }
            }
        };
        Ok(Some(condition))
    }

    /// Builds the ORDER BY clause: requested keys with explicit null
    /// placement, then `date_created ASC, id ASC`.
    pub fn order_by(&self, sort: &[SortField]) -> Result<String, ValidationError> {
        let mut parts = Vec::with_capacity(sort.len() + 2);
        for key in sort {
            let column = self.schema.resolve(&key.field)?;
            parts.push(format!(
                "{} {} NULLS {}",
                self.dialect.sort_expr(column),
                key.direction.as_str(),
                if key.nulls_first() { "FIRST" } else { "LAST" }
            ));
        }
        parts.push(format!(
            "{} ASC",
            self.dialect.sort_expr(self.builtin(DATE_CREATED_FIELD)?)
        ));
        parts.push(format!(
            "{} ASC",
            self.dialect.sort_expr(self.builtin(ID_FIELD)?)
        ));
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }

    /// Validates the query and compiles the count and data statements.
    pub fn compile_list(&self, query: &ListQuery) -> Result<ListPlan, ValidationError> {
        query.validate()?;
        let window = PageWindow::resolve(&query.pagination)?;
        let (where_clause, searcher) = self.where_clause(query)?;
        let order_by = self.order_by(query.sort_fields())?;

        let count = Statement {
            sql: format!(
                "SELECT COUNT(*) FROM {} WHERE {}",
                self.table(),
                where_clause.sql
            ),
            params: where_clause.params.clone(),
        };
        let select = format!(
            "SELECT {} FROM {} WHERE {}",
            self.select_list(),
            self.table(),
            where_clause.sql
        );

        Ok(ListPlan {
            dialect: self.dialect,
            count,
            select,
            where_params: where_clause.params,
            order_by,
            window,
            cap: query.active_search().and_then(|s| s.cap()),
            searcher,
            pagination: query.pagination.clone(),
        })
    }

    fn id_condition(&self, frag: &mut SqlFragment, id: &str) -> Result<String, ValidationError> {
        let column = self.builtin(ID_FIELD)?;
        let ph = frag.add_param(SqlParam::text(id));
        Ok(format!("{} = {}", self.dialect.operand(column), ph))
    }

    fn active_condition(
        &self,
        frag: &mut SqlFragment,
        active: bool,
    ) -> Result<String, ValidationError> {
        let column = self.builtin(ACTIVE_FIELD)?;
        let ph = frag.add_param(SqlParam::Bool(active));
        Ok(format!("{} = {}", self.dialect.operand(column), ph))
    }

    /// Reads one record. `active_only` adds the soft-delete baseline.
    pub fn select_by_id(&self, id: &str, active_only: bool) -> Result<Statement, ValidationError> {
        let mut frag = SqlFragment::new(self.dialect);
        let mut condition = self.id_condition(&mut frag, id)?;
        if active_only {
            condition = format!("{} AND {}", condition, self.active_condition(&mut frag, true)?);
        }
        frag.sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.select_list(),
            self.table(),
            condition
        );
        Ok(frag.into_statement())
    }

    /// Counts active rows with the identifier (0 or 1).
    pub fn exists(&self, id: &str) -> Result<Statement, ValidationError> {
        let mut frag = SqlFragment::new(self.dialect);
        let id_cond = self.id_condition(&mut frag, id)?;
        let active_cond = self.active_condition(&mut frag, true)?;
        frag.sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} AND {}",
            self.table(),
            id_cond,
            active_cond
        );
        Ok(frag.into_statement())
    }

    fn assignments<'a>(
        &self,
        frag: &mut SqlFragment,
        fields: impl IntoIterator<Item = (&'a String, &'a crate::types::FieldValue)>,
        dropped: &mut Vec<String>,
    ) -> Result<Vec<(String, String)>, ValidationError> {
        let mut out = Vec::new();
        for (name, value) in fields {
            if BUILTIN_FIELDS.contains(&name.as_str()) {
                continue;
            }
            match self.schema.column(name) {
                Some(column) => {
                    let value = value.coerce(column.field_type()).ok_or_else(|| {
                        ValidationError::InvalidValue {
                            field: name.clone(),
                            message: format!("expected a {} value", column.field_type()),
                        }
                    })?;
                    let ph = frag.add_param(SqlParam::from_value(&value, column.field_type()));
                    out.push((quote_ident(column.name()), self.dialect.assign(column, &ph)));
                }
                None => dropped.push(name.clone()),
            }
        }
        Ok(out)
    }

    fn builtin_assignment(
        &self,
        frag: &mut SqlFragment,
        name: &str,
        param: SqlParam,
    ) -> Result<(String, String), ValidationError> {
        let column = self.builtin(name)?;
        let ph = frag.add_param(param);
        Ok((quote_ident(column.name()), self.dialect.assign(column, &ph)))
    }

    /// Inserts a new record. Fields with no matching column are returned
    /// instead of being written.
    pub fn insert(&self, record: &Record) -> Result<(Statement, Vec<String>), ValidationError> {
        let mut frag = SqlFragment::new(self.dialect);
        let mut dropped = Vec::new();
        let mut pairs = vec![
            self.builtin_assignment(&mut frag, ID_FIELD, SqlParam::text(record.id()))?,
            self.builtin_assignment(&mut frag, ACTIVE_FIELD, SqlParam::Bool(record.is_active()))?,
            self.builtin_assignment(
                &mut frag,
                DATE_CREATED_FIELD,
                SqlParam::Timestamp(record.date_created()),
            )?,
            self.builtin_assignment(
                &mut frag,
                DATE_MODIFIED_FIELD,
                SqlParam::Timestamp(record.date_modified()),
            )?,
        ];
        pairs.extend(self.assignments(&mut frag, record.fields(), &mut dropped)?);

        let (columns, values): (Vec<String>, Vec<String>) = pairs.into_iter().unzip();
        frag.sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            columns.join(", "),
            values.join(", ")
        );
        Ok((frag.into_statement(), dropped))
    }

    /// Updates a record by identifier without the active baseline, so an
    /// inactive row can be reactivated.
    pub fn update(
        &self,
        id: &str,
        input: &RecordInput,
        modified: DateTime<Utc>,
    ) -> Result<(Statement, Vec<String>), ValidationError> {
        let mut frag = SqlFragment::new(self.dialect);
        let mut dropped = Vec::new();
        let mut pairs = vec![
            self.builtin_assignment(&mut frag, ACTIVE_FIELD, SqlParam::Bool(input.active()))?,
            self.builtin_assignment(&mut frag, DATE_MODIFIED_FIELD, SqlParam::Timestamp(modified))?,
        ];
        pairs.extend(self.assignments(&mut frag, input.fields(), &mut dropped)?);

        let set = pairs
            .into_iter()
            .map(|(column, value)| format!("{} = {}", column, value))
            .collect::<Vec<_>>()
            .join(", ");
        let condition = self.id_condition(&mut frag, id)?;
        frag.sql = format!("UPDATE {} SET {} WHERE {}", self.table(), set, condition);
        Ok((frag.into_statement(), dropped))
    }

    /// Marks an active record inactive.
    pub fn soft_delete(&self, id: &str, modified: DateTime<Utc>) -> Result<Statement, ValidationError> {
        let mut frag = SqlFragment::new(self.dialect);
        let (active_col, active_val) =
            self.builtin_assignment(&mut frag, ACTIVE_FIELD, SqlParam::Bool(false))?;
        let (modified_col, modified_val) =
            self.builtin_assignment(&mut frag, DATE_MODIFIED_FIELD, SqlParam::Timestamp(modified))?;
        let id_cond = self.id_condition(&mut frag, id)?;
        let active_cond = self.active_condition(&mut frag, true)?;
        frag.sql = format!(
            "UPDATE {} SET {} = {}, {} = {} WHERE {} AND {}",
            self.table(),
            active_col,
            active_val,
            modified_col,
            modified_val,
            id_cond,
            active_cond
        );
        Ok(frag.into_statement())
    }

    /// Physically removes a record, active or not.
    pub fn hard_delete(&self, id: &str) -> Result<Statement, ValidationError> {
        let mut frag = SqlFragment::new(self.dialect);
        let condition = self.id_condition(&mut frag, id)?;
        frag.sql = format!("DELETE FROM {} WHERE {}", self.table(), condition);
        Ok(frag.into_statement())
    }
}
