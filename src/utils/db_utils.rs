use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use sqlx::MySqlPool;

/// Value bound to a `?` placeholder of a dynamically built statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    U64(u64),
    I64(i64),
    Str(String),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I64(v.into())
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Str(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Str(v.to_string())
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Binds every value, in order, onto a `query`, `query_as` or `query_scalar`.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut q = $query;
        for value in $values {
            q = match value {
                $crate::utils::db_utils::SqlValue::U64(v) => q.bind(*v),
                $crate::utils::db_utils::SqlValue::I64(v) => q.bind(*v),
                $crate::utils::db_utils::SqlValue::Str(v) => q.bind(v.as_str()),
                $crate::utils::db_utils::SqlValue::Bool(v) => q.bind(*v),
                $crate::utils::db_utils::SqlValue::Date(v) => q.bind(*v),
                $crate::utils::db_utils::SqlValue::Null => q.bind(None::<String>),
            };
        }
        q
    }};
}
pub(crate) use bind_values;

/// AND-joined WHERE conditions and their bind values.
#[derive(Debug, Default)]
pub struct Conditions {
    clauses: Vec<String>,
    values: Vec<SqlValue>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `clause` holds one `?` per value.
    pub fn push<I>(&mut self, clause: &str, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        self.clauses.push(clause.to_string());
        self.values.extend(values.into_iter().map(Into::into));
        self
    }

    /// Empty, or ` WHERE a AND b` with a leading space.
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// SET list of an UPDATE built from a typed patch.
#[derive(Debug)]
pub struct SqlUpdate {
    table: &'static str,
    sets: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlUpdate {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            sets: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Sets the column when the patch carries it. `Some(None)` writes NULL.
    pub fn set<T: Into<SqlValue>>(&mut self, column: &'static str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.sets.push(format!("{column} = ?"));
            self.values.push(value.into());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Statement and values, the row id bound last.
    pub fn build(&self, id: u64) -> (String, Vec<SqlValue>) {
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, self.sets.join(", "));
        let mut values = self.values.clone();
        values.push(SqlValue::U64(id));
        (sql, values)
    }

    pub async fn execute(&self, pool: &MySqlPool, id: u64) -> Result<u64, sqlx::Error> {
        let (sql, values) = self.build(id);
        let result = bind_values!(sqlx::query(&sql), &values).execute(pool).await?;
        Ok(result.rows_affected())
    }
}

/// Tells an absent field (`None`) from an explicit `null` (`Some(None)`).
/// Use with `#[serde(default, deserialize_with = "nullable")]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        chef_id: Option<Option<u64>>,
    }

    #[test]
    fn only_present_fields_are_set() {
        let mut update = SqlUpdate::new("employees");
        update
            .set("first_name", Some("Ana"))
            .set::<String>("last_name", None)
            .set("hire_date", Some(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
        let (sql, values) = update.build(9);
        assert_eq!(sql, "UPDATE employees SET first_name = ?, hire_date = ? WHERE id = ?");
        assert_eq!(
            values,
            vec![
                SqlValue::Str("Ana".into()),
                SqlValue::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()),
                SqlValue::U64(9),
            ]
        );
    }

    #[test]
    fn explicit_null_clears_a_column() {
        let patch: Patch = serde_json::from_value(json!({"chef_id": null})).unwrap();
        assert_eq!(patch.chef_id, Some(None));
        let absent: Patch = serde_json::from_value(json!({})).unwrap();
        assert_eq!(absent.chef_id, None);

        let mut update = SqlUpdate::new("employees");
        update.set("chef_id", patch.chef_id);
        assert_eq!(update.build(1).1[0], SqlValue::Null);
    }

    #[test]
    fn empty_patch_is_detected() {
        let mut update = SqlUpdate::new("tasks");
        update.set::<u64>("assignee_id", None);
        assert!(update.is_empty());
    }

    #[test]
    fn conditions_join_with_and() {
        let mut conditions = Conditions::new();
        assert_eq!(conditions.where_sql(), "");
        conditions
            .push("(employee_id = ? OR chef_id = ?)", [7u64, 7])
            .push("status = ?", ["pending"]);
        assert_eq!(
            conditions.where_sql(),
            " WHERE (employee_id = ? OR chef_id = ?) AND status = ?"
        );
        assert_eq!(
            conditions.values(),
            &[SqlValue::U64(7), SqlValue::U64(7), SqlValue::Str("pending".into())]
        );
    }
}
