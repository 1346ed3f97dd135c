//! Seams to the managed backend: row storage, file storage and auth.
//!
//! `nebula-backend` implements these over HTTP. Everything in this crate
//! talks to the traits only, so tests run against in-memory stores.

use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SONGS_TABLE: &str = "songs";
pub const FAVORITES_TABLE: &str = "favorites";
pub const PLAYLISTS_TABLE: &str = "playlists";
pub const HISTORY_TABLE: &str = "listening_history";
pub const PROFILES_TABLE: &str = "profiles";

pub const MUSIC_BUCKET: &str = "music";
pub const COVERS_BUCKET: &str = "covers";

/// Equality filter `column = value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// A read against one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    /// Column list, may embed related tables (`song_id, songs(*)`)
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    /// Select every column of `table`
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    #[must_use]
    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending: false,
        });
        self
    }

    #[must_use]
    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending: true,
        });
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Table storage with PostgREST-like semantics
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rows matching `query`, as raw JSON objects
    async fn select(&self, query: &Query) -> Result<Vec<Value>>;

    /// Exact number of rows in `table`
    async fn count(&self, table: &str) -> Result<u64>;

    async fn insert(&self, table: &str, row: Value) -> Result<()>;

    /// Set `values` on every row matching all `filters`
    async fn update(&self, table: &str, filters: &[Filter], values: Value) -> Result<()>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<()>;
}

/// Select and decode rows into `T`
///
/// # Errors
///
/// Returns an error if the store fails or a row does not decode.
pub async fn select_as<T: DeserializeOwned>(store: &dyn RecordStore, query: &Query) -> Result<Vec<T>> {
    store
        .select(query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(Into::into))
        .collect()
}

/// Public object storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()>;

    /// Anonymous download URL for an uploaded object
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in session as issued by the auth service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Password sign-in
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Register a new account. `None` when the address must be confirmed first.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<AuthSession>>;

    async fn sign_out(&self) -> Result<()>;

    async fn current_session(&self) -> Option<AuthSession>;
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory implementations of the backend traits for tests.

    use super::*;
    use crate::error::{AuthFailure, CoreError};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn matches(row: &Value, filters: &[Filter]) -> bool {
        filters.iter().all(|f| match row.get(&f.column) {
            Some(Value::String(s)) => *s == f.value,
            Some(other) => other.to_string() == f.value,
            None => false,
        })
    }

    fn sort_key(row: &Value, column: &str) -> String {
        match row.get(column) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    #[derive(Debug, Default)]
    pub struct MemoryStore {
        pub tables: Mutex<HashMap<String, Vec<Value>>>,
        /// Operation names that fail with a backend error
        pub failing: Mutex<Vec<&'static str>>,
        pub log: Mutex<Vec<String>>,
    }

    impl MemoryStore {
        pub fn with_rows(table: &str, rows: Vec<Value>) -> Self {
            let store = Self::default();
            store.tables.lock().unwrap().insert(table.to_string(), rows);
            store
        }

        pub fn rows(&self, table: &str) -> Vec<Value> {
            self.tables
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default()
        }

        pub fn fail(&self, operation: &'static str) {
            self.failing.lock().unwrap().push(operation);
        }

        pub fn operations(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn check(&self, operation: &'static str, table: &str) -> Result<()> {
            self.log.lock().unwrap().push(format!("{operation} {table}"));
            if self.failing.lock().unwrap().contains(&operation) {
                return Err(CoreError::backend(operation, "simulated failure"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn select(&self, query: &Query) -> Result<Vec<Value>> {
            self.check("select", &query.table)?;
            let mut rows: Vec<Value> = self
                .rows(&query.table)
                .into_iter()
                .filter(|row| matches(row, &query.filters))
                .collect();

            if let Some(order) = &query.order {
                rows.sort_by_key(|row| sort_key(row, &order.column));
                if order.descending {
                    rows.reverse();
                }
            }
            if let Some(limit) = query.limit {
                rows.truncate(limit);
            }
            Ok(rows)
        }

        async fn count(&self, table: &str) -> Result<u64> {
            self.check("count", table)?;
            Ok(u64::try_from(self.rows(table).len()).unwrap())
        }

        async fn insert(&self, table: &str, row: Value) -> Result<()> {
            self.check("insert", table)?;
            self.tables
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default()
                .push(row);
            Ok(())
        }

        async fn update(&self, table: &str, filters: &[Filter], values: Value) -> Result<()> {
            self.check("update", table)?;
            let mut tables = self.tables.lock().unwrap();
            for row in tables.entry(table.to_string()).or_default() {
                if matches(row, filters) {
                    if let (Some(row), Some(values)) = (row.as_object_mut(), values.as_object()) {
                        for (k, v) in values {
                            row.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
            Ok(())
        }

        async fn delete(&self, table: &str, filters: &[Filter]) -> Result<()> {
            self.check("delete", table)?;
            self.tables
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default()
                .retain(|row| !matches(row, filters));
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    pub struct MemoryBlobs {
        pub objects: Mutex<Vec<(String, String, usize)>>,
        pub fail_uploads: Mutex<bool>,
    }

    #[async_trait]
    impl BlobStore for MemoryBlobs {
        async fn upload(
            &self,
            bucket: &str,
            path: &str,
            bytes: Vec<u8>,
            _content_type: Option<&str>,
        ) -> Result<()> {
            if *self.fail_uploads.lock().unwrap() {
                return Err(CoreError::backend("upload", "bucket unavailable"));
            }
            self.objects
                .lock()
                .unwrap()
                .push((bucket.to_string(), path.to_string(), bytes.len()));
            Ok(())
        }

        fn public_url(&self, bucket: &str, path: &str) -> String {
            format!("https://cdn.test/{bucket}/{path}")
        }
    }

    /// Auth service with a fixed set of accounts
    #[derive(Debug, Default)]
    pub struct MemoryAuth {
        pub accounts: Mutex<HashMap<String, (String, bool)>>,
        pub session: Mutex<Option<AuthSession>>,
        pub calls: Mutex<usize>,
    }

    impl MemoryAuth {
        pub fn with_account(email: &str, password: &str, confirmed: bool) -> Self {
            let auth = Self::default();
            auth.accounts
                .lock()
                .unwrap()
                .insert(email.to_string(), (password.to_string(), confirmed));
            auth
        }

        pub fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    fn session_for(email: &str) -> AuthSession {
        AuthSession {
            access_token: format!("token-{email}"),
            refresh_token: None,
            expires_at: None,
            user: AuthUser {
                id: format!("user-{email}"),
                email: Some(email.to_string()),
            },
        }
    }

    #[async_trait]
    impl AuthService for MemoryAuth {
        async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
            *self.calls.lock().unwrap() += 1;
            let accounts = self.accounts.lock().unwrap();
            match accounts.get(email) {
                Some((stored, true)) if stored == password => {
                    let session = session_for(email);
                    *self.session.lock().unwrap() = Some(session.clone());
                    Ok(session)
                }
                Some((stored, false)) if stored == password => {
                    Err(CoreError::AuthFailed(AuthFailure::EmailNotConfirmed))
                }
                _ => Err(CoreError::AuthFailed(AuthFailure::InvalidCredentials)),
            }
        }

        async fn sign_up(&self, email: &str, password: &str) -> Result<Option<AuthSession>> {
            *self.calls.lock().unwrap() += 1;
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(email) {
                return Err(CoreError::AuthFailed(AuthFailure::AlreadyRegistered));
            }
            accounts.insert(email.to_string(), (password.to_string(), false));
            Ok(None)
        }

        async fn sign_out(&self) -> Result<()> {
            *self.calls.lock().unwrap() += 1;
            *self.session.lock().unwrap() = None;
            Ok(())
        }

        async fn current_session(&self) -> Option<AuthSession> {
            self.session.lock().unwrap().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = Query::table(FAVORITES_TABLE)
            .select("song_id, songs(*)")
            .eq("user_id", "u1")
            .order_desc("created_at")
            .limit(50);

        assert_eq!(query.table, "favorites");
        assert_eq!(query.columns, "song_id, songs(*)");
        assert_eq!(query.filters, vec![Filter::eq("user_id", "u1")]);
        assert_eq!(
            query.order,
            Some(Order {
                column: "created_at".into(),
                descending: true
            })
        );
        assert_eq!(query.limit, Some(50));
    }

    #[test]
    fn test_default_query_selects_everything() {
        let query = Query::table(SONGS_TABLE);
        assert_eq!(query.columns, "*");
        assert!(query.filters.is_empty());
        assert!(query.order.is_none());
    }
}
