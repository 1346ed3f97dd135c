use crate::{ensure_success, SupabaseClient, LOG_TARGET};
use async_trait::async_trait;
use nebula_core::{CoreError, Filter, Query, RecordStore};
use serde_json::Value;
use tracing::debug;

/// `column=eq.value` pairs, values percent-encoded
#[must_use]
pub fn filter_params(filters: &[Filter]) -> Vec<String> {
    filters
        .iter()
        .map(|f| {
            format!(
                "{}=eq.{}",
                urlencoding::encode(&f.column),
                urlencoding::encode(&f.value)
            )
        })
        .collect()
}

/// Query string for a select, without the leading `?`
#[must_use]
pub fn select_params(query: &Query) -> String {
    let columns: String = query.columns.chars().filter(|c| !c.is_whitespace()).collect();
    let mut params = vec![format!("select={}", urlencoding::encode(&columns))];
    params.extend(filter_params(&query.filters));

    if let Some(order) = &query.order {
        let direction = if order.descending { "desc" } else { "asc" };
        params.push(format!(
            "order={}.{direction}",
            urlencoding::encode(&order.column)
        ));
    }
    if let Some(limit) = query.limit {
        params.push(format!("limit={limit}"));
    }

    params.join("&")
}

/// Total from a `Content-Range` header such as `0-24/573` or `*/0`
#[must_use]
pub fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

impl SupabaseClient {
    fn table_url(&self, table: &str, params: &str) -> String {
        let url = self.endpoint(&format!("/rest/v1/{}", urlencoding::encode(table)));
        if params.is_empty() {
            url
        } else {
            format!("{url}?{params}")
        }
    }
}

#[async_trait]
impl RecordStore for SupabaseClient {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, CoreError> {
        let url = self.table_url(&query.table, &select_params(query));
        debug!(target: LOG_TARGET, "GET {}", url);

        let response = self.authorize(self.client.get(&url)).await.send().await?;
        let response = ensure_success("select", response).await?;
        Ok(response.json().await?)
    }

    async fn count(&self, table: &str) -> Result<u64, CoreError> {
        let url = self.table_url(table, "select=*");
        debug!(target: LOG_TARGET, "HEAD {} (count)", url);

        let request = self
            .client
            .head(&url)
            .header("Prefer", "count=exact")
            .header("Range-Unit", "items");
        let response = self.authorize(request).await.send().await?;
        let response = ensure_success("count", response).await?;

        response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| CoreError::backend("count", "response carried no row count"))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<(), CoreError> {
        let url = self.table_url(table, "");
        debug!(target: LOG_TARGET, "POST {}", url);

        let request = self
            .client
            .post(&url)
            .header("Prefer", "return=minimal")
            .json(&row);
        let response = self.authorize(request).await.send().await?;
        ensure_success("insert", response).await?;
        Ok(())
    }

    async fn update(&self, table: &str, filters: &[Filter], values: Value) -> Result<(), CoreError> {
        let url = self.table_url(table, &filter_params(filters).join("&"));
        debug!(target: LOG_TARGET, "PATCH {}", url);

        let request = self
            .client
            .patch(&url)
            .header("Prefer", "return=minimal")
            .json(&values);
        let response = self.authorize(request).await.send().await?;
        ensure_success("update", response).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), CoreError> {
        // PostgREST deletes every row when no filter is given
        if filters.is_empty() {
            return Err(CoreError::backend("delete", "refusing to delete without a filter"));
        }

        let url = self.table_url(table, &filter_params(filters).join("&"));
        debug!(target: LOG_TARGET, "DELETE {}", url);

        let response = self
            .authorize(self.client.delete(&url))
            .await
            .send()
            .await?;
        ensure_success("delete", response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebula_core::BackendConfig;

    #[test]
    fn test_select_params_full_query() {
        let query = Query::table("favorites")
            .select("song_id, songs(*)")
            .eq("user_id", "u 1")
            .order_desc("created_at")
            .limit(50);

        assert_eq!(
            select_params(&query),
            "select=song_id%2Csongs%28%2A%29&user_id=eq.u%201&order=created_at.desc&limit=50"
        );
    }

    #[test]
    fn test_select_params_defaults() {
        assert_eq!(select_params(&Query::table("songs")), "select=%2A");
        assert_eq!(
            select_params(&Query::table("songs").order_asc("title")),
            "select=%2A&order=title.asc"
        );
    }

    #[test]
    fn test_filter_params_encode_values() {
        let filters = [Filter::eq("id", "a&b=c"), Filter::eq("user_id", "u1")];
        assert_eq!(
            filter_params(&filters),
            vec!["id=eq.a%26b%3Dc".to_string(), "user_id=eq.u1".to_string()]
        );
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-24/573"), Some(573));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-24/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn test_table_url() {
        let client = SupabaseClient::new(&BackendConfig {
            url: "https://demo.supabase.co".into(),
            anon_key: "anon".into(),
        })
        .unwrap();
        assert_eq!(
            client.table_url("songs", "select=%2A"),
            "https://demo.supabase.co/rest/v1/songs?select=%2A"
        );
        assert_eq!(
            client.table_url("songs", ""),
            "https://demo.supabase.co/rest/v1/songs"
        );
    }

    #[tokio::test]
    async fn test_delete_without_filter_is_refused() {
        let client = SupabaseClient::new(&BackendConfig {
            url: "http://127.0.0.1:9".into(),
            anon_key: "anon".into(),
        })
        .unwrap();
        let err = client.delete("songs", &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::Backend { .. }));
    }
}
