//! PostgREST client for the hosted database.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Client, RequestBuilder, Response};

use crate::error::StoreError;
use crate::query::{conjunction, Filter, Query};
use crate::row::{Row, RowId};
use crate::Store;

#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
}

impl RestStore {
    /// `base_url` is the project URL (the `/rest/v1` suffix is added here).
    /// Every request carries the service key and is bounded by `timeout`.
    pub fn new(base_url: &str, service_key: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(service_key).map_err(|e| StoreError::Client(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .map_err(|e| StoreError::Client(e.to_string()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.base_url)
    }

    fn with_query(&self, req: RequestBuilder, query: &Query) -> RequestBuilder {
        req.query(&query_pairs(query))
    }

    async fn fetch_page(&self, table: &str, query: &Query) -> Result<(Vec<Row>, Extent), StoreError> {
        let resp = self
            .with_query(self.client.get(self.table_url(table)), query)
            .header("Prefer", "count=exact")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StoreError::read(table, e))?;
        let extent = Extent::of(&resp);
        let rows = resp
            .json::<Vec<Row>>()
            .await
            .map_err(|e| StoreError::read(table, e))?;
        Ok((rows, extent))
    }
}

/// What the `Content-Range` header says about rows past the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extent {
    /// No header: the response is the whole result.
    Complete,
    /// `a-b/*`: keep reading until a page comes back empty.
    Open,
    /// `a-b/n`
    Total(usize),
}

impl Extent {
    fn of(resp: &Response) -> Self {
        resp.headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map_or(Extent::Complete, Extent::parse)
    }

    fn parse(range: &str) -> Self {
        match range.rsplit_once('/').map(|(_, total)| total.trim()) {
            Some("*") => Extent::Open,
            Some(total) => total.parse().map_or(Extent::Complete, Extent::Total),
            None => Extent::Complete,
        }
    }

    fn has_more(self, read: usize, page_len: usize) -> bool {
        match self {
            Extent::Complete => false,
            Extent::Open => page_len > 0,
            Extent::Total(n) => page_len > 0 && read < n,
        }
    }
}

/// Query-string pairs in PostgREST syntax.
pub(crate) fn query_pairs(query: &Query) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_owned(), "*".to_owned())];
    for f in &query.filters {
        match f {
            Filter::AnyOf(groups) => {
                let inner: Vec<String> = groups.iter().map(|g| conjunction(g)).collect();
                pairs.push(("or".to_owned(), format!("({})", inner.join(","))));
            }
            other => {
                if let Some(pair) = other.operator() {
                    pairs.push(pair);
                }
            }
        }
    }
    if let Some(order) = &query.order {
        let dir = if order.ascending { "asc" } else { "desc" };
        pairs.push(("order".to_owned(), format!("{}.{dir}", order.column)));
    }
    if let Some(n) = query.limit {
        pairs.push(("limit".to_owned(), n.to_string()));
    }
    if let Some(n) = query.offset {
        pairs.push(("offset".to_owned(), n.to_string()));
    }
    pairs
}

#[async_trait]
impl Store for RestStore {
    /// Without a limit, reads page after page until the server reports the
    /// result exhausted, since PostgREST caps each response at `max-rows`.
    async fn fetch(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        if query.limit.is_some() {
            return self.fetch_page(table, query).await.map(|(rows, _)| rows);
        }
        let start = query.offset.unwrap_or(0);
        let mut rows = Vec::new();
        loop {
            let page = Query {
                offset: Some(start + rows.len()).filter(|&n| n > 0),
                ..query.clone()
            };
            let (batch, extent) = self.fetch_page(table, &page).await?;
            let page_len = batch.len();
            rows.extend(batch);
            if !extent.has_more(start + rows.len(), page_len) {
                break;
            }
            tracing::trace!(table, read = rows.len(), ?extent, "fetching next page");
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let resp = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StoreError::write(table, "<new>", e))?;
        let mut saved = resp
            .json::<Vec<Row>>()
            .await
            .map_err(|e| StoreError::write(table, "<new>", e))?;
        if saved.is_empty() {
            return Err(StoreError::write(table, "<new>", "insert returned no rows"));
        }
        Ok(saved.swap_remove(0))
    }

    async fn update_by_id(&self, table: &str, id: &RowId, fields: Row) -> Result<(), StoreError> {
        self.client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(&fields)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StoreError::write(table, id, e))?;
        tracing::trace!(table, %id, "row updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::MessageRow;

    #[test]
    fn renders_postgrest_pairs() {
        let q = Query::new()
            .filter(Filter::eq("receiver_id", "u2"))
            .filter(Filter::is("is_read", false))
            .order_asc("created_at")
            .limit(100);
        let pairs = query_pairs(&q);
        let expect = [
            ("select", "*"),
            ("receiver_id", "eq.u2"),
            ("is_read", "is.false"),
            ("order", "created_at.asc"),
            ("limit", "100"),
        ];
        let got: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(got, expect);
    }

    #[test]
    fn offset_follows_limit() {
        let pairs = query_pairs(&Query::new().order_asc("id").offset(2000));
        assert_eq!(pairs.last(), Some(&("offset".to_owned(), "2000".to_owned())));
    }

    #[test]
    fn content_range_extents() {
        assert_eq!(Extent::parse("0-999/2500"), Extent::Total(2500));
        assert_eq!(Extent::parse("*/0"), Extent::Total(0));
        assert_eq!(Extent::parse("0-999/*"), Extent::Open);
        assert_eq!(Extent::parse("garbage"), Extent::Complete);

        assert!(Extent::Total(2500).has_more(1000, 1000));
        assert!(!Extent::Total(2500).has_more(2500, 500));
        assert!(!Extent::Total(2500).has_more(1000, 0));
        assert!(Extent::Open.has_more(1000, 1000));
        assert!(!Extent::Open.has_more(1000, 0));
        assert!(!Extent::Complete.has_more(1, 1));
    }

    #[test]
    fn renders_conversation_or_group() {
        let q = Query::new().filter(MessageRow::conversation_filter("a", "b"));
        let pairs = query_pairs(&q);
        assert_eq!(
            pairs[1],
            (
                "or".to_owned(),
                "(and(sender_id.eq.a,receiver_id.eq.b),and(sender_id.eq.b,receiver_id.eq.a))".to_owned()
            )
        );
    }
}
