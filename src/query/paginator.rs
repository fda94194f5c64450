//! Result Paginator
//!
//! Slices a finished [`ResultTable`] into pages bounded by row count and
//! serialized size. Each non-final page carries a continuation token of the
//! form `{offset}-{mac}`, where `mac` is the first 16 bytes (hex) of
//! `SHA-256(server_secret ‖ query_id ‖ page_key ‖ offset)`. Tokens are only
//! valid for the query that issued them and die with it.

use std::fmt::Write;

use sha2::{Digest, Sha256};

use super::{QueryId, QueryState};
use crate::protocol::wire::{Page, ResultTable, Row};

pub const DEFAULT_MAX_ROWS: usize = 1000;
pub const DEFAULT_MAX_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    /// The query has no result to page through (unknown, removed or unfinished)
    #[error("Query not found: {0}")]
    NotFound(QueryId),

    /// Token is malformed, forged, or belongs to another query
    #[error("Continuation token is invalid or expired")]
    Expired,
}

/// Page slicer. Cheap to clone; the secret is fixed for the process lifetime.
#[derive(Clone)]
pub struct Paginator {
    /// Maximum rows per page (0 = unlimited)
    max_rows: usize,
    /// Soft limit on serialized row bytes per page (0 = unlimited)
    max_bytes: usize,
    secret: [u8; 32],
}

impl Paginator {
    pub fn new(max_rows: usize, max_bytes: usize) -> Self {
        Self {
            max_rows,
            max_bytes,
            secret: rand::random(),
        }
    }

    /// First page of a finished query.
    pub fn first_page(&self, state: &QueryState) -> Result<Page, PageError> {
        let table = state.result.as_deref().ok_or(PageError::NotFound(state.id))?;
        Ok(self.page_at(state, table, 0))
    }

    /// Page addressed by a continuation token previously issued for `state`.
    pub fn next_page(&self, state: &QueryState, token: &str) -> Result<Page, PageError> {
        let table = state.result.as_deref().ok_or(PageError::NotFound(state.id))?;
        let offset = self.verify(state, token)?;
        if offset >= table.row_count() {
            return Err(PageError::Expired);
        }
        Ok(self.page_at(state, table, offset))
    }

    fn page_at(&self, state: &QueryState, table: &ResultTable, offset: usize) -> Page {
        let end = self.page_end(&table.rows, offset);
        let next_token = (end < table.row_count()).then(|| self.sign(state, end));
        Page {
            columns: table.columns.clone(),
            rows: table.rows[offset..end].to_vec(),
            next_token,
        }
    }

    /// Exclusive end of the page starting at `offset`. Always advances by at
    /// least one row when rows remain.
    fn page_end(&self, rows: &[Row], offset: usize) -> usize {
        let mut end = offset;
        let mut bytes = 0usize;
        for row in &rows[offset..] {
            let taken = end - offset;
            if self.max_rows > 0 && taken >= self.max_rows {
                break;
            }
            let size = row_size(row);
            if self.max_bytes > 0 && taken > 0 && bytes + size > self.max_bytes {
                break;
            }
            bytes += size;
            end += 1;
        }
        end
    }

    fn sign(&self, state: &QueryState, offset: usize) -> String {
        format!("{offset}-{}", self.mac(state, offset))
    }

    fn verify(&self, state: &QueryState, token: &str) -> Result<usize, PageError> {
        let (offset, mac) = token.split_once('-').ok_or(PageError::Expired)?;
        let offset: usize = offset.parse().map_err(|_| PageError::Expired)?;
        if mac != self.mac(state, offset) {
            return Err(PageError::Expired);
        }
        Ok(offset)
    }

    fn mac(&self, state: &QueryState, offset: usize) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update(state.id.as_bytes());
        hasher.update(state.page_key);
        hasher.update((offset as u64).to_be_bytes());
        let digest = hasher.finalize();

        let mut hex = String::with_capacity(32);
        for b in &digest[..16] {
            let _ = write!(hex, "{b:02x}");
        }
        hex
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROWS, DEFAULT_MAX_BYTES)
    }
}

fn row_size(row: &Row) -> usize {
    serde_json::to_vec(row).map(|v| v.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Transition;
    use crate::value::SqlType;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn finished_state(rows: Vec<Row>) -> QueryState {
        let mut state = QueryState::new(Uuid::new_v4(), "SELECT n FROM t");
        let table = ResultTable::new(vec![SqlType::BigInt.column("n")], rows);
        state.apply(Transition::Finished(table)).unwrap();
        state
    }

    fn numbered(n: usize) -> Vec<Row> {
        (0..n).map(|i| vec![json!(i)]).collect()
    }

    /// Walk every page, returning the concatenated rows and the page count.
    fn collect_all(paginator: &Paginator, state: &QueryState) -> (Vec<Row>, usize) {
        let mut page = paginator.first_page(state).unwrap();
        let mut rows = page.rows.clone();
        let mut pages = 1;
        while let Some(token) = page.next_token.clone() {
            page = paginator.next_page(state, &token).unwrap();
            assert_eq!(page.columns, state.result.as_ref().unwrap().columns);
            rows.extend(page.rows.iter().cloned());
            pages += 1;
        }
        (rows, pages)
    }

    #[test]
    fn test_small_result_is_single_page() {
        let paginator = Paginator::default();
        let state = finished_state(numbered(3));
        let page = paginator.first_page(&state).unwrap();
        assert_eq!(page.rows.len(), 3);
        assert!(page.is_last());
    }

    #[test]
    fn test_empty_result_is_one_empty_page() {
        let paginator = Paginator::new(10, 0);
        let state = finished_state(vec![]);
        let page = paginator.first_page(&state).unwrap();
        assert!(page.rows.is_empty());
        assert!(page.next_token.is_none());
        assert_eq!(page.columns.len(), 1);
        assert_eq!(page.columns[0].name, "n");
    }

    #[test]
    fn test_row_limit_splits_pages() {
        let paginator = Paginator::new(2, 0);
        let state = finished_state(numbered(5));
        let (rows, pages) = collect_all(&paginator, &state);
        assert_eq!(rows, numbered(5));
        assert_eq!(pages, 3);
    }

    #[test]
    fn test_byte_limit_always_takes_one_row() {
        let paginator = Paginator::new(0, 1);
        let state = finished_state(numbered(4));
        let first = paginator.first_page(&state).unwrap();
        assert_eq!(first.rows.len(), 1);
        let (rows, pages) = collect_all(&paginator, &state);
        assert_eq!(rows.len(), 4);
        assert_eq!(pages, 4);
    }

    #[test]
    fn test_byte_limit_packs_rows() {
        // Each `[i]` row with a single digit serializes to 3 bytes.
        let paginator = Paginator::new(0, 6);
        let state = finished_state(numbered(5));
        let first = paginator.first_page(&state).unwrap();
        assert_eq!(first.rows.len(), 2);
    }

    #[test]
    fn test_token_from_other_query_is_rejected() {
        let paginator = Paginator::new(1, 0);
        let a = finished_state(numbered(3));
        let b = finished_state(numbered(3));
        let token = paginator.first_page(&a).unwrap().next_token.unwrap();
        assert_eq!(paginator.next_page(&b, &token).unwrap_err(), PageError::Expired);
    }

    #[test]
    fn test_token_from_other_server_is_rejected() {
        let state = finished_state(numbered(3));
        let token = Paginator::new(1, 0)
            .first_page(&state)
            .unwrap()
            .next_token
            .unwrap();
        assert_eq!(
            Paginator::new(1, 0).next_page(&state, &token).unwrap_err(),
            PageError::Expired
        );
    }

    #[test]
    fn test_forged_token_is_rejected() {
        let paginator = Paginator::new(1, 0);
        let state = finished_state(numbered(3));
        let token = paginator.first_page(&state).unwrap().next_token.unwrap();
        let (_, mac) = token.split_once('-').unwrap();

        for forged in [format!("2-{mac}"), "garbage".to_string(), "1-".to_string(), String::new()] {
            assert_eq!(
                paginator.next_page(&state, &forged).unwrap_err(),
                PageError::Expired,
                "{forged}"
            );
        }
    }

    #[test]
    fn test_unfinished_query_has_no_pages() {
        let paginator = Paginator::default();
        let state = QueryState::new(Uuid::new_v4(), "SELECT 1");
        assert_eq!(
            paginator.first_page(&state).unwrap_err(),
            PageError::NotFound(state.id)
        );
    }

    #[test]
    fn test_token_is_reusable() {
        let paginator = Paginator::new(2, 0);
        let state = finished_state(numbered(5));
        let token = paginator.first_page(&state).unwrap().next_token.unwrap();
        let once = paginator.next_page(&state, &token).unwrap();
        let twice = paginator.next_page(&state, &token).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.rows, vec![vec![json!(2)], vec![json!(3)]]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Pages partition the rows in order for any limits.
        #[test]
        fn prop_pages_partition_rows(
            values in prop::collection::vec(any::<i64>(), 0..200),
            max_rows in 0usize..20,
            max_bytes in 0usize..200,
        ) {
            let rows: Vec<Row> = values.iter().map(|v| vec![Value::from(*v)]).collect();
            let paginator = Paginator::new(max_rows, max_bytes);
            let state = finished_state(rows.clone());

            let (collected, pages) = collect_all(&paginator, &state);
            prop_assert_eq!(collected, rows.clone());
            prop_assert!(pages >= 1);
            if max_rows > 0 && !rows.is_empty() {
                prop_assert!(pages >= rows.len().div_ceil(max_rows));
            }
        }
    }
}
