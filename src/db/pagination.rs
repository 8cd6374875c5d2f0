//! Shared list-endpoint pagination contract (§4.2, §8 boundary behaviors).

use serde::{Deserialize, Serialize};

const MAX_LIMIT: i64 = 100;
const DEFAULT_LIMIT: i64 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<Order>,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort: None,
            order: None,
        }
    }
}

impl Pagination {
    /// Clamps `limit` to `[1, 100]` and `offset` to `>= 0`, per spec's
    /// `limit<=100` contract. Never panics on adversarial input.
    pub fn normalized(&self) -> (i64, i64) {
        let limit = self.limit.clamp(1, MAX_LIMIT);
        let offset = self.offset.max(0);
        (limit, offset)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, limit: i64, offset: i64, total: i64) -> Self {
        let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        let page = if limit == 0 { 1 } else { offset / limit + 1 };
        Self {
            data,
            pagination: PageInfo {
                page,
                limit,
                total,
                total_pages,
                has_next: offset + limit < total,
                has_prev: offset > 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_limit_to_max() {
        let p = Pagination {
            limit: 1000,
            offset: 0,
            sort: None,
            order: None,
        };
        assert_eq!(p.normalized(), (100, 0));
    }

    #[test]
    fn rejects_negative_offset() {
        let p = Pagination {
            limit: 10,
            offset: -5,
            sort: None,
            order: None,
        };
        assert_eq!(p.normalized(), (10, 0));
    }

    #[test]
    fn empty_page_has_no_next_or_prev() {
        let page: Page<i32> = Page::new(vec![], 20, 0, 0);
        assert!(!page.pagination.has_next);
        assert!(!page.pagination.has_prev);
        assert_eq!(page.pagination.total, 0);
    }

    #[test]
    fn offset_past_total_is_empty_but_consistent() {
        let page: Page<i32> = Page::new(vec![], 20, 1000, 5);
        assert_eq!(page.pagination.total, 5);
        assert!(!page.pagination.has_next);
        assert!(page.pagination.has_prev);
    }

    proptest::proptest! {
        #[test]
        fn total_across_pages_matches(total in 0i64..500, limit in 1i64..=100) {
            let mut seen = 0i64;
            let mut offset = 0i64;
            loop {
                let take = limit.min(total - offset).max(0);
                let page: Page<i32> = Page::new(vec![0; take as usize], limit, offset, total);
                seen += page.data.len() as i64;
                if !page.pagination.has_next {
                    break;
                }
                offset += limit;
            }
            proptest::prop_assert_eq!(seen, total);
        }
    }
}
