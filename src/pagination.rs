use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Номер и размер страницы после применения значений по умолчанию и лимитов.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn resolve(query: &PageQuery, default_size: u32, max_size: u32) -> Self {
        let max_size = max_size.max(1);
        Self {
            page: query.page.unwrap_or(1).max(1),
            page_size: query.page_size.unwrap_or(default_size).clamp(1, max_size),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    fn link(&self, path: &str, page: u32) -> String {
        let query = serde_urlencoded::to_string([("page", page), ("page_size", self.page_size)])
            .unwrap_or_default();
        format!("{}?{}", path, query)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, request: PageRequest, path: &str) -> Self {
        let seen = request.offset() + results.len() as i64;
        let next = (seen < count && !results.is_empty()).then(|| request.link(path, request.page + 1));
        let previous = (request.page > 1).then(|| request.link(path, request.page - 1));

        Self { count, next, previous, results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_caps() {
        let req = PageRequest::resolve(&PageQuery::default(), 5, 100);
        assert_eq!(req, PageRequest { page: 1, page_size: 5 });
        assert_eq!(req.offset(), 0);

        let req = PageRequest::resolve(&PageQuery { page: Some(0), page_size: Some(1000) }, 5, 100);
        assert_eq!(req, PageRequest { page: 1, page_size: 100 });

        let req = PageRequest::resolve(&PageQuery { page: Some(3), page_size: Some(0) }, 5, 100);
        assert_eq!(req, PageRequest { page: 3, page_size: 1 });
        assert_eq!(req.offset(), 2);
    }

    #[test]
    fn links_point_to_neighbouring_pages() {
        let req = PageRequest { page: 2, page_size: 5 };
        let page = Page::new(vec![1, 2, 3, 4, 5], 12, req, "/api/reservations");

        assert_eq!(page.next.as_deref(), Some("/api/reservations?page=3&page_size=5"));
        assert_eq!(page.previous.as_deref(), Some("/api/reservations?page=1&page_size=5"));
    }

    #[test]
    fn last_page_has_no_next() {
        let req = PageRequest { page: 3, page_size: 5 };
        let page = Page::new(vec![11, 12], 12, req, "/api/reservations");
        assert!(page.next.is_none());

        let first = Page::new(vec![1], 1, PageRequest { page: 1, page_size: 5 }, "/r");
        assert!(first.next.is_none());
        assert!(first.previous.is_none());
    }
}
