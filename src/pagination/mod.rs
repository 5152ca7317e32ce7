//! Link-header pagination.

use crate::client::{CallOptions, Connection};
use crate::errors::{TargetProcessError, TargetProcessResult};
use crate::observability::TracingHooks;
use crate::serialization::Expect;
use crate::types::Request;
use futures::stream::{self, Stream, TryStreamExt};
use reqwest::header::{HeaderMap, LINK};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use url::Url;

/// Pagination links parsed from the `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationLinks {
    /// URL for the next page.
    pub next: Option<String>,
    /// URL for the previous page.
    pub prev: Option<String>,
    /// URL for the first page.
    pub first: Option<String>,
    /// URL for the last page.
    pub last: Option<String>,
    /// Any other relations, by name.
    pub other: BTreeMap<String, String>,
}

impl PaginationLinks {
    /// Parses a `Link` header value (RFC 8288).
    ///
    /// Malformed entries are skipped. Commas inside `<...>` do not split
    /// entries, and a `rel` may list several space-separated names.
    pub fn from_header(header_value: &str) -> Self {
        let mut links = Self::default();
        let mut rest = header_value;

        while let Some(open) = rest.find('<') {
            let after_open = &rest[open + 1..];
            let Some(close) = after_open.find('>') else {
                break;
            };
            let url = after_open[..close].trim();
            let after_url = &after_open[close + 1..];

            let params_end = after_url.find('<').unwrap_or(after_url.len());
            let params = &after_url[..params_end];
            rest = &after_url[params_end..];

            if url.is_empty() {
                continue;
            }

            for segment in params.split(|c| c == ';' || c == ',') {
                let Some((key, value)) = segment.split_once('=') else {
                    continue;
                };
                if !key.trim().eq_ignore_ascii_case("rel") {
                    continue;
                }
                for rel in value.trim().trim_matches('"').split_whitespace() {
                    links.insert(&rel.to_ascii_lowercase(), url);
                }
            }
        }

        links
    }

    fn insert(&mut self, rel: &str, url: &str) {
        let url = url.to_string();
        match rel {
            "next" => self.next = Some(url),
            "prev" | "previous" => self.prev = Some(url),
            "first" => self.first = Some(url),
            "last" => self.last = Some(url),
            other => {
                self.other.insert(other.to_string(), url);
            }
        }
    }

    /// Parses pagination links from response headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(Self::from_header)
            .unwrap_or_default()
    }

    /// Returns true if there is a next page.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Returns true if there is a previous page.
    pub fn has_prev(&self) -> bool {
        self.prev.is_some()
    }

    /// Gets the total page count from the `page` parameter of the last link.
    pub fn total_pages(&self) -> Option<u32> {
        self.last.as_deref().and_then(extract_page_number)
    }
}

/// Extracts the `page` query parameter from a URL.
pub fn extract_page_number(url: &str) -> Option<u32> {
    Url::parse(url).ok().and_then(|u| {
        u.query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
    })
}

/// A single page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// The items in this page.
    pub items: Vec<T>,
    /// Pagination links.
    pub links: PaginationLinks,
    /// URL the page was fetched from.
    pub url: String,
}

impl<T> Page<T> {
    /// Creates a new page.
    pub fn new(items: Vec<T>, links: PaginationLinks, url: impl Into<String>) -> Self {
        Self {
            items,
            links,
            url: url.into(),
        }
    }

    /// Returns true if there is a next page.
    pub fn has_next(&self) -> bool {
        self.links.has_next()
    }

    /// Returns the URL for the next page.
    pub fn next_url(&self) -> Option<&str> {
        self.links.next.as_deref()
    }

    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the page is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consumes the page and returns the items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Where a pagination run stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginatorState {
    /// The page at this URL is still to be fetched.
    HasMore(String),
    /// No more pages, or the item limit was reached.
    Exhausted,
    /// A call failed or the API sent a page URL twice.
    Errored,
}

/// Follows `next` links until the last page.
///
/// Each page is fetched only when asked for; a visited URL is never fetched
/// twice.
pub struct Paginator<T> {
    connection: Arc<Connection>,
    template: Request,
    options: CallOptions,
    state: PaginatorState,
    visited: HashSet<String>,
    max_items: Option<usize>,
    yielded: usize,
    calls: usize,
    repeated_url: Option<String>,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Paginator<T> {
    /// Creates a paginator starting at the request's URL.
    pub fn new(
        connection: Arc<Connection>,
        request: Request,
        options: CallOptions,
    ) -> TargetProcessResult<Self> {
        let start = request.url()?;
        let mut visited = HashSet::new();
        visited.insert(start.to_string());

        Ok(Self {
            connection,
            template: request,
            options,
            state: PaginatorState::HasMore(start.to_string()),
            visited,
            max_items: None,
            yielded: 0,
            calls: 0,
            repeated_url: None,
            _item: PhantomData,
        })
    }

    /// Stops once this many items have been produced.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        if max_items == 0 {
            self.state = PaginatorState::Exhausted;
        }
        self
    }

    /// Gets the current state.
    pub fn state(&self) -> &PaginatorState {
        &self.state
    }

    /// Gets the number of pages requested so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Returns true if another page may follow.
    pub fn has_more(&self) -> bool {
        matches!(self.state, PaginatorState::HasMore(_))
    }

    /// Fetches the next page. Returns `Ok(None)` once exhausted.
    ///
    /// After a failure, or once a `next` link repeats an earlier page, every
    /// further call fails with a protocol error.
    pub async fn next_page(&mut self) -> TargetProcessResult<Option<Page<T>>> {
        let url = match &self.state {
            PaginatorState::HasMore(url) => url.clone(),
            PaginatorState::Exhausted => return Ok(None),
            PaginatorState::Errored => {
                return Err(match &self.repeated_url {
                    Some(repeated) => TargetProcessError::protocol(format!(
                        "Pagination loop: next link {} was already visited",
                        repeated
                    )),
                    None => TargetProcessError::protocol("Pagination stopped after an earlier failure"),
                })
            }
        };

        let request = Request {
            endpoint: url.clone(),
            ..self.template.clone()
        };

        self.calls += 1;
        let response = match self
            .connection
            .execute::<Vec<T>>(request, Expect::Collection, &self.options)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.state = PaginatorState::Errored;
                return Err(e);
            }
        };

        let links = response.api_info().links.clone();
        let mut items = response.body.unwrap_or_default();

        let limit_reached = match self.max_items {
            Some(max) => {
                items.truncate(max.saturating_sub(self.yielded));
                self.yielded += items.len();
                self.yielded >= max
            }
            None => {
                self.yielded += items.len();
                false
            }
        };

        self.state = match links.next.as_deref() {
            _ if limit_reached => PaginatorState::Exhausted,
            None => PaginatorState::Exhausted,
            Some(next) => self.advance(&url, next),
        };

        Ok(Some(Page::new(items, links, url)))
    }

    fn advance(&mut self, current: &str, next: &str) -> PaginatorState {
        let resolved = match Url::parse(current).and_then(|base| base.join(next)) {
            Ok(url) => url.to_string(),
            Err(_) => next.to_string(),
        };

        if self.visited.insert(resolved.clone()) {
            PaginatorState::HasMore(resolved)
        } else {
            self.connection.metrics().record_pagination_loop();
            TracingHooks::on_pagination_loop(&resolved, self.calls);
            self.repeated_url = Some(resolved);
            PaginatorState::Errored
        }
    }

    /// Collects all items from all pages.
    ///
    /// Fails without partial results if any page fails or the links loop.
    pub async fn collect_all(mut self) -> TargetProcessResult<Vec<T>> {
        let mut all_items = Vec::new();

        while let Some(page) = self.next_page().await? {
            all_items.extend(page.into_items());
        }

        Ok(all_items)
    }

    /// Streams items lazily, fetching a page only when its items are needed.
    ///
    /// Items already yielded stay with the consumer when a later page fails.
    pub fn into_stream(self) -> impl Stream<Item = TargetProcessResult<T>> {
        stream::try_unfold(self, |mut paginator| async move {
            let next = paginator.next_page().await?.map(|page| {
                let items = stream::iter(page.into_items().into_iter().map(Ok));
                (items, paginator)
            });
            Ok::<_, TargetProcessError>(next)
        })
        .try_flatten()
    }
}

impl<T> std::fmt::Debug for Paginator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("state", &self.state)
            .field("calls", &self.calls)
            .field("max_items", &self.max_items)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_link_header() {
        let header = r#"<https://tp.example.com/api/v1/Bugs?skip=25&take=25>; rel="next", <https://tp.example.com/api/v1/Bugs?skip=100&take=25>; rel="last""#;
        let links = PaginationLinks::from_header(header);

        assert_eq!(
            links.next.as_deref(),
            Some("https://tp.example.com/api/v1/Bugs?skip=25&take=25")
        );
        assert_eq!(
            links.last.as_deref(),
            Some("https://tp.example.com/api/v1/Bugs?skip=100&take=25")
        );
        assert!(links.prev.is_none());
        assert!(links.first.is_none());
    }

    #[test]
    fn test_parse_full_link_header() {
        let header = r#"<https://api.example.com/repos?page=1>; rel="first", <https://api.example.com/repos?page=2>; rel="prev", <https://api.example.com/repos?page=4>; rel="next", <https://api.example.com/repos?page=5>; rel="last""#;
        let links = PaginationLinks::from_header(header);

        assert!(links.first.is_some());
        assert!(links.has_prev());
        assert!(links.has_next());
        assert_eq!(links.total_pages(), Some(5));
    }

    #[test]
    fn test_parse_tolerates_odd_formatting() {
        let header = "<https://x.example.com/a?where=(Id%20in%20(1,2))>;rel=next ,<https://x.example.com/s>; title=\"x\"; rel=\"self alternate\", garbage, <>; rel=\"last\"";
        let links = PaginationLinks::from_header(header);

        assert_eq!(
            links.next.as_deref(),
            Some("https://x.example.com/a?where=(Id%20in%20(1,2))")
        );
        assert_eq!(links.other.get("self").map(String::as_str), Some("https://x.example.com/s"));
        assert_eq!(
            links.other.get("alternate").map(String::as_str),
            Some("https://x.example.com/s")
        );
        assert!(links.last.is_none());
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(PaginationLinks::from_header(""), PaginationLinks::default());
        assert_eq!(
            PaginationLinks::from_header("<https://x.example.com/unterminated; rel=\"next\""),
            PaginationLinks::default()
        );
        assert_eq!(
            PaginationLinks::from_header("<https://x.example.com/norel>"),
            PaginationLinks::default()
        );
    }

    #[test]
    fn test_from_headers_without_link() {
        assert!(!PaginationLinks::from_headers(&HeaderMap::new()).has_next());
    }

    #[test]
    fn test_page_operations() {
        let page: Page<i32> = Page::new(vec![1, 2, 3], PaginationLinks::default(), "https://x/1");

        assert_eq!(page.len(), 3);
        assert!(!page.is_empty());
        assert!(!page.has_next());
        assert_eq!(page.into_iter().sum::<i32>(), 6);
    }
}
