use proptest::prelude::*;
use scribe_types::{AbortHandle, PageCursor, Paged, PagingError, collect_all_pages};
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, thiserror::Error)]
#[error("fetch broke")]
struct FetchBroke;

/// Serves fixed pages in order, ignoring the cursor's content.
fn page_server(
    pages: Vec<Vec<u32>>,
) -> impl FnMut(Option<PageCursor>) -> std::future::Ready<Result<Paged<u32>, Infallible>> {
    let mut served = 0;
    move |_cursor| {
        let items = pages[served].clone();
        served += 1;
        let page = if served < pages.len() {
            Paged::with_next(items, PageCursor::new(served.to_string()))
        } else {
            Paged::last(items)
        };
        std::future::ready(Ok(page))
    }
}

// ── collect_all_pages ─────────────────────────────────────────────

#[tokio::test]
async fn collects_pages_in_order() {
    let fetch = page_server(vec![vec![1, 2], vec![3, 4], vec![5]]);
    let abort = AbortHandle::new();

    let items = collect_all_pages(fetch, &abort).await.unwrap();
    assert_eq!(items, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn single_terminal_page() {
    let fetch = page_server(vec![vec![7, 8, 9]]);
    let items = collect_all_pages(fetch, &AbortHandle::new()).await.unwrap();
    assert_eq!(items, vec![7, 8, 9]);
}

#[tokio::test]
async fn empty_terminal_page() {
    let fetch = page_server(vec![vec![]]);
    let items = collect_all_pages(fetch, &AbortHandle::new()).await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn abort_before_first_fetch() {
    let abort = AbortHandle::new();
    abort.abort();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_inner = Arc::clone(&calls);
    let fetch = move |_cursor: Option<PageCursor>| {
        calls_inner.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok::<_, Infallible>(Paged::last(vec![1u32])))
    };

    let result = collect_all_pages(fetch, &abort).await;
    assert!(matches!(result, Err(PagingError::Aborted)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn abort_mid_pagination_never_yields_partial() {
    let abort = AbortHandle::new();
    let abort_inner = abort.clone();
    let mut served = 0;

    let fetch = move |_cursor: Option<PageCursor>| {
        served += 1;
        // first page succeeds, then the caller aborts
        if served == 1 {
            abort_inner.abort();
            std::future::ready(Ok::<_, Infallible>(Paged::with_next(
                vec![1u32, 2],
                PageCursor::new("next"),
            )))
        } else {
            std::future::ready(Ok(Paged::last(vec![3])))
        }
    };

    let result = collect_all_pages(fetch, &abort).await;
    assert!(matches!(result, Err(PagingError::Aborted)));
}

#[tokio::test]
async fn fetch_error_propagates() {
    let fetch = |_cursor: Option<PageCursor>| {
        std::future::ready(Err::<Paged<u32>, FetchBroke>(FetchBroke))
    };

    let result = collect_all_pages(fetch, &AbortHandle::new()).await;
    assert!(matches!(result, Err(PagingError::Fetch(FetchBroke))));
}

#[tokio::test]
async fn cursor_is_threaded_between_pages() {
    let mut seen = Vec::new();
    let mut served = 0;
    let fetch = move |cursor: Option<PageCursor>| {
        seen.push(cursor.map(|c| c.as_str().to_string()));
        served += 1;
        let page = if served == 1 {
            Paged::with_next(vec![served], PageCursor::new("p2"))
        } else {
            Paged::last(vec![served])
        };
        // assert inside the closure: first call has no cursor, second has "p2"
        if served == 2 {
            assert_eq!(seen, vec![None, Some("p2".to_string())]);
        }
        std::future::ready(Ok::<_, Infallible>(page))
    };

    let items = collect_all_pages(fetch, &AbortHandle::new()).await.unwrap();
    assert_eq!(items, vec![1, 2]);
}

// ── AbortHandle ───────────────────────────────────────────────────

#[test]
fn abort_handle_clones_share_state() {
    let a = AbortHandle::new();
    let b = a.clone();
    assert!(!b.is_aborted());
    a.abort();
    assert!(b.is_aborted());
}

#[test]
fn abort_is_idempotent() {
    let handle = AbortHandle::new();
    handle.abort();
    handle.abort();
    assert!(handle.is_aborted());
}

// ── Property: chunking never changes the collected sequence ──────

proptest! {
    #[test]
    fn concatenation_is_chunking_invariant(
        items in proptest::collection::vec(any::<u32>(), 0..64),
        chunk in 1usize..8,
    ) {
        let pages: Vec<Vec<u32>> = if items.is_empty() {
            vec![vec![]]
        } else {
            items.chunks(chunk).map(<[u32]>::to_vec).collect()
        };

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let collected = rt
            .block_on(collect_all_pages(page_server(pages), &AbortHandle::new()))
            .unwrap();

        prop_assert_eq!(collected, items);
    }
}
