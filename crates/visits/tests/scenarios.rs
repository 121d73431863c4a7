//! End-to-end browsing scenarios driven through the observer

use std::sync::Arc;
use std::time::Duration;
use url::Url;

use visits::{
    ContextKind, CookieOperation, CookieTarget, DocumentInfo, FrameContext, FrameId,
    ManualClock, NavigationCommit, NavigationId, ObservedPage, ObserverConfig, ObserverHandle,
    PageEvent, PageId, PageTransition, PageVisitObserver, ResolveTarget, SequentialSourceIds,
    SourceId, SourceIdResolver, StorageKind, Visit,
};

const MAIN_FRAME: FrameId = FrameId(1);
const WAIT: Duration = Duration::from_secs(5);

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// Scripted tab: hands out ids and remembers the current document
struct Tab {
    document: Option<DocumentInfo>,
    next_id: u64,
}

impl ObservedPage for Tab {
    fn is_alive(&self) -> bool {
        true
    }

    fn committed_document(&self) -> Option<DocumentInfo> {
        self.document.clone()
    }
}

impl Tab {
    fn blank() -> Self {
        Self {
            document: None,
            next_id: 0,
        }
    }

    fn fresh(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Top-level frame of the current document
    fn main_frame(&self) -> FrameContext {
        let page = self.document.as_ref().map_or(PageId(0), |doc| doc.page);
        FrameContext::top_level(MAIN_FRAME, page)
    }

    fn iframe(&self, id: u64) -> FrameContext {
        self.main_frame().child(FrameId(id), ContextKind::Iframe)
    }

    /// A cross-document navigation that has started but not committed
    fn begin(&mut self, to: &str) -> NavigationCommit {
        let navigation = NavigationId(self.fresh());
        let page = PageId(self.fresh());
        NavigationCommit::new(navigation, FrameContext::top_level(MAIN_FRAME, page), url(to))
    }

    fn committed(&mut self, commit: &NavigationCommit) {
        self.document = Some(DocumentInfo {
            page: commit.frame.page,
            url: commit.url.clone(),
            navigation: Some(commit.navigation),
        });
    }
}

struct Session {
    tab: Tab,
    handle: ObserverHandle,
    ids: Arc<SequentialSourceIds>,
    clock: Arc<ManualClock>,
}

impl Session {
    fn attach(tab: Tab) -> Self {
        let ids = Arc::new(SequentialSourceIds::new());
        Self::attach_with(tab, ids.clone(), ids)
    }

    fn attach_with(
        tab: Tab,
        ids: Arc<SequentialSourceIds>,
        resolver: Arc<dyn SourceIdResolver>,
    ) -> Self {
        let clock = Arc::new(ManualClock::default());
        let handle = PageVisitObserver::attach_with_clock(
            &tab,
            resolver,
            ObserverConfig::default(),
            clock.clone(),
        )
        .unwrap();
        Self {
            tab,
            handle,
            ids,
            clock,
        }
    }

    async fn send(&self, event: PageEvent) {
        self.handle.send(event).await.unwrap();
    }

    async fn commit(&mut self, commit: NavigationCommit) {
        self.tab.committed(&commit);
        self.send(commit.into()).await;
    }

    async fn navigate(&mut self, to: &str) {
        let commit = self.tab.begin(to);
        self.commit(commit).await;
    }

    async fn redirect(&self, commit: &NavigationCommit, via: &str, set_cookie: bool) {
        self.send(PageEvent::ServerRedirect {
            navigation: commit.navigation,
            frame: commit.frame.clone(),
            url: url(via),
            set_cookie_present: set_cookie,
        })
        .await;
    }

    async fn visits(&self, expected: usize) -> Vec<Visit> {
        self.handle.flush().await.unwrap();
        let visits = self.handle.wait_for_visits(expected, WAIT).await.unwrap();
        assert_eq!(visits.len(), expected);
        visits
    }
}

fn urls(visits: &[Visit]) -> Vec<(Option<Url>, Url)> {
    visits
        .iter()
        .map(|v| (v.prev_page.url.clone(), v.url.clone()))
        .collect()
}

#[tokio::test]
async fn test_attach_before_first_navigation() {
    let mut session = Session::attach(Tab::blank());
    session.navigate("https://a.test/title1.html").await;
    let a = session.tab.document.clone().unwrap();
    session.navigate("https://b.test/title1.html").await;
    session.navigate("https://c.test/title1.html").await;

    let visits = session.visits(3).await;
    assert_eq!(
        urls(&visits),
        vec![
            (None, url("https://a.test/title1.html")),
            (
                Some(url("https://a.test/title1.html")),
                url("https://b.test/title1.html")
            ),
            (
                Some(url("https://b.test/title1.html")),
                url("https://c.test/title1.html")
            ),
        ]
    );
    assert_eq!(visits[0].prev_page.source_id, SourceId::BLANK);
    assert_eq!(
        Some(visits[1].prev_page.source_id),
        session.ids.document_id(a.page, &a.url)
    );
}

#[tokio::test]
async fn test_attach_while_on_a_page() {
    let mut tab = Tab::blank();
    let first = tab.begin("https://a.test/title1.html");
    tab.committed(&first);
    let a = tab.document.clone().unwrap();

    let mut session = Session::attach(tab);
    session.navigate("https://b.test/title1.html").await;
    session.navigate("https://c.test/title1.html").await;

    let visits = session.visits(2).await;
    assert_eq!(visits[0].prev_page.url, Some(a.url.clone()));
    assert_eq!(visits[0].url, url("https://b.test/title1.html"));
    assert_eq!(visits[1].url, url("https://c.test/title1.html"));

    let resolved = session.ids.document_id(a.page, &a.url).unwrap();
    assert!(!resolved.is_sentinel());
    assert_eq!(visits[0].prev_page.source_id, resolved);
}

#[tokio::test]
async fn test_same_document_navigation() {
    let mut session = Session::attach(Tab::blank());
    session.navigate("https://a.test/fragment.html").await;
    let fragment = NavigationCommit::new(
        NavigationId(session.tab.fresh()),
        session.tab.main_frame(),
        url("https://a.test/fragment.html#fragment"),
    )
    .same_document();
    session.send(fragment.into()).await;
    session.navigate("https://b.test/fragment.html#fragment").await;

    let visits = session.visits(2).await;
    assert_eq!(visits[0].url, url("https://a.test/fragment.html"));
    assert_eq!(visits[1].prev_page.url, Some(url("https://a.test/fragment.html")));
    assert!(visits.iter().all(|v| v.navigation.server_redirects.is_empty()));
}

#[tokio::test]
async fn test_server_redirects() {
    let mut session = Session::attach(Tab::blank());
    session.navigate("https://a.test/title1.html").await;

    let commit = session.tab.begin("https://c.test/title1.html");
    session
        .redirect(&commit, "https://b.test/server-redirect-with-cookie", true)
        .await;
    session
        .redirect(&commit, "https://b.test/cross-site-redirect", false)
        .await;
    let navigation = commit.navigation;
    session.commit(commit).await;

    let visits = session.visits(2).await;
    let redirects = &visits[1].navigation.server_redirects;
    assert_eq!(redirects.len(), 2);
    assert_eq!(redirects[0].url, url("https://b.test/server-redirect-with-cookie"));
    assert!(redirects[0].did_write_cookies);
    assert_eq!(redirects[1].url, url("https://b.test/cross-site-redirect"));
    assert!(!redirects[1].did_write_cookies);

    for (index, hop) in redirects.iter().enumerate() {
        let target = ResolveTarget::RedirectHop {
            navigation,
            index,
            url: hop.url.clone(),
        };
        assert_eq!(session.ids.lookup(&target), Some(hop.source_id));
    }
    assert!(visits[0].navigation.server_redirects.is_empty());
}

#[tokio::test]
async fn test_iframe_redirects_do_not_count() {
    let mut session = Session::attach(Tab::blank());
    session.navigate("https://a.test/page_with_blank_iframe.html").await;

    let iframe = session.tab.iframe(50);
    let navigation = NavigationId(session.tab.fresh());
    session
        .send(PageEvent::ServerRedirect {
            navigation,
            frame: iframe.clone(),
            url: url("https://b.test/server-redirect"),
            set_cookie_present: true,
        })
        .await;
    session
        .send(
            NavigationCommit::new(navigation, iframe, url("https://c.test/title1.html"))
                .with_transition(PageTransition::ManualSubframe)
                .into(),
        )
        .await;
    session.navigate("https://d.test/title1.html").await;

    let visits = session.visits(2).await;
    assert!(visits.iter().all(|v| v.navigation.server_redirects.is_empty()));
    assert!(!visits[1].prev_page.had_qualifying_storage_access);
}

#[tokio::test]
async fn test_client_redirects() {
    let mut session = Session::attach(Tab::blank());
    session.navigate("https://a.test/title1.html").await;
    let meta_refresh = session
        .tab
        .begin("https://b.test/title1.html")
        .from_renderer(false)
        .with_transition(PageTransition::AutoToplevel);
    session.commit(meta_refresh).await;
    let script = session
        .tab
        .begin("https://c.test/title1.html")
        .from_renderer(false);
    session.commit(script).await;

    let visits = session.visits(3).await;
    assert!(visits.iter().all(|v| v.navigation.server_redirects.is_empty()));
    assert!(visits[1].navigation.was_renderer_initiated);
    assert!(!visits[1].navigation.was_user_initiated);
    assert_eq!(visits[1].navigation.page_transition, PageTransition::AutoToplevel);
}

#[tokio::test]
async fn test_document_cookie_write() {
    let mut session = Session::attach(Tab::blank());
    session.navigate("https://a.test/title1.html").await;
    session
        .send(PageEvent::CookieAccess {
            target: CookieTarget::Frame(session.tab.main_frame()),
            op: CookieOperation::Change,
        })
        .await;
    session.navigate("https://b.test/title1.html").await;
    session.navigate("https://c.test/title1.html").await;

    let visits = session.visits(3).await;
    assert!(!visits[0].prev_page.had_qualifying_storage_access);
    assert!(visits[1].prev_page.had_qualifying_storage_access);
    assert!(!visits[2].prev_page.had_qualifying_storage_access);
}

#[tokio::test]
async fn test_navigational_cookies() {
    let mut session = Session::attach(Tab::blank());
    session.navigate("https://a.test/title1.html").await;

    // Set-Cookie on the response that creates the next document
    let setter = session.tab.begin("https://a.test/set-cookie?foo=bar");
    session
        .send(PageEvent::CookieAccess {
            target: CookieTarget::Navigation {
                navigation: setter.navigation,
                frame: setter.frame.clone(),
            },
            op: CookieOperation::Change,
        })
        .await;
    session.commit(setter).await;

    // Cookie header sent with the request, read only
    let reader = session.tab.begin("https://a.test/echoheader?cookie");
    session
        .send(PageEvent::CookieAccess {
            target: CookieTarget::Navigation {
                navigation: reader.navigation,
                frame: reader.frame.clone(),
            },
            op: CookieOperation::Read,
        })
        .await;
    session.commit(reader).await;
    session.navigate("https://b.test/title1.html").await;

    let visits = session.visits(4).await;
    assert!(!visits[1].prev_page.had_qualifying_storage_access);
    assert!(visits[2].prev_page.had_qualifying_storage_access);
    assert!(!visits[3].prev_page.had_qualifying_storage_access);
}

#[tokio::test]
async fn test_storage_access_by_frame_kind() {
    let mut session = Session::attach(Tab::blank());

    session.navigate("https://a.test/title1.html").await;
    session
        .send(PageEvent::StorageAccess {
            frame: session.tab.main_frame(),
            kind: StorageKind::LocalStorage,
        })
        .await;

    session.navigate("https://b.test/page_with_iframe.html").await;
    session
        .send(PageEvent::StorageAccess {
            frame: session.tab.iframe(60),
            kind: StorageKind::IndexedDb,
        })
        .await;

    session.navigate("https://c.test/page_with_fenced_frame.html").await;
    session
        .send(PageEvent::StorageAccess {
            frame: session
                .tab
                .main_frame()
                .child(FrameId(70), ContextKind::FencedFrame),
            kind: StorageKind::SessionStorage,
        })
        .await;

    session.navigate("https://d.test/title1.html").await;
    let prerender = FrameContext::prerendering(FrameId(80), PageId(session.tab.fresh()), false);
    session
        .send(PageEvent::StorageAccess {
            frame: prerender.child(FrameId(81), ContextKind::Iframe),
            kind: StorageKind::CacheStorage,
        })
        .await;

    session.navigate("https://e.test/title1.html").await;

    let visits = session.visits(5).await;
    let flags: Vec<bool> = visits
        .iter()
        .map(|v| v.prev_page.had_qualifying_storage_access)
        .collect();
    assert_eq!(flags, vec![false, true, true, false, false]);
}

#[tokio::test]
async fn test_user_activation_and_webauthn() {
    let mut session = Session::attach(Tab::blank());
    session.navigate("https://a.test/title1.html").await;
    session
        .send(PageEvent::UserActivation {
            frame: session.tab.iframe(90),
        })
        .await;
    session.navigate("https://b.test/webauthn.html").await;
    session
        .send(PageEvent::WebAuthnResult {
            frame: session.tab.main_frame(),
            success: true,
        })
        .await;
    session.navigate("https://c.test/webauthn.html").await;
    session
        .send(PageEvent::WebAuthnResult {
            frame: session.tab.main_frame(),
            success: false,
        })
        .await;
    session.navigate("https://d.test/title1.html").await;

    let visits = session.visits(4).await;
    assert!(visits[1].prev_page.received_user_activation);
    assert!(!visits[1].prev_page.had_successful_webauthn_assertion);
    assert!(visits[2].prev_page.had_successful_webauthn_assertion);
    assert!(!visits[2].prev_page.received_user_activation);
    assert!(!visits[3].prev_page.had_successful_webauthn_assertion);
}

#[tokio::test]
async fn test_navigation_initiation() {
    let mut session = Session::attach(Tab::blank());
    session.navigate("https://a.test/title1.html").await;
    let link = session
        .tab
        .begin("https://b.test/title1.html")
        .from_renderer(true)
        .with_transition(PageTransition::Link);
    session.commit(link).await;

    let visits = session.visits(2).await;
    let browser = &visits[0].navigation;
    assert!(!browser.was_renderer_initiated);
    assert!(browser.was_user_initiated);
    assert_eq!(browser.page_transition, PageTransition::Typed);

    let clicked = &visits[1].navigation;
    assert!(clicked.was_renderer_initiated);
    assert!(clicked.was_user_initiated);
    assert_eq!(clicked.page_transition, PageTransition::Link);
}

#[tokio::test]
async fn test_visit_duration() {
    let clock_start = Duration::from_secs(3600);
    let mut session = Session::attach(Tab::blank());
    session.clock.advance(clock_start);

    // Attached at the epoch; the blank page lasts until the first commit
    session.clock.advance(Duration::from_micros(777));
    session.navigate("https://a.test/title1.html").await;
    session.visits(1).await;

    session.clock.advance(Duration::from_secs(120));
    session.navigate("https://b.test/title1.html").await;
    session.visits(2).await;

    session.clock.advance(Duration::from_millis(888));
    session.navigate("https://c.test/title1.html").await;

    let visits = session.visits(3).await;
    assert_eq!(
        visits[0].prev_page.visit_duration,
        clock_start + Duration::from_micros(777)
    );
    assert_eq!(visits[1].prev_page.visit_duration, Duration::from_secs(120));
    assert_eq!(visits[2].prev_page.visit_duration, Duration::from_millis(888));
}

#[tokio::test]
async fn test_orphaned_and_late_events_are_dropped() {
    let mut session = Session::attach(Tab::blank());
    let first = session.tab.begin("https://a.test/title1.html");
    let stale = first.clone();
    session.commit(first).await;
    let old_iframe = session.tab.iframe(40);
    session.navigate("https://b.test/title1.html").await;

    session
        .send(PageEvent::StorageAccess {
            frame: old_iframe,
            kind: StorageKind::LocalStorage,
        })
        .await;
    session
        .redirect(&stale, "https://z.test/late-redirect", true)
        .await;
    session.navigate("https://c.test/title1.html").await;

    let visits = session.visits(3).await;
    assert!(!visits[2].prev_page.had_qualifying_storage_access);
    assert!(visits[2].navigation.server_redirects.is_empty());
}

#[tokio::test]
async fn test_detach_returns_all_visits() {
    let mut session = Session::attach(Tab::blank());
    session.navigate("https://a.test/").await;
    session.navigate("https://b.test/").await;

    let Session { handle, .. } = session;
    let visits = handle.detach().await.unwrap();
    assert_eq!(visits.len(), 2);
    assert_eq!(visits[1].url, url("https://b.test/"));
}
