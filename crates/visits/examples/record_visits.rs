//! Record visits - feeds a scripted browsing session into an observer

use std::sync::Arc;
use std::time::Duration;
use url::Url;

use visits::{
    ContextKind, CookieOperation, CookieTarget, DocumentInfo, FrameContext, FrameId,
    NavigationCommit, NavigationId, ObservedPage, ObserverConfig, PageEvent, PageId,
    PageTransition, PageVisitObserver, SequentialSourceIds, StorageKind, Visit, VisitListener,
};

/// A tab that has not loaded anything yet
struct FreshTab;

impl ObservedPage for FreshTab {
    fn is_alive(&self) -> bool {
        true
    }

    fn committed_document(&self) -> Option<DocumentInfo> {
        None
    }
}

struct PrintListener;

#[async_trait::async_trait]
impl VisitListener for PrintListener {
    fn name(&self) -> &str {
        "print"
    }

    async fn on_visit(&self, visit: &Visit) {
        let from = visit
            .prev_page
            .url
            .as_ref()
            .map_or("<blank>", |url| url.as_str());
        println!("📄 {} -> {}", from, visit.url);
    }
}

fn main_frame(page: u64) -> FrameContext {
    FrameContext::top_level(FrameId(1), PageId(page))
}

fn commit(id: u64, to: &str) -> Result<NavigationCommit, url::ParseError> {
    Ok(NavigationCommit::new(NavigationId(id), main_frame(id), Url::parse(to)?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = ObserverConfig {
        id: "example-tab".to_string(),
        queue_capacity: 64,
    };
    println!("Attaching observer: {}", config.id);
    let handle = PageVisitObserver::attach(&FreshTab, Arc::new(SequentialSourceIds::new()), config)?;
    handle.register(Box::new(PrintListener)).await?;

    // Typed navigation to the first page
    handle.send(commit(1, "https://www.rust-lang.org/")?.into()).await?;
    handle
        .send(PageEvent::CookieAccess {
            target: CookieTarget::Frame(main_frame(1)),
            op: CookieOperation::Change,
        })
        .await?;
    handle
        .send(PageEvent::UserActivation {
            frame: main_frame(1),
        })
        .await?;

    // Link click that goes through two server redirects
    let link = commit(2, "https://crates.io/")?
        .from_renderer(true)
        .with_transition(PageTransition::Link);
    for (hop, set_cookie) in [("https://crates.io/redirect", true), ("https://crates.io/r2", false)] {
        handle
            .send(PageEvent::ServerRedirect {
                navigation: link.navigation,
                frame: link.frame.clone(),
                url: Url::parse(hop)?,
                set_cookie_present: set_cookie,
            })
            .await?;
    }
    handle.send(link.into()).await?;

    // Fenced frame storage does not count toward the page
    handle
        .send(PageEvent::StorageAccess {
            frame: main_frame(2).child(FrameId(7), ContextKind::FencedFrame),
            kind: StorageKind::LocalStorage,
        })
        .await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.send(commit(3, "https://docs.rs/")?.into()).await?;

    let visits = handle.wait_for_visits(3, Duration::from_secs(2)).await?;
    println!("✅ Recorded {} visits", visits.len());

    let visits = handle.detach().await?;
    for visit in &visits {
        println!(
            "🔍 {} redirects={} storage={} activation={} duration={:?}",
            visit.url,
            visit.navigation.server_redirects.len(),
            visit.prev_page.had_qualifying_storage_access,
            visit.prev_page.received_user_activation,
            visit.prev_page.visit_duration
        );
    }

    Ok(())
}
