//! In-memory scripted browser for tests.
//!
//! Documents are re-rendered on every navigation, pagination click, search
//! submission or history step, and each render gets a fresh generation.
//! Handles from an older generation are stale, which is exactly how a live
//! JavaScript listing behaves.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{BrowserError, Session};
use crate::config::{Combine, FieldSpec, Locator, Pagination, Read, SearchConfig, SiteConfig};
use crate::models::Field;

const SEARCH_INPUT: &str = "#keyword";
const RESULTS: &str = ".results";
const CARD: &str = ".job-card";
const NEXT: &str = ".next";
const TITLE: &str = "h3";
const LINK: &str = "a.link";
const TAG: &str = ".tag";
const SALARY_MIN: &str = ".salary-min";
const SALARY_MAX: &str = ".salary-max";
const DESCRIPTION: &str = ".job-description";
const DETAIL_LEVEL: &str = ".detail-level";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextMode {
    /// Advance button disappears on the last page.
    AbsentOnLast,
    /// Advance button stays but carries `disabled` on the last page.
    DisabledOnLast,
    /// Advance button stays with `aria-disabled="true"` on the last page.
    AriaDisabledOnLast,
    /// Advance button stays with a `disabled` CSS class on the last page.
    ClassDisabledOnLast,
    /// Like `AbsentOnLast`, but native clicks are intercepted; only a script click works.
    ClickIntercepted,
    /// Advance button present everywhere but clicking it changes nothing.
    Broken,
    /// No pagination control at all.
    Never,
}

#[derive(Debug, Clone, Default)]
pub struct FakeCard {
    pub title: String,
    /// Empty means the card renders without a link.
    pub url: String,
    pub tags: Vec<String>,
    pub salary_min: Option<String>,
    pub salary_max: Option<String>,
    /// Reading the title fails with a command error.
    pub broken_title: bool,
}

impl FakeCard {
    pub fn new(title: &str, url: &str) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeDetail {
    pub description: String,
    pub level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FakeSite {
    pub base_url: String,
    pub search: bool,
    /// Keyword (empty for the unsearched listing) to pages of cards.
    pub listings: HashMap<String, Vec<Vec<FakeCard>>>,
    pub details: HashMap<String, FakeDetail>,
    pub next: NextMode,
    /// The session dies after this many commands.
    pub kill_after: Option<usize>,
    /// This many `?page=` loads come up blank before pages render normally.
    pub slow_page_loads: usize,
    /// Opening any detail page kills the session.
    pub crash_on_detail: bool,
}

impl FakeSite {
    /// Listing without search; `sizes[p]` cards on page `p`.
    pub fn paged(base_url: &str, sizes: &[usize]) -> Self {
        let mut site = Self::empty(base_url, false);
        let pages = generate_pages(base_url, "", sizes);
        site.listings.insert(String::new(), pages);
        site
    }

    pub fn searchable(base_url: &str) -> Self {
        Self::empty(base_url, true)
    }

    fn empty(base_url: &str, search: bool) -> Self {
        Self {
            base_url: base_url.into(),
            search,
            listings: HashMap::new(),
            details: HashMap::new(),
            next: NextMode::AbsentOnLast,
            kill_after: None,
            slow_page_loads: 0,
            crash_on_detail: false,
        }
    }

    pub fn keyword(mut self, keyword: &str, sizes: &[usize]) -> Self {
        let pages = generate_pages(&self.base_url, keyword, sizes);
        self.listings.insert(keyword.into(), pages);
        self
    }

    pub fn keyword_pages(mut self, keyword: &str, pages: Vec<Vec<FakeCard>>) -> Self {
        self.listings.insert(keyword.into(), pages);
        self
    }

    pub fn detail(mut self, url: &str, description: &str, level: Option<&str>) -> Self {
        self.details.insert(
            url.into(),
            FakeDetail {
                description: description.into(),
                level: level.map(Into::into),
            },
        );
        self
    }

    pub fn next_mode(mut self, mode: NextMode) -> Self {
        self.next = mode;
        self
    }

    pub fn kill_after(mut self, commands: usize) -> Self {
        self.kill_after = Some(commands);
        self
    }

    pub fn slow_page_loads(mut self, loads: usize) -> Self {
        self.slow_page_loads = loads;
        self
    }

    pub fn crash_on_detail(mut self) -> Self {
        self.crash_on_detail = true;
        self
    }

    pub fn card_locator() -> Locator {
        Locator::Css(CARD.into())
    }

    pub fn next_locator() -> Locator {
        Locator::Css(NEXT.into())
    }

    pub fn description_locator() -> Locator {
        Locator::Css(DESCRIPTION.into())
    }

    /// Site configuration wired to this fake's markup.
    pub fn site_config(&self, keywords: &[&str]) -> SiteConfig {
        let field = |field, css: &str, read, combine| FieldSpec {
            field,
            locator: Some(Locator::Css(css.into())),
            read,
            combine,
            transform: None,
        };
        SiteConfig {
            name: "fake".into(),
            base_url: self.base_url.clone(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            ready: None,
            search: self.search.then(|| SearchConfig {
                input: Locator::Css(SEARCH_INPUT.into()),
                results: Locator::Css(RESULTS.into()),
            }),
            cards: Self::card_locator(),
            fields: vec![
                field(Field::Title, TITLE, Read::Text, Combine::First),
                field(
                    Field::SourceUrl,
                    LINK,
                    Read::Attribute("href".into()),
                    Combine::First,
                ),
                field(Field::Location, TAG, Read::Text, Combine::Join(", ".into())),
                field(
                    Field::Salary,
                    SALARY_MIN,
                    Read::Text,
                    Combine::Range(Locator::Css(SALARY_MAX.into())),
                ),
            ],
            pagination: match self.next {
                NextMode::Never => Pagination::None,
                _ => Pagination::NextButton {
                    locator: Self::next_locator(),
                },
            },
            max_pages: None,
            detail: None,
        }
    }

    pub fn detail_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec {
                field: Field::Description,
                locator: Some(Self::description_locator()),
                read: Read::Html,
                combine: Combine::First,
                transform: None,
            },
            FieldSpec {
                field: Field::Level,
                locator: Some(Locator::Css(DETAIL_LEVEL.into())),
                read: Read::Text,
                combine: Combine::First,
                transform: None,
            },
        ]
    }
}

fn generate_pages(base_url: &str, keyword: &str, sizes: &[usize]) -> Vec<Vec<FakeCard>> {
    let slug = keyword.to_lowercase().replace(' ', "-");
    sizes
        .iter()
        .enumerate()
        .map(|(p, n)| {
            (0..*n)
                .map(|i| FakeCard {
                    title: format!("{} Job {}-{}", keyword, p + 1, i + 1).trim().to_string(),
                    url: format!("{}/jobs/{}{}-{}", base_url, slug, p + 1, i + 1),
                    tags: vec!["London".into(), "Remote".into()],
                    salary_min: Some("50000".into()),
                    salary_max: None,
                    broken_title: false,
                })
                .collect()
        })
        .collect()
}

// ── Rendering ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum View {
    Blank,
    Base,
    Listing { keyword: String, page: usize },
    Detail { url: String },
}

#[derive(Debug, Clone, Default)]
struct Node {
    selector: String,
    text: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
    fail: bool,
}

impl Node {
    fn new(selector: &str, text: &str) -> Self {
        Self {
            selector: selector.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeElement {
    tab: usize,
    generation: u64,
    path: Vec<usize>,
}

#[derive(Debug)]
struct Tab {
    view: View,
    history: Vec<View>,
    generation: u64,
}

#[derive(Debug)]
struct State {
    tabs: Vec<Option<Tab>>,
    active: usize,
    next_generation: u64,
    typed: String,
    commands: usize,
    quit: bool,
    crashed: bool,
    slow_loads_left: usize,
    advance_clicks: usize,
    script_clicks: usize,
    tabs_opened: usize,
}

pub struct FakeBrowser {
    site: FakeSite,
    state: Mutex<State>,
}

impl FakeBrowser {
    pub fn new(site: FakeSite) -> Self {
        Self {
            state: Mutex::new(State {
                tabs: vec![Some(Tab {
                    view: View::Blank,
                    history: Vec::new(),
                    generation: 0,
                })],
                active: 0,
                next_generation: 1,
                typed: String::new(),
                commands: 0,
                quit: false,
                crashed: false,
                slow_loads_left: site.slow_page_loads,
                advance_clicks: 0,
                script_clicks: 0,
                tabs_opened: 0,
            }),
            site,
        }
    }

    pub fn quit_called(&self) -> bool {
        self.state.lock().unwrap().quit
    }

    pub fn advance_clicks(&self) -> usize {
        self.state.lock().unwrap().advance_clicks
    }

    pub fn script_clicks(&self) -> usize {
        self.state.lock().unwrap().script_clicks
    }

    pub fn tabs_opened(&self) -> usize {
        self.state.lock().unwrap().tabs_opened
    }

    pub fn open_tabs(&self) -> usize {
        self.state.lock().unwrap().tabs.iter().flatten().count()
    }

    fn view_for(&self, url: &str) -> View {
        let base = self.site.base_url.trim_end_matches('/');
        if url.trim_end_matches('/') == base {
            return if self.site.search {
                View::Base
            } else {
                View::Listing {
                    keyword: String::new(),
                    page: 0,
                }
            };
        }
        if let Some(page) = url
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix("?page="))
            .and_then(|n| n.parse::<usize>().ok())
        {
            return View::Listing {
                keyword: String::new(),
                page: page.saturating_sub(1),
            };
        }
        if self.site.details.contains_key(url) {
            return View::Detail { url: url.into() };
        }
        View::Blank
    }

    fn render(&self, view: &View) -> Vec<Node> {
        let mut doc = Vec::new();
        match view {
            View::Blank => {}
            View::Base => doc.push(Node::new(SEARCH_INPUT, "")),
            View::Listing { keyword, page } => {
                if self.site.search {
                    doc.push(Node::new(SEARCH_INPUT, keyword));
                }
                doc.extend(self.render_listing(keyword, *page));
            }
            View::Detail { url } => {
                if let Some(detail) = self.site.details.get(url) {
                    doc.push(Node::new(DESCRIPTION, &detail.description));
                    if let Some(level) = &detail.level {
                        doc.push(Node::new(DETAIL_LEVEL, level));
                    }
                }
            }
        }
        doc
    }

    fn render_listing(&self, keyword: &str, page: usize) -> Vec<Node> {
        let Some(pages) = self.site.listings.get(keyword) else {
            return Vec::new();
        };
        let mut doc = vec![Node::new(RESULTS, &format!("{} pages", pages.len()))];

        for card in pages.get(page).into_iter().flatten() {
            let mut title = Node::new(TITLE, &card.title);
            title.fail = card.broken_title;
            let mut node = Node::new(CARD, &card.title);
            node.children.push(title);
            if !card.url.is_empty() {
                node.children
                    .push(Node::new(LINK, "View").attr("href", &card.url));
            }
            for tag in &card.tags {
                node.children.push(Node::new(TAG, tag));
            }
            if let Some(min) = &card.salary_min {
                node.children.push(Node::new(SALARY_MIN, min));
            }
            if let Some(max) = &card.salary_max {
                node.children.push(Node::new(SALARY_MAX, max));
            }
            doc.push(node);
        }

        let last = page + 1 >= pages.len();
        let next = Node::new(NEXT, "→");
        match self.site.next {
            NextMode::AbsentOnLast | NextMode::ClickIntercepted if !last => doc.push(next),
            NextMode::DisabledOnLast => {
                doc.push(if last { next.attr("disabled", "true") } else { next });
            }
            NextMode::AriaDisabledOnLast => {
                doc.push(next.attr("aria-disabled", if last { "true" } else { "false" }));
            }
            NextMode::ClassDisabledOnLast => {
                doc.push(next.attr("class", if last { "pager is-disabled" } else { "pager" }));
            }
            NextMode::Broken => doc.push(next),
            _ => {}
        }
        doc
    }

    /// Run `f` against the live state, enforcing session liveness.
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut State) -> Result<T, BrowserError>,
    ) -> Result<T, BrowserError> {
        let mut state = self.state.lock().unwrap();
        if state.quit {
            return Err(BrowserError::SessionLost("session closed".into()));
        }
        if state.crashed {
            return Err(BrowserError::SessionLost("browser crashed".into()));
        }
        state.commands += 1;
        if let Some(limit) = self.site.kill_after {
            if state.commands > limit {
                return Err(BrowserError::SessionLost("browser crashed".into()));
            }
        }
        f(&mut state)
    }

    /// Scripted faults for a page about to load.
    fn arrive(&self, state: &mut State, view: View) -> Result<View, BrowserError> {
        match view {
            View::Detail { .. } if self.site.crash_on_detail => {
                state.crashed = true;
                Err(BrowserError::SessionLost("renderer crashed on detail page".into()))
            }
            View::Listing { page, .. } if page > 0 && state.slow_loads_left > 0 => {
                state.slow_loads_left -= 1;
                Ok(View::Blank)
            }
            view => Ok(view),
        }
    }

    /// What a click on `node` does, however it was delivered.
    fn activate(&self, state: &mut State, node: &Node) {
        if node.selector == NEXT {
            state.advance_clicks += 1;
            if node.attrs.iter().any(|(k, _)| k == "disabled") || self.site.next == NextMode::Broken
            {
                return;
            }
            if let View::Listing { keyword, page } = Self::current_view(state) {
                let pages = self.site.listings.get(&keyword).map_or(0, Vec::len);
                if page + 1 < pages {
                    self.rerender(state, View::Listing { keyword, page: page + 1 });
                }
            }
        } else if node.selector == LINK {
            if let Some((_, href)) = node.attrs.iter().find(|(k, _)| k == "href") {
                let view = self.view_for(href);
                self.navigate(state, view);
            }
        }
    }

    fn navigate(&self, state: &mut State, view: View) {
        let generation = state.next_generation;
        state.next_generation += 1;
        let active = state.active;
        if let Some(tab) = state.tabs[active].as_mut() {
            let previous = std::mem::replace(&mut tab.view, view);
            tab.history.push(previous);
            tab.generation = generation;
        }
    }

    fn rerender(&self, state: &mut State, view: View) {
        let generation = state.next_generation;
        state.next_generation += 1;
        let active = state.active;
        if let Some(tab) = state.tabs[active].as_mut() {
            tab.view = view;
            tab.generation = generation;
        }
    }

    fn resolve(&self, state: &State, el: &FakeElement) -> Result<Node, BrowserError> {
        let tab = state
            .tabs
            .get(el.tab)
            .and_then(|t| t.as_ref())
            .ok_or(BrowserError::Stale)?;
        if tab.generation != el.generation || el.tab != state.active {
            return Err(BrowserError::Stale);
        }
        let doc = self.render(&tab.view);
        let mut nodes = &doc;
        let mut found: Option<&Node> = None;
        for idx in &el.path {
            let node = nodes.get(*idx).ok_or(BrowserError::Stale)?;
            nodes = &node.children;
            found = Some(node);
        }
        found.cloned().ok_or(BrowserError::Stale)
    }

    fn current_view(state: &State) -> View {
        state.tabs[state.active]
            .as_ref()
            .map(|t| t.view.clone())
            .unwrap_or(View::Blank)
    }
}

fn css(locator: &Locator) -> Result<&str, BrowserError> {
    match locator {
        Locator::Css(s) => Ok(s),
        Locator::Xpath(_) => Err(BrowserError::Command("xpath unsupported".into())),
    }
}

#[async_trait]
impl Session for FakeBrowser {
    type Element = FakeElement;
    type Window = usize;

    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let view = self.view_for(url);
        self.with_state(|state| {
            let view = self.arrive(state, view)?;
            self.navigate(state, view);
            Ok(())
        })
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.with_state(|state| {
            Ok(match Self::current_view(state) {
                View::Detail { url } => url,
                View::Listing { keyword, page } if keyword.is_empty() => {
                    format!("{}?page={}", self.site.base_url, page + 1)
                }
                _ => self.site.base_url.clone(),
            })
        })
    }

    async fn back(&self) -> Result<(), BrowserError> {
        self.with_state(|state| {
            let active = state.active;
            let previous = state.tabs[active]
                .as_mut()
                .and_then(|t| t.history.pop())
                .unwrap_or(View::Blank);
            self.rerender(state, previous);
            Ok(())
        })
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<FakeElement>, BrowserError> {
        let selector = css(locator)?;
        self.with_state(|state| {
            let tab = state.tabs[state.active]
                .as_ref()
                .ok_or_else(|| BrowserError::SessionLost("no active tab".into()))?;
            Ok(self
                .render(&tab.view)
                .iter()
                .enumerate()
                .filter(|(_, n)| n.selector == selector)
                .map(|(i, _)| FakeElement {
                    tab: state.active,
                    generation: tab.generation,
                    path: vec![i],
                })
                .collect())
        })
    }

    async fn find_all_in(
        &self,
        parent: &FakeElement,
        locator: &Locator,
    ) -> Result<Vec<FakeElement>, BrowserError> {
        let selector = css(locator)?;
        self.with_state(|state| {
            let node = self.resolve(state, parent)?;
            Ok(node
                .children
                .iter()
                .enumerate()
                .filter(|(_, n)| n.selector == selector)
                .map(|(i, _)| {
                    let mut path = parent.path.clone();
                    path.push(i);
                    FakeElement {
                        tab: parent.tab,
                        generation: parent.generation,
                        path,
                    }
                })
                .collect())
        })
    }

    async fn text(&self, element: &FakeElement) -> Result<String, BrowserError> {
        self.with_state(|state| {
            let node = self.resolve(state, element)?;
            if node.fail {
                return Err(BrowserError::Command("javascript error: text unavailable".into()));
            }
            Ok(node.text)
        })
    }

    async fn attr(&self, element: &FakeElement, name: &str) -> Result<Option<String>, BrowserError> {
        self.with_state(|state| {
            let node = self.resolve(state, element)?;
            Ok(node
                .attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone()))
        })
    }

    async fn inner_html(&self, element: &FakeElement) -> Result<String, BrowserError> {
        self.with_state(|state| {
            let node = self.resolve(state, element)?;
            Ok(format!("<p>{}</p>\n<p></p>", node.text))
        })
    }

    async fn is_enabled(&self, element: &FakeElement) -> Result<bool, BrowserError> {
        self.with_state(|state| {
            let node = self.resolve(state, element)?;
            Ok(!node.attrs.iter().any(|(k, _)| k == "disabled"))
        })
    }

    async fn is_stale(&self, element: &FakeElement) -> Result<bool, BrowserError> {
        self.with_state(|state| match self.resolve(state, element) {
            Ok(_) => Ok(false),
            Err(BrowserError::Stale) => Ok(true),
            Err(e) => Err(e),
        })
    }

    async fn click(&self, element: &FakeElement) -> Result<(), BrowserError> {
        self.with_state(|state| {
            let node = self.resolve(state, element)?;
            if node.selector == NEXT && self.site.next == NextMode::ClickIntercepted {
                return Err(BrowserError::Command(
                    "element click intercepted: another element would receive the click".into(),
                ));
            }
            self.activate(state, &node);
            Ok(())
        })
    }

    async fn script_click(&self, element: &FakeElement) -> Result<(), BrowserError> {
        self.with_state(|state| {
            let node = self.resolve(state, element)?;
            state.script_clicks += 1;
            self.activate(state, &node);
            Ok(())
        })
    }

    async fn scroll_into_view(&self, element: &FakeElement) -> Result<(), BrowserError> {
        self.with_state(|state| self.resolve(state, element).map(|_| ()))
    }

    async fn clear(&self, element: &FakeElement) -> Result<(), BrowserError> {
        self.with_state(|state| {
            self.resolve(state, element)?;
            state.typed.clear();
            Ok(())
        })
    }

    async fn type_text(&self, element: &FakeElement, text: &str) -> Result<(), BrowserError> {
        self.with_state(|state| {
            self.resolve(state, element)?;
            state.typed.push_str(text);
            Ok(())
        })
    }

    async fn submit(&self, element: &FakeElement) -> Result<(), BrowserError> {
        self.with_state(|state| {
            let node = self.resolve(state, element)?;
            if node.selector != SEARCH_INPUT {
                return Err(BrowserError::Command("element is not a form field".into()));
            }
            let keyword = state.typed.clone();
            self.navigate(state, View::Listing { keyword, page: 0 });
            Ok(())
        })
    }

    async fn open_tab(&self, url: &str) -> Result<usize, BrowserError> {
        let view = self.view_for(url);
        self.with_state(|state| {
            let view = self.arrive(state, view)?;
            let origin = state.active;
            let generation = state.next_generation;
            state.next_generation += 1;
            state.tabs.push(Some(Tab {
                view,
                history: Vec::new(),
                generation,
            }));
            state.active = state.tabs.len() - 1;
            state.tabs_opened += 1;
            Ok(origin)
        })
    }

    async fn close_tab(&self, return_to: &usize) -> Result<(), BrowserError> {
        self.with_state(|state| {
            let active = state.active;
            state.tabs[active] = None;
            if state.tabs.get(*return_to).is_none_or(|t| t.is_none()) {
                return Err(BrowserError::SessionLost("no window to return to".into()));
            }
            state.active = *return_to;
            Ok(())
        })
    }

    async fn quit(&self) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        state.quit = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handles_go_stale_on_navigation() {
        let browser = FakeBrowser::new(FakeSite::paged("https://jobs.test", &[3]));
        browser.goto("https://jobs.test").await.unwrap();
        let cards = browser.find_all(&FakeSite::card_locator()).await.unwrap();
        assert_eq!(cards.len(), 3);

        browser.goto("https://jobs.test/jobs/1-1").await.unwrap();
        browser.back().await.unwrap();
        assert!(browser.is_stale(&cards[0]).await.unwrap());

        let fresh = browser.find_all(&FakeSite::card_locator()).await.unwrap();
        assert_eq!(fresh.len(), 3);
        assert!(!browser.is_stale(&fresh[0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_quit_ends_session() {
        let browser = FakeBrowser::new(FakeSite::paged("https://jobs.test", &[1]));
        browser.quit().await.unwrap();
        assert!(browser.goto("https://jobs.test").await.unwrap_err().is_fatal());
        assert!(browser.quit_called());
    }
}
