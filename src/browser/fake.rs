//! Scripted in-memory page for exercising steps without a browser.

use super::{BrowserLauncher, DriverError, ElementHandle, PageDriver};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Effect = Box<dyn Fn(&mut PageState) + Send + Sync>;

/// Current DOM as seen by the fake: selector → text. Present iff keyed.
#[derive(Default)]
pub(crate) struct PageState {
    elements: HashMap<String, String>,
    failing: HashSet<String>,
    fail_goto: bool,
    gotos: Vec<String>,
    fills: Vec<(String, String)>,
    clicks: Vec<String>,
}

impl PageState {
    pub(crate) fn set_text(&mut self, selector: &str, text: &str) {
        self.elements.insert(selector.to_owned(), text.to_owned());
    }

    pub(crate) fn show(&mut self, selector: &str) {
        self.elements.entry(selector.to_owned()).or_default();
    }

    pub(crate) fn hide(&mut self, selector: &str) {
        self.elements.remove(selector);
    }

    fn check(&self, selector: &str) -> Result<(), DriverError> {
        if self.failing.contains(selector) {
            return Err(DriverError::Protocol(format!("boom on {selector}")));
        }
        Ok(())
    }
}

/// Builder for the page a [`FakeLauncher`] hands out.
#[derive(Default)]
pub(crate) struct Scenario {
    state: PageState,
    on_click: HashMap<String, Effect>,
    fail_launch: bool,
}

impl Scenario {
    pub(crate) fn with_element(mut self, selector: &str) -> Self {
        self.state.show(selector);
        self
    }

    pub(crate) fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.state.set_text(selector, text);
        self
    }

    /// Every operation touching `selector` fails with a protocol error.
    pub(crate) fn failing(mut self, selector: &str) -> Self {
        self.state.failing.insert(selector.to_owned());
        self
    }

    pub(crate) fn failing_goto(mut self) -> Self {
        self.state.fail_goto = true;
        self
    }

    pub(crate) fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub(crate) fn on_click(
        mut self,
        selector: &str,
        effect: impl Fn(&mut PageState) + Send + Sync + 'static,
    ) -> Self {
        self.on_click.insert(selector.to_owned(), Box::new(effect));
        self
    }
}

struct Shared {
    state: Mutex<PageState>,
    on_click: HashMap<String, Effect>,
    launches: AtomicUsize,
    closes: AtomicUsize,
}

pub(crate) struct FakeLauncher {
    shared: Arc<Shared>,
    fail_launch: bool,
}

impl FakeLauncher {
    pub(crate) fn new(scenario: Scenario) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(scenario.state),
                on_click: scenario.on_click,
                launches: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }),
            fail_launch: scenario.fail_launch,
        }
    }

    pub(crate) fn launches(&self) -> usize {
        self.shared.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn clicks(&self) -> Vec<String> {
        self.shared.state.lock().unwrap().clicks.clone()
    }

    pub(crate) fn fills(&self) -> Vec<(String, String)> {
        self.shared.state.lock().unwrap().fills.clone()
    }

    pub(crate) fn gotos(&self) -> Vec<String> {
        self.shared.state.lock().unwrap().gotos.clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        if self.fail_launch {
            return Err(DriverError::Protocol("session not created".into()));
        }
        self.shared.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            shared: self.shared.clone(),
        }))
    }
}

struct FakePage {
    shared: Arc<Shared>,
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.shared.state.lock().unwrap();
        if state.fail_goto {
            return Err(DriverError::Protocol("net::ERR_NAME_NOT_RESOLVED".into()));
        }
        state.gotos.push(url.to_owned());
        Ok(())
    }

    async fn wait_for_load(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>, DriverError> {
        let state = self.shared.state.lock().unwrap();
        state.check(selector)?;
        Ok(state
            .elements
            .contains_key(selector)
            .then(|| ElementHandle(selector.to_owned())))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        let mut state = self.shared.state.lock().unwrap();
        state.check(selector)?;
        if !state.elements.contains_key(selector) {
            return Err(DriverError::ElementNotFound(selector.to_owned()));
        }
        state.fills.push((selector.to_owned(), value.to_owned()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let mut state = self.shared.state.lock().unwrap();
        state.check(selector)?;
        if !state.elements.contains_key(selector) {
            return Err(DriverError::ElementNotFound(selector.to_owned()));
        }
        state.clicks.push(selector.to_owned());
        if let Some(effect) = self.shared.on_click.get(selector) {
            effect(&mut state);
        }
        Ok(())
    }

    async fn text_content(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let state = self.shared.state.lock().unwrap();
        state.check(&element.0)?;
        state
            .elements
            .get(&element.0)
            .cloned()
            .ok_or_else(|| DriverError::Protocol("stale element reference".into()))
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
