//! The router owns the route tree and turns locations into resolved trees.
//!
//! Every change that may affect the resolved tree (a navigation, an
//! invalidation, a loader settling) calls [`Router::request_update`]. Requests
//! made during one synchronous stretch collapse into a single resolution
//! pass, run as a local task once the caller yields to the executor. The pass
//! resolves the current location against the tree and hands the result to
//! every subscriber.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::rc::Rc;

use url::Url;

use crate::core::SearchParams;
use crate::error::RouterError;
use crate::group::RouteGroup;
use crate::history::{History, ListenerId, MemoryHistory};
use crate::node::RouteNode;
use crate::path::exited_path;
use crate::routable::{Context, Updater};
use crate::tree::{RouteTree, Routes};

/// Origin used to resolve navigation targets when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost";

pub type Subscriber<C> = Rc<dyn Fn(Option<&RouteNode<C>>)>;

/// Handle returned by [`Router::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateState {
    Idle,
    Scheduled,
    Resolving,
}

/// A click on a link, as seen by [`Router::link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkClick {
    /// Mouse button, `0` being the primary one.
    pub button: u16,
    pub href: String,
}

impl LinkClick {
    pub fn primary(href: impl Into<String>) -> Self {
        Self {
            button: 0,
            href: href.into(),
        }
    }
}

struct Inner<C> {
    tree: RefCell<RouteTree<C>>,
    history: Rc<dyn History>,
    base: Url,
    subscribers: RefCell<BTreeMap<SubscriptionId, Subscriber<C>>>,
    next_id: Cell<u64>,
    state: Cell<UpdateState>,
    listener: Cell<Option<ListenerId>>,
}

impl<C> Drop for Inner<C> {
    fn drop(&mut self) {
        if let Some(id) = self.listener.take() {
            self.history.unlisten(id);
        }
    }
}

/// Handle to a router. Clones share the same state.
pub struct Router<C> {
    inner: Rc<Inner<C>>,
}

impl<C> Clone for Router<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C> Debug for Router<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("history", &self.inner.history)
            .field("base", &self.inner.base.as_str())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .field("state", &self.inner.state.get())
            .finish()
    }
}

/// Configuration of a [`Router`]. The routes are mounted under a root group
/// at `/` carrying the router's own layout and fallback.
pub struct RouterBuilder<C> {
    layout: Option<C>,
    fallback: Option<C>,
    routes: Vec<Routes<C>>,
    history: Option<Rc<dyn History>>,
    base_url: String,
}

impl<C: Clone + 'static> Default for RouterBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clone + 'static> RouterBuilder<C> {
    pub fn new() -> Self {
        Self {
            layout: None,
            fallback: None,
            routes: Vec::new(),
            history: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn layout(mut self, component: C) -> Self {
        self.layout = Some(component);
        self
    }

    /// Rendered when nothing else matches.
    pub fn fallback(mut self, component: C) -> Self {
        self.fallback = Some(component);
        self
    }

    pub fn routes<I>(mut self, routes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Routes<C>>,
    {
        self.routes.extend(routes.into_iter().map(Into::into));
        self
    }

    /// Drives the router from `history` instead of a fresh [`MemoryHistory`]
    /// starting at `/`.
    pub fn history<H: History + 'static>(mut self, history: Rc<H>) -> Self {
        self.history = Some(history as Rc<dyn History>);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builds the route tree, starts listening to the history and schedules
    /// the first resolution pass.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a [`tokio::task::LocalSet`].
    pub fn build(self) -> Result<Router<C>, RouterError> {
        let base = Url::parse(&self.base_url)
            .map_err(|err| RouterError::BaseUrl(self.base_url.clone(), err))?;

        let mut root = RouteGroup::new("/").routes(self.routes);
        root.layout = self.layout;
        root.init.fallback = self.fallback;

        let tree = RouteTree::new(root)?;
        let history = self
            .history
            .unwrap_or_else(|| Rc::new(MemoryHistory::default()) as Rc<dyn History>);

        let router = Router {
            inner: Rc::new(Inner {
                tree: RefCell::new(tree),
                history,
                base,
                subscribers: RefCell::new(BTreeMap::new()),
                next_id: Cell::new(0),
                state: Cell::new(UpdateState::Idle),
                listener: Cell::new(None),
            }),
        };

        let updater = router.updater();
        let id = router
            .inner
            .history
            .listen(Rc::new(move || updater.request()));
        router.inner.listener.set(Some(id));

        tracing::debug!(base = %router.inner.base, "router created");
        router.request_update();

        Ok(router)
    }
}

impl<C: Clone + 'static> Router<C> {
    pub fn builder() -> RouterBuilder<C> {
        RouterBuilder::new()
    }

    /// Asks for a resolution pass. Does nothing if one is already scheduled.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a [`tokio::task::LocalSet`].
    pub fn request_update(&self) {
        if self.inner.state.get() == UpdateState::Scheduled {
            tracing::trace!("update already scheduled");
            return;
        }

        self.inner.state.set(UpdateState::Scheduled);
        tracing::trace!("update scheduled");

        let inner = Rc::downgrade(&self.inner);
        tokio::task::spawn_local(async move {
            if let Some(inner) = inner.upgrade() {
                Router { inner }.update();
            }
        });
    }

    /// Resolves the current location and notifies every subscriber.
    pub fn update(&self) {
        self.inner.state.set(UpdateState::Resolving);
        let tree = self.resolve_now();
        if self.inner.state.get() == UpdateState::Resolving {
            self.inner.state.set(UpdateState::Idle);
        }

        // subscribers may subscribe, unsubscribe or navigate while notified
        let subscribers: Vec<Subscriber<C>> =
            self.inner.subscribers.borrow().values().cloned().collect();

        tracing::debug!(
            path = %self.inner.history.current_path(),
            hash = ?tree.as_ref().map(|node| &node.hash),
            subscribers = subscribers.len(),
            "route tree resolved"
        );

        for subscriber in subscribers {
            subscriber(tree.as_ref());
        }
    }

    /// Resolves the current location without notifying anyone.
    pub fn resolve_now(&self) -> Option<RouteNode<C>> {
        let pathname = self.inner.history.current_path();
        let cx = Context {
            search: SearchParams::parse(&self.inner.history.current_search()),
            updater: self.updater(),
        };

        let mut tree = self.inner.tree.borrow_mut();
        let root = tree.root();
        tree.resolve(root, &pathname, true, &cx)
    }

    /// Navigates to `target`, adding a history entry.
    ///
    /// `target` is resolved against the base url, so it may be a path, a
    /// path with a query, or an absolute url. Caches of the part of the tree
    /// being left are invalidated.
    pub fn push(&self, target: &str) -> Result<(), RouterError> {
        self.navigate(target, false)
    }

    /// Like [`push`](Self::push), but overwrites the current history entry.
    pub fn replace(&self, target: &str) -> Result<(), RouterError> {
        self.navigate(target, true)
    }

    fn navigate(&self, target: &str, replace: bool) -> Result<(), RouterError> {
        let url = self.parse(target)?;
        let entered = match url.query() {
            Some(query) if !query.is_empty() => format!("{}?{}", url.path(), query),
            _ => url.path().to_string(),
        };

        let previous = self.inner.history.current_path();
        if replace {
            self.inner.history.replace_entry(&entered);
        } else {
            self.inner.history.push_entry(&entered);
        }
        tracing::info!(from = %previous, to = %entered, replace, "navigate");

        if let Some(exited) = exited_path(&previous, url.path()) {
            self.inner.tree.borrow().invalidate(&exited);
        }

        self.request_update();
        Ok(())
    }

    fn parse(&self, target: &str) -> Result<Url, RouterError> {
        self.inner
            .base
            .join(target)
            .map_err(|err| RouterError::Url(target.to_string(), err))
    }

    pub fn back(&self) {
        self.inner.history.go_back();
    }

    pub fn forward(&self) {
        self.inner.history.go_forward();
    }

    /// Clears the loader and action caches of every route at `path` or below
    /// it, then schedules a resolution pass.
    pub fn invalidate(&self, path: &str) {
        self.inner.tree.borrow().invalidate(path);
        self.request_update();
    }

    pub fn subscribe(&self, subscriber: impl Fn(Option<&RouteNode<C>>) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner
            .subscribers
            .borrow_mut()
            .insert(id, Rc::new(subscriber));
        id
    }

    /// Returns whether `id` was subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.borrow_mut().remove(&id).is_some()
    }

    /// Drops every subscriber and stops following the history.
    pub fn clear(&self) {
        self.inner.subscribers.borrow_mut().clear();
        if let Some(id) = self.inner.listener.take() {
            self.inner.history.unlisten(id);
        }
    }

    /// Handles a link click. A primary-button click on a link within the
    /// base url's origin becomes a [`push`](Self::push); the return value
    /// tells whether the click was taken over.
    pub fn link(&self, click: &LinkClick) -> bool {
        if click.button != 0 {
            return false;
        }

        let url = match self.parse(&click.href) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!("ignoring link: {err}");
                return false;
            }
        };

        if url.origin() != self.inner.base.origin() {
            return false;
        }

        self.push(url.as_str()).is_ok()
    }

    pub fn current_path(&self) -> String {
        self.inner.history.current_path()
    }

    pub fn current_search(&self) -> SearchParams {
        SearchParams::parse(&self.inner.history.current_search())
    }

    /// Mermaid diagram of the route tree.
    pub fn tree(&self) -> String {
        self.inner.tree.borrow().to_string()
    }

    fn updater(&self) -> Updater {
        let inner = Rc::downgrade(&self.inner);
        Updater::new(move || {
            if let Some(inner) = inner.upgrade() {
                Router { inner }.request_update();
            }
        })
    }
}
