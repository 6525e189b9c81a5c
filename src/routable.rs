//! Behaviour shared by every node of the route tree.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::{Params, SearchParams};
use crate::error::TaskError;
use crate::path::InvalidatePattern;
use crate::pattern::Pattern;
use crate::task::{Snapshot, Task};
use crate::tree::RouteId;

/// Arguments handed to a data loader.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoadArgs {
    /// The path this node matched: the full path for a route, the matched
    /// prefix for a group.
    pub path: String,
    pub params: Params,
    pub search_params: SearchParams,
}

pub(crate) type Loader = Task<LoadArgs, Value>;
pub(crate) type ActionTask = Task<Value, Value>;

/// Asks the router for one more resolution pass.
#[derive(Clone)]
pub struct Updater(Rc<dyn Fn()>);

impl Updater {
    pub fn new(request: impl Fn() + 'static) -> Self {
        Self(Rc::new(request))
    }

    pub fn request(&self) {
        (self.0)()
    }
}

impl Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Updater")
    }
}

/// Per-pass resolution inputs.
pub(crate) struct Context {
    pub(crate) search: SearchParams,
    pub(crate) updater: Updater,
}

impl Context {
    /// Callback handed to [`Task::cache`]: any settled run re-resolves the tree.
    pub(crate) fn on_change<D>(&self) -> impl FnOnce(&Snapshot<D>) + 'static {
        let updater = self.updater.clone();
        move |_| updater.request()
    }
}

/// Fields every declaration carries, whether it is a [`Route`](crate::Route)
/// or a [`RouteGroup`](crate::RouteGroup).
pub(crate) struct RoutableInit<C> {
    pub(crate) path: String,
    pub(crate) slot: Option<String>,
    pub(crate) fallback: Option<C>,
    pub(crate) load: Option<Loader>,
    pub(crate) actions: BTreeMap<String, ActionTask>,
}

impl<C> RoutableInit<C> {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            slot: None,
            fallback: None,
            load: None,
            actions: BTreeMap::new(),
        }
    }
}

/// Wraps a typed loader into a task producing JSON.
pub(crate) fn loader<T, F, Fut>(load: F) -> Loader
where
    T: Serialize,
    F: Fn(LoadArgs) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<T>> + 'static,
{
    Task::new(move |args| {
        let future = load(args);
        async move { anyhow::Ok(serde_json::to_value(future.await?)?) }
    })
}

/// Wraps a typed action into a task taking and producing JSON.
pub(crate) fn action<I, T, F, Fut>(act: F) -> ActionTask
where
    I: DeserializeOwned,
    T: Serialize,
    F: Fn(I) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<T>> + 'static,
{
    Task::new(move |input: Value| {
        let future = serde_json::from_value::<I>(input).map(&act);
        async move { anyhow::Ok(serde_json::to_value(future?.await?)?) }
    })
}

/// Builder methods available on both kinds of declaration.
macro_rules! impl_routable_builder {
    ($($T:ident),*) => {
        $(
            impl<C> $T<C> {
                /// Renders this declaration into the named outlet of its parent
                /// instead of competing for the primary child. A slot reuses the
                /// parent's pattern.
                pub fn slot(mut self, name: impl Into<String>) -> Self {
                    self.init.slot = Some(name.into());
                    self
                }

                pub fn fallback(mut self, component: C) -> Self {
                    self.init.fallback = Some(component);
                    self
                }

                /// Sets the data loader. Its result is cached per distinct
                /// [`LoadArgs`](crate::LoadArgs) until the route is invalidated.
                pub fn load<T, F, Fut>(mut self, load: F) -> Self
                where
                    T: serde::Serialize,
                    F: Fn(crate::LoadArgs) -> Fut + 'static,
                    Fut: std::future::Future<Output = anyhow::Result<T>> + 'static,
                {
                    self.init.load = Some(crate::routable::loader(load));
                    self
                }

                /// Adds a named action. Its input is deserialized from the JSON
                /// value passed to [`Action::call`](crate::Action::call).
                pub fn action<I, T, F, Fut>(mut self, name: impl Into<String>, act: F) -> Self
                where
                    I: serde::de::DeserializeOwned,
                    T: serde::Serialize,
                    F: Fn(I) -> Fut + 'static,
                    Fut: std::future::Future<Output = anyhow::Result<T>> + 'static,
                {
                    self.init
                        .actions
                        .insert(name.into(), crate::routable::action(act));
                    self
                }
            }
        )*
    };
}

pub(crate) use impl_routable_builder;

/// An entry of the route arena.
pub(crate) struct Routable<C> {
    pub(crate) path: String,
    pub(crate) full_path: String,
    pub(crate) slot: Option<String>,
    pub(crate) fallback: Option<C>,
    pub(crate) pattern: Pattern,
    pub(crate) invalidate: InvalidatePattern,
    pub(crate) load: Option<Loader>,
    pub(crate) actions: BTreeMap<String, ActionTask>,
    pub(crate) parent: Option<RouteId>,
    pub(crate) kind: Kind<C>,
}

pub(crate) enum Kind<C> {
    Route(crate::route::RouteKind<C>),
    Group(crate::group::GroupKind<C>),
}

impl<C: Clone + 'static> Routable<C> {
    pub(crate) fn is_route(&self) -> bool {
        matches!(self.kind, Kind::Route(_))
    }

    /// Clears this node's own loader and action caches if `path` is this
    /// node's full path or one of its descendants' paths.
    pub(crate) fn invalidate(&self, path: &str) -> bool {
        if !self.invalidate.test(path) {
            return false;
        }

        if let Some(load) = &self.load {
            load.invalidate();
        }
        for action in self.actions.values() {
            action.invalidate();
        }

        true
    }

    pub(crate) fn get_data(&self, args: LoadArgs, cx: &Context) -> Snapshot<Value> {
        match &self.load {
            Some(load) => load.cache(&args, cx.on_change()),
            None => Snapshot::empty(),
        }
    }

    pub(crate) fn get_actions(&self, cx: &Context) -> BTreeMap<String, Action> {
        self.actions
            .iter()
            .map(|(name, task)| {
                let action = Action {
                    name: name.clone(),
                    snapshot: task.snapshot(),
                    task: task.clone(),
                    updater: cx.updater.clone(),
                };
                (name.clone(), action)
            })
            .collect()
    }
}

/// A named operation of a route, bound to the route's own cache.
///
/// Holds the action's state as of the resolution pass that produced it.
/// Calling it asks the router to re-resolve when the run starts and again
/// when it settles, so subscribers see the loading state and the outcome.
#[derive(Clone)]
pub struct Action {
    name: String,
    snapshot: Snapshot<Value>,
    task: ActionTask,
    updater: Updater,
}

impl Action {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loading(&self) -> bool {
        self.snapshot.loading
    }

    pub fn data(&self) -> Option<&Value> {
        self.snapshot.data.as_ref()
    }

    pub fn data_as<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
        self.snapshot.data.clone().map(serde_json::from_value)
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.snapshot.error.as_ref()
    }

    /// Runs the action with `input`.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a [`tokio::task::LocalSet`].
    pub async fn call(&self, input: impl Serialize) -> Snapshot<Value> {
        let input = match serde_json::to_value(input) {
            Ok(input) => input,
            Err(err) => return Snapshot::failed(TaskError::new(err)),
        };

        tracing::debug!(action = %self.name, "calling action");
        let run = self.task.run(input);
        self.updater.request();

        let snapshot = run.await;
        self.updater.request();
        snapshot
    }
}

impl Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("loading", &self.snapshot.loading)
            .field("data", &self.snapshot.data)
            .field("error", &self.snapshot.error)
            .finish()
    }
}
