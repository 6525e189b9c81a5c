use std::future::Future;

use crate::node::RouteNode;
use crate::routable::{Context, Kind, LoadArgs, RoutableInit, impl_routable_builder};
use crate::task::{Snapshot, Task};
use crate::tree::{RouteId, RouteTree};

/// A leaf of the route tree: binds a path pattern to a page component.
///
/// ```rust,no_run
/// use keiro::Route;
///
/// let route = Route::new("/posts/:id")
///     .page("Post")
///     .load(|args| async move {
///         anyhow::Ok(format!("post {}", args.params["id"]))
///     });
/// ```
pub struct Route<C> {
    pub(crate) init: RoutableInit<C>,
    pub(crate) page: Option<C>,
    pub(crate) lazy: Option<Task<(), C>>,
}

impl_routable_builder!(Route);

impl<C: Clone + 'static> Route<C> {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            init: RoutableInit::new(path),
            page: None,
            lazy: None,
        }
    }

    pub fn page(mut self, component: C) -> Self {
        self.page = Some(component);
        self
    }

    /// Loads the page component on first use and keeps it for the lifetime
    /// of the router. Takes precedence over [`page`](Self::page); the
    /// route's fallback is rendered while the component is loading.
    pub fn lazy<F, Fut>(mut self, import: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<C>> + 'static,
    {
        self.lazy = Some(Task::new(move |()| import()));
        self
    }
}

/// Leaf-specific state stored in the route arena.
pub(crate) struct RouteKind<C> {
    pub(crate) page: Option<C>,
    pub(crate) lazy: Option<Task<(), C>>,
}

impl<C: Clone + 'static> RouteKind<C> {
    fn get_page(&self, cx: &Context) -> Snapshot<C> {
        match (&self.lazy, &self.page) {
            (Some(lazy), _) => lazy.cache(&(), cx.on_change()),
            (None, Some(page)) => Snapshot::ready(page.clone()),
            (None, None) => Snapshot::empty(),
        }
    }
}

impl<C: Clone + 'static> RouteTree<C> {
    /// Resolves the leaf `id` against `pathname` into a node without
    /// children or slots.
    pub(crate) fn resolve_route(
        &self,
        id: RouteId,
        pathname: &str,
        cx: &Context,
    ) -> Option<RouteNode<C>> {
        let routable = self.get(id);
        let Kind::Route(kind) = &routable.kind else {
            return None;
        };

        let found = routable.pattern.exec(pathname)?;
        tracing::trace!(route = %routable.full_path, pathname, "route matched");

        let page = kind.get_page(cx);
        let data = routable.get_data(
            LoadArgs {
                path: pathname.to_string(),
                params: found.params.clone(),
                search_params: cx.search.clone(),
            },
            cx,
        );
        let actions = routable.get_actions(cx);

        let page_component = if page.loading {
            routable.fallback.clone()
        } else {
            page.data
        };

        let mut node = RouteNode::new(pathname, found.params, cx.search.clone(), data);
        node.page = page_component;
        node.actions = actions;
        if node.error.is_none() {
            node.error = page.error;
        }

        Some(node)
    }
}
