use std::collections::BTreeMap;
use std::future::Future;

use crate::error::TaskError;
use crate::node::RouteNode;
use crate::routable::{Context, Kind, LoadArgs, RoutableInit, impl_routable_builder};
use crate::task::{Snapshot, Task};
use crate::tree::{Module, RouteId, RouteTree, Routes};

/// An internal node of the route tree: wraps its matching descendant in a
/// layout and owns the data shared by everything below it.
///
/// ```rust,no_run
/// use keiro::{Route, RouteGroup};
///
/// let settings = RouteGroup::new("/settings")
///     .layout("SettingsLayout")
///     .fallback("SettingsIndex")
///     .routes([
///         Route::new("/profile").page("Profile"),
///         Route::new("/security").page("Security"),
///     ]);
/// ```
pub struct RouteGroup<C> {
    pub(crate) init: RoutableInit<C>,
    pub(crate) layout: Option<C>,
    pub(crate) routes: Vec<Routes<C>>,
    pub(crate) lazy: Option<Task<(), Module<Routes<C>>>>,
}

impl_routable_builder!(RouteGroup);

impl<C: Clone + 'static> RouteGroup<C> {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            init: RoutableInit::new(path),
            layout: None,
            routes: Vec::new(),
            lazy: None,
        }
    }

    pub fn layout(mut self, component: C) -> Self {
        self.layout = Some(component);
        self
    }

    /// Appends child declarations. Nested lists are flattened.
    pub fn routes<I>(mut self, routes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Routes<C>>,
    {
        self.routes.extend(routes.into_iter().map(Into::into));
        self
    }

    /// Loads the children on first resolution. Once loaded they stay part
    /// of the tree for the lifetime of the router; until then the group has
    /// no children and can only render its fallback.
    pub fn lazy<F, Fut>(mut self, import: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Routes<C>>> + 'static,
    {
        self.lazy = Some(Task::new(move |()| {
            let future = import();
            async move { anyhow::Ok(Module::new(future.await?)) }
        }));
        self
    }
}

/// Group-specific state stored in the route arena.
pub(crate) struct GroupKind<C> {
    pub(crate) layout: Option<C>,
    /// Children in declaration order.
    pub(crate) routes: Vec<RouteId>,
    pub(crate) lazy: Option<Task<(), Module<Routes<C>>>>,
    /// Whether the lazy children have been inserted into the arena.
    pub(crate) loaded: bool,
}

/// The pass of the child search a candidate takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Route,
    Group,
    GroupFallback,
}

impl<C: Clone + 'static> RouteTree<C> {
    /// Resolves the group `id` against `pathname`.
    ///
    /// Returns `None` when the group's pattern rejects the path, or when no
    /// descendant matches and `with_fallback` is off. In that case neither
    /// the group's loader nor any slot is touched.
    pub(crate) fn resolve_group(
        &mut self,
        id: RouteId,
        pathname: &str,
        with_fallback: bool,
        cx: &Context,
    ) -> Option<RouteNode<C>> {
        let found = self.get(id).pattern.exec(pathname)?;
        let routes_path = routes_path(pathname, found.remainder.as_deref());

        let (routes, lazy_error) = self.routes(id, cx);
        let children = self.resolve_children(&routes, pathname, cx);

        if children.is_none() && !with_fallback {
            return None;
        }

        tracing::trace!(
            group = %self.get(id).full_path,
            pathname,
            fallback = children.is_none(),
            "group matched"
        );

        let slots = self.resolve_slots(&routes, pathname, cx);

        let routable = self.get(id);
        let data = routable.get_data(
            LoadArgs {
                path: routes_path.clone(),
                params: found.params.clone(),
                search_params: cx.search.clone(),
            },
            cx,
        );
        let actions = routable.get_actions(cx);

        let children = children.unwrap_or_else(|| {
            let mut leaf = RouteNode::new(
                &routes_path,
                found.params.clone(),
                cx.search.clone(),
                Snapshot::empty(),
            );
            leaf.page = routable.fallback.clone();
            leaf
        });

        let mut node = RouteNode::new(&routes_path, found.params, cx.search.clone(), data);
        if let Kind::Group(kind) = &routable.kind {
            node.layout = kind.layout.clone();
        }
        node.children = Some(Box::new(children));
        node.slots = slots;
        node.actions = actions;
        if node.error.is_none() {
            node.error = lazy_error;
        }

        Some(node)
    }

    /// Three ordered passes over the primary children: leaf routes first,
    /// then groups with a matching descendant, then groups rendering their
    /// own fallback. The first hit wins.
    fn resolve_children(
        &mut self,
        routes: &[RouteId],
        pathname: &str,
        cx: &Context,
    ) -> Option<RouteNode<C>> {
        for pass in [Pass::Route, Pass::Group, Pass::GroupFallback] {
            for &child in routes {
                let routable = self.get(child);
                if routable.slot.is_some() {
                    continue;
                }
                let is_route = routable.is_route();

                let resolved = match pass {
                    Pass::Route if is_route => self.resolve_route(child, pathname, cx),
                    Pass::Group if !is_route => self.resolve_group(child, pathname, false, cx),
                    Pass::GroupFallback if !is_route => {
                        self.resolve_group(child, pathname, true, cx)
                    }
                    _ => None,
                };

                if resolved.is_some() {
                    return resolved;
                }
            }
        }

        None
    }

    /// Resolves every slot child on its own. Slots never take part in the
    /// primary search.
    fn resolve_slots(
        &mut self,
        routes: &[RouteId],
        pathname: &str,
        cx: &Context,
    ) -> BTreeMap<String, RouteNode<C>> {
        let mut slots = BTreeMap::new();

        for &child in routes {
            let Some(name) = self.get(child).slot.clone() else {
                continue;
            };

            if let Some(node) = self.resolve(child, pathname, false, cx) {
                slots.insert(name, node);
            }
        }

        slots
    }

    /// Children of the group `id`, materializing lazy children once their
    /// module has loaded. Also returns the lazy module's error, if any.
    fn routes(&mut self, id: RouteId, cx: &Context) -> (Vec<RouteId>, Option<TaskError>) {
        let Kind::Group(kind) = &self.get(id).kind else {
            return (Vec::new(), None);
        };

        let lazy = match &kind.lazy {
            Some(lazy) if !kind.loaded => lazy.clone(),
            _ => return (kind.routes.clone(), None),
        };

        let snapshot = lazy.cache(&(), cx.on_change());
        if snapshot.error.is_some() {
            return (Vec::new(), snapshot.error);
        }
        let Some(module) = snapshot.data else {
            return (Vec::new(), None);
        };

        let inserted = match module.take() {
            Some(routes) => self.normalize(id, routes).unwrap_or_else(|err| {
                tracing::warn!(group = %self.get(id).full_path, "lazy routes rejected: {err}");
                Vec::new()
            }),
            None => Vec::new(),
        };

        tracing::debug!(
            group = %self.get(id).full_path,
            count = inserted.len(),
            "lazy routes loaded"
        );

        match &mut self.get_mut(id).kind {
            Kind::Group(kind) => {
                kind.routes.extend(inserted);
                kind.loaded = true;
                (kind.routes.clone(), None)
            }
            Kind::Route(_) => (Vec::new(), None),
        }
    }
}

/// The prefix a group matched, without its nested remainder and without a
/// trailing slash.
fn routes_path(pathname: &str, remainder: Option<&str>) -> String {
    let prefix = match remainder {
        Some(rest) => pathname.strip_suffix(rest).unwrap_or(pathname),
        None => pathname,
    };

    match prefix.trim_end_matches('/') {
        "" => "/".to_string(),
        prefix => prefix.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SearchParams;
    use crate::route::Route;
    use crate::routable::Updater;
    use std::cell::Cell;
    use std::rc::Rc;
    use tokio::task::LocalSet;

    fn context() -> Context {
        Context {
            search: SearchParams::new(),
            updater: Updater::new(|| {}),
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn counter() -> (Rc<Cell<u32>>, impl Fn(LoadArgs) -> std::future::Ready<anyhow::Result<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let load = {
            let calls = calls.clone();
            move |_: LoadArgs| {
                calls.set(calls.get() + 1);
                std::future::ready(anyhow::Ok(calls.get()))
            }
        };
        (calls, load)
    }

    #[test]
    fn test_routes_path() {
        assert_eq!(routes_path("/x/y", Some("y")), "/x");
        assert_eq!(routes_path("/x", None), "/x");
        assert_eq!(routes_path("/x/", None), "/x");
        assert_eq!(routes_path("/a/b", Some("a/b")), "/");
        assert_eq!(routes_path("/", None), "/");
    }

    #[test]
    fn test_route_wins_over_group() {
        let mut tree = RouteTree::new(RouteGroup::new("/").routes([
            Routes::from(RouteGroup::new("/a").routes([Route::new("/").page("Nested")])),
            Routes::from(Route::new("/a").page("Leaf")),
        ]))
        .unwrap();

        let node = tree.resolve(tree.root(), "/a", true, &context()).unwrap();
        assert_eq!(node.children.unwrap().page, Some("Leaf"));
    }

    #[test]
    fn test_group_with_match_wins_over_fallback() {
        let mut tree = RouteTree::new(RouteGroup::new("/").routes([
            RouteGroup::new("/docs").fallback("DocsIndex"),
            RouteGroup::new("/docs").layout("Docs").routes([Route::new("/intro").page("Intro")]),
        ]))
        .unwrap();

        let node = tree.resolve(tree.root(), "/docs/intro", true, &context()).unwrap();
        let docs = node.children.unwrap();
        assert_eq!(docs.layout, Some("Docs"));
        assert_eq!(docs.path, "/docs");
        assert_eq!(docs.children.unwrap().page, Some("Intro"));
    }

    #[test]
    fn test_fallback_at_deepest_matching_group() {
        let mut tree = RouteTree::new(RouteGroup::new("/").fallback("NotFound").routes([
            RouteGroup::new("/docs")
                .layout("Docs")
                .fallback("DocsIndex")
                .routes([Route::new("/intro").page("Intro")]),
        ]))
        .unwrap();

        let node = tree.resolve(tree.root(), "/docs/missing", true, &context()).unwrap();
        let docs = node.children.unwrap();
        assert_eq!(docs.layout, Some("Docs"));
        assert_eq!(docs.children.unwrap().page, Some("DocsIndex"));

        let node = tree.resolve(tree.root(), "/elsewhere", true, &context()).unwrap();
        let leaf = node.children.unwrap();
        assert_eq!(leaf.page, Some("NotFound"));
        assert!(!leaf.loading);
    }

    #[test]
    fn test_no_match_without_fallback() {
        let mut tree = RouteTree::new(
            RouteGroup::new("/").routes([RouteGroup::new("/docs").routes([Route::new("/a").page("A")])]),
        )
        .unwrap();
        let docs = tree.children(tree.root())[0];

        assert!(tree.resolve(docs, "/docs/b", false, &context()).is_none());
        assert!(tree.resolve(tree.root(), "/other", false, &context()).is_none());

        // from the root, the matching group is retried with its fallback
        let node = tree.resolve(tree.root(), "/docs/b", false, &context()).unwrap();
        let docs = node.children.unwrap();
        assert_eq!(docs.path, "/docs");
        assert!(docs.children.unwrap().page.is_none());
    }

    #[tokio::test]
    async fn test_no_loader_for_unmatched_branch() {
        LocalSet::new()
            .run_until(async {
                let (calls, load) = counter();
                let mut tree = RouteTree::new(RouteGroup::new("/").routes([
                    RouteGroup::new("/x").load(load).routes([Route::new("/y").page("P")]),
                    RouteGroup::new("/z").routes([Route::new("/w").page("W")]),
                ]))
                .unwrap();
                let root = tree.root();
                let x = tree.children(root)[0];

                tree.resolve(root, "/z/w", true, &context()).unwrap();
                assert!(tree.resolve(x, "/x/nothing", false, &context()).is_none());
                assert!(tree.resolve(root, "/other", false, &context()).is_none());
                settle().await;
                assert_eq!(calls.get(), 0);

                tree.resolve(root, "/x/y", true, &context()).unwrap();
                settle().await;
                assert_eq!(calls.get(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn test_sibling_group_without_match_never_loads() {
        LocalSet::new()
            .run_until(async {
                let (calls, load) = counter();
                let mut tree = RouteTree::new(RouteGroup::new("/").routes([
                    RouteGroup::new("/x")
                        .layout("First")
                        .load(load)
                        .routes([Route::new("/z").page("Z")]),
                    RouteGroup::new("/x").layout("Second").routes([Route::new("/y").page("Y")]),
                ]))
                .unwrap();

                let node = tree.resolve(tree.root(), "/x/y", true, &context()).unwrap();
                let group = node.children.unwrap();
                assert_eq!(group.layout, Some("Second"));
                assert_eq!(group.children.unwrap().page, Some("Y"));

                settle().await;
                assert_eq!(calls.get(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn test_group_loader_receives_matched_prefix() {
        LocalSet::new()
            .run_until(async {
                let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
                let mut tree = RouteTree::new(RouteGroup::new("/").routes([
                    RouteGroup::new("/users/:id")
                        .load({
                            let seen = seen.clone();
                            move |args: LoadArgs| {
                                seen.borrow_mut().push(args.path.clone());
                                async move { anyhow::Ok(args.params["id"].clone()) }
                            }
                        })
                        .routes([Route::new("/posts").page("Posts")]),
                ]))
                .unwrap();

                let node = tree.resolve(tree.root(), "/users/3/posts", true, &context()).unwrap();
                let user = node.children.unwrap();
                assert!(user.loading);
                assert_eq!(user.params["id"], "3");

                settle().await;
                let node = tree.resolve(tree.root(), "/users/3/posts", true, &context()).unwrap();
                assert_eq!(node.children.unwrap().data, Some(serde_json::json!("3")));
                assert_eq!(*seen.borrow(), vec!["/users/3".to_string()]);
            })
            .await;
    }

    #[test]
    fn test_slots_resolve_independently() {
        let mut tree = RouteTree::new(RouteGroup::new("/").routes([
            Routes::from(Route::new("/item/:id").page("Item")),
            Routes::from(Route::new("/item/:id").slot("modal").page("Modal")),
        ]))
        .unwrap();

        let node = tree.resolve(tree.root(), "/item/5", true, &context()).unwrap();
        assert_eq!(node.children.unwrap().page, Some("Item"));
        assert_eq!(node.slots["modal"].page, Some("Modal"));
    }

    #[test]
    fn test_slot_never_competes_for_primary_child() {
        let mut tree = RouteTree::new(
            RouteGroup::new("/")
                .fallback("Home")
                .routes([Route::new("/").slot("sidebar").page("Sidebar")]),
        )
        .unwrap();

        let node = tree.resolve(tree.root(), "/", true, &context()).unwrap();
        assert_eq!(node.children.unwrap().page, Some("Home"));
        assert_eq!(node.slots["sidebar"].page, Some("Sidebar"));
    }

    #[tokio::test]
    async fn test_lazy_children() {
        LocalSet::new()
            .run_until(async {
                let imports = Rc::new(Cell::new(0));
                let mut tree = RouteTree::new(RouteGroup::new("/").routes([
                    RouteGroup::new("/admin").fallback("Loading").lazy({
                        let imports = imports.clone();
                        move || {
                            imports.set(imports.get() + 1);
                            async {
                                anyhow::Ok(Routes::from(vec![
                                    Route::new("/users").page("Users"),
                                    Route::new("/logs").page("Logs"),
                                ]))
                            }
                        }
                    }),
                ]))
                .unwrap();
                let root = tree.root();

                let node = tree.resolve(root, "/admin/users", true, &context()).unwrap();
                assert_eq!(node.children.unwrap().children.unwrap().page, Some("Loading"));

                settle().await;
                let node = tree.resolve(root, "/admin/users", true, &context()).unwrap();
                assert_eq!(node.children.unwrap().children.unwrap().page, Some("Users"));

                let node = tree.resolve(root, "/admin/logs", true, &context()).unwrap();
                assert_eq!(node.children.unwrap().children.unwrap().page, Some("Logs"));
                assert_eq!(imports.get(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn test_lazy_children_failure_surfaces_on_group() {
        LocalSet::new()
            .run_until(async {
                let mut tree = RouteTree::new(RouteGroup::new("/").routes([
                    RouteGroup::new("/admin")
                        .fallback("Unavailable")
                        .lazy(|| async { Err::<Routes<&str>, _>(anyhow::anyhow!("chunk failed")) }),
                ]))
                .unwrap();
                let root = tree.root();

                tree.resolve(root, "/admin/users", true, &context()).unwrap();
                settle().await;

                let node = tree.resolve(root, "/admin/users", true, &context()).unwrap();
                let admin = node.children.unwrap();
                assert_eq!(admin.error.unwrap().to_string(), "chunk failed");
                assert_eq!(admin.children.unwrap().page, Some("Unavailable"));
            })
            .await;
    }
}
