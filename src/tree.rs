//! Arena holding every declared route.
//!
//! Declarations are moved into a [`petgraph`] graph once, when the router is
//! built (or, for lazy groups, when their module arrives). Each entry knows
//! its parent by id; edges point from a group to its children.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::Dfs;

use crate::error::PatternError;
use crate::group::{GroupKind, RouteGroup};
use crate::node::RouteNode;
use crate::path::{compile_invalidate_pattern, join};
use crate::pattern::Pattern;
use crate::routable::{Context, Kind, Routable, RoutableInit};
use crate::route::{Route, RouteKind};

/// Stable handle to an entry of the [`RouteTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct RouteId(NodeIndex);

/// A possibly nested list of declarations.
pub enum Routes<C> {
    Route(Route<C>),
    Group(RouteGroup<C>),
    List(Vec<Routes<C>>),
}

impl<C> From<Route<C>> for Routes<C> {
    fn from(route: Route<C>) -> Self {
        Routes::Route(route)
    }
}

impl<C> From<RouteGroup<C>> for Routes<C> {
    fn from(group: RouteGroup<C>) -> Self {
        Routes::Group(group)
    }
}

impl<C, T> From<Vec<T>> for Routes<C>
where
    T: Into<Routes<C>>,
{
    fn from(list: Vec<T>) -> Self {
        Routes::List(list.into_iter().map(Into::into).collect())
    }
}

/// A loaded value that can be moved out exactly once, while the handle
/// itself stays cloneable for the task cache.
pub(crate) struct Module<T>(Rc<RefCell<Option<T>>>);

impl<T> Module<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(Some(value))))
    }

    pub(crate) fn take(&self) -> Option<T> {
        self.0.borrow_mut().take()
    }
}

impl<T> Clone for Module<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

type Parts<C> = (RoutableInit<C>, Kind<C>, Vec<Routes<C>>);

fn route_parts<C>(route: Route<C>) -> Parts<C> {
    let kind = Kind::Route(RouteKind {
        page: route.page,
        lazy: route.lazy,
    });
    (route.init, kind, Vec::new())
}

fn group_parts<C>(group: RouteGroup<C>) -> Parts<C> {
    let kind = Kind::Group(GroupKind {
        layout: group.layout,
        routes: Vec::new(),
        loaded: group.lazy.is_none(),
        lazy: group.lazy,
    });
    (group.init, kind, group.routes)
}

/// The route declarations of a router, stored in an arena.
pub(crate) struct RouteTree<C> {
    graph: Graph<Routable<C>, ()>,
    root: RouteId,
}

impl<C: Clone + 'static> RouteTree<C> {
    /// Builds the arena from the root group, compiling every pattern.
    pub(crate) fn new(root: RouteGroup<C>) -> Result<Self, PatternError> {
        let mut tree = Self {
            graph: Graph::new(),
            root: RouteId(NodeIndex::new(0)),
        };

        tree.root = tree.attach(None, group_parts(root))?;
        tracing::debug!(routes = tree.graph.node_count(), "route tree built");

        Ok(tree)
    }

    pub(crate) fn root(&self) -> RouteId {
        self.root
    }

    pub(crate) fn get(&self, id: RouteId) -> &Routable<C> {
        &self.graph[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: RouteId) -> &mut Routable<C> {
        &mut self.graph[id.0]
    }

    /// Children of a group in declaration order. Empty for routes and for
    /// lazy groups that have not loaded yet.
    #[cfg(test)]
    pub(crate) fn children(&self, id: RouteId) -> Vec<RouteId> {
        match &self.get(id).kind {
            Kind::Group(kind) => kind.routes.clone(),
            Kind::Route(_) => Vec::new(),
        }
    }

    /// Moves `routes` into the arena below `parent`, flattening nested lists.
    /// Either every declaration is inserted or none is.
    pub(crate) fn normalize(
        &mut self,
        parent: RouteId,
        routes: Routes<C>,
    ) -> Result<Vec<RouteId>, PatternError> {
        let before = self.graph.node_count();
        let mut ids = Vec::new();

        if let Err(err) = self.normalize_into(parent, routes, &mut ids) {
            // removing from the back keeps every earlier index valid
            for index in (before..self.graph.node_count()).rev() {
                self.graph.remove_node(NodeIndex::new(index));
            }
            return Err(err);
        }

        Ok(ids)
    }

    fn normalize_into(
        &mut self,
        parent: RouteId,
        routes: Routes<C>,
        ids: &mut Vec<RouteId>,
    ) -> Result<(), PatternError> {
        match routes {
            Routes::List(list) => {
                for routes in list {
                    self.normalize_into(parent, routes, ids)?;
                }
            }
            Routes::Route(route) => ids.push(self.attach(Some(parent), route_parts(route))?),
            Routes::Group(group) => ids.push(self.attach(Some(parent), group_parts(group))?),
        }

        Ok(())
    }

    /// Inserts a single declaration under `parent`, deriving its full path,
    /// its match pattern and its invalidate pattern from the parent. A slot
    /// takes its parent's pattern as is. Children of a group follow.
    fn attach(
        &mut self,
        parent: Option<RouteId>,
        (init, kind, children): Parts<C>,
    ) -> Result<RouteId, PatternError> {
        let full_path = match parent {
            Some(parent) => join(&[&self.get(parent).full_path, &init.path]),
            None => join(&["/", &init.path]),
        };

        let pattern = match (&init.slot, parent) {
            (Some(_), Some(parent)) => self.get(parent).pattern.clone(),
            _ => match &kind {
                Kind::Route(_) => Pattern::compile(&full_path)?,
                Kind::Group(_) => Pattern::nested(&full_path)?,
            },
        };
        let invalidate = compile_invalidate_pattern(&full_path)?;

        let id = RouteId(self.graph.add_node(Routable {
            path: init.path,
            full_path,
            slot: init.slot,
            fallback: init.fallback,
            pattern,
            invalidate,
            load: init.load,
            actions: init.actions,
            parent,
            kind,
        }));

        if let Some(parent) = parent {
            self.graph.add_edge(parent.0, id.0, ());
        }

        let routable = self.get(id);
        tracing::trace!(
            path = %routable.path,
            full_path = %routable.full_path,
            pattern = routable.pattern.as_str(),
            slot = ?routable.slot,
            "route attached"
        );

        if !children.is_empty() {
            let ids = self.normalize(id, Routes::List(children))?;
            if let Kind::Group(kind) = &mut self.get_mut(id).kind {
                kind.routes = ids;
            }
        }

        Ok(id)
    }

    /// Resolves the entry `id` against `pathname`. `with_fallback` only
    /// affects groups.
    pub(crate) fn resolve(
        &mut self,
        id: RouteId,
        pathname: &str,
        with_fallback: bool,
        cx: &Context,
    ) -> Option<RouteNode<C>> {
        if self.get(id).is_route() {
            self.resolve_route(id, pathname, cx)
        } else {
            self.resolve_group(id, pathname, with_fallback, cx)
        }
    }

    /// Clears the loader and action caches of every entry at `path` or below
    /// it: an entry matches when `path` is its full path or one of that full
    /// path's ancestors. Returns how many entries matched.
    pub(crate) fn invalidate(&self, path: &str) -> usize {
        let mut dfs = Dfs::new(&self.graph, self.root.0);
        let mut count = 0;

        while let Some(index) = dfs.next(&self.graph) {
            if self.graph[index].invalidate(path) {
                count += 1;
            }
        }

        tracing::debug!(path, count, "invalidated");
        count
    }
}

impl<C> fmt::Display for RouteTree<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph TD")?;

        for index in self.graph.node_indices() {
            let routable = &self.graph[index];
            let mut label = routable.full_path.replace('"', "\\\"");
            if let Some(slot) = &routable.slot {
                label.push_str(&format!(" @{slot}"));
            }
            if routable.load.is_some() {
                label.push_str(" +load");
            }

            match &routable.kind {
                Kind::Route(_) => writeln!(f, "    {}(\"{}\")", index.index(), label)?,
                Kind::Group(kind) if !kind.loaded => {
                    writeln!(f, "    {}[[\"{} +lazy\"]]", index.index(), label)?
                }
                Kind::Group(_) => writeln!(f, "    {}[\"{}\"]", index.index(), label)?,
            }
        }

        for index in self.graph.node_indices() {
            if let Some(parent) = self.graph[index].parent {
                writeln!(f, "    {} --> {}", parent.0.index(), index.index())?;
            }
        }

        Ok(())
    }
}
