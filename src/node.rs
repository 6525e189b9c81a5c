use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::core::{Hash32, Params, SearchParams};
use crate::error::TaskError;
use crate::routable::Action;
use crate::task::Snapshot;

/// One level of a resolved route tree, ready to be rendered.
///
/// Produced fresh by every resolution pass and never updated afterwards.
/// A group yields a node with a `layout` and exactly one `children` node; a
/// route or a fallback yields a leaf with a `page`.
#[derive(Debug, Clone)]
pub struct RouteNode<C> {
    /// Content fingerprint over `path`, `search_params` and this node's own
    /// loader state. Two passes over an unchanged tree produce equal hashes.
    pub hash: String,
    pub path: String,
    pub page: Option<C>,
    pub layout: Option<C>,
    pub data: Option<Value>,
    pub loading: bool,
    pub error: Option<TaskError>,
    pub params: Params,
    pub search_params: SearchParams,
    pub children: Option<Box<RouteNode<C>>>,
    pub slots: BTreeMap<String, RouteNode<C>>,
    pub actions: BTreeMap<String, Action>,
}

impl<C> RouteNode<C> {
    pub(crate) fn new(
        path: &str,
        params: Params,
        search_params: SearchParams,
        data: Snapshot<Value>,
    ) -> Self {
        let state = json!({
            "loading": data.loading,
            "data": data.data,
            "error": data.error.as_ref().map(ToString::to_string),
        });
        let hash = Hash32::hash(format!("{path}?{search_params}#{state}")).to_hex();

        Self {
            hash,
            path: path.to_string(),
            page: None,
            layout: None,
            data: data.data,
            loading: data.loading,
            error: data.error,
            params,
            search_params,
            children: None,
            slots: BTreeMap::new(),
            actions: BTreeMap::new(),
        }
    }

    /// Deserializes the loader data.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
        self.data.clone().map(serde_json::from_value)
    }

    /// The chain of primary nodes from this one down to the leaf.
    pub fn chain(&self) -> impl Iterator<Item = &RouteNode<C>> {
        std::iter::successors(Some(self), |node| node.children.as_deref())
    }

    /// The deepest node of the primary chain.
    pub fn leaf(&self) -> &RouteNode<C> {
        self.chain().last().unwrap_or(self)
    }
}
