//! Shared utilities for the router scenario tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;

use anyhow::Context;
use keiro::{LoadArgs, RouteNode, Router};
use tokio::sync::oneshot;

/// Lets every spawned task run until nothing is left to do.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Runs `test` inside a `LocalSet`, which every router needs.
pub async fn local<F: Future>(test: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(test).await
}

/// Subscriber keeping every tree the router delivered.
pub struct Recorder {
    trees: Rc<RefCell<Vec<Option<RouteNode<&'static str>>>>>,
}

impl Recorder {
    pub fn attach(router: &Router<&'static str>) -> Self {
        let trees = Rc::new(RefCell::new(Vec::new()));
        router.subscribe({
            let trees = trees.clone();
            move |tree: Option<&RouteNode<&'static str>>| trees.borrow_mut().push(tree.cloned())
        });
        Self { trees }
    }

    #[allow(dead_code)]
    pub fn count(&self) -> usize {
        self.trees.borrow().len()
    }

    /// The most recent tree. Panics if nothing was delivered or the root
    /// did not match.
    pub fn last(&self) -> RouteNode<&'static str> {
        self.trees
            .borrow()
            .last()
            .cloned()
            .flatten()
            .expect("no tree delivered")
    }
}

/// Loader returning `value` and counting its invocations.
#[allow(dead_code)]
pub fn counted<T>(
    value: T,
) -> (
    Rc<Cell<u32>>,
    impl Fn(LoadArgs) -> std::future::Ready<anyhow::Result<T>> + 'static,
)
where
    T: Clone + 'static,
{
    let calls = Rc::new(Cell::new(0));
    let load = {
        let calls = calls.clone();
        move |_: LoadArgs| {
            calls.set(calls.get() + 1);
            std::future::ready(anyhow::Ok(value.clone()))
        }
    };
    (calls, load)
}

/// Loader whose runs finish only when the test sends their result, in the
/// order the runs were started.
#[allow(dead_code)]
pub struct Controlled {
    pending: Rc<RefCell<VecDeque<oneshot::Receiver<String>>>>,
}

#[allow(dead_code)]
impl Controlled {
    pub fn new() -> Self {
        Self {
            pending: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Prepares the next run and returns the sender that completes it.
    pub fn expect_run(&self) -> oneshot::Sender<String> {
        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().push_back(rx);
        tx
    }

    pub fn loader(
        &self,
    ) -> impl Fn(LoadArgs) -> std::pin::Pin<Box<dyn Future<Output = anyhow::Result<String>>>> + 'static
    {
        let pending = self.pending.clone();
        move |_: LoadArgs| {
            let rx = pending.borrow_mut().pop_front();
            Box::pin(async move {
                let rx = rx.context("unexpected loader run")?;
                anyhow::Ok(rx.await?)
            })
        }
    }
}
