use std::time::Duration;

use keiro::{Route, RouteNode, Router, Routes};
use serde::{Deserialize, Serialize};

/// This example demonstrates a flat router with a data loader.
///
/// It shows how to:
/// 1. Declare routes with pages and loaders.
/// 2. Build the router inside a `LocalSet`.
/// 3. Subscribe to resolved trees.
/// 4. Navigate and watch a loader go from loading to loaded.

// Components are opaque to the router, any `Clone + 'static` value works.
#[derive(Clone, Copy, Debug)]
enum View {
    Shell,
    Home,
    Post,
    NotFound,
}

#[derive(Clone, Serialize, Deserialize)]
struct Post {
    id: String,
    title: String,
}

fn render(tree: &RouteNode<View>) {
    for node in tree.chain() {
        let view = node.layout.or(node.page);
        let state = match (&node.error, node.loading) {
            (Some(err), _) => format!("error: {err}"),
            (None, true) => "loading".to_string(),
            (None, false) => node.data.as_ref().map(ToString::to_string).unwrap_or_default(),
        };
        println!("{:>12} {:<10?} {}", node.path, view, state);
    }
    println!();
}

fn main() -> anyhow::Result<()> {
    tracing_init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async {
        // -------------------------------------------------------------------
        // 1. Declare the routes
        // -------------------------------------------------------------------
        // The loader runs once per distinct set of arguments and its result
        // is cached until the route is left or invalidated.
        let routes = [
            Routes::from(Route::new("/").page(View::Home)),
            Routes::from(Route::new("/posts/:id").page(View::Post).load(|args| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let id = args.params["id"].clone();
                anyhow::Ok(Post {
                    title: format!("Post number {id}"),
                    id,
                })
            })),
        ];

        // -------------------------------------------------------------------
        // 2. Build the router
        // -------------------------------------------------------------------
        let router = Router::builder()
            .layout(View::Shell)
            .fallback(View::NotFound)
            .routes(routes)
            .build()?;

        // -------------------------------------------------------------------
        // 3. Subscribe
        // -------------------------------------------------------------------
        router.subscribe(|tree| match tree {
            Some(tree) => render(tree),
            None => println!("nothing matched"),
        });

        // -------------------------------------------------------------------
        // 4. Navigate
        // -------------------------------------------------------------------
        tokio::time::sleep(Duration::from_millis(10)).await;
        router.push("/posts/42")?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let tree = router.resolve_now();
        if let Some(post) = tree.as_ref().map(|tree| tree.leaf().data_as::<Post>()) {
            println!("loaded: {}", post.transpose()?.map(|post| post.title).unwrap_or_default());
        }

        router.push("/missing")?;
        tokio::time::sleep(Duration::from_millis(10)).await;

        println!("{}", router.tree());
        anyhow::Ok(())
    })
}

#[cfg(feature = "logging")]
fn tracing_init() {
    keiro::logging::init();
}

#[cfg(not(feature = "logging"))]
fn tracing_init() {}
