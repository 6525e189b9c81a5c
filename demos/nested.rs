use std::rc::Rc;
use std::time::Duration;

use keiro::{MemoryHistory, Route, RouteGroup, RouteNode, Router, Routes};
use serde_json::json;

/// This example demonstrates nested layouts, a slot, a lazily loaded route
/// list and an action.
///
/// The route tree looks like this:
/// /                      Shell
/// ├── /                  Home
/// ├── /item/:id          Item, plus a "modal" slot
/// └── /admin             Admin (children loaded on first visit)
///     ├── /users         Users
///     └── /audit         Audit

type View = &'static str;

fn print(node: &RouteNode<View>, depth: usize) {
    let view = node.layout.or(node.page).unwrap_or("-");
    println!("{}{} [{}] {:?}", "  ".repeat(depth), view, node.path, node.data);

    for (name, slot) in &node.slots {
        println!("{}@{name}:", "  ".repeat(depth + 1));
        print(slot, depth + 2);
    }
    if let Some(child) = &node.children {
        print(child, depth + 1);
    }
}

fn admin() -> Routes<View> {
    Routes::from(vec![
        Route::new("/users").page("Users"),
        Route::new("/audit").page("Audit"),
    ])
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let local = tokio::task::LocalSet::new();

    local
        .run_until(async {
            // ---------------------------------------------------------------
            // 1. Declare the tree
            // ---------------------------------------------------------------
            let routes = [
                Routes::from(Route::new("/").page("Home")),
                Routes::from(Route::new("/item/:id").page("Item").action(
                    "rename",
                    |name: String| async move { anyhow::Ok(json!({ "renamed": name })) },
                )),
                Routes::from(Route::new("/item/:id").slot("modal").page("ItemModal")),
                Routes::from(
                    RouteGroup::new("/admin")
                        .layout("Admin")
                        .fallback("AdminLoading")
                        .load(|args| async move { anyhow::Ok(json!({ "section": args.path })) })
                        .lazy(|| async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            anyhow::Ok(admin())
                        }),
                ),
            ];

            // ---------------------------------------------------------------
            // 2. Build the router on top of an in-memory history
            // ---------------------------------------------------------------
            let history = Rc::new(MemoryHistory::new("/"));
            let router = Router::builder()
                .layout("Shell")
                .fallback("NotFound")
                .routes(routes)
                .history(history.clone())
                .build()?;

            router.subscribe(|tree| {
                if let Some(tree) = tree {
                    print(tree, 0);
                    println!();
                }
            });

            // ---------------------------------------------------------------
            // 3. Primary route and slot resolve side by side
            // ---------------------------------------------------------------
            router.push("/item/5")?;
            tokio::time::sleep(Duration::from_millis(5)).await;

            if let Some(tree) = router.resolve_now() {
                let rename = tree.leaf().actions["rename"].clone();
                let outcome = rename.call("Fancy item").await;
                println!("rename -> {:?}", outcome.data);
            }

            // ---------------------------------------------------------------
            // 4. The admin routes arrive on first visit
            // ---------------------------------------------------------------
            router.push("/admin/audit")?;
            tokio::time::sleep(Duration::from_millis(50)).await;

            // ---------------------------------------------------------------
            // 5. History moves re-resolve the tree as well
            // ---------------------------------------------------------------
            router.back();
            tokio::time::sleep(Duration::from_millis(5)).await;
            println!("history: {:?}", history.entries());
            println!("{}", router.tree());

            anyhow::Ok(())
        })
        .await
}
