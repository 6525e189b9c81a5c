//! Navigation, invalidation and concurrency through a router.

use std::rc::Rc;

use keiro::{MemoryHistory, Route, RouteGroup, Router, Routes, Snapshot, task};
use serde_json::json;

mod common;
use common::{Controlled, Recorder, counted, local, settle};

fn settings_app(
    load_app: impl Fn(keiro::LoadArgs) -> std::future::Ready<anyhow::Result<&'static str>> + 'static,
    load_settings: impl Fn(keiro::LoadArgs) -> std::future::Ready<anyhow::Result<&'static str>> + 'static,
) -> Router<&'static str> {
    Router::builder()
        .routes([RouteGroup::new("/app").layout("App").load(load_app).routes([
            Routes::from(Route::new("/home").page("Home")),
            Routes::from(
                RouteGroup::new("/settings")
                    .layout("Settings")
                    .load(load_settings)
                    .routes([Route::new("/profile").page("Profile")]),
            ),
        ])])
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_leaving_a_subtree_invalidates_only_that_subtree() {
    local(async {
        let (app_calls, load_app) = counted("app");
        let (settings_calls, load_settings) = counted("settings");
        let router = settings_app(load_app, load_settings);
        let recorder = Recorder::attach(&router);

        router.push("/app/settings/profile").unwrap();
        settle().await;
        assert_eq!((app_calls.get(), settings_calls.get()), (1, 1));

        router.push("/app/home").unwrap();
        settle().await;
        assert_eq!(recorder.last().leaf().page, Some("Home"));

        router.push("/app/settings/profile").unwrap();
        settle().await;

        // /app stayed mounted the whole time, /app/settings was left once
        assert_eq!(app_calls.get(), 1);
        assert_eq!(settings_calls.get(), 2);
    })
    .await;
}

#[tokio::test]
async fn test_invalidate_spares_siblings() {
    local(async {
        let (app_calls, load_app) = counted("app");
        let (settings_calls, load_settings) = counted("settings");
        let router = settings_app(load_app, load_settings);

        router.push("/app/settings/profile").unwrap();
        settle().await;

        router.invalidate("/app/home");
        settle().await;
        assert_eq!((app_calls.get(), settings_calls.get()), (1, 1));

        router.invalidate("/app/settings");
        settle().await;
        assert_eq!((app_calls.get(), settings_calls.get()), (1, 2));

        router.invalidate("/app");
        settle().await;
        assert_eq!((app_calls.get(), settings_calls.get()), (2, 3));
    })
    .await;
}

#[tokio::test]
async fn test_back_returns_to_previous_tree() {
    local(async {
        let history = Rc::new(MemoryHistory::new("/app/home"));
        let router = Router::builder()
            .routes([RouteGroup::new("/app").routes([
                Route::new("/home").page("Home"),
                Route::new("/about").page("About"),
            ])])
            .history(history.clone())
            .build()
            .unwrap();
        let recorder = Recorder::attach(&router);
        settle().await;
        assert_eq!(recorder.last().leaf().page, Some("Home"));

        router.push("/app/about").unwrap();
        settle().await;
        router.back();
        settle().await;

        assert_eq!(recorder.last().leaf().page, Some("Home"));
        assert_eq!(history.entries(), ["/app/home", "/app/about"]);
        assert_eq!(recorder.count(), 3);
    })
    .await;
}

#[tokio::test]
async fn test_stale_loader_result_is_dropped() {
    local(async {
        let controlled = Controlled::new();
        let router = Router::builder()
            .routes([Route::new("/users/:id").page("User").load(controlled.loader())])
            .build()
            .unwrap();
        let recorder = Recorder::attach(&router);

        let first = controlled.expect_run();
        let second = controlled.expect_run();

        router.push("/users/1").unwrap();
        settle().await;
        router.push("/users/2").unwrap();
        settle().await;
        assert!(recorder.last().leaf().loading);

        second.send("user 2".into()).unwrap();
        settle().await;
        assert_eq!(recorder.last().leaf().data, Some(json!("user 2")));

        // the first run finishes last and must not overwrite the second
        first.send("user 1".into()).unwrap();
        settle().await;
        let leaf = router.resolve_now().unwrap().leaf().clone();
        assert_eq!(leaf.data, Some(json!("user 2")));
        assert!(!leaf.loading);
    })
    .await;
}

#[tokio::test]
async fn test_outdated_run_resolves_to_winner() {
    local(async {
        let controlled = Controlled::new();
        let loader = controlled.loader();
        let task = task(move |id: u32| {
            loader(keiro::LoadArgs {
                path: format!("/users/{id}"),
                params: Default::default(),
                search_params: Default::default(),
            })
        });

        let first_tx = controlled.expect_run();
        let second_tx = controlled.expect_run();

        let first = task.run(1);
        let second = task.run(2);

        first_tx.send("one".into()).unwrap();
        second_tx.send("two".into()).unwrap();

        let first: Snapshot<String> = first.await;
        let second = second.await;
        assert_eq!(first.data.as_deref(), Some("two"));
        assert_eq!(second.data.as_deref(), Some("two"));
    })
    .await;
}

#[tokio::test]
async fn test_actions_report_through_the_tree() {
    local(async {
        let (_, load) = counted(json!({"likes": 0}));
        let router = Router::builder()
            .routes([Route::new("/post").page("Post").load(load).action(
                "like",
                |amount: u32| async move { anyhow::Ok(json!({"likes": amount})) },
            )])
            .build()
            .unwrap();
        let recorder = Recorder::attach(&router);

        router.push("/post").unwrap();
        settle().await;

        let like = recorder.last().leaf().actions["like"].clone();
        assert!(!like.loading());
        assert!(like.data().is_none());

        let outcome = like.call(3).await;
        assert_eq!(outcome.data, Some(json!({"likes": 3})));

        settle().await;
        let tree = recorder.last();
        let like = &tree.leaf().actions["like"];
        assert_eq!(like.data(), Some(&json!({"likes": 3})));

        // a malformed input fails the action, not the router
        let outcome = like.call("three").await;
        assert!(outcome.error.is_some());
        settle().await;
        assert!(recorder.last().leaf().actions["like"].error().is_some());

        // leaving the route clears its action state
        router.push("/").unwrap();
        router.push("/post").unwrap();
        settle().await;
        assert!(recorder.last().leaf().actions["like"].error().is_none());
    })
    .await;
}
