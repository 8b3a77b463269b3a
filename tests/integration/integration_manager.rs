//! Remote integration lifecycle against in-memory collaborators.

use std::sync::atomic::Ordering;

use aios_client::integrations::{EnableOutcome, IntegrationError, IntegrationStatus};
use serde_json::json;

use crate::helpers::{MockRemote, app, connected_harness, harness, wait_until};

#[tokio::test]
async fn added_integration_starts_disabled_and_is_persisted() {
    let h = harness(&["crm"], MockRemote::with_tools(&["send_email"])).await;

    let record = h.manager.add_integration(app("crm")).await.unwrap();

    assert!(!record.enabled);
    let stored = h.store.snapshot();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored["crm"].app.name, "CRM");
    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Disconnected);
}

#[tokio::test]
async fn duplicate_add_is_rejected_without_writing() {
    let h = harness(&["crm"], MockRemote::with_tools(&[])).await;
    h.manager.add_integration(app("crm")).await.unwrap();

    let err = h.manager.add_integration(app("crm")).await.unwrap_err();

    assert!(matches!(err, IntegrationError::Config(ref m) if m.contains("already exists")));
    assert_eq!(h.store.snapshot().len(), 1);
    assert_eq!(h.store.saves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn enabling_without_identity_persists_but_does_not_connect() {
    let h = harness(&["crm"], MockRemote::with_tools(&["send_email"])).await;
    h.manager.add_integration(app("crm")).await.unwrap();

    let outcome = h.manager.set_enabled("crm", true, Some("   ")).await.unwrap();

    assert_eq!(outcome, EnableOutcome::IdentityRequired);
    assert!(h.store.snapshot()["crm"].enabled);
    assert_eq!(MockRemote::count(&h.remote.creates), 0);
    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Disconnected);
}

#[tokio::test]
async fn enable_with_identity_connects_and_loads_tools() {
    let h = connected_harness("crm", MockRemote::with_tools(&["send_email", "list_contacts"])).await;

    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Connected);
    let tools: Vec<String> = h.manager.active_tools("crm").into_iter().map(|t| t.name).collect();
    assert_eq!(tools, vec!["send_email", "list_contacts"]);
    assert_eq!(
        h.remote.endpoints.lock().unwrap().as_slice(),
        ["http://127.0.0.1:3010/v1/u1/crm"]
    );
}

#[tokio::test]
async fn disable_is_idempotent() {
    let h = connected_harness("crm", MockRemote::with_tools(&["send_email"])).await;
    let saves_before = h.store.saves.load(Ordering::SeqCst);

    let first = h.manager.set_enabled("crm", false, None).await.unwrap();
    let second = h.manager.set_enabled("crm", false, None).await.unwrap();

    assert_eq!(first, EnableOutcome::Disabled);
    assert_eq!(second, EnableOutcome::Unchanged);
    assert_eq!(h.store.saves.load(Ordering::SeqCst), saves_before + 1);
    assert_eq!(MockRemote::count(&h.remote.closes), 1);
    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Disconnected);
}

#[tokio::test]
async fn enabling_twice_while_connected_is_unchanged() {
    let h = connected_harness("crm", MockRemote::with_tools(&["send_email"])).await;

    let outcome = h.manager.set_enabled("crm", true, Some("u1")).await.unwrap();

    assert_eq!(outcome, EnableOutcome::Unchanged);
    assert_eq!(MockRemote::count(&h.remote.creates), 1);
}

#[tokio::test]
async fn failed_save_rolls_back_and_skips_connect() {
    let h = harness(&["crm"], MockRemote::with_tools(&["send_email"])).await;
    h.manager.add_integration(app("crm")).await.unwrap();
    h.store.fail_saves.store(true, Ordering::SeqCst);

    let err = h.manager.set_enabled("crm", true, Some("u1")).await.unwrap_err();

    assert!(matches!(err, IntegrationError::Storage(_)));
    assert!(!h.manager.configured_integration("crm").unwrap().enabled);
    assert_eq!(MockRemote::count(&h.remote.creates), 0);
}

#[tokio::test]
async fn connect_failure_is_reported_through_the_outcome() {
    let remote = MockRemote::with_tools(&["send_email"]);
    *remote.fail_connect.lock().unwrap() = Some("handshake refused".into());
    let h = harness(&["crm"], remote).await;
    h.manager.add_integration(app("crm")).await.unwrap();

    let outcome = h.manager.set_enabled("crm", true, Some("u1")).await.unwrap();

    match outcome {
        EnableOutcome::ConnectFailed { reason } => assert!(reason.contains("handshake refused")),
        other => panic!("expected ConnectFailed, got {other:?}"),
    }
    assert!(h.manager.configured_integration("crm").unwrap().enabled);
    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Disconnected);
    assert_eq!(MockRemote::count(&h.remote.closes), 1);
}

#[tokio::test]
async fn concurrent_connects_share_one_attempt() {
    let remote = MockRemote::with_tools(&["send_email"]);
    let h = harness(&["crm"], remote.clone()).await;
    h.manager.add_integration(app("crm")).await.unwrap();
    h.manager.set_enabled("crm", true, None).await.unwrap();
    let gate = remote.hold_connects();

    let first = tokio::spawn({
        let manager = h.manager.clone();
        async move { manager.connect("crm", "u1").await }
    });
    wait_until(|| MockRemote::count(&remote.connects) == 1).await;
    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Connecting);
    let second = tokio::spawn({
        let manager = h.manager.clone();
        async move { manager.connect("crm", "u1").await }
    });
    tokio::task::yield_now().await;
    gate.add_permits(1);

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(MockRemote::count(&remote.creates), 1);
    assert_eq!(MockRemote::count(&remote.connects), 1);
    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Connected);
}

#[tokio::test]
async fn concurrent_failure_reaches_every_waiter() {
    let remote = MockRemote::with_tools(&["send_email"]);
    *remote.fail_connect.lock().unwrap() = Some("bad gateway".into());
    let h = harness(&["crm"], remote.clone()).await;
    h.manager.add_integration(app("crm")).await.unwrap();
    h.manager.set_enabled("crm", true, None).await.unwrap();
    let gate = remote.hold_connects();

    let first = tokio::spawn({
        let manager = h.manager.clone();
        async move { manager.connect("crm", "u1").await }
    });
    wait_until(|| MockRemote::count(&remote.connects) == 1).await;
    let second = tokio::spawn({
        let manager = h.manager.clone();
        async move { manager.connect("crm", "u1").await }
    });
    tokio::task::yield_now().await;
    gate.add_permits(1);

    let first = first.await.unwrap().unwrap_err();
    assert!(first.to_string().contains("bad gateway"));
    // The second caller either joined the failed attempt or started a
    // fresh one after the entry was cleared; both fail the same way.
    gate.add_permits(1);
    let second = second.await.unwrap().unwrap_err();
    assert!(second.to_string().contains("bad gateway"));
    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Disconnected);
}

#[tokio::test]
async fn disconnect_during_connect_is_not_resurrected() {
    let remote = MockRemote::with_tools(&["send_email"]);
    let h = harness(&["crm"], remote.clone()).await;
    h.manager.add_integration(app("crm")).await.unwrap();
    h.manager.set_enabled("crm", true, None).await.unwrap();
    let gate = remote.hold_connects();

    let connecting = tokio::spawn({
        let manager = h.manager.clone();
        async move { manager.connect("crm", "u1").await }
    });
    wait_until(|| MockRemote::count(&remote.connects) == 1).await;

    let disconnecting = tokio::spawn({
        let manager = h.manager.clone();
        async move { manager.disconnect("crm").await }
    });
    wait_until(|| h.manager.connection_status("crm") == IntegrationStatus::Disconnected).await;
    gate.add_permits(1);

    let err = connecting.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("cancelled"), "{err}");
    disconnecting.await.unwrap();

    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Disconnected);
    assert!(h.manager.all_active_tools().is_empty());
    assert!(MockRemote::count(&remote.closes) >= 1);
}

#[tokio::test]
async fn disconnect_gives_up_waiting_after_timeout() {
    let remote = MockRemote::with_tools(&["send_email"]);
    let h = harness(&["crm"], remote.clone()).await;
    h.manager.add_integration(app("crm")).await.unwrap();
    h.manager.set_enabled("crm", true, None).await.unwrap();
    let _gate = remote.hold_connects();

    let _connecting = tokio::spawn({
        let manager = h.manager.clone();
        async move { manager.connect("crm", "u1").await }
    });
    wait_until(|| MockRemote::count(&remote.connects) == 1).await;

    // Never released: disconnect must still return and close the transport.
    h.manager.disconnect("crm").await;

    assert_eq!(MockRemote::count(&remote.closes), 1);
    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Disconnected);
}

#[tokio::test]
async fn connect_rejects_unknown_slug_and_missing_identity() {
    let h = harness(&["crm"], MockRemote::with_tools(&[])).await;
    h.manager.add_integration(app("crm")).await.unwrap();

    let unknown = h.manager.connect("nope", "u1").await.unwrap_err();
    assert_eq!(unknown, IntegrationError::NotConfigured("nope".into()));

    let no_user = h.manager.connect("crm", "").await.unwrap_err();
    assert!(matches!(no_user, IntegrationError::Config(_)));
}

#[tokio::test]
async fn connect_on_disabled_integration_is_a_no_op() {
    let h = harness(&["crm"], MockRemote::with_tools(&["send_email"])).await;
    h.manager.add_integration(app("crm")).await.unwrap();

    h.manager.connect("crm", "u1").await.unwrap();

    assert_eq!(MockRemote::count(&h.remote.creates), 0);
    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Disconnected);
}

#[tokio::test]
async fn reconnect_requires_a_known_enabled_integration() {
    let h = harness(&["crm"], MockRemote::with_tools(&["send_email"])).await;
    h.manager.add_integration(app("crm")).await.unwrap();

    assert_eq!(
        h.manager.reconnect("ghost", "u1").await.unwrap_err(),
        IntegrationError::NotConfigured("ghost".into())
    );
    assert_eq!(
        h.manager.reconnect("crm", "u1").await.unwrap_err(),
        IntegrationError::Disabled("crm".into())
    );
    assert_eq!(MockRemote::count(&h.remote.creates), 0);
}

#[tokio::test]
async fn reconnect_replaces_the_live_transport() {
    let h = connected_harness("crm", MockRemote::with_tools(&["send_email"])).await;

    h.manager.reconnect("crm", "u1").await.unwrap();

    assert_eq!(MockRemote::count(&h.remote.creates), 2);
    assert_eq!(MockRemote::count(&h.remote.closes), 1);
    assert_eq!(h.manager.connection_status("crm"), IntegrationStatus::Connected);
}

#[tokio::test]
async fn remove_disconnects_and_forgets() {
    let h = connected_harness("crm", MockRemote::with_tools(&["send_email"])).await;

    h.manager.remove_integration("crm").await.unwrap();

    assert!(h.manager.configured_integration("crm").is_none());
    assert!(h.store.snapshot().is_empty());
    assert_eq!(MockRemote::count(&h.remote.closes), 1);

    // Unknown slugs are a no-op.
    h.manager.remove_integration("crm").await.unwrap();
}

#[tokio::test]
async fn tools_are_qualified_and_sorted_across_integrations() {
    let remote = MockRemote::with_tools(&["send_email", "archive"]);
    let h = harness(&["mail", "crm"], remote).await;
    for slug in ["mail", "crm"] {
        h.manager.add_integration(app(slug)).await.unwrap();
        h.manager.set_enabled(slug, true, Some("u1")).await.unwrap();
    }

    let names: Vec<String> = h.manager.all_active_tools().into_iter().map(|t| t.name).collect();
    assert_eq!(
        names,
        vec![
            "remote__crm__archive",
            "remote__crm__send_email",
            "remote__mail__archive",
            "remote__mail__send_email",
        ]
    );

    let info = h.manager.connected_integrations_info();
    let slugs: Vec<&str> = info.iter().map(|d| d.name_slug.as_str()).collect();
    assert_eq!(slugs, vec!["crm", "mail"]);
    assert_eq!(info[0].display_name, "CRM");
    assert_eq!(info[0].icon_url.as_deref(), Some("https://logos.test/hid_crm"));
}

#[tokio::test]
async fn connect_all_enabled_and_disconnect_all() {
    let h = harness(&["crm", "mail", "docs"], MockRemote::with_tools(&["ping"])).await;
    for slug in ["crm", "mail", "docs"] {
        h.manager.add_integration(app(slug)).await.unwrap();
    }
    h.manager.set_enabled("crm", true, None).await.unwrap();
    h.manager.set_enabled("mail", true, None).await.unwrap();

    let mut results = h.manager.connect_all_enabled("u1").await;
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let slugs: Vec<&str> = results.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(slugs, vec!["crm", "mail"]);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(h.manager.connection_status("docs"), IntegrationStatus::Disconnected);

    h.manager.disconnect_all().await;

    assert_eq!(MockRemote::count(&h.remote.closes), 2);
    assert!(h.manager.connected_integrations_info().is_empty());
}

#[tokio::test]
async fn call_tool_reaches_the_transport() {
    let h = connected_harness("crm", MockRemote::with_tools(&["send_email"])).await;

    let result = h
        .manager
        .call_tool("crm", "send_email", json!({"to": "a@b.c"}))
        .await
        .unwrap();
    assert_eq!(result["echo"]["to"], "a@b.c");

    let err = h.manager.call_tool("crm", "explode", json!({})).await.unwrap_err();
    assert!(matches!(err, IntegrationError::ToolCall(_)));

    let calls = h.remote.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "send_email");
}

#[tokio::test]
async fn discovery_caches_results_and_degrades_when_offline() {
    let h = harness(&["crm", "mail"], MockRemote::with_tools(&[])).await;

    let page = h.manager.discover(Some("cr"), 0, None).await;
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.page_info.current_page, 1);
    assert!(page.page_info.has_more);
    assert_eq!(page.page_info.next_page, Some(2));
    assert!(h.manager.cached_metadata("crm").await.is_some());
    assert!(h.manager.cached_metadata("app_crm").await.is_some());

    h.catalog.offline.store(true, Ordering::SeqCst);
    let page = h.manager.discover(None, 3, Some("Productivity")).await;
    assert!(page.items.is_empty());
    assert!(!page.page_info.has_more);
    assert_eq!(page.page_info.current_page, 3);

    assert!(h.manager.fetch_app_metadata("mail").await.is_none());
}

#[tokio::test]
async fn connect_uses_stored_record_when_catalog_is_offline() {
    let h = harness(&[], MockRemote::with_tools(&["ping"])).await;
    h.catalog.offline.store(true, Ordering::SeqCst);
    h.manager.add_integration(app("crm")).await.unwrap();

    let outcome = h.manager.set_enabled("crm", true, Some("u1")).await.unwrap();

    assert_eq!(outcome, EnableOutcome::Connected);
    let info = h.manager.connected_integrations_info();
    assert_eq!(info[0].display_name, "CRM");
}
