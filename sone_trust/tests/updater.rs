use std::sync::Arc;
use std::time::Duration;

use sone_core::testutil::{GraphCall, RecordingGraph};
use sone_core::{ContentId, DispatchPolicy, GraphError, Identity, OwnIdentity, SoneConfig};
use sone_trust::TrustUpdater;

fn own(id: &str) -> Arc<OwnIdentity> {
    Arc::new(OwnIdentity::new(
        Identity::new(
            id,
            Some(id.to_uppercase()),
            ContentId::parse(&format!("USK@{id}/WebOfTrust/0")).unwrap(),
        ),
        ContentId::parse(&format!("USK@{id}-insert/WebOfTrust/0")).unwrap(),
    ))
}

fn identity(id: &str) -> Arc<Identity> {
    Arc::new(Identity::new(
        id,
        None,
        ContentId::parse(&format!("USK@{id}/WebOfTrust/0")).unwrap(),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_callers_see_outcomes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let graph = Arc::new(RecordingGraph::new().with_delay(Duration::from_millis(10)));
    let config = SoneConfig::from_toml_str(
        r#"
        [updater]
        dispatch = { worker_pool = { workers = 2 } }
        "#,
    )
    .unwrap();
    assert_eq!(
        config.updater.dispatch,
        DispatchPolicy::WorkerPool { workers: 2 }
    );
    let updater = TrustUpdater::new(graph.clone(), &config.updater);
    updater.start();

    let owner = own("owner");
    let friend = identity("friend");
    let trust = updater.set_trust(owner.clone(), friend.clone(), Some(75), "Set from Sone");
    let property = updater.set_property(owner.clone(), "Sone.LatestEdition", "12");

    let outcomes = tokio::task::spawn_blocking(move || {
        (
            trust.wait_for_completion_blocking(),
            property.wait_for_completion_blocking(),
        )
    })
    .await
    .unwrap();

    assert_eq!(outcomes, (true, true));
    assert_eq!(friend.trust(&owner).and_then(|trust| trust.explicit), Some(75));
    assert_eq!(owner.property("Sone.LatestEdition").as_deref(), Some("12"));
    assert_eq!(graph.calls().len(), 2);
}

#[tokio::test]
async fn failed_updates_are_reported_and_later_ones_still_run() {
    let _ = env_logger::builder().is_test(true).try_init();
    let graph = Arc::new(RecordingGraph::new());
    let updater = TrustUpdater::new(graph.clone(), &Default::default());
    updater.start();
    let owner = own("owner");
    let friend = identity("friend");

    graph.fail_with(GraphError::Rejected("no such identity".to_owned()));
    let failed = updater.set_trust(owner.clone(), friend.clone(), Some(-20), "spam");
    assert!(!failed.wait_for_completion().await);
    assert_eq!(friend.trust(&owner), None);

    graph.succeed();
    let removed = updater.set_trust(owner.clone(), friend.clone(), None, "");
    assert!(removed.wait_for_completion().await);
    assert_eq!(
        graph.calls(),
        vec![
            GraphCall::SetTrust {
                truster: "owner".to_owned(),
                trustee: "friend".to_owned(),
                score: -20,
                comment: "spam".to_owned(),
            },
            GraphCall::RemoveTrust {
                truster: "owner".to_owned(),
                trustee: "friend".to_owned(),
            },
        ]
    );
}
