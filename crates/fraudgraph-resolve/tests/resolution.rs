//! End-to-end resolution tests against the in-memory store.
//!
//! Run with: cargo test --package fraudgraph-resolve --test resolution

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fraudgraph_core::{
    AttributeKind, EntityKind, ResolverConfig, Transaction, TransactionId, User, UserId,
};
use fraudgraph_index::{rebuild_from_store, AttributeIndex, IndexMaintainer};
use fraudgraph_resolve::{
    GraphResponse, RelationshipType, ResolutionEngine, ResolveError, ResolveRequest,
};
use fraudgraph_store::{load_dataset, EntityStore, MemoryEntityStore, StoreError};

async fn engine_over(store: MemoryEntityStore) -> ResolutionEngine<MemoryEntityStore> {
    let store = Arc::new(store);
    let index = Arc::new(AttributeIndex::new());
    rebuild_from_store(&index, store.as_ref()).await.unwrap();
    ResolutionEngine::new(store, index)
}

fn node_ids(resp: &GraphResponse) -> BTreeSet<&str> {
    resp.nodes.iter().map(|n| n.id.as_str()).collect()
}

fn edge_set(resp: &GraphResponse) -> BTreeSet<(String, String, RelationshipType)> {
    resp.relationships
        .iter()
        .map(|r| (r.from.clone(), r.to.clone(), r.rel_type))
        .collect()
}

fn edge(from: &str, to: &str, rel_type: RelationshipType) -> (String, String, RelationshipType) {
    (from.to_string(), to.to_string(), rel_type)
}

/// Every edge endpoint is a returned node; no duplicate ids or edge keys.
fn assert_well_formed(resp: &GraphResponse) {
    let ids = node_ids(resp);
    assert_eq!(ids.len(), resp.nodes.len(), "duplicate node ids");
    for r in &resp.relationships {
        assert!(ids.contains(r.from.as_str()), "dangling from: {}", r.from);
        assert!(ids.contains(r.to.as_str()), "dangling to: {}", r.to);
    }
    let keys: BTreeSet<_> = resp
        .relationships
        .iter()
        .map(|r| (r.from.as_str(), r.to.as_str(), r.rel_type, r.attribute))
        .collect();
    assert_eq!(keys.len(), resp.relationships.len(), "duplicate edges");
}

fn shared_ip_store() -> MemoryEntityStore {
    let store = MemoryEntityStore::new(64);
    store.upsert_user(User::new("u1")).unwrap();
    store.upsert_user(User::new("u2")).unwrap();
    store
        .upsert_transaction(Transaction::new("t1", "u1", 10.0).with_ip("1.2.3.4"))
        .unwrap();
    store
        .upsert_transaction(Transaction::new("t2", "u2", 20.0).with_ip("1.2.3.4"))
        .unwrap();
    store
}

#[tokio::test]
async fn test_shared_ip_scenario() {
    let engine = engine_over(shared_ip_store()).await;
    let resp = engine
        .resolve(ResolveRequest::user("u1").with_max_depth(3))
        .await
        .unwrap();

    assert_well_formed(&resp);
    assert_eq!(node_ids(&resp), BTreeSet::from(["u1", "u2", "t1", "t2"]));
    assert_eq!(
        edge_set(&resp),
        BTreeSet::from([
            edge("u1", "t1", RelationshipType::Sent),
            edge("t1", "u1", RelationshipType::ReceivedBy),
            edge("u2", "t2", RelationshipType::Sent),
            edge("t2", "u2", RelationshipType::ReceivedBy),
            edge("t1", "t2", RelationshipType::SameIp),
        ])
    );
    assert!(!resp.truncated);
    assert_eq!(resp.nodes[0].id, "u1");
}

#[tokio::test]
async fn test_isolated_transaction_scenario() {
    let store = shared_ip_store();
    store
        .upsert_user(User::new("u3").with_email("solo@example.com"))
        .unwrap();
    store
        .upsert_transaction(
            Transaction::new("t3", "u3", 7.0)
                .with_ip("9.9.9.9")
                .with_device("lonely-device"),
        )
        .unwrap();
    let engine = engine_over(store).await;

    let resp = engine.resolve_transaction("t3").await.unwrap();

    assert_well_formed(&resp);
    assert_eq!(node_ids(&resp), BTreeSet::from(["t3", "u3"]));
    assert_eq!(
        edge_set(&resp),
        BTreeSet::from([
            edge("u3", "t3", RelationshipType::Sent),
            edge("t3", "u3", RelationshipType::ReceivedBy),
        ])
    );
    assert!(!resp.truncated);
}

#[tokio::test]
async fn test_node_budget_truncates_to_nearest() {
    let store = MemoryEntityStore::new(64);
    store.upsert_user(User::new("hub")).unwrap();
    for i in 0..10 {
        store
            .upsert_transaction(
                Transaction::new(format!("t{i}"), "hub", 1.0).with_timestamp(i),
            )
            .unwrap();
    }
    let engine = engine_over(store).await;

    let resp = engine
        .resolve(ResolveRequest::user("hub").with_max_nodes(2))
        .await
        .unwrap();

    assert_well_formed(&resp);
    assert!(resp.truncated);
    assert_eq!(resp.nodes.len(), 2);
    assert_eq!(resp.nodes[0].id, "hub");
    // Earliest transaction is admitted first.
    assert_eq!(resp.nodes[1].id, "t0");
    assert_eq!(resp.nodes[1].kind, EntityKind::Transaction);
}

#[tokio::test]
async fn test_isolated_seed_is_single_node() {
    let store = MemoryEntityStore::new(8);
    store.upsert_user(User::new("loner")).unwrap();
    let engine = engine_over(store).await;

    let resp = engine.resolve_user("loner").await.unwrap();
    assert_eq!(resp.nodes.len(), 1);
    assert!(resp.relationships.is_empty());
    assert!(!resp.truncated);
}

#[tokio::test]
async fn test_missing_seed_is_not_found() {
    let engine = engine_over(shared_ip_store()).await;
    let err = engine.resolve_user("ghost").await.unwrap_err();
    assert!(matches!(
        err,
        ResolveError::NotFound { kind: EntityKind::User, ref id } if id == "ghost"
    ));
    assert!(err.partial().is_none());
}

#[tokio::test]
async fn test_same_ip_is_symmetric() {
    let engine = engine_over(shared_ip_store()).await;
    for (seed, other) in [("t1", "t2"), ("t2", "t1")] {
        let resp = engine
            .resolve(ResolveRequest::transaction(seed).with_max_depth(1))
            .await
            .unwrap();
        assert!(resp.node(other).is_some(), "{seed} did not reach {other}");
        assert!(resp.has_relationship("t1", "t2", RelationshipType::SameIp));
    }
}

#[tokio::test]
async fn test_resolution_is_idempotent() {
    let engine = engine_over(shared_ip_store()).await;
    let first = engine.resolve_user("u1").await.unwrap();
    let second = engine.resolve_user("u1").await.unwrap();
    assert_eq!(node_ids(&first), node_ids(&second));
    assert_eq!(edge_set(&first), edge_set(&second));
}

#[tokio::test]
async fn test_attribute_cycle_terminates() {
    // Every transaction shares one NAT address and one device.
    let store = MemoryEntityStore::new(64);
    for u in ["a", "b", "c"] {
        store
            .upsert_user(User::new(u).with_phone("+1 (555) 000-1111"))
            .unwrap();
    }
    for (i, u) in ["a", "b", "c", "a", "b", "c"].iter().enumerate() {
        store
            .upsert_transaction(
                Transaction::new(format!("t{i}"), *u, 1.0)
                    .with_ip("203.0.113.7")
                    .with_device("shared"),
            )
            .unwrap();
    }
    let engine = engine_over(store).await;

    let resp = engine
        .resolve(ResolveRequest::user("a").with_max_depth(10))
        .await
        .unwrap();
    assert_well_formed(&resp);
    assert_eq!(resp.nodes.len(), 9);
    assert!(!resp.truncated);
    assert!(resp.has_relationship("t0", "t3", RelationshipType::SameIp));
    assert!(resp.has_relationship("t0", "t3", RelationshipType::SameDevice));
    assert!(resp.has_relationship("a", "b", RelationshipType::SharedAttribute));

    let capped = engine
        .resolve(ResolveRequest::user("a").with_max_depth(10).with_max_nodes(4))
        .await
        .unwrap();
    assert_well_formed(&capped);
    assert_eq!(capped.nodes.len(), 4);
    assert!(capped.truncated);
}

#[tokio::test]
async fn test_missing_email_never_links() {
    let store = MemoryEntityStore::new(16);
    store.upsert_user(User::new("u1")).unwrap();
    store.upsert_user(User::new("u2").with_email("   ")).unwrap();
    store.upsert_user(User::new("u3")).unwrap();
    let engine = engine_over(store).await;

    for seed in ["u1", "u2"] {
        let resp = engine.resolve_user(seed).await.unwrap();
        assert_eq!(resp.nodes.len(), 1, "{seed} linked through an empty value");
    }
}

#[tokio::test]
async fn test_shared_attributes_are_separate_per_kind() {
    let store = MemoryEntityStore::new(16);
    store
        .upsert_user(
            User::new("u1")
                .with_email("Same@Mail.com")
                .with_phone("555-0100"),
        )
        .unwrap();
    store
        .upsert_user(
            User::new("u2")
                .with_email(" same@mail.com")
                .with_phone("(555) 0100"),
        )
        .unwrap();
    let engine = engine_over(store).await;

    let resp = engine
        .resolve(ResolveRequest::user("u2").with_max_depth(1))
        .await
        .unwrap();
    let kinds: BTreeSet<_> = resp
        .relationships
        .iter()
        .filter(|r| r.rel_type == RelationshipType::SharedAttribute)
        .map(|r| {
            assert_eq!((r.from.as_str(), r.to.as_str()), ("u1", "u2"));
            r.attribute
        })
        .collect();
    assert_eq!(
        kinds,
        BTreeSet::from([Some(AttributeKind::Email), Some(AttributeKind::Phone)])
    );
    // Display props keep the raw form.
    assert_eq!(resp.node("u2").unwrap().props["email"], " same@mail.com");
}

#[tokio::test]
async fn test_counterparty_produces_direct_edge() {
    let store = MemoryEntityStore::new(16);
    store.upsert_user(User::new("payer")).unwrap();
    store.upsert_user(User::new("mule")).unwrap();
    store
        .upsert_transaction(Transaction::new("t1", "payer", 900.0).with_counterparty("mule"))
        .unwrap();
    let engine = engine_over(store).await;

    let resp = engine.resolve_user("payer").await.unwrap();
    assert_well_formed(&resp);
    assert_eq!(node_ids(&resp), BTreeSet::from(["payer", "mule", "t1"]));
    assert!(resp.has_relationship("mule", "payer", RelationshipType::Direct));
}

#[tokio::test]
async fn test_direct_edge_is_one_hop_from_either_party() {
    let store = MemoryEntityStore::new(16);
    store.upsert_user(User::new("payer")).unwrap();
    store.upsert_user(User::new("mule")).unwrap();
    store
        .upsert_transaction(Transaction::new("t1", "payer", 900.0).with_counterparty("mule"))
        .unwrap();
    let engine = engine_over(store).await;

    for seed in ["payer", "mule"] {
        let resp = engine
            .resolve(ResolveRequest::user(seed).with_max_depth(1))
            .await
            .unwrap();
        assert_well_formed(&resp);
        assert!(node_ids(&resp).contains("payer"), "seed {seed}");
        assert!(node_ids(&resp).contains("mule"), "seed {seed}");
        assert!(resp.has_relationship("mule", "payer", RelationshipType::Direct));
    }

    // The counterparty sits behind the sender when seeding the transaction.
    let resp = engine
        .resolve(ResolveRequest::transaction("t1").with_max_depth(1))
        .await
        .unwrap();
    assert_eq!(node_ids(&resp), BTreeSet::from(["payer", "t1"]));
    assert!(resp.truncated);

    let resp = engine
        .resolve(ResolveRequest::transaction("t1").with_max_depth(2))
        .await
        .unwrap();
    assert_well_formed(&resp);
    assert_eq!(node_ids(&resp), BTreeSet::from(["payer", "mule", "t1"]));
    assert!(resp.has_relationship("mule", "payer", RelationshipType::Direct));
}

#[tokio::test]
async fn test_store_outage_is_an_error_not_an_empty_graph() {
    let store = shared_ip_store();
    let store = Arc::new(store);
    let index = Arc::new(AttributeIndex::new());
    rebuild_from_store(&index, store.as_ref()).await.unwrap();
    let engine = ResolutionEngine::new(store.clone(), index);

    store.set_online(false);
    let err = engine.resolve_user("u1").await.unwrap_err();
    assert!(matches!(err, ResolveError::StoreUnavailable(StoreError::Unavailable(_))));
    assert!(err.is_retryable());

    store.set_online(true);
    assert!(engine.resolve_user("u1").await.is_ok());
}

/// Adds latency to every read.
struct SlowStore {
    inner: MemoryEntityStore,
    delay: Duration,
}

impl EntityStore for SlowStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_user(id).await
    }

    async fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_transaction(id).await
    }

    async fn transactions_by_sender(&self, id: &UserId) -> Result<Vec<Transaction>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.transactions_by_sender(id).await
    }

    async fn transactions_by_counterparty(
        &self,
        id: &UserId,
    ) -> Result<Vec<Transaction>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.transactions_by_counterparty(id).await
    }

    async fn all_users(&self) -> Result<Vec<User>, StoreError> {
        self.inner.all_users().await
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        self.inner.all_transactions().await
    }
}

async fn slow_engine(delay: Duration, timeout_ms: u64) -> ResolutionEngine<SlowStore> {
    let store = Arc::new(SlowStore {
        inner: shared_ip_store(),
        delay,
    });
    let index = Arc::new(AttributeIndex::new());
    rebuild_from_store(&index, store.as_ref()).await.unwrap();
    ResolutionEngine::new(store, index).with_config(ResolverConfig {
        timeout_ms,
        ..ResolverConfig::default()
    })
}

#[tokio::test]
async fn test_deadline_returns_partial_graph() {
    let engine = slow_engine(Duration::from_millis(100), 250).await;

    let err = engine.resolve_user("u1").await.unwrap_err();
    match &err {
        ResolveError::TimedOut { after_ms, partial } => {
            assert_eq!(*after_ms, 250);
            assert!(partial.truncated);
            // The seed was fetched before the deadline.
            assert_eq!(partial.nodes.first().map(|n| n.id.as_str()), Some("u1"));
            assert_well_formed(partial);
        }
        other => panic!("expected timeout, got {other}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_cancellation_stops_resolution() {
    let engine = slow_engine(Duration::from_millis(200), 0).await;
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let err = engine
        .resolve_with_cancel(ResolveRequest::user("u1"), token)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_maintained_index_sees_new_links() {
    let store = Arc::new(shared_ip_store());
    let index = Arc::new(AttributeIndex::new());
    let maintainer = IndexMaintainer::start(index.clone(), store.clone())
        .await
        .unwrap();
    let engine = ResolutionEngine::new(store.clone(), index.clone());

    let before = engine.resolve_user("u2").await.unwrap();
    assert!(before.node("u9").is_none());

    store.upsert_user(User::new("u9")).unwrap();
    store
        .upsert_transaction(Transaction::new("t9", "u9", 1.0).with_ip("1.2.3.4"))
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !index.lookup(AttributeKind::Ip, "1.2.3.4").contains("t9")
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let after = engine.resolve_user("u2").await.unwrap();
    assert!(after.node("u9").is_some());
    assert!(after.has_relationship("t2", "t9", RelationshipType::SameIp));

    maintainer.shutdown().await;
}

#[tokio::test]
async fn test_dataset_file_end_to_end() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "users": [
                {{"id": "alice", "name": "Alice", "email": "alice@example.com"}},
                {{"id": "al1ce", "email": "ALICE@example.com ", "paymentMethods": ["card_42"]}},
                {{"id": "bob", "paymentMethods": ["card_42"]}}
            ],
            "transactions": [
                {{"id": "tx1", "amount": 49.99, "timestamp": 1, "senderId": "bob",
                  "deviceId": "iphone-1", "metadata": {{"channel": "web"}}}}
            ]
        }}"#
    )
    .unwrap();

    let store = load_dataset(file.path(), 64).unwrap();
    let engine = engine_over(store).await;

    let resp = engine.resolve_user("alice").await.unwrap();
    assert_well_formed(&resp);
    assert_eq!(resp.nodes[0].label, "Alice");
    assert_eq!(
        node_ids(&resp),
        BTreeSet::from(["alice", "al1ce", "bob", "tx1"])
    );
    assert!(resp.has_relationship("al1ce", "alice", RelationshipType::SharedAttribute));
    assert!(resp.has_relationship("al1ce", "bob", RelationshipType::SharedAttribute));
    assert_eq!(resp.node("tx1").unwrap().props["metadata"]["channel"], "web");

    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["seed"]["type"], "User");
    assert_eq!(json["nodes"][0]["type"], "User");
    assert_eq!(json["truncated"], false);
}
