use std::sync::Arc;
use std::time::Duration;

use murmur_db::store::DEFAULT_HISTORY_LIMIT;
use murmur_db::{Database, MessageStore, StoreError};

fn store() -> (Arc<Database>, MessageStore) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    (db.clone(), MessageStore::new(db))
}

#[tokio::test]
async fn send_then_history_contains_unread_message() {
    let (_, store) = store();

    let sent = store.send("alice", "bob", "  hello bob ").await.unwrap();
    assert_eq!(sent.content, "hello bob");
    assert!(!sent.is_read);

    let history = store.history("alice", "bob", DEFAULT_HISTORY_LIMIT).await.unwrap();
    assert_eq!(history, vec![sent.clone()]);

    // same set from the other side
    let reverse = store.history("bob", "alice", DEFAULT_HISTORY_LIMIT).await.unwrap();
    assert_eq!(reverse, vec![sent]);
}

#[tokio::test]
async fn history_is_oldest_first_and_keeps_the_latest() {
    let (_, store) = store();

    for i in 0..5 {
        let (from, to) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
        store.send(from, to, &format!("m{i}")).await.unwrap();
    }
    store.send("alice", "carol", "elsewhere").await.unwrap();

    let all = store.history("alice", "bob", 50).await.unwrap();
    let contents: Vec<_> = all.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["m0", "m1", "m2", "m3", "m4"]);

    let tail = store.history("alice", "bob", 2).await.unwrap();
    let contents: Vec<_> = tail.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["m3", "m4"]);
}

#[tokio::test]
async fn oversized_content_is_rejected_without_a_write() {
    let (_, store) = store();

    let err = store.send("alice", "bob", &"x".repeat(1001)).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let err = store.send("alice", "bob", "   ").await.unwrap_err();
    assert!(err.is_validation());

    assert!(store.history("alice", "bob", 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_identity_is_rejected() {
    let (_, store) = store();

    let err = store.send("alice", "bob smith", "hi").await.unwrap_err();
    match err {
        StoreError::Validation(msg) => assert!(msg.contains("receiver")),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(store.mark_read("", "bob").await.unwrap_err().is_validation());
    assert!(store.conversations_for("a/b").await.unwrap_err().is_validation());
}

#[tokio::test]
async fn mark_read_is_idempotent_and_scoped() {
    let (_, store) = store();

    store.send("bob", "alice", "one").await.unwrap();
    store.send("bob", "alice", "two").await.unwrap();
    store.send("alice", "bob", "mine").await.unwrap();
    store.send("carol", "alice", "other").await.unwrap();

    assert_eq!(store.mark_read("alice", "bob").await.unwrap(), 2);
    let first: Vec<_> = store.history("alice", "bob", 50).await.unwrap();

    assert_eq!(store.mark_read("alice", "bob").await.unwrap(), 0);
    let second = store.history("alice", "bob", 50).await.unwrap();
    assert_eq!(first, second);

    // alice's own message to bob is untouched; bob has not read it
    let mine = second.iter().find(|m| m.content == "mine").unwrap();
    assert!(!mine.is_read);

    // carol's message is in a different conversation
    assert_eq!(store.unread_total("alice").await.unwrap(), 1);
}

#[tokio::test]
async fn conversations_report_latest_message_and_unread_counts() {
    let (_, store) = store();

    for (from, to, text) in [
        ("bob", "alice", "b1"),
        ("bob", "alice", "b2"),
        ("alice", "carol", "c1"),
        ("dave", "alice", "d1"),
        ("alice", "bob", "b3"),
    ] {
        store.send(from, to, text).await.unwrap();
        // distinct millisecond timestamps so activity order is unambiguous
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    let conversations = store.conversations_for("alice").await.unwrap();
    let summary: Vec<_> = conversations
        .iter()
        .map(|c| (c.counterparty.as_str(), c.last_message.content.as_str(), c.unread_count))
        .collect();

    assert_eq!(
        summary,
        [("bob", "b3", 2), ("dave", "d1", 1), ("carol", "c1", 0)]
    );

    // unread count equals messages with receiver=me, sender=counterparty, unread
    for conversation in &conversations {
        let unread = store
            .history("alice", conversation.counterparty.as_str(), 200)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.receiver_id.as_str() == "alice" && !m.is_read)
            .count() as u64;
        assert_eq!(conversation.unread_count, unread);
    }
}

#[tokio::test]
async fn conversation_ties_order_by_counterparty() {
    let (db, store) = store();

    store.send("zed", "alice", "z").await.unwrap();
    store.send("bob", "alice", "b").await.unwrap();

    // force identical timestamps
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE messages SET created_at = '2026-01-01T00:00:00.000Z'",
            [],
        )?;
        Ok(())
    })
    .unwrap();

    let conversations = store.conversations_for("alice").await.unwrap();
    let order: Vec<_> = conversations.iter().map(|c| c.counterparty.as_str()).collect();
    assert_eq!(order, ["bob", "zed"]);
}

#[tokio::test]
async fn self_messages_are_permitted() {
    let (_, store) = store();

    let note = store.send("alice", "alice", "note to self").await.unwrap();
    assert_eq!(note.sender_id, note.receiver_id);

    let conversations = store.conversations_for("alice").await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].counterparty.as_str(), "alice");
    assert_eq!(conversations[0].unread_count, 1);
}

#[tokio::test]
async fn delete_conversation_removes_both_directions() {
    let (_, store) = store();

    store.send("alice", "bob", "1").await.unwrap();
    store.send("bob", "alice", "2").await.unwrap();
    store.send("alice", "bob", "3").await.unwrap();
    store.send("alice", "carol", "keep").await.unwrap();

    let prior = store.history("alice", "bob", 200).await.unwrap().len() as u64;
    let deleted = store.delete_conversation("bob", "alice").await.unwrap();
    assert_eq!(deleted, prior);

    assert!(store.history("alice", "bob", 50).await.unwrap().is_empty());
    assert!(store.history("bob", "alice", 50).await.unwrap().is_empty());
    assert_eq!(store.history("alice", "carol", 50).await.unwrap().len(), 1);

    assert_eq!(store.delete_conversation("alice", "bob").await.unwrap(), 0);
}

#[tokio::test]
async fn scenario_offline_receiver_reads_later() {
    let (_, store) = store();

    store.send("alice", "bob", "hi").await.unwrap();

    let history = store.history("bob", "alice", 50).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hi");
    assert!(!history[0].is_read);

    store.mark_read("bob", "alice").await.unwrap();

    let conversations = store.conversations_for("bob").await.unwrap();
    assert_eq!(conversations[0].counterparty.as_str(), "alice");
    assert_eq!(conversations[0].unread_count, 0);
}

#[tokio::test]
async fn storage_failure_is_distinguishable() {
    let (db, store) = store();

    db.with_conn(|conn| {
        conn.execute_batch("DROP TABLE messages")?;
        Ok(())
    })
    .unwrap();

    let err = store.send("alice", "bob", "hi").await.unwrap_err();
    assert!(matches!(err, StoreError::Storage(_)));
    assert!(!err.is_validation());
}
