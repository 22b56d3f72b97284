//! Multi-threaded tests for row locking and concurrent transactions.

use cinder_core::schema::Column;
use cinder_core::{DataType, EngineConfig, Error, Row, Value};
use cinder_storage::{ConcurrencyControl, Database, OperationKind, TransactionManager};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn fast_config() -> EngineConfig {
    EngineConfig::default().lock_retry_interval(Duration::from_millis(5))
}

fn setup(config: EngineConfig) -> (Arc<Database>, Arc<TransactionManager>) {
    let db = Database::with_config("bank", config.clone()).unwrap();
    db.create_table(
        "Accounts",
        vec![
            Column::new("id", DataType::Int64).primary_key(),
            Column::new("balance", DataType::Int64).not_null(),
        ],
    )
    .unwrap();
    let tm = TransactionManager::new(Arc::new(ConcurrencyControl::with_config(&config)), config);
    for id in 0..4 {
        db.insert_row("Accounts", Row::new().with("id", id).with("balance", 100), &tm)
            .unwrap();
    }
    (Arc::new(db), Arc::new(tm))
}

#[test]
fn test_write_lock_mutual_exclusion() {
    let cc = Arc::new(ConcurrencyControl::with_config(&fast_config()));
    let inside = Arc::new(AtomicBool::new(false));
    let entries = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (1..=8u64)
        .map(|tx| {
            let cc = Arc::clone(&cc);
            let inside = Arc::clone(&inside);
            let entries = Arc::clone(&entries);
            thread::spawn(move || {
                for _ in 0..5 {
                    cc.acquire_write_lock("Accounts", 0, tx);
                    assert!(!inside.swap(true, Ordering::SeqCst), "two writers on one slot");
                    entries.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(1));
                    inside.store(false, Ordering::SeqCst);
                    cc.release_locks(tx);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(entries.load(Ordering::SeqCst), 40);
    assert_eq!(cc.lock_type("Accounts", 0), None);
}

#[test]
fn test_second_writer_waits_for_commit() {
    let (db, tm) = setup(fast_config());
    let row = Row::new().with("id", 0).with("balance", 100);

    let t1 = tm.begin_transaction();
    db.update_row_tx(t1, "Accounts", &Value::Int64(0), Row::new().with("balance", 50), &tm)
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let waiter = {
        let (db, tm, done) = (Arc::clone(&db), Arc::clone(&tm), Arc::clone(&done));
        thread::spawn(move || {
            let t2 = tm.begin_transaction();
            tm.log_operation(
                t2,
                OperationKind::Update,
                "Accounts",
                vec![row.clone()],
                vec![row.with("balance", 70)],
                &db,
            )
            .unwrap();
            done.store(true, Ordering::SeqCst);
            let ops = tm.operations(t2).unwrap();
            tm.commit_transaction(t2, &db).unwrap();
            ops
        })
    };

    thread::sleep(Duration::from_millis(40));
    assert!(!done.load(Ordering::SeqCst));

    tm.commit_transaction(t1, &db).unwrap();
    let ops = waiter.join().unwrap();

    // The second transaction logged against the committed row.
    assert_eq!(ops[0].before()[0].1.get("balance"), Some(&Value::Int64(50)));
    assert_eq!(
        db.lookup("Accounts", "id", &Value::Int64(0)).unwrap()[0].get("balance"),
        Some(&Value::Int64(70))
    );
}

#[test]
fn test_lock_timeout_leaves_transaction_active() {
    let config = fast_config().lock_timeout(Some(Duration::from_millis(30)));
    let (db, tm) = setup(config);

    let t1 = tm.begin_transaction();
    db.delete_row("Accounts", &Value::Int64(2), &tm, Some(t1)).unwrap();

    let t2 = tm.begin_transaction();
    let err = db
        .update_row_tx(t2, "Accounts", &Value::Int64(2), Row::new().with("balance", 1), &tm)
        .unwrap_err();
    assert!(matches!(err, Error::LockTimeout { .. } | Error::Conflict { .. }));
    assert!(tm.is_active(t2));

    tm.rollback_transaction(t1, &db).unwrap();
    db.update_row_tx(t2, "Accounts", &Value::Int64(2), Row::new().with("balance", 1), &tm)
        .unwrap();
    tm.commit_transaction(t2, &db).unwrap();
    assert_eq!(
        db.lookup("Accounts", "id", &Value::Int64(2)).unwrap()[0].get("balance"),
        Some(&Value::Int64(1))
    );
}

#[test]
fn test_concurrent_transfers_preserve_total() {
    let (db, tm) = setup(fast_config());

    let handles: Vec<_> = (0..4i64)
        .map(|worker| {
            let (db, tm) = (Arc::clone(&db), Arc::clone(&tm));
            thread::spawn(move || {
                for round in 0..5i64 {
                    let from = (worker + round) % 4;
                    let to = (from + 1) % 4;
                    let tx = tm.begin_transaction();
                    // Lock both rows in key order so transfers cannot deadlock.
                    let (first, second) = if from < to { (from, to) } else { (to, from) };
                    let mut images = Vec::new();
                    for id in [first, second] {
                        let row = db.lookup("Accounts", "id", &Value::Int64(id)).unwrap();
                        let (before, after) = (vec![row[0].clone()], row);
                        tm.log_operation(tx, OperationKind::Update, "Accounts", before, after, &db)
                            .unwrap();
                        let ops = tm.operations(tx).unwrap();
                        images.push(ops[ops.len() - 1].before()[0].1.clone());
                    }
                    let balance = |id: i64| {
                        images
                            .iter()
                            .find(|r| r.get("id") == Some(&Value::Int64(id)))
                            .and_then(|r| r.get("balance"))
                            .and_then(Value::as_i64)
                            .unwrap()
                    };
                    let (from_balance, to_balance) = (balance(from), balance(to));
                    tm.log_operation(
                        tx,
                        OperationKind::Update,
                        "Accounts",
                        vec![Row::new().with("id", from).with("balance", from_balance)],
                        vec![Row::new().with("id", from).with("balance", from_balance - 10)],
                        &db,
                    )
                    .unwrap();
                    tm.log_operation(
                        tx,
                        OperationKind::Update,
                        "Accounts",
                        vec![Row::new().with("id", to).with("balance", to_balance)],
                        vec![Row::new().with("id", to).with("balance", to_balance + 10)],
                        &db,
                    )
                    .unwrap();
                    tm.commit_transaction(tx, &db).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let total: i64 = db
        .select_rows("Accounts")
        .unwrap()
        .iter()
        .filter_map(|r| r.get("balance").and_then(Value::as_i64))
        .sum();
    assert_eq!(total, 400);
    assert!(tm.active_transactions().is_empty());
}

fn balance_of(db: &Database, id: i64) -> Option<Value> {
    db.lookup("Accounts", "id", &Value::Int64(id))
        .unwrap()
        .first()
        .map(|row| row.get_or_null("balance").clone())
}

#[test]
fn test_markers_follow_rows_after_immediate_delete() {
    let (db, tm) = setup(fast_config());
    let t1 = tm.begin_transaction();
    db.delete_row("Accounts", &Value::Int64(2), &tm, Some(t1)).unwrap();
    assert_eq!(tm.concurrency().deleted_by("Accounts", 2), Some(t1));

    // Removing the first row moves every later row down one slot.
    db.delete_row("Accounts", &Value::Int64(0), &tm, None).unwrap();
    assert_eq!(tm.concurrency().deleted_by("Accounts", 1), Some(t1));
    assert_eq!(tm.concurrency().deleted_by("Accounts", 2), None);
    assert!(tm.concurrency().holds_write_lock("Accounts", 1, t1));

    let t2 = tm.begin_transaction();
    let err = db
        .update_row_tx(t2, "Accounts", &Value::Int64(2), Row::new().with("balance", 5), &tm)
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { owner, .. } if owner == t1));

    let t3 = tm.begin_transaction();
    db.update_row_tx(t3, "Accounts", &Value::Int64(3), Row::new().with("balance", 7), &tm)
        .unwrap();

    tm.commit_transaction(t1, &db).unwrap();
    tm.commit_transaction(t3, &db).unwrap();
    tm.rollback_transaction(t2, &db).unwrap();
    assert_eq!(balance_of(&db, 2), None);
    assert_eq!(balance_of(&db, 3), Some(Value::Int64(7)));
    assert_eq!(balance_of(&db, 1), Some(Value::Int64(100)));
}

#[test]
fn test_locks_follow_rows_after_rollback() {
    let config = fast_config().lock_timeout(Some(Duration::from_millis(30)));
    let (db, tm) = setup(config);

    let t1 = tm.begin_transaction();
    db.insert_row_tx(t1, "Accounts", Row::new().with("id", 10).with("balance", 1), &tm)
        .unwrap();
    let t2 = tm.begin_transaction();
    db.insert_row_tx(t2, "Accounts", Row::new().with("id", 11).with("balance", 2), &tm)
        .unwrap();
    assert!(tm.concurrency().holds_write_lock("Accounts", 5, t2));

    tm.rollback_transaction(t1, &db).unwrap();
    assert!(tm.concurrency().holds_write_lock("Accounts", 4, t2));
    assert!(!tm.concurrency().holds_write_lock("Accounts", 5, t2));

    // The row t2 inserted is still its own.
    let t3 = tm.begin_transaction();
    let err = db
        .update_row_tx(t3, "Accounts", &Value::Int64(11), Row::new().with("balance", 9), &tm)
        .unwrap_err();
    assert!(matches!(err, Error::LockTimeout { slot: 4, .. }));

    tm.commit_transaction(t2, &db).unwrap();
    db.update_row_tx(t3, "Accounts", &Value::Int64(11), Row::new().with("balance", 9), &tm)
        .unwrap();
    tm.commit_transaction(t3, &db).unwrap();
    assert_eq!(balance_of(&db, 10), None);
    assert_eq!(balance_of(&db, 11), Some(Value::Int64(9)));
    assert!(tm.active_transactions().is_empty());
}

#[test]
fn test_immediate_update_respects_open_transactions() {
    let config = fast_config().lock_timeout(Some(Duration::from_millis(30)));
    let (db, tm) = setup(config);

    let deleter = tm.begin_transaction();
    db.delete_row("Accounts", &Value::Int64(1), &tm, Some(deleter)).unwrap();
    let err = db
        .update_row("Accounts", &Value::Int64(1), Row::new().with("balance", 5), &tm)
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { owner, .. } if owner == deleter));

    let writer = tm.begin_transaction();
    db.update_row_tx(writer, "Accounts", &Value::Int64(0), Row::new().with("balance", 50), &tm)
        .unwrap();
    let err = db
        .update_row("Accounts", &Value::Int64(0), Row::new().with("balance", 60), &tm)
        .unwrap_err();
    assert!(matches!(err, Error::LockTimeout { .. }));
    assert_eq!(tm.active_transactions(), vec![deleter, writer]);

    tm.rollback_transaction(deleter, &db).unwrap();
    tm.commit_transaction(writer, &db).unwrap();
    db.update_row("Accounts", &Value::Int64(1), Row::new().with("balance", 5), &tm)
        .unwrap();
    db.update_row("Accounts", &Value::Int64(0), Row::new().with("balance", 60), &tm)
        .unwrap();
    assert_eq!(balance_of(&db, 0), Some(Value::Int64(60)));
    assert_eq!(balance_of(&db, 1), Some(Value::Int64(5)));
}
