use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tally::checkpoint::engine::{FileCopy, SnapshotEngine, VacuumInto};
use tally::checkpoint::{verify, CheckpointManager};
use tally::db;
use tempfile::TempDir;

/// Fixture generator for databases of a given size
mod fixtures {
    use super::*;

    /// Open a fresh database with `transactions` rows spread over a few vendors
    pub fn create_database(dir: &Path, transactions: usize) -> Connection {
        let conn = db::open(&dir.join("tally.db"), Duration::from_secs(5)).unwrap();

        conn.execute_batch(
            "INSERT INTO categories (name) VALUES ('Groceries'), ('Rent'), ('Fuel'), ('Eating Out');",
        )
        .unwrap();

        for v in 0..20 {
            conn.execute(
                "INSERT INTO vendors (name, category_id) VALUES (?1, ?2)",
                rusqlite::params![format!("vendor-{v}"), v % 4 + 1],
            )
            .unwrap();
        }

        let tx = conn.unchecked_transaction().unwrap();
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO transactions (fitid, posted_at, amount_cents, payee, vendor_id, category_id)
                     VALUES (?1, '2024-03-01', ?2, ?3, ?4, ?5)",
                )
                .unwrap();
            for i in 0..transactions {
                stmt.execute(rusqlite::params![
                    format!("fit-{i}"),
                    -((i % 10_000) as i64),
                    format!("PAYEE {i} CARD PURCHASE"),
                    (i % 20 + 1) as i64,
                    (i % 4 + 1) as i64,
                ])
                .unwrap();
            }
        }
        tx.commit().unwrap();

        conn
    }
}

/// Benchmark: create and delete a checkpoint at several database sizes
fn bench_create_checkpoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint_create");
    group.sample_size(20);

    for rows in [1_000, 10_000, 50_000] {
        group.bench_with_input(BenchmarkId::new("transactions", rows), &rows, |b, &rows| {
            let temp_dir = TempDir::new().unwrap();
            let conn = fixtures::create_database(temp_dir.path(), rows);
            let manager = CheckpointManager::new(temp_dir.path().join("tally.db")).unwrap();
            let mut n = 0u64;

            b.iter(|| {
                n += 1;
                let tag = format!("bench-{n}");
                let checkpoint = manager.create(&conn, black_box(&tag), "bench").unwrap();
                manager.delete(&conn, &checkpoint.id).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark: VACUUM INTO against a raw file copy
fn bench_snapshot_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_strategy");
    group.sample_size(20);

    let temp_dir = TempDir::new().unwrap();
    let conn = fixtures::create_database(temp_dir.path(), 10_000);
    let source = temp_dir.path().join("tally.db");
    let dest = temp_dir.path().join("snapshot.db");

    let engines = [
        ("vacuum-into", SnapshotEngine::with_strategies(vec![Box::new(VacuumInto)])),
        ("file-copy", SnapshotEngine::with_strategies(vec![Box::new(FileCopy)])),
    ];

    for (name, engine) in &engines {
        group.bench_function(*name, |b| {
            b.iter(|| {
                engine.run(&conn, &source, &dest).unwrap();
                std::fs::remove_file(&dest).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark: integrity check of a snapshot
fn bench_integrity_check(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let conn = fixtures::create_database(temp_dir.path(), 10_000);
    let manager = CheckpointManager::new(temp_dir.path().join("tally.db")).unwrap();
    manager.create(&conn, "verify", "bench").unwrap();
    let snapshot = manager.snapshot_path("verify");

    c.bench_function("integrity_check_10k", |b| {
        b.iter(|| {
            let result = verify::check(black_box(&snapshot));
            assert!(result.is_healthy());
        });
    });
}

criterion_group!(
    benches,
    bench_create_checkpoint,
    bench_snapshot_strategies,
    bench_integrity_check
);
criterion_main!(benches);
