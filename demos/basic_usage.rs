//! Basic usage of layered-repository.
//!
//! An in-memory hot tier in front of a JSON file, with write-behind sync,
//! then a dump of every metric the run recorded.
//!
//! Run with: `cargo run --example basic_usage`

use std::sync::Arc;
use std::time::Duration;

use layered_repository::{
    DatasourceOptions, InMemoryDatasource, JsonFileDatasource, Repository, RepositoryBuilder, WriteMode,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("users.json");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Assemble the stack
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Opening datasources...");
    let disk = Arc::new(
        JsonFileDatasource::open(
            &path,
            DatasourceOptions::new()
                .with_read_priority(1.0)
                .with_write_mode(WriteMode::WriteFirst),
        )
        .await?,
    );
    let hot = InMemoryDatasource::with_options(
        DatasourceOptions::new()
            .with_read_priority(10.0)
            .with_write_mode(WriteMode::WriteAlways),
    );

    let repo = RepositoryBuilder::new()
        .datasource(hot)
        .shared_datasource(disk.clone())
        .entity_factory(|value| json!({ "user": value }))
        .interval(Some(Duration::from_millis(200)))
        .build_timed()?;

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Write, read, delete
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Writing users...");
    repo.set("user:alice", json!({"name": "Alice", "role": "admin"})).await?;
    repo.set("user:bob", json!({"name": "Bob", "role": "dev"})).await?;
    repo.set("user:carol", json!({"name": "Carol", "role": "ops"})).await?;
    repo.delete("user:bob").await?;
    println!("   └─ Pending in sync cache: {}", repo.pending());

    if let Some(alice) = repo.get("user:alice").await? {
        println!("   └─ user:alice → {}", alice);
    }
    println!("   └─ user:* → {:?}", repo.find("^user:").await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Let the timer flush
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n⏱  Waiting for timed sync...");
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("   └─ Pending in sync cache: {}", repo.pending());
    println!("   └─ {} on disk: {}", path.display(), std::fs::read_to_string(&path)?);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Shut down and dump metrics
    // ─────────────────────────────────────────────────────────────────────────
    repo.shutdown().await;
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        let rendered = match value {
            DebugValue::Counter(v) => v.to_string(),
            DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
            DebugValue::Histogram(samples) => {
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!("count={} sum={:.6}", samples.len(), sum)
            }
        };
        lines.push(format!("{}{} = {}", key.name(), label_str, rendered));
    }

    lines.sort();
    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
