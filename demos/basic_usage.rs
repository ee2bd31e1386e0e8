// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic entity-search usage example.
//!
//! Demonstrates:
//! 1. Registering searchable entity types
//! 2. Starting the service (ensure indices, rebuild from the primary store)
//! 3. Indexing a new entity
//! 4. Paged, wildcard and mixed-type search
//! 5. Term counts
//! 6. Displaying metrics
//!
//! Uses the in-process cluster by default. Set `REDIS_URL` to run against a
//! Redis Stack server instead:
//! ```bash
//! docker run -d -p 6379:6379 redis/redis-stack-server
//! REDIS_URL=redis://localhost:6379 cargo run --example basic_usage
//! ```

use std::sync::Arc;

use entity_search::{
    CatalogBuilder, EntitySchema, LocalLockService, MemoryCluster, MemoryPrimaryStore, Page, PropertyType, Query,
    SearchConfig, SearchCriteria, SearchService, Searchable,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Article {
    id: u64,
    title: String,
    tags: Vec<String>,
}

impl Searchable for Article {
    fn schema() -> EntitySchema {
        EntitySchema::new("Article")
            .id("id", PropertyType::long())
            .text("title")
            .keywords("tags")
    }

    fn search_id(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Review {
    id: u64,
    body: String,
}

impl Searchable for Review {
    fn schema() -> EntitySchema {
        EntitySchema::new("Review").id("id", PropertyType::long()).text("body")
    }

    fn search_id(&self) -> String {
        self.id.to_string()
    }
}

fn article(id: u64, title: &str, tags: &[&str]) -> Article {
    Article {
        id,
        title: title.into(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt().with_target(false).compact().init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           entity-search: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Catalog and primary store
    // ─────────────────────────────────────────────────────────────────────────
    let config = SearchConfig {
        redis_url: std::env::var("REDIS_URL").ok(),
        ephemeral_storage: true,
        ..Default::default()
    };
    let catalog = Arc::new(
        CatalogBuilder::with_mapper(config.schema_mapper())
            .register::<Article>()?
            .register::<Review>()?
            .build(),
    );
    println!("📚 Registered types: {:?}", catalog.type_names());

    let store = Arc::new(MemoryPrimaryStore::new());
    store.extend([
        article(1, "Rust in production", &["rust", "ops"]),
        article(2, "Hello rust", &["rust"]),
        article(3, "Hello world", &["misc"]),
        article(4, "Search engines in rust", &["rust", "search"]),
    ]);
    store.extend([Review { id: 1, body: "A hello to remember".into() }]);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Start: ensure indices, rebuild from the store
    // ─────────────────────────────────────────────────────────────────────────
    let service = if config.redis_url.is_some() {
        println!("🔌 Connecting to Redis Stack...");
        Arc::new(SearchService::connect_redis(config, catalog, store).await?)
    } else {
        println!("🧪 Using the in-process cluster");
        Arc::new(SearchService::new(
            config,
            catalog,
            Arc::new(MemoryCluster::new()),
            store,
            Arc::new(LocalLockService::new()),
        ))
    };

    let startup = service.start().await;
    println!("✅ Indices ready: {:?}", startup.init.ready);
    if let Some(rebuild) = startup.rebuild {
        if let Some(report) = rebuild.await??.report() {
            println!(
                "🔁 Rebuilt {} records in {:?} ({} dropped)",
                report.total_records(),
                report.took,
                report.dropped.len()
            );
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Index a new entity
    // ─────────────────────────────────────────────────────────────────────────
    let written = service.index(&article(5, "Rust parsers", &["rust", "parsing"])).await?;
    println!("📝 {}/{} → {:?}", written.index, written.id, written.outcome);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Search
    // ─────────────────────────────────────────────────────────────────────────
    let criteria = SearchCriteria::query_string_for(["article"], "rust")
        .sort("id", true)
        .paged(Page::new(1, 3));
    let page = service.search::<Article>(&criteria).await?;
    println!(
        "\n🔎 'rust': {} hits, page 1 of {}",
        page.total_results,
        page.total_pages()
    );
    for a in &page.result {
        println!("   #{} {}", a.id, a.title);
    }

    let wildcard = service
        .search::<Article>(&SearchCriteria::query_string_for(["article"], "title:pars*"))
        .await?;
    println!("🔎 'title:pars*': {:?}", wildcard.result.iter().map(|a| &a.title).collect::<Vec<_>>());

    let mixed = service
        .search_entities(&SearchCriteria::query_string_for(["article", "review"], "hello"), Some(10))
        .await?;
    println!("🔎 'hello' across types:");
    for entity in &mixed {
        println!("   {} ({})", entity.id(), entity.type_name());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Term counts
    // ─────────────────────────────────────────────────────────────────────────
    let all = SearchCriteria::new().with_type("article").query(Query::match_all());
    println!("\n🏷️  Tags:");
    for (tag, count) in service.count_terms_by_field(&all, "tags").await? {
        println!("   {:<10} {}", tag, count);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    for (key, _, _, value) in snapshotter.snapshot().into_vec() {
        let value = match value {
            DebugValue::Counter(c) => c.to_string(),
            DebugValue::Gauge(g) => format!("{:.2}", g.into_inner()),
            DebugValue::Histogram(h) => format!("{} samples", h.len()),
        };
        println!("   {:<45} {}", key.key().name(), value);
    }

    Ok(())
}
