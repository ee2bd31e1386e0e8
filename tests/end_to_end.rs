//! End-to-end tests against the in-process cluster.
//!
//! Exercises the whole service path: catalog → codec → cluster, startup
//! rebuild from the primary store, the rebuild lock, paging and term counts.
//!
//! Run with: `cargo test --test end_to_end`

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use entity_search::schema::{PropertyDef, SearchableId, SearchableProperty};
use entity_search::{
    CatalogBuilder, EntitySchema, IndexState, LocalLockService, LockService, MemoryCluster, MemoryPrimaryStore,
    Page, PropertyType, Query, RebuildOutcome, SearchConfig, SearchCriteria, SearchService, Searchable,
    WriteOutcome,
};

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Author {
    name: String,
    email: String,
}

impl Searchable for Author {
    fn schema() -> EntitySchema {
        EntitySchema::new("Author")
            .embedded_only()
            .property(PropertyDef::new("name", PropertyType::string()).searchable(SearchableProperty::new()))
            .property(PropertyDef::new("email", PropertyType::string()))
    }

    fn search_id(&self) -> String {
        self.email.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Article {
    id: u64,
    title: String,
    category: String,
    tags: Vec<String>,
    author: Option<Author>,
    /// Not searchable; never reaches the index
    internal_notes: String,
}

impl Searchable for Article {
    fn schema() -> EntitySchema {
        EntitySchema::new("Article")
            .property(PropertyDef::new("id", PropertyType::long()).id(SearchableId::new()))
            .text("title")
            .property(
                PropertyDef::new("category", PropertyType::string()).searchable(SearchableProperty::new().not_analyzed()),
            )
            .keywords("tags")
            .embedded("author", Author::schema)
            .property(PropertyDef::new("internal_notes", PropertyType::string()))
    }

    fn search_id(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Review {
    id: u64,
    body: String,
    stars: i32,
}

impl Searchable for Review {
    fn schema() -> EntitySchema {
        EntitySchema::new("Review")
            .id("id", PropertyType::long())
            .text("body")
            .property(PropertyDef::new("stars", PropertyType::int()).searchable(SearchableProperty::new()))
    }

    fn search_id(&self) -> String {
        self.id.to_string()
    }
}

fn article(id: u64, title: &str, category: &str, tags: &[&str]) -> Article {
    Article {
        id,
        title: title.into(),
        category: category.into(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        author: Some(Author {
            name: format!("Author {}", id % 3),
            email: format!("a{}@example.com", id % 3),
        }),
        internal_notes: "do not index".into(),
    }
}

struct Harness {
    service: Arc<SearchService>,
    cluster: Arc<MemoryCluster>,
    store: Arc<MemoryPrimaryStore>,
    locks: Arc<LocalLockService>,
}

fn harness(cluster: MemoryCluster, config: SearchConfig) -> Harness {
    let catalog = CatalogBuilder::with_mapper(config.schema_mapper())
        .register::<Article>()
        .expect("article registers")
        .register::<Review>()
        .expect("review registers")
        .build();
    let cluster = Arc::new(cluster);
    let store = Arc::new(MemoryPrimaryStore::new());
    let locks = Arc::new(LocalLockService::new());
    let service = Arc::new(SearchService::new(
        config,
        Arc::new(catalog),
        cluster.clone(),
        store.clone(),
        locks.clone(),
    ));
    Harness { service, cluster, store, locks }
}

fn seed_store(store: &MemoryPrimaryStore, articles: u64) {
    let categories = ["news", "tech", "sport"];
    store.extend((1..=articles).map(|i| {
        let tags: &[&str] = if i % 2 == 0 { &["rust", "search"] } else { &["rust"] };
        article(i, &format!("Article number {}", i), categories[(i % 3) as usize], tags)
    }));
    store.extend([
        Review { id: 1, body: "great read".into(), stars: 5 },
        Review { id: 2, body: "not great".into(), stars: 2 },
    ]);
}

// =============================================================================
// Startup & rebuild
// =============================================================================

#[tokio::test]
async fn startup_rebuilds_ephemeral_cluster() {
    let h = harness(MemoryCluster::new(), SearchConfig::default());
    seed_store(&h.store, 45);

    let startup = h.service.start().await;
    assert!(startup.init.is_complete());
    let outcome = startup.rebuild.expect("ephemeral cluster rebuilds").await.unwrap().unwrap();

    let report = outcome.report().expect("rebuild ran");
    assert!(report.is_complete());
    assert_eq!(report.total_records(), 47);
    // 45 articles in batches of 20
    assert_eq!(report.reindexed[0].batches, 3);
    assert_eq!(h.cluster.document_count("index_article"), Some(45));
    assert_eq!(h.cluster.document_count("index_review"), Some(2));
    assert_eq!(h.service.index_state("article"), IndexState::Mapped);
}

#[tokio::test]
async fn ephemeral_flag_forces_rebuild_on_persistent_cluster() {
    let config = SearchConfig {
        ephemeral_storage: true,
        reindex_batch_size: 7,
        ..Default::default()
    };
    let h = harness(MemoryCluster::new().persistent(), config);
    seed_store(&h.store, 10);

    let startup = h.service.start().await;
    let outcome = startup.rebuild.expect("configured ephemeral").await.unwrap().unwrap();
    assert_eq!(outcome.report().unwrap().reindexed[0].batches, 2);
}

#[tokio::test]
async fn persistent_cluster_starts_without_rebuild() {
    let h = harness(MemoryCluster::new().persistent(), SearchConfig::default());
    seed_store(&h.store, 5);

    let startup = h.service.start().await;
    assert!(startup.rebuild.is_none());
    assert_eq!(h.cluster.document_count("index_article"), Some(0));
    assert!(h.cluster.mapping("index_article").is_some());
}

#[tokio::test]
async fn concurrent_rebuilds_run_once() {
    let h = harness(
        MemoryCluster::new().persistent().with_latency(Duration::from_millis(20)),
        SearchConfig::default(),
    );
    seed_store(&h.store, 30);

    let first = tokio::spawn({
        let service = h.service.clone();
        async move { service.rebuild().await }
    });
    let second = tokio::spawn({
        let service = h.service.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            service.rebuild().await
        }
    });

    let outcomes = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
    let skipped = outcomes.iter().filter(|o| **o == RebuildOutcome::AlreadyRunning).count();
    assert_eq!(skipped, 1);
    assert_eq!(h.cluster.document_count("index_article"), Some(30));

    // Lock released; a later rebuild runs again
    assert!(!h.locks.is_locked(&h.service.config().rebuild_lock_name));
    assert!(h.service.rebuild().await.unwrap().report().is_some());
}

#[tokio::test]
async fn search_during_rebuild_does_not_error() {
    let h = harness(
        MemoryCluster::new().persistent().with_latency(Duration::from_millis(10)),
        SearchConfig::default(),
    );
    seed_store(&h.store, 30);
    h.service.initialize().await;
    h.service.rebuild().await.unwrap();

    let criteria = SearchCriteria::query_string_for(["article", "review"], "rust");
    let searches = async {
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(h.service.search_entities(&criteria, None).await.map(|found| found.len()));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        seen
    };
    let (rebuild, seen) = tokio::join!(h.service.rebuild(), searches);

    let report = rebuild.unwrap().report().cloned().expect("rebuild ran");
    assert!(report.is_complete());
    for result in seen {
        // Indices may be empty mid-rebuild, never an error
        let found = result.expect("search during rebuild");
        assert!(found <= 30);
    }
    assert_eq!(h.service.search_entities(&criteria, None).await.unwrap().len(), 30);
}

#[tokio::test]
async fn rebuild_skipped_while_lock_held_elsewhere() {
    let h = harness(MemoryCluster::new().persistent(), SearchConfig::default());
    let name = h.service.config().rebuild_lock_name.clone();
    assert!(h.locks.try_lock(&name).await.unwrap());

    assert_eq!(h.service.rebuild().await.unwrap(), RebuildOutcome::AlreadyRunning);
    assert!(h.cluster.index_names().is_empty());

    h.locks.unlock(&name).await.unwrap();
    assert!(h.service.rebuild().await.unwrap().report().is_some());
}

#[tokio::test]
async fn rebuild_removes_documents_missing_from_store() {
    let h = harness(MemoryCluster::new().persistent(), SearchConfig::default());
    seed_store(&h.store, 3);
    h.service.initialize().await;
    h.service.rebuild().await.unwrap();

    assert!(h.store.remove::<Article>("2"));
    h.service.rebuild().await.unwrap();

    assert_eq!(h.cluster.document_count("index_article"), Some(2));
    assert!(h.cluster.document("index_article", "2").is_none());
}

#[tokio::test]
async fn bulk_item_failures_do_not_stop_rebuild() {
    let h = harness(MemoryCluster::new().persistent(), SearchConfig::default());
    seed_store(&h.store, 25);
    h.cluster.reject_id("7", "mapper_parsing_exception");

    let outcome = h.service.rebuild().await.unwrap();
    let report = outcome.report().unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.reindexed[0].failed_items, 1);
    // Review 7 does not exist, so only the article is lost
    assert_eq!(h.cluster.document_count("index_article"), Some(24));
    assert_eq!(h.cluster.document_count("index_review"), Some(2));
}

// =============================================================================
// Documents & search
// =============================================================================

#[tokio::test]
async fn indexed_document_keeps_only_searchable_fields() {
    let h = harness(MemoryCluster::new().persistent(), SearchConfig::default());
    h.service.initialize().await;

    let a = article(1, "Searchable entities", "tech", &[]);
    let written = h.service.index(&a).await.unwrap();
    assert_eq!(written.outcome, WriteOutcome::Created);

    let stored = h.cluster.document("index_article", "1").unwrap();
    assert_eq!(
        stored,
        serde_json::json!({
            "id": 1,
            "title": "Searchable entities",
            "category": "tech",
            "author": { "name": "Author 1" },
        })
    );
}

#[tokio::test]
async fn search_pages_through_results() {
    let h = harness(MemoryCluster::new(), SearchConfig::default());
    seed_store(&h.store, 25);
    h.service.start().await.rebuild.unwrap().await.unwrap().unwrap();

    let criteria = SearchCriteria::query_string_for(["article"], "number")
        .sort("id", true)
        .paged(Page::new(3, 10));
    let page = h.service.search::<Article>(&criteria).await.unwrap();

    assert_eq!(page.total_results, 25);
    assert_eq!(page.total_pages(), 3);
    assert_eq!(page.result.iter().map(|a| a.id).collect::<Vec<_>>(), vec![5, 4, 3, 2, 1]);
    // Unindexed field comes back defaulted
    assert!(page.result.iter().all(|a| a.internal_notes.is_empty()));
}

#[tokio::test]
async fn wildcard_and_nested_field_queries() {
    let h = harness(MemoryCluster::new(), SearchConfig::default());
    seed_store(&h.store, 6);
    h.service.start().await.rebuild.unwrap().await.unwrap().unwrap();

    let page = h
        .service
        .search::<Article>(&SearchCriteria::query_string_for(["article"], "category:sp*"))
        .await
        .unwrap();
    assert_eq!(page.total_results, 2);

    let by_author = h
        .service
        .search::<Article>(&SearchCriteria::new().query(Query::field_eq("author.name", "Author 1")))
        .await
        .unwrap();
    assert_eq!(by_author.total_results, 2);
}

#[tokio::test]
async fn mixed_type_search_with_limit() {
    let h = harness(MemoryCluster::new(), SearchConfig::default());
    seed_store(&h.store, 4);
    h.service.start().await.rebuild.unwrap().await.unwrap().unwrap();

    let criteria = SearchCriteria::new()
        .types(["article", "review"])
        .query(Query::match_all());
    let all = h.service.search_entities(&criteria, None).await.unwrap();
    assert_eq!(all.len(), 6);
    assert_eq!(all.iter().filter(|e| e.type_name() == "review").count(), 2);

    let some = h.service.search_entities(&criteria, Some(3)).await.unwrap();
    assert_eq!(some.len(), 3);
}

#[tokio::test]
async fn count_terms_orders_by_frequency() {
    let h = harness(MemoryCluster::new(), SearchConfig::default());
    seed_store(&h.store, 9);
    h.service.start().await.rebuild.unwrap().await.unwrap().unwrap();

    let criteria = SearchCriteria::new().with_type("article").query(Query::match_all());
    let tags = h.service.count_terms_by_field(&criteria, "tags").await.unwrap();
    assert_eq!(tags, vec![("rust".to_string(), 9), ("search".to_string(), 4)]);

    let categories = h.service.count_terms_by_field(&criteria, "category").await.unwrap();
    assert_eq!(
        categories,
        vec![("news".to_string(), 3), ("sport".to_string(), 3), ("tech".to_string(), 3)]
    );
}

#[tokio::test]
async fn writes_are_visible_to_search() {
    let h = harness(MemoryCluster::new().persistent(), SearchConfig::default());
    h.service.initialize().await;

    let review = Review { id: 10, body: "surprisingly good".into(), stars: 4 };
    h.service.index(&review).await.unwrap();
    let criteria = SearchCriteria::query_string_for(["review"], "surprisingly");
    assert_eq!(h.service.search::<Review>(&criteria).await.unwrap().result, vec![review.clone()]);

    assert_eq!(h.service.delete(&review).await.unwrap().outcome, WriteOutcome::Deleted);
    assert!(h.service.search::<Review>(&criteria).await.unwrap().is_empty());
}

#[tokio::test]
async fn index_all_reindexes_one_type() {
    let h = harness(MemoryCluster::new().persistent(), SearchConfig::default());
    seed_store(&h.store, 12);
    h.service.initialize().await;

    let report = h.service.index_all("review").await.unwrap();
    assert_eq!(report.records, 2);
    assert_eq!(h.cluster.document_count("index_review"), Some(2));
    assert_eq!(h.cluster.document_count("index_article"), Some(0));
}
