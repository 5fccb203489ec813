//! Performance benchmarks for the category hierarchy engine
//!
//! Run with: `cargo bench -p qbank-core`
//!
//! These benchmarks measure:
//! - In-memory forest assembly from a flat category list
//! - Atomic category creation (node row plus closure rows)
//! - Subtree moves at the depth ceiling

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use qbank_core::db::DatabaseService;
use qbank_core::{
    build_forest, Category, CategoryId, CategoryType, EngineConfig, NewCategory, TreeMutator,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Setup a mutator on a fresh database
async fn setup_test_mutator() -> (TreeMutator, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = EngineConfig::with_database_path(temp_dir.path().join("bench.db"));
    let db = Arc::new(DatabaseService::open(&config).await.unwrap());
    (TreeMutator::new(db, &config), temp_dir)
}

/// Flat list shaped like a question bank: `fanout` children per node, six levels
fn generate_categories(fanout: usize, max_count: usize) -> Vec<Category> {
    let now = Utc::now();
    let mut categories = Vec::with_capacity(max_count);
    let mut frontier: Vec<(Option<CategoryId>, i64)> = vec![(None, 1)];
    let mut next_id: CategoryId = 1;

    while let Some((parent_id, level)) = frontier.pop() {
        for sort_order in 0..fanout {
            if categories.len() >= max_count {
                return categories;
            }
            let id = next_id;
            next_id += 1;
            categories.push(Category {
                id,
                name: format!("Category {}", id),
                code: format!("C{}", id),
                category_type: CategoryType::suggested_for_level(level).unwrap_or(CategoryType::Topic),
                level,
                parent_id,
                sort_order: sort_order as i64,
                tree_path: "/".to_string(),
                description: None,
                is_active: true,
                allow_questions: true,
                version: 1,
                created_at: now,
                modified_at: now,
            });
            if level < 6 {
                frontier.push((Some(id), level + 1));
            }
        }
    }

    categories
}

/// Benchmark forest assembly
///
/// Target: linear in the number of categories
fn bench_build_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_forest");

    for count in [100, 1_000, 10_000] {
        let categories = generate_categories(6, count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &categories, |b, cats| {
            b.iter(|| black_box(build_forest(cats.clone())));
        });
    }

    group.finish();
}

/// Benchmark atomic category creation under a single parent
fn bench_create_category(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("create_category", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (mutator, _temp) = setup_test_mutator().await;
                let root = mutator
                    .create_category(NewCategory::new("Root", "ROOT", CategoryType::Subject))
                    .await
                    .unwrap();

                let start = std::time::Instant::now();
                for i in 0..iters {
                    let child = NewCategory::new(
                        format!("Child {}", i),
                        format!("CHILD-{}", i),
                        CategoryType::Chapter,
                    )
                    .under(root.id);
                    black_box(mutator.create_category(child).await.unwrap());
                }
                start.elapsed()
            })
        });
    });
}

/// Benchmark moving a five-level subtree back and forth between two roots
fn bench_move_subtree(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("move_subtree");
    group.sample_size(20);

    group.bench_function("five_levels", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (mutator, _temp) = setup_test_mutator().await;
                let left = mutator
                    .create_category(NewCategory::new("Left", "LEFT", CategoryType::Subject))
                    .await
                    .unwrap();
                let right = mutator
                    .create_category(NewCategory::new("Right", "RIGHT", CategoryType::Subject))
                    .await
                    .unwrap();

                let mut parent_id = left.id;
                let mut subtree_root = None;
                for level in 0..5 {
                    let node = mutator
                        .create_category(
                            NewCategory::new(
                                format!("Level {}", level),
                                format!("LVL-{}", level),
                                CategoryType::Topic,
                            )
                            .under(parent_id),
                        )
                        .await
                        .unwrap();
                    subtree_root.get_or_insert(node.id);
                    parent_id = node.id;
                }
                let subtree_root = subtree_root.unwrap();

                let start = std::time::Instant::now();
                for i in 0..iters {
                    let target = if i % 2 == 0 { right.id } else { left.id };
                    black_box(
                        mutator
                            .move_category(subtree_root, Some(target))
                            .await
                            .unwrap(),
                    );
                }
                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_build_forest,
    bench_create_category,
    bench_move_subtree
);
criterion_main!(benches);
