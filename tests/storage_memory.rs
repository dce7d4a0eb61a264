//! In-memory storage integration tests.
//!
//! Run with: cargo test --test storage_memory

mod common;
mod storage;

use storefront::storage::MemoryStore;

#[tokio::test]
async fn test_memory_unit_of_work() {
    println!("=== Memory UnitOfWork Tests ===");

    let store = MemoryStore::new();
    run_unit_of_work_tests!(&store);

    println!("=== All Memory UnitOfWork tests PASSED ===");
}
