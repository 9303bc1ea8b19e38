//! # Basic Caching Example
//!
//! This example demonstrates basic caching functionality:
//! - Setting up resources and a namespaced cache
//! - Cache hits vs misses
//! - Add, check-and-set and counters
//! - Batch reads and writes
//!
//! Runs against Redis when `REDIS_HOST` is set (e.g. `localhost:6379`),
//! otherwise against an in-process store.

use bucketcache::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: u32,
    pub name: String,
    pub price: i32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🚀 bucketcache Basic Caching Example");
    println!("====================================");

    // 1. Resource Setup
    let resources = Arc::new(ResourceManager::new());
    match std::env::var("REDIS_HOST") {
        Ok(host) => {
            resources.set_servers("default", &host).await?;
            println!("✅ Using Redis at {}", host);
        }
        Err(_) => {
            resources
                .set_store("default", Arc::new(MemoryStore::new()))
                .await;
            println!("✅ Using in-process store");
        }
    }

    // 2. Cache Setup
    let options = CacheOptions::new("shop").with_ttl(300);
    let cache = BucketCache::new(options, resources)?;
    cache.ping().await?;
    println!("✅ Cache ready: {:?}", cache.capabilities());

    // 3. Hits and misses
    println!("\n📦 Hits and misses");
    println!("------------------");
    let laptop = Product {
        id: 1,
        name: "Laptop".to_string(),
        price: 1200,
    };
    let miss: Option<Product> = cache.get_item("product:1").await?;
    println!("Before set: {:?}", miss);

    cache.set_item("product:1", &laptop, None).await?;
    let hit: Option<Product> = cache.get_item("product:1").await?;
    println!("After set:  {:?}", hit);

    // 4. Conditional writes
    println!("\n🔒 Conditional writes");
    println!("---------------------");
    let added = cache.add_item("product:1", &laptop, None).await?;
    println!("Add over existing key: {}", added);

    if let Some((mut product, token)) = cache.get_item_with_cas::<Product>("product:1").await? {
        product.price = 999;
        let swapped = cache
            .check_and_set_item(&token, "product:1", &product, None)
            .await?;
        println!("Check-and-set with fresh token: {}", swapped);

        let swapped_again = cache
            .check_and_set_item(&token, "product:1", &product, None)
            .await?;
        println!("Check-and-set with stale token: {}", swapped_again);
    }

    // 5. Counters
    println!("\n🔢 Counters");
    println!("-----------");
    let views = cache.increment_item_with_initial("views:1", 1, 100).await?;
    println!("First view: {}", views);
    let views = cache.increment_item("views:1", 1).await?;
    println!("Second view: {}", views);

    // 6. Batches
    println!("\n📚 Batches");
    println!("----------");
    let failed = cache
        .set_items([("tag:red", 3), ("tag:blue", 5)], Some(60))
        .await?;
    println!("Failed batch writes: {:?}", failed);

    let tags: HashMap<String, i32> = cache
        .get_items(&["tag:red", "tag:blue", "tag:green"])
        .await?;
    println!("Batch read: {:?}", tags);

    let failed = cache
        .remove_items(&["product:1", "views:1", "tag:red", "tag:blue"])
        .await?;
    println!("Failed batch removes: {:?}", failed);

    println!("\n🎉 Done");
    Ok(())
}
