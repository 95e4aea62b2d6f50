// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SBN basics.
//!
//! Build an index over a few parcels, query it, save it next to a (pretend)
//! shapefile, and read it back both fully and lazily.
//!
//! Run:
//! - `RUST_LOG=debug cargo run -p understory_examples --example sbn_basics`

use tracing_subscriber::EnvFilter;
use understory_sbn::{Envelope, SbnQueryOnlyTree, SbnTree};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // One parcel per 10x10 cell on a 20x20 grid.
    let parcels: Vec<(u32, Envelope)> = (0..400)
        .map(|i| {
            let x = f64::from(i % 20) * 10.0;
            let y = f64::from(i / 20) * 10.0;
            (i, Envelope::new(x, y, x + 9.0, y + 9.0))
        })
        .collect();

    let tree = SbnTree::create(&parcels, None, None).unwrap();
    println!(
        "{} features, {} levels, extent {:?}",
        tree.feature_count(),
        tree.levels(),
        tree.extent()
    );

    // Candidates only: quantization may add neighbours, never drop a hit.
    let window = Envelope::new(42.0, 42.0, 58.0, 58.0);
    let hits = tree.query_fids(&window);
    println!("window {window:?} -> {hits:?}");
    assert!(hits.contains(&84), "parcel (4, 4) overlaps the window");

    let dir = std::env::temp_dir().join("understory_sbn_basics");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("parcels.sbn");
    tree.save(&path).unwrap();

    let loaded = SbnTree::load(&path).unwrap();
    assert_eq!(loaded.query_fids(&window), hits);

    let lazy = SbnQueryOnlyTree::open(&path).unwrap();
    assert_eq!(lazy.query_fids(&window).unwrap(), hits);
    println!("lazy tree cached {} nodes", lazy.cached_nodes());
}
