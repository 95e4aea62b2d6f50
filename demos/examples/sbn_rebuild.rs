// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Growing an index past its extent.
//!
//! Inserts inside the extent are routed in place (and restructure the tree when
//! the level count changes). An insert outside it is refused and reported to the
//! rebuild handler; the caller then rebuilds from all features.
//!
//! Run:
//! - `cargo run -p understory_examples --example sbn_rebuild`

use std::sync::{Arc, Mutex};

use understory_sbn::{Envelope, InsertOutcome, SbnTree};

fn main() {
    tracing_subscriber::fmt().init();

    let mut features: Vec<(u32, Envelope)> = (0..20)
        .map(|i| {
            let v = f64::from(i) * 5.0;
            (i, Envelope::new(v, v, v + 2.0, v + 2.0))
        })
        .collect();
    let mut tree = SbnTree::create(&features, None, None).unwrap();

    let refused = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&refused);
    tree.set_rebuild_handler(move |request| {
        sink.lock().unwrap().push((request.fid, request.envelope));
    });

    for fid in 20..30 {
        let v = f64::from(fid - 20) * 9.0;
        let env = Envelope::new(v, 1.0, v + 1.0, 2.0);
        match tree.insert(fid, env, None, None).unwrap() {
            InsertOutcome::Inserted => {}
            InsertOutcome::Restructured => println!("fid {fid}: now {} levels", tree.levels()),
            InsertOutcome::RebuildRequired(_) => unreachable!("inside the extent"),
        }
        features.push((fid, env));
    }

    let outside = Envelope::new(500.0, 500.0, 510.0, 505.0);
    let outcome = tree.insert(99, outside, None, None).unwrap();
    println!("fid 99: {outcome:?}");

    features.extend(refused.lock().unwrap().drain(..));
    let rebuilt = SbnTree::create(&features, None, None).unwrap();
    println!(
        "rebuilt: {} features, extent {:?}",
        rebuilt.feature_count(),
        rebuilt.extent()
    );
    assert_eq!(rebuilt.query_fids(&outside), [99]);
}
