// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Inspecting an index.
//!
//! Prints the node table of a small tree, then a text dump of its `.sbn` file.
//! Pass a path to dump an existing `.sbn` instead.
//!
//! Run:
//! - `cargo run -p understory_examples --example sbn_dump`
//! - `cargo run -p understory_examples --example sbn_dump -- path/to/roads.sbn`

use understory_sbn::{Envelope, SbnTree, dump_file, dump_sbn};

fn main() {
    let mut text = String::new();
    if let Some(path) = std::env::args().nth(1) {
        dump_file(&path, &mut text).unwrap();
        print!("{text}");
        return;
    }

    let features: Vec<(u32, Envelope)> = (0..40)
        .map(|i| {
            let x = f64::from(i % 8) * 12.5;
            let y = f64::from(i / 8) * 20.0;
            (i, Envelope::new(x, y, x + 6.0, y + 4.0))
        })
        .collect();
    let tree = SbnTree::create(&features, None, None).unwrap();

    tree.describe_tree(&mut text).unwrap();
    println!("{text}");
    for level in 1..=tree.levels() {
        println!("level {level}: {} features", tree.features_in_level(level));
    }

    text.clear();
    dump_sbn(&tree.to_bytes().sbn, &mut text).unwrap();
    print!("{text}");
}
