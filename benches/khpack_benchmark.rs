// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use khpack::container::{ContainerKind, EntryHash, IdxFile};
use khpack::hdasset::HdAsset;

fn hd_asset(sections: usize) -> Vec<u8> {
    let original = vec![0x42u8; 0x4000];

    let mut asset = Vec::new();
    asset.extend_from_slice(&(original.len() as i32).to_le_bytes());
    asset.extend_from_slice(&(sections as i32).to_le_bytes());
    asset.extend_from_slice(&(-1i32).to_le_bytes());
    asset.extend_from_slice(&0i32.to_le_bytes());

    for i in 0..sections {
        let mut name = [0u8; 0x20];
        let text = format!("tex{i}.dds");
        name[..text.len()].copy_from_slice(text.as_bytes());
        asset.extend_from_slice(&name);
        asset.extend_from_slice(&0i32.to_le_bytes());
        asset.extend_from_slice(&0i32.to_le_bytes());
        asset.extend_from_slice(&0x1000i32.to_le_bytes());
        asset.extend_from_slice(&(-1i32).to_le_bytes());
    }

    asset.extend_from_slice(&original);
    asset.resize(asset.len() + sections * 0x1000, 0x24);
    asset
}

fn disc_index(entries: u32) -> Vec<u8> {
    let mut index = entries.to_le_bytes().to_vec();
    for i in 0..entries {
        let (hash32, hash16) = match EntryHash::from_path(ContainerKind::Disc, &format!("obj/{i}.mdlx")) {
            EntryHash::Disc { hash32, hash16 } => (hash32, hash16),
            EntryHash::Digital(_) => unreachable!(),
        };

        index.extend_from_slice(&hash32.to_le_bytes());
        index.extend_from_slice(&hash16.to_le_bytes());
        index.extend_from_slice(&0u16.to_le_bytes());
        index.extend_from_slice(&i.to_le_bytes());
        index.extend_from_slice(&0x800u32.to_le_bytes());
    }
    index
}

fn bench_disc_hash() {
    EntryHash::from_path(ContainerKind::Disc, black_box("obj/P_EX100.mdlx"));
}

fn bench_digital_hash() {
    EntryHash::from_path(ContainerKind::Digital, black_box("obj/P_EX100.mdlx"));
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("disc hash calc", |b| b.iter(bench_disc_hash));
    c.bench_function("digital hash calc", |b| b.iter(bench_digital_hash));

    let index = disc_index(10000);
    c.bench_function("idx parsing", |b| {
        b.iter(|| IdxFile::from_existing(black_box(&index)).unwrap())
    });

    let asset = hd_asset(16);
    c.bench_function("hd asset decoding", |b| {
        b.iter(|| HdAsset::from_existing(black_box(&asset)).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
