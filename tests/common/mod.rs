// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use khpack::container::{ContainerKind, ContainerSource, EntryHash};

pub const SECTOR_SIZE: usize = 0x800;

/// Builds an HD asset with raw (uncompressed) sections.
pub fn hd_asset(original: &[u8], sections: &[(&str, &[u8])]) -> Vec<u8> {
    let mut asset = Vec::new();
    asset.extend_from_slice(&(original.len() as i32).to_le_bytes());
    asset.extend_from_slice(&(sections.len() as i32).to_le_bytes());
    asset.extend_from_slice(&(-1i32).to_le_bytes());
    asset.extend_from_slice(&0i32.to_le_bytes());

    for (name, data) in sections {
        let mut padded = [0u8; 0x20];
        padded[..name.len()].copy_from_slice(name.as_bytes());
        asset.extend_from_slice(&padded);
        asset.extend_from_slice(&0i32.to_le_bytes());
        asset.extend_from_slice(&0i32.to_le_bytes());
        asset.extend_from_slice(&(data.len() as i32).to_le_bytes());
        asset.extend_from_slice(&(-1i32).to_le_bytes());
    }

    asset.extend_from_slice(original);
    for (_, data) in sections {
        asset.extend_from_slice(data);
    }

    asset
}

/// An HD asset whose original section claims to be a zlib stream, but isn't one.
pub fn corrupt_hd_asset() -> Vec<u8> {
    let mut asset = Vec::new();
    asset.extend_from_slice(&0x100i32.to_le_bytes());
    asset.extend_from_slice(&0i32.to_le_bytes());
    asset.extend_from_slice(&8i32.to_le_bytes());
    asset.extend_from_slice(&0i32.to_le_bytes());
    asset.extend_from_slice(&[0xFF; 8]);
    asset
}

/// Writes a disc index and data container, each entry starting on its own sector.
pub fn write_disc_pair(dir: &Path, name: &str, entries: &[(EntryHash, Vec<u8>)]) -> ContainerSource {
    let (index, data) = disc_pair(entries);
    write_disc_files(dir, name, &index, &data)
}

/// Writes an already built disc index and data container.
pub fn write_disc_files(dir: &Path, name: &str, index: &[u8], data: &[u8]) -> ContainerSource {
    let index_path = dir.join(format!("{name}.IDX"));
    let data_path = dir.join(format!("{name}.IMG"));
    std::fs::write(&index_path, index).unwrap();
    std::fs::write(&data_path, data).unwrap();

    ContainerSource::DiscFiles {
        index: index_path,
        data: data_path,
    }
}

pub fn disc_pair(entries: &[(EntryHash, Vec<u8>)]) -> (Vec<u8>, Vec<u8>) {
    disc_pair_at(0, entries)
}

/// Same as [`disc_pair`], with the first entry starting at `first_block` instead of sector 0.
pub fn disc_pair_at(first_block: usize, entries: &[(EntryHash, Vec<u8>)]) -> (Vec<u8>, Vec<u8>) {
    let mut index = Vec::new();
    let mut data = vec![0xCC; first_block * SECTOR_SIZE];

    index.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (hash, payload) in entries {
        let EntryHash::Disc { hash32, hash16 } = *hash else {
            panic!("not a disc hash");
        };

        let block = (data.len() / SECTOR_SIZE) as u32;
        let sectors = payload.len().div_ceil(SECTOR_SIZE).max(1);

        index.extend_from_slice(&hash32.to_le_bytes());
        index.extend_from_slice(&hash16.to_le_bytes());
        index.extend_from_slice(&((sectors - 1) as u16).to_le_bytes());
        index.extend_from_slice(&block.to_le_bytes());
        index.extend_from_slice(&(payload.len() as u32).to_le_bytes());

        data.extend_from_slice(payload);
        data.resize((block as usize + sectors) * SECTOR_SIZE, 0);
    }

    (index, data)
}

/// Writes a digital index and data container.
pub fn write_digital_pair(dir: &Path, name: &str, entries: &[(EntryHash, Vec<u8>)]) -> ContainerSource {
    let mut index = Vec::new();
    let mut data = Vec::new();

    for (hash, payload) in entries {
        let EntryHash::Digital(md5) = *hash else {
            panic!("not a digital hash");
        };

        index.extend_from_slice(&md5);
        index.extend_from_slice(&(data.len() as i64).to_le_bytes());
        index.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        index.extend_from_slice(&(payload.len() as i32).to_le_bytes());

        data.extend_from_slice(payload);
    }

    let index_path = dir.join(format!("{name}.hed"));
    let data_path = dir.join(format!("{name}.pkg"));
    std::fs::write(&index_path, index).unwrap();
    std::fs::write(&data_path, data).unwrap();

    ContainerSource::Digital {
        index: index_path,
        data: data_path,
    }
}

pub fn digital_hash(path: &str) -> EntryHash {
    EntryHash::from_path(ContainerKind::Digital, path)
}

/// Builds an ISO 9660 image with the given files in its root directory.
pub fn iso_image(files: &[(&str, &[u8])]) -> Vec<u8> {
    fn record(identifier: &[u8], sector: u32, length: u32, flags: u8) -> Vec<u8> {
        let mut record_length = 33 + identifier.len();
        record_length += record_length % 2;

        let mut record = vec![0u8; record_length];
        record[0] = record_length as u8;
        record[2..6].copy_from_slice(&sector.to_le_bytes());
        record[6..10].copy_from_slice(&sector.to_be_bytes());
        record[10..14].copy_from_slice(&length.to_le_bytes());
        record[14..18].copy_from_slice(&length.to_be_bytes());
        record[25] = flags;
        record[32] = identifier.len() as u8;
        record[33..33 + identifier.len()].copy_from_slice(identifier);
        record
    }

    const ROOT_SECTOR: usize = 18;

    let mut image = vec![0u8; SECTOR_SIZE * (ROOT_SECTOR + 1)];

    let root = record(&[0], ROOT_SECTOR as u32, SECTOR_SIZE as u32, 0x02);
    let pvd = &mut image[16 * SECTOR_SIZE..17 * SECTOR_SIZE];
    pvd[0] = 1;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[156..156 + root.len()].copy_from_slice(&root);

    let terminator = &mut image[17 * SECTOR_SIZE..18 * SECTOR_SIZE];
    terminator[0] = 255;
    terminator[1..6].copy_from_slice(b"CD001");

    let mut directory = root.clone();
    directory.extend(record(&[1], ROOT_SECTOR as u32, SECTOR_SIZE as u32, 0x02));

    let mut sector = ROOT_SECTOR + 1;
    let mut contents = Vec::new();
    for (name, data) in files {
        directory.extend(record(name.as_bytes(), sector as u32, data.len() as u32, 0));

        let sectors = data.len().div_ceil(SECTOR_SIZE).max(1);
        let mut padded = data.to_vec();
        padded.resize(sectors * SECTOR_SIZE, 0);
        contents.extend(padded);
        sector += sectors;
    }

    let start = ROOT_SECTOR * SECTOR_SIZE;
    image[start..start + directory.len()].copy_from_slice(&directory);
    image.extend(contents);

    image
}

/// Every file under `dir`, relative to it and with `/` separators, sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();
    files.sort();
    files
}

pub fn out_dir(dir: &Path) -> PathBuf {
    dir.join("out")
}
