//! End-to-end tests against real files: persistence across reopen, physical
//! reclaim, and corruption handling.

use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

use rand::Rng;
use tempfile::TempDir;

use bob::config::Config;
use bob::consts::{TAG_BLOCK_SIZE, TAG_CUE_SIZE, TAG_END};
use bob::fs::Bob;
use bob::io::Error;
use bob::varint;

fn scratch(name: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    (dir, path)
}

fn header_len(blocksize: usize, cuesize: usize) -> usize {
    4 + varint::encoded_len(TAG_BLOCK_SIZE)
        + varint::encoded_len(blocksize as u64)
        + varint::encoded_len(TAG_CUE_SIZE)
        + varint::encoded_len(cuesize as u64)
        + varint::encoded_len(TAG_END)
}

fn physical_size(path: &std::path::Path) -> u64 {
    std::fs::metadata(path).unwrap().blocks() * 512
}

#[test]
fn flush_commits_the_buffered_header() {
    let (_dir, path) = scratch("flush.bob");
    let mut blob = Config::new().blocksize(4096).create(&path).unwrap();
    blob.flush().unwrap();
    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(on_disk.len(), header_len(4096, 4096 * 32));
    assert_eq!(&on_disk[..4], b"BOB\0");
    blob.close().unwrap();
}

#[test]
fn soak_replaces_stay_physically_bounded() {
    let (_dir, path) = scratch("soak.bob");
    let mut blob = Bob::create(&path).unwrap();
    let cuesize = blob.cuesize() as u64;
    let mut rng = rand::thread_rng();
    let mut last = [0u8; 100];
    for _ in 0..10_000 {
        rng.fill(&mut last[..]);
        blob.set(&last).unwrap();
        assert_eq!(blob.current(), &last[..]);
    }
    blob.close().unwrap();

    // the live cue rolled forward many times; everything before it must
    // have been reclaimed
    assert!(
        physical_size(&path) <= 2 * cuesize,
        "physical size {} exceeds two cues ({})",
        physical_size(&path),
        2 * cuesize
    );

    let blob = Bob::open(&path).unwrap();
    assert_eq!(blob.current(), &last[..]);
    blob.close().unwrap();
}

#[test]
fn rollover_reclaims_superseded_cues() {
    let (_dir, path) = scratch("rollover.bob");
    let mut blob = Config::new().blocksize(4096).cuesize(4096).create(&path).unwrap();
    let mut last = Vec::new();
    for round in 0u32..100 {
        last = round.to_le_bytes().repeat(250);
        blob.set(&last).unwrap();
    }
    assert_eq!(blob.current(), &last[..]);
    blob.close().unwrap();

    assert!(physical_size(&path) <= 2 * 4096);

    // the logical length kept growing while the footprint did not
    assert!(std::fs::metadata(&path).unwrap().len() > 4096);

    let blob = Bob::open(&path).unwrap();
    assert_eq!(blob.current(), &last[..]);
    blob.close().unwrap();
}

#[test]
fn blob_larger_than_a_cue_spans_cues() {
    let (_dir, path) = scratch("large.bob");
    let mut blob = Config::new().blocksize(4096).cuesize(4096).create(&path).unwrap();
    let first: Vec<u8> = (0..10_000u32).map(|n| n as u8).collect();
    blob.set(&first).unwrap();
    assert_eq!(blob.current(), &first[..]);
    let second: Vec<u8> = first.iter().rev().copied().collect();
    blob.set(&second).unwrap();
    assert_eq!(blob.current(), &second[..]);
    blob.close().unwrap();

    let blob = Bob::open(&path).unwrap();
    assert_eq!(blob.current(), &second[..]);
    blob.close().unwrap();
}

#[test]
fn open_rereads_excess_after_block_size_shrink() {
    // The parse buffer starts at the 32768-byte default. A file created
    // with 512-byte blocks and more than 512 bytes of content makes the
    // first read overshoot the real block boundary, forcing the rewind.
    let (_dir, path) = scratch("shrink.bob");
    let mut blob = Config::new().blocksize(512).create(&path).unwrap();
    let contents: Vec<u8> = (0..3000u32).map(|n| (n % 251) as u8).collect();
    blob.set(&contents).unwrap();
    blob.close().unwrap();

    let blob = Bob::open(&path).unwrap();
    assert_eq!(blob.blocksize(), 512);
    assert_eq!(blob.current(), &contents[..]);
    blob.close().unwrap();
}

#[test]
fn open_rejects_record_truncated_mid_body() {
    let (_dir, path) = scratch("truncated.bob");
    let mut blob = Config::new().blocksize(4096).create(&path).unwrap();
    blob.set(b"0123456789").unwrap();
    blob.close().unwrap();

    let keep = header_len(4096, 4096 * 32) + 3;
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(keep as u64).unwrap();
    drop(file);

    assert!(matches!(Bob::open(&path), Err(Error::Corrupt)));
}

#[test]
fn open_rejects_unknown_record_kind() {
    let (_dir, path) = scratch("unknown.bob");
    let mut blob = Config::new().blocksize(4096).create(&path).unwrap();
    blob.set(b"fine so far").unwrap();
    blob.close().unwrap();

    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0x03]).unwrap();
    drop(file);

    assert!(matches!(Bob::open(&path), Err(Error::Corrupt)));
}

#[test]
fn open_rejects_foreign_file() {
    let (_dir, path) = scratch("foreign.txt");
    std::fs::write(&path, "not a bob file at all").unwrap();
    assert!(matches!(Bob::open(&path), Err(Error::Corrupt)));
}

#[test]
fn open_rejects_empty_file() {
    let (_dir, path) = scratch("hollow.bob");
    std::fs::File::create(&path).unwrap();
    assert!(matches!(Bob::open(&path), Err(Error::Corrupt)));
}
