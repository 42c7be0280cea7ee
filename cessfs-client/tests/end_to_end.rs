//! End-to-end store and retrieve over in-memory miners
//!
//! File sizes keep the 100:64 proportion of a 100 MiB file in 64 MiB segments
//! at 64 KiB segment scale.

mod common;

use cessfs_client::{ChainClient, ClientError};
use cessfs_core::{build_root, CipherKey};
use common::*;

const FILE_LEN: usize = 100 * 1024;

/// Every way to drop two of six shards
fn two_of_six() -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for a in 0..6 {
        for b in (a + 1)..6 {
            pairs.push((a, b));
        }
    }
    pairs
}

#[tokio::test]
async fn test_roundtrip_plaintext() {
    let h = harness().await;
    let data = pattern(FILE_LEN);
    let file = write_file(h.dir.path(), "data.bin", &data);

    let report = h.store(h.request(file, want_all())).await;
    assert_eq!(report.segments, 2);
    assert_eq!(report.file_size, FILE_LEN as u64);

    let meta = h.chain.query_file(&report.fid).await.unwrap().unwrap();
    assert_eq!(meta.segments.len(), 2);
    assert!(meta.segments.iter().all(|s| s.fragments.len() == 6));
    assert_eq!(build_root(&meta.segment_hashes()).unwrap(), report.fid);

    let path = h
        .client
        .retrieve_file(&report.fid, None, &h.save_dir())
        .await
        .unwrap();
    assert_eq!(path, h.save_dir().join(&report.fid));
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

fn want_all() -> Vec<String> {
    (0..6).map(account).collect()
}

#[tokio::test]
async fn test_any_four_of_six_fragments_rebuild() {
    for (a, b) in two_of_six() {
        let h = harness().await;
        let data = pattern(FILE_LEN);
        let file = write_file(h.dir.path(), "data.bin", &data);
        let report = h.store(h.request(file, want_all())).await;

        h.miners.take_offline(&endpoint(a));
        h.miners.take_offline(&endpoint(b));

        let path = h
            .client
            .retrieve_file(&report.fid, None, &h.save_dir())
            .await
            .unwrap_or_else(|e| panic!("missing shards {} and {}: {}", a, b, e));
        assert_eq!(std::fs::read(&path).unwrap(), data, "missing {} and {}", a, b);
    }
}

#[tokio::test]
async fn test_three_missing_fragments_fail() {
    let h = harness().await;
    let file = write_file(h.dir.path(), "data.bin", &pattern(FILE_LEN));
    let report = h.store(h.request(file, want_all())).await;

    for i in [0, 1, 5] {
        h.miners.take_offline(&endpoint(i));
    }
    let err = h
        .client
        .retrieve_file(&report.fid, None, &h.save_dir())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::SegmentUnrecoverable {
            segment: 0,
            required: 4,
            ..
        }
    ));
    // No partial output left behind
    assert!(!h.save_dir().join(&report.fid).exists());
}

#[tokio::test]
async fn test_roundtrip_encrypted() {
    let h = harness().await;
    let data = pattern(FILE_LEN);
    let file = write_file(h.dir.path(), "secret.bin", &data);

    let report = h.store(h.encrypted_request(file, "correct horse")).await;
    // Encrypted segments carry 16 bytes less plaintext
    assert_eq!(report.segments, 2);

    let key = CipherKey::new(b"correct horse").unwrap();
    h.miners.take_offline(&endpoint(2));
    let path = h
        .client
        .retrieve_file(&report.fid, Some(&key), &h.save_dir())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[tokio::test]
async fn test_encrypted_file_needs_the_right_key() {
    let h = harness().await;
    let data = pattern(FILE_LEN);
    let file = write_file(h.dir.path(), "secret.bin", &data);
    let report = h.store(h.encrypted_request(file, "correct horse")).await;

    let wrong = CipherKey::new(b"battery staple").unwrap();
    let result = h
        .client
        .retrieve_file(&report.fid, Some(&wrong), &h.save_dir())
        .await;
    match result {
        Err(err) => {
            assert!(matches!(err, ClientError::Core(_) | ClientError::Integrity(_)));
            assert!(!h.save_dir().join(&report.fid).exists());
        }
        // Padding can check out by chance; the content never does
        Ok(path) => assert_ne!(std::fs::read(path).unwrap(), data),
    }
}

#[tokio::test]
async fn test_corrupted_fragment_is_skipped() {
    let h = harness().await;
    let data = pattern(FILE_LEN);
    let file = write_file(h.dir.path(), "data.bin", &data);
    let report = h.store(h.request(file, want_all())).await;

    h.miners.corrupt(&endpoint(1));
    let path = h
        .client
        .retrieve_file(&report.fid, None, &h.save_dir())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[tokio::test]
async fn test_retrieve_is_cached() {
    let h = harness().await;
    let file = write_file(h.dir.path(), "data.bin", &pattern(FILE_LEN));
    let report = h.store(h.request(file, want_all())).await;

    h.client
        .retrieve_file(&report.fid, None, &h.save_dir())
        .await
        .unwrap();
    let gets = h.miners.gets();
    assert!(gets > 0);

    // Second call finds the file and downloads nothing
    h.client
        .retrieve_file(&report.fid, None, &h.save_dir())
        .await
        .unwrap();
    assert_eq!(h.miners.gets(), gets);
}

#[tokio::test]
async fn test_small_and_exact_sizes() {
    for len in [1, 4095, 64 * 1024, 64 * 1024 + 1, 128 * 1024] {
        let h = harness().await;
        let data = pattern(len);
        let file = write_file(h.dir.path(), "data.bin", &data);
        let report = h.store(h.request(file, Vec::new())).await;
        assert_eq!(report.segments, len.div_ceil(64 * 1024));

        let path = h
            .client
            .retrieve_file(&report.fid, None, &h.save_dir())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), data, "length {}", len);
    }
}

#[tokio::test]
async fn test_same_content_same_fid() {
    let h = harness().await;
    let data = pattern(FILE_LEN);
    let a = write_file(h.dir.path(), "a.bin", &data);
    let b = write_file(h.dir.path(), "b.bin", &data);
    let mut changed = data.clone();
    changed[FILE_LEN / 2] ^= 1;
    let c = write_file(h.dir.path(), "c.bin", &changed);

    let first = h.store(h.request(a, Vec::new())).await;
    let second = h.store(h.request(b, Vec::new())).await;
    let third = h.store(h.request(c, Vec::new())).await;
    assert_eq!(first.fid, second.fid);
    assert!(second.deduplicated);
    assert_ne!(first.fid, third.fid);
}

#[tokio::test]
async fn test_zero_fragments_are_not_downloaded() {
    let h = harness().await;
    let data = vec![0u8; FILE_LEN];
    let file = write_file(h.dir.path(), "zeros.bin", &data);
    let report = h.store(h.request(file, want_all())).await;

    let zero_hash = small_layout().zero_fragment_hash();
    let meta = h.chain.query_file(&report.fid).await.unwrap().unwrap();
    assert!(meta
        .segments
        .iter()
        .flat_map(|s| &s.fragments)
        .all(|f| f.hash == zero_hash));

    let path = h
        .client
        .retrieve_file(&report.fid, None, &h.save_dir())
        .await
        .unwrap();
    assert_eq!(h.miners.gets(), 0);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}
