//! Retrieve driver
//!
//! Segments are rebuilt in chain order from any `data_shards` fragments that
//! check out against their declared hash, decrypted when a key is given, and
//! streamed into a scratch file inside `save_dir`. The last segment is cut to
//! the declared file size and the finished file is renamed to `save_dir/<fid>`.

use crate::chain::{AccountId, FileMetadata, MinerInfo, SegmentMeta};
use crate::error::{ClientError, Result};
use crate::storage::StorageClient;
use cessfs_core::{decrypt, is_hash_name, sha256_hex, verify_root, CipherKey, ErasureCoder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

impl StorageClient {
    /// Download and rebuild a file into `save_dir/<fid>`
    #[instrument(skip_all, fields(fid = %fid, encrypted = cipher_key.is_some()))]
    pub async fn retrieve_file(
        &self,
        fid: &str,
        cipher_key: Option<&CipherKey>,
        save_dir: &Path,
    ) -> Result<PathBuf> {
        if !is_hash_name(fid) {
            return Err(ClientError::InvalidFid(fid.to_string()));
        }
        let target = save_dir.join(fid);
        if let Ok(existing) = tokio::fs::metadata(&target).await {
            if existing.is_file() && existing.len() > 0 {
                info!(path = %target.display(), "File already retrieved");
                return Ok(target);
            }
        }

        let metadata = self
            .chain
            .query_file(fid)
            .await?
            .ok_or_else(|| ClientError::FileNotFound(fid.to_string()))?;
        self.check_metadata(fid, &metadata, cipher_key.is_some())?;

        tokio::fs::create_dir_all(save_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(".retrieve-")
            .tempdir_in(save_dir)?;
        let partial = scratch.path().join(fid);
        let mut out = BufWriter::new(tokio::fs::File::create(&partial).await?);

        let coder = Arc::new(ErasureCoder::with_layout(self.layout)?);
        let mut miners = HashMap::new();
        let mut remaining = metadata.file_size;

        for (index, segment) in metadata.segments.iter().enumerate() {
            let mut shards = self
                .collect_fragments(fid, index, segment, &mut miners)
                .await?;

            let coder = coder.clone();
            let key = cipher_key.cloned();
            let expected = segment.hash.clone();
            let data = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
                let segment = coder.reconstruct(&mut shards)?;
                let actual = sha256_hex(&segment);
                if actual != expected {
                    return Err(ClientError::Integrity(format!(
                        "segment {} hashes to {}, expected {}",
                        index, actual, expected
                    )));
                }
                match key {
                    Some(key) => Ok(decrypt(&segment, &key)?),
                    None => Ok(segment),
                }
            })
            .await??;

            let take = remaining.min(data.len() as u64) as usize;
            out.write_all(&data[..take]).await?;
            remaining -= take as u64;
            debug!(segment = index, written = take, "Segment rebuilt");
        }

        if remaining > 0 {
            return Err(ClientError::Integrity(format!(
                "segments hold {} bytes less than the declared size {}",
                remaining, metadata.file_size
            )));
        }
        out.flush().await?;
        out.into_inner().sync_all().await?;
        tokio::fs::rename(&partial, &target).await?;

        info!(
            path = %target.display(),
            size = metadata.file_size,
            segments = metadata.segments.len(),
            "File retrieved"
        );
        Ok(target)
    }

    /// Check the metadata shape and that its segment hashes root to `fid`
    fn check_metadata(&self, fid: &str, metadata: &FileMetadata, encrypted: bool) -> Result<()> {
        if metadata.fid != fid {
            return Err(ClientError::Integrity(format!(
                "chain returned metadata for {} when asked for {}",
                metadata.fid, fid
            )));
        }
        let total = self.layout.total_shards();
        for (index, segment) in metadata.segments.iter().enumerate() {
            if segment.fragments.len() != total {
                return Err(ClientError::Integrity(format!(
                    "segment {} lists {} fragments, expected {}",
                    index,
                    segment.fragments.len(),
                    total
                )));
            }
            if let Some(bad) = segment.fragments.iter().find(|f| !is_hash_name(&f.hash)) {
                return Err(ClientError::Integrity(format!(
                    "segment {} has malformed fragment hash {:?}",
                    index, bad.hash
                )));
            }
        }

        let expected_segments = self.layout.segment_count(metadata.file_size, encrypted);
        if metadata.segments.len() as u64 != expected_segments {
            return Err(ClientError::Integrity(format!(
                "{} segments recorded, {} expected for {} bytes",
                metadata.segments.len(),
                expected_segments,
                metadata.file_size
            )));
        }

        verify_root(&metadata.segment_hashes(), fid)?;
        Ok(())
    }

    /// Gather at least `data_shards` verified fragments of one segment
    async fn collect_fragments(
        &self,
        fid: &str,
        index: usize,
        segment: &SegmentMeta,
        miners: &mut HashMap<AccountId, Option<MinerInfo>>,
    ) -> Result<Vec<Option<Vec<u8>>>> {
        let required = self.layout.data_shards;
        let fragment_size = self.layout.fragment_size();
        let zero_hash = self.layout.zero_fragment_hash();
        let mut shards: Vec<Option<Vec<u8>>> = vec![None; self.layout.total_shards()];
        let mut available = 0;

        for (shard, fragment) in segment.fragments.iter().enumerate() {
            if available == required {
                break;
            }
            if fragment.hash == zero_hash {
                shards[shard] = Some(vec![0u8; fragment_size]);
                available += 1;
                continue;
            }
            let Some(account) = &fragment.miner else {
                debug!(segment = index, shard, "Fragment has no miner");
                continue;
            };
            let Some(miner) = self.lookup_miner(account, miners).await else {
                continue;
            };
            if self.is_blacklisted(&miner.peer_id) {
                debug!(miner = %miner.account, "Skipping blacklisted miner");
                continue;
            }

            match self.fetch_fragment(fid, &miner, &fragment.hash).await {
                Ok(data) => {
                    shards[shard] = Some(data);
                    available += 1;
                }
                Err(e) => {
                    warn!(
                        segment = index,
                        shard,
                        miner = %miner.account,
                        error = %e,
                        "Fragment unavailable"
                    );
                }
            }
        }

        if available < required {
            return Err(ClientError::SegmentUnrecoverable {
                segment: index,
                available,
                required,
            });
        }
        Ok(shards)
    }

    async fn lookup_miner(
        &self,
        account: &str,
        miners: &mut HashMap<AccountId, Option<MinerInfo>>,
    ) -> Option<MinerInfo> {
        if let Some(cached) = miners.get(account) {
            return cached.clone();
        }
        match self.chain.query_miner(account).await {
            Ok(miner) => {
                if miner.is_none() {
                    warn!(miner = %account, "Miner not registered");
                }
                miners.insert(account.to_string(), miner.clone());
                miner
            }
            Err(e) => {
                warn!(miner = %account, error = %e, "Miner lookup failed");
                None
            }
        }
    }

    async fn fetch_fragment(&self, fid: &str, miner: &MinerInfo, hash: &str) -> Result<Vec<u8>> {
        let result = self.download_fragment(fid, miner, hash).await;
        self.feedback(&miner.peer_id, result.is_ok());
        result
    }

    /// Download one fragment and check its size and hash
    async fn download_fragment(
        &self,
        fid: &str,
        miner: &MinerInfo,
        hash: &str,
    ) -> Result<Vec<u8>> {
        let data = self
            .transport
            .get_fragment(&miner.endpoint, fid, hash, self.layout.fragment_size())
            .await?;
        if data.len() != self.layout.fragment_size() {
            return Err(ClientError::Integrity(format!(
                "fragment {} is {} bytes, expected {}",
                hash,
                data.len(),
                self.layout.fragment_size()
            )));
        }
        let actual = sha256_hex(&data);
        if actual != hash {
            return Err(ClientError::Integrity(format!(
                "fragment {} hashes to {}",
                hash, actual
            )));
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FragmentMeta;
    use crate::keyring::Keyring;
    use crate::static_chain::StaticChain;
    use crate::transport::{MinerTransport, TransportError};
    use cessfs_core::{build_root, Layout};

    const PHRASE: &str =
        "bottom drive obey lake curtain smoke basket hold race lonely fit walk";

    struct NoTransport;

    #[async_trait::async_trait]
    impl MinerTransport for NoTransport {
        async fn put_fragment(
            &self,
            _endpoint: &str,
            _fid: &str,
            _fragment_hash: &str,
            _data: Vec<u8>,
        ) -> std::result::Result<(), TransportError> {
            Err(TransportError::Rejected("offline".to_string()))
        }

        async fn get_fragment(
            &self,
            _endpoint: &str,
            _fid: &str,
            _fragment_hash: &str,
            _max_len: usize,
        ) -> std::result::Result<Vec<u8>, TransportError> {
            Err(TransportError::Rejected("offline".to_string()))
        }
    }

    fn client() -> StorageClient {
        let keyring = Arc::new(Keyring::from_mnemonic(PHRASE).unwrap());
        StorageClient::new(Arc::new(StaticChain::new()), Arc::new(NoTransport), keyring)
            .with_layout(Layout::new(64 * 1024, 4, 2).unwrap())
    }

    fn metadata(segment_hashes: &[String], fragments: usize, file_size: u64) -> FileMetadata {
        FileMetadata {
            fid: build_root(segment_hashes).unwrap(),
            file_size,
            owner: "owner".to_string(),
            file_name: "a.bin".to_string(),
            bucket: "bucket".to_string(),
            territory: "terr".to_string(),
            segments: segment_hashes
                .iter()
                .map(|h| SegmentMeta {
                    hash: h.clone(),
                    fragments: (0..fragments)
                        .map(|i| FragmentMeta {
                            hash: sha256_hex(&[i as u8]),
                            miner: None,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_check_metadata() {
        let client = client();
        let hashes = vec![sha256_hex(b"one"), sha256_hex(b"two")];
        let meta = metadata(&hashes, 6, 100 * 1024);
        let fid = meta.fid.clone();
        assert!(client.check_metadata(&fid, &meta, false).is_ok());

        // Wrong fragment count
        let short = metadata(&hashes, 5, 100 * 1024);
        assert!(matches!(
            client.check_metadata(&fid, &short, false),
            Err(ClientError::Integrity(_))
        ));

        // Size implies a different segment count
        let tiny = metadata(&hashes, 6, 10);
        assert!(matches!(
            client.check_metadata(&fid, &tiny, false),
            Err(ClientError::Integrity(_))
        ));

        // Segment hashes do not root to the fid
        let mut tampered = meta.clone();
        tampered.segments.swap(0, 1);
        assert!(matches!(
            client.check_metadata(&fid, &tampered, false),
            Err(ClientError::Core(_))
        ));
    }

    #[test]
    fn test_check_metadata_for_another_fid() {
        let client = client();
        let hashes = vec![sha256_hex(b"one"), sha256_hex(b"two")];
        let meta = metadata(&hashes, 6, 100 * 1024);
        let asked = sha256_hex(b"some other file");

        // Self-consistent metadata for a different file
        assert!(matches!(
            client.check_metadata(&asked, &meta, false),
            Err(ClientError::Integrity(_))
        ));

        // Record filed under the asked fid but rooted elsewhere
        let mut relabelled = meta.clone();
        relabelled.fid = asked.clone();
        assert!(matches!(
            client.check_metadata(&asked, &relabelled, false),
            Err(ClientError::Core(_))
        ));
    }

    #[tokio::test]
    async fn test_retrieve_rejects_bad_fid() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = client()
            .retrieve_file("not-a-fid", None, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidFid(_)));
    }

    #[tokio::test]
    async fn test_retrieve_unknown_fid() {
        let dir = tempfile::TempDir::new().unwrap();
        let fid = sha256_hex(b"missing");
        let err = client()
            .retrieve_file(&fid, None, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_retrieve_short_circuits_on_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let fid = sha256_hex(b"cached");
        tokio::fs::write(dir.path().join(&fid), b"already here")
            .await
            .unwrap();

        let path = client()
            .retrieve_file(&fid, None, dir.path())
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(path).await.unwrap(), b"already here");
    }

    #[tokio::test]
    async fn test_unreachable_miners_fail_segment() {
        let client = client();
        let segment = SegmentMeta {
            hash: sha256_hex(b"seg"),
            fragments: (0..6)
                .map(|i| FragmentMeta {
                    hash: sha256_hex(&[i as u8]),
                    miner: None,
                })
                .collect(),
        };
        let mut miners = HashMap::new();
        let err = client
            .collect_fragments("fid", 0, &segment, &mut miners)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::SegmentUnrecoverable {
                segment: 0,
                available: 0,
                required: 4
            }
        ));
    }
}
