//! Storage client shared by the store and retrieve drivers

use crate::chain::ChainClient;
use crate::keyring::Keyring;
use crate::transport::MinerTransport;
use cessfs_core::Layout;
use cessfs_network::NodeSelector;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stores and retrieves files for one account
pub struct StorageClient {
    pub(crate) chain: Arc<dyn ChainClient>,
    pub(crate) transport: Arc<dyn MinerTransport>,
    pub(crate) keyring: Arc<Keyring>,
    pub(crate) layout: Layout,
    pub(crate) work_dir: PathBuf,
    pub(crate) selector: Option<Arc<NodeSelector>>,
}

impl StorageClient {
    /// Create a client with the default layout, working in the system temp dir
    pub fn new(
        chain: Arc<dyn ChainClient>,
        transport: Arc<dyn MinerTransport>,
        keyring: Arc<Keyring>,
    ) -> Self {
        Self {
            chain,
            transport,
            keyring,
            layout: Layout::default(),
            work_dir: std::env::temp_dir(),
            selector: None,
        }
    }

    /// Use a custom segment layout
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Put scratch directories under `dir`
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Report miner outcomes to `selector` and skip its blacklisted peers
    pub fn with_selector(mut self, selector: Arc<NodeSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Account the client acts as
    pub fn account(&self) -> &str {
        self.keyring.account()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub(crate) fn feedback(&self, peer_id: &str, ok: bool) {
        if let Some(selector) = &self.selector {
            selector.feedback(peer_id, ok);
        }
    }

    pub(crate) fn is_blacklisted(&self, peer_id: &str) -> bool {
        self.selector
            .as_ref()
            .is_some_and(|s| s.is_blacklisted(peer_id))
    }
}
