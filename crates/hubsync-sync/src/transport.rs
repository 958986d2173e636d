//! RPC abstraction for the sync protocol.
//!
//! [`PeerClient`] is what a sync pass calls against a remote hub;
//! [`SyncServer`] is what a hub exposes to peers calling in. Real network
//! transports live outside this crate.

use async_trait::async_trait;

use hubsync_core::{Message, SyncId};

use crate::error::{Result, SyncError};
use crate::messages::{PeerId, SyncErrorCode, SyncRequest, SyncResponse, PROTOCOL_VERSION};
use crate::snapshot::Snapshot;
use crate::trie::TrieNodeMetadata;

/// Client side of the sync RPC.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// The peer this client talks to.
    fn peer_id(&self) -> PeerId;

    async fn get_sync_snapshot(&self) -> Result<Snapshot>;

    async fn get_sync_metadata_by_prefix(&self, prefix: &[u8]) -> Result<TrieNodeMetadata>;

    async fn get_sync_ids_by_prefix(&self, prefix: &[u8]) -> Result<Vec<SyncId>>;

    async fn get_messages_by_ids(&self, ids: &[SyncId]) -> Result<Vec<Message>>;
}

/// Server side of the sync RPC.
#[async_trait]
pub trait SyncServer: Send + Sync {
    async fn sync_snapshot(&self) -> Result<Snapshot>;

    /// Metadata for `prefix`; an empty node when nothing is stored there.
    async fn sync_metadata_by_prefix(&self, prefix: &[u8]) -> Result<TrieNodeMetadata>;

    async fn sync_ids_by_prefix(&self, prefix: &[u8]) -> Result<Vec<SyncId>>;

    /// Stored messages among `ids`. Unknown ids are skipped.
    async fn messages_by_ids(&self, ids: &[SyncId]) -> Result<Vec<Message>>;

    /// Serve one wire request.
    async fn handle(&self, request: SyncRequest) -> SyncResponse {
        if let Err(reason) = request.validate_limits() {
            return SyncResponse::Error {
                code: SyncErrorCode::MessageTooLarge,
                message: reason.into(),
            };
        }
        let result = match request {
            SyncRequest::GetSnapshot { protocol_version } => {
                if protocol_version != PROTOCOL_VERSION {
                    return SyncResponse::Error {
                        code: SyncErrorCode::VersionMismatch,
                        message: format!(
                            "local={}, peer={}",
                            PROTOCOL_VERSION, protocol_version
                        ),
                    };
                }
                self.sync_snapshot().await.map(SyncResponse::Snapshot)
            }
            SyncRequest::GetMetadataByPrefix { prefix } => self
                .sync_metadata_by_prefix(&prefix)
                .await
                .map(SyncResponse::Metadata),
            SyncRequest::GetSyncIdsByPrefix { prefix } => self
                .sync_ids_by_prefix(&prefix)
                .await
                .map(SyncResponse::SyncIds),
            SyncRequest::GetMessagesByIds { ids } => self
                .messages_by_ids(&ids)
                .await
                .map(SyncResponse::Messages),
        };
        match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "sync request failed");
                SyncResponse::Error {
                    code: e.code(),
                    message: e.to_string(),
                }
            }
        }
    }
}

/// In-process client for tests and single-process setups.
///
/// Requests and responses are round-tripped through CBOR so the wire types
/// are exercised exactly as a network transport would.
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    pub struct MemoryPeerClient {
        peer_id: PeerId,
        server: Arc<dyn SyncServer>,
        latency: Option<Duration>,
        offline: AtomicBool,
        calls: AtomicU64,
    }

    impl MemoryPeerClient {
        pub fn new(peer_id: PeerId, server: Arc<dyn SyncServer>) -> Self {
            Self {
                peer_id,
                server,
                latency: None,
                offline: AtomicBool::new(false),
                calls: AtomicU64::new(0),
            }
        }

        /// Delay every call by `latency`.
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        /// Make every call fail with a transport error.
        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        /// Number of requests sent so far.
        pub fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }

        async fn call(&self, request: SyncRequest) -> Result<SyncResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if self.offline.load(Ordering::SeqCst) {
                return Err(SyncError::TransportError("peer unreachable".into()));
            }

            let request = roundtrip(&request)?;
            let response = roundtrip(&self.server.handle(request).await)?;
            if let Err(reason) = response.validate_limits() {
                return Err(SyncError::InvalidMessage(reason.into()));
            }
            match response {
                SyncResponse::Error { code, message } => Err(SyncError::PeerError { code, message }),
                other => Ok(other),
            }
        }
    }

    fn roundtrip<T>(value: &T) -> Result<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| SyncError::TransportError(format!("encode: {}", e)))?;
        ciborium::from_reader(buf.as_slice())
            .map_err(|e| SyncError::TransportError(format!("decode: {}", e)))
    }

    fn unexpected(response: SyncResponse) -> SyncError {
        SyncError::InvalidMessage(format!(
            "unexpected response {:?}",
            std::mem::discriminant(&response)
        ))
    }

    #[async_trait]
    impl PeerClient for MemoryPeerClient {
        fn peer_id(&self) -> PeerId {
            self.peer_id
        }

        async fn get_sync_snapshot(&self) -> Result<Snapshot> {
            match self
                .call(SyncRequest::GetSnapshot {
                    protocol_version: PROTOCOL_VERSION,
                })
                .await?
            {
                SyncResponse::Snapshot(snapshot) => Ok(snapshot),
                other => Err(unexpected(other)),
            }
        }

        async fn get_sync_metadata_by_prefix(&self, prefix: &[u8]) -> Result<TrieNodeMetadata> {
            match self
                .call(SyncRequest::GetMetadataByPrefix {
                    prefix: prefix.to_vec(),
                })
                .await?
            {
                SyncResponse::Metadata(meta) => Ok(meta),
                other => Err(unexpected(other)),
            }
        }

        async fn get_sync_ids_by_prefix(&self, prefix: &[u8]) -> Result<Vec<SyncId>> {
            match self
                .call(SyncRequest::GetSyncIdsByPrefix {
                    prefix: prefix.to_vec(),
                })
                .await?
            {
                SyncResponse::SyncIds(ids) => Ok(ids),
                other => Err(unexpected(other)),
            }
        }

        async fn get_messages_by_ids(&self, ids: &[SyncId]) -> Result<Vec<Message>> {
            match self
                .call(SyncRequest::GetMessagesByIds { ids: ids.to_vec() })
                .await?
            {
                SyncResponse::Messages(messages) => Ok(messages),
                other => Err(unexpected(other)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryPeerClient;
    use super::*;
    use crate::trie::MerkleTrie;
    use hubsync_core::MessageHash;
    use std::sync::{Arc, RwLock};

    struct TrieOnlyServer {
        trie: RwLock<MerkleTrie>,
    }

    #[async_trait]
    impl SyncServer for TrieOnlyServer {
        async fn sync_snapshot(&self) -> Result<Snapshot> {
            let trie = self.trie.read().unwrap();
            Ok(Snapshot::compute(&trie, 1_000))
        }

        async fn sync_metadata_by_prefix(&self, prefix: &[u8]) -> Result<TrieNodeMetadata> {
            let trie = self.trie.read().unwrap();
            Ok(trie
                .get_node_metadata(prefix)
                .unwrap_or_else(|| TrieNodeMetadata::empty(prefix)))
        }

        async fn sync_ids_by_prefix(&self, prefix: &[u8]) -> Result<Vec<SyncId>> {
            Ok(self.trie.read().unwrap().sync_ids_by_prefix(prefix, 1024))
        }

        async fn messages_by_ids(&self, _ids: &[SyncId]) -> Result<Vec<Message>> {
            Err(SyncError::TransportError("no message store".into()))
        }
    }

    fn client() -> MemoryPeerClient {
        let mut trie = MerkleTrie::new();
        trie.insert(&SyncId::new(7, &MessageHash::from_bytes([3; 20])))
            .unwrap();
        let server = Arc::new(TrieOnlyServer {
            trie: RwLock::new(trie),
        });
        MemoryPeerClient::new(PeerId::from_bytes([1; 32]), server)
    }

    #[tokio::test]
    async fn test_roundtrip_metadata_and_ids() {
        let client = client();
        let root = client.get_sync_metadata_by_prefix(&[]).await.unwrap();
        assert_eq!(root.num_messages, 1);
        let ids = client.get_sync_ids_by_prefix(&[]).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(client.get_sync_snapshot().await.unwrap().num_messages, 1);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_server_error_surfaces_as_peer_error() {
        let client = client();
        let err = client.get_messages_by_ids(&[]).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::PeerError {
                code: SyncErrorCode::InternalError,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_bad_request_maps_to_invalid_message() {
        struct Rejecting;

        #[async_trait]
        impl SyncServer for Rejecting {
            async fn sync_snapshot(&self) -> Result<Snapshot> {
                Err(SyncError::VersionMismatch { local: 1, peer: 2 })
            }

            async fn sync_metadata_by_prefix(&self, _prefix: &[u8]) -> Result<TrieNodeMetadata> {
                Err(hubsync_core::CoreError::MalformedSyncId { expected: 24, got: 3 }.into())
            }

            async fn sync_ids_by_prefix(&self, _prefix: &[u8]) -> Result<Vec<SyncId>> {
                Err(SyncError::InvalidMessage("bad prefix".into()))
            }

            async fn messages_by_ids(&self, _ids: &[SyncId]) -> Result<Vec<Message>> {
                Err(SyncError::Timeout("store".into()))
            }
        }

        let client = MemoryPeerClient::new(PeerId::from_bytes([2; 32]), Arc::new(Rejecting));
        let code = |err: SyncError| match err {
            SyncError::PeerError { code, .. } => code,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            code(client.get_sync_snapshot().await.unwrap_err()),
            SyncErrorCode::VersionMismatch
        );
        assert_eq!(
            code(client.get_sync_metadata_by_prefix(&[]).await.unwrap_err()),
            SyncErrorCode::InvalidMessage
        );
        assert_eq!(
            code(client.get_sync_ids_by_prefix(&[]).await.unwrap_err()),
            SyncErrorCode::InvalidMessage
        );
        assert_eq!(
            code(client.get_messages_by_ids(&[]).await.unwrap_err()),
            SyncErrorCode::InternalError
        );
    }

    #[tokio::test]
    async fn test_oversized_request_rejected_by_server() {
        let client = client();
        let err = client
            .get_sync_ids_by_prefix(&[0u8; 30])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::PeerError {
                code: SyncErrorCode::MessageTooLarge,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_offline_client_fails() {
        let client = client();
        client.set_offline(true);
        assert!(matches!(
            client.get_sync_snapshot().await,
            Err(SyncError::TransportError(_))
        ));
    }
}
