//! Signed HTTP transport against an axum miner stub

mod common;

use axum::body::{Body, Bytes};
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use axum::Router;
use cessfs_client::keyring::verify_request;
use cessfs_client::transport::{
    FORM_FIELD, HEADER_ACCOUNT, HEADER_FID, HEADER_FRAGMENT, HEADER_MESSAGE, HEADER_SIGNATURE,
};
use cessfs_client::{
    HttpMinerTransport, Keyring, MinerTransport, StaticChain, StorageClient, TransportError,
};
use cessfs_core::sha256_hex;
use common::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Miner stub state
#[derive(Default)]
struct Miner {
    fragments: Mutex<HashMap<String, Vec<u8>>>,
    fids: Mutex<Vec<String>>,
    full: AtomicBool,
    /// Extra bytes appended to every download
    padding: AtomicUsize,
    /// Stream downloads without a Content-Length
    chunked: AtomicBool,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn authorize(headers: &HeaderMap) -> Result<String, (StatusCode, String)> {
    let fid = header(headers, HEADER_FID);
    if fid.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "missing fid".to_string()));
    }
    let ok = verify_request(
        header(headers, HEADER_ACCOUNT),
        header(headers, HEADER_MESSAGE),
        header(headers, HEADER_SIGNATURE),
    );
    if !ok {
        return Err((StatusCode::UNAUTHORIZED, "bad signature".to_string()));
    }
    Ok(fid.to_string())
}

async fn put_fragment(
    State(miner): State<Arc<Miner>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, String) {
    let fid = match authorize(&headers) {
        Ok(fid) => fid,
        Err(rejection) => return rejection,
    };
    if miner.full.load(Ordering::SeqCst) {
        return (
            StatusCode::OK,
            r#"{"code":403,"msg":"no idle space"}"#.to_string(),
        );
    }

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some(FORM_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let Ok(data) = field.bytes().await else {
            return (StatusCode::BAD_REQUEST, "unreadable body".to_string());
        };
        if sha256_hex(&data) != name {
            return (StatusCode::BAD_REQUEST, "hash mismatch".to_string());
        }
        miner.fragments.lock().insert(name, data.to_vec());
        miner.fids.lock().push(fid);
        return (StatusCode::OK, r#"{"code":200,"msg":"ok"}"#.to_string());
    }
    (StatusCode::BAD_REQUEST, "missing file field".to_string())
}

async fn get_fragment(
    State(miner): State<Arc<Miner>>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    authorize(&headers)?;
    let hash = header(&headers, HEADER_FRAGMENT);
    let mut data = miner
        .fragments
        .lock()
        .get(hash)
        .cloned()
        .ok_or((StatusCode::NOT_FOUND, "no such fragment".to_string()))?;
    data.resize(data.len() + miner.padding.load(Ordering::SeqCst), 0);

    if miner.chunked.load(Ordering::SeqCst) {
        let chunks: Vec<Result<Bytes, std::io::Error>> = data
            .chunks(4096)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        return Ok(Body::from_stream(futures::stream::iter(chunks)).into_response());
    }
    Ok(data.into_response())
}

/// Start a miner stub; returns its state and base URL
async fn spawn_miner() -> (Arc<Miner>, String) {
    let miner = Arc::new(Miner::default());
    let app = Router::new()
        .route("/fragment", put(put_fragment).get(get_fragment))
        .with_state(miner.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (miner, format!("http://{}", addr))
}

fn transport() -> HttpMinerTransport {
    let keyring = Arc::new(Keyring::from_mnemonic(PHRASE).unwrap());
    HttpMinerTransport::new(keyring, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_put_then_get_fragment() {
    let (miner, url) = spawn_miner().await;
    let transport = transport();
    let data = pattern(16 * 1024);
    let hash = sha256_hex(&data);
    let fid = sha256_hex(b"file");

    transport
        .put_fragment(&url, &fid, &hash, data.clone())
        .await
        .unwrap();
    assert!(miner.fragments.lock().contains_key(&hash));
    assert_eq!(miner.fids.lock().as_slice(), &[fid.clone()]);

    let fetched = transport
        .get_fragment(&url, &fid, &hash, data.len())
        .await
        .unwrap();
    assert_eq!(fetched, data);
}

#[tokio::test]
async fn test_endpoint_without_scheme() {
    let (_miner, url) = spawn_miner().await;
    let bare = url.trim_start_matches("http://").to_string();
    let data = pattern(1024);
    let hash = sha256_hex(&data);

    transport()
        .put_fragment(&bare, "fid", &hash, data)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_get_missing_fragment() {
    let (_miner, url) = spawn_miner().await;
    let err = transport()
        .get_fragment(&url, "fid", &sha256_hex(b"nothing"), 1024)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_oversized_fragment_refused() {
    let (miner, url) = spawn_miner().await;
    let transport = transport();
    let data = pattern(1024);
    let hash = sha256_hex(&data);
    transport.put_fragment(&url, "fid", &hash, data).await.unwrap();

    miner.padding.store(1, Ordering::SeqCst);
    let err = transport
        .get_fragment(&url, "fid", &hash, 1024)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::TooLarge { limit: 1024 }));
}

#[tokio::test]
async fn test_oversized_stream_cut_off() {
    let (miner, url) = spawn_miner().await;
    let transport = transport();
    let data = pattern(1024);
    let hash = sha256_hex(&data);
    transport.put_fragment(&url, "fid", &hash, data.clone()).await.unwrap();

    // Without a Content-Length the limit applies while reading
    miner.chunked.store(true, Ordering::SeqCst);
    let fetched = transport
        .get_fragment(&url, "fid", &hash, 1024)
        .await
        .unwrap();
    assert_eq!(fetched, data);

    miner.padding.store(64 * 1024, Ordering::SeqCst);
    let err = transport
        .get_fragment(&url, "fid", &hash, 1024)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::TooLarge { limit: 1024 }));
}

#[tokio::test]
async fn test_miner_rejection_in_body() {
    let (miner, url) = spawn_miner().await;
    miner.full.store(true, Ordering::SeqCst);
    let data = pattern(1024);

    let err = transport()
        .put_fragment(&url, "fid", &sha256_hex(&data), data)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Rejected(msg) if msg.contains("403")));
}

#[tokio::test]
async fn test_unsigned_request_refused() {
    let (_miner, url) = spawn_miner().await;
    let response = reqwest::Client::new()
        .get(format!("{}/fragment", url))
        .header(HEADER_FID, "fid")
        .header(HEADER_ACCOUNT, "cXnobody")
        .header(HEADER_MESSAGE, "hello")
        .header(HEADER_SIGNATURE, "1111")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn test_unreachable_miner() {
    let keyring = Arc::new(Keyring::from_mnemonic(PHRASE).unwrap());
    let transport = HttpMinerTransport::new(keyring, Duration::from_millis(500)).unwrap();
    let err = transport
        .get_fragment("http://127.0.0.1:1", "fid", "hash", 1024)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Http(_)));
}

#[tokio::test]
async fn test_store_and_retrieve_over_http() {
    let chain = Arc::new(StaticChain::new());
    let mut stubs = Vec::new();
    for i in 0..6 {
        let (stub, url) = spawn_miner().await;
        let mut info = miner(i);
        info.endpoint = url;
        chain.register_miner(info).await;
        stubs.push(stub);
    }

    let dir = tempfile::TempDir::new().unwrap();
    let keyring = Arc::new(Keyring::from_mnemonic(PHRASE).unwrap());
    let transport = Arc::new(HttpMinerTransport::new(keyring.clone(), Duration::from_secs(5)).unwrap());
    let client = StorageClient::new(chain.clone(), transport, keyring)
        .with_layout(small_layout())
        .with_work_dir(dir.path().join("work"));

    let data = pattern(100 * 1024);
    let file = write_file(dir.path(), "data.bin", &data);
    let want: Vec<String> = (0..6).map(account).collect();
    let report = client
        .store_file(cessfs_client::StoreRequest {
            file,
            cipher_key: None,
            territory: "territory1".to_string(),
            bucket: "bucket-one".to_string(),
            want_miners: want,
        })
        .await
        .unwrap();
    for stub in &stubs {
        assert_eq!(stub.fragments.lock().len(), 2);
        assert!(stub.fids.lock().iter().all(|f| *f == report.fid));
    }

    // Two miners gone: parity covers it
    stubs[0].fragments.lock().clear();
    stubs[4].fragments.lock().clear();

    let path = client
        .retrieve_file(&report.fid, None, &dir.path().join("out"))
        .await
        .unwrap();
    assert_eq!(std::fs::read(path).unwrap(), data);
}
