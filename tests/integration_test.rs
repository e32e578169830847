//! End-to-end tests of the SLCP server over loopback TCP

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use slc::context::ContextStats;
use slc::server::{ServerConfig, SlcpServer};
use slc::{encode, Authenticator, SlcError, SlcpClient, StorageConfig};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const TOKEN: &str = "s3cret";

async fn start_server(data_dir: &Path) -> SocketAddr {
    let config = ServerConfig {
        storage: StorageConfig::with_data_dir(data_dir),
        ..Default::default()
    };
    let server = Arc::new(
        SlcpServer::with_authenticator(config, Authenticator::Static(TOKEN.into())).unwrap(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { server.serve(listener).await });
    addr
}

/// Send raw bytes, half-close, and collect everything the server says
async fn exchange(addr: SocketAddr, chunks: &[&[u8]]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    for chunk in chunks {
        stream.write_all(chunk).await.unwrap();
        stream.flush().await.unwrap();
    }
    stream.shutdown().await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

async fn request(addr: SocketAddr, payload: &[u8]) -> String {
    exchange(addr, &[payload]).await
}

fn read_meta(dir: &Path, ctx: &str) -> ContextStats {
    let bytes = std::fs::read(dir.join(format!("{}.meta", ctx))).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_process_and_search_with_client() {
    let dir = TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let lines = [
        "Jan 12 10:00:01 host sshd[42]: Accepted publickey for root from 1.2.3.4",
        "Jan 12 10:00:05 host CRON[77]: session opened for user root",
        "Jan 12 10:01:00 host sshd[42]: Disconnected from 1.2.3.4 port 52022",
    ];

    let mut client = SlcpClient::connect(addr).await.unwrap();
    client.auth(TOKEN).await.unwrap();
    client.context("adminlog").await.unwrap();
    for line in lines {
        client.process(line).await.unwrap();
    }
    assert_eq!(client.search("sshd").await.unwrap(), 2);
    assert_eq!(client.search("1.2.3.4").await.unwrap(), 2);
    assert_eq!(client.search("10:00:05").await.unwrap(), 1);
    assert_eq!(client.search("session opened").await.unwrap(), 1);
    assert_eq!(client.finish().await.unwrap(), 0);

    let stats = read_meta(dir.path(), "adminlog");
    assert_eq!(stats.succ, 3);
    assert_eq!(stats.errs, 0);
    assert_eq!(stats.b, lines.iter().map(|l| l.len() as u64 + 1).sum::<u64>());
    assert_eq!(
        stats.bc,
        lines.iter().map(|l| encode(l).len() as u64 + 1).sum::<u64>()
    );
    assert!(stats.bc < stats.b);
}

#[tokio::test]
async fn test_resume_across_connections() {
    let dir = TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let response = request(addr, b"AUTH s3cret\nCONTEXT app\nPROCESS first error\n").await;
    assert_eq!(response, "");

    let response = request(
        addr,
        b"AUTH s3cret\nCONTEXT app\nPROCESS second error\nSEARCH error\n",
    )
    .await;
    assert_eq!(response, "RESULTS 2\n");
    assert_eq!(read_meta(dir.path(), "app").succ, 2);
}

#[tokio::test]
async fn test_chunked_commands_match_single_write() {
    let payload: &[u8] = b"AUTH s3cret\nCONTEXT web\nPROCESS GET /index ok\nSEARCH index\n";

    let dir = TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;
    let whole = request(addr, payload).await;
    assert_eq!(whole, "RESULTS 1\n");

    for cut in [1, 5, 12, 13, 30, payload.len() - 1] {
        let dir = TempDir::new().unwrap();
        let addr = start_server(dir.path()).await;
        let split = exchange(addr, &[&payload[..cut], &payload[cut..]]).await;
        assert_eq!(split, whole, "split at {}", cut);
    }
}

#[tokio::test]
async fn test_process_before_auth_is_rejected() {
    let dir = TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let response = request(addr, b"PROCESS sneaky line\nAUTH s3cret\n").await;
    assert_eq!(response, "ERROR process\n");

    let response = request(addr, b"SEARCH sneaky\n").await;
    assert_eq!(response, "ERROR search\n");

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_process_before_context_is_rejected() {
    let dir = TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let response = request(addr, b"AUTH s3cret\nPROCESS no context yet\n").await;
    assert_eq!(response, "ERROR process\n");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_terminating_errors() {
    let dir = TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let cases: [(&[u8], &str); 4] = [
        (b"AUTH wrong\nCONTEXT web\n", "ERROR auth\n"),
        (b"AUTH s3cret\nCONTEXT web2\nSEARCH x\n", "ERROR context\n"),
        (b"AUTH s3cret\nCONTEXT web\nQUIT\nSEARCH x\n", "ERROR cmd\n"),
        (b"HELLO\n", "ERROR cmd\n"),
    ];
    for (payload, expected) in cases {
        assert_eq!(request(addr, payload).await, expected);
    }
}

#[tokio::test]
async fn test_client_reports_rejected_token() {
    let dir = TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let mut client = SlcpClient::connect(addr).await.unwrap();
    client.auth("wrong").await.unwrap();
    let err = client.search("anything").await.unwrap_err();
    assert!(matches!(err, SlcError::Auth(_)));
}

#[tokio::test]
async fn test_concurrent_sessions_share_context() {
    let dir = TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let mut tasks = Vec::new();
    for worker in 0..4 {
        tasks.push(tokio::spawn(async move {
            let mut client = SlcpClient::connect(addr).await.unwrap();
            client.auth(TOKEN).await.unwrap();
            client.context("shared").await.unwrap();
            for i in 0..20 {
                client
                    .process(&format!("worker {} wrote line {}", worker, i))
                    .await
                    .unwrap();
            }
            // Forces every PROCESS above to be handled before returning
            client.search("wrote").await.unwrap();
            client.finish().await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let response = request(addr, b"AUTH s3cret\nCONTEXT shared\nSEARCH wrote\n").await;
    assert_eq!(response, "RESULTS 80\n");

    let stats = read_meta(dir.path(), "shared");
    assert_eq!(stats.succ, 80);
    let log = std::fs::read_to_string(dir.path().join("shared.bin")).unwrap();
    assert_eq!(log.lines().count(), 80);
}

#[tokio::test]
async fn test_search_alignment_limitation() {
    let dir = TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let response = request(
        addr,
        b"AUTH s3cret\nCONTEXT app\nPROCESS an error occurred\nSEARCH error\nSEARCH rror\n",
    )
    .await;
    // "rror" starts mid-run, so its packed form differs from the stored one
    assert_eq!(response, "RESULTS 1\nRESULTS 0\n");
}
