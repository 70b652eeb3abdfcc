use crate::*;

use mosaic_core::{ReplicateRequest, SearchRequest, Status};

/// A peer serving tampered chunks is rejected; the honest copy wins.
#[tokio::test]
async fn test_corrupt_peer_is_outvoted() -> Result<()> {
    let data = payload(12_000);
    let (liar, _task) = spawn_fake_peer(FakePeer::Corrupt {
        file: data.clone(),
        chunk_size: 4096,
    })
    .await?;
    let cluster = Cluster::start_with(2, vec![liar.clone()], |_| {}).await?;
    let info = cluster.node(0).import("ledger.db", data.clone()).await;

    let response = expect_replicate(
        cluster
            .request(1, ReplicateRequest { file_info: info.clone() })
            .await?,
    )?;

    assert_eq!(response.status, Status::Success);
    let from_liar: Vec<_> = response
        .node_statuses
        .iter()
        .filter(|s| s.node == liar)
        .collect();
    assert_eq!(from_liar.len(), 3);
    assert!(from_liar.iter().all(|s| s.status == Status::ProcessingError));
    assert_eq!(cluster.node(1).catalog().get(&info.hash), Some(data));
    Ok(())
}

/// Only a corrupt source: nothing is committed.
#[tokio::test]
async fn test_corrupt_only_source_commits_nothing() -> Result<()> {
    let data = payload(5_000);
    let (liar, _task) = spawn_fake_peer(FakePeer::Corrupt {
        file: data.clone(),
        chunk_size: 4096,
    })
    .await?;
    let cluster = Cluster::start_with(1, vec![liar], |_| {}).await?;
    let info = mosaic_core::chunk::file_info("ledger.db", &data, 4096);

    let response = expect_replicate(
        cluster
            .request(0, ReplicateRequest { file_info: info.clone() })
            .await?,
    )?;
    assert_eq!(response.status, Status::ProcessingError);
    assert!(cluster.node(0).catalog().is_empty());
    Ok(())
}

/// A peer that never answers costs one timeout, not the whole request.
#[tokio::test]
async fn test_hanging_peer_times_out() -> Result<()> {
    let (hang, _task) = spawn_fake_peer(FakePeer::Hang).await?;
    let cluster = Cluster::start_with(2, vec![hang.clone()], |s| {
        s.replication_timeout = Duration::from_millis(300);
        s.search_timeout = Duration::from_millis(300);
    })
    .await?;
    let info = cluster.node(0).import("slow.bin", payload(3_000)).await;

    let replicated = expect_replicate(
        cluster
            .request(1, ReplicateRequest { file_info: info.clone() })
            .await?,
    )?;
    assert_eq!(replicated.status, Status::Success);
    let hung = replicated
        .node_statuses
        .iter()
        .find(|s| s.node == hang)
        .context("no status for the hanging peer")?;
    assert_eq!(hung.status, Status::NetworkError);

    let searched = expect_search(
        cluster
            .request(1, SearchRequest { regex: "slow".into() })
            .await?,
    )?;
    assert_eq!(searched.results.len(), 3);
    let hung = searched
        .results
        .iter()
        .find(|r| r.node == hang)
        .context("no result for the hanging peer")?;
    assert_eq!(hung.status, Status::NetworkError);
    assert_eq!(hung.files[0].filename, "slow");
    Ok(())
}

#[tokio::test]
async fn test_peer_closing_early_is_network_error() -> Result<()> {
    let (closer, _task) = spawn_fake_peer(FakePeer::Close).await?;
    let cluster = Cluster::start_with(1, vec![closer.clone()], |_| {}).await?;

    let response = expect_search(
        cluster
            .request(0, SearchRequest { regex: ".".into() })
            .await?,
    )?;
    let closed = response
        .results
        .iter()
        .find(|r| r.node == closer)
        .context("no result for the closing peer")?;
    assert_eq!(closed.status, Status::NetworkError);
    Ok(())
}

/// Bytes that are not a frame are a processing failure, not a network one.
#[tokio::test]
async fn test_garbage_reply_is_processing_error() -> Result<()> {
    let (noisy, _task) = spawn_fake_peer(FakePeer::Garbage).await?;
    let cluster = Cluster::start_with(1, vec![noisy.clone()], |_| {}).await?;

    let response = expect_search(
        cluster
            .request(0, SearchRequest { regex: ".".into() })
            .await?,
    )?;
    let noisy = response
        .results
        .iter()
        .find(|r| r.node == noisy)
        .context("no result for the noisy peer")?;
    assert_eq!(noisy.status, Status::ProcessingError);
    Ok(())
}

/// A caller that stalls mid-header is cut off and the node keeps serving.
#[tokio::test]
async fn test_stalled_caller_is_disconnected() -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let cluster = Cluster::start_with(1, Vec::new(), |s| {
        s.request_timeout = Duration::from_millis(300);
    })
    .await?;
    let address = cluster.address(0);

    let mut stalled = tokio::net::TcpStream::connect((address.host.as_str(), address.port)).await?;
    stalled.write_all(b"MZ\x01").await?;

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), stalled.read(&mut buf))
        .await
        .context("node kept the stalled connection open")?;
    assert_eq!(read.unwrap_or(0), 0);

    let response = expect_search(
        cluster
            .request(0, SearchRequest { regex: ".".into() })
            .await?,
    )?;
    assert_eq!(response.status, Status::Success);
    Ok(())
}
