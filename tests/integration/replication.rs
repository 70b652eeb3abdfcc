use crate::*;

use mosaic_core::chunk::file_info;
use mosaic_core::hash::hash;
use mosaic_core::{ReplicateRequest, Status};

/// A 10,000-byte file held by node 0 is pulled by node 1 in three chunks.
#[tokio::test]
async fn test_replicate_pulls_from_holder() -> Result<()> {
    let cluster = Cluster::start(3).await?;
    let data = payload(10_000);
    let info = cluster.node(0).import("survey.csv", data.clone()).await;
    let sizes: Vec<u32> = info.chunks.iter().map(|c| c.size).collect();
    assert_eq!(sizes, vec![4096, 4096, 1808]);

    let reply = cluster
        .request(1, ReplicateRequest { file_info: info.clone() })
        .await?;
    let response = expect_replicate(reply)?;

    assert_eq!(response.status, Status::Success);
    // 3 chunks × 2 peers; node 2 does not hold the file.
    assert_eq!(response.node_statuses.len(), 6);
    for status in &response.node_statuses {
        if status.node == cluster.address(0) {
            assert_eq!(status.status, Status::Success);
        } else {
            assert_eq!(status.node, cluster.address(2));
            assert_eq!(status.status, Status::ProcessingError);
        }
    }

    let stored = cluster.node(1).catalog().get(&info.hash).context("not committed")?;
    assert_eq!(stored, data);
    assert_eq!(hash(&stored), info.hash);
    assert!(cluster.node(2).catalog().is_empty());
    Ok(())
}

/// A second request for resident content is answered locally.
#[tokio::test]
async fn test_replicate_twice_records_duplicate() -> Result<()> {
    let cluster = Cluster::start(2).await?;
    let info = cluster.node(0).import("a.bin", payload(5_000)).await;

    let first = expect_replicate(
        cluster
            .request(1, ReplicateRequest { file_info: info.clone() })
            .await?,
    )?;
    assert_eq!(first.status, Status::Success);

    let mut renamed = info.clone();
    renamed.filename = "b.bin".into();
    let second = expect_replicate(
        cluster
            .request(1, ReplicateRequest { file_info: renamed })
            .await?,
    )?;

    assert_eq!(second.status, Status::Success);
    assert_eq!(second.node_statuses.len(), 1);
    assert_eq!(second.node_statuses[0].node, cluster.address(1));

    let catalog = cluster.node(1).catalog();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.all()[0].filename, "a.bin");
    assert_eq!(catalog.duplicate_count(), 1);
    Ok(())
}

/// Replicating onto the node that already holds the file is a duplicate.
#[tokio::test]
async fn test_replicate_on_holder_is_duplicate() -> Result<()> {
    let cluster = Cluster::start(2).await?;
    let info = cluster.node(0).import("local.txt", payload(100)).await;

    let response = expect_replicate(
        cluster
            .request(0, ReplicateRequest { file_info: info })
            .await?,
    )?;
    assert_eq!(response.status, Status::Success);
    assert_eq!(response.node_statuses[0].node, cluster.address(0));
    assert_eq!(cluster.node(0).catalog().duplicate_count(), 1);
    Ok(())
}

/// Concurrent requests for one hash produce one entry and N-1 duplicates.
#[tokio::test]
async fn test_concurrent_replicates_commit_once() -> Result<()> {
    let cluster = Arc::new(Cluster::start(2).await?);
    let info = cluster.node(0).import("shared.iso", payload(40_000)).await;

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let cluster = cluster.clone();
        let info = info.clone();
        tasks.push(tokio::spawn(async move {
            cluster
                .request(1, ReplicateRequest { file_info: info })
                .await
                .and_then(expect_replicate)
        }));
    }
    for task in tasks {
        assert_eq!(task.await??.status, Status::Success);
    }

    let catalog = cluster.node(1).catalog();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.duplicate_count(), 4);
    Ok(())
}

/// A lone node whose only peer is down cannot assemble the file.
#[tokio::test]
async fn test_replicate_with_dead_peer_fails() -> Result<()> {
    let dead = dead_address().await?;
    let cluster = Cluster::start_with(1, vec![dead.clone()], |_| {}).await?;
    let info = file_info("missing.bin", &payload(1_000), 4096);

    let response = expect_replicate(
        cluster
            .request(0, ReplicateRequest { file_info: info.clone() })
            .await?,
    )?;

    assert_eq!(response.status, Status::ProcessingError);
    assert_eq!(response.node_statuses.len(), 1);
    assert_eq!(response.node_statuses[0].node, dead);
    assert_eq!(response.node_statuses[0].status, Status::NetworkError);
    assert!(cluster.node(0).catalog().lookup_by_hash(&info.hash).is_none());
    Ok(())
}

#[tokio::test]
async fn test_replicate_empty_filename_rejected() -> Result<()> {
    let cluster = Cluster::start(2).await?;
    let mut info = cluster.node(0).import("x.txt", payload(10)).await;
    info.filename = String::new();

    let response = expect_replicate(
        cluster
            .request(1, ReplicateRequest { file_info: info })
            .await?,
    )?;
    assert_eq!(response.status, Status::MessageError);
    assert!(cluster.node(1).catalog().is_empty());
    Ok(())
}

/// Chunk boundaries depend on the configured size; all nodes must agree.
#[tokio::test]
async fn test_replicate_with_small_chunks() -> Result<()> {
    let cluster = Cluster::start_with(3, Vec::new(), |s| s.chunk_size = 100).await?;
    let data = payload(2_550);
    let info = cluster.node(2).import("small.dat", data.clone()).await;
    assert_eq!(info.chunks.len(), 26);

    let response = expect_replicate(
        cluster
            .request(0, ReplicateRequest { file_info: info.clone() })
            .await?,
    )?;
    assert_eq!(response.status, Status::Success);
    assert_eq!(cluster.node(0).catalog().get(&info.hash), Some(data));
    Ok(())
}
