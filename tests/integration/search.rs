use crate::*;

use mosaic_core::{LocalSearchRequest, SearchRequest, Status};

#[tokio::test]
async fn test_search_spans_cluster() -> Result<()> {
    let cluster = Cluster::start(3).await?;
    cluster.node(0).import("cat.jpg", payload(10)).await;
    cluster.node(1).import("dog.jpg", payload(20)).await;
    cluster.node(1).import("readme.md", payload(30)).await;
    cluster.node(2).import("notes.txt", payload(40)).await;

    let response = expect_search(
        cluster
            .request(1, SearchRequest { regex: r"\.jpg$".into() })
            .await?,
    )?;

    assert_eq!(response.status, Status::Success);
    assert_eq!(response.results.len(), 3);
    assert_eq!(response.results[0].node, cluster.address(1));

    let mut found: Vec<(Node, Vec<String>)> = response
        .results
        .into_iter()
        .map(|r| (r.node, r.files.into_iter().map(|f| f.filename).collect()))
        .collect();
    found.sort();
    let mut expected = vec![
        (cluster.address(0), vec!["cat.jpg".to_string()]),
        (cluster.address(1), vec!["dog.jpg".to_string()]),
        (cluster.address(2), Vec::new()),
    ];
    expected.sort();
    assert_eq!(found, expected);
    Ok(())
}

/// A blank pattern is rejected before any peer is contacted.
#[tokio::test]
async fn test_search_blank_pattern() -> Result<()> {
    let (hang, _task) = spawn_fake_peer(FakePeer::Hang).await?;
    let cluster = Cluster::start_with(1, vec![hang], |s| {
        s.search_timeout = Duration::from_secs(30);
    })
    .await?;

    // Would block on the hanging peer if it were queried.
    let reply = tokio::time::timeout(
        Duration::from_secs(5),
        cluster.request(0, SearchRequest { regex: "   ".into() }),
    )
    .await
    .context("blank search waited on a peer")??;
    let response = expect_search(reply)?;

    assert_eq!(response.status, Status::MessageError);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].files[0].filename, "   ");
    Ok(())
}

#[tokio::test]
async fn test_search_invalid_pattern() -> Result<()> {
    let cluster = Cluster::start(2).await?;
    let response = expect_search(
        cluster
            .request(0, SearchRequest { regex: "(*".into() })
            .await?,
    )?;
    assert_eq!(response.status, Status::MessageError);
    assert!(response.error_message.is_some());
    Ok(())
}

/// Two of four peers are down: five entries, two of them NETWORK_ERROR.
#[tokio::test]
async fn test_search_partial_failure() -> Result<()> {
    let dead_a = dead_address().await?;
    let dead_b = dead_address().await?;
    let cluster = Cluster::start_with(3, vec![dead_a.clone(), dead_b.clone()], |_| {}).await?;
    cluster.node(2).import("plan.pdf", payload(64)).await;

    let response = expect_search(
        cluster
            .request(0, SearchRequest { regex: "plan".into() })
            .await?,
    )?;

    assert_eq!(response.status, Status::Success);
    assert_eq!(response.results.len(), 5);
    let failed: Vec<&Node> = response
        .results
        .iter()
        .filter(|r| r.status == Status::NetworkError)
        .map(|r| &r.node)
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.contains(&&dead_a));
    assert!(failed.contains(&&dead_b));

    let hits: usize = response
        .results
        .iter()
        .filter(|r| r.status == Status::Success)
        .map(|r| r.files.len())
        .sum();
    assert_eq!(hits, 1);
    Ok(())
}

/// Peers answer local searches without fanning out further.
#[tokio::test]
async fn test_local_search_stays_local() -> Result<()> {
    let cluster = Cluster::start(2).await?;
    cluster.node(0).import("only-here.txt", payload(5)).await;
    cluster.node(1).import("only-there.txt", payload(6)).await;

    let reply = cluster
        .request(0, LocalSearchRequest { regex: "only".into() })
        .await?;
    let Message::LocalSearchResponse(response) = reply else {
        bail!("expected a local search response");
    };
    assert_eq!(response.status, Status::Success);
    assert_eq!(response.files.len(), 1);
    assert_eq!(response.files[0].filename, "only-here.txt");
    Ok(())
}
