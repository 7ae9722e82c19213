mod common;

use std::sync::Arc;

use aate::error::FeedError;
use aate::feed::{FeedProducer, ObservationFeed, ReplayConnector};
use aate::logging::MemorySink;
use aate::ShutdownHandle;
use common::{bars, SYMBOL};

/// Arrival order t1, t3, t2: t2 is rejected and subscribers only see t1, t3
#[test]
fn late_observation_is_rejected_and_never_delivered() {
    tokio_test::block_on(async {
        let sink = Arc::new(MemorySink::new());
        let feed = ObservationFeed::new(16, 100, sink.clone());
        let data = bars(SYMBOL, 3);
        let mut sub = feed.subscribe(&[SYMBOL.to_string()]).await;

        feed.ingest(data[0].clone()).await.unwrap();
        feed.ingest(data[2].clone()).await.unwrap();
        let err = feed.ingest(data[1].clone()).await.unwrap_err();
        assert!(matches!(err, FeedError::OutOfOrderObservation { .. }));

        assert_eq!(sub.recv().await.unwrap().timestamp, data[0].timestamp);
        assert_eq!(sub.recv().await.unwrap().timestamp, data[2].timestamp);

        let window = feed.window(SYMBOL, 10).await;
        let stamps: Vec<_> = window.observations().iter().map(|o| o.timestamp).collect();
        assert_eq!(stamps, vec![data[0].timestamp, data[2].timestamp]);

        let stats = feed.stats().await;
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.out_of_order, 1);
        assert_eq!(sink.count("observation_rejected"), 1);
    });
}

#[tokio::test]
async fn producer_replay_is_strictly_increasing_per_symbol() {
    let feed = Arc::new(ObservationFeed::new(256, 1000, Arc::new(MemorySink::new())));
    let mut data = bars(SYMBOL, 50);
    data.swap(10, 11);
    data.push(data[20].clone());

    let report = FeedProducer::spawn(
        Box::new(ReplayConnector::new(data, 7)),
        feed.clone(),
        std::time::Duration::from_millis(1),
        ShutdownHandle::new(),
    )
    .await
    .unwrap();

    assert!(report.exhausted);
    assert_eq!(report.accepted + report.rejected, 51);

    let window = feed.window(SYMBOL, 1000).await;
    assert_eq!(window.len() as u64, report.accepted);
    assert!(window
        .observations()
        .windows(2)
        .all(|pair| pair[0].timestamp < pair[1].timestamp));

    let stats = feed.stats().await;
    assert_eq!(stats.out_of_order, 1);
    assert_eq!(stats.duplicates, 1);
}
