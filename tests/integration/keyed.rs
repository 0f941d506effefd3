//! Keyed limiters keep keys independent

use std::sync::Arc;
use std::time::Duration;

use slotgate::KeyedLimiter;
use tokio_util::sync::CancellationToken;

use crate::{InFlight, TestError};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_keys_bounded_independently() {
    let keyed = Arc::new(KeyedLimiter::named("per-shard", 2).unwrap());
    let shards: Vec<Arc<InFlight>> = (0..3).map(|_| Arc::new(InFlight::default())).collect();
    let cancel = CancellationToken::new();

    let handles: Vec<_> = (0..24)
        .map(|i| {
            let keyed = keyed.clone();
            let shard = i % 3;
            let in_flight = shards[shard].clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                keyed
                    .run(shard, &cancel, || async {
                        in_flight.enter();
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.exit();
                        Ok::<_, TestError>(())
                    })
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap(), Ok(()));
    }

    for in_flight in &shards {
        assert!(in_flight.peak() <= 2);
    }
    assert_eq!(keyed.len(), 3);
    assert_eq!(keyed.prune_idle(), 3);
    assert!(keyed.is_empty());
}
