mod common;

use chrono::Duration;
use common::{create_object, create_object_expiring, now, rand_object_stream, test_db};
use metabase::{DeleteExpiredObjects, MetabaseError};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn removes_only_expired_objects() {
    let t = test_db().await;
    let now = now();
    let past = now - Duration::hours(1);
    let future = now + Duration::hours(1);

    let expired1 = rand_object_stream();
    let expired2 = rand_object_stream();
    let live = rand_object_stream();
    let forever = rand_object_stream();

    create_object_expiring(&t.db, &expired1, 1, Some(past)).await;
    create_object_expiring(&t.db, &expired2, 3, Some(past)).await;
    let live_raw = create_object_expiring(&t.db, &live, 1, Some(future)).await;
    let forever_raw = create_object(&t.db, &forever, 1).await;

    t.db
        .delete_expired_objects(
            DeleteExpiredObjects {
                expired_before: now,
                as_of_system_time: None,
                batch_size: 0,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut expected = vec![live_raw, forever_raw];
    expected.sort_by(|a, b| a.stream.cmp(&b.stream));
    assert_eq!(t.db.testing_all_objects().await.unwrap(), expected);

    let segments = t.db.testing_all_segments().await.unwrap();
    assert_eq!(segments.len(), 2);
    assert!(
        segments
            .iter()
            .all(|segment| segment.stream_id == live.stream_id || segment.stream_id == forever.stream_id)
    );
}

#[tokio::test]
async fn cutoff_is_exclusive() {
    let t = test_db().await;
    let cutoff = now();
    let obj = rand_object_stream();
    create_object_expiring(&t.db, &obj, 1, Some(cutoff)).await;

    t.db
        .delete_expired_objects(
            DeleteExpiredObjects {
                expired_before: cutoff,
                as_of_system_time: None,
                batch_size: 0,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(t.db.testing_all_objects().await.unwrap().len(), 1);
}

#[tokio::test]
async fn every_batch_size_reaches_all_expired_objects() {
    let past = now() - Duration::minutes(5);

    for batch_size in [1, 2, 3, 7, 1000, 5000] {
        let t = test_db().await;
        let mut kept = Vec::new();
        for i in 0..7 {
            let obj = rand_object_stream();
            if i % 3 == 0 {
                kept.push(create_object(&t.db, &obj, 1).await);
            } else {
                create_object_expiring(&t.db, &obj, 2, Some(past)).await;
            }
        }

        t.db
            .delete_expired_objects(
                DeleteExpiredObjects {
                    expired_before: now(),
                    as_of_system_time: None,
                    batch_size,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        kept.sort_by(|a, b| a.stream.cmp(&b.stream));
        assert_eq!(
            t.db.testing_all_objects().await.unwrap(),
            kept,
            "batch size {batch_size}"
        );
        assert_eq!(t.db.testing_all_segments().await.unwrap().len(), kept.len());
    }
}

#[tokio::test]
async fn historical_read_request_is_ignored_on_sqlite() {
    let t = test_db().await;
    assert!(!t.db.supports_as_of_system_time());

    let obj = rand_object_stream();
    create_object_expiring(&t.db, &obj, 1, Some(now() - Duration::hours(1))).await;

    t.db
        .delete_expired_objects(
            DeleteExpiredObjects {
                expired_before: now(),
                as_of_system_time: Some(now() - Duration::seconds(10)),
                batch_size: 0,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(t.db.testing_all_objects().await.unwrap().is_empty());
}

#[tokio::test]
async fn rerun_is_a_no_op() {
    let t = test_db().await;
    let obj = rand_object_stream();
    create_object_expiring(&t.db, &obj, 1, Some(now() - Duration::hours(1))).await;
    let opts = DeleteExpiredObjects {
        expired_before: now(),
        as_of_system_time: None,
        batch_size: 1,
    };
    let cancel = CancellationToken::new();

    t.db.delete_expired_objects(opts.clone(), &cancel).await.unwrap();
    t.db.delete_expired_objects(opts, &cancel).await.unwrap();

    assert!(t.db.testing_all_objects().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_is_honored_before_the_first_batch() {
    let t = test_db().await;
    let obj = rand_object_stream();
    create_object_expiring(&t.db, &obj, 1, Some(now() - Duration::hours(1))).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = t
        .db
        .delete_expired_objects(
            DeleteExpiredObjects {
                expired_before: now(),
                as_of_system_time: None,
                batch_size: 0,
            },
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MetabaseError::Cancelled));
    assert_eq!(t.db.testing_all_objects().await.unwrap().len(), 1);
}

#[tokio::test]
async fn partial_batch_failure_is_surfaced() {
    let t = test_db().await;
    let past = now() - Duration::hours(1);
    let good = rand_object_stream();
    let bad = rand_object_stream();
    create_object_expiring(&t.db, &good, 1, Some(past)).await;
    create_object_expiring(&t.db, &bad, 1, Some(past)).await;
    common::corrupt_segment_pieces(&t, bad.stream_id).await;

    let err = t
        .db
        .delete_expired_objects(
            DeleteExpiredObjects {
                expired_before: now(),
                as_of_system_time: None,
                batch_size: 0,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        MetabaseError::PartialBatch(partial) => {
            assert_eq!(partial.succeeded, 1);
            assert_eq!(partial.failures[0].object, bad);
        }
        other => panic!("expected a partial batch failure, got {other}"),
    }

    let remaining = t.db.testing_all_objects().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].stream, bad);
}
