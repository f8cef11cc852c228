mod common;

use std::time::Duration;

use common::*;
use pretty_assertions::assert_eq;
use uploader::{
    covers::CoverUpload,
    session::{ClientStatus, UploadFailure},
    storage::StoreError,
};

const COVER_KEY: &str =
    "covers/ba/78/ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad.png";

#[tokio::test]
async fn test_upload_cover() {
    let ctx = TestContext::new(vec![Ok(expiring_in("AK1", 3600))]);
    let client = ctx.manager.acquire().await.unwrap();

    let cover = client
        .upload_cover(b"abc".to_vec(), "image/png")
        .await
        .expect("upload should succeed");

    assert_eq!(
        cover,
        CoverUpload {
            key: COVER_KEY.to_string(),
            url: format!("{PUBLIC_BASE_URL}/{COVER_KEY}"),
        }
    );
    assert_eq!(
        ctx.connector.puts(),
        vec![Put {
            access_key_id: "AK1".to_string(),
            key: COVER_KEY.to_string(),
            size: 3,
            content_type: "image/png".to_string(),
        }]
    );

    client.dispose().await;
}

#[tokio::test]
async fn test_expired_credential_is_refreshed_before_put() {
    let ctx = TestContext::new(vec![
        Ok(expiring_in("AK1", 3600)),
        Ok(expiring_in("AK2", 7200)),
    ]);
    let client = ctx.manager.acquire().await.unwrap();

    // Timer has not fired yet, but the wall clock says the credential is gone
    ctx.clock.advance(3600);
    client
        .upload("covers/a.png", vec![1, 2, 3], "image/png")
        .await
        .unwrap();

    let puts = ctx.connector.puts();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].access_key_id, "AK2");
    assert_eq!(ctx.fetcher.calls(), 2);

    client.dispose().await;
}

#[tokio::test]
async fn test_refresh_returning_expired_credential_fails_upload() {
    let ctx = TestContext::new(vec![
        Ok(expiring_in("AK1", 3600)),
        Ok(expiring_in("AK2", 3600)),
    ]);
    let client = ctx.manager.acquire().await.unwrap();

    ctx.clock.advance(4000);
    let result = client.upload("covers/a.png", vec![1], "image/png").await;

    assert_eq!(result, Err(UploadFailure::CredentialExpired));
    assert!(ctx.connector.puts().is_empty());
    // Only one reactive refresh per upload
    assert_eq!(ctx.fetcher.calls(), 2);

    client.dispose().await;
}

#[tokio::test]
async fn test_unauthorized_put_refreshes_for_retry() {
    let ctx = TestContext::new(vec![
        Ok(expiring_in("AK1", 3600)),
        Ok(expiring_in("AK2", 3600)),
    ]);
    let client = ctx.manager.acquire().await.unwrap();
    ctx.connector
        .fail_next_put(StoreError::Unauthorized("ExpiredToken".to_string()));

    let result = client.upload_cover(b"abc".to_vec(), "image/png").await;

    let Err(error) = result else {
        panic!("upload with a rejected credential should fail");
    };
    assert_eq!(error, UploadFailure::Unauthorized("ExpiredToken".to_string()));
    assert!(error.allow_retry());
    assert!(ctx.connector.puts().is_empty());

    // The rejection triggered a refresh, so the retry runs on the new credential
    assert_eq!(client.state().credential().unwrap().access_key_id, "AK2");
    client
        .upload_cover(b"abc".to_vec(), "image/png")
        .await
        .unwrap();

    let puts = ctx.connector.puts();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].access_key_id, "AK2");
    assert_eq!(ctx.fetcher.calls(), 2);

    client.dispose().await;
}

#[tokio::test]
async fn test_service_error_does_not_refresh() {
    let ctx = TestContext::new(vec![Ok(expiring_in("AK1", 3600))]);
    let client = ctx.manager.acquire().await.unwrap();
    ctx.connector
        .fail_next_put(StoreError::ServiceError("SlowDown".to_string()));

    let result = client.upload("covers/a.png", vec![1], "image/png").await;

    assert_eq!(result, Err(UploadFailure::Storage("SlowDown".to_string())));
    assert_eq!(ctx.fetcher.calls(), 1);
    assert_eq!(client.status(), ClientStatus::Ready);

    client
        .upload("covers/a.png", vec![1], "image/png")
        .await
        .unwrap();
    assert_eq!(ctx.connector.puts()[0].access_key_id, "AK1");

    client.dispose().await;
}

#[tokio::test]
async fn test_rejected_input_never_reaches_storage() {
    let ctx = TestContext::new(vec![Ok(expiring_in("AK1", 3600))]);
    let client = ctx.manager.acquire().await.unwrap();

    assert_eq!(
        client.upload_cover(Vec::new(), "image/png").await,
        Err(UploadFailure::EmptyBody)
    );
    assert_eq!(
        client.upload_cover(b"%PDF".to_vec(), "application/pdf").await,
        Err(UploadFailure::UnsupportedContentType(
            "application/pdf".to_string()
        ))
    );
    assert_eq!(
        client.upload("covers/a.png", Vec::new(), "image/png").await,
        Err(UploadFailure::EmptyBody)
    );
    assert!(ctx.connector.puts().is_empty());

    client.dispose().await;
}

#[tokio::test]
async fn test_upload_after_dispose_fails() {
    let ctx = TestContext::new(vec![Ok(expiring_in("AK1", 3600))]);
    let client = ctx.manager.acquire().await.unwrap();
    let mut updates = client.subscribe();

    client.dispose().await;

    assert_eq!(updates.borrow_and_update().status(), ClientStatus::Disposed);
    assert!(ctx.connector.puts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_does_not_interrupt_inflight_upload() {
    let connector = RecordingConnector::with_put_latency(Duration::from_secs(5));
    let fetcher = ScriptedFetcher::new(vec![
        Ok(expiring_in("AK1", 3600)),
        Ok(expiring_in("AK2", 3600)),
    ]);
    let ctx = TestContext::with_parts(fetcher, connector);
    let client = ctx.manager.acquire().await.unwrap();

    let (uploaded, refreshed) = tokio::join!(
        client.upload("covers/a.png", vec![1, 2, 3], "image/png"),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            client.refresh().await
        }
    );

    assert_eq!(uploaded, Ok(()));
    assert_eq!(refreshed, Ok(()));
    // The upload finished on the store it started with
    assert_eq!(ctx.connector.puts()[0].access_key_id, "AK1");
    assert_eq!(client.state().credential().unwrap().access_key_id, "AK2");

    client.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_upload_waits_for_inflight_refresh() {
    let fetcher = ScriptedFetcher::with_latency(
        vec![Ok(expiring_in("AK1", 3600)), Ok(expiring_in("AK2", 3600))],
        Duration::from_secs(5),
    );
    let ctx = TestContext::with_fetcher(fetcher);
    let client = ctx.manager.acquire().await.unwrap();

    let (refreshed, uploaded) = tokio::join!(client.refresh(), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(client.status(), ClientStatus::Refreshing);
        client.upload("covers/a.png", vec![1], "image/png").await
    });

    assert_eq!(refreshed, Ok(()));
    assert_eq!(uploaded, Ok(()));
    assert_eq!(ctx.connector.puts()[0].access_key_id, "AK2");

    client.dispose().await;
}
