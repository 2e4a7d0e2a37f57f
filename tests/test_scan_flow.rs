//! Integration tests for the capture → classify flow of one user.
//!
//! Tests cover:
//! - Captures are refused until the camera reports itself available
//! - Only one capture may be outstanding at a time
//! - A served capture is classified, recorded and its derivatives written
//! - A frame that does not contain the region of interest stays `Pending`
//! - Losing the camera or a failed capture frees the capture slot
//! - A new capture can start while an earlier one is still classifying
//! - A completion that arrives right after the request is posted is not lost
//! - The controller stays busy until every capture is classified

mod common;

use std::time::{Duration, Instant};

use crackcam::capture::CaptureRequester;
use crackcam::models::Roi;

use common::*;

struct Fixture {
    db: Database,
    store: ImageStore,
    user: User,
    _temp_dir: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let (db, temp_dir) = create_test_db().await;
    let store = ImageStore::new(temp_dir.path().join("nml_img"));
    let user = add_test_user(&db).await;
    Fixture {
        db,
        store,
        user,
        _temp_dir: temp_dir,
    }
}

/// Run the loop to completion, feed its events to `controller`
/// and return the sessions it asked to classify.
fn serve_capture(
    controller: &ScanController,
    acquisition: AcquisitionLoop<StubSource>,
    events: std::sync::mpsc::Receiver<AcquisitionEvent>,
) -> anyhow::Result<Vec<i64>> {
    acquisition.run()?;
    Ok(events
        .try_iter()
        .filter_map(|event| controller.on_event(&event))
        .collect())
}

/// Feed live events to `controller` until `pred` matches one. Returns the
/// sessions it asked to classify along the way.
fn feed_until(
    controller: &ScanController,
    events: &std::sync::mpsc::Receiver<AcquisitionEvent>,
    pred: impl FnMut(&AcquisitionEvent) -> bool,
) -> Vec<i64> {
    wait_for(events, Duration::from_secs(10), pred)
        .iter()
        .filter_map(|event| controller.on_event(event))
        .collect()
}

#[tokio::test]
async fn test_capture_requires_camera() -> anyhow::Result<()> {
    let f = fixture().await;
    let controller = ScanController::new(
        f.db.clone(),
        f.user.clone(),
        CaptureRequester::default(),
        make_worker(&f.db, &f.store, 0.9),
    );

    let err = controller.begin_capture(None).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<ScanError>(),
        Some(&ScanError::CameraUnavailable)
    );
    assert!(!controller.can_capture());
    assert!(f.db.get_sessions_for_user(&f.user.uuid).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_single_outstanding_capture() -> anyhow::Result<()> {
    let f = fixture().await;
    let requester = CaptureRequester::default();
    let controller = ScanController::new(
        f.db.clone(),
        f.user.clone(),
        requester.clone(),
        make_worker(&f.db, &f.store, 0.9),
    );
    controller.on_event(&AcquisitionEvent::CameraAvailable(true));
    assert!(controller.can_capture());

    let session = controller.begin_capture(Some("wall")).await?;
    assert_eq!(session.crack_status, CrackStatus::Pending);
    assert_eq!(controller.outstanding_capture(), Some(session.session_id));
    assert!(!controller.can_capture());

    let pending = requester.pending().expect("request should be posted");
    assert_eq!(pending.session_id, session.session_id);
    assert_eq!(
        pending.path,
        f.store.raw_image_path(&f.user.uuid, session.session_id)
    );
    assert!(f.store.raw_dir(&f.user.uuid).is_dir());

    let err = controller.begin_capture(None).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<ScanError>(),
        Some(&ScanError::CaptureInProgress)
    );
    assert_eq!(f.db.get_sessions_for_user(&f.user.uuid).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_capture_is_classified_and_recorded() -> anyhow::Result<()> {
    let f = fixture().await;
    let (acquisition, events) = AcquisitionLoop::new(
        StubSource::new(vec![crack_frame()]),
        FrameCorrection::default(),
        Duration::ZERO,
    );
    let controller = ScanController::new(
        f.db.clone(),
        f.user.clone(),
        acquisition.requester(),
        make_worker(&f.db, &f.store, 0.9),
    );
    controller.on_event(&AcquisitionEvent::CameraAvailable(true));
    let session = controller.begin_capture(Some("wall")).await?;

    let to_classify = serve_capture(&controller, acquisition, events)?;
    assert_eq!(to_classify, vec![session.session_id]);
    assert_eq!(controller.classifying(), vec![session.session_id]);
    assert_eq!(controller.outstanding_capture(), None);

    let outcome = controller.classify(session.session_id).await?;

    assert!(outcome.verdict.crack);
    assert_eq!(outcome.session.crack_status, CrackStatus::Crack);
    assert!(controller.classifying().is_empty());
    assert!(outcome.cropped_path.exists());
    assert!(outcome.highlighted_path.exists());
    let cropped = image::open(&outcome.cropped_path)?;
    assert_eq!((cropped.width(), cropped.height()), (158, 158));

    let stored = f
        .db
        .get_session_for_user(&f.user.uuid, session.session_id)
        .await?
        .expect("session should exist");
    assert_eq!(stored.crack_status, CrackStatus::Crack);
    assert_eq!(stored.label(), format!("{}_CRACK_wall", session.session_id));

    Ok(())
}

#[tokio::test]
async fn test_low_probability_is_no_crack() -> anyhow::Result<()> {
    let f = fixture().await;
    let worker = make_worker(&f.db, &f.store, 0.2);
    f.store.ensure_user_dirs(&f.user.uuid).await?;
    let session = f.db.add_session(&f.user.uuid, None).await?;
    crack_frame().save(f.store.raw_image_path(&f.user.uuid, session.session_id))?;

    let outcome = worker.run(&f.user.uuid, session.session_id).await?;

    assert!(!outcome.verdict.crack);
    assert_eq!(outcome.session.crack_status, CrackStatus::NoCrack);

    Ok(())
}

#[tokio::test]
async fn test_frame_outside_roi_stays_pending() -> anyhow::Result<()> {
    let f = fixture().await;
    let roi = Roi {
        x: 600,
        y: 400,
        width: 158,
        height: 158,
    };
    let (acquisition, events) = AcquisitionLoop::new(
        StubSource::new(vec![crack_frame()]),
        FrameCorrection::default(),
        Duration::ZERO,
    );
    let controller = ScanController::new(
        f.db.clone(),
        f.user.clone(),
        acquisition.requester(),
        make_worker_with_roi(&f.db, &f.store, 0.9, roi),
    );
    controller.on_event(&AcquisitionEvent::CameraAvailable(true));
    let session = controller.begin_capture(None).await?;
    let to_classify = serve_capture(&controller, acquisition, events)?;
    assert_eq!(to_classify, vec![session.session_id]);

    let result = controller.classify(session.session_id).await;

    let err = result.expect_err("roi outside the frame should fail");
    assert!(format!("{err:#}").contains("does not fit"), "unexpected error: {err:#}");
    assert!(controller.classifying().is_empty());
    let stored = f
        .db
        .get_session_for_user(&f.user.uuid, session.session_id)
        .await?
        .expect("session should exist");
    assert_eq!(stored.crack_status, CrackStatus::Pending);

    Ok(())
}

#[tokio::test]
async fn test_camera_loss_frees_capture_slot() -> anyhow::Result<()> {
    let f = fixture().await;
    let controller = ScanController::new(
        f.db.clone(),
        f.user.clone(),
        CaptureRequester::default(),
        make_worker(&f.db, &f.store, 0.9),
    );
    controller.on_event(&AcquisitionEvent::CameraAvailable(true));
    let session = controller.begin_capture(None).await?;

    controller.on_event(&AcquisitionEvent::CameraAvailable(false));

    assert_eq!(controller.outstanding_capture(), None);
    assert!(!controller.camera_available());
    assert!(!controller.can_capture());
    let stored = f
        .db
        .get_session_for_user(&f.user.uuid, session.session_id)
        .await?
        .expect("session should exist");
    assert_eq!(stored.crack_status, CrackStatus::Pending);

    Ok(())
}

#[tokio::test]
async fn test_failed_capture_frees_capture_slot() -> anyhow::Result<()> {
    let f = fixture().await;
    let controller = ScanController::new(
        f.db.clone(),
        f.user.clone(),
        CaptureRequester::default(),
        make_worker(&f.db, &f.store, 0.9),
    );
    controller.on_event(&AcquisitionEvent::CameraAvailable(true));
    let session = controller.begin_capture(None).await?;

    let classify = controller.on_event(&AcquisitionEvent::CaptureFailed {
        session_id: session.session_id,
        reason: "disk full".into(),
    });

    assert_eq!(classify, None);
    assert_eq!(controller.outstanding_capture(), None);
    assert!(controller.can_capture());
    assert!(controller.classifying().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_capture_while_classifying() -> anyhow::Result<()> {
    let f = fixture().await;
    let source = StubSource::new(vec![crack_frame()]).looped();
    let (mut handle, events) =
        AcquisitionHandle::spawn(source, FrameCorrection::default(), Duration::from_millis(5))?;
    let controller = ScanController::new(
        f.db.clone(),
        f.user.clone(),
        handle.requester(),
        make_worker(&f.db, &f.store, 0.9),
    );
    feed_until(&controller, &events, |e| {
        matches!(e, AcquisitionEvent::CameraAvailable(true))
    });
    let first = controller.begin_capture(Some("first")).await?;
    let ready = feed_until(&controller, &events, |e| {
        matches!(e, AcquisitionEvent::CaptureComplete { .. })
    });
    assert_eq!(ready, vec![first.session_id]);
    assert_eq!(controller.classifying(), vec![first.session_id]);
    assert!(controller.can_capture());

    let second = controller.begin_capture(Some("second")).await?;
    let ready = feed_until(&controller, &events, |e| {
        matches!(e, AcquisitionEvent::CaptureComplete { .. })
    });
    assert_eq!(ready, vec![second.session_id]);
    assert_eq!(
        controller.classifying(),
        vec![first.session_id, second.session_id]
    );

    controller.classify(first.session_id).await?;
    controller.classify(second.session_id).await?;
    handle.stop()?;

    assert!(controller.classifying().is_empty());
    let statuses: Vec<CrackStatus> = f
        .db
        .get_sessions_for_user(&f.user.uuid)
        .await?
        .iter()
        .map(|s| s.crack_status)
        .collect();
    assert_eq!(statuses, vec![CrackStatus::Crack, CrackStatus::Crack]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_immediate_completion_is_accepted() -> anyhow::Result<()> {
    let f = fixture().await;
    let requester = CaptureRequester::default();
    let controller = ScanController::new(
        f.db.clone(),
        f.user.clone(),
        requester.clone(),
        make_worker(&f.db, &f.store, 0.9),
    );
    controller.on_event(&AcquisitionEvent::CameraAvailable(true));

    // Completes the capture the moment its request becomes visible.
    let responder = {
        let controller = controller.clone();
        std::thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(10);
            while Instant::now() < deadline {
                if let Some(request) = requester.pending() {
                    return controller.on_event(&AcquisitionEvent::CaptureComplete {
                        session_id: request.session_id,
                        path: request.path,
                    });
                }
                std::thread::yield_now();
            }
            None
        })
    };
    let session = controller.begin_capture(None).await?;
    let classify = responder
        .join()
        .map_err(|_| anyhow::anyhow!("responder thread panicked"))?;

    assert_eq!(classify, Some(session.session_id));
    assert_eq!(controller.outstanding_capture(), None);
    assert_eq!(controller.classifying(), vec![session.session_id]);

    Ok(())
}

#[tokio::test]
async fn test_busy_until_classified() -> anyhow::Result<()> {
    let f = fixture().await;
    let (acquisition, events) = AcquisitionLoop::new(
        StubSource::new(vec![crack_frame()]),
        FrameCorrection::default(),
        Duration::ZERO,
    );
    let controller = ScanController::new(
        f.db.clone(),
        f.user.clone(),
        acquisition.requester(),
        make_worker(&f.db, &f.store, 0.1),
    );
    controller.on_event(&AcquisitionEvent::CameraAvailable(true));
    assert!(!controller.is_busy());

    let session = controller.begin_capture(None).await?;
    assert!(controller.is_busy(), "awaiting the frame");

    serve_capture(&controller, acquisition, events)?;
    assert!(controller.is_busy(), "classifying");

    controller.classify(session.session_id).await?;
    assert!(!controller.is_busy());

    Ok(())
}

#[tokio::test]
async fn test_busy_requester_discards_session() -> anyhow::Result<()> {
    let f = fixture().await;
    let requester = CaptureRequester::default();
    requester.request(CaptureRequest {
        session_id: 1,
        path: "elsewhere.jpg".into(),
    })?;
    let controller = ScanController::new(
        f.db.clone(),
        f.user.clone(),
        requester,
        make_worker(&f.db, &f.store, 0.9),
    );
    controller.on_event(&AcquisitionEvent::CameraAvailable(true));

    let err = controller.begin_capture(None).await.unwrap_err();

    assert_eq!(err.downcast_ref::<CaptureBusy>(), Some(&CaptureBusy(1)));
    assert_eq!(controller.outstanding_capture(), None);
    assert!(!controller.is_busy());
    assert!(f.db.get_sessions_for_user(&f.user.uuid).await?.is_empty());

    Ok(())
}
