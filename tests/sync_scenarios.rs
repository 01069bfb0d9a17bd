mod common;

use camsync_lib::core::{MANIFEST_FILE, SyncManifest};
use camsync_lib::storage::{LocalStorage, Storage};
use camsync_lib::{StartSyncOptions, SyncMode, SyncSettings, SyncStatus};
use common::{file_names, mtime, new_sync, write_event, FlakyStorage, MisreportingStorage};
use std::sync::Arc;

const MB: usize = 1_000_000;

fn local(dir: &tempfile::TempDir) -> Arc<dyn Storage> {
    Arc::new(LocalStorage::new(dir.path()).unwrap())
}

#[tokio::test]
async fn test_basic_sync_copies_missing_events() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    write_event(
        src_dir.path(),
        "SavedClips",
        "2024-01-01_10-00-00",
        &[("front.mp4", 6 * MB), ("back.mp4", 4 * MB)],
        mtime(1_700_000_000),
    );
    write_event(
        src_dir.path(),
        "SentryClips",
        "2024-01-02_11-00-00",
        &[("front.mp4", 5 * MB)],
        mtime(1_700_000_100),
    );

    let sync = new_sync(SyncSettings::default()).await;
    let src = sync.add_drive("car", local(&src_dir)).await.unwrap();
    let dst = sync.add_drive("backup", local(&dst_dir)).await.unwrap();
    sync.set_source(&src).unwrap();
    sync.set_destination(&dst).unwrap();

    let comparison = sync.compare_events().await.unwrap();
    let missing: Vec<_> = comparison
        .events
        .missing
        .iter()
        .map(|e| e.event.name.as_str())
        .collect();
    assert_eq!(missing, vec!["2024-01-01_10-00-00", "2024-01-02_11-00-00"]);
    assert!(comparison.events.same.is_empty());
    assert_eq!(comparison.statistics.storage.to_transfer, 15 * MB as u64);
    assert_eq!(sync.state().status, SyncStatus::Idle);

    let report = sync.start_sync(StartSyncOptions::default()).await.unwrap();
    assert_eq!(report.status, SyncStatus::Complete);
    assert!(report.errors.is_empty());
    assert!(report.manifest_written);

    let state = sync.state();
    assert_eq!(state.status, SyncStatus::Complete);
    assert_eq!(state.bytes_completed, 15 * MB as u64);
    assert_eq!(state.events_completed, 2);

    assert_eq!(
        file_names(&dst_dir.path().join("SavedClips/2024-01-01_10-00-00")),
        vec!["back.mp4", "front.mp4"]
    );
    assert_eq!(
        file_names(&dst_dir.path().join("SentryClips/2024-01-02_11-00-00")),
        vec!["front.mp4"]
    );
    assert!(dst_dir.path().join("RecentClips").is_dir());

    let manifest = SyncManifest::load(&LocalStorage::new(dst_dir.path()).unwrap()).await;
    assert_eq!(manifest.synced_events.len(), 2);
    assert!(manifest.synced_events["2024-01-01_10-00-00"].verified);
    assert_eq!(manifest.source_info.unwrap().label, "car");
    assert!(dst_dir.path().join(MANIFEST_FILE).is_file());

    // 再次对比：复制结果与源一致
    let again = sync.compare_events().await.unwrap();
    assert_eq!(again.events.same.len(), 2);
    assert!(again.events.missing.is_empty());
    assert!(again.events.newer.is_empty());
    assert_eq!(again.statistics.overview.sync_percent, 100);
}

#[tokio::test]
async fn test_move_removes_source_events() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    write_event(src_dir.path(), "SavedClips", "A", &[("front.mp4", 2048), ("back.mp4", 1024)], mtime(100));
    write_event(src_dir.path(), "SavedClips", "B", &[("front.mp4", 512)], mtime(100));

    let sync = new_sync(SyncSettings::default()).await;
    let src = sync.add_drive("car", local(&src_dir)).await.unwrap();
    let dst = sync.add_drive("nas", local(&dst_dir)).await.unwrap();
    sync.set_source(&src).unwrap();
    sync.set_destination(&dst).unwrap();
    sync.compare_events().await.unwrap();

    let report = sync
        .start_sync(StartSyncOptions {
            mode: SyncMode::Move,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.events_completed, 2);
    assert!(!src_dir.path().join("SavedClips/A").exists());
    assert!(!src_dir.path().join("SavedClips/B").exists());
    assert_eq!(
        file_names(&dst_dir.path().join("SavedClips/A")),
        vec!["back.mp4", "front.mp4"]
    );
    // 源驱动器已重新扫描
    assert!(sync.drive(&src).unwrap().events.is_empty());
}

#[tokio::test]
async fn test_failed_verification_keeps_source_in_move_mode() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    write_event(src_dir.path(), "SavedClips", "A", &[("front.mp4", 2048)], mtime(100));
    write_event(src_dir.path(), "SentryClips", "B", &[("front.mp4", 512), ("back.mp4", 512)], mtime(100));

    let sync = new_sync(SyncSettings::default()).await;
    let src = sync.add_drive("car", local(&src_dir)).await.unwrap();
    let dst = sync
        .add_drive("nas", Arc::new(MisreportingStorage::new(local(&dst_dir))))
        .await
        .unwrap();
    sync.set_source(&src).unwrap();
    sync.set_destination(&dst).unwrap();
    sync.compare_events().await.unwrap();

    let report = sync
        .start_sync(StartSyncOptions {
            mode: SyncMode::Move,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.status, SyncStatus::Complete);
    assert_eq!(report.events_completed, 0);
    assert_eq!(report.errors.len(), 2);
    let failed: Vec<&str> = report.errors.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(failed, vec!["A", "B"]);

    // 校验失败时不删除源事件
    assert_eq!(file_names(&src_dir.path().join("SavedClips/A")), vec!["front.mp4"]);
    assert_eq!(
        file_names(&src_dir.path().join("SentryClips/B")),
        vec!["back.mp4", "front.mp4"]
    );
    assert_eq!(sync.drive(&src).unwrap().events.len(), 2);

    let state = sync.state();
    assert!(state.can_resume);
    assert_eq!(state.resume_point, Some(0));
    let checkpoint = sync.resume_checkpoint().await.unwrap().unwrap();
    assert_eq!(checkpoint.last_completed_event, None);
}

#[tokio::test]
async fn test_different_size_is_not_selected() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    write_event(src_dir.path(), "SentryClips", "C", &[("front.mp4", 100)], mtime(5000));
    write_event(dst_dir.path(), "SentryClips", "C", &[("front.mp4", 90)], mtime(5000));

    let sync = new_sync(SyncSettings::default()).await;
    let src = sync.add_drive("car", local(&src_dir)).await.unwrap();
    let dst = sync.add_drive("nas", local(&dst_dir)).await.unwrap();
    sync.set_source(&src).unwrap();
    sync.set_destination(&dst).unwrap();

    let comparison = sync.compare_events().await.unwrap();
    assert_eq!(comparison.events.different_size.len(), 1);
    assert!(comparison.events.newer.is_empty());
    assert!(!comparison.events.different_size[0].selected);

    // 没有默认选中的事件
    let err = sync.start_sync(StartSyncOptions::default()).await.unwrap_err();
    assert!(matches!(err, camsync_lib::SyncError::Usage(_)));
    assert_eq!(sync.state().status, SyncStatus::Idle);

    // 显式选择后可以覆盖
    let report = sync
        .start_sync(StartSyncOptions {
            selected_events: Some(vec!["C".to_string()]),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(report.events_completed, 1);
    assert_eq!(
        std::fs::metadata(dst_dir.path().join("SentryClips/C/front.mp4")).unwrap().len(),
        100
    );
}

#[tokio::test]
async fn test_dest_only_events_are_reported() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    write_event(src_dir.path(), "SavedClips", "shared", &[("front.mp4", 10)], mtime(10));
    write_event(dst_dir.path(), "SavedClips", "shared", &[("front.mp4", 10)], mtime(10));
    write_event(dst_dir.path(), "RecentClips", "old", &[("front.mp4", 33)], mtime(10));

    let sync = new_sync(SyncSettings::default()).await;
    let src = sync.add_drive("car", local(&src_dir)).await.unwrap();
    let dst = sync.add_drive("nas", local(&dst_dir)).await.unwrap();
    sync.set_source(&src).unwrap();
    sync.set_destination(&dst).unwrap();

    let comparison = sync.compare_events().await.unwrap();
    assert_eq!(comparison.events.same.len(), 1);
    assert_eq!(comparison.events.dest_only.len(), 1);
    assert_eq!(comparison.events.dest_only[0].event.name, "old");
    assert_eq!(comparison.statistics.storage.dest_total, 43);
    assert_eq!(comparison.statistics.storage.to_transfer, 0);
}

#[tokio::test]
async fn test_partial_failure_is_isolated() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    for i in 1..=5 {
        write_event(
            src_dir.path(),
            "SavedClips",
            &format!("event-{}", i),
            &[("front.mp4", 300), ("back.mp4", 200)],
            mtime(1000),
        );
    }

    let flaky: Arc<dyn Storage> = Arc::new(FlakyStorage::new(local(&src_dir), "event-3/front"));
    let sync = new_sync(SyncSettings::default()).await;
    let src = sync.add_drive("car", flaky).await.unwrap();
    let dst = sync.add_drive("nas", local(&dst_dir)).await.unwrap();
    sync.set_source(&src).unwrap();
    sync.set_destination(&dst).unwrap();
    sync.compare_events().await.unwrap();

    let report = sync.start_sync(StartSyncOptions::default()).await.unwrap();
    assert_eq!(report.status, SyncStatus::Complete);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].event, "event-3");
    assert_eq!(report.events_completed, 4);

    let state = sync.state();
    assert!(state.can_resume);
    assert_eq!(state.resume_point, Some(2));

    for name in ["event-1", "event-2", "event-4", "event-5"] {
        assert_eq!(
            file_names(&dst_dir.path().join("SavedClips").join(name)),
            vec!["back.mp4", "front.mp4"]
        );
    }
    // 失败的文件没有留下半成品
    assert_eq!(
        file_names(&dst_dir.path().join("SavedClips/event-3")),
        vec!["back.mp4"]
    );

    let checkpoint = sync.resume_checkpoint().await.unwrap().unwrap();
    assert_eq!(checkpoint.last_completed_event, Some(1));
    assert_eq!(checkpoint.remaining(), ["event-3", "event-4", "event-5"].map(String::from));

    let manifest = SyncManifest::load(&LocalStorage::new(dst_dir.path()).unwrap()).await;
    assert!(!manifest.synced_events.contains_key("event-3"));
    assert_eq!(manifest.synced_events.len(), 4);
}

#[tokio::test]
async fn test_clean_run_clears_checkpoint() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    write_event(src_dir.path(), "SavedClips", "bad", &[("front.mp4", 10)], mtime(1));

    let flaky: Arc<dyn Storage> = Arc::new(FlakyStorage::new(local(&src_dir), "bad/front"));
    let sync = new_sync(SyncSettings::default()).await;
    let src = sync.add_drive("car", flaky).await.unwrap();
    let dst = sync.add_drive("nas", local(&dst_dir)).await.unwrap();
    sync.set_source(&src).unwrap();
    sync.set_destination(&dst).unwrap();
    sync.compare_events().await.unwrap();
    sync.start_sync(StartSyncOptions::default()).await.unwrap();
    assert!(sync.resume_checkpoint().await.unwrap().is_some());

    // 换成正常的源驱动器（同一标签）重跑
    sync.remove_drive(&src);
    let src = sync.add_drive("car", local(&src_dir)).await.unwrap();
    sync.set_source(&src).unwrap();
    sync.compare_events().await.unwrap();
    let report = sync.start_sync(StartSyncOptions::default()).await.unwrap();
    assert!(report.errors.is_empty());
    assert!(sync.resume_checkpoint().await.unwrap().is_none());
}

#[tokio::test]
async fn test_no_verify_and_no_manifest() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    write_event(src_dir.path(), "SavedClips", "A", &[("front.mp4", 64)], mtime(1));

    let settings = SyncSettings {
        verify_after_copy: false,
        write_sync_file: false,
        ..Default::default()
    };
    let sync = new_sync(settings).await;
    let src = sync.add_drive("car", local(&src_dir)).await.unwrap();
    let dst = sync.add_drive("nas", local(&dst_dir)).await.unwrap();
    sync.set_source(&src).unwrap();
    sync.set_destination(&dst).unwrap();
    sync.compare_events().await.unwrap();

    let mut rx = sync.subscribe();
    let report = sync.start_sync(StartSyncOptions::default()).await.unwrap();
    assert!(!report.manifest_written);
    assert!(!dst_dir.path().join(MANIFEST_FILE).exists());

    let mut saw_verifying = false;
    while let Ok(event) = rx.try_recv() {
        if let camsync_lib::core::SyncEvent::StateChanged { to, .. } = event {
            saw_verifying |= to == SyncStatus::Verifying;
        }
    }
    assert!(!saw_verifying);
}

#[tokio::test]
async fn test_usage_errors_before_state_change() {
    let sync = new_sync(SyncSettings::default()).await;
    let err = sync.compare_events().await.unwrap_err();
    assert!(matches!(err, camsync_lib::SyncError::Usage(_)));

    let err = sync.start_sync(StartSyncOptions::default()).await.unwrap_err();
    assert!(matches!(err, camsync_lib::SyncError::Usage(_)));
    assert_eq!(sync.state().status, SyncStatus::Idle);

    assert!(matches!(
        sync.set_source("nope"),
        Err(camsync_lib::SyncError::NotFound(_))
    ));
}
