mod common;

use chrono::Duration;
use common::{jingle, track, tracks, Call, Harness, HOST_CLIP};
use rmradio_core::driver::DriverEvent;
use rmradio_core::model::PlaylistItem;
use rmradio_core::protocol::{Command, StationEvent};
use rmradio_core::session::Schedule;

fn current_url(h: &Harness) -> String {
    h.store
        .state()
        .current_item
        .as_ref()
        .map(|i| i.audio_url(HOST_CLIP).to_string())
        .unwrap_or_default()
}

#[tokio::test]
async fn initialize_cues_first_item_without_playing() {
    let mut h = Harness::live();
    h.store
        .initialize(&tracks(&["a", "b", "c", "d"]), &[jingle("x")])
        .await;

    let state = h.store.state();
    assert_eq!(state.current_index, 0);
    assert_eq!(state.current_item.as_ref(), state.playlist.first());
    assert!(!state.is_playing);
    assert_eq!(h.driver().loads(), vec![current_url(&h).as_str()]);
    assert!(!h.driver().calls.contains(&Call::Play));
}

#[tokio::test]
async fn second_initialize_is_ignored() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;
    let first = h.store.state().playlist.clone();
    h.diagnostics();

    h.store
        .initialize(&tracks(&["q", "r", "s", "t", "u"]), &[jingle("x")])
        .await;

    assert_eq!(h.store.state().playlist, first);
    assert_eq!(h.diagnostics(), vec![StationEvent::DuplicateInitialize]);
}

#[tokio::test]
async fn initialize_with_no_tracks_leaves_station_empty() {
    let mut h = Harness::live();
    h.store.initialize(&[], &[jingle("x")]).await;
    assert!(h.store.state().playlist.is_empty());
    assert!(h.driver().calls.is_empty());

    // A later initialize with real tracks still works.
    h.store.initialize(&tracks(&["a"]), &[]).await;
    assert_eq!(h.store.state().playlist.len(), 1);
}

#[tokio::test]
async fn toggle_play_and_pause() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b"]), &[]).await;

    h.store.toggle_play().await;
    assert!(h.store.state().is_playing);
    assert_eq!(h.driver().last(), Some(&Call::Play));

    h.store.toggle_play().await;
    assert!(!h.store.state().is_playing);
    assert_eq!(h.driver().last(), Some(&Call::Pause));
}

#[tokio::test]
async fn refused_play_stays_paused_and_reports() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b"]), &[]).await;
    h.store.driver_mut().refuse_play = true;
    h.diagnostics();

    h.store.toggle_play().await;

    assert!(!h.store.state().is_playing);
    let events = h.diagnostics();
    assert!(matches!(
        events.as_slice(),
        [StationEvent::PlayStartFailed { .. }]
    ));

    // The listener retries by hand once playback is allowed.
    h.store.driver_mut().refuse_play = false;
    h.store.toggle_play().await;
    assert!(h.store.state().is_playing);
}

#[tokio::test]
async fn advance_cycles_in_order_and_wraps() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;
    let playlist = h.store.state().playlist.clone();

    let mut seen = Vec::new();
    for _ in 0..6 {
        h.store.advance().await;
        seen.push(h.store.state().current_index);
        let idx = h.store.state().current_index;
        assert_eq!(h.store.state().current_item.as_ref(), Some(&playlist[idx]));
    }
    assert_eq!(seen, vec![1, 2, 0, 1, 2, 0]);
}

#[tokio::test]
async fn advance_while_playing_starts_new_source() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;
    h.store.toggle_play().await;

    h.store.advance().await;

    let n = h.driver().calls.len();
    assert_eq!(
        &h.driver().calls[n - 2..],
        &[Call::Load(current_url(&h)), Call::Play]
    );
}

#[tokio::test]
async fn advance_while_paused_only_repoints() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;

    h.store.advance().await;

    assert_eq!(h.driver().last(), Some(&Call::Load(current_url(&h))));
    assert!(!h.driver().calls.contains(&Call::Play));
}

#[tokio::test]
async fn host_segment_then_chart_topper_then_resume() {
    let start = common::t0();
    let mut h = Harness::started_at(start, Schedule::default());
    h.store
        .initialize(&tracks(&["a", "b", "c", "d", "e"]), &[])
        .await;
    h.store.set_chart_topper(Some(track("top")));

    h.store.advance_at(start + Duration::minutes(5)).await;
    let before = h.store.state().current_index;
    assert_eq!(before, 1);
    h.diagnostics();

    let due = start + Duration::minutes(31);
    h.store.advance_at(due).await;
    assert_eq!(h.store.state().current_item, Some(PlaylistItem::HostSegment));
    assert_eq!(h.store.state().current_index, before);
    assert_eq!(h.driver().loads().last(), Some(&HOST_CLIP));

    h.store.advance_at(due + Duration::minutes(1)).await;
    assert_eq!(
        h.store.state().current_item,
        Some(PlaylistItem::ChartTopper(track("top")))
    );
    assert_eq!(h.store.state().current_index, before);
    assert_eq!(
        h.driver().loads().last(),
        Some(&"https://cdn.example/songs/top.mp3")
    );

    h.store.advance_at(due + Duration::minutes(4)).await;
    assert_eq!(h.store.state().current_index, before + 1);
    assert!(h.store.state().current_item.as_ref().unwrap().is_song());

    assert_eq!(
        h.diagnostics(),
        vec![
            StationEvent::HostSegmentStarted,
            StationEvent::ChartTopperStarted {
                track_id: "top".into()
            },
        ]
    );
}

#[tokio::test]
async fn host_segment_without_chart_topper_resumes_directly() {
    let start = common::t0();
    let mut h = Harness::started_at(start, Schedule::default());
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;
    let playlist = h.store.state().playlist.clone();

    let due = start + Duration::minutes(45);
    h.store.advance_at(due).await;
    assert_eq!(h.store.state().current_item, Some(PlaylistItem::HostSegment));
    assert_eq!(h.store.state().current_index, 0);

    h.store.advance_at(due + Duration::minutes(1)).await;
    assert_eq!(h.store.state().current_index, 1);
    assert_eq!(h.store.state().current_item.as_ref(), Some(&playlist[1]));
}

#[tokio::test]
async fn host_segment_repeats_on_interval() {
    let start = common::t0();
    let schedule = Schedule {
        host_interval: Duration::minutes(10),
        ..Schedule::default()
    };
    let mut h = Harness::started_at(start, schedule);
    h.store.initialize(&tracks(&["a", "b", "c", "d"]), &[]).await;

    let mut hosts = 0;
    let mut last_was_host = false;
    for minute in (4..=60).step_by(4) {
        h.store.advance_at(start + Duration::minutes(minute)).await;
        let is_host = h
            .store
            .state()
            .current_item
            .as_ref()
            .is_some_and(PlaylistItem::is_host_segment);
        assert!(!(is_host && last_was_host), "host segment twice in a row");
        if is_host {
            hosts += 1;
        }
        last_was_host = is_host;
    }
    // due at 12, 24, 36, 48, 60 -> lazily picked up on the next advance
    assert_eq!(hosts, 5);
}

#[tokio::test]
async fn decode_error_moves_on_like_end_of_track() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;
    h.store.toggle_play().await;
    h.diagnostics();

    h.store
        .on_driver_event(DriverEvent::Errored {
            reason: "loading failed".into(),
        })
        .await;

    assert_eq!(h.store.state().current_index, 1);
    assert!(h.store.state().is_playing);
    let events = h.diagnostics();
    assert!(matches!(
        events.as_slice(),
        [StationEvent::PlaybackError { reason, .. }] if reason == "loading failed"
    ));

    h.store.on_driver_event(DriverEvent::Ended).await;
    assert_eq!(h.store.state().current_index, 2);
}

#[tokio::test]
async fn a_full_pass_of_errors_stalls_the_station() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;
    h.store.toggle_play().await;
    h.diagnostics();

    // 3 playlist slots + host + chart-topper
    for _ in 0..5 {
        h.store
            .on_driver_event(DriverEvent::Errored {
                reason: "dead link".into(),
            })
            .await;
    }

    assert!(!h.store.state().is_playing);
    assert_eq!(h.driver().last(), Some(&Call::Pause));
    let events = h.diagnostics();
    assert_eq!(events.last(), Some(&StationEvent::Stalled { failures: 5 }));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, StationEvent::PlaybackError { .. }))
            .count(),
        5
    );
}

#[tokio::test]
async fn a_clean_track_resets_the_error_streak() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;
    h.store.toggle_play().await;

    for _ in 0..4 {
        h.store
            .on_driver_event(DriverEvent::Errored {
                reason: "dead link".into(),
            })
            .await;
    }
    h.store.on_driver_event(DriverEvent::Ended).await;
    for _ in 0..4 {
        h.store
            .on_driver_event(DriverEvent::Errored {
                reason: "dead link".into(),
            })
            .await;
    }
    assert!(h.store.state().is_playing);
}

#[tokio::test]
async fn volume_zero_mutes_and_unmute_restores_level() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a"]), &[]).await;

    h.store.set_volume(0.0).await;
    assert!(h.store.state().is_muted);

    h.store.set_volume(0.4).await;
    assert!(!h.store.state().is_muted);
    assert_eq!(h.driver().last(), Some(&Call::Volume(0.4)));

    h.store.set_muted(true).await;
    assert_eq!(h.driver().last(), Some(&Call::Volume(0.0)));
    assert_eq!(h.store.state().volume, 0.4);

    h.store.set_muted(false).await;
    assert_eq!(h.driver().last(), Some(&Call::Volume(0.4)));
    assert!(!h.store.state().is_muted);
}

#[tokio::test]
async fn volume_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");
    let h = Harness::live();
    let mut store = h.store.with_state_file(path.clone());

    store.set_volume(0.65).await;
    store.set_muted(true).await;

    let saved = rmradio_core::store::PersistentState::load(&path).unwrap();
    assert_eq!(saved.volume, 0.65);
    assert!(saved.muted);
}

#[tokio::test]
async fn reshuffle_restarts_from_top_and_keeps_playing() {
    let mut h = Harness::live();
    h.store
        .initialize(&tracks(&["a", "b", "c", "d", "e", "f"]), &[jingle("x")])
        .await;
    h.store.toggle_play().await;
    h.store.advance().await;
    h.store.advance().await;
    let len = h.store.state().playlist.len();

    h.store.reshuffle().await;

    let state = h.store.state();
    assert_eq!(state.current_index, 0);
    assert_eq!(state.playlist.len(), len);
    assert_eq!(state.current_item.as_ref(), state.playlist.first());
    assert!(state.is_playing);
    assert_eq!(h.driver().last(), Some(&Call::Play));
}

#[tokio::test]
async fn seek_and_timeline() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b"]), &[]).await;
    h.store.on_driver_event(DriverEvent::Loaded).await;

    h.store
        .on_driver_event(DriverEvent::Duration(Some(215.0)))
        .await;
    h.store
        .on_driver_event(DriverEvent::Position(Some(12.5)))
        .await;
    assert_eq!(h.store.state().duration_secs, Some(215.0));
    assert_eq!(h.store.state().time_pos_secs, Some(12.5));

    h.store.seek(90.0).await;
    assert_eq!(h.driver().last(), Some(&Call::Seek(90.0)));
    assert_eq!(h.store.state().time_pos_secs, Some(90.0));
    assert_eq!(h.store.state().duration_secs, Some(215.0));
}

#[tokio::test]
async fn timeline_of_the_previous_file_is_dropped() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b"]), &[]).await;
    h.store.on_driver_event(DriverEvent::Loaded).await;
    h.store
        .on_driver_event(DriverEvent::Position(Some(201.0)))
        .await;

    h.store.skip().await;
    let rev = h.store.state().rev;
    h.store
        .on_driver_event(DriverEvent::Position(Some(202.0)))
        .await;
    assert_eq!(h.store.state().time_pos_secs, None);
    assert_eq!(h.store.state().rev, rev);

    h.store.on_driver_event(DriverEvent::Loaded).await;
    h.store
        .on_driver_event(DriverEvent::Position(Some(0.5)))
        .await;
    assert_eq!(h.store.state().time_pos_secs, Some(0.5));
}

#[tokio::test]
async fn unloadable_item_is_skipped_while_on_air() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;
    h.store.toggle_play().await;
    h.diagnostics();

    let broken = h.url_at(1);
    h.driver_mut().broken_urls.insert(broken.clone());
    h.store.on_driver_event(DriverEvent::Ended).await;

    assert_eq!(h.store.state().current_index, 2);
    assert!(h.store.state().is_playing);
    let expected = h.url_at(2);
    assert_eq!(h.driver().loads().last(), Some(&expected.as_str()));
    assert_eq!(h.driver().last(), Some(&Call::Play));
    let events = h.diagnostics();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        StationEvent::PlaybackError { reason, .. } if reason.contains(&broken)
    ));
}

#[tokio::test]
async fn nothing_loadable_stalls_instead_of_playing_silence() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;
    h.store.toggle_play().await;
    h.diagnostics();

    for i in 0..3 {
        let url = h.url_at(i);
        h.driver_mut().broken_urls.insert(url);
    }
    h.store.skip().await;

    assert!(!h.store.state().is_playing);
    assert_eq!(h.driver().last(), Some(&Call::Pause));
    let events = h.diagnostics();
    assert_eq!(events.last(), Some(&StationEvent::Stalled { failures: 5 }));
    assert!(!h.store.snapshot().read().await.is_playing);
}

#[tokio::test]
async fn unreachable_output_takes_the_station_off_air() {
    let mut h = Harness::live();
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;
    h.store.toggle_play().await;
    h.diagnostics();

    h.driver_mut().unavailable = true;
    h.store.on_driver_event(DriverEvent::Ended).await;

    assert!(!h.store.state().is_playing);
    assert_eq!(h.store.state().current_index, 1);
    assert!(!h.store.snapshot().read().await.is_playing);
    let events = h.diagnostics();
    assert!(matches!(
        events.as_slice(),
        [StationEvent::PlaybackError { reason, .. }] if reason.contains("mpv binary not found")
    ));

    // once the player is back, play resumes the cued item
    h.driver_mut().unavailable = false;
    h.store.toggle_play().await;
    assert!(h.store.state().is_playing);
}

#[tokio::test]
async fn snapshot_follows_every_action() {
    let mut h = Harness::live();
    let snapshot = h.store.snapshot();
    h.store.initialize(&tracks(&["a", "b", "c"]), &[]).await;
    h.store.handle_command(Command::Skip).await;
    h.store.handle_command(Command::Volume { value: 0.9 }).await;

    let seen = snapshot.read().await.clone();
    assert_eq!(&seen, h.store.state());
    assert_eq!(seen.current_index, 1);
    assert_eq!(seen.volume, 0.9);
}

#[tokio::test]
async fn seven_tracks_one_jingle_cadence_three() {
    let schedule = Schedule {
        cadence: 3..=3,
        ..Schedule::default()
    };
    let mut h = Harness::started_at(chrono::Utc::now(), schedule);
    h.store
        .initialize(
            &tracks(&["A", "B", "C", "D", "E", "F", "G"]),
            &[jingle("X")],
        )
        .await;

    let shape: Vec<&str> = h
        .store
        .state()
        .playlist
        .iter()
        .map(|item| match item {
            PlaylistItem::Song(_) => "song",
            PlaylistItem::Content(c) if c.id == "X" => "X",
            _ => "other",
        })
        .collect();
    assert_eq!(
        shape,
        vec!["song", "song", "song", "X", "song", "song", "song", "X", "song"]
    );
}
