use std::sync::Once;

use dashboard_core::{
    update, AppState, Effect, Failure, MediaBlob, Msg, Page, Payload, RequestStatus, SlotId,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(dashboard_logging::initialize_for_tests);
}

fn select_file(state: AppState, slot: SlotId, name: &str, bytes: &[u8]) -> AppState {
    let (state, effects) = update(
        state,
        Msg::FileSelected {
            slot,
            file_name: name.to_string(),
            declared_type: None,
            bytes: bytes.to_vec(),
        },
    );
    assert!(effects.is_empty());
    state
}

fn select_sample(state: AppState, slot: SlotId, locator: &str) -> (AppState, u64) {
    let (state, effects) = update(
        state,
        Msg::SampleSelected {
            slot,
            locator: locator.to_string(),
        },
    );
    match effects.as_slice() {
        [Effect::FetchSample { ticket, locator: l }] => {
            assert_eq!(l, locator);
            (state, *ticket)
        }
        other => panic!("expected a single FetchSample, got {other:?}"),
    }
}

fn sample_blob(tag: u8) -> MediaBlob {
    MediaBlob::new(vec![tag; 4], "image/jpeg")
}

#[test]
fn selecting_a_file_creates_preview_and_enables_submit() {
    init_logging();
    let state = select_file(AppState::new(), SlotId::AccidentImage, "crash.jpg", b"jpeg");
    let view = state.view();
    let slot = view.slot(SlotId::AccidentImage).unwrap();

    assert_eq!(slot.input_label.as_deref(), Some("crash.jpg"));
    assert!(slot.preview_url.as_deref().unwrap().starts_with("blob:dashboard/"));
    assert!(slot.can_submit);
    assert_eq!(slot.status, RequestStatus::Idle);
    assert_eq!(view.live_previews, 1);
}

#[test]
fn wrong_media_kind_is_rejected_with_notice() {
    init_logging();
    let state = select_file(AppState::new(), SlotId::Drowsiness, "clip.mp4", b"mp4");
    let view = state.view();
    let slot = view.slot(SlotId::Drowsiness).unwrap();

    assert!(slot.input_label.is_none());
    assert!(slot.preview_url.is_none());
    assert!(!slot.can_submit);
    assert_eq!(slot.notice.as_deref(), Some("Please select a valid image file."));
    assert_eq!(state.registry().acquired_total(), 0);
}

#[test]
fn sample_from_another_slot_is_rejected_with_notice() {
    init_logging();
    let state = select_file(AppState::new(), SlotId::AccidentImage, "crash.jpg", b"jpeg");
    let preview = state.slot(SlotId::AccidentImage).preview();

    let (state, effects) = update(
        state,
        Msg::SampleSelected {
            slot: SlotId::AccidentImage,
            locator: "/drowsiness/drowsiness1.jpg".into(),
        },
    );
    assert!(effects.is_empty());
    let view = state.view();
    let slot = view.slot(SlotId::AccidentImage).unwrap();
    assert_eq!(slot.input_label.as_deref(), Some("crash.jpg"));
    assert_eq!(slot.notice.as_deref(), Some("Please select a valid image sample."));
    assert_eq!(state.slot(SlotId::AccidentImage).preview(), preview);
}

#[test]
fn video_slot_offers_no_samples() {
    init_logging();
    let (state, effects) = update(
        AppState::new(),
        Msg::SampleSelected {
            slot: SlotId::AccidentVideo,
            locator: "/accident_prediction/accident1.webp".into(),
        },
    );
    assert!(effects.is_empty());
    assert!(state.slot(SlotId::AccidentVideo).input().is_none());
    assert_eq!(state.registry().acquired_total(), 0);
}

#[test]
fn submit_without_input_makes_no_request() {
    init_logging();
    let (mut state, effects) = update(
        AppState::new(),
        Msg::SubmitClicked {
            slot: SlotId::AccidentImage,
        },
    );
    assert!(effects.is_empty());
    assert!(state.consume_dirty());
    let view = state.view();
    let slot = view.slot(SlotId::AccidentImage).unwrap();
    assert_eq!(slot.status, RequestStatus::Idle);
    assert_eq!(slot.notice.as_deref(), Some("Select a file or a sample first."));
}

#[test]
fn sample_preview_replaces_old_preview_only_once_loaded() {
    init_logging();
    let state = select_file(AppState::new(), SlotId::AccidentImage, "crash.png", b"png");
    let old_preview = state.slot(SlotId::AccidentImage).preview().unwrap();

    let (state, ticket) = select_sample(state, SlotId::AccidentImage, "/accident_prediction/accident3.jpg");
    // Old preview stays visible while the sample loads.
    assert_eq!(state.slot(SlotId::AccidentImage).preview(), Some(old_preview));
    assert!(state.registry().is_live(old_preview));
    assert_eq!(
        state.view().slot(SlotId::AccidentImage).unwrap().input_label.as_deref(),
        Some("accident3.jpg")
    );

    let (state, effects) = update(state, Msg::SampleLoaded { ticket, blob: sample_blob(7) });
    assert!(effects.is_empty());
    let new_preview = state.slot(SlotId::AccidentImage).preview().unwrap();
    assert_ne!(new_preview, old_preview);
    assert!(!state.registry().is_live(old_preview));
    assert_eq!(state.registry().live_count(), 1);
}

#[test]
fn sample_fetch_failure_keeps_preview_and_reports_failure() {
    init_logging();
    let state = select_file(AppState::new(), SlotId::Drowsiness, "eyes.png", b"png");
    let old_preview = state.slot(SlotId::Drowsiness).preview();

    let (state, ticket) = select_sample(state, SlotId::Drowsiness, "/drowsiness/drowsiness1.jpg");
    let (state, _) = update(
        state,
        Msg::SampleFailed {
            ticket,
            failure: Failure::SampleFetch {
                message: "http status 404".into(),
            },
        },
    );

    let slot = state.slot(SlotId::Drowsiness);
    assert_eq!(slot.preview(), old_preview);
    assert!(matches!(
        slot.request().failure(),
        Some(Failure::SampleFetch { .. })
    ));
    assert!(slot.can_submit());
}

#[test]
fn submitting_an_unloaded_sample_defers_fetch_to_engine() {
    init_logging();
    let (state, _) = select_sample(AppState::new(), SlotId::AccidentImage, "/accident_prediction/accident1.webp");
    let (state, effects) = update(state, Msg::SubmitClicked { slot: SlotId::AccidentImage });

    match effects.as_slice() {
        [Effect::Submit {
            endpoint, payload, ..
        }] => {
            assert_eq!(*endpoint, "/api/accident/predict/image");
            assert_eq!(
                payload,
                &Payload::Sample {
                    locator: "/accident_prediction/accident1.webp".into()
                }
            );
        }
        other => panic!("expected Submit, got {other:?}"),
    }
    assert!(!state.slot(SlotId::AccidentImage).can_submit());
}

#[test]
fn submitting_a_loaded_sample_sends_materialized_bytes() {
    init_logging();
    let (state, ticket) = select_sample(AppState::new(), SlotId::Drowsiness, "/drowsiness/drowsiness2.png");
    let (state, _) = update(state, Msg::SampleLoaded { ticket, blob: sample_blob(3) });
    let (_state, effects) = update(state, Msg::SubmitClicked { slot: SlotId::Drowsiness });

    assert_eq!(
        effects,
        vec![Effect::Submit {
            ticket: effects[0].ticket(),
            endpoint: "/api/drowsiness/predict",
            shape: dashboard_core::ResponseShape::Prediction,
            payload: Payload::Ready {
                blob: sample_blob(3),
                file_name: "drowsiness2.png".into(),
            },
        }]
    );
}

#[test]
fn double_trigger_is_rejected_while_submitting() {
    init_logging();
    let state = select_file(AppState::new(), SlotId::AccidentImage, "crash.jpg", b"jpeg");
    let (state, first) = update(state, Msg::SubmitClicked { slot: SlotId::AccidentImage });
    let (state, second) = update(state, Msg::SubmitClicked { slot: SlotId::AccidentImage });

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(
        state.view().slot(SlotId::AccidentImage).unwrap().status,
        RequestStatus::Submitting
    );
}

#[test]
fn preview_handles_balance_across_file_sample_file_sequence() {
    init_logging();
    let slot = SlotId::AccidentImage;
    let mut state = AppState::new();
    let mut max_live = 0;

    for round in 0..3u8 {
        state = select_file(state, slot, "a.jpg", &[round]);
        max_live = max_live.max(state.registry().live_count());

        let (next, ticket) = select_sample(state, slot, "/accident_prediction/accident1.webp");
        max_live = max_live.max(next.registry().live_count());
        let (next, _) = update(next, Msg::SampleLoaded { ticket, blob: sample_blob(round) });
        max_live = max_live.max(next.registry().live_count());

        state = select_file(next, slot, "b.png", &[round, round]);
        max_live = max_live.max(state.registry().live_count());
    }

    assert_eq!(max_live, 1);
    let (state, _) = update(state, Msg::PageClosed(Page::AccidentDetection));
    assert_eq!(state.registry().live_count(), 0);
    assert_eq!(
        state.registry().acquired_total(),
        state.registry().released_total()
    );
}

#[test]
fn late_sample_for_replaced_input_is_ignored() {
    init_logging();
    let slot = SlotId::AccidentImage;
    let (state, stale_ticket) = select_sample(AppState::new(), slot, "/accident_prediction/accident1.webp");
    let mut state = select_file(state, slot, "mine.jpg", b"mine");
    let preview = state.slot(slot).preview();
    assert!(state.consume_dirty());

    let (mut state, effects) = update(
        state,
        Msg::SampleLoaded {
            ticket: stale_ticket,
            blob: sample_blob(9),
        },
    );
    assert!(effects.is_empty());
    assert!(!state.consume_dirty());
    assert_eq!(state.slot(slot).preview(), preview);
    assert_eq!(
        state.view().slot(slot).unwrap().input_label.as_deref(),
        Some("mine.jpg")
    );
}

#[test]
fn closing_one_page_leaves_other_pages_alone() {
    init_logging();
    let state = select_file(AppState::new(), SlotId::AccidentImage, "crash.jpg", b"1");
    let state = select_file(state, SlotId::Drowsiness, "eyes.jpg", b"2");

    let (state, effects) = update(state, Msg::PageClosed(Page::DriverAlertness));
    assert!(effects.is_empty());
    assert!(state.slot(SlotId::Drowsiness).input().is_none());
    assert!(state.slot(SlotId::Drowsiness).preview().is_none());
    assert!(state.slot(SlotId::AccidentImage).preview().is_some());
    assert_eq!(state.registry().live_count(), 1);
}
