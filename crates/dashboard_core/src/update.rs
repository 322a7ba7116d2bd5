use crate::{AppState, Effect, Msg};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::FileSelected {
            slot,
            file_name,
            declared_type,
            bytes,
        } => {
            state.select_file(slot, file_name, declared_type, bytes);
            Vec::new()
        }
        Msg::SampleSelected { slot, locator } => state.select_sample(slot, locator),
        Msg::SubmitClicked { slot } => state.submit(slot),
        Msg::PageClosed(page) => state.close_page(page),

        Msg::SampleLoaded { ticket, blob } => {
            state.sample_loaded(ticket, blob);
            Vec::new()
        }
        Msg::SampleFailed { ticket, failure } => {
            state.sample_failed(ticket, failure);
            Vec::new()
        }
        Msg::SubmissionSucceeded { ticket, outcome } => {
            state.submission_succeeded(ticket, outcome)
        }
        Msg::SubmissionFailed { ticket, failure } => {
            state.submission_failed(ticket, failure);
            Vec::new()
        }
        Msg::ArtifactLoaded { ticket, blob } => {
            state.artifact_loaded(ticket, blob);
            Vec::new()
        }
        Msg::ArtifactFailed { ticket, failure } => {
            state.artifact_failed(ticket, failure);
            Vec::new()
        }

        Msg::TrafficStationChanged(station) => {
            state.traffic_mut().0.set_station(station);
            state.mark_dirty();
            Vec::new()
        }
        Msg::TrafficDateTimeChanged(datetime) => {
            state.traffic_mut().0.set_datetime(datetime);
            state.mark_dirty();
            Vec::new()
        }
        Msg::TrafficSubmitted => {
            let (traffic, tickets) = state.traffic_mut();
            let effects: Vec<Effect> = traffic.submit(tickets).into_iter().collect();
            state.mark_dirty();
            effects
        }
        Msg::TrafficSucceeded { ticket, forecast } => {
            let applied = state.traffic_mut().0.succeeded(ticket, forecast);
            state.finish_completion("TrafficSucceeded", ticket, applied);
            Vec::new()
        }
        Msg::TrafficFailed { ticket, failure } => {
            let applied = state.traffic_mut().0.failed(ticket, failure);
            state.finish_completion("TrafficFailed", ticket, applied);
            Vec::new()
        }

        Msg::ChatInputChanged(text) => {
            state.chat_mut().0.set_input(text);
            state.mark_dirty();
            Vec::new()
        }
        Msg::ChatStationSelected(station) => {
            let cancelled = state.chat_mut().0.select_station(station);
            state.mark_dirty();
            cancelled
                .map(|ticket| Effect::CancelChatStream { ticket })
                .into_iter()
                .collect()
        }
        Msg::ChatSubmitted => {
            let (chat, tickets) = state.chat_mut();
            let effects: Vec<Effect> = chat.submit(tickets).into_iter().collect();
            if !effects.is_empty() {
                state.mark_dirty();
            }
            effects
        }
        Msg::ChatChunk { ticket, text } => {
            let applied = state.chat_mut().0.apply_chunk(ticket, &text);
            state.finish_completion("ChatChunk", ticket, applied);
            Vec::new()
        }
        Msg::ChatStreamEnded { ticket } => {
            let applied = state.chat_mut().0.end_stream(ticket);
            state.finish_completion("ChatStreamEnded", ticket, applied);
            Vec::new()
        }
        Msg::ChatStreamFailed { ticket, failure } => {
            let applied = state.chat_mut().0.fail_stream(ticket, &failure);
            state.finish_completion("ChatStreamFailed", ticket, applied);
            Vec::new()
        }
    };

    (state, effects)
}
