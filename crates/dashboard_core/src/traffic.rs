use chrono::NaiveDateTime;
use dashboard_logging::{dash_info, dash_warn};

use crate::effect::Effect;
use crate::result::{Failure, RequestState, TrafficForecast};
use crate::state::TicketSeq;
use crate::Ticket;

/// Wire format the traffic endpoint expects.
pub const TRAFFIC_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats accepted from user input, normalized to [`TRAFFIC_DATETIME_FORMAT`].
const ACCEPTED_FORMATS: &[&str] = &[
    TRAFFIC_DATETIME_FORMAT,
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficQuery {
    pub station_id: u32,
    pub datetime: String,
}

impl TrafficQuery {
    pub fn parse(station: &str, datetime: &str) -> Result<Self, String> {
        let station_id = station
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|id| *id >= 1)
            .ok_or_else(|| format!("Station must be a positive number, got '{}'.", station.trim()))?;

        let datetime = datetime.trim();
        let parsed = ACCEPTED_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(datetime, format).ok())
            .ok_or_else(|| "Invalid datetime format. Use 'YYYY-MM-DD HH:MM:SS'.".to_string())?;

        Ok(Self {
            station_id,
            datetime: parsed.format(TRAFFIC_DATETIME_FORMAT).to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrafficSlot {
    station_input: String,
    datetime_input: String,
    request: RequestState<TrafficForecast>,
    inflight: Option<Ticket>,
    notice: Option<String>,
}

impl TrafficSlot {
    pub fn station_input(&self) -> &str {
        &self.station_input
    }

    pub fn datetime_input(&self) -> &str {
        &self.datetime_input
    }

    pub fn request(&self) -> &RequestState<TrafficForecast> {
        &self.request
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn can_submit(&self) -> bool {
        !self.request.is_submitting()
    }

    pub(crate) fn awaits(&self, ticket: Ticket) -> bool {
        self.inflight == Some(ticket)
    }

    pub(crate) fn set_station(&mut self, station: String) {
        self.station_input = station;
        self.invalidate();
    }

    pub(crate) fn set_datetime(&mut self, datetime: String) {
        self.datetime_input = datetime;
        self.invalidate();
    }

    pub(crate) fn submit(&mut self, tickets: &mut TicketSeq) -> Option<Effect> {
        if self.request.is_submitting() {
            dash_warn!("Traffic submit ignored: request already in flight");
            return None;
        }
        let query = match TrafficQuery::parse(&self.station_input, &self.datetime_input) {
            Ok(query) => query,
            Err(notice) => {
                dash_warn!("Traffic submit rejected: {}", notice);
                self.notice = Some(notice);
                return None;
            }
        };
        self.notice = None;
        self.request = RequestState::Submitting;
        let ticket = tickets.next();
        self.inflight = Some(ticket);
        dash_info!(
            "Traffic prediction for station {} at {} (ticket {})",
            query.station_id,
            query.datetime,
            ticket
        );
        Some(Effect::PredictTraffic { ticket, query })
    }

    pub(crate) fn succeeded(&mut self, ticket: Ticket, forecast: TrafficForecast) -> bool {
        if !self.awaits(ticket) {
            return false;
        }
        self.inflight = None;
        self.request = RequestState::Succeeded(forecast);
        true
    }

    pub(crate) fn failed(&mut self, ticket: Ticket, failure: Failure) -> bool {
        if !self.awaits(ticket) {
            return false;
        }
        self.inflight = None;
        self.request = RequestState::Failed(failure);
        true
    }

    pub(crate) fn teardown(&mut self) {
        *self = Self::default();
    }

    fn invalidate(&mut self) {
        self.inflight = None;
        self.notice = None;
        self.request = RequestState::Idle;
    }
}
