use std::collections::BTreeMap;

use dashboard_core::{
    AnalysisOutcome, ArtifactRef, DerivedArtifactResult, DetectionEvent, Prediction,
    PredictionDetails, ResponseShape, TrafficForecast,
};
use serde::Deserialize;

use crate::ClientError;

#[derive(Debug, Deserialize)]
struct WirePrediction {
    prediction: String,
    #[serde(default)]
    probabilities: BTreeMap<String, f64>,
    #[serde(rename = "confidenceScore")]
    confidence_score: Option<f64>,
    #[serde(rename = "drowsyEvents", default)]
    drowsy_events: Vec<WireEvent>,
    recommendations: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct WireDerived {
    message: String,
    accident_frame: Option<WireFrame>,
    frame_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireFrame {
    filename: String,
    prediction: String,
    #[serde(default)]
    probabilities: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct WireForecast {
    station_id: u32,
    datetime: String,
    prediction: i64,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    detail: serde_json::Value,
}

/// Decode a prediction endpoint body according to the slot's declared shape.
pub fn decode_outcome(shape: ResponseShape, body: &[u8]) -> Result<AnalysisOutcome, ClientError> {
    match shape {
        ResponseShape::Prediction => {
            let wire: WirePrediction = parse(body)?;
            let probabilities = validate_probabilities(wire.probabilities)?;
            let has_details = wire.confidence_score.is_some()
                || !wire.drowsy_events.is_empty()
                || wire.recommendations.is_some();
            let details = has_details.then(|| PredictionDetails {
                confidence_score: wire.confidence_score,
                events: wire
                    .drowsy_events
                    .into_iter()
                    .map(|event| DetectionEvent {
                        kind: event.kind,
                        timestamp: event.timestamp,
                    })
                    .collect(),
                recommendations: wire.recommendations,
            });
            Ok(AnalysisOutcome::Prediction(Prediction {
                label: wire.prediction,
                class_probabilities: probabilities,
                details,
            }))
        }
        ResponseShape::DerivedArtifact => {
            let wire: WireDerived = parse(body)?;
            let artifact = match wire.accident_frame {
                Some(frame) => {
                    if frame.filename.trim().is_empty() {
                        return Err(ClientError::decode("artifact identifier is empty"));
                    }
                    Some(ArtifactRef {
                        identifier: frame.filename,
                        prediction: Prediction {
                            label: frame.prediction,
                            class_probabilities: validate_probabilities(frame.probabilities)?,
                            details: None,
                        },
                    })
                }
                None => None,
            };
            Ok(AnalysisOutcome::Derived(DerivedArtifactResult {
                message: wire.message,
                artifact,
                frame_count: wire.frame_count,
            }))
        }
    }
}

pub fn decode_forecast(body: &[u8]) -> Result<TrafficForecast, ClientError> {
    let wire: WireForecast = parse(body)?;
    Ok(TrafficForecast {
        station_id: wire.station_id,
        datetime: wire.datetime,
        predicted_volume: wire.prediction,
    })
}

/// Best-effort `detail` text from an error body (`{"detail": ...}`).
pub fn error_detail(body: &[u8]) -> Option<String> {
    let wire: WireErrorDetail = serde_json::from_slice(body).ok()?;
    match wire.detail {
        serde_json::Value::String(text) => Some(text),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn parse<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, ClientError> {
    serde_json::from_slice(body).map_err(|err| ClientError::decode(err.to_string()))
}

fn validate_probabilities(
    probabilities: BTreeMap<String, f64>,
) -> Result<BTreeMap<String, f64>, ClientError> {
    if let Some((label, value)) = probabilities
        .iter()
        .find(|(_, value)| !value.is_finite() || **value < 0.0 || **value > 1.0)
    {
        return Err(ClientError::decode(format!(
            "probability for {label} out of range: {value}"
        )));
    }
    Ok(probabilities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailureKind;

    #[test]
    fn drowsiness_extras_become_details() {
        let body = br#"{
            "prediction": "Drowsy",
            "probabilities": {"Alert": 0.1, "Drowsy": 0.9},
            "confidenceScore": 0.9,
            "drowsyEvents": [{"type": "Eyes closed", "timestamp": "12:00:01"}],
            "recommendations": "Take a break"
        }"#;
        let outcome = decode_outcome(ResponseShape::Prediction, body).unwrap();
        let prediction = outcome.prediction().unwrap();
        let details = prediction.details.as_ref().unwrap();
        assert_eq!(prediction.label, "Drowsy");
        assert_eq!(details.confidence_score, Some(0.9));
        assert_eq!(details.events[0].kind, "Eyes closed");
        assert_eq!(details.recommendations.as_deref(), Some("Take a break"));
    }

    #[test]
    fn plain_prediction_has_no_details() {
        let body = br#"{"prediction": "Accident", "probabilities": {"Accident": 0.87}}"#;
        let outcome = decode_outcome(ResponseShape::Prediction, body).unwrap();
        assert!(outcome.prediction().unwrap().details.is_none());
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let body = br#"{"prediction": "Accident", "probabilities": {"Accident": -0.2}}"#;
        let err = decode_outcome(ResponseShape::Prediction, body).unwrap_err();
        assert_eq!(err.kind, FailureKind::Decode);
    }

    #[test]
    fn derived_without_frame_is_terminal() {
        let body = br#"{"message": "No accident detected in the video.", "frame_count": 40}"#;
        let outcome = decode_outcome(ResponseShape::DerivedArtifact, body).unwrap();
        match outcome {
            AnalysisOutcome::Derived(derived) => {
                assert!(derived.artifact.is_none());
                assert_eq!(derived.frame_count, Some(40));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn prediction_body_for_derived_slot_is_a_decode_error() {
        let body = br#"{"prediction": "Accident", "probabilities": {}}"#;
        let err = decode_outcome(ResponseShape::DerivedArtifact, body).unwrap_err();
        assert_eq!(err.kind, FailureKind::Decode);
    }

    #[test]
    fn error_detail_reads_string_and_structured_bodies() {
        assert_eq!(
            error_detail(br#"{"detail": "Station ID 9 not found in the dataset."}"#).as_deref(),
            Some("Station ID 9 not found in the dataset.")
        );
        assert!(error_detail(br#"{"detail": [{"loc": ["body"]}]}"#).is_some());
        assert_eq!(error_detail(b"Internal Server Error"), None);
    }
}
