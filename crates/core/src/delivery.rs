//! Delivery Mode Selection
//!
//! Decides, per activation, whether a member's introduction is shown as a
//! pre-rendered video or through a live avatar stream. The coordinator only
//! talks to the [`DeliverySelector`] trait, so either mode can be swapped out.

use crate::{
    gateway::{GatewayError, RequestGateway},
    models::{IntroResponse, VideoStatus},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// The outcome of selecting a delivery mode for one activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A finished video is available at this URL.
    PreRendered { video_url: String },
    /// The video exists but is not playable yet. Not an error.
    Pending { status: VideoStatus },
    /// The backend does not pre-render; open a live session instead.
    LiveStream,
}

/// Classifies the result of `request-intro`.
///
/// A missing generate-intro endpoint means the backend speaks the live
/// contract, so it selects [`Delivery::LiveStream`]. Every other error is
/// returned untouched.
pub fn classify(outcome: Result<IntroResponse, GatewayError>) -> Result<Delivery, GatewayError> {
    match outcome {
        Ok(IntroResponse {
            status: VideoStatus::Completed,
            video_url: Some(video_url),
            ..
        }) if !video_url.trim().is_empty() => Ok(Delivery::PreRendered { video_url }),
        Ok(response) => Ok(Delivery::Pending {
            status: response.status,
        }),
        Err(err) if err.is_missing_endpoint() => Ok(Delivery::LiveStream),
        Err(err) => Err(err),
    }
}

#[async_trait]
pub trait DeliverySelector: Send + Sync {
    async fn select(&self, team_id: &str, member_index: usize) -> Result<Delivery, GatewayError>;
}

/// Asks the backend for a pre-rendered video and falls back to live streaming
/// when the backend has no such endpoint.
pub struct DeliveryModeSelector {
    gateway: Arc<dyn RequestGateway>,
}

impl DeliveryModeSelector {
    pub fn new(gateway: Arc<dyn RequestGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl DeliverySelector for DeliveryModeSelector {
    async fn select(&self, team_id: &str, member_index: usize) -> Result<Delivery, GatewayError> {
        let delivery = classify(self.gateway.request_intro(team_id, member_index).await)?;
        debug!(team_id, member_index, ?delivery, "Delivery mode selected");
        Ok(delivery)
    }
}

/// Always delivers through a live session, never asking for a rendered video.
pub struct LiveStreamOnly;

#[async_trait]
impl DeliverySelector for LiveStreamOnly {
    async fn select(&self, _team_id: &str, _member_index: usize) -> Result<Delivery, GatewayError> {
        Ok(Delivery::LiveStream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockRequestGateway;

    fn response(status: VideoStatus, url: Option<&str>) -> IntroResponse {
        IntroResponse {
            status,
            video_url: url.map(str::to_string),
            video_id: None,
            member_name: None,
        }
    }

    #[test]
    fn test_completed_with_url_is_pre_rendered() {
        let delivery = classify(Ok(response(VideoStatus::Completed, Some("https://x/v.mp4"))));
        assert_eq!(
            delivery.unwrap(),
            Delivery::PreRendered {
                video_url: "https://x/v.mp4".to_string()
            }
        );
    }

    #[test]
    fn test_completed_without_url_is_pending() {
        let delivery = classify(Ok(response(VideoStatus::Completed, None))).unwrap();
        assert_eq!(
            delivery,
            Delivery::Pending {
                status: VideoStatus::Completed
            }
        );
    }

    #[test]
    fn test_processing_and_failed_are_pending() {
        for status in [VideoStatus::Processing, VideoStatus::Pending, VideoStatus::Failed] {
            let delivery = classify(Ok(response(status.clone(), None))).unwrap();
            assert_eq!(delivery, Delivery::Pending { status });
        }
    }

    #[test]
    fn test_missing_endpoint_selects_live_stream() {
        let delivery = classify(Err(GatewayError::Http {
            status: 404,
            detail: None,
        }));
        assert_eq!(delivery.unwrap(), Delivery::LiveStream);
    }

    #[test]
    fn test_missing_team_is_an_error_not_live_stream() {
        let err = classify(Err(GatewayError::Http {
            status: 404,
            detail: Some("Team not found".to_string()),
        }))
        .unwrap_err();
        assert_eq!(err.detail(), Some("Team not found"));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = classify(Err(GatewayError::Http {
            status: 502,
            detail: Some("HeyGen API error".to_string()),
        }))
        .unwrap_err();
        assert_eq!(err.detail(), Some("HeyGen API error"));

        let err = classify(Err(GatewayError::Transport("refused".to_string()))).unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }

    #[tokio::test]
    async fn test_selector_asks_gateway_for_member() {
        let mut gateway = MockRequestGateway::new();
        gateway
            .expect_request_intro()
            .withf(|team_id, index| team_id == "T" && *index == 1)
            .times(1)
            .returning(|_, _| Ok(response(VideoStatus::Completed, Some("https://x/v.mp4"))));

        let selector = DeliveryModeSelector::new(Arc::new(gateway));
        let delivery = selector.select("T", 1).await.unwrap();
        assert!(matches!(delivery, Delivery::PreRendered { .. }));
    }

    #[tokio::test]
    async fn test_live_only_selector() {
        assert_eq!(LiveStreamOnly.select("T", 0).await.unwrap(), Delivery::LiveStream);
    }
}
