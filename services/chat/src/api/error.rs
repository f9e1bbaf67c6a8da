use crate::commands::CommandError;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// REST-level error. Non-2xx responses carry no body; the detail goes to
/// the log, only the status travels to the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
}

impl ApiError {
    pub fn internal(context: &str, err: &dyn std::fmt::Display) -> Self {
        tracing::error!(error = %err, "{context}");
        metrics::counter!("murmur_http_errors_total").increment(1);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Malformed input. Kept at 500 like the rest of the REST layer; a
    /// later pass may map this to 400.
    pub fn bad_request(context: &str) -> Self {
        tracing::error!("{context}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Map a failed command. The chat-not-yet-projected race gets its own
    /// status so clients can distinguish "retry after the projection
    /// catches up" from a real failure.
    pub fn from_command(context: &str, err: CommandError) -> Self {
        match err {
            CommandError::ChatStillNotExists => {
                tracing::info!("{context}: chat not projected yet");
                Self {
                    status: StatusCode::IM_A_TEAPOT,
                }
            }
            other => Self::internal(context, &other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        self.status.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_log::PublishError;

    #[test]
    fn chat_race_maps_to_teapot() {
        let err = ApiError::from_command("create message", CommandError::ChatStillNotExists);
        assert_eq!(err.status(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn ownership_violation_maps_to_internal() {
        let err = ApiError::from_command(
            "edit message",
            CommandError::NotOwner {
                user_id: 1,
                chat_id: 2,
                message_id: 3,
            },
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn publish_failures_map_to_internal() {
        let err = ApiError::from_command(
            "pin chat",
            CommandError::Publish(PublishError::Encode(
                serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            )),
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
