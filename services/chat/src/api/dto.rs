use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdResponse {
    pub id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatCreateDto {
    pub title: String,
    #[serde(default)]
    pub participant_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatEditDto {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub participant_ids: Vec<i64>,
    #[serde(default)]
    pub blog: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreateDto {
    pub content: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageEditDto {
    pub id: i64,
    pub content: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantAddDto {
    pub participant_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDeleteDto {
    pub participant_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_create_without_participants_defaults_to_empty() {
        let dto: ChatCreateDto = serde_json::from_str(r#"{"title":"new chat 1"}"#).unwrap();
        assert_eq!(dto.title, "new chat 1");
        assert!(dto.participant_ids.is_empty());
    }

    #[test]
    fn chat_edit_binds_camel_case() {
        let dto: ChatEditDto = serde_json::from_str(
            r#"{"id":4,"title":"renamed","participantIds":[7,8],"blog":true}"#,
        )
        .unwrap();
        assert_eq!(dto.id, 4);
        assert_eq!(dto.participant_ids, vec![7, 8]);
        assert!(dto.blog);
    }

    #[test]
    fn id_response_serializes_lowercase_id() {
        let body = serde_json::to_string(&IdResponse { id: 99 }).unwrap();
        assert_eq!(body, r#"{"id":99}"#);
    }
}
