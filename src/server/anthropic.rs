use axum::{
    extract::{ rejection::JsonRejection, Path, State },
    http::{ header, HeaderValue },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use log::info;
use serde::{ Deserialize, Serialize };

use crate::llm::chat::anthropic::{ AnthropicOptions, Citation, CitationDocument, Skill };
use crate::llm::ChatProvider;
use crate::server::api::AppState;
use crate::server::error::{ require_text, ApiError };

#[derive(Deserialize)]
pub struct CitationRequest {
    pub document: String,
    #[serde(default)]
    pub title: String,
    pub question: String,
}

#[derive(Serialize)]
pub struct CitationResponse {
    pub response: String,
    pub citations: Vec<Citation>,
}

#[derive(Deserialize)]
pub struct SkillRequest {
    pub prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillResponse {
    pub response: String,
    pub file_ids: Vec<String>,
    #[serde(rename = "type")]
    pub document_type: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/anthropic/citations", post(citations_handler))
        .route("/api/anthropic/skills/{type}", post(skills_handler))
        .route("/api/anthropic/files/{file_id}", get(file_handler))
}

async fn citations_handler(
    State(state): State<AppState>,
    payload: Result<Json<CitationRequest>, JsonRejection>
) -> Result<Json<CitationResponse>, ApiError> {
    let Json(request) = payload?;
    require_text("document", &request.document)?;
    require_text("question", &request.question)?;
    let client = state.anthropic()?;

    let options = AnthropicOptions {
        model: state.models.anthropic_citations_model.clone(),
        max_tokens: state.models.anthropic_max_tokens,
        citation_document: Some(CitationDocument {
            title: request.title,
            text: request.document,
        }),
        skill: None,
    };
    let reply = client.send(&[], &request.question, &options).await?;

    Ok(
        Json(CitationResponse {
            response: reply.text,
            citations: reply.metadata.citations,
        })
    )
}

async fn skills_handler(
    State(state): State<AppState>,
    Path(document_type): Path<String>,
    payload: Result<Json<SkillRequest>, JsonRejection>
) -> Result<Json<SkillResponse>, ApiError> {
    let skill: Skill = document_type.parse()?;
    let Json(request) = payload?;
    require_text("prompt", &request.prompt)?;
    let client = state.anthropic()?;

    let options = AnthropicOptions {
        model: state.models.anthropic_skills_model.clone(),
        max_tokens: state.models.anthropic_skills_max_tokens,
        citation_document: None,
        skill: Some(skill),
    };
    let reply = client.send(&[], &request.prompt, &options).await?;
    info!(
        "Generated {} document, {} file(s) produced",
        skill.skill_id(),
        reply.metadata.file_ids.len()
    );

    Ok(
        Json(SkillResponse {
            response: reply.text,
            file_ids: reply.metadata.file_ids,
            document_type,
        })
    )
}

async fn file_handler(
    State(state): State<AppState>,
    Path(file_id): Path<String>
) -> Result<Response, ApiError> {
    validate_file_id(&file_id)?;
    let client = state.anthropic()?;
    let metadata = client.file_metadata(&file_id).await?;
    let content = client.download_file(&file_id).await?;

    let content_type = HeaderValue::from_str(&metadata.mime_type).unwrap_or_else(|_|
        HeaderValue::from_static("application/octet-stream")
    );
    let disposition = HeaderValue::from_str(
        &format!("attachment; filename=\"{}\"", attachment_name(&metadata.filename, &file_id))
    ).unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok(
        (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            content,
        ).into_response()
    )
}

fn validate_file_id(file_id: &str) -> Result<(), ApiError> {
    let valid = !file_id.is_empty() &&
        file_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(ApiError::BadRequest(format!("Invalid file id '{}'", file_id)));
    }
    Ok(())
}

/// Keeps the provider filename header-safe: no quotes, path separators or control characters.
fn attachment_name(filename: &str, file_id: &str) -> String {
    let cleaned: String = filename
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '"' | '\\' | '/'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() { file_id.to_string() } else { cleaned.to_string() }
}
