//! Quiz and question management routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{
    CreateQuestionRequest, CreateQuizRequest, QuizResponse, UpdateQuestionRequest,
};
use crate::api::server::AppState;
use crate::database::models::{QuestionDbModel, QuizDbModel};

/// Create the quizzes router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_quiz).get(list_quizzes))
        .route("/{quiz_id}", get(get_quiz))
        .route("/{quiz_id}/questions", post(add_question))
        .route("/{quiz_id}/questions/reorder", post(reorder_questions))
        .route(
            "/{quiz_id}/questions/{question_id}",
            patch(update_question).delete(delete_question),
        )
}

/// Reject correct answers that cannot be scored for their answer type.
fn validate_correct_answer(
    answer_type: &str,
    options: &[String],
    correct_answer: Option<&str>,
) -> Result<(), ApiError> {
    if answer_type == "multiple_choice"
        && let Some(correct) = correct_answer
        && !correct.is_empty()
        && !options.iter().any(|option| option == correct)
    {
        return Err(ApiError::bad_request(
            "correct_answer must match one of the options for multiple choice",
        ));
    }
    if answer_type == "numeric"
        && let Some(correct) = correct_answer
        && !correct.is_empty()
        && correct.trim().parse::<f64>().is_err()
    {
        return Err(ApiError::bad_request(
            "correct_answer must be a number for numeric questions",
        ));
    }
    Ok(())
}

fn build_question(
    quiz_id: &str,
    request: &CreateQuestionRequest,
    default_duration: i64,
    position: i64,
) -> Result<QuestionDbModel, ApiError> {
    validate_correct_answer(
        &request.answer_type,
        &request.options,
        request.correct_answer.as_deref(),
    )?;

    let duration_seconds = request.duration_seconds.unwrap_or(default_duration);
    if duration_seconds < 5 {
        return Err(ApiError::bad_request(
            "duration_seconds must be at least 5 seconds",
        ));
    }

    let mut question = QuestionDbModel {
        id: uuid::Uuid::new_v4().to_string(),
        quiz_id: quiz_id.to_string(),
        text: request.text.clone(),
        images: "[]".to_string(),
        audio: "[]".to_string(),
        answer_type: request.answer_type.clone(),
        options: "[]".to_string(),
        correct_answer: request.correct_answer.clone(),
        scoring_type: Some(
            request
                .scoring_type
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "exact".to_string()),
        ),
        duration_seconds,
        position,
        speed_bonus: request.speed_bonus,
    };
    question.set_image_urls(&request.images);
    question.set_audio_urls(&request.audio);
    question.set_option_list(&request.options);
    Ok(question)
}

pub async fn quiz_response(state: &AppState, quiz_id: &str) -> ApiResult<Json<QuizResponse>> {
    let quiz = state.quiz_repository.get_quiz(quiz_id).await?;
    let questions = state.quiz_repository.list_questions(quiz_id).await?;
    Ok(Json(QuizResponse::from_parts(&quiz, &questions)))
}

/// Create a quiz with nested questions.
#[utoipa::path(
    post,
    path = "/admin/quizzes",
    tag = "quizzes",
    request_body = CreateQuizRequest,
    responses(
        (status = 200, description = "Created quiz", body = QuizResponse),
        (status = 400, description = "Invalid question", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn create_quiz(
    State(state): State<AppState>,
    Json(request): Json<CreateQuizRequest>,
) -> ApiResult<Json<QuizResponse>> {
    if request.default_question_duration < 5 {
        return Err(ApiError::bad_request(
            "default_question_duration must be at least 5 seconds",
        ));
    }
    if request.gap_seconds < 0 {
        return Err(ApiError::bad_request("gap_seconds must not be negative"));
    }

    let mut quiz = QuizDbModel::new(&request.name);
    quiz.description = request.description.clone();
    quiz.default_question_duration = request.default_question_duration;
    quiz.gap_seconds = request.gap_seconds;

    let mut questions = Vec::with_capacity(request.questions.len());
    for (position, question_request) in request.questions.iter().enumerate() {
        questions.push(build_question(
            &quiz.id,
            question_request,
            quiz.default_question_duration,
            position as i64,
        )?);
    }

    state.quiz_repository.create_quiz(&quiz, &questions).await?;
    quiz_response(&state, &quiz.id).await
}

/// List all quizzes with their questions.
#[utoipa::path(
    get,
    path = "/admin/quizzes",
    tag = "quizzes",
    responses(
        (status = 200, description = "All quizzes", body = [QuizResponse])
    )
)]
pub async fn list_quizzes(State(state): State<AppState>) -> ApiResult<Json<Vec<QuizResponse>>> {
    let quizzes = state.quiz_repository.list_quizzes().await?;
    let mut responses = Vec::with_capacity(quizzes.len());
    for quiz in &quizzes {
        let questions = state.quiz_repository.list_questions(&quiz.id).await?;
        responses.push(QuizResponse::from_parts(quiz, &questions));
    }
    Ok(Json(responses))
}

/// Fetch a single quiz.
#[utoipa::path(
    get,
    path = "/admin/quizzes/{quiz_id}",
    tag = "quizzes",
    params(("quiz_id" = String, Path, description = "Quiz id")),
    responses(
        (status = 200, description = "Quiz", body = QuizResponse),
        (status = 404, description = "Unknown quiz", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_quiz(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> ApiResult<Json<QuizResponse>> {
    quiz_response(&state, &quiz_id).await
}

/// Append a question at the next position.
#[utoipa::path(
    post,
    path = "/admin/quizzes/{quiz_id}/questions",
    tag = "quizzes",
    params(("quiz_id" = String, Path, description = "Quiz id")),
    request_body = CreateQuestionRequest,
    responses(
        (status = 200, description = "Updated quiz", body = QuizResponse),
        (status = 404, description = "Unknown quiz", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn add_question(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
    Json(request): Json<CreateQuestionRequest>,
) -> ApiResult<Json<QuizResponse>> {
    let quiz = state.quiz_repository.get_quiz(&quiz_id).await?;
    let existing = state.quiz_repository.list_questions(&quiz_id).await?;
    let question = build_question(
        &quiz_id,
        &request,
        quiz.default_question_duration,
        existing.len() as i64,
    )?;
    state.quiz_repository.insert_question(&question).await?;
    quiz_response(&state, &quiz_id).await
}

/// Reorder a quiz's questions. The body must list every question id.
#[utoipa::path(
    post,
    path = "/admin/quizzes/{quiz_id}/questions/reorder",
    tag = "quizzes",
    params(("quiz_id" = String, Path, description = "Quiz id")),
    request_body = Vec<String>,
    responses(
        (status = 200, description = "Updated quiz", body = QuizResponse),
        (status = 400, description = "Order list incomplete", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn reorder_questions(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
    Json(order): Json<Vec<String>>,
) -> ApiResult<Json<QuizResponse>> {
    state.quiz_repository.get_quiz(&quiz_id).await?;
    let questions = state.quiz_repository.list_questions(&quiz_id).await?;

    let existing: std::collections::HashSet<&str> =
        questions.iter().map(|question| question.id.as_str()).collect();
    let requested: std::collections::HashSet<&str> =
        order.iter().map(String::as_str).collect();
    if existing != requested || order.len() != questions.len() {
        return Err(ApiError::bad_request(
            "Order list must include all question ids",
        ));
    }

    let positions: Vec<(String, i64)> = order
        .iter()
        .enumerate()
        .map(|(position, id)| (id.clone(), position as i64))
        .collect();
    state.quiz_repository.set_question_positions(&positions).await?;
    quiz_response(&state, &quiz_id).await
}

/// Partially update a question.
#[utoipa::path(
    patch,
    path = "/admin/quizzes/{quiz_id}/questions/{question_id}",
    tag = "quizzes",
    params(
        ("quiz_id" = String, Path, description = "Quiz id"),
        ("question_id" = String, Path, description = "Question id")
    ),
    request_body = UpdateQuestionRequest,
    responses(
        (status = 200, description = "Updated quiz", body = QuizResponse),
        (status = 404, description = "Question not in quiz", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn update_question(
    State(state): State<AppState>,
    Path((quiz_id, question_id)): Path<(String, String)>,
    Json(request): Json<UpdateQuestionRequest>,
) -> ApiResult<Json<QuizResponse>> {
    let mut question = state.quiz_repository.get_question(&question_id).await?;
    if question.quiz_id != quiz_id {
        return Err(ApiError::not_found("Question not found"));
    }

    if let Some(text) = request.text {
        question.text = Some(text);
    }
    if let Some(images) = request.images {
        question.set_image_urls(&images);
    }
    if let Some(audio) = request.audio {
        question.set_audio_urls(&audio);
    }
    if let Some(answer_type) = request.answer_type {
        question.answer_type = answer_type;
    }
    if let Some(options) = request.options {
        question.set_option_list(&options);
    }
    if let Some(correct_answer) = request.correct_answer {
        question.correct_answer = Some(correct_answer);
    }
    if let Some(scoring_type) = request.scoring_type {
        question.scoring_type = Some(scoring_type);
    }
    if let Some(duration_seconds) = request.duration_seconds {
        question.duration_seconds = duration_seconds;
    }
    if let Some(speed_bonus) = request.speed_bonus {
        question.speed_bonus = speed_bonus;
    }

    validate_correct_answer(
        &question.answer_type,
        &question.option_list(),
        question.correct_answer.as_deref(),
    )?;
    if question.duration_seconds < 5 {
        return Err(ApiError::bad_request(
            "duration_seconds must be at least 5 seconds",
        ));
    }

    state.quiz_repository.update_question(&question).await?;
    quiz_response(&state, &quiz_id).await
}

/// Delete a question and re-sequence the remaining positions.
#[utoipa::path(
    delete,
    path = "/admin/quizzes/{quiz_id}/questions/{question_id}",
    tag = "quizzes",
    params(
        ("quiz_id" = String, Path, description = "Quiz id"),
        ("question_id" = String, Path, description = "Question id")
    ),
    responses(
        (status = 200, description = "Updated quiz", body = QuizResponse),
        (status = 404, description = "Question not in quiz", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn delete_question(
    State(state): State<AppState>,
    Path((quiz_id, question_id)): Path<(String, String)>,
) -> ApiResult<Json<QuizResponse>> {
    let question = state.quiz_repository.get_question(&question_id).await?;
    if question.quiz_id != quiz_id {
        return Err(ApiError::not_found("Question not found"));
    }

    state.quiz_repository.delete_question(&question_id).await?;

    let remaining = state.quiz_repository.list_questions(&quiz_id).await?;
    let positions: Vec<(String, i64)> = remaining
        .iter()
        .enumerate()
        .map(|(position, question)| (question.id.clone(), position as i64))
        .collect();
    state.quiz_repository.set_question_positions(&positions).await?;

    quiz_response(&state, &quiz_id).await
}
