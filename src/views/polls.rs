use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use chrono::{DateTime, Utc};
use evlog::meta;
use serde::{Deserialize, Serialize};
use tera::Context;

use crate::auth::CurrentUser;
use crate::db;
use crate::db::schema::{Question, VoteOutcome};
use crate::error::AppError;
use crate::forms::{FormErrors, PollForm, BLANK_SLOTS, MAX_BLANK_SLOTS};
use crate::handler::AppData;
use crate::runtime::get_logger;
use crate::views::render;

pub const LATEST_LIMIT: i64 = 5;

const ERR_ANONYMOUS_VOTE: &str = "Please login or signup to vote.";
const ERR_NO_SELECTION: &str = "You didn't select a choice.";
const ERR_ALREADY_VOTED: &str = "You already voted on this question. Please vote on a different question.";
const ERR_ANONYMOUS_POLL: &str = "Please login or signup to create a poll.";

#[derive(Serialize)]
struct QuestionRow<'a> {
    id: i64,
    question_text: &'a str,
    pub_date: DateTime<Utc>,
    published_recently: bool,
}

#[derive(Deserialize)]
pub struct VoteForm {
    choice: Option<String>,
}

#[derive(Deserialize)]
pub struct NewPollQuery {
    slots: Option<usize>,
}

pub async fn index(State(data): State<Arc<AppData>>) -> Result<Html<String>, AppError> {
    let now = Utc::now();
    let questions = db::model::list_published_questions(data.db_client.conn(), now, LATEST_LIMIT).await?;

    let rows = questions.iter()
        .map(|q| QuestionRow {
            id: q.id,
            question_text: &q.question_text,
            pub_date: q.pub_date,
            published_recently: q.was_published_recently(now),
        })
        .collect::<Vec<_>>();

    let mut context = Context::new();
    context.insert("latest_question_list", &rows);

    render(&data, "polls/index.html", &context)
}

pub async fn detail(State(data): State<Arc<AppData>>, Path(id): Path<i64>) -> Result<Html<String>, AppError> {
    let question = published_question(&data, id).await?;

    render_detail(&data, &question, None).await
}

// Unlike `detail`, results are served for questions that are not yet published.
pub async fn results(State(data): State<Arc<AppData>>, Path(id): Path<i64>) -> Result<Html<String>, AppError> {
    let question = match db::model::get_question(data.db_client.conn(), id).await? {
        None => return Err(AppError::NotFound),
        Some(v) => v,
    };

    let choices = db::model::get_choices(data.db_client.conn(), question.id).await?;
    let voters = db::model::count_selections(data.db_client.conn(), question.id).await?;

    let mut context = Context::new();
    context.insert("question", &question);
    context.insert("choices", &choices);
    context.insert("voters", &voters);

    render(&data, "polls/results.html", &context)
}

pub async fn vote(
    State(data): State<Arc<AppData>>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<VoteForm>,
) -> Result<Response, AppError> {
    let question = published_question(&data, id).await?;

    let voter = match user {
        None => {
            get_logger().info("Anonymous user attempted to vote.", meta! {
                "QuestionID" => question.id,
            });
            return Ok(render_detail(&data, &question, Some(ERR_ANONYMOUS_VOTE)).await?.into_response());
        }
        Some(v) => v,
    };

    let choices = db::model::get_choices(data.db_client.conn(), question.id).await?;
    let selected = form.choice
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|v| choices.iter().find(|c| c.id == v));

    let selected = match selected {
        None => {
            get_logger().info("Vote submitted without a valid choice.", meta! {
                "QuestionID" => question.id,
                "Voter" => voter.username,
            });
            return Ok(render_detail(&data, &question, Some(ERR_NO_SELECTION)).await?.into_response());
        }
        Some(v) => v,
    };

    let outcome = db::model::record_vote(data.db_client.conn(), question.id, selected.id, voter.id).await?;

    match outcome {
        VoteOutcome::Recorded => {
            get_logger().info("Vote recorded.", meta! {
                "QuestionID" => question.id,
                "ChoiceID" => selected.id,
                "Voter" => voter.username,
            });
            Ok(Redirect::to(&format!("/polls/{}/results/", question.id)).into_response())
        }
        VoteOutcome::AlreadyVoted => {
            get_logger().info("User attempted to vote twice on the same question.", meta! {
                "QuestionID" => question.id,
                "Voter" => voter.username,
            });
            Ok(render_detail(&data, &question, Some(ERR_ALREADY_VOTED)).await?.into_response())
        }
        VoteOutcome::InvalidChoice => {
            get_logger().info("Vote submitted without a valid choice.", meta! {
                "QuestionID" => question.id,
                "ChoiceID" => selected.id,
                "Voter" => voter.username,
            });
            Ok(render_detail(&data, &question, Some(ERR_NO_SELECTION)).await?.into_response())
        }
    }
}

pub async fn new_poll_form(
    State(data): State<Arc<AppData>>,
    Query(query): Query<NewPollQuery>,
) -> Result<Html<String>, AppError> {
    let slots = query.slots.unwrap_or(BLANK_SLOTS).clamp(BLANK_SLOTS, MAX_BLANK_SLOTS);

    render_new(&data, &PollForm::default(), None, slots, None)
}

pub async fn new_poll(
    State(data): State<Arc<AppData>>,
    CurrentUser(user): CurrentUser,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let form = PollForm::from_pairs(&pairs);

    let author = match user {
        None => {
            get_logger().info("Anonymous user attempted to create a poll.", meta! {
                "QuestionText" => form.question_text,
            });
            return Ok(render_new(&data, &form, None, BLANK_SLOTS, Some(ERR_ANONYMOUS_POLL))?.into_response());
        }
        Some(v) => v,
    };

    let poll = match form.validate() {
        Ok(v) => v,
        Err(errors) => {
            get_logger().info("Rejected invalid poll submission.", meta! {
                "Author" => author.username,
                "Errors" => errors.summary(),
            });
            return Ok(render_new(&data, &form, Some(&errors), BLANK_SLOTS, None)?.into_response());
        }
    };

    let created = db::model::add_poll(
        data.db_client.conn(),
        author.id,
        &poll.question_text,
        Utc::now(),
        &poll.choices,
    ).await?;

    get_logger().info("Poll created.", meta! {
        "QuestionID" => created.question.id,
        "Author" => author.username,
        "Choices" => created.choices.len(),
    });

    Ok(Redirect::to("/polls/").into_response())
}

async fn published_question(data: &AppData, id: i64) -> Result<Question, AppError> {
    match db::model::get_published_question(data.db_client.conn(), id, Utc::now()).await? {
        None => Err(AppError::NotFound),
        Some(v) => Ok(v),
    }
}

async fn render_detail(data: &AppData, question: &Question, error_message: Option<&str>) -> Result<Html<String>, AppError> {
    let choices = db::model::get_choices(data.db_client.conn(), question.id).await?;

    let mut context = Context::new();
    context.insert("question", question);
    context.insert("choices", &choices);
    context.insert("error_message", &error_message);

    render(data, "polls/detail.html", &context)
}

fn render_new(
    data: &AppData,
    form: &PollForm,
    errors: Option<&FormErrors>,
    min_slots: usize,
    error_message: Option<&str>,
) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("question_text", &form.question_text);
    context.insert("question_errors", &errors.map(|e| e.question_text.clone()).unwrap_or_default());
    context.insert("non_field_errors", &errors.map(|e| e.non_field.clone()).unwrap_or_default());
    context.insert("slots", &form.slots(errors, min_slots));
    context.insert("next_slots", &(form.choices.len().max(min_slots) + 1));
    context.insert("error_message", &error_message);

    render(data, "polls/new.html", &context)
}
