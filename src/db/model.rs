use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, SqlitePool};
use tokio_stream::StreamExt;

use crate::db::schema::{Choice, Poll, Question, User, VoteOutcome};

pub async fn get_or_create_user(conn: &SqlitePool, username: &str) -> anyhow::Result<User> {
    query("INSERT INTO users (username) VALUES (?) ON CONFLICT (username) DO NOTHING;")
        .bind(username)
        .execute(conn)
        .await?;

    let r = query_as::<_, User>("SELECT id, username FROM users WHERE username = ?;")
        .bind(username)
        .fetch_one(conn)
        .await?;

    Ok(r)
}

pub async fn list_published_questions(
    conn: &SqlitePool,
    now: DateTime<Utc>,
    limit: i64,
) -> anyhow::Result<Vec<Question>> {
    let r = query_as::<_, Question>(
        "SELECT id, question_text, pub_date, author_id FROM questions
         WHERE pub_date <= ?
         ORDER BY pub_date DESC, id DESC
         LIMIT ?;")
        .bind(now)
        .bind(limit)
        .fetch_all(conn)
        .await?;

    Ok(r)
}

pub async fn get_published_question(
    conn: &SqlitePool,
    id_question: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Question>> {
    let r = query_as::<_, Question>(
        "SELECT id, question_text, pub_date, author_id FROM questions WHERE id = ? AND pub_date <= ?;")
        .bind(id_question)
        .bind(now)
        .fetch_optional(conn)
        .await?;

    Ok(r)
}

pub async fn get_question(conn: &SqlitePool, id_question: i64) -> anyhow::Result<Option<Question>> {
    let r = query_as::<_, Question>("SELECT id, question_text, pub_date, author_id FROM questions WHERE id = ?;")
        .bind(id_question)
        .fetch_optional(conn)
        .await?;

    Ok(r)
}

pub async fn get_choices(conn: &SqlitePool, id_question: i64) -> anyhow::Result<Vec<Choice>> {
    let mut stream = query_as::<_, Choice>(
        "SELECT id, question_id, choice_text, votes FROM choices WHERE question_id = ? ORDER BY id;")
        .bind(id_question)
        .fetch(conn);

    let mut result = Vec::new();
    while let Some(row) = stream.try_next().await? {
        result.push(row);
    }

    Ok(result)
}

pub async fn count_selections(conn: &SqlitePool, id_question: i64) -> anyhow::Result<i64> {
    let r = query_scalar::<_, i64>("SELECT COUNT(*) FROM voter_selections WHERE question_id = ?;")
        .bind(id_question)
        .fetch_one(conn)
        .await?;

    Ok(r)
}

pub async fn add_poll(
    conn: &SqlitePool,
    id_author: i64,
    question_text: &str,
    pub_date: DateTime<Utc>,
    choices: &[String],
) -> anyhow::Result<Poll> {
    let mut tx = conn.begin().await?;

    let question = query_as::<_, Question>(
        "INSERT INTO questions (question_text, pub_date, author_id)
         VALUES (?, ?, ?)
         RETURNING id, question_text, pub_date, author_id;")
        .bind(question_text)
        .bind(pub_date)
        .bind(id_author)
        .fetch_one(&mut *tx)
        .await?;

    let mut choice_result = Vec::new();

    for choice in choices {
        let r = query_as::<_, Choice>(
            "INSERT INTO choices (question_id, choice_text)
             VALUES (?, ?)
             RETURNING id, question_id, choice_text, votes;")
            .bind(question.id)
            .bind(choice)
            .fetch_one(&mut *tx)
            .await?;

        choice_result.push(r);
    }

    tx.commit().await?;

    Ok(Poll {
        question,
        choices: choice_result,
    })
}

/// Records one voter's selection and bumps the choice's counter in a single transaction.
///
/// The insert takes the write lock up front, and the `(question_id, voter_id)` unique key
/// turns a concurrent second vote into a no-op instead of a second increment.
pub async fn record_vote(
    conn: &SqlitePool,
    id_question: i64,
    id_choice: i64,
    id_voter: i64,
) -> anyhow::Result<VoteOutcome> {
    let mut tx = conn.begin().await?;

    let inserted = query(
        "INSERT INTO voter_selections (question_id, choice_id, voter_id)
         SELECT question_id, id, ? FROM choices WHERE id = ? AND question_id = ?
         ON CONFLICT (question_id, voter_id) DO NOTHING;")
        .bind(id_voter)
        .bind(id_choice)
        .bind(id_question)
        .execute(&mut *tx)
        .await?;

    if inserted.rows_affected() == 0 {
        let voted = query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM voter_selections WHERE question_id = ? AND voter_id = ?) AS known;")
            .bind(id_question)
            .bind(id_voter)
            .fetch_one(&mut *tx)
            .await?;

        tx.rollback().await?;

        return Ok(match voted {
            0 => VoteOutcome::InvalidChoice,
            _ => VoteOutcome::AlreadyVoted,
        });
    }

    query("UPDATE choices SET votes = votes + 1 WHERE id = ? AND question_id = ?;")
        .bind(id_choice)
        .bind(id_question)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(VoteOutcome::Recorded)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::TempDir;
    use tokio::task::JoinSet;

    use super::*;
    use crate::db::dbclient::DBClient;

    async fn seeded() -> (DBClient, User, Poll) {
        let db = DBClient::in_memory().await.unwrap();
        let author = get_or_create_user(db.conn(), "author").await.unwrap();
        let poll = add_poll(
            db.conn(),
            author.id,
            "Best color?",
            Utc::now() - Duration::minutes(5),
            &["Red".to_owned(), "Blue".to_owned()],
        ).await.unwrap();

        (db, author, poll)
    }

    #[tokio::test]
    async fn get_or_create_user_is_stable() {
        let db = DBClient::in_memory().await.unwrap();

        let first = get_or_create_user(db.conn(), "alice").await.unwrap();
        let again = get_or_create_user(db.conn(), "alice").await.unwrap();
        let other = get_or_create_user(db.conn(), "bob").await.unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn add_poll_starts_counters_at_zero() {
        let (db, author, poll) = seeded().await;

        assert_eq!(poll.question.author_id, author.id);
        assert_eq!(poll.choices.len(), 2);
        assert!(poll.choices.iter().all(|c| c.votes == 0 && c.question_id == poll.question.id));

        let stored = get_choices(db.conn(), poll.question.id).await.unwrap();
        let texts = stored.iter().map(|c| c.choice_text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["Red", "Blue"]);
    }

    #[tokio::test]
    async fn list_skips_future_and_keeps_newest_five() {
        let db = DBClient::in_memory().await.unwrap();
        let author = get_or_create_user(db.conn(), "author").await.unwrap();
        let now = Utc::now();

        for i in 1..=7 {
            add_poll(db.conn(), author.id, &format!("Past {}", i), now - Duration::hours(i), &[]).await.unwrap();
        }
        add_poll(db.conn(), author.id, "Future", now + Duration::days(30), &[]).await.unwrap();

        let listed = list_published_questions(db.conn(), now, 5).await.unwrap();
        let texts = listed.iter().map(|q| q.question_text.as_str()).collect::<Vec<_>>();

        assert_eq!(texts, vec!["Past 1", "Past 2", "Past 3", "Past 4", "Past 5"]);
    }

    #[tokio::test]
    async fn published_lookup_hides_future_questions() {
        let db = DBClient::in_memory().await.unwrap();
        let author = get_or_create_user(db.conn(), "author").await.unwrap();
        let now = Utc::now();

        let future = add_poll(db.conn(), author.id, "Future", now + Duration::days(30), &[]).await.unwrap();

        assert!(get_published_question(db.conn(), future.question.id, now).await.unwrap().is_none());
        assert!(get_question(db.conn(), future.question.id).await.unwrap().is_some());
        assert!(get_question(db.conn(), 9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_vote_counts_once_per_voter() {
        let (db, _, poll) = seeded().await;
        let voter = get_or_create_user(db.conn(), "alice").await.unwrap();
        let (red, blue) = (&poll.choices[0], &poll.choices[1]);

        let first = record_vote(db.conn(), poll.question.id, blue.id, voter.id).await.unwrap();
        let second = record_vote(db.conn(), poll.question.id, red.id, voter.id).await.unwrap();

        assert_eq!(first, VoteOutcome::Recorded);
        assert_eq!(second, VoteOutcome::AlreadyVoted);

        let stored = get_choices(db.conn(), poll.question.id).await.unwrap();
        assert_eq!(stored[0].votes, 0);
        assert_eq!(stored[1].votes, 1);
        assert_eq!(count_selections(db.conn(), poll.question.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn record_vote_rejects_choice_from_another_question() {
        let (db, author, poll) = seeded().await;
        let other = add_poll(
            db.conn(),
            author.id,
            "Best shape?",
            Utc::now(),
            &["Circle".to_owned(), "Square".to_owned()],
        ).await.unwrap();
        let voter = get_or_create_user(db.conn(), "alice").await.unwrap();

        let outcome = record_vote(db.conn(), poll.question.id, other.choices[0].id, voter.id).await.unwrap();

        assert_eq!(outcome, VoteOutcome::InvalidChoice);
        assert_eq!(count_selections(db.conn(), poll.question.id).await.unwrap(), 0);
        assert!(get_choices(db.conn(), other.question.id).await.unwrap().iter().all(|c| c.votes == 0));
    }

    #[tokio::test]
    async fn selection_cannot_point_at_foreign_choice() {
        let (db, author, poll) = seeded().await;
        let other = add_poll(db.conn(), author.id, "Best shape?", Utc::now(), &["Circle".to_owned()]).await.unwrap();
        let voter = get_or_create_user(db.conn(), "alice").await.unwrap();

        let r = query("INSERT INTO voter_selections (question_id, choice_id, voter_id) VALUES (?, ?, ?);")
            .bind(poll.question.id)
            .bind(other.choices[0].id)
            .bind(voter.id)
            .execute(db.conn())
            .await;

        assert!(r.is_err());
    }

    #[tokio::test]
    async fn selection_is_unique_per_question_and_voter() {
        let (db, _, poll) = seeded().await;
        let voter = get_or_create_user(db.conn(), "alice").await.unwrap();
        record_vote(db.conn(), poll.question.id, poll.choices[0].id, voter.id).await.unwrap();

        let r = query("INSERT INTO voter_selections (question_id, choice_id, voter_id) VALUES (?, ?, ?);")
            .bind(poll.question.id)
            .bind(poll.choices[1].id)
            .bind(voter.id)
            .execute(db.conn())
            .await;

        assert!(r.is_err());
        assert_eq!(count_selections(db.conn(), poll.question.id).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_votes_are_counted_exactly_once() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("polls.db").display());
        let db = DBClient::new(&url, 5).await.unwrap();

        let author = get_or_create_user(db.conn(), "author").await.unwrap();
        let poll = add_poll(
            db.conn(),
            author.id,
            "Best color?",
            Utc::now(),
            &["Red".to_owned(), "Blue".to_owned()],
        ).await.unwrap();
        let (id_question, id_choice) = (poll.question.id, poll.choices[0].id);

        let id_voter = get_or_create_user(db.conn(), "alice").await.unwrap().id;
        let mut same_voter = JoinSet::new();
        for _ in 0..40 {
            let conn = db.conn().clone();
            same_voter.spawn(async move { record_vote(&conn, id_question, id_choice, id_voter).await });
        }

        let mut outcomes = Vec::new();
        while let Some(r) = same_voter.join_next().await {
            outcomes.push(r.unwrap().unwrap());
        }
        assert_eq!(outcomes.iter().filter(|o| **o == VoteOutcome::Recorded).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == VoteOutcome::AlreadyVoted).count(), 39);
        assert_eq!(get_choices(db.conn(), id_question).await.unwrap()[0].votes, 1);
        assert_eq!(count_selections(db.conn(), id_question).await.unwrap(), 1);

        let mut voters = Vec::new();
        for i in 0..40 {
            voters.push(get_or_create_user(db.conn(), &format!("voter-{}", i)).await.unwrap());
        }

        let mut many_voters = JoinSet::new();
        for v in voters {
            let conn = db.conn().clone();
            many_voters.spawn(async move { record_vote(&conn, id_question, id_choice, v.id).await });
        }

        while let Some(r) = many_voters.join_next().await {
            assert_eq!(r.unwrap().unwrap(), VoteOutcome::Recorded);
        }
        assert_eq!(get_choices(db.conn(), id_question).await.unwrap()[0].votes, 41);
        assert_eq!(count_selections(db.conn(), id_question).await.unwrap(), 41);
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_to_their_polls() {
        let (db, author, poll) = seeded().await;
        let voter = get_or_create_user(db.conn(), "alice").await.unwrap();
        record_vote(db.conn(), poll.question.id, poll.choices[0].id, voter.id).await.unwrap();

        query("DELETE FROM users WHERE id = ?;").bind(author.id).execute(db.conn()).await.unwrap();

        assert!(get_question(db.conn(), poll.question.id).await.unwrap().is_none());
        assert!(get_choices(db.conn(), poll.question.id).await.unwrap().is_empty());
        assert_eq!(count_selections(db.conn(), poll.question.id).await.unwrap(), 0);
    }
}
