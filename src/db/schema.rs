use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Question {
    pub id: i64,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    pub author_id: i64,
}

impl Question {
    /// True when the question went live within the last day and is not scheduled for later.
    pub fn was_published_recently(&self, now: DateTime<Utc>) -> bool {
        now - Duration::days(1) <= self.pub_date && self.pub_date <= now
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub choice_text: String,
    pub votes: i64,
}

pub struct Poll {
    pub question: Question,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    AlreadyVoted,
    InvalidChoice,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn question_at(pub_date: DateTime<Utc>) -> Question {
        Question {
            id: 1,
            question_text: "Best color?".to_owned(),
            pub_date,
            author_id: 1,
        }
    }

    #[rstest]
    #[case::future(Duration::days(30), false)]
    #[case::older_than_a_day(-Duration::days(1) - Duration::seconds(1), false)]
    #[case::just_inside_a_day(-(Duration::hours(23) + Duration::minutes(59) + Duration::seconds(59)), true)]
    #[case::now(Duration::zero(), true)]
    fn published_recently(#[case] offset: Duration, #[case] expected: bool) {
        let now = Utc::now();
        assert_eq!(question_at(now + offset).was_published_recently(now), expected);
    }
}
