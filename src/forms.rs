//! Poll submission forms.
//!
//! A poll is one question plus a formset of choice slots named `choice-1`, `choice-2`, ...
//! Blank slots are skipped; every filled slot is validated on its own.

use std::collections::BTreeMap;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use validator::{Validate, ValidationErrors};

use crate::support::numbers::num_word;

pub const MIN_CHOICES: usize = 2;
pub const BLANK_SLOTS: usize = 3;
pub const MAX_BLANK_SLOTS: usize = 50;

static CHOICE_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new("^choice-([0-9]{1,9})$").unwrap());

#[derive(Debug, Default, Validate)]
pub struct QuestionForm {
    #[validate(length(min = 1, max = 200, message = "Question text must be between 1 and 200 characters."))]
    pub question_text: String,
}

#[derive(Debug, Default, Validate)]
pub struct ChoiceForm {
    #[validate(length(min = 1, max = 200, message = "Choice text must be between 1 and 200 characters."))]
    pub choice_text: String,
}

/// Raw, unvalidated input for the new-poll page.
#[derive(Debug, Default)]
pub struct PollForm {
    pub question_text: String,
    pub choices: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ValidPoll {
    pub question_text: String,
    pub choices: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FormErrors {
    pub question_text: Vec<String>,
    /// Keyed by the slot's position in `PollForm::choices`.
    pub choices: BTreeMap<usize, Vec<String>>,
    pub non_field: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SlotView {
    pub name: String,
    pub label: String,
    pub value: String,
    pub errors: Vec<String>,
}

impl PollForm {
    /// Builds the form from urlencoded pairs. Choice slots keep their submitted order.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut form = PollForm::default();
        let mut slots = Vec::new();

        for (key, value) in pairs {
            if key == "question_text" {
                form.question_text = value.clone();
                continue;
            }

            if let Some(n) = CHOICE_FIELD.captures(key).and_then(|c| c[1].parse::<usize>().ok()) {
                slots.push((n, value.clone()));
            }
        }

        form.choices = slots.into_iter()
            .sorted_by_key(|(n, _)| *n)
            .map(|(_, v)| v)
            .collect();

        form
    }

    pub fn validate(&self) -> Result<ValidPoll, FormErrors> {
        let mut errors = FormErrors::default();

        let question = QuestionForm {
            question_text: self.question_text.trim().to_owned(),
        };
        if let Err(e) = question.validate() {
            errors.question_text = messages(&e);
        }

        let mut choices = Vec::new();
        for (i, raw) in self.choices.iter().enumerate() {
            let choice = ChoiceForm {
                choice_text: raw.trim().to_owned(),
            };

            if choice.choice_text.is_empty() {
                continue;
            }

            match choice.validate() {
                Ok(()) => choices.push(choice.choice_text),
                Err(e) => {
                    errors.choices.insert(i, messages(&e));
                }
            }
        }

        if choices.len() < MIN_CHOICES {
            errors.non_field.push(format!("Please submit at least {} choices.", MIN_CHOICES));
        }

        if errors.is_empty() {
            Ok(ValidPoll {
                question_text: question.question_text,
                choices,
            })
        } else {
            Err(errors)
        }
    }

    /// Slots for rendering: every submitted slot plus blank padding up to `min_slots`.
    pub fn slots(&self, errors: Option<&FormErrors>, min_slots: usize) -> Vec<SlotView> {
        let total = self.choices.len().max(min_slots);

        (0..total)
            .map(|i| SlotView {
                name: format!("choice-{}", i + 1),
                label: format!("{} choice", num_word(i + 1)),
                value: self.choices.get(i).cloned().unwrap_or_default(),
                errors: errors
                    .and_then(|e| e.choices.get(&i))
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect()
    }
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.question_text.is_empty() && self.choices.is_empty() && self.non_field.is_empty()
    }

    pub fn summary(&self) -> String {
        self.question_text.iter()
            .chain(self.choices.values().flatten())
            .chain(self.non_field.iter())
            .join(" ")
    }
}

fn messages(errors: &ValidationErrors) -> Vec<String> {
    errors.field_errors()
        .into_values()
        .flatten()
        .map(|e| match &e.message {
            Some(m) => m.to_string(),
            None => e.code.to_string(),
        })
        .collect()
}
