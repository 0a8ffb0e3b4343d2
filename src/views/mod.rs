pub mod blockchain;
pub mod polls;

use axum::response::Html;
use tera::{Context, Tera};

use crate::error::AppError;
use crate::handler::AppData;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("polls/index.html", include_str!("../../templates/polls/index.html")),
    ("polls/detail.html", include_str!("../../templates/polls/detail.html")),
    ("polls/results.html", include_str!("../../templates/polls/results.html")),
    ("polls/new.html", include_str!("../../templates/polls/new.html")),
    ("polls/blockchain.html", include_str!("../../templates/polls/blockchain.html")),
];

pub fn load_templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES.iter().copied())?;

    Ok(tera)
}

pub fn render(data: &AppData, template: &str, context: &Context) -> Result<Html<String>, AppError> {
    Ok(Html(data.templates.render(template, context)?))
}
