use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::Form;
use evlog::meta;
use serde::Deserialize;
use tera::Context;

use crate::chain::{is_valid_address, wei_to_ether};
use crate::error::AppError;
use crate::handler::AppData;
use crate::runtime::get_logger;
use crate::views::render;

#[derive(Deserialize)]
pub struct AddressForm {
    address: Option<String>,
}

pub async fn info(State(data): State<Arc<AppData>>) -> Result<Html<String>, AppError> {
    render_chain(&data, None).await
}

pub async fn lookup(
    State(data): State<Arc<AppData>>,
    Form(form): Form<AddressForm>,
) -> Result<Html<String>, AppError> {
    let address = form.address
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty());

    render_chain(&data, address.as_deref()).await
}

async fn render_chain(data: &AppData, address: Option<&str>) -> Result<Html<String>, AppError> {
    let connected = data.chain.is_connected().await;
    let block_number = data.chain.block_number().await?;

    let mut context = Context::new();
    context.insert("connected", &connected);
    context.insert("block_number", &block_number);
    context.insert("address", &address);

    match address {
        Some(v) if !is_valid_address(v) => {
            context.insert("error_message", &format!("'{}' is not a valid wallet address.", v));
        }
        Some(v) => {
            let balance = wei_to_ether(data.chain.balance_wei(v).await?);

            get_logger().info("Looked up wallet balance.", meta! {
                "Address" => v,
                "Block" => block_number,
            });

            context.insert("balance", &balance);
        }
        None => {}
    }

    render(data, "polls/blockchain.html", &context)
}
