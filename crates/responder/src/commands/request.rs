//! Raw API requests - get, post, put, delete.

use anyhow::{Context as _, Result, bail};
use clap::Args;
use console::Style;
use responder_client::{ApiResponse, Endpoint};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::Context;

/// Arguments for requests without a body.
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Path below the API root, e.g. Calls/GetActiveCalls
    pub path: String,

    /// Query parameter as key=value (repeatable)
    #[arg(short, long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,
}

/// Arguments for requests with a JSON body.
#[derive(Args, Debug)]
pub struct BodyArgs {
    /// Path below the API root, e.g. Messages/SendMessage
    pub path: String,

    /// JSON request body
    #[arg(short, long)]
    pub data: String,
}

pub async fn get(args: QueryArgs, ctx: &Context) -> Result<()> {
    let query = parse_query(&args.query)?;
    let endpoint = endpoint(ctx, &args.path).await?;
    print_response(endpoint.get_with_query::<Value, _>(&query).await?, ctx)
}

pub async fn delete(args: QueryArgs, ctx: &Context) -> Result<()> {
    let query = parse_query(&args.query)?;
    let endpoint = endpoint(ctx, &args.path).await?;
    print_response(endpoint.delete_with_query::<Value, _>(&query).await?, ctx)
}

pub async fn post(args: BodyArgs, ctx: &Context) -> Result<()> {
    let body = parse_body(&args.data)?;
    let endpoint = endpoint(ctx, &args.path).await?;
    print_response(endpoint.post::<Value, _>(&body).await?, ctx)
}

pub async fn put(args: BodyArgs, ctx: &Context) -> Result<()> {
    let body = parse_body(&args.data)?;
    let endpoint = endpoint(ctx, &args.path).await?;
    print_response(endpoint.put::<Value, _>(&body).await?, ctx)
}

/// Endpoint for `path` on a hydrated session, cancelled by Ctrl-C.
async fn endpoint(ctx: &Context, path: &str) -> Result<Endpoint> {
    let session = ctx.session().await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    Ok(session.client.endpoint(path).with_cancel(cancel))
}

fn parse_query(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut query = Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid query parameter '{}', expected KEY=VALUE", pair);
        };
        if key.is_empty() {
            bail!("Invalid query parameter '{}', key is empty", pair);
        }
        query.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(query)
}

fn parse_body(data: &str) -> Result<Value> {
    serde_json::from_str(data).context("Request body is not valid JSON")
}

fn print_response(response: ApiResponse<Value>, ctx: &Context) -> Result<()> {
    if !ctx.json_output {
        let green = Style::new().green();
        eprintln!("{}", green.apply_to(format!("HTTP {}", response.status)));
    }
    if !response.data.is_null() {
        println!("{}", serde_json::to_string_pretty(&response.data)?);
    }
    Ok(())
}
