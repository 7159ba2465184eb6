use anvil_reqwest::{ResponseHistoryExt, TokenRefreshAuthenticator};
use anvil_tokens::{sources, ExchangeEndpoint, IdentityHint};
use clap::Parser;
use reqwest_middleware::ClientBuilder;

#[derive(Debug, Parser)]
struct Opts {
    /// The Terra endpoint that exchanges a gcloud access token for a fence access token
    #[clap(
        short = 'e',
        long,
        env = "ANVIL_TOKEN_EXCHANGE_URL",
        default_value = "https://broad-bond-dev.appspot.com/api/link/v1/fence/accesstoken/"
    )]
    token_exchange_url: ExchangeEndpoint,

    /// The gcloud account registered with Terra, if not the active account
    #[clap(short = 'u', long, env = "ANVIL_IDENTITY_HINT")]
    identity_hint: Option<IdentityHint>,

    /// The URL to fetch with the exchanged token
    #[clap(
        short = 'd',
        long,
        env = "ANVIL_DOWNSTREAM_URL",
        default_value = "https://staging.theanvil.io/api/v0/submission/"
    )]
    downstream_url: reqwest::Url,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let mut token_source = sources::exchange::TokenExchangeSource::new(
        opts.token_exchange_url,
        sources::CommandTokenSource::gcloud(),
    )
    .with_client(reqwest::Client::builder().https_only(true).build()?);

    if let Some(identity_hint) = opts.identity_hint {
        token_source = token_source.with_identity_hint(identity_hint);
    }

    let client = ClientBuilder::new(reqwest::Client::new())
        .with(TokenRefreshAuthenticator::new(token_source))
        .build();

    let resp = client.get(opts.downstream_url).send().await?;

    tracing::info!(
        status = resp.status().as_u16(),
        retries = resp.retry_history().len(),
        "received response"
    );

    println!("{}", resp.text().await?);

    Ok(())
}
