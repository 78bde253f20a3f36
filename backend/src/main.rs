use backend::config::Config;
use backend::roster::Roster;
use backend::state::DrawStore;
use backend::{app, AppState};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = Config::from_env()?;
    let roster = Roster::load(&config.roster_path).await?;
    tracing::info!(
        path = %config.roster_path.display(),
        participants = roster.participants().len(),
        "roster loaded"
    );

    let mut rng = config
        .seed
        .map(ChaCha8Rng::seed_from_u64)
        .unwrap_or_else(ChaCha8Rng::from_entropy);
    let store = DrawStore::open(roster, config.draw, &config.persist_path, &mut rng).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app(AppState::new(store, config.admin_password))).await?;

    Ok(())
}
