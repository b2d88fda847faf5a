use achievements_shared::config::{Backend, Config};
use achievements_shared::password::Argon2Digest;
use achievements_shared::store::dynamo::DynamoAchievementStore;
use achievements_shared::store::memory::{MemoryAchievementStore, MemoryRelationalStore};
use achievements_shared::store::postgres::PgStore;
use achievements_shared::AppState;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{run, service_fn, tracing, Error, Request};
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env()?;
    tracing::info!("Starting achievements API with {:?} backend", config.backend);

    let state = match config.backend {
        Backend::Aws => {
            // Initialize AWS clients once at startup
            let aws = aws_config::load_from_env().await;
            let records = DynamoAchievementStore::new(
                DynamoClient::new(&aws),
                &config.table_name,
                &config.owner_index,
            );
            let relational = Arc::new(PgStore::connect(&config).await?);
            AppState::new(
                config,
                Arc::new(records),
                relational.clone(),
                relational,
                Arc::new(Argon2Digest),
            )
        }
        Backend::Memory => {
            let relational = Arc::new(MemoryRelationalStore::new());
            for (name, description) in [("Admin", "Administrator"), ("Mahasiswa", "Student")] {
                let role = relational.add_role(name, description);
                tracing::info!("Seeded role {} ({})", role.name, role.id);
            }
            AppState::new(
                config,
                Arc::new(MemoryAchievementStore::new()),
                relational.clone(),
                relational,
                Arc::new(Argon2Digest),
            )
        }
    };

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
