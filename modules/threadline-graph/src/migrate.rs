use neo4rs::query;
use tracing::{info, warn};

use crate::GraphClient;

/// Run idempotent schema migrations: lookup indexes for tweets, users and
/// conversation runs,
/// uniqueness for conversation ids.
pub async fn migrate(client: &GraphClient) -> Result<(), neo4rs::Error> {
    let g = client.inner();

    info!("Running schema migrations...");

    let statements = [
        "CREATE INDEX tweet_id_index IF NOT EXISTS FOR (t:Tweet) ON (t.tweetId)",
        "CREATE INDEX user_id_index IF NOT EXISTS FOR (u:User) ON (u.userId)",
        "CREATE INDEX conversation_run_index IF NOT EXISTS FOR (c:Conversation) ON (c.runId)",
        "CREATE CONSTRAINT conversation_id_unique IF NOT EXISTS
         FOR (c:Conversation) REQUIRE c.conversationId IS UNIQUE",
    ];

    for s in &statements {
        run_ignoring_exists(g, s).await?;
    }

    info!("Schema migrations complete");
    Ok(())
}

/// Older servers reject `IF NOT EXISTS` on some forms and report an
/// equivalent schema object instead; treat that as success.
async fn run_ignoring_exists(g: &neo4rs::Graph, cypher: &str) -> Result<(), neo4rs::Error> {
    match g.run(query(cypher)).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let msg = e.to_string().to_lowercase();
            if msg.contains("already exists") || msg.contains("equivalent") {
                warn!("Already exists (skipped): {}", cypher.chars().take(80).collect::<String>());
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}
