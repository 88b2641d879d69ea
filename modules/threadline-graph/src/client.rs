use neo4rs::{ConfigBuilder, Graph};

use threadline_common::Neo4jConfig;

/// Thin wrapper around neo4rs::Graph providing connection setup.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given credentials, using the server's default database.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, neo4rs::Error> {
        Self::connect_to(uri, user, password, None).await
    }

    /// Connect to a specific database on the server.
    pub async fn connect_to(
        uri: &str,
        user: &str,
        password: &str,
        database: Option<&str>,
    ) -> Result<Self, neo4rs::Error> {
        let mut builder = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(500)
            .max_connections(16);
        if let Some(db) = database {
            builder = builder.db(db);
        }
        let graph = Graph::connect(builder.build()?).await?;
        Ok(Self { graph })
    }

    pub async fn from_config(config: &Neo4jConfig) -> Result<Self, neo4rs::Error> {
        Self::connect_to(
            &config.uri,
            &config.user,
            &config.password,
            config.database.as_deref(),
        )
        .await
    }

    /// Get a reference to the underlying neo4rs Graph.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}
