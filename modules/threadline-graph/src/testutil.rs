//! Test utilities for spinning up a real Neo4j instance via testcontainers.

use neo4rs::query;
use testcontainers::{
    core::{ContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

use crate::GraphClient;

/// Spin up a Neo4j container with the Graph Data Science plugin and return
/// the container handle + connected GraphClient.
///
/// The container is dropped (and stopped) when `ContainerAsync` goes out of scope,
/// so callers must hold it alive for the duration of the test.
pub async fn neo4j_container() -> (ContainerAsync<GenericImage>, GraphClient) {
    let image = GenericImage::new("neo4j", "5.25.1-enterprise")
        .with_exposed_port(ContainerPort::Tcp(7687))
        .with_wait_for(WaitFor::message_on_stdout("Started."))
        .with_env_var("NEO4J_AUTH", "neo4j/testpassword")
        .with_env_var("NEO4J_ACCEPT_LICENSE_AGREEMENT", "yes")
        .with_env_var("NEO4J_PLUGINS", "[\"graph-data-science\"]")
        .with_env_var("NEO4J_dbms_security_procedures_unrestricted", "gds.*");

    let container: ContainerAsync<GenericImage> = image
        .start()
        .await
        .expect("Failed to start Neo4j container");

    let host_port = container
        .get_host_port_ipv4(7687)
        .await
        .expect("Failed to get Neo4j host port");

    let uri = format!("bolt://127.0.0.1:{host_port}");
    let client = GraphClient::connect(&uri, "neo4j", "testpassword")
        .await
        .expect("Failed to connect to Neo4j");

    (container, client)
}

/// Seed one tweet, its author, and (optionally) the tweet it replies to.
/// Parents must be seeded before their replies.
pub async fn seed_tweet(
    client: &GraphClient,
    tweet_id: &str,
    author_id: &str,
    parent: Option<&str>,
    created_at: &str,
) {
    let q = query(
        "MERGE (u:User {userId: $author})
         CREATE (t:Tweet {tweetId: $id, created_at: $created_at})
         CREATE (u)-[:POSTED]->(t)",
    )
    .param("author", author_id)
    .param("id", tweet_id)
    .param("created_at", created_at);
    client.inner().run(q).await.expect("seed tweet failed");

    if let Some(parent_id) = parent {
        let q = query(
            "MATCH (child:Tweet {tweetId: $child}), (parent:Tweet {tweetId: $parent})
             CREATE (child)-[:REPLIES]->(parent)",
        )
        .param("child", tweet_id)
        .param("parent", parent_id);
        client.inner().run(q).await.expect("seed reply failed");
    }
}
