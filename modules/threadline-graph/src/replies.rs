//! Read side of the reply graph.
//!
//! Component membership comes from a Graph Data Science projection of the
//! `REPLIES` relationship, oriented UNDIRECTED so weakly-connected components
//! match reply threads. Each caller names its own projection so that several
//! extractions can run against the same server at once.

use std::collections::{HashMap, HashSet};

use neo4rs::query;
use tracing::{debug, info};

use threadline_common::{ComponentId, PostId};

use crate::GraphClient;

pub struct ReplyGraphReader {
    client: GraphClient,
}

impl ReplyGraphReader {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Create the named in-memory projection of the reply graph.
    /// A projection with the same name left behind by a crashed run is dropped first.
    pub async fn project(&self, name: &str) -> Result<(), neo4rs::Error> {
        self.drop_projection(name).await?;

        let q = query(
            "CALL gds.graph.project(
                $name,
                'Tweet',
                {REPLIES: {type: 'REPLIES', orientation: 'UNDIRECTED'}}
             )
             YIELD nodeCount, relationshipCount
             RETURN nodeCount, relationshipCount",
        )
        .param("name", name);

        let mut stream = self.client.inner().execute(q).await?;
        if let Some(row) = stream.next().await? {
            let nodes: i64 = row.get("nodeCount").unwrap_or(0);
            let relationships: i64 = row.get("relationshipCount").unwrap_or(0);
            info!(projection = name, nodes, relationships, "Reply graph projected");
        }
        Ok(())
    }

    /// Drop the named projection. Succeeds when it does not exist.
    pub async fn drop_projection(&self, name: &str) -> Result<(), neo4rs::Error> {
        let q = query("CALL gds.graph.drop($name, false) YIELD graphName RETURN graphName")
            .param("name", name);

        let mut stream = self.client.inner().execute(q).await?;
        if stream.next().await?.is_some() {
            debug!(projection = name, "Dropped projection");
        }
        Ok(())
    }

    /// Weakly-connected component id for every tweet in the projection,
    /// in the order the server streams them.
    pub async fn components(&self, name: &str) -> Result<Vec<(PostId, ComponentId)>, neo4rs::Error> {
        let q = query(
            "CALL gds.wcc.stream($name)
             YIELD nodeId, componentId
             RETURN gds.util.asNode(nodeId).tweetId AS tweet_id, componentId AS component_id",
        )
        .param("name", name);

        let mut membership = Vec::new();
        let mut stream = self.client.inner().execute(q).await?;
        while let Some(row) = stream.next().await? {
            let tweet_id: String = row.get("tweet_id").unwrap_or_default();
            let component_id: i64 = row.get("component_id").unwrap_or(-1);
            if !tweet_id.is_empty() && component_id >= 0 {
                membership.push((tweet_id, component_id));
            }
        }

        Ok(membership)
    }

    /// Ids of every tweet the user posted.
    pub async fn subject_posts(&self, user_id: &str) -> Result<HashSet<PostId>, neo4rs::Error> {
        let q = query(
            "MATCH (u:User {userId: $user_id})-[:POSTED]->(t:Tweet)
             RETURN t.tweetId AS tweet_id",
        )
        .param("user_id", user_id);

        let mut posts = HashSet::new();
        let mut stream = self.client.inner().execute(q).await?;
        while let Some(row) = stream.next().await? {
            let tweet_id: String = row.get("tweet_id").unwrap_or_default();
            if !tweet_id.is_empty() {
                posts.insert(tweet_id);
            }
        }

        Ok(posts)
    }

    /// Direct repliers of each tweet, restricted to `post_ids`.
    /// Tweets without repliers map to an empty list.
    pub async fn children_of(
        &self,
        post_ids: &[PostId],
    ) -> Result<HashMap<PostId, Vec<PostId>>, neo4rs::Error> {
        let q = query(
            "UNWIND $ids AS tid
             MATCH (t:Tweet {tweetId: tid})
             OPTIONAL MATCH (t)<-[:REPLIES]-(child:Tweet)
             WHERE child.tweetId IN $ids
             RETURN t.tweetId AS parent, collect(DISTINCT child.tweetId) AS children",
        )
        .param("ids", post_ids.to_vec());

        let mut children = HashMap::new();
        let mut stream = self.client.inner().execute(q).await?;
        while let Some(row) = stream.next().await? {
            let parent: String = row.get("parent").unwrap_or_default();
            let replies: Vec<String> = row.get("children").unwrap_or_default();
            if !parent.is_empty() {
                children.insert(parent, replies);
            }
        }

        Ok(children)
    }

    /// Raw `created_at` values for the given tweets. Tweets without one are absent.
    pub async fn created_at(
        &self,
        post_ids: &[PostId],
    ) -> Result<HashMap<PostId, String>, neo4rs::Error> {
        let q = query(
            "MATCH (t:Tweet)
             WHERE t.tweetId IN $ids AND t.created_at IS NOT NULL
             RETURN t.tweetId AS tweet_id, toString(t.created_at) AS created_at",
        )
        .param("ids", post_ids.to_vec());

        let mut stamps = HashMap::new();
        let mut stream = self.client.inner().execute(q).await?;
        while let Some(row) = stream.next().await? {
            let tweet_id: String = row.get("tweet_id").unwrap_or_default();
            if let Ok(created_at) = row.get::<String>("created_at") {
                stamps.insert(tweet_id, created_at);
            }
        }

        Ok(stamps)
    }
}
