// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for MongoDB.
//!
//! Provides helpers to spin up standalone and single-node replica set
//! MongoDB containers for integration tests.

#![allow(dead_code)] // Only the integration tests use these

use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;
use std::time::Duration;
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage, RunnableImage};

const MONGO_PORT: u16 = 27017;

fn mongo_image() -> GenericImage {
    GenericImage::new("mongo", "7")
        .with_exposed_port(MONGO_PORT)
        .with_wait_for(WaitFor::message_on_stdout("Waiting for connections"))
}

/// Create a standalone MongoDB container (no replica set, no oplog).
pub fn mongo_standalone(docker: &Cli) -> Container<'_, GenericImage> {
    docker.run(mongo_image())
}

/// Create a MongoDB container started with `--replSet rs0`.
///
/// Call [`MongoNode::initiate`] before tailing; until then the node has no oplog.
pub fn mongo_replica_set(docker: &Cli) -> Container<'_, GenericImage> {
    let args = vec!["--replSet".to_string(), "rs0".to_string()];
    docker.run(RunnableImage::from((mongo_image(), args)))
}

/// Get the `host:port` address for a container.
pub fn mongo_address(container: &Container<'_, GenericImage>) -> String {
    format!("127.0.0.1:{}", container.get_host_port_ipv4(MONGO_PORT))
}

/// Helper struct for a MongoDB node with a direct client.
pub struct MongoNode<'a> {
    #[allow(dead_code)] // Kept alive for container lifetime
    container: Container<'a, GenericImage>,
    pub address: String,
    pub client: Client,
}

impl<'a> MongoNode<'a> {
    pub async fn standalone(docker: &'a Cli) -> Self {
        Self::wrap(mongo_standalone(docker)).await
    }

    /// Start a replica set member and make it a single-node primary.
    pub async fn primary(docker: &'a Cli) -> Self {
        let node = Self::wrap(mongo_replica_set(docker)).await;
        node.initiate().await;
        node
    }

    async fn wrap(container: Container<'a, GenericImage>) -> Self {
        let address = mongo_address(&container);
        let mut options = ClientOptions::parse(format!("mongodb://{}/?directConnection=true", address))
            .await
            .expect("Failed to parse client options");
        options.server_selection_timeout = Some(Duration::from_secs(10));
        let client = Client::with_options(options).expect("Failed to build client");
        Self {
            container,
            address,
            client,
        }
    }

    /// Initiate the set and wait until the node reports itself primary.
    pub async fn initiate(&self) {
        let admin = self.client.database("admin");
        admin
            .run_command(
                doc! {
                    "replSetInitiate": {
                        "_id": "rs0",
                        "members": [{ "_id": 0, "host": format!("127.0.0.1:{}", MONGO_PORT) }],
                    }
                },
                None,
            )
            .await
            .expect("replSetInitiate failed");

        for _ in 0..60 {
            let reply = admin.run_command(doc! { "isMaster": 1 }, None).await;
            if matches!(reply, Ok(ref r) if r.get_bool("ismaster").unwrap_or(false)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        panic!("Node never became primary");
    }

    /// Insert documents into `db.collection`, producing oplog entries.
    pub async fn insert(&self, db: &str, collection: &str, docs: Vec<Document>) {
        self.client
            .database(db)
            .collection::<Document>(collection)
            .insert_many(docs, None)
            .await
            .expect("insert_many failed");
    }
}
