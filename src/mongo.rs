// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! MongoDB driver backend.
//!
//! Implements the [`driver`](crate::driver) traits with the `mongodb` crate.
//! The client does its own replica set discovery and connection pooling;
//! this module only maps requests onto client and find options.
//!
//! Every round trip is wrapped in `tokio::time::timeout(op_timeout)`. The
//! default bound is a day, so a quiet oplog never trips it.
//!
//! Cursors are driven through their `Stream` impl, which keeps issuing
//! getMores on a tailable cursor until a record arrives. `has_next` gives up
//! after an idle wait (the await-data window plus a margin, or a short poll
//! without await-data) and reports no data. The stream keeps an in-flight
//! getMore inside the cursor, so the next poll resumes it and no batch is
//! lost. `Cursor::advance` drops an in-flight getMore when cancelled, so it
//! is not used.
//!
//! Admin commands run with the client's selection criteria, so replica set
//! mode connects while only secondaries are up.

use crate::driver::{
    BoxFuture, CursorOptions, Namespace, OpenRequest, OpenTarget, OplogCursor, OplogDriver, ReadMode, Upstream,
};
use crate::error::{Result, TailerError};
use futures::StreamExt;
use mongodb::bson::Document;
use mongodb::options::{
    ClientOptions, CursorType, FindOneOptions, FindOptions, ReadPreference, ReadPreferenceOptions,
    SelectionCriteria, ServerAddress,
};
use mongodb::{Client, Cursor};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Server-side default maxAwaitTimeMS.
const SERVER_AWAIT_TIME: Duration = Duration::from_secs(1);

/// Extra idle wait past the await window so an empty batch has time to arrive.
const AWAIT_MARGIN: Duration = Duration::from_millis(250);

/// Idle wait for tailable cursors that don't await data.
const POLL_IDLE_WAIT: Duration = Duration::from_millis(100);

/// Run one driver round trip under the operation timeout.
async fn bounded<T, F>(op_timeout: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = mongodb::error::Result<T>>,
{
    match tokio::time::timeout(op_timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TailerError::driver(operation, e)),
        Err(_) => Err(TailerError::driver_msg(
            operation,
            format!("timed out after {}ms", op_timeout.as_millis()),
        )),
    }
}

/// Opens `mongodb` clients.
#[derive(Debug, Clone, Default)]
pub struct MongoDriver;

impl MongoDriver {
    pub fn new() -> Self {
        Self
    }

    fn client_options(request: &OpenRequest) -> Result<ClientOptions> {
        let seeds: Vec<String> = match &request.target {
            OpenTarget::ReplicaSet { seeds } => seeds.clone(),
            OpenTarget::Direct(host) => vec![host.to_string()],
        };

        let hosts = seeds
            .iter()
            .map(|seed| {
                ServerAddress::parse(seed)
                    .map_err(|e| TailerError::Config(format!("Invalid upstream address {:?}: {}", seed, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let read_preference = match request.read {
            ReadMode::SecondaryPreferred => ReadPreference::SecondaryPreferred {
                options: ReadPreferenceOptions::default(),
            },
            ReadMode::SecondaryOk => ReadPreference::PrimaryPreferred {
                options: ReadPreferenceOptions::default(),
            },
        };

        let mut options = ClientOptions::default();
        options.hosts = hosts;
        options.selection_criteria = Some(SelectionCriteria::ReadPreference(read_preference));
        options.app_name = request.app_name.clone();
        if matches!(request.target, OpenTarget::Direct(_)) {
            options.direct_connection = Some(true);
        }
        Ok(options)
    }
}

impl OplogDriver for MongoDriver {
    fn open(&self, request: OpenRequest) -> BoxFuture<'_, Arc<dyn Upstream>> {
        Box::pin(async move {
            let target = request.target.to_string();
            let options = Self::client_options(&request)?;
            let client = Client::with_options(options).map_err(|e| TailerError::connection(&target, e))?;

            debug!(target = %target, read = ?request.read, "Opened MongoDB client");
            Ok(Arc::new(MongoUpstream {
                client,
                address: target,
                op_timeout: request.op_timeout,
            }) as Arc<dyn Upstream>)
        })
    }
}

/// A `mongodb::Client` seen as an [`Upstream`].
#[derive(Debug, Clone)]
pub struct MongoUpstream {
    client: Client,
    address: String,
    op_timeout: Duration,
}

impl MongoUpstream {
    /// Wrap a client the caller already configured (for existing mode).
    pub fn from_client(client: Client, address: impl Into<String>, op_timeout: Duration) -> Self {
        Self {
            client,
            address: address.into(),
            op_timeout,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Server selection for admin commands: whatever the client was opened with.
    fn command_criteria(&self) -> Option<SelectionCriteria> {
        self.client.selection_criteria().cloned()
    }
}

impl Upstream for MongoUpstream {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn admin_command(&self, command: Document) -> BoxFuture<'_, Document> {
        Box::pin(async move {
            bounded(
                self.op_timeout,
                "admin command",
                self.client
                    .database("admin")
                    .run_command(command, self.command_criteria()),
            )
            .await
        })
    }

    fn find_one(&self, ns: Namespace, filter: Document, sort: Document) -> BoxFuture<'_, Option<Document>> {
        Box::pin(async move {
            let mut options = FindOneOptions::default();
            options.sort = Some(sort);

            let collection = self.client.database(&ns.db).collection::<Document>(&ns.collection);
            bounded(self.op_timeout, "findOne", collection.find_one(filter, options)).await
        })
    }

    fn find(&self, ns: Namespace, filter: Document, options: CursorOptions) -> BoxFuture<'_, Box<dyn OplogCursor>> {
        Box::pin(async move {
            let mut find_options = FindOptions::default();
            find_options.cursor_type = Some(match (options.tailable, options.await_data) {
                (true, true) => CursorType::TailableAwait,
                (true, false) => CursorType::Tailable,
                (false, _) => CursorType::NonTailable,
            });
            find_options.no_cursor_timeout = Some(options.no_cursor_timeout);
            if options.oplog_replay {
                find_options.oplog_replay = Some(true);
            }
            find_options.batch_size = options.batch_size;
            find_options.max_await_time = options.max_await_time;
            let idle_wait = idle_wait(&options);

            let collection = self.client.database(&ns.db).collection::<Document>(&ns.collection);
            let cursor = bounded(self.op_timeout, "find", collection.find(filter, find_options)).await?;

            Ok(Box::new(MongoCursor {
                cursor: Some(cursor),
                peeked: None,
                op_timeout: self.op_timeout,
                idle_wait,
            }) as Box<dyn OplogCursor>)
        })
    }
}

/// How long `has_next` waits on an empty tailable cursor before reporting no data.
fn idle_wait(options: &CursorOptions) -> Option<Duration> {
    match (options.tailable, options.await_data) {
        (false, _) => None,
        (true, true) => Some(options.max_await_time.unwrap_or(SERVER_AWAIT_TIME) + AWAIT_MARGIN),
        (true, false) => Some(POLL_IDLE_WAIT),
    }
}

/// Adapts the `mongodb::Cursor` stream to has_next/next by holding one
/// record of lookahead.
struct MongoCursor {
    cursor: Option<Cursor<Document>>,
    peeked: Option<Document>,
    op_timeout: Duration,
    idle_wait: Option<Duration>,
}

impl OplogCursor for MongoCursor {
    fn has_next(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if self.peeked.is_some() {
                return Ok(true);
            }
            let Some(cursor) = self.cursor.as_mut() else {
                return Ok(false);
            };

            // Dropping `Next` leaves any in-flight getMore parked in the cursor.
            let fetch = bounded(self.op_timeout, "getMore", async {
                StreamExt::next(cursor).await.transpose()
            });
            let fetched = match self.idle_wait {
                Some(wait) => match tokio::time::timeout(wait, fetch).await {
                    Ok(fetched) => fetched?,
                    Err(_) => return Ok(false),
                },
                None => fetch.await?,
            };

            match fetched {
                Some(record) => {
                    self.peeked = Some(record);
                    Ok(true)
                }
                None => {
                    // Exhausted or killed on the server; a dead cursor never yields again.
                    self.cursor = None;
                    Ok(false)
                }
            }
        })
    }

    fn next(&mut self) -> BoxFuture<'_, Document> {
        Box::pin(async move {
            if !self.has_next().await? {
                return Err(TailerError::driver_msg("next", "cursor exhausted"));
            }
            self.peeked
                .take()
                .ok_or_else(|| TailerError::driver_msg("next", "cursor exhausted"))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.peeked = None;
            // Dropping the driver cursor kills it on the server.
            drop(self.cursor.take());
            Ok(())
        })
    }
}
