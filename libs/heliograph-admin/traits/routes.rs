//! Route descriptors for the read and write sides of a Heliograph app
//!
//! A route pairs a declarative descriptor (sent to the service as part of
//! the activation payload) with a local handler invoked whenever the service
//! forwards a matching inbound request. Handlers are configuration values,
//! so they are stored as shared closures rather than trait objects.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Error type produced by user-supplied route handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Synchronous handler backing a read route
pub type ReadQueryFn =
    Arc<dyn Fn(Value) -> std::result::Result<Value, HandlerError> + Send + Sync>;

/// Asynchronous handler backing a write route
///
/// When invoked by a trigger chain, the second argument carries the result
/// of the route that triggered it.
pub type WriteDocFn = Arc<
    dyn Fn(Value, Option<WriteDoc>) -> BoxFuture<'static, std::result::Result<WriteDoc, HandlerError>>
        + Send
        + Sync,
>;

/// Database write operation kinds, numeric on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DbWriteType {
    CreateDocument = 1,
    CreateDocuments = 2,
    UpdateDocument = 3,
    UpdateDocuments = 4,
    DeleteDocument = 5,
    DeleteDocuments = 6,
}

impl Serialize for DbWriteType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Outcome of a write-route handler
///
/// `result` is returned to the requesting client when execution completes;
/// `custom_data` travels from one route to the next along a trigger chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upsert: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// Configuration of a single read route
#[derive(Clone)]
pub struct ReadRoute {
    pub route_id: String,
    pub collection: String,
    pub query_fn: ReadQueryFn,
    pub limit: Option<u64>,
    pub sort: Option<Value>,
    pub skip: Option<u64>,
    pub projection: Option<Value>,
    pub is_single_document: bool,
}

impl ReadRoute {
    /// Create a read route with the default empty query
    pub fn new(route_id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            collection: collection.into(),
            query_fn: Arc::new(|_| Ok(json!({}))),
            limit: None,
            sort: None,
            skip: None,
            projection: None,
            is_single_document: false,
        }
    }

    pub fn query<F>(mut self, query_fn: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.query_fn = Arc::new(query_fn);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn projection(mut self, projection: Value) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn single_document(mut self) -> Self {
        self.is_single_document = true;
        self
    }

    /// Declarative form sent to the service in the activation payload
    ///
    /// The handler is local-only and never serialized.
    pub fn wire_descriptor(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("routeId".into(), json!(self.route_id));
        map.insert("collection".into(), json!(self.collection));
        if let Some(limit) = self.limit {
            map.insert("limit".into(), json!(limit));
        }
        if let Some(sort) = &self.sort {
            map.insert("sort".into(), sort.clone());
        }
        if let Some(skip) = self.skip {
            map.insert("skip".into(), json!(skip));
        }
        if let Some(projection) = &self.projection {
            map.insert("projection".into(), projection.clone());
        }
        map.insert("isSingleDocument".into(), json!(self.is_single_document));
        Value::Object(map)
    }
}

impl fmt::Debug for ReadRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadRoute")
            .field("route_id", &self.route_id)
            .field("collection", &self.collection)
            .field("limit", &self.limit)
            .field("sort", &self.sort)
            .field("skip", &self.skip)
            .field("projection", &self.projection)
            .field("is_single_document", &self.is_single_document)
            .finish_non_exhaustive()
    }
}

/// Configuration of a single write route
#[derive(Clone)]
pub struct WriteRoute {
    pub route_id: String,
    pub collection: Option<String>,
    pub write_type: Option<DbWriteType>,
    pub doc_fn: WriteDocFn,
    /// Route ids triggered by this route, executed in the given order
    pub triggers: Vec<String>,
}

impl WriteRoute {
    /// Create a write route with the default passthrough document handler
    pub fn new(route_id: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            collection: None,
            write_type: None,
            doc_fn: Arc::new(|client_data, parent| {
                Box::pin(async move {
                    Ok(WriteDoc {
                        query: Some(client_data),
                        payload: parent.and_then(|p| serde_json::to_value(p).ok()),
                        ..WriteDoc::default()
                    })
                })
            }),
            triggers: Vec::new(),
        }
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn write_type(mut self, write_type: DbWriteType) -> Self {
        self.write_type = Some(write_type);
        self
    }

    pub fn doc<F>(mut self, doc_fn: F) -> Self
    where
        F: Fn(Value, Option<WriteDoc>) -> BoxFuture<'static, std::result::Result<WriteDoc, HandlerError>>
            + Send
            + Sync
            + 'static,
    {
        self.doc_fn = Arc::new(doc_fn);
        self
    }

    pub fn triggers(mut self, triggers: Vec<String>) -> Self {
        self.triggers = triggers;
        self
    }

    /// Declarative form sent to the service in the activation payload
    pub fn wire_descriptor(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("routeId".into(), json!(self.route_id));
        if let Some(collection) = &self.collection {
            map.insert("collection".into(), json!(collection));
        }
        if let Some(write_type) = self.write_type {
            map.insert("writeType".into(), json!(write_type as u8));
        }
        map.insert("triggers".into(), json!(self.triggers));
        Value::Object(map)
    }
}

impl fmt::Debug for WriteRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteRoute")
            .field("route_id", &self.route_id)
            .field("collection", &self.collection)
            .field("write_type", &self.write_type)
            .field("triggers", &self.triggers)
            .finish_non_exhaustive()
    }
}
