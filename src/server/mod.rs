//! TCP Server for Schemagate
//!
//! A thin JSON-lines front end over the query driver. Each line a client
//! sends is one request object such as
//! `{"op": "get", "table": "orders", "key": "1"}`; each reply is one line
//! `{"status": 200, "data": ...}` or `{"status": 404, "error": "..."}`.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::catalog::{RelationalGraph, Table};
use crate::error::{Error, Result};
use crate::executor::options::{NEST, PAGE, PER_PAGE, SORT_BY};
use crate::executor::{Driver, OptionSet, PageConfig};
use crate::naming::Naming;
use crate::storage::Store;

/// Default server port
pub const DEFAULT_PORT: u16 = 7171;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Refuse insert, update and delete
    pub read_only: bool,
    /// Pagination settings handed to the driver
    pub page: PageConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_connections: 100,
            read_only: false,
            page: PageConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new server config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host address
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connection limit
    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    /// Enable or disable read-only mode
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the pagination settings
    pub fn page(mut self, page: PageConfig) -> Self {
        self.page = page;
        self
    }

    /// Get the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One client request
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    /// Every table name
    Tables,
    /// Columns, keys and relationships of one table
    Describe { table: String },
    /// One page of rows
    List {
        table: String,
        #[serde(default)]
        options: OptionSet,
    },
    /// One row, by `key` (comma-separated for composite keys) or by column
    /// options; `key` and `options` are mutually exclusive
    Get {
        table: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        options: OptionSet,
    },
    /// Rows of `related` that belong to the `table` row identified by `key`
    Related {
        table: String,
        key: String,
        related: String,
        #[serde(default)]
        options: OptionSet,
    },
    Insert {
        table: String,
        #[serde(default)]
        options: OptionSet,
    },
    Update {
        table: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        options: OptionSet,
    },
    Delete {
        table: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        options: OptionSet,
    },
}

impl Request {
    fn op(&self) -> &'static str {
        match self {
            Request::Tables => "tables",
            Request::Describe { .. } => "describe",
            Request::List { .. } => "list",
            Request::Get { .. } => "get",
            Request::Related { .. } => "related",
            Request::Insert { .. } => "insert",
            Request::Update { .. } => "update",
            Request::Delete { .. } => "delete",
        }
    }

    fn is_write(&self) -> bool {
        matches!(
            self,
            Request::Insert { .. } | Request::Update { .. } | Request::Delete { .. }
        )
    }
}

/// One reply line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: 200,
            data: Some(data),
            error: None,
        }
    }

    pub fn created(data: serde_json::Value) -> Self {
        Self {
            status: 201,
            ..Self::ok(data)
        }
    }

    pub fn failed(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn from_error(err: &Error) -> Self {
        Self::failed(err.status_code(), err.to_string())
    }

    /// Serialize as one line, newline included
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!("{{\"status\":500,\"error\":\"serialization error: {}\"}}", e)
        });
        line.push('\n');
        line
    }
}

/// Schemagate TCP Server
#[derive(Clone)]
pub struct Server {
    config: ServerConfig,
    driver: Driver,
    naming: Arc<Naming>,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Compose a server over an introspected graph and its store.
    ///
    /// Fails with `Error::Config` when the graph has no tables or the page
    /// settings are invalid.
    pub fn new(
        config: ServerConfig,
        graph: Arc<RelationalGraph>,
        store: Arc<dyn Store>,
        naming: Naming,
    ) -> Result<Self> {
        if graph.is_empty() {
            return Err(Error::Config("database has no tables to serve".to_string()));
        }
        let driver = Driver::new(graph, store, config.page)?;
        Ok(Self {
            config,
            driver,
            naming: Arc::new(naming),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address
    pub fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(self.config.bind_address())?)
    }

    /// Start the server and listen for connections
    pub fn start(&self) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener)
    }

    /// Accept connections on an already bound listener
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(
            addr = %listener.local_addr()?,
            tables = self.driver.graph().len(),
            read_only = self.config.read_only,
            "server.listening"
        );

        for stream in listener.incoming() {
            match stream {
                Ok(mut stream) => {
                    if self.active.fetch_add(1, Ordering::SeqCst) >= self.config.max_connections {
                        self.active.fetch_sub(1, Ordering::SeqCst);
                        warn!(max = self.config.max_connections, "server.connection_refused");
                        let reply = Response::failed(503, "too many connections");
                        let _ = stream.write_all(reply.to_line().as_bytes());
                        continue;
                    }
                    let server = self.clone();
                    thread::spawn(move || {
                        if let Err(e) = server.handle_connection(stream) {
                            warn!(error = %e, "server.connection_error");
                        }
                        server.active.fetch_sub(1, Ordering::SeqCst);
                    });
                }
                Err(e) => {
                    warn!(error = %e, "server.accept_failed");
                }
            }
        }

        Ok(())
    }

    /// Handle a client connection
    fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        debug!(peer = %peer_addr, "server.connected");

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    debug!(peer = %peer_addr, "server.disconnected");
                    break;
                }
                Ok(_) => {
                    let request = line.trim();
                    if request.is_empty() {
                        continue;
                    }
                    let response = self.handle_line(request);
                    send_response(&mut writer, &response)?;
                }
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "server.read_failed");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Parse and answer one request line
    pub fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle_request(&request),
            Err(e) => {
                let err = Error::from(e);
                debug!(error = %err, "server.bad_request");
                Response::from_error(&err)
            }
        }
    }

    /// Answer one parsed request
    pub fn handle_request(&self, request: &Request) -> Response {
        debug!(op = request.op(), "server.request");
        let result = if request.is_write() && self.config.read_only {
            Err(Error::ReadOnly)
        } else {
            self.dispatch(request)
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                if e.status_code() >= 500 {
                    warn!(op = request.op(), error = %e, "server.request_failed");
                } else {
                    debug!(op = request.op(), error = %e, "server.request_rejected");
                }
                Response::from_error(&e)
            }
        }
    }

    fn dispatch(&self, request: &Request) -> Result<Response> {
        let graph = self.driver.graph();
        match request {
            Request::Tables => Ok(Response::ok(json!(graph.list_table_names()))),
            Request::Describe { table } => {
                let table = graph.get_table(table)?;
                Ok(Response::ok(self.describe(table)))
            }
            Request::List { table, options } => {
                let table = graph.get_table(table)?;
                let rows = self.driver.listing(table, &listing_options(table, options)?)?;
                Ok(Response::ok(serde_json::to_value(rows)?))
            }
            Request::Get {
                table,
                key,
                include,
                options,
            } => {
                let table = graph.get_table(table)?;
                if key.is_some() && !options.is_empty() {
                    return Err(Error::InvalidFilter(
                        "'key' and 'options' cannot be combined".to_string(),
                    ));
                }
                let row = match key {
                    Some(key) if table.key.len() == 1 => {
                        self.driver.get_by_identity(table, key, include)?
                    }
                    _ => {
                        let mut opts = keyed(table, key.as_deref(), &column_options(options)?)?;
                        for name in include {
                            opts.push(NEST, name.as_str());
                        }
                        self.driver.get(table, &opts)?
                    }
                };
                Ok(Response::ok(serde_json::to_value(row)?))
            }
            Request::Related {
                table,
                key,
                related,
                options,
            } => {
                let parent = graph.get_table(table)?;
                let child = graph.get_table(related)?;
                let opts = listing_options(child, options)?;
                let rows = self.driver.listing_related(parent, child, key, &opts)?;
                Ok(Response::ok(serde_json::to_value(rows)?))
            }
            Request::Insert { table, options } => {
                let table = graph.get_table(table)?;
                let row = self.driver.insert(table, &column_options(options)?)?;
                Ok(Response::created(serde_json::to_value(row)?))
            }
            Request::Update {
                table,
                key,
                options,
            } => {
                let table = graph.get_table(table)?;
                let opts = keyed(table, key.as_deref(), &column_options(options)?)?;
                let row = self.driver.update(table, &opts)?;
                Ok(Response::ok(serde_json::to_value(row)?))
            }
            Request::Delete {
                table,
                key,
                options,
            } => {
                let table = graph.get_table(table)?;
                let opts = keyed(table, key.as_deref(), &column_options(options)?)?;
                self.driver.delete(table, &opts)?;
                Ok(Response::ok(serde_json::Value::Null))
            }
        }
    }

    fn describe(&self, table: &Table) -> serde_json::Value {
        let graph = self.driver.graph();
        json!({
            "name": table.name,
            "title": self.naming.plural(&table.name, true),
            "singular": self.naming.singular(&table.name, true),
            "key": table.key,
            "columns": table.columns,
            "unique_columns": table.unique_columns,
            "relationships": graph.relationships(&table.name),
            "includes": graph.includable_tables(&table.name),
            "listings": graph.to_many_tables(&table.name),
        })
    }
}

/// Listing options accepted from clients: page, per-page, sort-by and
/// column values, each column value becoming an equality filter. Raw
/// predicates and every other reserved name are refused.
fn listing_options(table: &Table, options: &OptionSet) -> Result<OptionSet> {
    let mut opts = OptionSet::new();
    for (name, values) in options.iter() {
        if OptionSet::is_reserved(name) {
            if ![PAGE, PER_PAGE, SORT_BY].contains(&name) {
                return Err(refused(name));
            }
            opts.set(name, values.to_vec());
            continue;
        }
        if !table.has_column(name) {
            return Err(Error::InvalidFilter(format!(
                "unknown column '{}' on table '{}'",
                name, table.name
            )));
        }
        let value = values
            .first()
            .ok_or_else(|| Error::InvalidFilter(format!("no value for column '{}'", name)))?;
        opts.filter(name, value.as_str());
    }
    Ok(opts)
}

/// Column values only; reserved names are refused
fn column_options(options: &OptionSet) -> Result<OptionSet> {
    match options.iter().find(|(name, _)| OptionSet::is_reserved(name)) {
        Some((name, _)) => Err(refused(name)),
        None => Ok(options.clone()),
    }
}

fn refused(name: &str) -> Error {
    Error::InvalidFilter(format!("option '{}' is not accepted from clients", name))
}

/// Layer a path-style key over the request options.
///
/// Composite keys are given comma-separated in key column order.
fn keyed(table: &Table, key: Option<&str>, options: &OptionSet) -> Result<OptionSet> {
    let mut opts = options.clone();
    let key = match key {
        Some(key) => key,
        None => return Ok(opts),
    };
    let values: Vec<&str> = key.split(',').collect();
    if table.key.is_empty() || values.len() != table.key.len() {
        return Err(Error::InvalidFilter(format!(
            "key '{}' does not match the key of table '{}'",
            key, table.name
        )));
    }
    for (column, value) in table.key.iter().zip(values) {
        opts.set(column, vec![value.to_string()]);
    }
    Ok(opts)
}

/// Send a response to the client
fn send_response(writer: &mut TcpStream, response: &Response) -> Result<()> {
    writer.write_all(response.to_line().as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Simple client for testing
pub fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let addr = format!("{}:{}", host, port);
    TcpStream::connect(&addr).map_err(Error::from)
}
