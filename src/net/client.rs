use parking_lot::Mutex;
use tokio::net::TcpStream;
use tracing::{debug, warn};
use crate::core::config::NetworkConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, Document};
use crate::net::auth::password_hash;
use crate::view::{QueryResult, ViewRow, ViewSchema};
use crate::wire::framing::FrameCodec;
use crate::wire::packet::{Command, Packet, Payload, ReturnPacket};

/// One framed connection to a server. Failures never escape: `send` returns
/// `None` and the reason is kept in [`last_error_message`](Self::last_error_message).
pub struct NetworkClient {
    addr: String,
    codec: FrameCodec,
    stream: tokio::sync::Mutex<Option<TcpStream>>,
    last_error: Mutex<String>,
}

impl NetworkClient {
    pub fn new(addr: impl Into<String>, config: &NetworkConfig) -> Self {
        NetworkClient {
            addr: addr.into(),
            codec: FrameCodec::new(config),
            stream: tokio::sync::Mutex::new(None),
            last_error: Mutex::new(String::new()),
        }
    }

    pub fn last_error_message(&self) -> String {
        self.last_error.lock().clone()
    }

    pub async fn send(&self, packet: &Packet) -> Option<ReturnPacket> {
        let mut stream = self.stream.lock().await;
        match self.exchange(&mut stream, packet).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!("Request '{}' to {} failed: {}", packet.command, self.addr, e);
                *self.last_error.lock() = e.to_string();
                *stream = None;
                None
            }
        }
    }

    pub async fn close(&self) {
        self.stream.lock().await.take();
    }

    async fn exchange(&self, slot: &mut Option<TcpStream>, packet: &Packet) -> Result<ReturnPacket> {
        if slot.is_none() {
            let stream = TcpStream::connect(&self.addr).await
                .map_err(|e| Error::new(ErrorKind::Connectivity, format!("{}: {}", self.addr, e)))?;
            stream.set_nodelay(true)?;
            debug!("Connected to {}", self.addr);
            *slot = Some(stream);
        }
        let stream = slot.as_mut()
            .ok_or_else(|| Error::new(ErrorKind::Connectivity, "Not connected".to_string()))?;

        self.codec.write_message(stream, packet).await?;
        self.codec.read_message(stream).await?
            .ok_or_else(|| Error::new(ErrorKind::Connectivity, "Server closed the connection".to_string()))
    }
}

/// Typed client for every server command.
pub struct DbClient {
    client: NetworkClient,
    username: String,
    password_hash: u32,
}

impl DbClient {
    /// Connect and authenticate.
    pub async fn connect(addr: &str, username: &str, password: &str, config: &NetworkConfig) -> Result<Self> {
        let client = DbClient {
            client: NetworkClient::new(addr, config),
            username: username.to_string(),
            password_hash: password_hash(username, password),
        };

        match client.call(Packet::new(Command::Authenticate)).await? {
            Payload::Flag(true) => Ok(client),
            _ => Err(Error::new(ErrorKind::Authentication, "Authentication failed".to_string())),
        }
    }

    pub fn last_error_message(&self) -> String {
        self.client.last_error_message()
    }

    pub async fn close(&self) {
        self.client.close().await;
    }

    pub async fn save(&self, docid: DocId, doc: Document) -> Result<bool> {
        let packet = Packet::new(Command::Save).with_docid(docid).with_data(Payload::Document(doc));
        flag(self.call(packet).await?)
    }

    pub async fn save_bytes(&self, docid: DocId, bytes: Vec<u8>) -> Result<bool> {
        let packet = Packet::new(Command::SaveBytes).with_docid(docid).with_data(Payload::Bytes(bytes));
        flag(self.call(packet).await?)
    }

    /// Query the primary view of a document type.
    pub async fn query_type(&self, doc_type: &str, filter: &str, start: i32, count: i32, order_by: &str) -> Result<QueryResult> {
        let packet = Packet::new(Command::QueryType)
            .with_view(doc_type)
            .with_data(Payload::Text(filter.to_string()))
            .with_paging(start, count, order_by);
        rows(self.call(packet).await?)
    }

    pub async fn query(&self, view: &str, filter: &str, start: i32, count: i32, order_by: &str) -> Result<QueryResult> {
        let packet = Packet::new(Command::QueryStr)
            .with_view(view)
            .with_data(Payload::Text(filter.to_string()))
            .with_paging(start, count, order_by);
        rows(self.call(packet).await?)
    }

    pub async fn fetch(&self, docid: DocId) -> Result<Option<Document>> {
        match self.call(Packet::new(Command::Fetch).with_docid(docid)).await? {
            Payload::Document(doc) => Ok(Some(doc)),
            Payload::None => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    pub async fn fetch_bytes(&self, docid: DocId) -> Result<Option<Vec<u8>>> {
        optional_bytes(self.call(Packet::new(Command::FetchBytes).with_docid(docid)).await?)
    }

    pub async fn backup(&self) -> Result<bool> {
        flag(self.call(Packet::new(Command::Backup)).await?)
    }

    pub async fn restore(&self) -> Result<u64> {
        count(self.call(Packet::new(Command::Restore)).await?)
    }

    pub async fn delete(&self, docid: DocId) -> Result<bool> {
        flag(self.call(Packet::new(Command::Delete).with_docid(docid)).await?)
    }

    pub async fn delete_bytes(&self, docid: DocId) -> Result<bool> {
        flag(self.call(Packet::new(Command::DeleteBytes).with_docid(docid)).await?)
    }

    pub async fn add_user(&self, username: &str, old_password: &str, new_password: &str) -> Result<bool> {
        let packet = Packet::new(Command::AddUser).with_data(Payload::Credentials {
            username: username.to_string(),
            old_password: old_password.to_string(),
            new_password: new_password.to_string(),
        });
        flag(self.call(packet).await?)
    }

    pub async fn users(&self) -> Result<Vec<String>> {
        names(self.call(Packet::new(Command::GetUsers)).await?)
    }

    pub async fn server_side(&self, function: &str, filter: &str) -> Result<Vec<ViewRow>> {
        let packet = Packet::new(Command::ServerSide)
            .with_view(function)
            .with_data(Payload::Text(filter.to_string()));
        match self.call(packet).await? {
            Payload::ServerRows(rows) => Ok(rows),
            other => Err(unexpected(other)),
        }
    }

    pub async fn full_text_search(&self, text: &str) -> Result<Vec<u32>> {
        let packet = Packet::new(Command::FullText).with_data(Payload::Text(text.to_string()));
        versions(self.call(packet).await?)
    }

    pub async fn count_type(&self, doc_type: &str, filter: &str) -> Result<u64> {
        let packet = Packet::new(Command::CountType)
            .with_view(doc_type)
            .with_data(Payload::Text(filter.to_string()));
        count(self.call(packet).await?)
    }

    pub async fn count(&self, view: &str, filter: &str) -> Result<u64> {
        let packet = Packet::new(Command::CountStr)
            .with_view(view)
            .with_data(Payload::Text(filter.to_string()));
        count(self.call(packet).await?)
    }

    pub async fn generic_count(&self, view: &str, filter: &str) -> Result<u64> {
        let packet = Packet::new(Command::GCount)
            .with_view(view)
            .with_data(Payload::Text(filter.to_string()));
        count(self.call(packet).await?)
    }

    pub async fn fetch_history(&self, docid: DocId) -> Result<Vec<u32>> {
        versions(self.call(Packet::new(Command::DocHistory).with_docid(docid)).await?)
    }

    pub async fn fetch_bytes_history(&self, docid: DocId) -> Result<Vec<u32>> {
        versions(self.call(Packet::new(Command::FileHistory).with_docid(docid)).await?)
    }

    pub async fn fetch_version(&self, version: u32) -> Result<Option<Document>> {
        let packet = Packet::new(Command::FetchVersion).with_data(Payload::Version(version));
        match self.call(packet).await? {
            Payload::Document(doc) => Ok(Some(doc)),
            Payload::None => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    pub async fn fetch_bytes_version(&self, version: u32) -> Result<Option<Vec<u8>>> {
        let packet = Packet::new(Command::FetchFileVersion).with_data(Payload::Version(version));
        optional_bytes(self.call(packet).await?)
    }

    /// Schema of a view as the server registered it.
    pub async fn view_schema(&self, view: &str) -> Result<ViewSchema> {
        match self.call(Packet::new(Command::CheckAssembly).with_view(view)).await? {
            Payload::Schema(schema) => Ok(schema),
            other => Err(unexpected(other)),
        }
    }

    pub async fn views(&self) -> Result<Vec<String>> {
        names(self.call(Packet::new(Command::GetViews)).await?)
    }

    async fn call(&self, mut packet: Packet) -> Result<Payload> {
        packet.username = self.username.clone();
        packet.password_hash = self.password_hash;

        let reply = self.client.send(&packet).await.ok_or_else(|| {
            Error::new(ErrorKind::Connectivity, self.client.last_error_message())
        })?;
        if reply.ok {
            Ok(reply.data)
        } else if reply.error == crate::net::server::AUTH_FAILED {
            Err(Error::new(ErrorKind::Authentication, reply.error))
        } else {
            Err(Error::new(ErrorKind::InvalidState, reply.error))
        }
    }
}

fn unexpected(payload: Payload) -> Error {
    Error::new(ErrorKind::Parse, format!("Unexpected {} reply", payload.kind()))
}

fn flag(payload: Payload) -> Result<bool> {
    match payload {
        Payload::Flag(b) => Ok(b),
        other => Err(unexpected(other)),
    }
}

fn count(payload: Payload) -> Result<u64> {
    match payload {
        Payload::Count(n) => Ok(n),
        other => Err(unexpected(other)),
    }
}

fn rows(payload: Payload) -> Result<QueryResult> {
    match payload {
        Payload::Rows(result) => Ok(result),
        other => Err(unexpected(other)),
    }
}

fn versions(payload: Payload) -> Result<Vec<u32>> {
    match payload {
        Payload::Versions(v) => Ok(v),
        other => Err(unexpected(other)),
    }
}

fn names(payload: Payload) -> Result<Vec<String>> {
    match payload {
        Payload::Names(n) => Ok(n),
        other => Err(unexpected(other)),
    }
}

fn optional_bytes(payload: Payload) -> Result<Option<Vec<u8>>> {
    match payload {
        Payload::Bytes(b) => Ok(Some(b)),
        Payload::None => Ok(None),
        other => Err(unexpected(other)),
    }
}
