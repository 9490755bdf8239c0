use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::types::{DocId, Document};
use crate::view::{QueryResult, ViewRow, ViewSchema};

/// Every request the server understands, with its name on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Authenticate,
    Save,
    SaveBytes,
    QueryType,
    QueryStr,
    Fetch,
    FetchBytes,
    Backup,
    Delete,
    DeleteBytes,
    Restore,
    AddUser,
    GetUsers,
    ServerSide,
    FullText,
    CountType,
    CountStr,
    GCount,
    DocHistory,
    FileHistory,
    FetchVersion,
    FetchFileVersion,
    CheckAssembly,
    GetViews,
}

impl Command {
    pub const ALL: [Command; 24] = [
        Command::Authenticate,
        Command::Save,
        Command::SaveBytes,
        Command::QueryType,
        Command::QueryStr,
        Command::Fetch,
        Command::FetchBytes,
        Command::Backup,
        Command::Delete,
        Command::DeleteBytes,
        Command::Restore,
        Command::AddUser,
        Command::GetUsers,
        Command::ServerSide,
        Command::FullText,
        Command::CountType,
        Command::CountStr,
        Command::GCount,
        Command::DocHistory,
        Command::FileHistory,
        Command::FetchVersion,
        Command::FetchFileVersion,
        Command::CheckAssembly,
        Command::GetViews,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Authenticate => "authenticate",
            Command::Save => "save",
            Command::SaveBytes => "savebytes",
            Command::QueryType => "querytype",
            Command::QueryStr => "querystr",
            Command::Fetch => "fetch",
            Command::FetchBytes => "fetchbytes",
            Command::Backup => "backup",
            Command::Delete => "delete",
            Command::DeleteBytes => "deletebytes",
            Command::Restore => "restore",
            Command::AddUser => "adduser",
            Command::GetUsers => "getusers",
            Command::ServerSide => "serverside",
            Command::FullText => "fulltext",
            Command::CountType => "counttype",
            Command::CountStr => "countstr",
            Command::GCount => "gcount",
            Command::DocHistory => "dochistory",
            Command::FileHistory => "filehistory",
            Command::FetchVersion => "fetchversion",
            Command::FetchFileVersion => "fetchfileversion",
            Command::CheckAssembly => "checkassembly",
            Command::GetViews => "getviews",
        }
    }

    /// Case-insensitive lookup of a wire name.
    pub fn parse(name: &str) -> Option<Command> {
        Command::ALL.iter().copied().find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a request or response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    None,
    Text(String),
    Document(Document),
    Bytes(Vec<u8>),
    Version(u32),
    Credentials {
        username: String,
        old_password: String,
        new_password: String,
    },
    Flag(bool),
    Count(u64),
    Rows(QueryResult),
    ServerRows(Vec<ViewRow>),
    Versions(Vec<u32>),
    Names(Vec<String>),
    Schema(ViewSchema),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::None => "none",
            Payload::Text(_) => "text",
            Payload::Document(_) => "document",
            Payload::Bytes(_) => "bytes",
            Payload::Version(_) => "version",
            Payload::Credentials { .. } => "credentials",
            Payload::Flag(_) => "flag",
            Payload::Count(_) => "count",
            Payload::Rows(_) => "rows",
            Payload::ServerRows(_) => "server rows",
            Payload::Versions(_) => "versions",
            Payload::Names(_) => "names",
            Payload::Schema(_) => "schema",
        }
    }

    pub fn as_text(&self) -> &str {
        match self {
            Payload::Text(s) => s,
            _ => "",
        }
    }
}

/// One client request. Credentials travel with every packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub command: String,
    pub docid: Option<DocId>,
    pub username: String,
    pub password_hash: u32,
    pub viewname: String,
    pub data: Payload,
    pub start: i32,
    pub count: i32,
    pub order_by: String,
}

impl Packet {
    pub fn new(command: Command) -> Self {
        Packet {
            command: command.as_str().to_string(),
            docid: None,
            username: String::new(),
            password_hash: 0,
            viewname: String::new(),
            data: Payload::None,
            start: 0,
            count: -1,
            order_by: String::new(),
        }
    }

    pub fn with_docid(mut self, docid: DocId) -> Self {
        self.docid = Some(docid);
        self
    }

    pub fn with_view(mut self, viewname: &str) -> Self {
        self.viewname = viewname.to_string();
        self
    }

    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }

    pub fn with_paging(mut self, start: i32, count: i32, order_by: &str) -> Self {
        self.start = start;
        self.count = count;
        self.order_by = order_by.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnPacket {
    pub ok: bool,
    pub error: String,
    pub data: Payload,
}

impl ReturnPacket {
    pub fn success(data: Payload) -> Self {
        ReturnPacket { ok: true, error: String::new(), data }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ReturnPacket { ok: false, error: error.into(), data: Payload::None }
    }
}
