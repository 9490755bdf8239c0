use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use crate::core::config::NetworkConfig;
use crate::core::database::Database;
use crate::core::error::{Error, Result};
use crate::core::types::DocId;
use crate::net::auth::UserStore;
use crate::wire::framing::FrameCodec;
use crate::wire::packet::{Command, Packet, Payload, ReturnPacket};

pub const AUTH_FAILED: &str = "Authentication failed";

/// Serves a [`Database`] over framed TCP, one task per connection.
pub struct DbServer {
    db: Arc<Database>,
    users: Arc<UserStore>,
    config: NetworkConfig,
    codec: FrameCodec,
    connects: AtomicUsize,
}

impl DbServer {
    pub fn new(db: Arc<Database>, users: Arc<UserStore>, config: NetworkConfig) -> Self {
        DbServer {
            codec: FrameCodec::new(&config),
            db,
            users,
            config,
            connects: AtomicUsize::new(0),
        }
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        info!("Listening on port {}", self.config.port);
        Ok(listener)
    }

    /// Accept connections until `shutdown` resolves, then save the user
    /// store. Open connections are left to finish on their own.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let stats = tokio::spawn(log_connects(self.clone()));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.connects.fetch_add(1, Ordering::Relaxed);
                        let server = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, peer).await {
                                warn!("Connection {} closed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => error!("Accept failed: {}", e),
                },
                _ = &mut shutdown => break,
            }
        }

        stats.abort();
        info!("Server stopped accepting connections");
        self.users.save()
    }

    async fn handle_connection(self: Arc<Self>, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        stream.set_nodelay(true)?;
        let idle = self.config.idle_timeout();

        loop {
            let request = match tokio::time::timeout(idle, self.codec.read_message::<_, Packet>(&mut stream)).await {
                Ok(Ok(Some(packet))) => packet,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    // An unreadable packet still gets an answer.
                    let reply = ReturnPacket::failure(e.to_string());
                    self.codec.write_message(&mut stream, &reply).await?;
                    return Err(e);
                }
                Err(_) => {
                    debug!("Closing idle connection {}", peer);
                    break;
                }
            };

            let server = self.clone();
            let reply = match tokio::task::spawn_blocking(move || server.process(request)).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!("Request task failed: {}", e);
                    ReturnPacket::failure("Internal server error")
                }
            };
            self.codec.write_message(&mut stream, &reply).await?;
        }
        Ok(())
    }

    /// Authenticate and run one request. Never fails: errors become an
    /// `ok = false` reply.
    pub fn process(&self, packet: Packet) -> ReturnPacket {
        let command = match Command::parse(&packet.command) {
            Some(command) => command,
            None => return ReturnPacket::failure(format!("Unknown command '{}'", packet.command)),
        };

        if !self.users.authenticate(&packet.username, packet.password_hash) {
            warn!("{} for user '{}' ({})", AUTH_FAILED, packet.username, command);
            return match command {
                Command::Authenticate => ReturnPacket {
                    ok: true,
                    error: AUTH_FAILED.to_string(),
                    data: Payload::Flag(false),
                },
                _ => ReturnPacket::failure(AUTH_FAILED),
            };
        }

        match self.dispatch(command, packet) {
            Ok(data) => ReturnPacket::success(data),
            Err(e) => {
                warn!("{} failed: {}", command, e);
                ReturnPacket::failure(e.to_string())
            }
        }
    }

    fn dispatch(&self, command: Command, packet: Packet) -> Result<Payload> {
        let db = &self.db;
        let start = packet.start.max(0) as usize;

        Ok(match command {
            Command::Authenticate => Payload::Flag(true),
            Command::Save => match packet.data {
                Payload::Document(doc) => {
                    db.save(packet.docid.unwrap_or(doc.id), &doc)?;
                    Payload::Flag(true)
                }
                other => return Err(unexpected(command, &other)),
            },
            Command::SaveBytes => match packet.data {
                Payload::Bytes(bytes) => {
                    db.save_bytes(docid(&packet.docid, command)?, bytes)?;
                    Payload::Flag(true)
                }
                other => return Err(unexpected(command, &other)),
            },
            Command::QueryType => {
                let view = self.view_for_type(&packet.viewname)?;
                Payload::Rows(db.query(&view, packet.data.as_text(), start, packet.count, &packet.order_by)?)
            }
            Command::QueryStr => {
                Payload::Rows(db.query(&packet.viewname, packet.data.as_text(), start, packet.count, &packet.order_by)?)
            }
            Command::Fetch => match db.fetch(docid(&packet.docid, command)?)? {
                Some(doc) => Payload::Document(doc),
                None => Payload::None,
            },
            Command::FetchBytes => match db.fetch_bytes(docid(&packet.docid, command)?)? {
                Some(bytes) => Payload::Bytes(bytes),
                None => Payload::None,
            },
            Command::Backup => Payload::Flag(db.backup()?),
            Command::Delete => Payload::Flag(db.delete(docid(&packet.docid, command)?)?),
            Command::DeleteBytes => Payload::Flag(db.delete_bytes(docid(&packet.docid, command)?)?),
            Command::Restore => Payload::Count(db.restore()? as u64),
            Command::AddUser => match packet.data {
                Payload::Credentials { username, old_password, new_password } => {
                    Payload::Flag(self.users.add_user(&username, &old_password, &new_password))
                }
                other => return Err(unexpected(command, &other)),
            },
            Command::GetUsers => Payload::Names(self.users.users()),
            Command::ServerSide => Payload::ServerRows(db.server_side(&packet.viewname, packet.data.as_text())?),
            Command::FullText => Payload::Versions(db.full_text_search(packet.data.as_text())?),
            Command::CountType => {
                let view = self.view_for_type(&packet.viewname)?;
                Payload::Count(db.count(&view, packet.data.as_text())? as u64)
            }
            Command::CountStr | Command::GCount => {
                Payload::Count(db.count(&packet.viewname, packet.data.as_text())? as u64)
            }
            Command::DocHistory => Payload::Versions(db.fetch_history(docid(&packet.docid, command)?)?),
            Command::FileHistory => Payload::Versions(db.fetch_bytes_history(docid(&packet.docid, command)?)?),
            Command::FetchVersion => match db.fetch_version(version(&packet.data, command)?)? {
                Some(doc) => Payload::Document(doc),
                None => Payload::None,
            },
            Command::FetchFileVersion => match db.fetch_bytes_version(version(&packet.data, command)?)? {
                Some(bytes) => Payload::Bytes(bytes),
                None => Payload::None,
            },
            Command::CheckAssembly => Payload::Schema(db.view_schema(&packet.viewname)?),
            Command::GetViews => Payload::Names(db.views()),
        })
    }

    fn view_for_type(&self, doc_type: &str) -> Result<String> {
        self.db.view_name_for_type(doc_type)
            .ok_or_else(|| Error::not_found(format!("No primary view for type '{}'", doc_type)))
    }
}

fn docid(docid: &Option<DocId>, command: Command) -> Result<DocId> {
    docid.ok_or_else(|| Error::invalid_input(format!("{} needs a document id", command)))
}

fn version(data: &Payload, command: Command) -> Result<u32> {
    match data {
        Payload::Version(v) => Ok(*v),
        other => Err(unexpected(command, other)),
    }
}

fn unexpected(command: Command, data: &Payload) -> Error {
    Error::invalid_input(format!("Unexpected {} payload for {}", data.kind(), command))
}

/// Logs connection rate once a second while there is traffic.
async fn log_connects(server: Arc<DbServer>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let count = server.connects.swap(0, Ordering::Relaxed);
        if count > 0 {
            debug!("Connects/sec = {}", count);
        }
    }
}
