use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use viewdb::core::error::ErrorKind;
use viewdb::net::{DbClient, DbServer, NetworkClient, UserStore};
use viewdb::view::ColumnType;
use viewdb::wire::{Command, Packet, Payload};
use viewdb::{Config, Database, DocId, Document, NetworkConfig, View, ViewSchema};

struct TestServer {
    addr: String,
    db: Arc<Database>,
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<viewdb::Result<()>>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let view = View::new(
            ViewSchema::new("SalesInvoice")
                .column("CustomerName", ColumnType::Text)
                .column("Serial", ColumnType::Integer),
        ).primary().fire_on("Invoice");

        let db = Arc::new(Database::open(Config::with_storage_path(dir.path()), vec![view]).unwrap());
        db.wait_for_rebuilds();
        let users = Arc::new(UserStore::open(&dir.path().join("users.config")).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = Arc::new(DbServer::new(db.clone(), users, NetworkConfig::default()));

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(listener, async move {
            let _ = stopped.await;
        }));

        TestServer { addr, db, stop: Some(stop), task, _dir: dir }
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.unwrap().unwrap();
    }
}

fn invoice(customer: &str, serial: i64) -> Document {
    Document::new(DocId::new(), "Invoice")
        .with_field("CustomerName", customer)
        .with_field("Serial", serial)
}

#[tokio::test]
async fn wrong_password_is_refused() {
    let server = TestServer::start().await;

    let err = DbClient::connect(&server.addr, "admin", "wrong", &NetworkConfig::default())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind, ErrorKind::Authentication);

    // The authenticate reply itself is ok with a false flag.
    let client = NetworkClient::new(server.addr.clone(), &NetworkConfig::default());
    let mut packet = Packet::new(Command::Authenticate);
    packet.username = "admin".to_string();
    packet.password_hash = 1;
    let reply = client.send(&packet).await.unwrap();
    assert!(reply.ok);
    assert_eq!(reply.error, "Authentication failed");
    assert_eq!(reply.data, Payload::Flag(false));

    let reply = client.send(&Packet::new(Command::GetViews)).await.unwrap();
    assert!(!reply.ok);

    server.stop().await;
}

#[tokio::test]
async fn save_query_and_fetch_over_tcp() {
    let server = TestServer::start().await;
    let client = DbClient::connect(&server.addr, "admin", "admin", &NetworkConfig::default()).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..20 {
        let doc = invoice(if i < 5 { "Acme" } else { "Globex" }, i);
        ids.push(doc.id);
        assert!(client.save(doc.id, doc).await.unwrap());
    }

    let result = client.query_type("Invoice", "CustomerName == 'Acme'", 0, -1, "Serial desc").await.unwrap();
    assert_eq!(result.total_count, 5);
    assert_eq!(result.rows.len(), 5);
    assert_eq!(client.count("SalesInvoice", "Serial >= 10").await.unwrap(), 10);
    assert_eq!(client.count_type("invoice", "").await.unwrap(), 20);
    assert_eq!(client.generic_count("SalesInvoice", "Serial < 3").await.unwrap(), 3);

    let fetched = client.fetch(ids[0]).await.unwrap().unwrap();
    assert_eq!(fetched.id, ids[0]);
    assert!(client.delete(ids[0]).await.unwrap());
    assert_eq!(client.fetch(ids[0]).await.unwrap(), None);
    assert_eq!(client.fetch_history(ids[0]).await.unwrap().len(), 1);

    assert_eq!(client.views().await.unwrap(), vec!["SalesInvoice".to_string()]);
    let schema = client.view_schema("SalesInvoice").await.unwrap();
    assert_eq!(schema.columns.len(), 2);
    assert_eq!(server.db.count("SalesInvoice", "").unwrap(), 19);

    client.close().await;
    server.stop().await;
}

#[tokio::test]
async fn files_and_users() {
    let server = TestServer::start().await;
    let client = DbClient::connect(&server.addr, "admin", "admin", &NetworkConfig::default()).await.unwrap();

    let id = DocId::new();
    assert!(client.save_bytes(id, vec![7u8; 2048]).await.unwrap());
    assert_eq!(client.fetch_bytes(id).await.unwrap(), Some(vec![7u8; 2048]));
    let versions = client.fetch_bytes_history(id).await.unwrap();
    assert_eq!(client.fetch_bytes_version(versions[0]).await.unwrap(), Some(vec![7u8; 2048]));

    assert!(client.add_user("bob", "", "secret").await.unwrap());
    assert!(!client.add_user("bob", "guess", "other").await.unwrap());
    assert_eq!(client.users().await.unwrap(), vec!["admin".to_string(), "bob".to_string()]);

    let bob = DbClient::connect(&server.addr, "bob", "secret", &NetworkConfig::default()).await.unwrap();
    assert!(bob.backup().await.unwrap());

    server.stop().await;
}

#[tokio::test]
async fn failures_come_back_as_errors() {
    let server = TestServer::start().await;
    let client = DbClient::connect(&server.addr, "admin", "admin", &NetworkConfig::default()).await.unwrap();

    let err = client.query("SalesInvoice", "Serial >>", 0, -1, "").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
    assert!(err.context.contains("Invalid filter"));

    let err = client.server_side("nothing", "").await.unwrap_err();
    assert!(err.context.contains("not registered"));

    let orphan = Document::new(DocId::new(), "Orphan");
    assert!(client.save(orphan.id, orphan).await.is_err());

    // The connection stays usable after a failed request.
    assert_eq!(client.count("SalesInvoice", "").await.unwrap(), 0);

    server.stop().await;
}

#[tokio::test]
async fn unreachable_server_sets_last_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = NetworkClient::new(addr, &NetworkConfig::default());
    assert!(client.send(&Packet::new(Command::GetViews)).await.is_none());
    assert!(!client.last_error_message().is_empty());
}
