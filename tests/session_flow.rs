#![allow(missing_docs)]

pub mod common;

use common::{MemFs, MemProvider};
use libftpcore::{
    auth::Identity,
    options::{PassiveOptions, PassivePorts},
    server::{
        BackgroundCommandError, CommandOutcome, DataEndpoint, HandlerState, ListenerError, PassiveListenerFactory, Reply, ReplyCode,
        SessionError, TcpTransport, Transport, retrieve, store,
    },
};
use pretty_assertions::assert_eq;
use std::{net::Ipv4Addr, sync::Arc};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

fn factory(ports: std::ops::RangeInclusive<u16>) -> PassiveListenerFactory {
    PassiveListenerFactory::new(
        Arc::new(TcpTransport),
        PassiveOptions::default().ports(PassivePorts::range(ports).unwrap()).bind_ip(Ipv4Addr::LOCALHOST),
        common::logger(),
    )
}

#[tokio::test]
async fn stor_aborted_mid_transfer() {
    let fs = Arc::new(MemFs::new(&["/pub"]));
    let provider = MemProvider(fs.clone());
    let factory = factory(6000..=6000);
    let transport: Arc<dyn Transport> = Arc::new(TcpTransport);
    let mut session = common::session();

    session.login(Identity::new("alice"), &provider).await.unwrap();
    session.change_directory("/pub").await.unwrap();

    // PASV
    let addr = factory.create_listener(&mut session, 0).await.unwrap();
    assert_eq!(addr.port(), 6000);
    let ip = factory.advertised_ip(session.context().local).unwrap();
    assert_eq!(Reply::passive_mode(ip, addr.port()).to_string(), "227 Entering Passive Mode (127,0,0,1,23,112)\r\n");

    // STOR file.bin
    let completion = session
        .start_transfer(|ctx, token| store(ctx, transport, "file.bin".to_string(), token))
        .unwrap();
    assert!(session.passive_listener().is_none());
    assert_eq!(session.background().state(), HandlerState::Running);

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&[1u8; 1000]).await.unwrap();
    fs.wait_for_len("/pub/file.bin", 1000).await;

    // ABOR, with the client still connected
    session.background().cancel().unwrap();
    let mut replies = vec![Reply::abort_acknowledged()];
    let outcome = completion.await;
    assert_eq!(outcome, CommandOutcome::Aborted);
    replies.push(outcome.reply());

    let wire: Vec<String> = replies.iter().map(ToString::to_string).collect();
    assert_eq!(
        wire,
        vec![
            "226 Abort command successful; transfer aborting\r\n".to_string(),
            "426 Connection closed; transfer aborted\r\n".to_string(),
        ]
    );
    assert_eq!(session.background().state(), HandlerState::Idle);
    assert!(session.passive_listener().is_none());
    assert_eq!(factory.session_for_port(6000), None);
    assert_eq!(fs.writers_closed(), 1);
    assert_eq!(fs.content("/pub/file.bin").map(|c| c.len()), Some(1000));

    drop(client);
    assert!(session.dispose().await.is_empty());
    assert_eq!(fs.disposed(), 1);
}

#[tokio::test]
async fn retr_over_port_honours_rest() {
    let fs = Arc::new(MemFs::new(&[]));
    fs.put("/readme.txt", b"hello world");
    let provider = MemProvider(fs.clone());
    let mut session = common::session();
    session.login(Identity::new("alice"), &provider).await.unwrap();

    let client = TcpListener::bind("127.0.0.1:0").await.unwrap();
    session.record_connection_setup(DataEndpoint::Active(client.local_addr().unwrap())).await;
    session.set_restart_position(6);

    let transport: Arc<dyn Transport> = Arc::new(TcpTransport);
    let completion = session
        .start_transfer(|ctx, token| retrieve(ctx, transport, "readme.txt".to_string(), token))
        .unwrap();

    let (mut conn, _) = client.accept().await.unwrap();
    let mut received = Vec::new();
    conn.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"world");

    let outcome = completion.await;
    assert_eq!(outcome.reply().code(), Some(ReplyCode::ClosingDataConnection));
    assert_eq!(session.restart_position(), None);
    session.dispose().await;
}

#[tokio::test]
async fn missing_file_maps_to_550() {
    let fs = Arc::new(MemFs::new(&[]));
    let provider = MemProvider(fs);
    let mut session = common::session();
    session.login(Identity::new("alice"), &provider).await.unwrap();
    session.record_connection_setup(DataEndpoint::Active("127.0.0.1:9".parse().unwrap())).await;

    let outcome = session
        .start_transfer(|ctx, token| retrieve(ctx, Arc::new(TcpTransport), "nope.txt".to_string(), token))
        .unwrap()
        .await;
    assert!(matches!(outcome, CommandOutcome::Failed(_)));
    assert_eq!(outcome.reply().code(), Some(ReplyCode::FileError));

    let err = session.change_directory("nope").await.unwrap_err();
    assert_eq!(Reply::from(&err).code(), Some(ReplyCode::FileError));
    session.dispose().await;
}

#[tokio::test]
async fn busy_and_idle_handler_replies() {
    let fs = Arc::new(MemFs::new(&[]));
    let provider = MemProvider(fs);
    let factory = factory(6010..=6010);
    let mut session = common::session();
    session.login(Identity::new("alice"), &provider).await.unwrap();

    let err = session.background().cancel().unwrap_err();
    assert_eq!(err, BackgroundCommandError::NotRunning);
    assert_eq!(Reply::from(&err).to_string(), "226 No transfer in progress\r\n");

    factory.create_listener(&mut session, 0).await.unwrap();
    let completion = session
        .start_transfer(|ctx, token| store(ctx, Arc::new(TcpTransport), "upload.bin".to_string(), token))
        .unwrap();

    let err = session
        .background()
        .execute(|_| async { CommandOutcome::Completed(Reply::none()) })
        .unwrap_err();
    assert_eq!(Reply::from(&err).code(), Some(ReplyCode::TransientFileError));

    // A second STOR is refused before it can touch the session.
    session.set_restart_position(3);
    let err = session
        .start_transfer(|ctx, token| store(ctx, Arc::new(TcpTransport), "other.bin".to_string(), token))
        .unwrap_err();
    assert!(matches!(err, SessionError::Background(BackgroundCommandError::AlreadyRunning)));
    assert_eq!(Reply::from(&err).code(), Some(ReplyCode::TransientFileError));
    assert_eq!(session.restart_position(), Some(3));

    // Nobody connects; ABOR unblocks the accept.
    session.background().cancel().unwrap();
    assert!(completion.await.is_aborted());
    assert!(session.dispose().await.is_empty());
}

#[tokio::test]
async fn passive_port_is_freed_for_the_next_session() {
    let fs = Arc::new(MemFs::new(&[]));
    let provider = MemProvider(fs);
    let factory = factory(6020..=6020);

    let mut first = common::session();
    first.login(Identity::new("alice"), &provider).await.unwrap();
    factory.create_listener(&mut first, 0).await.unwrap();
    assert_eq!(factory.session_for_port(6020), Some(first.id()));

    let mut second = common::session();
    let err = factory.create_listener(&mut second, 0).await.unwrap_err();
    assert!(matches!(err, ListenerError::RangeExhausted { start: 6020, end: 6020 }));
    assert_eq!(Reply::from(&err).code(), Some(ReplyCode::CantOpenDataConnection));

    assert!(first.dispose().await.is_empty());
    assert_eq!(factory.create_listener(&mut second, 0).await.unwrap().port(), 6020);
    assert_eq!(factory.session_for_port(6020), Some(second.id()));
    second.dispose().await;
}

#[tokio::test]
async fn stor_aborted_before_connect_leaves_files_alone() {
    let fs = Arc::new(MemFs::new(&[]));
    fs.put("/keep.bin", b"precious");
    let provider = MemProvider(fs.clone());
    let factory = factory(6030..=6031);
    let mut session = common::session();
    session.login(Identity::new("alice"), &provider).await.unwrap();

    for name in ["keep.bin", "never.bin"] {
        factory.create_listener(&mut session, 0).await.unwrap();
        let completion = session
            .start_transfer(move |ctx, token| store(ctx, Arc::new(TcpTransport), name.to_string(), token))
            .unwrap();
        // Nobody connects.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        session.background().cancel().unwrap();
        assert!(completion.await.is_aborted());
    }

    assert_eq!(fs.content("/keep.bin"), Some(b"precious".to_vec()));
    assert_eq!(fs.content("/never.bin"), None);
    assert_eq!(fs.writers_closed(), 0);
    session.dispose().await;
}
